mod common;

use std::sync::atomic::Ordering;

use chorebank::{
    Adjustment, CashOutStatus, Error, NewStoreItem, PurchaseStatus, SettingsUpdate, StoreItem,
    StoreItemUpdate, TransactionKind, parse_tokens,
};
use common::{Household, household, household_with_outage};

async fn movie_night(h: &Household) -> StoreItem {
    h.engine
        .create_store_item(
            &h.pat(),
            NewStoreItem {
                title: "Movie night".to_string(),
                description: None,
                rules: Some("Weekends only".to_string()),
                cost: 30,
                active: true,
                sort_order: 1,
            },
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_purchase_debits_and_rejects_overdraft() {
    let h = household().await;
    let item = movie_night(&h).await;
    h.fund(&h.sam, 50).await;

    let purchase = h.engine.purchase(&h.sam(), item.id).await.unwrap();
    assert_eq!(purchase.cost, 30);
    assert_eq!(purchase.status, PurchaseStatus::Pending);
    assert_eq!(h.balance(&h.sam).await, 20);

    let err = h.engine.purchase(&h.sam(), item.id).await.unwrap_err();
    assert_eq!(
        err,
        Error::InsufficientBalance {
            requested: 30,
            available: 20
        }
    );
    // Nothing from the failed attempt survives
    assert_eq!(h.balance(&h.sam).await, 20);
    assert_eq!(h.engine.purchases_for(h.sam.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_purchases_debit_once() {
    let h = household().await;
    let item = movie_night(&h).await;
    h.fund(&h.sam, 50).await;

    let sam = h.sam();
    let (first, second) = tokio::join!(
        h.engine.purchase(&sam, item.id),
        h.engine.purchase(&sam, item.id)
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(Error::InsufficientBalance {
            requested: 30,
            available: 20
        })
    )));
    assert_eq!(h.balance(&h.sam).await, 20);
}

#[tokio::test]
async fn test_purchase_cost_is_frozen() {
    let h = household().await;
    let item = movie_night(&h).await;
    h.fund(&h.sam, 100).await;

    let purchase = h.engine.purchase(&h.sam(), item.id).await.unwrap();
    h.engine
        .update_store_item(
            &h.pat(),
            item.id,
            StoreItemUpdate {
                cost: Some(45),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let stored = &h.engine.purchases_for(h.sam.id).await.unwrap()[0];
    assert_eq!(stored.id, purchase.id);
    assert_eq!(stored.cost, 30);
}

#[tokio::test]
async fn test_inactive_items_cannot_be_bought() {
    let h = household().await;
    let item = movie_night(&h).await;
    h.fund(&h.sam, 100).await;

    h.engine
        .update_store_item(
            &h.pat(),
            item.id,
            StoreItemUpdate {
                active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = h.engine.purchase(&h.sam(), item.id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(h.balance(&h.sam).await, 100);

    assert!(h.engine.list_store_items(&h.sam()).await.unwrap().is_empty());
    assert_eq!(h.engine.list_store_items(&h.pat()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_store_items_sorted_for_members() {
    let h = household().await;
    let later = movie_night(&h).await;
    let first = h
        .engine
        .create_store_item(
            &h.pat(),
            NewStoreItem {
                title: "Ice cream".to_string(),
                description: None,
                rules: None,
                cost: 10,
                active: true,
                sort_order: 0,
            },
        )
        .await
        .unwrap();

    let items = h.engine.list_store_items(&h.sam()).await.unwrap();
    let ids: Vec<_> = items.iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![first.id, later.id]);

    let err = h
        .engine
        .delete_store_item(&h.sam(), first.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));
}

#[tokio::test]
async fn test_purchase_status_is_admin_only_and_one_way() {
    let h = household().await;
    let item = movie_night(&h).await;
    h.fund(&h.sam, 30).await;
    let purchase = h.engine.purchase(&h.sam(), item.id).await.unwrap();

    let err = h
        .engine
        .set_purchase_status(&h.sam(), purchase.id, PurchaseStatus::Used)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));

    let used = h
        .engine
        .set_purchase_status(&h.pat(), purchase.id, PurchaseStatus::Used)
        .await
        .unwrap();
    assert_eq!(used.status, PurchaseStatus::Used);

    let err = h
        .engine
        .set_purchase_status(&h.pat(), purchase.id, PurchaseStatus::Expired)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));
}

#[tokio::test]
async fn test_cash_out_flow() {
    let h = household().await;
    h.fund(&h.sam, 250).await;

    let quote = h.engine.cash_out_quote(&h.sam()).await.unwrap();
    assert_eq!(quote.balance, 250);
    assert_eq!(quote.dollar_value_if_cash_out_all, 2.5);

    let request = h.engine.request_cash_out(&h.sam(), 200).await.unwrap();
    assert_eq!(request.dollar_value, 2.0);
    assert_eq!(request.status, CashOutStatus::Pending);
    assert_eq!(h.balance(&h.sam).await, 50);

    let expected = "Sam requested cash-out of 200 tokens ($2.00).";
    assert_eq!(h.inbox(&h.pat).await, vec![expected]);
    assert_eq!(h.inbox(&h.lee).await, vec![expected]);

    let err = h
        .engine
        .mark_cash_out_paid(&h.sam(), request.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));

    let paid = h
        .engine
        .mark_cash_out_paid(&h.pat(), request.id)
        .await
        .unwrap();
    assert_eq!(paid.status, CashOutStatus::Paid);
    assert_eq!(paid.paid_by, Some(h.pat.id));
    assert_eq!(
        h.inbox(&h.sam).await,
        vec!["Your cash-out request of 200 tokens ($2.00) has been marked paid."]
    );

    let err = h
        .engine
        .mark_cash_out_paid(&h.lee(), request.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));

    let requests = h.engine.cash_out_requests(&h.lee()).await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(h.engine.cash_out_requests(&h.sam()).await.is_err());
}

#[tokio::test]
async fn test_cash_out_rejects_zero_and_overdraft() {
    let h = household().await;
    h.fund(&h.sam, 10).await;

    let err = h.engine.request_cash_out(&h.sam(), 0).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = h.engine.request_cash_out(&h.sam(), 11).await.unwrap_err();
    assert!(matches!(err, Error::InsufficientBalance { .. }));
    assert_eq!(h.balance(&h.sam).await, 10);
    assert!(h.inbox(&h.pat).await.is_empty());
}

#[tokio::test]
async fn test_rates_are_frozen_at_request_time() {
    let h = household().await;
    h.fund(&h.sam, 500).await;

    let before = h.engine.request_cash_out(&h.sam(), 100).await.unwrap();
    let settings = h
        .engine
        .update_settings(
            &h.pat(),
            SettingsUpdate {
                tokens_per_dollar: Some("50".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(settings.tokens_per_dollar, 50.0);

    let after = h.engine.request_cash_out(&h.sam(), 100).await.unwrap();
    assert_eq!(before.dollar_value, 1.0);
    assert_eq!(after.dollar_value, 2.0);

    let requests = h.engine.cash_out_requests(&h.pat()).await.unwrap();
    let stored = requests.iter().find(|r| r.id == before.id).unwrap();
    assert_eq!(stored.dollar_value, 1.0);
    assert_eq!(stored.tokens_per_dollar, 100.0);
}

#[tokio::test]
async fn test_settings_validation() {
    let h = household().await;

    let err = h
        .engine
        .update_settings(
            &h.sam(),
            SettingsUpdate {
                penalty_per_day: Some("1".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));

    for bad in [
        SettingsUpdate {
            tokens_per_dollar: Some("0".to_string()),
            ..Default::default()
        },
        SettingsUpdate {
            tokens_per_dollar: Some("lots".to_string()),
            ..Default::default()
        },
        SettingsUpdate {
            cash_out_interest_rate: Some("-0.5".to_string()),
            ..Default::default()
        },
        SettingsUpdate::default(),
    ] {
        let err = h.engine.update_settings(&h.pat(), bad).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    let settings = h.engine.token_settings().await.unwrap();
    assert_eq!(settings.tokens_per_dollar, 100.0);
    assert_eq!(settings.penalty_per_day, 2);
}

#[tokio::test]
async fn test_admin_adjustments() {
    let h = household().await;

    let err = h
        .engine
        .adjust_balance(&h.sam(), h.sam.id, Adjustment::Set(1_000), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));

    h.fund(&h.sam, 40).await;
    let balance = h
        .engine
        .adjust_balance(&h.pat(), h.sam.id, Adjustment::Delta(-15), Some("broke a vase"))
        .await
        .unwrap();
    assert_eq!(balance.available, 25);

    let err = h
        .engine
        .adjust_balance(&h.pat(), h.sam.id, Adjustment::Delta(-26), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientBalance { .. }));
    assert_eq!(h.balance(&h.sam).await, 25);

    let history = h.engine.transactions_for(h.sam.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].kind, TransactionKind::Adjustment);
    assert_eq!(history[0].debited, 15);
    assert_eq!(history[0].actor, Some(h.pat.id));
    assert_eq!(history[1].credited, 40);
}

#[test]
fn test_caller_amounts_are_whole_tokens() {
    assert_eq!(parse_tokens("30").unwrap(), 30);
    assert_eq!(parse_tokens(" 30.0 ").unwrap(), 30);
    assert!(parse_tokens("2.5").is_err());
    assert!(parse_tokens("-3").is_err());
    assert!(parse_tokens("ten").is_err());
}

#[tokio::test]
async fn test_cash_out_is_not_reported_failed_after_commit() {
    let (h, outage) = household_with_outage().await;
    h.fund(&h.sam, 300).await;

    outage.store(true, Ordering::SeqCst);
    let request = h.engine.request_cash_out(&h.sam(), 200).await.unwrap();
    outage.store(false, Ordering::SeqCst);

    assert_eq!(request.tokens, 200);
    assert_eq!(h.balance(&h.sam).await, 100);
    let requests = h.engine.cash_out_requests(&h.pat()).await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].id, request.id);
    // Recipients could not be resolved, so nobody was told
    assert!(h.inbox(&h.pat).await.is_empty());
}
