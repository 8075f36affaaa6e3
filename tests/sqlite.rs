#![cfg(feature = "sqlite")]

mod common;

use chorebank::{
    AdHocTracker, Config, Engine, Error, NewProject, NewStoreItem, NewTemplate, NewTracker,
    SettingsUpdate, TaskKey, TrackerStatus, adapters::sqlite::SqliteAdapter,
};
use common::{Household, household_with};

async fn memory_household() -> Household {
    let adapter = SqliteAdapter::new_memory().await.unwrap();
    adapter.init_schema().await.unwrap();
    household_with(Box::new(adapter)).await
}

async fn approve_dishes(h: &Household) {
    let template = h
        .engine
        .create_template(
            &h.pat(),
            NewTemplate {
                name: "Dishes".to_string(),
                reward: 10,
                assigned_user_id: Some(h.sam.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let tracker = h
        .engine
        .schedule(
            &h.pat(),
            template.id,
            NewTracker {
                date: Some(common::day(2026, 5, 9)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    h.engine.mark_done(&h.sam(), tracker.id).await.unwrap();
    let pending = h
        .engine
        .trackers_with_status(TrackerStatus::PendingApproval)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);

    h.engine.approve(&h.pat(), tracker.id).await.unwrap();
    let err = h.engine.approve(&h.pat(), tracker.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));
}

#[tokio::test]
async fn test_approval_pays_once() {
    let h = memory_household().await;
    approve_dishes(&h).await;

    assert_eq!(h.balance(&h.sam).await, 8);
    let entries = h.engine.completions().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].amount, 8);
    assert_eq!(entries[0].days_late, 1);
    assert_eq!(
        h.inbox(&h.pat).await,
        vec!["\"Dishes\" has been marked as completed by Sam and is pending your approval."]
    );

    let history = h.engine.transactions_for(h.sam.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].credited, 8);
    assert!(history[0].idempotency_key.is_some());
}

#[tokio::test]
async fn test_duplicate_completion_is_reported() {
    let h = memory_household().await;
    let tracker = h
        .engine
        .log_adhoc(
            &h.sam(),
            AdHocTracker {
                title: "Walk the dog".to_string(),
                reward: 6,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let update = h.engine.direct_complete(&h.pat(), tracker.id).await.unwrap();
    let entry = update.payout.unwrap().entry().clone();

    let replay = h
        .engine
        .record_completion(
            TaskKey::Tracker(tracker.id),
            entry.completed_date,
            chorebank::reward::calculate(6, entry.completed_date, entry.completed_date, 2),
            chorebank::EntryDetails {
                task_name: entry.task_name.clone(),
                assigned_user_id: Some(h.sam.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!replay.is_recorded());
    assert_eq!(replay.entry().id, entry.id);
    assert_eq!(h.balance(&h.sam).await, 6);
}

#[tokio::test]
async fn test_overdraft_rolls_back_the_purchase() {
    let h = memory_household().await;
    let item = h
        .engine
        .create_store_item(
            &h.pat(),
            NewStoreItem {
                title: "Movie night".to_string(),
                description: None,
                rules: None,
                cost: 30,
                active: true,
                sort_order: 0,
            },
        )
        .await
        .unwrap();
    h.fund(&h.sam, 50).await;

    h.engine.purchase(&h.sam(), item.id).await.unwrap();
    let err = h.engine.purchase(&h.sam(), item.id).await.unwrap_err();
    assert_eq!(
        err,
        Error::InsufficientBalance {
            requested: 30,
            available: 20
        }
    );
    assert_eq!(h.balance(&h.sam).await, 20);
    assert_eq!(h.engine.purchases_for(h.sam.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cash_out_and_settings() {
    let h = memory_household().await;
    h.fund(&h.sam, 300).await;

    h.engine
        .update_settings(
            &h.pat(),
            SettingsUpdate {
                cash_out_interest_rate: Some("1.5".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let request = h.engine.request_cash_out(&h.sam(), 200).await.unwrap();
    assert_eq!(request.dollar_value, 3.0);
    assert_eq!(request.interest_rate, 1.5);
    assert_eq!(h.balance(&h.sam).await, 100);
    assert_eq!(h.inbox(&h.lee).await.len(), 1);

    h.engine
        .mark_cash_out_paid(&h.lee(), request.id)
        .await
        .unwrap();
    let err = h
        .engine
        .mark_cash_out_paid(&h.pat(), request.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));
}

#[tokio::test]
async fn test_project_guard_in_sql() {
    let h = memory_household().await;
    let project = h
        .engine
        .create_project(
            &h.sam(),
            NewProject {
                name: "Paint the fence".to_string(),
                reward: 25,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    h.engine.complete_project(&h.sam(), project.id).await.unwrap();
    assert_eq!(h.balance(&h.sam).await, 25);
    assert!(h.engine.open_projects().await.unwrap().is_empty());

    let err = h
        .engine
        .delete_project(&h.sam(), project.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));
}

#[tokio::test]
async fn test_file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chores.db");
    let config = Config {
        database_url: format!("sqlite:{}", path.display()),
        ..Default::default()
    };

    let (sam_id, pat_id) = {
        let engine = Engine::connect(&config).await.unwrap();
        let pat = engine.create_user("Pat", true).await.unwrap();
        let sam = engine.create_user("Sam", false).await.unwrap();

        let tracker = engine
            .log_adhoc(
                &pat.actor(),
                AdHocTracker {
                    title: "Vacuum".to_string(),
                    reward: 12,
                    assigned_user_id: Some(sam.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        engine.mark_done(&sam.actor(), tracker.id).await.unwrap();
        engine.approve(&pat.actor(), tracker.id).await.unwrap();
        (sam.id, pat.id)
    };

    let engine = Engine::connect(&config).await.unwrap();
    assert_eq!(engine.balance(sam_id).await.unwrap().available, 12);
    assert_eq!(engine.completions().await.unwrap().len(), 1);
    assert_eq!(engine.administrators().await.unwrap()[0].id, pat_id);
    assert_eq!(engine.unread_count(pat_id).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_purchases_on_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let adapter = SqliteAdapter::new_file(&path.display().to_string())
        .await
        .unwrap();
    adapter.init_schema().await.unwrap();
    let h = household_with(Box::new(adapter)).await;

    let item = h
        .engine
        .create_store_item(
            &h.pat(),
            NewStoreItem {
                title: "Movie night".to_string(),
                description: None,
                rules: None,
                cost: 30,
                active: true,
                sort_order: 0,
            },
        )
        .await
        .unwrap();

    for _ in 0..10 {
        h.fund(&h.sam, 50).await;

        let buyers: Vec<_> = (0..2)
            .map(|_| {
                let engine = h.engine.clone();
                let sam = h.sam();
                tokio::spawn(async move { engine.purchase(&sam, item.id).await })
            })
            .collect();

        let mut results = Vec::new();
        for buyer in buyers {
            results.push(buyer.await.unwrap());
        }

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.into_iter().find_map(|r| r.err()).unwrap();
        assert_eq!(
            err,
            Error::InsufficientBalance {
                requested: 30,
                available: 20
            }
        );
        assert_eq!(h.balance(&h.sam).await, 20);
    }

    assert_eq!(h.engine.purchases_for(h.sam.id).await.unwrap().len(), 10);
}
