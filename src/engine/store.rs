use serde_json::json;
use uuid::Uuid;

use crate::{
    adapters::Filter,
    authz::{Actor, require_admin},
    engine::Engine,
    error::{Error, Result},
    events::DomainEvent,
    ledger::{Guard, TransactionKind},
    object::{
        CashOutQuote, CashOutRequest, CashOutStatus, Purchase, PurchaseStatus, StoreItem,
    },
    settings::{Settings, SettingsUpdate},
};

impl Engine {
    // ==================== Store ====================

    /// Buy an active store item. The balance check and the debit happen in
    /// the same plan as the purchase record.
    pub async fn purchase(&self, actor: &Actor, store_item_id: Uuid) -> Result<Purchase> {
        let item = self
            .fetch_opt::<StoreItem>(store_item_id)
            .await?
            .filter(|item| item.active)
            .ok_or_else(|| Error::not_found("active store item", store_item_id))?;

        let purchase = Purchase::new(actor.id, &item, self.now());
        let metadata = json!({
            "purchase_id": purchase.id,
            "store_item_id": item.id,
            "item": item.title,
        });

        let mut plan = self.plan();
        plan.insert(&purchase)?;
        plan.debit(
            actor.id,
            purchase.cost,
            TransactionKind::Purchase,
            metadata.to_string(),
            Some(actor.id),
        );
        self.run(&plan, "purchase").await?;

        tracing::info!(
            purchase = %purchase.id,
            user = %actor.id,
            cost = purchase.cost,
            "store item purchased"
        );
        Ok(purchase)
    }

    pub async fn set_purchase_status(
        &self,
        actor: &Actor,
        purchase_id: Uuid,
        status: PurchaseStatus,
    ) -> Result<Purchase> {
        require_admin(actor, "update purchases")?;
        let purchase = self.fetch::<Purchase>(purchase_id).await?;
        let next = purchase.resolve(status, self.now())?;

        let mut plan = self.plan();
        plan.update(&next, Some(Guard::Status(PurchaseStatus::Pending.as_str())))?;
        self.run(&plan, "purchase").await?;
        Ok(next)
    }

    /// A user's purchases, newest first.
    pub async fn purchases_for(&self, user: Uuid) -> Result<Vec<Purchase>> {
        let mut purchases = self
            .query::<Purchase>(&[Filter::uuid("user_id", user)])
            .await?;
        purchases.reverse();
        Ok(purchases)
    }

    // ==================== Cash-out ====================

    pub async fn cash_out_quote(&self, actor: &Actor) -> Result<CashOutQuote> {
        let settings = self.settings().await?;
        let balance = self.adapter().get_balance(actor.id).await?.available;

        Ok(CashOutQuote {
            balance,
            tokens_per_dollar: settings.tokens_per_dollar,
            cash_out_interest_rate: settings.cash_out_interest_rate,
            dollar_value_if_cash_out_all: settings.tokens_to_dollars(balance),
        })
    }

    /// Convert tokens to money at the current rates. The tokens leave the
    /// balance immediately; an administrator pays out later.
    pub async fn request_cash_out(&self, actor: &Actor, tokens: u64) -> Result<CashOutRequest> {
        if tokens == 0 {
            return Err(Error::Validation(
                "cash-out amount must be greater than zero".to_string(),
            ));
        }

        let settings = self.settings().await?;
        let request = CashOutRequest::new(actor.id, tokens, &settings, self.now());
        let metadata = json!({
            "cash_out_id": request.id,
            "dollar_value": request.dollar_value,
        });

        let mut plan = self.plan();
        plan.debit(
            actor.id,
            tokens,
            TransactionKind::CashOut,
            metadata.to_string(),
            Some(actor.id),
        );
        plan.insert(&request)?;
        self.run(&plan, "cash_out").await?;

        tracing::info!(
            request = %request.id,
            user = %actor.id,
            tokens,
            dollars = request.dollar_value,
            "cash-out requested"
        );

        let requester = self.display_name(Some(actor.id), "Someone").await;
        let recipients = self.other_administrators(actor.id).await;
        self.notify(DomainEvent::CashOutRequested {
            request: request.clone(),
            requester,
            recipients,
        })
        .await;

        Ok(request)
    }

    pub async fn mark_cash_out_paid(&self, actor: &Actor, id: Uuid) -> Result<CashOutRequest> {
        require_admin(actor, "mark cash-outs paid")?;
        let request = self.fetch::<CashOutRequest>(id).await?;
        let next = request.mark_paid(actor.id, self.now())?;

        let mut plan = self.plan();
        plan.update(&next, Some(Guard::Status(CashOutStatus::Pending.as_str())))?;
        self.run(&plan, "cash_out").await?;

        tracing::info!(request = %next.id, admin = %actor.id, "cash-out paid");
        self.notify(DomainEvent::CashOutPaid {
            request: next.clone(),
        })
        .await;
        Ok(next)
    }

    /// Every cash-out request, newest first.
    pub async fn cash_out_requests(&self, actor: &Actor) -> Result<Vec<CashOutRequest>> {
        require_admin(actor, "view cash-out requests")?;
        let mut requests = self.list::<CashOutRequest>().await?;
        requests.reverse();
        Ok(requests)
    }

    // ==================== Settings ====================

    pub async fn token_settings(&self) -> Result<Settings> {
        self.settings().await
    }

    /// Validate every supplied value, then write them together.
    pub async fn update_settings(&self, actor: &Actor, update: SettingsUpdate) -> Result<Settings> {
        require_admin(actor, "change token settings")?;
        let pairs = update.validate()?;
        self.adapter().store_settings(&pairs).await?;

        for (key, value) in &pairs {
            tracing::info!(key = %key, value = %value, admin = %actor.id, "setting updated");
        }
        self.settings().await
    }
}
