use uuid::Uuid;

use crate::{
    authz::{Actor, require_admin},
    engine::Engine,
    error::Result,
    ledger::{Adjustment, Balance, Transaction},
    object::User,
};

impl Engine {
    // ==================== Accounts ====================

    pub async fn balance(&self, user: Uuid) -> Result<Balance> {
        self.adapter().get_balance(user).await
    }

    /// Ledger history of one user, newest first.
    pub async fn transactions_for(&self, user: Uuid) -> Result<Vec<Transaction>> {
        self.adapter().fetch_transactions(user).await
    }

    /// Administrative balance correction. Every adjustment is written to the
    /// `chorebank::audit` tracing target.
    pub async fn adjust_balance(
        &self,
        actor: &Actor,
        user: Uuid,
        adjustment: Adjustment,
        reason: Option<&str>,
    ) -> Result<Balance> {
        require_admin(actor, "adjust balances")?;
        self.fetch::<User>(user).await?;

        let mut plan = self.plan();
        plan.adjust(user, adjustment, actor.id, reason.unwrap_or_default());
        self.run(&plan, "adjust").await?;

        let balance = self.balance(user).await?;
        tracing::info!(
            target: "chorebank::audit",
            admin = %actor.id,
            user = %user,
            adjustment = ?adjustment,
            balance = balance.available,
            reason = reason.unwrap_or(""),
            "balance adjusted"
        );
        Ok(balance)
    }
}
