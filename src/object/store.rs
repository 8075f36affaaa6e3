use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    object::{StoreItem, impl_object},
    settings::Settings,
};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Pending,
    Used,
    Expired,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Used => "used",
            Self::Expired => "expired",
        }
    }
}

/// A redemption of a store item. `cost` is frozen at purchase time and does
/// not follow later price changes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Purchase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub store_item_id: Uuid,
    pub item_title: String,
    pub cost: u64,
    pub status: PurchaseStatus,
    pub purchased_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl_object!(Purchase, "purchase");

impl Purchase {
    pub fn new(user_id: Uuid, item: &StoreItem, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            store_item_id: item.id,
            item_title: item.title.clone(),
            cost: item.cost,
            status: PurchaseStatus::Pending,
            purchased_at: now,
            updated_at: None,
        }
    }

    pub fn resolve(&self, status: PurchaseStatus, now: DateTime<Utc>) -> Result<Self> {
        if status == PurchaseStatus::Pending {
            return Err(Error::Validation(
                "a purchase can only be marked used or expired".to_string(),
            ));
        }
        if self.status != PurchaseStatus::Pending {
            return Err(Error::state("pending", self.status.as_str()));
        }

        let mut next = self.clone();
        next.status = status;
        next.updated_at = Some(now);
        Ok(next)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CashOutStatus {
    Pending,
    Paid,
}

impl CashOutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }
}

/// A request to convert tokens to money. The conversion rates in effect at
/// request time are recorded alongside the dollar value so later settings
/// changes cannot alter it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CashOutRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tokens: u64,
    pub dollar_value: f64,
    pub tokens_per_dollar: f64,
    pub interest_rate: f64,
    pub status: CashOutStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_by: Option<Uuid>,
}

impl_object!(CashOutRequest, "cash_out_request");

impl CashOutRequest {
    pub fn new(user_id: Uuid, tokens: u64, settings: &Settings, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            tokens,
            dollar_value: settings.tokens_to_dollars(tokens),
            tokens_per_dollar: settings.tokens_per_dollar,
            interest_rate: settings.cash_out_interest_rate,
            status: CashOutStatus::Pending,
            created_at: now,
            paid_at: None,
            paid_by: None,
        }
    }

    pub fn mark_paid(&self, admin: Uuid, now: DateTime<Utc>) -> Result<Self> {
        if self.status != CashOutStatus::Pending {
            return Err(Error::state("pending", self.status.as_str()));
        }

        let mut next = self.clone();
        next.status = CashOutStatus::Paid;
        next.paid_at = Some(now);
        next.paid_by = Some(admin);
        Ok(next)
    }
}

/// What cashing out everything would be worth right now.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CashOutQuote {
    pub balance: u64,
    pub tokens_per_dollar: f64,
    pub cash_out_interest_rate: f64,
    pub dollar_value_if_cash_out_all: f64,
}
