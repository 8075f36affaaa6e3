use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Payout,
    Purchase,
    CashOut,
    Adjustment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payout => "payout",
            Self::Purchase => "purchase",
            Self::CashOut => "cash_out",
            Self::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "payout" => Ok(Self::Payout),
            "purchase" => Ok(Self::Purchase),
            "cash_out" => Ok(Self::CashOut),
            "adjustment" => Ok(Self::Adjustment),
            other => Err(Error::Serialize(format!(
                "unknown transaction kind: {}",
                other
            ))),
        }
    }
}

/// One balance movement. Exactly one of `credited`/`debited` is non-zero,
/// except for zero-amount payouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub owner: Uuid,
    pub credited: u64,
    pub debited: u64,
    pub kind: TransactionKind,
    pub metadata: String,
    pub idempotency_key: Option<String>,
    pub actor: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn credit(owner: Uuid, amount: u64, kind: TransactionKind, metadata: String) -> Self {
        Self::new(owner, amount, 0, kind, metadata)
    }

    pub fn debit(owner: Uuid, amount: u64, kind: TransactionKind, metadata: String) -> Self {
        Self::new(owner, 0, amount, kind, metadata)
    }

    fn new(
        owner: Uuid,
        credited: u64,
        debited: u64,
        kind: TransactionKind,
        metadata: String,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            owner,
            credited,
            debited,
            kind,
            metadata,
            idempotency_key: None,
            actor: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_idempotency_key(mut self, key: String) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    pub fn with_actor(mut self, actor: Option<Uuid>) -> Self {
        self.actor = actor;
        self
    }
}

/// Administrative correction of a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "amount", rename_all = "snake_case")]
pub enum Adjustment {
    /// Overwrite the balance.
    Set(u64),
    /// Add (or with a negative value, remove) tokens.
    Delta(i64),
}

impl Adjustment {
    /// The balance after applying this adjustment to `current`.
    pub fn apply(&self, current: u64) -> Result<u64> {
        match *self {
            Self::Set(value) => Ok(value),
            Self::Delta(delta) if delta >= 0 => current
                .checked_add(delta as u64)
                .ok_or_else(|| Error::Validation("balance overflow".to_string())),
            Self::Delta(delta) => {
                let requested = delta.unsigned_abs();
                current
                    .checked_sub(requested)
                    .ok_or(Error::InsufficientBalance {
                        requested,
                        available: current,
                    })
            }
        }
    }

    /// The transaction describing the move from `before` to `after`.
    pub(crate) fn transaction(
        before: u64,
        after: u64,
        owner: Uuid,
        actor: Uuid,
        metadata: String,
    ) -> Transaction {
        let tx = if after >= before {
            Transaction::credit(owner, after - before, TransactionKind::Adjustment, metadata)
        } else {
            Transaction::debit(owner, before - after, TransactionKind::Adjustment, metadata)
        };
        tx.with_actor(Some(actor))
    }
}
