use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's token balance. Accounts are implicit: an owner that has never
/// been credited reads as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub owner: Uuid,
    pub available: u64,
    pub timestamp: DateTime<Utc>,
}

impl Balance {
    pub fn new(owner: Uuid, available: u64) -> Self {
        Self {
            owner,
            available,
            timestamp: Utc::now(),
        }
    }

    pub fn empty(owner: Uuid) -> Self {
        Self::new(owner, 0)
    }
}
