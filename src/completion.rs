//! The completion ledger: one permanent entry per paid-out completion.
//!
//! Entries are keyed by `(TaskKey, completed_date)`. Adapters enforce that at
//! most one entry exists per key inside the same transaction that credits the
//! assignee, so replaying an approval can never pay twice.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ledger::hash_idempotency_key, reward::Reward};

/// Identity of whatever was completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TaskKey {
    Tracker(Uuid),
    Project(Uuid),
}

impl TaskKey {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Tracker(id) | Self::Project(id) => *id,
        }
    }

    /// Stable string form used as the storage key.
    pub fn as_key(&self) -> String {
        match self {
            Self::Tracker(id) => format!("tracker:{}", id),
            Self::Project(id) => format!("project:{}", id),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

/// A historical record of one payout. Names are copied at write time so the
/// entry stays readable after the task, user or room is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEntry {
    pub id: Uuid,
    pub task: TaskKey,
    pub template_id: Option<Uuid>,
    pub task_name: String,
    pub assigned_user_id: Option<Uuid>,
    pub assigned_user_name: Option<String>,
    pub room_id: Option<Uuid>,
    pub room_name: Option<String>,
    pub frequency: Option<String>,
    pub base: u64,
    pub days_late: u64,
    pub amount: u64,
    pub completed_date: NaiveDate,
    pub approved_by: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
}

/// Denormalized names and references captured when an entry is written.
#[derive(Debug, Clone, Default)]
pub struct EntryDetails {
    pub template_id: Option<Uuid>,
    pub task_name: String,
    pub assigned_user_id: Option<Uuid>,
    pub assigned_user_name: Option<String>,
    pub room_id: Option<Uuid>,
    pub room_name: Option<String>,
    pub frequency: Option<String>,
    pub approved_by: Option<Uuid>,
}

impl CompletionEntry {
    pub fn new(
        task: TaskKey,
        completed_date: NaiveDate,
        reward: Reward,
        details: EntryDetails,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            task,
            template_id: details.template_id,
            task_name: details.task_name,
            assigned_user_id: details.assigned_user_id,
            assigned_user_name: details.assigned_user_name,
            room_id: details.room_id,
            room_name: details.room_name,
            frequency: details.frequency,
            base: reward.base,
            days_late: reward.days_late,
            amount: reward.payable,
            completed_date,
            approved_by: details.approved_by,
            recorded_at,
        }
    }

    /// Key of the credit transaction this entry produces.
    pub fn idempotency_key(&self) -> String {
        hash_idempotency_key(&format!(
            "payout:{}:{}",
            self.task.as_key(),
            self.completed_date
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PayoutOutcome {
    Recorded(CompletionEntry),
    /// An entry for the same task and date already existed; nothing was
    /// credited. Carries the existing entry.
    AlreadyRecorded(CompletionEntry),
}

impl PayoutOutcome {
    pub fn entry(&self) -> &CompletionEntry {
        match self {
            Self::Recorded(entry) | Self::AlreadyRecorded(entry) => entry,
        }
    }

    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded(_))
    }
}
