//! Timeliness-adjusted reward calculation.
//!
//! Pure and side-effect free: the engine hands in the base reward, the
//! effective due date and the completion date, and gets back the payable
//! amount together with the numbers that produced it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Tokens deducted per whole day a completion is late.
pub const DEFAULT_PENALTY_PER_DAY: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub base: u64,
    pub days_late: u64,
    pub penalty: u64,
    pub payable: u64,
}

/// The date lateness is measured against: the explicit due instant when one
/// is set, the tracker's nominal date otherwise.
pub fn effective_due_date(due_by: Option<DateTime<Utc>>, nominal: NaiveDate) -> NaiveDate {
    match due_by {
        Some(at) => at.date_naive(),
        None => nominal,
    }
}

pub fn days_late(due: NaiveDate, completed: NaiveDate) -> u64 {
    (completed - due).num_days().max(0) as u64
}

pub fn calculate(base: u64, due: NaiveDate, completed: NaiveDate, penalty_per_day: u64) -> Reward {
    let days_late = days_late(due, completed);
    let penalty = penalty_per_day.saturating_mul(days_late);

    Reward {
        base,
        days_late,
        penalty,
        payable: base.saturating_sub(penalty),
    }
}
