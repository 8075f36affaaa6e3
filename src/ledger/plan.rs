use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    adapters::{Filter, ObjectRecord},
    completion::{CompletionEntry, PayoutOutcome},
    error::{Error, Result},
    ledger::{Adjustment, TransactionKind},
    object::Object,
};

/// Precondition on a stored record, checked and written under the same lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// `status` must still equal the given value.
    Status(&'static str),
    /// `completed` must still be false.
    Open,
}

impl Guard {
    pub fn filter(&self) -> Filter {
        match self {
            Self::Status(status) => Filter::text("status", *status),
            Self::Open => Filter::flag("completed", false),
        }
    }

    pub fn holds(&self, data: &serde_json::Value) -> bool {
        self.filter().matches(data)
    }

    /// The error for a record whose current body fails this guard.
    pub fn violation(&self, current: &serde_json::Value) -> Error {
        match self {
            Self::Status(expected) => {
                let actual = current
                    .get("status")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                Error::state(expected, actual)
            }
            Self::Open => Error::state("open", "completed"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Operation {
    Insert {
        record: ObjectRecord,
    },
    Update {
        record: ObjectRecord,
        guard: Option<Guard>,
    },
    Delete {
        type_name: &'static str,
        id: Uuid,
        guard: Option<Guard>,
    },
    /// Record a completion and credit its amount, unless an entry for the
    /// same task and date already exists.
    Payout {
        entry: CompletionEntry,
    },
    Debit {
        owner: Uuid,
        amount: u64,
        kind: TransactionKind,
        metadata: String,
        actor: Option<Uuid>,
    },
    Adjust {
        owner: Uuid,
        adjustment: Adjustment,
        actor: Uuid,
        metadata: String,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Payout { .. } => "payout",
            Self::Debit { .. } => "debit",
            Self::Adjust { .. } => "adjust",
        }
    }
}

/// Ordered set of writes an adapter applies all-or-nothing.
///
/// Adapters MUST:
/// 1. open one transaction (or lock the whole store)
/// 2. verify every owner in `calculate_locks()` holds at least the summed
///    debit amount, returning `InsufficientBalance` otherwise
/// 3. apply the operations in order, failing on any violated guard
/// 4. commit only if every operation succeeded
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    operations: Vec<Operation>,
    timestamp: DateTime<Utc>,
}

impl ExecutionPlan {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            operations: Vec::new(),
            timestamp,
        }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn add(&mut self, op: Operation) -> &mut Self {
        self.operations.push(op);
        self
    }

    pub fn insert<T: Object>(&mut self, obj: &T) -> Result<&mut Self> {
        let record = ObjectRecord::from_object(obj, self.timestamp)?;
        Ok(self.add(Operation::Insert { record }))
    }

    pub fn update<T: Object>(&mut self, obj: &T, guard: Option<Guard>) -> Result<&mut Self> {
        let record = ObjectRecord::from_object(obj, self.timestamp)?;
        Ok(self.add(Operation::Update { record, guard }))
    }

    pub fn delete<T: Object>(&mut self, id: Uuid, guard: Option<Guard>) -> &mut Self {
        self.add(Operation::Delete {
            type_name: T::TYPE,
            id,
            guard,
        })
    }

    pub fn payout(&mut self, entry: CompletionEntry) -> &mut Self {
        self.add(Operation::Payout { entry })
    }

    pub fn debit(
        &mut self,
        owner: Uuid,
        amount: u64,
        kind: TransactionKind,
        metadata: impl Into<String>,
        actor: Option<Uuid>,
    ) -> &mut Self {
        self.add(Operation::Debit {
            owner,
            amount,
            kind,
            metadata: metadata.into(),
            actor,
        })
    }

    pub fn adjust(
        &mut self,
        owner: Uuid,
        adjustment: Adjustment,
        actor: Uuid,
        metadata: impl Into<String>,
    ) -> &mut Self {
        self.add(Operation::Adjust {
            owner,
            adjustment,
            actor,
            metadata: metadata.into(),
        })
    }

    /// Total debit per owner.
    pub fn calculate_locks(&self) -> Vec<(Uuid, u64)> {
        let mut locks: HashMap<Uuid, u64> = HashMap::new();

        for op in &self.operations {
            if let Operation::Debit { owner, amount, .. } = op {
                let entry = locks.entry(*owner).or_insert(0);
                *entry = entry.saturating_add(*amount);
            }
        }

        let mut locks: Vec<_> = locks.into_iter().collect();
        // Stable lock order across concurrent plans
        locks.sort_by_key(|(owner, _)| *owner);
        locks
    }
}

/// What an executed plan produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanOutcome {
    pub payouts: Vec<PayoutOutcome>,
}

impl PlanOutcome {
    pub fn first_payout(&self) -> Option<&PayoutOutcome> {
        self.payouts.first()
    }
}
