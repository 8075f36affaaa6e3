//! Token accounts.
//!
//! Balances only move through an [`ExecutionPlan`]: payouts credit, purchases
//! and cash-outs debit, and administrators adjust. Each movement is recorded
//! as a [`Transaction`] in the same commit as the record that caused it.

pub mod balance;
pub mod plan;
pub mod transaction;

pub use balance::Balance;
pub use plan::{ExecutionPlan, Guard, Operation, PlanOutcome};
pub use transaction::{Adjustment, Transaction, TransactionKind};

pub(crate) fn hash_idempotency_key(key: &str) -> String {
    blake3::hash(key.as_bytes()).to_hex().to_string()
}
