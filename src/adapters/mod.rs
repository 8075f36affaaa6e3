pub mod memory;
pub mod record;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
pub use record::*;
use uuid::Uuid;

use crate::{
    completion::{CompletionEntry, TaskKey},
    error::Result,
    ledger::{Balance, ExecutionPlan, PlanOutcome, Transaction},
};

/// -----------------------------
/// Adapter contract
/// -----------------------------
///
/// Plain object writes are for records with no workflow or balance effect
/// (catalog entries, users, notifications). Anything that moves tokens or
/// depends on a record's current status goes through `execute_plan`.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    /* ---------------- OBJECTS ---------------- */
    async fn insert_object(&self, record: ObjectRecord) -> Result<()>;
    /// Replaces the body of an existing record. `NotFound` if there is none.
    async fn update_object(&self, record: ObjectRecord) -> Result<()>;
    async fn fetch_object(&self, type_name: &'static str, id: Uuid)
    -> Result<Option<ObjectRecord>>;
    /// All records of a type in insertion order.
    async fn fetch_objects(&self, type_name: &'static str) -> Result<Vec<ObjectRecord>>;
    /// Records of a type matching every filter, in insertion order.
    async fn query_objects(
        &self,
        type_name: &'static str,
        filters: &[Filter],
    ) -> Result<Vec<ObjectRecord>>;
    async fn delete_object(&self, type_name: &'static str, id: Uuid) -> Result<bool>;

    /* ---------------- PLANS ---------------- */
    /// Apply the plan atomically. See [`ExecutionPlan`] for the contract.
    async fn execute_plan(&self, plan: &ExecutionPlan) -> Result<PlanOutcome>;

    /* ---------------- LEDGER READS ---------------- */
    async fn get_balance(&self, owner: Uuid) -> Result<Balance>;
    /// Newest first.
    async fn fetch_transactions(&self, owner: Uuid) -> Result<Vec<Transaction>>;
    async fn find_completion(
        &self,
        task: &TaskKey,
        date: NaiveDate,
    ) -> Result<Option<CompletionEntry>>;
    /// Newest first.
    async fn fetch_completions(&self) -> Result<Vec<CompletionEntry>>;

    /* ---------------- SETTINGS ---------------- */
    async fn fetch_settings(&self) -> Result<HashMap<String, String>>;
    /// Last write wins.
    async fn store_settings(&self, pairs: &[(String, String)]) -> Result<()>;
}
