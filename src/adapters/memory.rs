use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
    adapters::{Adapter, Filter, ObjectRecord},
    completion::{CompletionEntry, PayoutOutcome, TaskKey},
    error::{Error, Result},
    ledger::{
        Adjustment, Balance, ExecutionPlan, Guard, Operation, PlanOutcome, Transaction,
        TransactionKind,
    },
};

#[derive(Debug, Clone)]
struct Stored {
    seq: u64,
    record: ObjectRecord,
}

#[derive(Debug, Clone, Default)]
struct MemoryStore {
    objects: HashMap<String, HashMap<Uuid, Stored>>,
    next_seq: u64,
    balances: HashMap<Uuid, u64>,
    transactions: Vec<Transaction>,
    completions: Vec<CompletionEntry>,
    settings: HashMap<String, String>,
}

impl MemoryStore {
    fn table(&mut self, type_name: &str) -> &mut HashMap<Uuid, Stored> {
        self.objects.entry(type_name.to_string()).or_default()
    }

    fn ordered(&self, type_name: &str) -> Vec<ObjectRecord> {
        let Some(table) = self.objects.get(type_name) else {
            return Vec::new();
        };
        let mut rows: Vec<&Stored> = table.values().collect();
        rows.sort_by_key(|stored| stored.seq);
        rows.into_iter().map(|stored| stored.record.clone()).collect()
    }

    fn insert(&mut self, record: ObjectRecord) -> Result<()> {
        let seq = self.next_seq;
        let table = self.table(&record.type_name);
        if table.contains_key(&record.id) {
            return Err(Error::Storage(format!(
                "duplicate {} id {}",
                record.type_name, record.id
            )));
        }
        table.insert(record.id, Stored { seq, record });
        self.next_seq += 1;
        Ok(())
    }

    fn update(&mut self, record: ObjectRecord, guard: Option<Guard>) -> Result<()> {
        let table = self.table(&record.type_name);
        let stored = table
            .get_mut(&record.id)
            .ok_or_else(|| Error::not_found(&record.type_name, record.id))?;

        if let Some(guard) = guard {
            if !guard.holds(&stored.record.data) {
                return Err(guard.violation(&stored.record.data));
            }
        }

        stored.record.data = record.data;
        stored.record.updated_at = record.updated_at;
        Ok(())
    }

    fn delete(
        &mut self,
        type_name: &str,
        id: Uuid,
        guard: Option<Guard>,
    ) -> Result<bool> {
        let table = self.table(type_name);
        if let (Some(guard), Some(stored)) = (guard, table.get(&id)) {
            if !guard.holds(&stored.record.data) {
                return Err(guard.violation(&stored.record.data));
            }
        }
        Ok(table.remove(&id).is_some())
    }

    fn balance(&self, owner: Uuid) -> u64 {
        self.balances.get(&owner).copied().unwrap_or(0)
    }

    fn find_completion(&self, task: &TaskKey, date: NaiveDate) -> Option<&CompletionEntry> {
        self.completions
            .iter()
            .find(|entry| entry.task == *task && entry.completed_date == date)
    }

    fn push_transaction(&mut self, mut tx: Transaction, at: DateTime<Utc>) {
        tx.created_at = at;
        self.transactions.push(tx);
    }

    fn payout(&mut self, entry: &CompletionEntry, at: DateTime<Utc>) -> Result<PayoutOutcome> {
        if let Some(existing) = self.find_completion(&entry.task, entry.completed_date) {
            return Ok(PayoutOutcome::AlreadyRecorded(existing.clone()));
        }

        self.completions.push(entry.clone());

        if let Some(owner) = entry.assigned_user_id {
            let balance = self.balances.entry(owner).or_insert(0);
            *balance = balance
                .checked_add(entry.amount)
                .ok_or_else(|| Error::Validation("balance overflow".to_string()))?;

            let tx = Transaction::credit(
                owner,
                entry.amount,
                TransactionKind::Payout,
                format!("{} ({})", entry.task_name, entry.completed_date),
            )
            .with_idempotency_key(entry.idempotency_key())
            .with_actor(entry.approved_by);
            self.push_transaction(tx, at);
        }

        Ok(PayoutOutcome::Recorded(entry.clone()))
    }

    fn apply(&mut self, op: &Operation, at: DateTime<Utc>, outcome: &mut PlanOutcome) -> Result<()> {
        match op {
            Operation::Insert { record } => self.insert(record.clone()),
            Operation::Update { record, guard } => self.update(record.clone(), *guard),
            Operation::Delete {
                type_name,
                id,
                guard,
            } => self.delete(type_name, *id, *guard).map(|_| ()),
            Operation::Payout { entry } => {
                let payout = self.payout(entry, at)?;
                outcome.payouts.push(payout);
                Ok(())
            }
            Operation::Debit {
                owner,
                amount,
                kind,
                metadata,
                actor,
            } => {
                let available = self.balance(*owner);
                let remaining =
                    available
                        .checked_sub(*amount)
                        .ok_or(Error::InsufficientBalance {
                            requested: *amount,
                            available,
                        })?;
                self.balances.insert(*owner, remaining);

                let tx = Transaction::debit(*owner, *amount, *kind, metadata.clone())
                    .with_actor(*actor);
                self.push_transaction(tx, at);
                Ok(())
            }
            Operation::Adjust {
                owner,
                adjustment,
                actor,
                metadata,
            } => {
                let before = self.balance(*owner);
                let after = adjustment.apply(before)?;
                self.balances.insert(*owner, after);

                let tx = Adjustment::transaction(before, after, *owner, *actor, metadata.clone());
                self.push_transaction(tx, at);
                Ok(())
            }
        }
    }
}

/// Keeps everything in process memory. Plans are applied to a staged copy of
/// the store which replaces the live one only when every operation succeeds.
#[derive(Clone, Default)]
pub struct MemoryAdapter {
    store: Arc<Mutex<MemoryStore>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStore> {
        self.store.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn insert_object(&self, record: ObjectRecord) -> Result<()> {
        self.lock().insert(record)
    }

    async fn update_object(&self, record: ObjectRecord) -> Result<()> {
        self.lock().update(record, None)
    }

    async fn fetch_object(
        &self,
        type_name: &'static str,
        id: Uuid,
    ) -> Result<Option<ObjectRecord>> {
        Ok(self
            .lock()
            .objects
            .get(type_name)
            .and_then(|table| table.get(&id))
            .map(|stored| stored.record.clone()))
    }

    async fn fetch_objects(&self, type_name: &'static str) -> Result<Vec<ObjectRecord>> {
        Ok(self.lock().ordered(type_name))
    }

    async fn query_objects(
        &self,
        type_name: &'static str,
        filters: &[Filter],
    ) -> Result<Vec<ObjectRecord>> {
        let mut records = self.lock().ordered(type_name);
        records.retain(|record| filters.iter().all(|f| f.matches(&record.data)));
        Ok(records)
    }

    async fn delete_object(&self, type_name: &'static str, id: Uuid) -> Result<bool> {
        self.lock().delete(type_name, id, None)
    }

    async fn execute_plan(&self, plan: &ExecutionPlan) -> Result<PlanOutcome> {
        let mut store = self.lock();
        let mut staged = store.clone();

        // Step 1: verify every debited owner can cover the summed debit
        for (owner, amount) in plan.calculate_locks() {
            let available = staged.balance(owner);
            if available < amount {
                return Err(Error::InsufficientBalance {
                    requested: amount,
                    available,
                });
            }
        }

        // Step 2: apply in order against the staged copy
        let mut outcome = PlanOutcome::default();
        for op in plan.operations() {
            staged.apply(op, plan.timestamp(), &mut outcome)?;
        }

        // Step 3: commit
        *store = staged;
        Ok(outcome)
    }

    async fn get_balance(&self, owner: Uuid) -> Result<Balance> {
        Ok(Balance::new(owner, self.lock().balance(owner)))
    }

    async fn fetch_transactions(&self, owner: Uuid) -> Result<Vec<Transaction>> {
        Ok(self
            .lock()
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.owner == owner)
            .cloned()
            .collect())
    }

    async fn find_completion(
        &self,
        task: &TaskKey,
        date: NaiveDate,
    ) -> Result<Option<CompletionEntry>> {
        Ok(self.lock().find_completion(task, date).cloned())
    }

    async fn fetch_completions(&self) -> Result<Vec<CompletionEntry>> {
        Ok(self.lock().completions.iter().rev().cloned().collect())
    }

    async fn fetch_settings(&self) -> Result<HashMap<String, String>> {
        Ok(self.lock().settings.clone())
    }

    async fn store_settings(&self, pairs: &[(String, String)]) -> Result<()> {
        let mut store = self.lock();
        for (key, value) in pairs {
            store.settings.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}
