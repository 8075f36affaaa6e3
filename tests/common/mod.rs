#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chorebank::{
    Actor, Adapter, Adjustment, Balance, CompletionEntry, Engine, Error, Filter, FixedClock,
    ObjectRecord, Result, TaskKey, Transaction, User,
    adapters::memory::MemoryAdapter,
    ledger::{ExecutionPlan, PlanOutcome},
};
use uuid::Uuid;

/// A household of two administrators and one member, on a clock frozen at
/// 2026-05-10 09:00 UTC.
pub struct Household {
    pub engine: Engine,
    pub clock: Arc<FixedClock>,
    pub pat: User,
    pub lee: User,
    pub sam: User,
}

impl Household {
    pub fn pat(&self) -> Actor {
        self.pat.actor()
    }

    pub fn lee(&self) -> Actor {
        self.lee.actor()
    }

    pub fn sam(&self) -> Actor {
        self.sam.actor()
    }

    pub async fn fund(&self, user: &User, tokens: u64) {
        self.engine
            .adjust_balance(&self.pat(), user.id, Adjustment::Set(tokens), Some("seed"))
            .await
            .unwrap();
    }

    pub async fn balance(&self, user: &User) -> u64 {
        self.engine.balance(user.id).await.unwrap().available
    }

    pub async fn inbox(&self, user: &User) -> Vec<String> {
        self.engine
            .notifications(user.id, false)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.message)
            .collect()
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 10, 9, 0, 0).unwrap()
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub async fn household_with(adapter: Box<dyn Adapter>) -> Household {
    let clock = Arc::new(FixedClock::new(start()));
    let engine = Engine::builder(adapter).clock(clock.clone()).build();

    let pat = engine.create_user("Pat", true).await.unwrap();
    let lee = engine.create_user("Lee", true).await.unwrap();
    let sam = engine.create_user("Sam", false).await.unwrap();

    Household {
        engine,
        clock,
        pat,
        lee,
        sam,
    }
}

pub async fn household() -> Household {
    household_with(Box::new(MemoryAdapter::new())).await
}

/// Memory storage whose user reads fail while `outage` is set.
pub struct UserOutage {
    inner: MemoryAdapter,
    outage: Arc<AtomicBool>,
}

impl UserOutage {
    pub fn new(outage: Arc<AtomicBool>) -> Self {
        Self {
            inner: MemoryAdapter::new(),
            outage,
        }
    }

    fn check(&self, type_name: &str) -> Result<()> {
        if type_name == "user" && self.outage.load(Ordering::SeqCst) {
            return Err(Error::Storage("user table unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for UserOutage {
    async fn insert_object(&self, record: ObjectRecord) -> Result<()> {
        self.inner.insert_object(record).await
    }

    async fn update_object(&self, record: ObjectRecord) -> Result<()> {
        self.inner.update_object(record).await
    }

    async fn fetch_object(&self, type_name: &'static str, id: Uuid) -> Result<Option<ObjectRecord>> {
        self.check(type_name)?;
        self.inner.fetch_object(type_name, id).await
    }

    async fn fetch_objects(&self, type_name: &'static str) -> Result<Vec<ObjectRecord>> {
        self.check(type_name)?;
        self.inner.fetch_objects(type_name).await
    }

    async fn query_objects(
        &self,
        type_name: &'static str,
        filters: &[Filter],
    ) -> Result<Vec<ObjectRecord>> {
        self.check(type_name)?;
        self.inner.query_objects(type_name, filters).await
    }

    async fn delete_object(&self, type_name: &'static str, id: Uuid) -> Result<bool> {
        self.inner.delete_object(type_name, id).await
    }

    async fn execute_plan(&self, plan: &ExecutionPlan) -> Result<PlanOutcome> {
        self.inner.execute_plan(plan).await
    }

    async fn get_balance(&self, owner: Uuid) -> Result<Balance> {
        self.inner.get_balance(owner).await
    }

    async fn fetch_transactions(&self, owner: Uuid) -> Result<Vec<Transaction>> {
        self.inner.fetch_transactions(owner).await
    }

    async fn find_completion(
        &self,
        task: &TaskKey,
        date: NaiveDate,
    ) -> Result<Option<CompletionEntry>> {
        self.inner.find_completion(task, date).await
    }

    async fn fetch_completions(&self) -> Result<Vec<CompletionEntry>> {
        self.inner.fetch_completions().await
    }

    async fn fetch_settings(&self) -> Result<HashMap<String, String>> {
        self.inner.fetch_settings().await
    }

    async fn store_settings(&self, pairs: &[(String, String)]) -> Result<()> {
        self.inner.store_settings(pairs).await
    }
}

/// A household whose user reads can be switched off mid-test.
pub async fn household_with_outage() -> (Household, Arc<AtomicBool>) {
    let outage = Arc::new(AtomicBool::new(false));
    let h = household_with(Box::new(UserOutage::new(outage.clone()))).await;
    (h, outage)
}
