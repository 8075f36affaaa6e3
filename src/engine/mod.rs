mod accounts;
mod catalog;
mod notifications;
mod projects;
mod store;
mod trackers;

pub use trackers::TrackerUpdate;

use std::sync::Arc;

use metrics::counter;
use uuid::Uuid;

use crate::{
    adapters::{Adapter, Filter, ObjectRecord},
    clock::{Clock, SystemClock},
    error::{Error, Result},
    events::{self, DomainEvent, NotificationSink, StoreNotifier},
    ledger::{ExecutionPlan, PlanOutcome},
    object::{Object, User},
    settings::{SettingDefaults, Settings},
};

/// Entry point for every workflow operation.
///
/// Cheap to clone; clones share the adapter, clock and notification sink.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    adapter: Arc<dyn Adapter>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
    defaults: SettingDefaults,
}

pub struct EngineBuilder {
    adapter: Arc<dyn Adapter>,
    clock: Option<Arc<dyn Clock>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    defaults: SettingDefaults,
}

impl EngineBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the default sink, which stores notifications through the
    /// adapter.
    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn defaults(mut self, defaults: SettingDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn build(self) -> Engine {
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(StoreNotifier::new(Arc::clone(&self.adapter))));

        Engine {
            inner: Arc::new(Inner {
                adapter: self.adapter,
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                notifier,
                defaults: self.defaults,
            }),
        }
    }
}

impl Engine {
    pub fn new(adapter: Box<dyn Adapter>) -> Self {
        Self::builder(adapter).build()
    }

    pub fn builder(adapter: Box<dyn Adapter>) -> EngineBuilder {
        EngineBuilder {
            adapter: adapter.into(),
            clock: None,
            notifier: None,
            defaults: SettingDefaults::default(),
        }
    }

    /// Open the configured SQLite database, creating the schema if needed.
    #[cfg(feature = "sqlite")]
    pub async fn connect(config: &crate::config::Config) -> Result<Self> {
        let adapter =
            crate::adapters::sqlite::SqliteAdapter::connect(&config.database_url, config.max_connections)
                .await?;
        adapter.init_schema().await?;

        tracing::info!(url = %config.database_url, "chorebank storage ready");
        Ok(Self::builder(Box::new(adapter))
            .defaults(config.defaults)
            .build())
    }

    /// Get adapter reference
    pub fn adapter(&self) -> &dyn Adapter {
        self.inner.adapter.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }

    // ==================== Users ====================

    pub async fn create_user(&self, name: &str, is_admin: bool) -> Result<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("user name is required".to_string()));
        }

        let mut user = User::new(name, is_admin);
        user.created_at = self.now();
        self.insert(&user).await?;
        Ok(user)
    }

    pub async fn fetch_user(&self, id: Uuid) -> Result<User> {
        self.fetch::<User>(id).await
    }

    pub async fn administrators(&self) -> Result<Vec<User>> {
        self.query::<User>(&[Filter::flag("is_admin", true)]).await
    }

    // ==================== Internals ====================

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.inner.clock.now()
    }

    pub(crate) fn plan(&self) -> ExecutionPlan {
        ExecutionPlan::new(self.now())
    }

    /// Execute a plan, counting the result by label.
    pub(crate) async fn run(
        &self,
        plan: &ExecutionPlan,
        label: &'static str,
    ) -> Result<PlanOutcome> {
        match self.inner.adapter.execute_plan(plan).await {
            Ok(outcome) => {
                counter!("chorebank.plan.total", "plan" => label, "status" => "committed")
                    .increment(1);
                Ok(outcome)
            }
            Err(err) => {
                counter!("chorebank.plan.total", "plan" => label, "status" => "rejected")
                    .increment(1);
                let operations: Vec<&str> =
                    plan.operations().iter().map(|op| op.name()).collect();
                if err.is_retryable() {
                    tracing::warn!(
                        plan = label,
                        ?operations,
                        error = %err,
                        "plan failed in storage"
                    );
                } else {
                    tracing::debug!(plan = label, ?operations, error = %err, "plan rejected");
                }
                Err(err)
            }
        }
    }

    /// Snapshot of the runtime settings for one operation.
    pub(crate) async fn settings(&self) -> Result<Settings> {
        let raw = self.inner.adapter.fetch_settings().await?;
        Ok(Settings::from_raw(&raw, &self.inner.defaults))
    }

    pub(crate) async fn notify(&self, event: DomainEvent) {
        events::dispatch(self.inner.notifier.as_ref(), &event).await;
    }

    pub(crate) async fn fetch_opt<T: Object>(&self, id: Uuid) -> Result<Option<T>> {
        self.inner
            .adapter
            .fetch_object(T::TYPE, id)
            .await?
            .map(ObjectRecord::to_object)
            .transpose()
    }

    pub(crate) async fn fetch<T: Object>(&self, id: Uuid) -> Result<T> {
        self.fetch_opt::<T>(id)
            .await?
            .ok_or_else(|| Error::not_found(T::TYPE, id))
    }

    pub(crate) async fn list<T: Object>(&self) -> Result<Vec<T>> {
        self.inner
            .adapter
            .fetch_objects(T::TYPE)
            .await?
            .into_iter()
            .map(ObjectRecord::to_object)
            .collect()
    }

    pub(crate) async fn query<T: Object>(&self, filters: &[Filter]) -> Result<Vec<T>> {
        self.inner
            .adapter
            .query_objects(T::TYPE, filters)
            .await?
            .into_iter()
            .map(ObjectRecord::to_object)
            .collect()
    }

    pub(crate) async fn insert<T: Object>(&self, obj: &T) -> Result<()> {
        self.inner
            .adapter
            .insert_object(ObjectRecord::from_object(obj, self.now())?)
            .await
    }

    pub(crate) async fn save<T: Object>(&self, obj: &T) -> Result<()> {
        self.inner
            .adapter
            .update_object(ObjectRecord::from_object(obj, self.now())?)
            .await
    }

    pub(crate) async fn remove<T: Object>(&self, id: Uuid) -> Result<()> {
        if self.inner.adapter.delete_object(T::TYPE, id).await? {
            Ok(())
        } else {
            Err(Error::not_found(T::TYPE, id))
        }
    }

    /// Display name for a user id, if the user still exists.
    pub(crate) async fn user_name(&self, id: Option<Uuid>) -> Result<Option<String>> {
        match id {
            Some(id) => Ok(self.fetch_opt::<User>(id).await?.map(|u| u.name)),
            None => Ok(None),
        }
    }

    // ==================== Notification lookups ====================
    //
    // These run after a plan has committed, so a failed read is logged and
    // degraded rather than returned.

    pub(crate) async fn display_name(&self, id: Option<Uuid>, fallback: &str) -> String {
        match self.user_name(id).await {
            Ok(Some(name)) => name,
            Ok(None) => fallback.to_string(),
            Err(err) => {
                tracing::warn!(user = ?id, error = %err, "name lookup failed, using fallback");
                fallback.to_string()
            }
        }
    }

    /// Every administrator except `actor`; nobody when the lookup fails.
    pub(crate) async fn other_administrators(&self, actor: Uuid) -> Vec<Uuid> {
        match self.administrators().await {
            Ok(admins) => admins
                .into_iter()
                .map(|admin| admin.id)
                .filter(|id| *id != actor)
                .collect(),
            Err(err) => {
                tracing::warn!(
                    actor = %actor,
                    error = %err,
                    "administrator lookup failed, nobody notified"
                );
                Vec::new()
            }
        }
    }
}
