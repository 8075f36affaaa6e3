use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    Row, Sqlite,
    query::Query as SqlxQuery,
    sqlite::{
        SqliteArguments, SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions,
        SqliteRow,
    },
};
use uuid::Uuid;

use crate::{
    adapters::{Adapter, Filter, FilterValue, ObjectRecord},
    completion::{CompletionEntry, PayoutOutcome, TaskKey},
    error::{Error, Result},
    ledger::{
        Adjustment, Balance, ExecutionPlan, Guard, Operation, PlanOutcome, Transaction,
        TransactionKind,
    },
};

/// SQLite adapter. Domain records use the unified JSON storage model; the
/// ledger lives in typed tables so its invariants are enforced by the
/// database itself.
///
/// Schema:
/// ```sql
/// CREATE TABLE objects (
///     id BLOB PRIMARY KEY,
///     type TEXT NOT NULL,
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL,
///     data TEXT NOT NULL
/// );
///
/// CREATE TABLE accounts (
///     owner BLOB PRIMARY KEY,
///     balance INTEGER NOT NULL CHECK (balance >= 0),
///     updated_at TEXT NOT NULL
/// );
///
/// CREATE TABLE completions (
///     id BLOB PRIMARY KEY,
///     task_key TEXT NOT NULL,
///     completed_date TEXT NOT NULL,
///     data TEXT NOT NULL,
///     recorded_at TEXT NOT NULL,
///     UNIQUE (task_key, completed_date)
/// );
/// ```
/// plus `transactions` and `settings`.
///
/// Plans open with `BEGIN IMMEDIATE`, so concurrent debits queue on the write
/// lock and the loser sees the balance the winner left.
pub struct SqliteAdapter {
    pub(crate) pool: SqlitePool,
}

impl SqliteAdapter {
    /// Create a new SQLite adapter with a file-based database, creating the
    /// file if needed.
    pub async fn new_file(path: &str) -> Result<Self> {
        Self::connect(&format!("sqlite:{}", path), 5).await
    }

    /// Create a new SQLite adapter with an in-memory database
    pub async fn new_memory() -> Result<Self> {
        // Every connection to :memory: is its own database, so keep exactly
        // one alive for the lifetime of the pool.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok(Self { pool })
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS objects (
                id BLOB PRIMARY KEY,
                type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                data TEXT NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_objects_type ON objects(type)
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                owner BLOB PRIMARY KEY,
                balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS completions (
                id BLOB PRIMARY KEY,
                task_key TEXT NOT NULL,
                completed_date TEXT NOT NULL,
                data TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                UNIQUE (task_key, completed_date)
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id BLOB PRIMARY KEY,
                owner BLOB NOT NULL,
                credited INTEGER NOT NULL,
                debited INTEGER NOT NULL,
                kind TEXT NOT NULL,
                metadata TEXT NOT NULL,
                idempotency_key TEXT UNIQUE,
                actor BLOB,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_transactions_owner ON transactions(owner)
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn to_sql_amount(amount: u64) -> Result<i64> {
    i64::try_from(amount).map_err(|_| Error::Validation(format!("amount out of range: {}", amount)))
}

fn from_sql_amount(amount: i64) -> Result<u64> {
    u64::try_from(amount).map_err(|_| Error::Storage(format!("negative amount stored: {}", amount)))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(|e| Error::Serialize(e.to_string()))?
        .with_timezone(&Utc))
}

impl SqliteAdapter {
    fn map_row_to_object_record(row: SqliteRow) -> Result<ObjectRecord> {
        let data_str: String = row.try_get("data")?;
        let created_at_str: String = row.try_get("created_at")?;
        let updated_at_str: String = row.try_get("updated_at")?;

        Ok(ObjectRecord {
            id: row.try_get::<Uuid, _>("id")?,
            type_name: row.try_get::<String, _>("type")?,
            data: serde_json::from_str(&data_str)?,
            created_at: parse_timestamp(&created_at_str)?,
            updated_at: parse_timestamp(&updated_at_str)?,
        })
    }

    fn map_row_to_transaction(row: SqliteRow) -> Result<Transaction> {
        let kind: String = row.try_get("kind")?;
        let created_at_str: String = row.try_get("created_at")?;

        Ok(Transaction {
            id: row.try_get::<Uuid, _>("id")?,
            owner: row.try_get::<Uuid, _>("owner")?,
            credited: from_sql_amount(row.try_get("credited")?)?,
            debited: from_sql_amount(row.try_get("debited")?)?,
            kind: kind.parse::<TransactionKind>()?,
            metadata: row.try_get("metadata")?,
            idempotency_key: row.try_get("idempotency_key")?,
            actor: row.try_get::<Option<Uuid>, _>("actor")?,
            created_at: parse_timestamp(&created_at_str)?,
        })
    }

    fn bind_filter<'a>(
        query: SqlxQuery<'a, Sqlite, SqliteArguments<'a>>,
        filter: &Filter,
    ) -> SqlxQuery<'a, Sqlite, SqliteArguments<'a>> {
        let query = query.bind(filter.json_path());
        match &filter.value {
            FilterValue::Text(value) => query.bind(value.clone()),
            // json_extract yields 0/1 for JSON booleans
            FilterValue::Flag(value) => query.bind(i64::from(*value)),
        }
    }

    async fn fetch_object_in(
        conn: &mut SqliteConnection,
        type_name: &str,
        id: Uuid,
    ) -> Result<Option<ObjectRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, type, created_at, updated_at, data
            FROM objects
            WHERE id = ? AND type = ?
            "#,
        )
        .bind(id)
        .bind(type_name)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(Self::map_row_to_object_record).transpose()
    }

    async fn insert_object_in(conn: &mut SqliteConnection, record: &ObjectRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO objects (id, type, created_at, updated_at, data)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id)
        .bind(record.type_name.as_str())
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .bind(serde_json::to_string(&record.data)?)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Guarded write: when the guard rejects, report the record's current
    /// state rather than silently skipping.
    async fn update_object_in(
        conn: &mut SqliteConnection,
        record: &ObjectRecord,
        guard: Option<Guard>,
    ) -> Result<()> {
        let mut sql = String::from(
            "UPDATE objects SET data = ?, updated_at = ? WHERE id = ? AND type = ?",
        );
        let filter = guard.map(|g| g.filter());
        if filter.is_some() {
            sql.push_str(" AND json_extract(data, ?) = ?");
        }

        let mut query = sqlx::query(&sql)
            .bind(serde_json::to_string(&record.data)?)
            .bind(record.updated_at.to_rfc3339())
            .bind(record.id)
            .bind(record.type_name.as_str());
        if let Some(filter) = &filter {
            query = Self::bind_filter(query, filter);
        }

        let result = query.execute(&mut *conn).await?;
        if result.rows_affected() == 1 {
            return Ok(());
        }

        let current = Self::fetch_object_in(conn, &record.type_name, record.id).await?;
        match (current, guard) {
            (Some(current), Some(guard)) => Err(guard.violation(&current.data)),
            _ => Err(Error::not_found(&record.type_name, record.id)),
        }
    }

    async fn delete_object_in(
        conn: &mut SqliteConnection,
        type_name: &str,
        id: Uuid,
        guard: Option<Guard>,
    ) -> Result<bool> {
        let mut sql = String::from("DELETE FROM objects WHERE id = ? AND type = ?");
        let filter = guard.map(|g| g.filter());
        if filter.is_some() {
            sql.push_str(" AND json_extract(data, ?) = ?");
        }

        let mut query = sqlx::query(&sql).bind(id).bind(type_name);
        if let Some(filter) = &filter {
            query = Self::bind_filter(query, filter);
        }

        let result = query.execute(&mut *conn).await?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }

        match (Self::fetch_object_in(conn, type_name, id).await?, guard) {
            (Some(current), Some(guard)) => Err(guard.violation(&current.data)),
            _ => Ok(false),
        }
    }

    async fn balance_in(conn: &mut SqliteConnection, owner: Uuid) -> Result<u64> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM accounts WHERE owner = ?")
                .bind(owner)
                .fetch_optional(&mut *conn)
                .await?;

        balance.map(from_sql_amount).transpose().map(|b| b.unwrap_or(0))
    }

    async fn credit_in(
        conn: &mut SqliteConnection,
        owner: Uuid,
        amount: u64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (owner, balance, updated_at) VALUES (?, ?, ?)
            ON CONFLICT (owner) DO UPDATE SET
                balance = accounts.balance + excluded.balance,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(owner)
        .bind(to_sql_amount(amount)?)
        .bind(at.to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn set_balance_in(
        conn: &mut SqliteConnection,
        owner: Uuid,
        balance: u64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (owner, balance, updated_at) VALUES (?, ?, ?)
            ON CONFLICT (owner) DO UPDATE SET
                balance = excluded.balance,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(owner)
        .bind(to_sql_amount(balance)?)
        .bind(at.to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn debit_in(
        conn: &mut SqliteConnection,
        owner: Uuid,
        amount: u64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let sql_amount = to_sql_amount(amount)?;
        let result = sqlx::query(
            r#"
            UPDATE accounts SET balance = balance - ?, updated_at = ?
            WHERE owner = ? AND balance >= ?
            "#,
        )
        .bind(sql_amount)
        .bind(at.to_rfc3339())
        .bind(owner)
        .bind(sql_amount)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 1 || amount == 0 {
            return Ok(());
        }

        Err(Error::InsufficientBalance {
            requested: amount,
            available: Self::balance_in(conn, owner).await?,
        })
    }

    async fn record_transaction_in(
        conn: &mut SqliteConnection,
        tx: &Transaction,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions
                (id, owner, credited, debited, kind, metadata, idempotency_key, actor, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tx.id)
        .bind(tx.owner)
        .bind(to_sql_amount(tx.credited)?)
        .bind(to_sql_amount(tx.debited)?)
        .bind(tx.kind.as_str())
        .bind(tx.metadata.as_str())
        .bind(tx.idempotency_key.as_deref())
        .bind(tx.actor)
        .bind(at.to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn find_completion_in(
        conn: &mut SqliteConnection,
        task: &TaskKey,
        date: NaiveDate,
    ) -> Result<Option<CompletionEntry>> {
        let data: Option<String> = sqlx::query_scalar(
            "SELECT data FROM completions WHERE task_key = ? AND completed_date = ?",
        )
        .bind(task.as_key())
        .bind(date.to_string())
        .fetch_optional(&mut *conn)
        .await?;

        data.map(|raw| serde_json::from_str(&raw).map_err(Error::from))
            .transpose()
    }

    async fn payout_in(
        conn: &mut SqliteConnection,
        entry: &CompletionEntry,
        at: DateTime<Utc>,
    ) -> Result<PayoutOutcome> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO completions (id, task_key, completed_date, data, recorded_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (task_key, completed_date) DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(entry.task.as_key())
        .bind(entry.completed_date.to_string())
        .bind(serde_json::to_string(entry)?)
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;

        if inserted.rows_affected() == 0 {
            let existing = Self::find_completion_in(conn, &entry.task, entry.completed_date)
                .await?
                .ok_or_else(|| Error::Storage("completion conflict without a row".to_string()))?;
            return Ok(PayoutOutcome::AlreadyRecorded(existing));
        }

        if let Some(owner) = entry.assigned_user_id {
            Self::credit_in(conn, owner, entry.amount, at).await?;

            let tx = Transaction::credit(
                owner,
                entry.amount,
                TransactionKind::Payout,
                format!("{} ({})", entry.task_name, entry.completed_date),
            )
            .with_idempotency_key(entry.idempotency_key())
            .with_actor(entry.approved_by);
            Self::record_transaction_in(conn, &tx, at).await?;
        }

        Ok(PayoutOutcome::Recorded(entry.clone()))
    }

    async fn apply_in(
        conn: &mut SqliteConnection,
        op: &Operation,
        at: DateTime<Utc>,
        outcome: &mut PlanOutcome,
    ) -> Result<()> {
        match op {
            Operation::Insert { record } => Self::insert_object_in(conn, record).await,
            Operation::Update { record, guard } => {
                Self::update_object_in(conn, record, *guard).await
            }
            Operation::Delete {
                type_name,
                id,
                guard,
            } => Self::delete_object_in(conn, type_name, *id, *guard)
                .await
                .map(|_| ()),
            Operation::Payout { entry } => {
                let payout = Self::payout_in(conn, entry, at).await?;
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
                Self::debit_in(conn, *owner, *amount, at).await?;
                let tx = Transaction::debit(*owner, *amount, *kind, metadata.clone())
                    .with_actor(*actor);
                Self::record_transaction_in(conn, &tx, at).await
            }
            Operation::Adjust {
                owner,
                adjustment,
                actor,
                metadata,
            } => {
                let before = Self::balance_in(conn, *owner).await?;
                let after = adjustment.apply(before)?;
                Self::set_balance_in(conn, *owner, after, at).await?;

                let tx = Adjustment::transaction(before, after, *owner, *actor, metadata.clone());
                Self::record_transaction_in(conn, &tx, at).await
            }
        }
    }
}

#[async_trait]
impl Adapter for SqliteAdapter {
    async fn insert_object(&self, record: ObjectRecord) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_object_in(&mut conn, &record).await
    }

    async fn update_object(&self, record: ObjectRecord) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Self::update_object_in(&mut conn, &record, None).await
    }

    async fn fetch_object(
        &self,
        type_name: &'static str,
        id: Uuid,
    ) -> Result<Option<ObjectRecord>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_object_in(&mut conn, type_name, id).await
    }

    async fn fetch_objects(&self, type_name: &'static str) -> Result<Vec<ObjectRecord>> {
        self.query_objects(type_name, &[]).await
    }

    async fn query_objects(
        &self,
        type_name: &'static str,
        filters: &[Filter],
    ) -> Result<Vec<ObjectRecord>> {
        let mut sql =
            String::from("SELECT id, type, created_at, updated_at, data FROM objects WHERE type = ?");
        for _ in filters {
            sql.push_str(" AND json_extract(data, ?) = ?");
        }
        sql.push_str(" ORDER BY rowid");

        let mut query = sqlx::query(&sql).bind(type_name);
        for filter in filters {
            query = Self::bind_filter(query, filter);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(Self::map_row_to_object_record)
            .collect()
    }

    async fn delete_object(&self, type_name: &'static str, id: Uuid) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        Self::delete_object_in(&mut conn, type_name, id, None).await
    }

    async fn execute_plan(&self, plan: &ExecutionPlan) -> Result<PlanOutcome> {
        // Step 1: BEGIN, taking the write lock before any balance is read
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        // Step 2: verify balances for all debits up front
        for (owner, amount) in plan.calculate_locks() {
            let available = Self::balance_in(&mut tx, owner).await?;
            if available < amount {
                return Err(Error::InsufficientBalance {
                    requested: amount,
                    available,
                });
            }
        }

        // Step 3: execute; dropping `tx` on error rolls back
        let mut outcome = PlanOutcome::default();
        for op in plan.operations() {
            Self::apply_in(&mut tx, op, plan.timestamp(), &mut outcome).await?;
        }

        // Step 4: COMMIT
        tx.commit().await?;
        Ok(outcome)
    }

    async fn get_balance(&self, owner: Uuid) -> Result<Balance> {
        let mut conn = self.pool.acquire().await?;
        let available = Self::balance_in(&mut conn, owner).await?;
        Ok(Balance::new(owner, available))
    }

    async fn fetch_transactions(&self, owner: Uuid) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner, credited, debited, kind, metadata, idempotency_key, actor, created_at
            FROM transactions
            WHERE owner = ?
            ORDER BY rowid DESC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::map_row_to_transaction).collect()
    }

    async fn find_completion(
        &self,
        task: &TaskKey,
        date: NaiveDate,
    ) -> Result<Option<CompletionEntry>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_completion_in(&mut conn, task, date).await
    }

    async fn fetch_completions(&self) -> Result<Vec<CompletionEntry>> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT data FROM completions ORDER BY rowid DESC")
                .fetch_all(&self.pool)
                .await?;

        rows.iter()
            .map(|raw| serde_json::from_str(raw).map_err(Error::from))
            .collect()
    }

    async fn fetch_settings(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| -> Result<(String, String)> {
                Ok((row.try_get("key")?, row.try_get("value")?))
            })
            .collect()
    }

    async fn store_settings(&self, pairs: &[(String, String)]) -> Result<()> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let now = Utc::now().to_rfc3339();

        for (key, value) in pairs {
            sqlx::query(
                r#"
                INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
                ON CONFLICT (key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(key.as_str())
            .bind(value.as_str())
            .bind(now.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
