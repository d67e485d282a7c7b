//! SQLite-backed entitlement store

use super::EntitlementStore;
use crate::error::{BillingError, Result};
use crate::model::{
    AdminOverview, ConsumedRun, Plan, Replacement, Subscription, UsageRecord, User, UserActivity,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

const SCHEMA: &str = include_str!("../../schema.sql");

const SUBSCRIPTION_COLUMNS: &str =
    "id, user_id, plan, runs_allowed, runs_remaining, expires_at, active, payment_id, created_at";

/// Entitlement store persisted in SQLite through a connection pool
#[derive(Clone)]
pub struct SqliteEntitlementStore {
    pool: SqlitePool,
}

impl SqliteEntitlementStore {
    /// Open (creating if needed) the database at `database_url` and apply the schema
    ///
    /// `sqlite::memory:` databases live on a single pooled connection so that
    /// every query sees the same data.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            ensure_parent_dir(database_url)?;
            options = options.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        info!("Connected to entitlement database at {}", database_url);

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Wrap an existing pool; the schema is applied on construction
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<()> {
        // sqlx executes one statement per query
        for statement in SCHEMA.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    async fn count(&self, sql: &str) -> Result<u64> {
        let (n,): (i64,) = sqlx::query_as(sql).fetch_one(&self.pool).await?;
        Ok(n as u64)
    }

    async fn grouped_counts(&self, sql: &str) -> Result<Vec<(String, u64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(k, n)| (k, n as u64)).collect())
    }
}

fn ensure_parent_dir(database_url: &str) -> Result<()> {
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BillingError::Config(format!(
                    "cannot create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }
    Ok(())
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| BillingError::CorruptRecord(format!("timestamp out of range: {ms}")))
}

fn parse_plan(raw: &str) -> Result<Plan> {
    raw.parse().map_err(BillingError::CorruptRecord)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn map_insert_error(err: sqlx::Error, what: &str) -> BillingError {
    if is_unique_violation(&err) {
        BillingError::DuplicateUser(what.to_string())
    } else {
        BillingError::Database(err)
    }
}

async fn insert_user_row(conn: &mut SqliteConnection, user: &User) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (id, username, email, credential_hash, created_at, last_login)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.credential_hash)
    .bind(to_millis(user.created_at))
    .bind(user.last_login.map(to_millis))
    .execute(&mut *conn)
    .await
    .map_err(|e| map_insert_error(e, &user.username))?;
    Ok(())
}

/// Insert `sub` as the active subscription; the caller has cleared any other
async fn insert_active_subscription(conn: &mut SqliteConnection, sub: &Subscription) -> Result<()> {
    sqlx::query(
        "INSERT INTO subscriptions
            (id, user_id, plan, runs_allowed, runs_remaining, expires_at, active, payment_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(&sub.id)
    .bind(&sub.user_id)
    .bind(sub.plan.as_str())
    .bind(i64::from(sub.runs_allowed))
    .bind(i64::from(sub.runs_remaining))
    .bind(sub.expires_at.map(to_millis))
    .bind(&sub.payment_id)
    .bind(to_millis(sub.created_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| match &sub.payment_id {
        Some(payment_id) if is_unique_violation(&e) => {
            BillingError::PaymentAlreadySettled(payment_id.clone())
        }
        _ => BillingError::Database(e),
    })?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    email: String,
    credential_hash: String,
    created_at: i64,
    last_login: Option<i64>,
}

impl TryFrom<UserRow> for User {
    type Error = BillingError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            credential_hash: row.credential_hash,
            created_at: from_millis(row.created_at)?,
            last_login: row.last_login.map(from_millis).transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: String,
    user_id: String,
    plan: String,
    runs_allowed: i64,
    runs_remaining: i64,
    expires_at: Option<i64>,
    active: bool,
    payment_id: Option<String>,
    created_at: i64,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = BillingError;

    fn try_from(row: SubscriptionRow) -> Result<Self> {
        let runs = |n: i64| {
            u32::try_from(n)
                .map_err(|_| BillingError::CorruptRecord(format!("run count out of range: {n}")))
        };
        Ok(Subscription {
            plan: parse_plan(&row.plan)?,
            runs_allowed: runs(row.runs_allowed)?,
            runs_remaining: runs(row.runs_remaining)?,
            expires_at: row.expires_at.map(from_millis).transpose()?,
            created_at: from_millis(row.created_at)?,
            id: row.id,
            user_id: row.user_id,
            active: row.active,
            payment_id: row.payment_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UsageRow {
    id: String,
    user_id: String,
    subscription_id: String,
    symbol: String,
    at: i64,
}

impl TryFrom<UsageRow> for UsageRecord {
    type Error = BillingError;

    fn try_from(row: UsageRow) -> Result<Self> {
        Ok(UsageRecord {
            at: from_millis(row.at)?,
            id: row.id,
            user_id: row.user_id,
            subscription_id: row.subscription_id,
            symbol: row.symbol,
        })
    }
}

#[async_trait]
impl EntitlementStore for SqliteEntitlementStore {
    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_user_row(&mut conn, user).await
    }

    #[instrument(skip(self, user, subscription), fields(username = %user.username, plan = %subscription.plan))]
    async fn create_user_with_subscription(
        &self,
        user: &User,
        mut subscription: Subscription,
    ) -> Result<Subscription> {
        let mut tx = self.pool.begin().await?;
        insert_user_row(&mut tx, user).await?;
        subscription.active = true;
        insert_active_subscription(&mut tx, &subscription).await?;
        tx.commit().await?;
        Ok(subscription)
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, credential_hash, created_at, last_login
             FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, credential_hash, created_at, last_login
             FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn update_credentials(&self, user_id: &str, credential_hash: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET credential_hash = ? WHERE id = ?")
            .bind(credential_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(BillingError::UserNotFound(user_id.to_string()));
        }
        Ok(())
    }

    async fn touch_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(to_millis(at))
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, user_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM usage_logs WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM subscriptions WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, credential_hash, created_at, last_login
             FROM users ORDER BY created_at, username",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(User::try_from)
        .collect()
    }

    async fn active_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = ? AND active = 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Subscription::try_from)
        .transpose()
    }

    async fn latest_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
             WHERE user_id = ? ORDER BY created_at DESC, rowid DESC LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Subscription::try_from)
        .transpose()
    }

    #[instrument(skip(self, new), fields(user_id = %new.user_id, plan = %new.plan))]
    async fn replace_active_subscription(
        &self,
        mut new: Subscription,
        carry_over: bool,
        now: DateTime<Utc>,
    ) -> Result<Replacement> {
        let mut tx = self.pool.begin().await?;

        // Writing first takes the write lock before anything is read
        let previous = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "UPDATE subscriptions SET active = 0 WHERE user_id = ? AND active = 1
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(&new.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Subscription::try_from)
        .transpose()?;

        let carried_over = match &previous {
            Some(prev) if carry_over && prev.runs_remaining > 0 && !prev.is_expired_at(now) => {
                prev.runs_remaining
            }
            _ => 0,
        };

        new.runs_allowed += carried_over;
        new.runs_remaining += carried_over;
        new.active = true;

        // A replayed payment fails here and the deactivation above rolls back
        insert_active_subscription(&mut tx, &new).await?;
        tx.commit().await?;

        debug!(carried_over, "Activated subscription {}", new.id);
        Ok(Replacement {
            previous,
            current: new,
            carried_over,
        })
    }

    #[instrument(skip(self))]
    async fn consume_run(&self, user_id: &str, now: DateTime<Utc>) -> Result<Option<ConsumedRun>> {
        // Check and decrement in one statement; the last run also deactivates
        let row: Option<(String, String, i64)> = sqlx::query_as(
            "UPDATE subscriptions
             SET runs_remaining = runs_remaining - 1,
                 active = CASE WHEN runs_remaining - 1 <= 0 THEN 0 ELSE 1 END
             WHERE user_id = ?
               AND active = 1
               AND runs_remaining > 0
               AND (expires_at IS NULL OR expires_at > ?)
             RETURNING id, plan, runs_remaining",
        )
        .bind(user_id)
        .bind(to_millis(now))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(subscription_id, plan, remaining)| {
            Ok(ConsumedRun {
                subscription_id,
                plan: parse_plan(&plan)?,
                remaining: u32::try_from(remaining).map_err(|_| {
                    BillingError::CorruptRecord(format!("run count out of range: {remaining}"))
                })?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self))]
    async fn deactivate_subscription(&self, subscription_id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE subscriptions SET active = 0 WHERE id = ? AND active = 1")
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn add_runs(&self, subscription_id: &str, runs: u32) -> Result<Option<Subscription>> {
        // Re-activation is decided in the same statement so the one-active index always holds
        sqlx::query_as::<_, SubscriptionRow>(&format!(
            "UPDATE subscriptions
             SET runs_allowed = runs_allowed + ?,
                 runs_remaining = runs_remaining + ?,
                 active = CASE
                     WHEN active = 1 THEN 1
                     WHEN EXISTS (
                         SELECT 1 FROM subscriptions other
                         WHERE other.user_id = subscriptions.user_id
                           AND other.active = 1
                           AND other.id <> subscriptions.id
                     ) THEN 0
                     ELSE 1
                 END
             WHERE id = ?
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(i64::from(runs))
        .bind(i64::from(runs))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Subscription::try_from)
        .transpose()
    }

    async fn record_usage(&self, record: &UsageRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO usage_logs (id, user_id, subscription_id, symbol, at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.subscription_id)
        .bind(&record.symbol)
        .bind(to_millis(record.at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn usage_for_user(&self, user_id: &str, limit: u32) -> Result<Vec<UsageRecord>> {
        sqlx::query_as::<_, UsageRow>(
            "SELECT id, user_id, subscription_id, symbol, at FROM usage_logs
             WHERE user_id = ? ORDER BY at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(UsageRecord::try_from)
        .collect()
    }

    async fn usage_count(&self, user_id: &str) -> Result<u64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM usage_logs WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions ORDER BY created_at DESC, rowid DESC"
        ))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Subscription::try_from)
        .collect()
    }

    async fn admin_overview(&self) -> Result<AdminOverview> {
        let by_plan = |rows: Vec<(String, u64)>| -> Result<BTreeMap<Plan, u64>> {
            rows.into_iter()
                .map(|(plan, n)| Ok((parse_plan(&plan)?, n)))
                .collect()
        };

        Ok(AdminOverview {
            total_users: self.count("SELECT COUNT(*) FROM users").await?,
            active_subscriptions: self
                .count("SELECT COUNT(*) FROM subscriptions WHERE active = 1")
                .await?,
            total_runs: self.count("SELECT COUNT(*) FROM usage_logs").await?,
            subscriptions_by_plan: by_plan(
                self.grouped_counts(
                    "SELECT plan, COUNT(*) FROM subscriptions WHERE active = 1 GROUP BY plan",
                )
                .await?,
            )?,
            runs_by_plan: by_plan(
                self.grouped_counts(
                    "SELECT s.plan, COUNT(*) FROM usage_logs u
                     JOIN subscriptions s ON s.id = u.subscription_id
                     GROUP BY s.plan",
                )
                .await?,
            )?,
            runs_by_symbol: self
                .grouped_counts("SELECT symbol, COUNT(*) FROM usage_logs GROUP BY symbol")
                .await?
                .into_iter()
                .collect(),
        })
    }

    async fn top_users(&self, limit: u32) -> Result<Vec<UserActivity>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT u.id, u.username, COUNT(*) AS runs
             FROM usage_logs l JOIN users u ON u.id = l.user_id
             GROUP BY u.id, u.username
             ORDER BY runs DESC, u.username
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, username, runs)| UserActivity {
                user_id,
                username,
                runs: runs as u64,
            })
            .collect())
    }

    async fn usage_by_day(&self) -> Result<BTreeMap<NaiveDate, u64>> {
        self.grouped_counts(
            "SELECT date(at / 1000, 'unixepoch') AS day, COUNT(*)
             FROM usage_logs GROUP BY day ORDER BY day",
        )
        .await?
        .into_iter()
        .map(|(day, n)| {
            NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                .map(|date| (date, n))
                .map_err(|e| BillingError::CorruptRecord(format!("usage day '{day}': {e}")))
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlanSpec;
    use crate::store::conformance;

    async fn memory_store() -> SqliteEntitlementStore {
        SqliteEntitlementStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let store = memory_store().await;
        store.init_schema().await.unwrap();
        assert!(store.pool().acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_users_round_trip() {
        conformance::users_round_trip(&memory_store().await).await;
    }

    #[tokio::test]
    async fn test_consume_until_exhausted() {
        conformance::consume_until_exhausted(&memory_store().await).await;
    }

    #[tokio::test]
    async fn test_expired_is_not_consumed() {
        conformance::expired_is_not_consumed(&memory_store().await).await;
    }

    #[tokio::test]
    async fn test_replacement() {
        conformance::replacement_with_and_without_carry_over(&memory_store().await).await;
    }

    #[tokio::test]
    async fn test_expired_runs_never_carry_over() {
        conformance::expired_runs_never_carry_over(&memory_store().await).await;
    }

    #[tokio::test]
    async fn test_usage_and_overview() {
        conformance::usage_and_overview(&memory_store().await).await;
    }

    #[tokio::test]
    async fn test_user_and_trial_stored_together() {
        conformance::user_and_trial_stored_together(&memory_store().await).await;
    }

    #[tokio::test]
    async fn test_settled_payment_cannot_be_reused() {
        conformance::settled_payment_cannot_be_reused(&memory_store().await).await;
    }

    #[tokio::test]
    async fn test_deactivate_and_add_runs() {
        conformance::deactivate_and_add_runs(&memory_store().await).await;
    }

    #[tokio::test]
    async fn test_usage_analytics() {
        conformance::usage_analytics(&memory_store().await).await;
    }

    #[tokio::test]
    async fn test_trial_insert_failure_leaves_no_user() {
        let store = memory_store().await;
        sqlx::query(
            "CREATE TRIGGER reject_subscriptions BEFORE INSERT ON subscriptions
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let user = conformance::user("lena");
        let trial = Subscription::activate(
            &user.id,
            conformance::spec(Plan::Trial, 3, Some(3)),
            None,
            conformance::t0(),
        );
        assert!(store.create_user_with_subscription(&user, trial).await.is_err());
        assert!(store.find_user(&user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_active_subscription_rejected_by_index() {
        let store = memory_store().await;
        let user = conformance::user("gina");
        store.insert_user(&user).await.unwrap();
        let spec = conformance::spec(Plan::Basic, 10, None);
        let sub = Subscription::activate(&user.id, spec, None, conformance::t0());
        store
            .replace_active_subscription(sub, false, conformance::t0())
            .await
            .unwrap();

        let result = sqlx::query(
            "INSERT INTO subscriptions
                (id, user_id, plan, runs_allowed, runs_remaining, active, created_at)
             VALUES ('manual', ?, 'basic', 1, 1, 1, 0)",
        )
        .bind(&user.id)
        .execute(store.pool())
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_last_run_granted_once() {
        let path = std::env::temp_dir().join(format!("fc-gate-{}.db", uuid::Uuid::new_v4()));
        let url = format!("sqlite://{}", path.display());
        let store = SqliteEntitlementStore::connect(&url).await.unwrap();

        let user = conformance::user("hank");
        store.insert_user(&user).await.unwrap();
        let spec = PlanSpec {
            plan: Plan::Trial,
            runs: 1,
            duration_days: Some(3),
            price_cents: 0,
        };
        let sub = Subscription::activate(&user.id, spec, None, conformance::t0());
        store
            .replace_active_subscription(sub, false, conformance::t0())
            .await
            .unwrap();

        let attempts = (0..8).map(|_| {
            let store = store.clone();
            let user_id = user.id.clone();
            tokio::spawn(async move { store.consume_run(&user_id, conformance::t0()).await })
        });
        let results = futures::future::join_all(attempts).await;

        let granted = results
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .filter(Option::is_some)
            .count();
        assert_eq!(granted, 1);

        let latest = store.latest_subscription(&user.id).await.unwrap().unwrap();
        assert_eq!(latest.runs_remaining, 0);
        assert!(!latest.active);

        store.pool().close().await;
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
        let _ = std::fs::remove_file(path.with_extension("db-shm"));
    }
}
