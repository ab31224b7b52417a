use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Connection, Executor, MySqlPool};

use crate::config::SalaryPolicy;
use crate::jobs::plan::{self, UserSnapshot};
use crate::model::notification::NewNotification;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RaiseOutcome {
    Raised { new_salary: f64 },
    /// The locked row was no longer due (already raised, at the ceiling, or gone).
    NotEligible,
}

/// Persistence used by the daily notification run.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn admin_ids(&self) -> anyhow::Result<Vec<u64>>;

    /// Every employee and admin.
    async fn users(&self) -> anyhow::Result<Vec<UserSnapshot>>;

    /// One delivery attempt: inside a transaction, lock any notification with
    /// the same recipient, related user, type and event date, and insert only
    /// when none exists.
    async fn deliver_once(
        &self,
        admin_id: u64,
        notification: &NewNotification,
    ) -> anyhow::Result<DeliveryOutcome>;

    /// Locks the user row, re-checks eligibility on the fresh values and
    /// applies one capped raise.
    async fn apply_raise(
        &self,
        user_id: u64,
        today: NaiveDate,
        policy: &SalaryPolicy,
    ) -> anyhow::Result<RaiseOutcome>;

    /// Deletes read notifications whose event date is on or before `cutoff`.
    async fn purge_read_before(&self, cutoff: NaiveDate) -> anyhow::Result<u64>;
}

#[derive(Clone)]
pub struct MySqlNotificationStore {
    pool: MySqlPool,
}

impl MySqlNotificationStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

/// The dedupe check locks a key that usually has no row yet. Only REPEATABLE
/// READ takes the gap lock that makes a concurrent run wait on it.
const DELIVERY_ISOLATION: &str = "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ";

const SNAPSHOT_COLUMNS: &str =
    "id, first_name, last_name, birth_date, salary, last_salary_increase_date, hire_date";

#[async_trait]
impl NotificationStore for MySqlNotificationStore {
    async fn admin_ids(&self) -> anyhow::Result<Vec<u64>> {
        let ids = sqlx::query_scalar::<_, u64>("SELECT id FROM users WHERE role = 'admin' ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn users(&self) -> anyhow::Result<Vec<UserSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM users WHERE role IN ('employee', 'admin') ORDER BY id"
        );
        let users = sqlx::query_as::<_, UserSnapshot>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn deliver_once(
        &self,
        admin_id: u64,
        notification: &NewNotification,
    ) -> anyhow::Result<DeliveryOutcome> {
        let mut conn = self.pool.acquire().await?;
        (&mut *conn).execute(DELIVERY_ISOLATION).await?;
        let mut tx = conn.begin().await?;

        let existing = sqlx::query_scalar::<_, u64>(
            r#"
            SELECT id
            FROM notifications
            WHERE user_id = ? AND related_user_id = ? AND type = ? AND event_date = ?
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(admin_id)
        .bind(notification.related_user_id)
        .bind(notification.kind.as_ref())
        .bind(notification.event_date)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_some() {
            tx.commit().await?;
            return Ok(DeliveryOutcome::AlreadyExists);
        }

        sqlx::query(
            r#"
            INSERT INTO notifications (message, user_id, related_user_id, type, event_date)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&notification.message)
        .bind(admin_id)
        .bind(notification.related_user_id)
        .bind(notification.kind.as_ref())
        .bind(notification.event_date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(DeliveryOutcome::Created)
    }

    async fn apply_raise(
        &self,
        user_id: u64,
        today: NaiveDate,
        policy: &SalaryPolicy,
    ) -> anyhow::Result<RaiseOutcome> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM users WHERE id = ? FOR UPDATE");
        let fresh = sqlx::query_as::<_, UserSnapshot>(&sql)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

        let new_salary = fresh
            .filter(|user| plan::raise_due(user, today, policy))
            .and_then(|user| plan::raised_salary(user.salary, policy));

        let Some(new_salary) = new_salary else {
            tx.rollback().await?;
            return Ok(RaiseOutcome::NotEligible);
        };

        sqlx::query("UPDATE users SET salary = ?, last_salary_increase_date = ? WHERE id = ?")
            .bind(new_salary)
            .bind(today)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(RaiseOutcome::Raised { new_salary })
    }

    async fn purge_read_before(&self, cutoff: NaiveDate) -> anyhow::Result<u64> {
        let result =
            sqlx::query("DELETE FROM notifications WHERE is_read = TRUE AND event_date <= ?")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
