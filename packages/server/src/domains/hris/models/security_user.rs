use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::common::clock;
use crate::common::AppResult;

/// Local replica of an HRIS security (directory) account.
///
/// `is_deleted`/`is_locked` mirror the directory; the replicator's status
/// sync derives `User.is_active` from them for HRIS-sourced users.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct SecurityUser {
    pub id: Uuid,
    pub user_name: String,
    pub hris_employee_id: Option<i64>,
    pub employee_id: Option<i64>,
    pub is_deleted: bool,
    pub is_locked: bool,
    pub synced_at: DateTime<Utc>,
}

impl SecurityUser {
    /// Replication upsert by user name.
    pub async fn upsert(
        user_name: &str,
        hris_employee_id: Option<i64>,
        is_deleted: bool,
        is_locked: bool,
        conn: &mut PgConnection,
    ) -> AppResult<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO security_users (
                id, user_name, hris_employee_id, employee_id, is_deleted, is_locked, synced_at
             )
             VALUES ($1, $2, $3, NULL, $4, $5, $6)
             ON CONFLICT (user_name) DO UPDATE SET
                 hris_employee_id = EXCLUDED.hris_employee_id,
                 is_deleted = EXCLUDED.is_deleted,
                 is_locked = EXCLUDED.is_locked,
                 synced_at = EXCLUDED.synced_at
             RETURNING *",
        )
        .bind(clock::db_id())
        .bind(user_name)
        .bind(hris_employee_id)
        .bind(is_deleted)
        .bind(is_locked)
        .bind(clock::now())
        .fetch_one(conn)
        .await
        .map_err(Into::into)
    }

    /// Deactivation sweep: everything is presumed gone until the upsert pass
    /// proves otherwise.
    pub async fn mark_all_deleted(conn: &mut PgConnection) -> AppResult<u64> {
        let affected = sqlx::query(
            "UPDATE security_users SET is_deleted = true WHERE is_deleted = false",
        )
        .execute(conn)
        .await?
        .rows_affected();
        Ok(affected)
    }

    /// Linking sub-pass: point `employee_id` at local employees where the
    /// HRIS employee id resolved.
    pub async fn link_employees(conn: &mut PgConnection) -> AppResult<u64> {
        let linked = sqlx::query(
            "UPDATE security_users su
             SET employee_id = su.hris_employee_id
             FROM employees e
             WHERE su.hris_employee_id IS NOT NULL
               AND su.employee_id IS DISTINCT FROM su.hris_employee_id
               AND e.id = su.hris_employee_id",
        )
        .execute(conn)
        .await?
        .rows_affected();
        Ok(linked)
    }

    pub async fn list_linked(conn: &mut PgConnection) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM security_users WHERE employee_id IS NOT NULL ORDER BY user_name",
        )
        .fetch_all(conn)
        .await
        .map_err(Into::into)
    }
}
