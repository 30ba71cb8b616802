use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::clock;
use crate::common::AppResult;

/// One authentication attempt, successful or not.
#[derive(Debug, Clone)]
pub struct LogAuthentication {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub username: String,
    pub success: bool,
    pub ip_address: Option<String>,
    pub device_info: Option<String>,
    pub result: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl LogAuthentication {
    pub fn new(
        user_id: Option<Uuid>,
        username: &str,
        success: bool,
        ip_address: Option<&str>,
        device_info: Option<&str>,
        result: serde_json::Value,
    ) -> Self {
        Self {
            id: clock::db_id(),
            user_id,
            username: username.to_string(),
            success,
            ip_address: ip_address.map(str::to_string),
            device_info: device_info.map(str::to_string),
            result,
            created_at: clock::now(),
        }
    }

    pub async fn insert(&self, pool: &PgPool) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO log_authentication (
                id, user_id, username, success, ip_address, device_info, result, created_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(self.id)
        .bind(self.user_id)
        .bind(&self.username)
        .bind(self.success)
        .bind(&self.ip_address)
        .bind(&self.device_info)
        .bind(&self.result)
        .bind(self.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}

/// Meal-request lifecycle event.
#[derive(Debug, Clone)]
pub struct LogMealRequest {
    pub id: Uuid,
    pub meal_request_id: i64,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl LogMealRequest {
    pub fn new(
        meal_request_id: i64,
        actor_id: Option<Uuid>,
        action: &str,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: clock::db_id(),
            meal_request_id,
            actor_id,
            action: action.to_string(),
            old_value,
            new_value,
            created_at: clock::now(),
        }
    }

    pub async fn insert(&self, pool: &PgPool) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO log_meal_request (
                id, meal_request_id, actor_id, action, old_value, new_value, created_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(self.id)
        .bind(self.meal_request_id)
        .bind(self.actor_id)
        .bind(&self.action)
        .bind(&self.old_value)
        .bind(&self.new_value)
        .bind(self.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}

/// User administration event.
#[derive(Debug, Clone)]
pub struct LogUser {
    pub id: Uuid,
    pub user_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl LogUser {
    pub fn new(
        user_id: Uuid,
        actor_id: Option<Uuid>,
        action: &str,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: clock::db_id(),
            user_id,
            actor_id,
            action: action.to_string(),
            old_value,
            new_value,
            created_at: clock::now(),
        }
    }

    pub async fn insert(&self, pool: &PgPool) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO log_user (
                id, user_id, actor_id, action, old_value, new_value, created_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(self.id)
        .bind(self.user_id)
        .bind(self.actor_id)
        .bind(&self.action)
        .bind(&self.old_value)
        .bind(&self.new_value)
        .bind(self.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}

/// Role administration event.
#[derive(Debug, Clone)]
pub struct LogRole {
    pub id: Uuid,
    pub role_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl LogRole {
    pub fn new(
        role_id: Uuid,
        actor_id: Option<Uuid>,
        action: &str,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: clock::db_id(),
            role_id,
            actor_id,
            action: action.to_string(),
            old_value,
            new_value,
            created_at: clock::now(),
        }
    }

    pub async fn insert(&self, pool: &PgPool) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO log_role (
                id, role_id, actor_id, action, old_value, new_value, created_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(self.id)
        .bind(self.role_id)
        .bind(self.actor_id)
        .bind(&self.action)
        .bind(&self.old_value)
        .bind(&self.new_value)
        .bind(self.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}

/// Configuration change event.
#[derive(Debug, Clone)]
pub struct LogConfiguration {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub key: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl LogConfiguration {
    pub fn new(
        actor_id: Option<Uuid>,
        key: &str,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: clock::db_id(),
            actor_id,
            key: key.to_string(),
            old_value,
            new_value,
            created_at: clock::now(),
        }
    }

    pub async fn insert(&self, pool: &PgPool) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO log_configuration (
                id, actor_id, key, old_value, new_value, created_at
             )
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(self.id)
        .bind(self.actor_id)
        .bind(&self.key)
        .bind(&self.old_value)
        .bind(&self.new_value)
        .bind(self.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}

/// Per-operation outcome of a replication run.
#[derive(Debug, Clone)]
pub struct LogReplication {
    pub id: Uuid,
    pub operation: String,
    pub status: String,
    pub records_processed: i64,
    pub records_created: i64,
    pub records_updated: i64,
    pub records_skipped: i64,
    pub records_failed: i64,
    pub duration_ms: i64,
    pub error_message: Option<String>,
    pub triggered_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl LogReplication {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        operation: &str,
        status: &str,
        processed: i64,
        created: i64,
        updated: i64,
        skipped: i64,
        failed: i64,
        duration_ms: i64,
        error_message: Option<&str>,
        triggered_by: Option<Uuid>,
    ) -> Self {
        Self {
            id: clock::db_id(),
            operation: operation.to_string(),
            status: status.to_string(),
            records_processed: processed,
            records_created: created,
            records_updated: updated,
            records_skipped: skipped,
            records_failed: failed,
            duration_ms,
            error_message: error_message.map(str::to_string),
            triggered_by,
            created_at: clock::now(),
        }
    }

    pub async fn insert(&self, pool: &PgPool) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO log_replication (
                id, operation, status, records_processed, records_created,
                records_updated, records_skipped, records_failed, duration_ms,
                error_message, triggered_by, created_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(self.id)
        .bind(&self.operation)
        .bind(&self.status)
        .bind(self.records_processed)
        .bind(self.records_created)
        .bind(self.records_updated)
        .bind(self.records_skipped)
        .bind(self.records_failed)
        .bind(self.duration_ms)
        .bind(&self.error_message)
        .bind(self.triggered_by)
        .bind(self.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Insert inside the replication transaction.
    pub async fn insert_tx(&self, conn: &mut sqlx::PgConnection) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO log_replication (
                id, operation, status, records_processed, records_created,
                records_updated, records_skipped, records_failed, duration_ms,
                error_message, triggered_by, created_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(self.id)
        .bind(&self.operation)
        .bind(&self.status)
        .bind(self.records_processed)
        .bind(self.records_created)
        .bind(self.records_updated)
        .bind(self.records_skipped)
        .bind(self.records_failed)
        .bind(self.duration_ms)
        .bind(&self.error_message)
        .bind(self.triggered_by)
        .bind(self.created_at)
        .execute(conn)
        .await?;
        Ok(())
    }
}
