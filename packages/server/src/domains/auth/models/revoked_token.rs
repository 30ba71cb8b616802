use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::clock;
use crate::common::{AppResult, DbErrorKind};

/// Revocation record for a single token jti.
///
/// Rows become garbage once the underlying token would have expired anyway;
/// `cleanup_expired` reaps them.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct RevokedToken {
    pub jti: String,
    pub token_type: String,
    pub user_id: Uuid,
    pub revoked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RevokedToken {
    pub async fn record(
        jti: &str,
        token_type: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
        pool: &PgPool,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "INSERT INTO revoked_tokens (jti, token_type, user_id, revoked_at, expires_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(jti)
        .bind(token_type)
        .bind(user_id)
        .bind(clock::now())
        .bind(expires_at)
        .execute(pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // Revoking twice is a no-op.
            Err(e) => {
                let app_err = crate::common::AppError::from(e);
                if app_err.db_kind() == Some(DbErrorKind::UniqueViolation) {
                    Ok(())
                } else {
                    Err(app_err)
                }
            }
        }
    }

    pub async fn is_revoked(jti: &str, pool: &PgPool) -> AppResult<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM revoked_tokens WHERE jti = $1",
        )
        .bind(jti)
        .fetch_one(pool)
        .await?;
        Ok(found > 0)
    }

    pub async fn cleanup_expired(pool: &PgPool) -> AppResult<u64> {
        let deleted = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < $1")
            .bind(clock::now())
            .execute(pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }
}
