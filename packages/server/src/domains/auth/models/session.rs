use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::common::clock;
use crate::common::{AppError, AppResult};

/// Server-side refresh session.
///
/// A session is valid iff `revoked = false` and `expires_at` is in the
/// future. Rotation swaps `refresh_token_id` under a row lock; that lock is
/// the sole replay defence for stolen refresh tokens.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub refresh_token_id: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub fingerprint: Option<String>,
    pub metadata: serde_json::Value,
}

impl Session {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }

    pub fn locale(&self) -> Option<&str> {
        self.metadata.get("locale").and_then(|v| v.as_str())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        user_id: Uuid,
        refresh_token_id: &str,
        expires_at: DateTime<Utc>,
        device_info: Option<&str>,
        ip_address: Option<&str>,
        fingerprint: Option<&str>,
        locale: &str,
        pool: &PgPool,
    ) -> AppResult<Self> {
        let now = clock::now();
        sqlx::query_as::<_, Self>(
            "INSERT INTO sessions (
                id, user_id, refresh_token_id, created_at, last_seen_at, expires_at,
                revoked, device_info, ip_address, fingerprint, metadata
             )
             VALUES ($1, $2, $3, $4, $5, $6, false, $7, $8, $9, $10)
             RETURNING *",
        )
        .bind(clock::db_id())
        .bind(user_id)
        .bind(refresh_token_id)
        .bind(now)
        .bind(now)
        .bind(expires_at)
        .bind(device_info)
        .bind(ip_address)
        .bind(fingerprint)
        .bind(serde_json::json!({ "locale": locale }))
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Session", id))
    }

    pub async fn find_by_refresh_id(
        refresh_token_id: &str,
        pool: &PgPool,
    ) -> AppResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM sessions WHERE refresh_token_id = $1")
            .bind(refresh_token_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Lock the session row owning `old_refresh_id` and swap in the new jti.
    ///
    /// Runs inside the caller's transaction. Concurrent refreshes serialise
    /// on the `FOR UPDATE` lock; every caller that loses the race observes a
    /// row whose `refresh_token_id` no longer matches and fails with
    /// `invalid_token`.
    pub async fn rotate_refresh_id(
        old_refresh_id: &str,
        new_refresh_id: &str,
        locale: Option<&str>,
        conn: &mut PgConnection,
    ) -> AppResult<Self> {
        let locked = sqlx::query_as::<_, Self>(
            "SELECT * FROM sessions WHERE refresh_token_id = $1 FOR UPDATE",
        )
        .bind(old_refresh_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::InvalidToken)?;

        if locked.revoked {
            return Err(AppError::RevokedToken);
        }
        let now = clock::now();
        if locked.expires_at <= now {
            return Err(AppError::ExpiredToken);
        }

        let mut metadata = locked.metadata.clone();
        if let Some(locale) = locale {
            metadata["locale"] = serde_json::Value::String(locale.to_string());
        }

        sqlx::query_as::<_, Self>(
            "UPDATE sessions
             SET refresh_token_id = $2, last_seen_at = $3, metadata = $4
             WHERE id = $1
             RETURNING *",
        )
        .bind(locked.id)
        .bind(new_refresh_id)
        .bind(now)
        .bind(metadata)
        .fetch_one(&mut *conn)
        .await
        .map_err(Into::into)
    }

    pub async fn touch_last_seen(id: Uuid, pool: &PgPool) -> AppResult<()> {
        sqlx::query("UPDATE sessions SET last_seen_at = $2 WHERE id = $1")
            .bind(id)
            .bind(clock::now())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Mark one session revoked. Returns the refresh jti so the caller can
    /// plant a negative cache marker.
    pub async fn revoke(id: Uuid, pool: &PgPool) -> AppResult<String> {
        let jti = sqlx::query_scalar::<_, String>(
            "UPDATE sessions SET revoked = true WHERE id = $1 RETURNING refresh_token_id",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Session", id))?;
        Ok(jti)
    }

    /// Revoke every active session for a user, optionally sparing one.
    /// Returns the refresh jtis revoked.
    pub async fn revoke_all_for_user(
        user_id: Uuid,
        except: Option<Uuid>,
        pool: &PgPool,
    ) -> AppResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "UPDATE sessions
             SET revoked = true
             WHERE user_id = $1
               AND revoked = false
               AND ($2::uuid IS NULL OR id <> $2)
             RETURNING refresh_token_id",
        )
        .bind(user_id)
        .bind(except)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn count_active(user_id: Uuid, pool: &PgPool) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sessions
             WHERE user_id = $1 AND revoked = false AND expires_at > $2",
        )
        .bind(user_id)
        .bind(clock::now())
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Revoke the oldest active sessions until at most `max` remain.
    ///
    /// The excluded session (the one just created) is never revoked. Returns
    /// the refresh jtis of revoked sessions.
    pub async fn enforce_limit(
        user_id: Uuid,
        max: i64,
        exclude_session_id: Option<Uuid>,
        pool: &PgPool,
    ) -> AppResult<Vec<String>> {
        if max <= 0 {
            return Ok(Vec::new());
        }
        let active = Self::count_active(user_id, pool).await?;
        let excess = active - max;
        if excess <= 0 {
            return Ok(Vec::new());
        }

        sqlx::query_scalar::<_, String>(
            "UPDATE sessions
             SET revoked = true
             WHERE id IN (
                 SELECT id FROM sessions
                 WHERE user_id = $1
                   AND revoked = false
                   AND expires_at > $2
                   AND ($3::uuid IS NULL OR id <> $3)
                 ORDER BY created_at ASC
                 LIMIT $4
             )
             RETURNING refresh_token_id",
        )
        .bind(user_id)
        .bind(clock::now())
        .bind(exclude_session_id)
        .bind(excess)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn list_by_user(user_id: Uuid, pool: &PgPool) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM sessions WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Delete sessions past their expiry. Run periodically.
    pub async fn cleanup_expired(pool: &PgPool) -> AppResult<u64> {
        let deleted = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(clock::now())
            .execute(pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }
}
