use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::clock;
use crate::common::{AppError, AppResult};

/// Where a user record originates. HRIS-sourced users are maintained by the
/// replicator; manual users are never touched by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "user_source", rename_all = "snake_case")]
pub enum UserSource {
    Hris,
    Manual,
}

/// Application user.
///
/// `status_override=true` pins `is_active` against replication runs;
/// `override_reason` is mandatory whenever the override is set.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: Option<String>,
    pub is_super_admin: bool,
    pub is_active: bool,
    pub is_blocked: bool,
    pub user_source: UserSource,
    pub status_override: bool,
    pub override_reason: Option<String>,
    pub override_set_by: Option<Uuid>,
    pub override_set_at: Option<DateTime<Utc>>,
    pub employee_id: Option<i64>,
    pub preferred_locale: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("User", id))
    }

    /// Usernames compare case-insensitively.
    pub async fn find_by_username(username: &str, pool: &PgPool) -> AppResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM users WHERE LOWER(username) = LOWER($1)")
            .bind(username)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_employee_id(employee_id: i64, pool: &PgPool) -> AppResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM users WHERE employee_id = $1")
            .bind(employee_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn insert(&self, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO users (
                id, username, password_hash, is_super_admin, is_active, is_blocked,
                user_source, status_override, override_reason, override_set_by,
                override_set_at, employee_id, preferred_locale, created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             RETURNING *",
        )
        .bind(self.id)
        .bind(&self.username)
        .bind(&self.password_hash)
        .bind(self.is_super_admin)
        .bind(self.is_active)
        .bind(self.is_blocked)
        .bind(self.user_source)
        .bind(self.status_override)
        .bind(&self.override_reason)
        .bind(self.override_set_by)
        .bind(self.override_set_at)
        .bind(self.employee_id)
        .bind(&self.preferred_locale)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Stub account pre-created by the replicator: inactive, no password.
    pub fn hris_stub(username: &str, employee_id: i64) -> Self {
        let now = clock::now();
        Self {
            id: clock::db_id(),
            username: username.to_string(),
            password_hash: None,
            is_super_admin: false,
            is_active: false,
            is_blocked: false,
            user_source: UserSource::Hris,
            status_override: false,
            override_reason: None,
            override_set_by: None,
            override_set_at: None,
            employee_id: Some(employee_id),
            preferred_locale: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pin or release the activity override.
    ///
    /// A reason is required when pinning; releasing clears the audit trio.
    pub async fn set_status_override(
        id: Uuid,
        pinned: bool,
        reason: Option<&str>,
        set_by: Uuid,
        pool: &PgPool,
    ) -> AppResult<Self> {
        if pinned && reason.map_or(true, |r| r.trim().is_empty()) {
            return Err(AppError::validation(
                "override_reason is required when status_override is set",
            ));
        }
        sqlx::query_as::<_, Self>(
            "UPDATE users
             SET status_override = $2,
                 override_reason = $3,
                 override_set_by = $4,
                 override_set_at = $5,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(pinned)
        .bind(if pinned { reason } else { None })
        .bind(if pinned { Some(set_by) } else { None })
        .bind(if pinned { Some(clock::now()) } else { None })
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Role names granted to this user, used for token claims.
    pub async fn role_names(id: Uuid, pool: &PgPool) -> AppResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT r.name_en
             FROM role_permissions rp
             JOIN roles r ON r.id = rp.role_id
             WHERE rp.user_id = $1 AND r.is_active = true
             ORDER BY r.name_en",
        )
        .bind(id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Page keys reachable through the user's roles, for the validation
    /// snapshot.
    pub async fn accessible_page_keys(id: Uuid, pool: &PgPool) -> AppResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT p.key
             FROM role_permissions rp
             JOIN page_permissions pp ON pp.role_id = rp.role_id
             JOIN pages p ON p.id = pp.page_id
             WHERE rp.user_id = $1
             ORDER BY p.key",
        )
        .bind(id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}
