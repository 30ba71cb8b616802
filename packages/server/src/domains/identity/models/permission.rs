use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::clock;
use crate::common::{AppError, AppResult, DbErrorKind};

/// Grant of a role to a user. The (role_id, user_id) pair is unique.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct RolePermission {
    pub id: Uuid,
    pub role_id: Uuid,
    pub user_id: Uuid,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl RolePermission {
    pub async fn grant(
        role_id: Uuid,
        user_id: Uuid,
        created_by: Option<Uuid>,
        pool: &PgPool,
    ) -> AppResult<Self> {
        let result = sqlx::query_as::<_, Self>(
            "INSERT INTO role_permissions (id, role_id, user_id, created_by, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(clock::db_id())
        .bind(role_id)
        .bind(user_id)
        .bind(created_by)
        .bind(clock::now())
        .fetch_one(pool)
        .await
        .map_err(AppError::from);

        match result {
            Err(ref e) if e.db_kind() == Some(DbErrorKind::UniqueViolation) => Err(
                AppError::conflict("user already holds this role"),
            ),
            other => other,
        }
    }

    pub async fn revoke(role_id: Uuid, user_id: Uuid, pool: &PgPool) -> AppResult<bool> {
        let deleted = sqlx::query(
            "DELETE FROM role_permissions WHERE role_id = $1 AND user_id = $2",
        )
        .bind(role_id)
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected();
        Ok(deleted > 0)
    }

    pub async fn list_for_user(user_id: Uuid, pool: &PgPool) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM role_permissions WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}

/// Grant of a page to a role. The (role_id, page_id) pair is unique and
/// `created_by` is mandatory.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct PagePermission {
    pub id: Uuid,
    pub role_id: Uuid,
    pub page_id: Uuid,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl PagePermission {
    pub async fn grant(
        role_id: Uuid,
        page_id: Uuid,
        created_by: Uuid,
        pool: &PgPool,
    ) -> AppResult<Self> {
        let result = sqlx::query_as::<_, Self>(
            "INSERT INTO page_permissions (id, role_id, page_id, created_by, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(clock::db_id())
        .bind(role_id)
        .bind(page_id)
        .bind(created_by)
        .bind(clock::now())
        .fetch_one(pool)
        .await
        .map_err(AppError::from);

        match result {
            Err(ref e) if e.db_kind() == Some(DbErrorKind::UniqueViolation) => Err(
                AppError::conflict("role already has access to this page"),
            ),
            other => other,
        }
    }

    pub async fn revoke(role_id: Uuid, page_id: Uuid, pool: &PgPool) -> AppResult<bool> {
        let deleted = sqlx::query(
            "DELETE FROM page_permissions WHERE role_id = $1 AND page_id = $2",
        )
        .bind(role_id)
        .bind(page_id)
        .execute(pool)
        .await?
        .rows_affected();
        Ok(deleted > 0)
    }

    pub async fn list_for_role(role_id: Uuid, pool: &PgPool) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM page_permissions WHERE role_id = $1 ORDER BY created_at",
        )
        .bind(role_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}
