use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::common::clock;
use crate::common::{AppError, AppResult};

/// Local replica of an HRIS department.
///
/// Departments form a tree via `parent_id` (on-delete set-null, no cycles).
/// Replication writes them in two passes: names first, parents once every
/// node has a local id.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Department {
    pub id: Uuid,
    pub hris_id: i64,
    pub name_en: String,
    pub name_ar: String,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Department {
    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM departments WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Department", id))
    }

    /// All departments, flat; hierarchies are rebuilt from `parent_id` by
    /// the caller.
    pub async fn list_active(pool: &PgPool) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM departments WHERE is_active = true ORDER BY name_en",
        )
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Pass-1 upsert by HRIS id, without parent linkage.
    pub async fn upsert_basic(
        hris_id: i64,
        name_en: &str,
        name_ar: &str,
        conn: &mut PgConnection,
    ) -> AppResult<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO departments (
                id, hris_id, name_en, name_ar, parent_id, is_active, created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, NULL, true, $5, $5)
             ON CONFLICT (hris_id) DO UPDATE SET
                 name_en = EXCLUDED.name_en,
                 name_ar = EXCLUDED.name_ar,
                 is_active = true,
                 updated_at = NOW()
             RETURNING *",
        )
        .bind(clock::db_id())
        .bind(hris_id)
        .bind(name_en)
        .bind(name_ar)
        .bind(clock::now())
        .fetch_one(conn)
        .await
        .map_err(Into::into)
    }

    /// Pass-2 parent wiring. Nodes whose parent never materialised stay
    /// top-level.
    pub async fn set_parent(
        id: Uuid,
        parent_id: Option<Uuid>,
        conn: &mut PgConnection,
    ) -> AppResult<()> {
        sqlx::query("UPDATE departments SET parent_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(parent_id)
            .execute(conn)
            .await?;
        Ok(())
    }
}
