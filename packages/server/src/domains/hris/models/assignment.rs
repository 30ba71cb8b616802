use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::common::clock;
use crate::common::AppResult;

/// Membership of a user in a department.
///
/// Rows carry their provenance: HRIS-synced rows are owned by the
/// replicator and may be deactivated by it; manual rows are never touched
/// during sync. When the HRIS re-asserts a pair that exists manually, the
/// row is promoted to HRIS-managed.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct DepartmentAssignment {
    pub id: Uuid,
    pub department_id: Uuid,
    pub user_id: Uuid,
    pub is_synced_from_hris: bool,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DepartmentAssignment {
    pub async fn find_by_user_and_department(
        user_id: Uuid,
        department_id: Uuid,
        conn: &mut PgConnection,
    ) -> AppResult<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM department_assignments
             WHERE user_id = $1 AND department_id = $2",
        )
        .bind(user_id)
        .bind(department_id)
        .fetch_optional(conn)
        .await
        .map_err(Into::into)
    }

    /// Department ids the user is actively assigned to; drives meal-request
    /// visibility.
    pub async fn active_department_ids_for_user(
        user_id: Uuid,
        pool: &PgPool,
    ) -> AppResult<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT department_id FROM department_assignments
             WHERE user_id = $1 AND is_active = true",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Manual assignment created by an administrator.
    pub async fn insert_manual(
        user_id: Uuid,
        department_id: Uuid,
        created_by: Uuid,
        pool: &PgPool,
    ) -> AppResult<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO department_assignments (
                id, department_id, user_id, is_synced_from_hris, is_active,
                created_by, created_at, updated_at
             )
             VALUES ($1, $2, $3, false, true, $4, $5, $5)
             RETURNING *",
        )
        .bind(clock::db_id())
        .bind(department_id)
        .bind(user_id)
        .bind(created_by)
        .bind(clock::now())
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Replication insert for a pair the HRIS asserts.
    pub async fn insert_hris(
        user_id: Uuid,
        department_id: Uuid,
        conn: &mut PgConnection,
    ) -> AppResult<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO department_assignments (
                id, department_id, user_id, is_synced_from_hris, is_active,
                created_at, updated_at
             )
             VALUES ($1, $2, $3, true, true, $4, $4)
             RETURNING *",
        )
        .bind(clock::db_id())
        .bind(department_id)
        .bind(user_id)
        .bind(clock::now())
        .fetch_one(conn)
        .await
        .map_err(Into::into)
    }

    /// Reactivate an HRIS-synced row the sweep had turned off.
    pub async fn reactivate(id: Uuid, conn: &mut PgConnection) -> AppResult<()> {
        sqlx::query(
            "UPDATE department_assignments
             SET is_active = true, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Promote a manual row to HRIS-managed.
    pub async fn convert_to_hris(id: Uuid, conn: &mut PgConnection) -> AppResult<()> {
        sqlx::query(
            "UPDATE department_assignments
             SET is_synced_from_hris = true, is_active = true, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Deactivation sweep scoped to replicator-owned rows only.
    pub async fn deactivate_hris_synced(conn: &mut PgConnection) -> AppResult<u64> {
        let affected = sqlx::query(
            "UPDATE department_assignments
             SET is_active = false, updated_at = NOW()
             WHERE is_synced_from_hris = true AND is_active = true",
        )
        .execute(conn)
        .await?
        .rows_affected();
        Ok(affected)
    }

    /// Deactivate one manual assignment (administrative surface).
    pub async fn deactivate(id: Uuid, updated_by: Uuid, pool: &PgPool) -> AppResult<()> {
        sqlx::query(
            "UPDATE department_assignments
             SET is_active = false, updated_by = $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(updated_by)
        .execute(pool)
        .await?;
        Ok(())
    }
}
