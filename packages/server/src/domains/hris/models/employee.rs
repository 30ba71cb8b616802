use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::common::db::in_chunks;
use crate::common::{AppError, AppResult};

/// Local replica of an HRIS employee. The primary key *is* the external
/// HRIS id, so replication upserts by id and the TMS can be queried without
/// a mapping table.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Employee {
    pub id: i64,
    pub code: String,
    pub name_en: String,
    pub name_ar: String,
    pub title: Option<String>,
    pub is_active: bool,
    pub department_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    pub async fn find_by_id(id: i64, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM employees WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Employee", id))
    }

    pub async fn find_by_code(code: &str, pool: &PgPool) -> AppResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM employees WHERE code = $1")
            .bind(code)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Resolve a batch of employee codes, chunking the `IN` list.
    pub async fn find_by_codes(codes: &[String], pool: &PgPool) -> AppResult<Vec<Self>> {
        let mut employees = Vec::with_capacity(codes.len());
        for chunk in in_chunks(codes) {
            let batch = sqlx::query_as::<_, Self>(
                "SELECT * FROM employees WHERE code = ANY($1)",
            )
            .bind(chunk)
            .fetch_all(pool)
            .await?;
            employees.extend(batch);
        }
        Ok(employees)
    }

    /// Replication upsert: insert or refresh by HRIS id and reactivate.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        id: i64,
        code: &str,
        name_en: &str,
        name_ar: &str,
        title: Option<&str>,
        department_id: Option<Uuid>,
        conn: &mut PgConnection,
    ) -> AppResult<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO employees (
                id, code, name_en, name_ar, title, is_active, department_id,
                created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, $5, true, $6, NOW(), NOW())
             ON CONFLICT (id) DO UPDATE SET
                 code = EXCLUDED.code,
                 name_en = EXCLUDED.name_en,
                 name_ar = EXCLUDED.name_ar,
                 title = EXCLUDED.title,
                 is_active = true,
                 department_id = EXCLUDED.department_id,
                 updated_at = NOW()
             RETURNING *",
        )
        .bind(id)
        .bind(code)
        .bind(name_en)
        .bind(name_ar)
        .bind(title)
        .bind(department_id)
        .fetch_one(conn)
        .await
        .map_err(Into::into)
    }

    /// Deactivation sweep at the start of a replication run; the upsert pass
    /// reactivates everyone still present in the HRIS.
    pub async fn deactivate_all(conn: &mut PgConnection) -> AppResult<u64> {
        let affected = sqlx::query(
            "UPDATE employees SET is_active = false, updated_at = NOW() WHERE is_active = true",
        )
        .execute(conn)
        .await?
        .rows_affected();
        Ok(affected)
    }
}
