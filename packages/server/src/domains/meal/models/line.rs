use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use crate::common::clock;
use crate::common::{AppError, AppResult};

/// Input row for [`MealRequestLine::insert_many`].
#[derive(Debug, Clone)]
pub struct NewLine {
    pub employee_id: i64,
    pub employee_code: String,
    pub notes: Option<String>,
    pub is_accepted: bool,
}

/// One employee on a meal request.
///
/// `employee_code` is a denormalised snapshot taken at creation; the
/// attendance contract keys on the code as it was when the request was
/// made, even if the employee record later changes.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct MealRequestLine {
    pub id: i64,
    pub meal_request_id: i64,
    pub employee_id: i64,
    pub employee_code: String,
    pub attendance_time: Option<DateTime<Utc>>,
    pub shift_hours: Option<Decimal>,
    pub notes: Option<String>,
    pub is_accepted: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MealRequestLine {
    pub async fn find_by_id(id: i64, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM meal_request_lines WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("MealRequestLine", id))
    }

    pub async fn insert(
        meal_request_id: i64,
        employee_id: i64,
        employee_code: &str,
        notes: Option<&str>,
        is_accepted: bool,
        conn: &mut PgConnection,
    ) -> AppResult<Self> {
        let now = clock::now();
        sqlx::query_as::<_, Self>(
            "INSERT INTO meal_request_lines (
                meal_request_id, employee_id, employee_code, notes,
                is_accepted, is_deleted, created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, $5, false, $6, $6)
             RETURNING *",
        )
        .bind(meal_request_id)
        .bind(employee_id)
        .bind(employee_code)
        .bind(notes)
        .bind(is_accepted)
        .bind(now)
        .fetch_one(conn)
        .await
        .map_err(Into::into)
    }

    /// Insert a batch of lines in one round trip.
    pub async fn insert_many(
        meal_request_id: i64,
        rows: &[NewLine],
        conn: &mut PgConnection,
    ) -> AppResult<Vec<Self>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let now = clock::now();
        let mut query: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
            "INSERT INTO meal_request_lines (
                meal_request_id, employee_id, employee_code, notes,
                is_accepted, is_deleted, created_at, updated_at
             ) ",
        );
        query.push_values(rows, |mut b, row| {
            b.push_bind(meal_request_id)
                .push_bind(row.employee_id)
                .push_bind(&row.employee_code)
                .push_bind(&row.notes)
                .push_bind(row.is_accepted)
                .push_bind(false)
                .push_bind(now)
                .push_bind(now);
        });
        query.push(" RETURNING *");
        query
            .build_query_as::<Self>()
            .fetch_all(conn)
            .await
            .map_err(Into::into)
    }

    pub async fn list_for_request(
        meal_request_id: i64,
        include_deleted: bool,
        pool: &PgPool,
    ) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM meal_request_lines
             WHERE meal_request_id = $1 AND ($2 OR is_deleted = false)
             ORDER BY id",
        )
        .bind(meal_request_id)
        .bind(include_deleted)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Duplicate-employee guard for add-line.
    pub async fn exists_for_employee(
        meal_request_id: i64,
        employee_id: i64,
        pool: &PgPool,
    ) -> AppResult<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM meal_request_lines
             WHERE meal_request_id = $1 AND employee_id = $2 AND is_deleted = false",
        )
        .bind(meal_request_id)
        .bind(employee_id)
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn update_details(
        id: i64,
        shift_hours: Option<Decimal>,
        notes: Option<&str>,
        is_accepted: Option<bool>,
        pool: &PgPool,
    ) -> AppResult<Self> {
        sqlx::query_as::<_, Self>(
            "UPDATE meal_request_lines
             SET shift_hours = COALESCE($2, shift_hours),
                 notes = COALESCE($3, notes),
                 is_accepted = COALESCE($4, is_accepted),
                 updated_at = NOW()
             WHERE id = $1 AND is_deleted = false
             RETURNING *",
        )
        .bind(id)
        .bind(shift_hours)
        .bind(notes)
        .bind(is_accepted)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("MealRequestLine", id))
    }

    pub async fn soft_delete(id: i64, pool: &PgPool) -> AppResult<()> {
        let affected = sqlx::query(
            "UPDATE meal_request_lines
             SET is_deleted = true, updated_at = NOW()
             WHERE id = $1 AND is_deleted = false",
        )
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(AppError::not_found("MealRequestLine", id));
        }
        Ok(())
    }

    /// One bulk update for every line on a request.
    pub async fn set_accepted_for_request(
        meal_request_id: i64,
        accepted: bool,
        conn: &mut PgConnection,
    ) -> AppResult<u64> {
        let affected = sqlx::query(
            "UPDATE meal_request_lines
             SET is_accepted = $2, updated_at = NOW()
             WHERE meal_request_id = $1 AND is_deleted = false",
        )
        .bind(meal_request_id)
        .bind(accepted)
        .execute(conn)
        .await?
        .rows_affected();
        Ok(affected)
    }

    /// Bulk accept/reject for a subset of lines.
    pub async fn set_accepted_for_lines(
        meal_request_id: i64,
        line_ids: &[i64],
        accepted: bool,
        pool: &PgPool,
    ) -> AppResult<u64> {
        let affected = sqlx::query(
            "UPDATE meal_request_lines
             SET is_accepted = $3, updated_at = NOW()
             WHERE meal_request_id = $1 AND id = ANY($2) AND is_deleted = false",
        )
        .bind(meal_request_id)
        .bind(line_ids)
        .bind(accepted)
        .execute(pool)
        .await?
        .rows_affected();
        Ok(affected)
    }

    /// Soft-delete every line of a request in one statement; runs inside the
    /// request's delete transaction.
    pub async fn soft_delete_for_request(
        meal_request_id: i64,
        conn: &mut PgConnection,
    ) -> AppResult<u64> {
        let affected = sqlx::query(
            "UPDATE meal_request_lines
             SET is_deleted = true, updated_at = NOW()
             WHERE meal_request_id = $1 AND is_deleted = false",
        )
        .bind(meal_request_id)
        .execute(conn)
        .await?
        .rows_affected();
        Ok(affected)
    }

    /// Non-deleted lines of requests inside the sliding attendance window.
    pub async fn list_in_window(
        window_start: DateTime<Utc>,
        pool: &PgPool,
    ) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT l.* FROM meal_request_lines l
             JOIN meal_requests r ON r.id = l.meal_request_id
             WHERE l.is_deleted = false
               AND r.is_deleted = false
               AND r.request_time >= $1
             ORDER BY l.id",
        )
        .bind(window_start)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Load an explicit id set, chunked.
    pub async fn list_by_ids(ids: &[i64], pool: &PgPool) -> AppResult<Vec<Self>> {
        let mut lines = Vec::with_capacity(ids.len());
        for chunk in crate::common::db::in_chunks(ids) {
            let batch = sqlx::query_as::<_, Self>(
                "SELECT * FROM meal_request_lines WHERE id = ANY($1) AND is_deleted = false",
            )
            .bind(chunk)
            .fetch_all(pool)
            .await?;
            lines.extend(batch);
        }
        Ok(lines)
    }
}
