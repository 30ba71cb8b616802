//! Bilingual meal-request summary listing.
//!
//! One grouped join produces the request header, status and meal type in
//! both languages, and the line counters. Department visibility: a caller
//! with active department assignments only sees requests that have at least
//! one line in an assigned department; a caller with none sees everything.
//! `OnProgress` drafts are hidden unless a status filter asks for them, and
//! requests whose lines are all deleted never appear.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::common::AppResult;
use crate::domains::hris::DepartmentAssignment;

use super::models::status::RequestStatus;

#[derive(Debug, Clone, Default)]
pub struct RequestFilters {
    /// Exact status ids to include. `None` hides `OnProgress` drafts.
    pub status_ids: Option<Vec<i32>>,
    /// A UUID matches the requester exactly; anything else is a substring
    /// match on the username.
    pub requester: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct MealRequestSummary {
    pub meal_request_id: i64,
    pub status_id: i32,
    pub status_name_en: String,
    pub status_name_ar: String,
    pub requester_id: Uuid,
    pub requester_username: String,
    pub meal_type_id: i32,
    pub meal_type_name_en: String,
    pub meal_type_name_ar: String,
    pub request_time: DateTime<Utc>,
    pub total_lines: i64,
    pub accepted_lines: i64,
}

pub async fn list_summaries(
    caller_id: Uuid,
    filters: &RequestFilters,
    pool: &PgPool,
) -> AppResult<Vec<MealRequestSummary>> {
    let visible_departments =
        DepartmentAssignment::active_department_ids_for_user(caller_id, pool).await?;

    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT r.id AS meal_request_id,
                r.status_id,
                s.name_en AS status_name_en,
                s.name_ar AS status_name_ar,
                r.requester_id,
                u.username AS requester_username,
                r.meal_type_id,
                mt.name_en AS meal_type_name_en,
                mt.name_ar AS meal_type_name_ar,
                r.request_time,
                COUNT(l.id) AS total_lines,
                COUNT(*) FILTER (WHERE l.is_accepted) AS accepted_lines
         FROM meal_requests r
         JOIN meal_request_statuses s ON s.id = r.status_id
         JOIN users u ON u.id = r.requester_id
         JOIN meal_types mt ON mt.id = r.meal_type_id
         JOIN meal_request_lines l ON l.meal_request_id = r.id AND l.is_deleted = false
         WHERE r.is_deleted = false",
    );

    match &filters.status_ids {
        Some(status_ids) if !status_ids.is_empty() => {
            query.push(" AND r.status_id = ANY(");
            query.push_bind(status_ids.clone());
            query.push(")");
        }
        _ => {
            query.push(" AND r.status_id <> ");
            query.push_bind(RequestStatus::OnProgress.id());
        }
    }

    if let Some(requester) = &filters.requester {
        match requester.parse::<Uuid>() {
            Ok(requester_id) => {
                query.push(" AND r.requester_id = ");
                query.push_bind(requester_id);
            }
            Err(_) => {
                query.push(" AND u.username ILIKE ");
                query.push_bind(format!("%{requester}%"));
            }
        }
    }

    if let Some(from) = filters.date_from {
        query.push(" AND r.request_time >= ");
        query.push_bind(from);
    }
    if let Some(to) = filters.date_to {
        query.push(" AND r.request_time <= ");
        query.push_bind(to);
    }

    if !visible_departments.is_empty() {
        query.push(
            " AND EXISTS (
                 SELECT 1 FROM meal_request_lines vl
                 JOIN employees ve ON ve.id = vl.employee_id
                 WHERE vl.meal_request_id = r.id
                   AND vl.is_deleted = false
                   AND ve.department_id = ANY(",
        );
        query.push_bind(visible_departments);
        query.push("))");
    }

    query.push(
        " GROUP BY r.id, r.status_id, s.name_en, s.name_ar, r.requester_id,
                   u.username, r.meal_type_id, mt.name_en, mt.name_ar, r.request_time
          HAVING COUNT(l.id) > 0
          ORDER BY r.request_time DESC",
    );

    query
        .build_query_as::<MealRequestSummary>()
        .fetch_all(pool)
        .await
        .map_err(Into::into)
}
