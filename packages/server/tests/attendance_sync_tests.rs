//! Attendance sync integration tests. Ignored by default; run with
//! `cargo test -- --ignored`.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::*;
use mealdesk_core::domains::attendance::AttendanceSync;
use mealdesk_core::domains::hris::AttendanceRecord;
use mealdesk_core::domains::meal::{
    MealRequest, MealRequestLine, MealRequestLineAttendance, RequestStatus,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::str::FromStr;

/// Insert a pending request with one line for the employee and return the
/// line.
async fn seed_request_line(pool: &PgPool, employee_id: i64, code: &str) -> MealRequestLine {
    let meal_type = seed_meal_lookups(pool).await;
    let requester = create_user(pool, &unique("requester"), None).await;
    let mut conn = pool.acquire().await.expect("conn");
    let request = MealRequest::insert(
        requester.id,
        RequestStatus::Pending,
        meal_type.id,
        None,
        None,
        &mut conn,
    )
    .await
    .expect("request");
    MealRequestLine::insert(request.id, employee_id, code, None, false, &mut conn)
        .await
        .expect("line")
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn sync_writes_once_then_reports_unchanged() {
    let pool = test_pool().await;
    let employee_id = unique_employee_id();
    let code = unique("E");
    create_employee(&pool, employee_id, &code, None).await;
    let line = seed_request_line(&pool, employee_id, &code).await;

    let time_in = Utc::now() - Duration::hours(9);
    let time_out = time_in + Duration::hours(8) + Duration::minutes(30);
    let directory = StubDirectory {
        attendance: vec![AttendanceRecord {
            employee_id,
            time_in: Some(time_in),
            time_out: Some(time_out),
            working_hours: None,
        }],
        ..Default::default()
    };
    let sync = AttendanceSync::new(pool.clone(), Arc::new(directory));

    let first = sync.sync_lines(&[line.id]).await.expect("first run");
    assert_eq!(first.total, 1);
    assert_eq!(first.synced, 1);
    assert_eq!(first.unchanged, 0);

    let row = MealRequestLineAttendance::find_for_line(line.id, &pool)
        .await
        .expect("query")
        .expect("attendance row");
    assert_eq!(row.attendance_in, Some(time_in));
    assert_eq!(row.attendance_out, Some(time_out));
    assert_eq!(row.working_hours, Some(Decimal::from_str("8.50").expect("decimal")));

    // Second run over unchanged remote data performs zero writes.
    let synced_at_before = row.attendance_synced_at;
    let second = sync.sync_lines(&[line.id]).await.expect("second run");
    assert_eq!(second.synced, 0);
    assert_eq!(second.unchanged, 1);

    let row_after = MealRequestLineAttendance::find_for_line(line.id, &pool)
        .await
        .expect("query")
        .expect("attendance row");
    assert_eq!(
        row_after.attendance_synced_at, synced_at_before,
        "unchanged data is not rewritten"
    );
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn tms_hours_override_derived_hours() {
    let pool = test_pool().await;
    let employee_id = unique_employee_id();
    let code = unique("E");
    create_employee(&pool, employee_id, &code, None).await;
    let line = seed_request_line(&pool, employee_id, &code).await;

    let time_in = Utc::now() - Duration::hours(9);
    let directory = StubDirectory {
        attendance: vec![AttendanceRecord {
            employee_id,
            time_in: Some(time_in),
            time_out: Some(time_in + Duration::hours(8)),
            working_hours: Some(7.25),
        }],
        ..Default::default()
    };
    let sync = AttendanceSync::new(pool.clone(), Arc::new(directory));
    sync.sync_lines(&[line.id]).await.expect("sync");

    let row = MealRequestLineAttendance::find_for_line(line.id, &pool)
        .await
        .expect("query")
        .expect("attendance row");
    assert_eq!(row.working_hours, Some(Decimal::from_str("7.25").expect("decimal")));
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn remote_change_triggers_rewrite() {
    let pool = test_pool().await;
    let employee_id = unique_employee_id();
    let code = unique("E");
    create_employee(&pool, employee_id, &code, None).await;
    let line = seed_request_line(&pool, employee_id, &code).await;

    let time_in = Utc::now() - Duration::hours(9);
    let time_out = time_in + Duration::hours(8);
    let sync = AttendanceSync::new(
        pool.clone(),
        Arc::new(StubDirectory {
            attendance: vec![AttendanceRecord {
                employee_id,
                time_in: Some(time_in),
                time_out: Some(time_out),
                working_hours: None,
            }],
            ..Default::default()
        }),
    );
    assert_eq!(sync.sync_lines(&[line.id]).await.expect("first").synced, 1);

    // The employee badges out later; the next run rewrites the row.
    let corrected = AttendanceSync::new(
        pool.clone(),
        Arc::new(StubDirectory {
            attendance: vec![AttendanceRecord {
                employee_id,
                time_in: Some(time_in),
                time_out: Some(time_out + Duration::minutes(45)),
                working_hours: None,
            }],
            ..Default::default()
        }),
    );
    let outcome = corrected.sync_lines(&[line.id]).await.expect("second");
    assert_eq!(outcome.synced, 1);

    let row = MealRequestLineAttendance::find_for_line(line.id, &pool)
        .await
        .expect("query")
        .expect("attendance row");
    assert_eq!(row.working_hours, Some(Decimal::from_str("8.75").expect("decimal")));
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn missing_punches_count_as_not_found() {
    let pool = test_pool().await;
    let employee_id = unique_employee_id();
    let code = unique("E");
    create_employee(&pool, employee_id, &code, None).await;
    let line = seed_request_line(&pool, employee_id, &code).await;

    let sync = AttendanceSync::new(pool.clone(), Arc::new(StubDirectory::default()));
    let outcome = sync.sync_lines(&[line.id]).await.expect("sync");
    assert_eq!(outcome.total, 1);
    assert_eq!(outcome.not_found, 1);
    assert_eq!(outcome.synced, 0);

    let row = MealRequestLineAttendance::find_for_line(line.id, &pool)
        .await
        .expect("query");
    assert!(row.is_none(), "no attendance row for a missing punch");
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn unknown_employee_code_counts_as_not_found() {
    let pool = test_pool().await;
    let known = unique_employee_id();
    let code = unique("E");
    create_employee(&pool, known, &code, None).await;
    // Line whose snapshot code no longer resolves locally.
    let line = seed_request_line(&pool, known, &unique("GONE")).await;

    let sync = AttendanceSync::new(pool.clone(), Arc::new(StubDirectory::default()));
    let outcome = sync.sync_lines(&[line.id]).await.expect("sync");
    assert_eq!(outcome.not_found, 1);
}
