//! HRIS replication integration tests.
//!
//! The replicator's deactivation sweep touches whole tables, so run these
//! serially: `cargo test --test hris_replication_tests -- --ignored --test-threads=1`.

mod common;

use std::sync::Arc;

use common::*;
use mealdesk_core::common::clock;
use mealdesk_core::domains::hris::{
    DepartmentAssignment, Employee, HrisDepartment, HrisDepartmentAssignment, HrisEmployee,
    HrisSecurityUser, Replicator,
};
use mealdesk_core::domains::identity::{User, UserSource};
use sqlx::PgPool;

fn hris_department(id: i64, name: &str, parent: Option<i64>) -> HrisDepartment {
    HrisDepartment {
        id,
        name_en: name.to_string(),
        name_ar: format!("قسم {id}"),
        parent_id: parent,
    }
}

fn hris_employee(id: i64, code: &str, department: i64) -> HrisEmployee {
    HrisEmployee {
        id,
        code: code.to_string(),
        name_en: format!("Employee {id}"),
        name_ar: format!("موظف {id}"),
        title: Some("Engineer".to_string()),
        department_id: Some(department),
    }
}

fn sec_user(name: &str, employee: i64, deleted: bool, locked: bool) -> HrisSecurityUser {
    HrisSecurityUser {
        user_name: name.to_string(),
        employee_id: Some(employee),
        is_deleted: deleted,
        is_locked: locked,
    }
}

async fn insert_hris_user(pool: &PgPool, username: &str, employee_id: Option<i64>) -> User {
    let now = clock::now();
    let user = User {
        id: clock::db_id(),
        username: username.to_string(),
        password_hash: None,
        is_super_admin: false,
        is_active: true,
        is_blocked: false,
        user_source: UserSource::Hris,
        status_override: false,
        override_reason: None,
        override_set_by: None,
        override_set_at: None,
        employee_id,
        preferred_locale: None,
        created_at: now,
        updated_at: now,
    };
    user.insert(pool).await.expect("insert hris user")
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn full_run_builds_the_replica() {
    let pool = test_pool().await;
    let dept_root = unique_employee_id();
    let dept_child = dept_root + 1;
    let emp_id = unique_employee_id();
    let username = unique("sec.user");

    let directory = StubDirectory {
        departments: Some(vec![
            hris_department(dept_root, &unique("Operations"), None),
            hris_department(dept_child, &unique("Kitchen"), Some(dept_root)),
        ]),
        employees: Some(vec![hris_employee(emp_id, &unique("E"), dept_child)]),
        security_users: Some(vec![sec_user(&username, emp_id, false, false)]),
        assignments: Some(vec![HrisDepartmentAssignment {
            employee_id: emp_id,
            department_id: dept_child,
        }]),
        attendance: vec![],
    };

    let replicator = Replicator::new(pool.clone(), Arc::new(directory));
    let summary = replicator.run(None).await.expect("replication succeeds");

    // Employee landed with the HRIS id as primary key and a wired department.
    let employee = Employee::find_by_id(emp_id, &pool).await.expect("employee");
    assert!(employee.is_active);
    let department = employee.department_id.expect("department set");
    let parent = sqlx::query_scalar::<_, Option<uuid::Uuid>>(
        "SELECT parent_id FROM departments WHERE id = $1",
    )
    .bind(department)
    .fetch_one(&pool)
    .await
    .expect("parent lookup");
    assert!(parent.is_some(), "child department points at its parent");

    // A stub account was pre-created for the linked security user.
    let stub = User::find_by_username(&username, &pool)
        .await
        .expect("lookup")
        .expect("stub user exists");
    assert_eq!(stub.user_source, UserSource::Hris);
    assert!(!stub.is_active, "stub accounts start inactive");
    assert_eq!(stub.employee_id, Some(emp_id));

    // The HRIS assignment was created for the stub user.
    let assigned = DepartmentAssignment::active_department_ids_for_user(stub.id, &pool)
        .await
        .expect("assignments");
    assert_eq!(assigned.len(), 1);

    assert!(summary.operation("departments").is_some());
    assert!(summary.operation("employees").is_some());
    assert!(summary.operation("security_users").is_some());
    assert!(summary.operation("department_assignments").is_some());

    let logged = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM log_replication WHERE status = 'success'",
    )
    .fetch_one(&pool)
    .await
    .expect("log count");
    assert!(logged >= 4, "one log row per operation");
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn status_override_pins_user_active() {
    let pool = test_pool().await;
    let emp_id = unique_employee_id();
    let username = unique("pinned.user");
    let admin = create_user(&pool, &unique("admin"), None).await;

    create_employee(&pool, emp_id, &unique("E"), None).await;
    let user = insert_hris_user(&pool, &username, Some(emp_id)).await;
    User::set_status_override(user.id, true, Some("VIP, keep active"), admin.id, &pool)
        .await
        .expect("pin override");

    // Directory says the account is gone.
    let directory = StubDirectory {
        departments: Some(vec![]),
        employees: Some(vec![]),
        security_users: Some(vec![sec_user(&username, emp_id, true, false)]),
        assignments: Some(vec![]),
        attendance: vec![],
    };
    let replicator = Replicator::new(pool.clone(), Arc::new(directory));
    let summary = replicator.run(None).await.expect("replication succeeds");

    let after = User::find_by_id(user.id, &pool).await.expect("user");
    assert!(after.is_active, "override pins is_active against the sync");
    let accounts = summary.operation("user_accounts").expect("user op stats");
    assert!(accounts.skipped >= 1, "override counted as skipped");
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn hris_sourced_user_follows_directory_state() {
    let pool = test_pool().await;
    let emp_id = unique_employee_id();
    let username = unique("mortal.user");

    create_employee(&pool, emp_id, &unique("E"), None).await;
    let user = insert_hris_user(&pool, &username, Some(emp_id)).await;

    let directory = StubDirectory {
        departments: Some(vec![]),
        employees: Some(vec![]),
        security_users: Some(vec![sec_user(&username, emp_id, true, false)]),
        assignments: Some(vec![]),
        attendance: vec![],
    };
    Replicator::new(pool.clone(), Arc::new(directory))
        .run(None)
        .await
        .expect("replication succeeds");

    let after = User::find_by_id(user.id, &pool).await.expect("user");
    assert!(!after.is_active, "deleted directory account deactivates the user");
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn manual_assignments_survive_the_sweep() {
    let pool = test_pool().await;
    let department = create_department(&pool, unique_employee_id()).await;
    let user = create_user(&pool, &unique("manual"), None).await;
    let assignment =
        DepartmentAssignment::insert_manual(user.id, department.id, user.id, &pool)
            .await
            .expect("manual assignment");

    let directory = StubDirectory {
        departments: Some(vec![]),
        employees: Some(vec![]),
        security_users: Some(vec![]),
        assignments: Some(vec![]),
        attendance: vec![],
    };
    Replicator::new(pool.clone(), Arc::new(directory))
        .run(None)
        .await
        .expect("replication succeeds");

    let after = sqlx::query_scalar::<_, bool>(
        "SELECT is_active FROM department_assignments WHERE id = $1",
    )
    .bind(assignment.id)
    .fetch_one(&pool)
    .await
    .expect("assignment row");
    assert!(after, "manual assignments are not deactivated by the sync");
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn manual_assignment_promoted_when_hris_asserts_it() {
    let pool = test_pool().await;
    let dept_hris_id = unique_employee_id();
    let emp_id = unique_employee_id();
    let username = unique("promoted.user");

    let directory = StubDirectory {
        departments: Some(vec![hris_department(dept_hris_id, &unique("Ops"), None)]),
        employees: Some(vec![hris_employee(emp_id, &unique("E"), dept_hris_id)]),
        security_users: Some(vec![sec_user(&username, emp_id, false, false)]),
        assignments: Some(vec![HrisDepartmentAssignment {
            employee_id: emp_id,
            department_id: dept_hris_id,
        }]),
        attendance: vec![],
    };

    // First run creates the department, employee and stub user.
    let replicator = Replicator::new(pool.clone(), Arc::new(directory.clone()));
    replicator.run(None).await.expect("first run");

    let stub = User::find_by_username(&username, &pool)
        .await
        .expect("lookup")
        .expect("stub user");
    let department_id = Employee::find_by_id(emp_id, &pool)
        .await
        .expect("employee")
        .department_id
        .expect("department");

    // Flip the created assignment to manual, then re-run: the HRIS
    // re-asserts the pair and reclaims it.
    sqlx::query(
        "UPDATE department_assignments
         SET is_synced_from_hris = false
         WHERE user_id = $1 AND department_id = $2",
    )
    .bind(stub.id)
    .bind(department_id)
    .execute(&pool)
    .await
    .expect("flip to manual");

    replicator.run(None).await.expect("second run");

    let promoted = sqlx::query_scalar::<_, bool>(
        "SELECT is_synced_from_hris FROM department_assignments
         WHERE user_id = $1 AND department_id = $2",
    )
    .bind(stub.id)
    .bind(department_id)
    .fetch_one(&pool)
    .await
    .expect("assignment row");
    assert!(promoted, "manual row converted to HRIS-managed");
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn null_read_aborts_without_local_changes() {
    let pool = test_pool().await;
    let emp_id = unique_employee_id();
    create_employee(&pool, emp_id, &unique("E"), None).await;

    let directory = StubDirectory {
        departments: Some(vec![]),
        employees: None, // transient read failure
        security_users: Some(vec![]),
        assignments: Some(vec![]),
        attendance: vec![],
    };
    let err = Replicator::new(pool.clone(), Arc::new(directory))
        .run(None)
        .await
        .expect_err("replication aborts");
    assert_eq!(err.kind(), "external_unavailable");

    let still_active = sqlx::query_scalar::<_, bool>(
        "SELECT is_active FROM employees WHERE id = $1",
    )
    .bind(emp_id)
    .fetch_one(&pool)
    .await
    .expect("employee row");
    assert!(still_active, "aborted run must not deactivate local data");

    let failure_logged = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM log_replication WHERE status = 'failed'",
    )
    .fetch_one(&pool)
    .await
    .expect("log count");
    assert!(failure_logged >= 1, "a failure row is still written");
}
