//! Shared builders for integration tests.

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use mealdesk_core::common::cache::Cache;
use mealdesk_core::common::clock;
use mealdesk_core::config::{
    AuthConfig, CacheConfig, LocaleConfig, SchedulerConfig, SessionConfig,
};
use mealdesk_core::domains::auth::{
    BcryptHasher, Hasher, LoginRateLimiter, SessionManager, TokenAuthority,
};
use mealdesk_core::common::AppResult;
use mealdesk_core::domains::hris::{
    AttendanceRecord, Department, Employee, HrisDepartment, HrisDepartmentAssignment,
    HrisDirectory, HrisEmployee, HrisSecurityUser,
};
use mealdesk_core::domains::identity::{User, UserSource};
use mealdesk_core::domains::meal::{seed_statuses, MealType};
use mealdesk_core::kernel::jobs::{
    seed_lookup_tables, Dispatcher, JobRegistry, SchedulerCore, TaskFunction,
};

use super::harness::unique;

/// Low-cost hasher so login tests stay fast.
pub fn test_hasher() -> Arc<dyn Hasher> {
    Arc::new(BcryptHasher::new(4))
}

pub fn auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: Some("integration-test-secret".to_string()),
        jwt_algorithm: "HS256".to_string(),
        access_token_minutes: 15,
        refresh_token_days: 7,
    }
}

pub fn token_authority() -> Arc<TokenAuthority> {
    Arc::new(TokenAuthority::from_config(&auth_config(), false).expect("authority builds"))
}

pub fn session_config(max_concurrent: i64) -> SessionConfig {
    SessionConfig {
        cookie_name: "refresh_token".to_string(),
        cookie_secure: true,
        cookie_samesite: "lax".to_string(),
        refresh_lifetime_days: 7,
        max_concurrent,
    }
}

pub fn locale_config() -> LocaleConfig {
    LocaleConfig {
        default: "en".to_string(),
        supported: vec!["en".to_string(), "ar".to_string()],
        cookie_name: "locale".to_string(),
        cookie_max_age_days: 365,
    }
}

pub fn cache_config() -> CacheConfig {
    CacheConfig {
        redis_url: None,
        revoked_token_ttl_seconds: 900,
        session_cache_ttl_seconds: 300,
    }
}

pub fn session_manager(
    pool: PgPool,
    cache: Arc<dyn Cache>,
    max_concurrent: i64,
) -> SessionManager {
    SessionManager::new(
        pool,
        cache,
        token_authority(),
        test_hasher(),
        None,
        LoginRateLimiter::from_setting("100/min").expect("limiter"),
        session_config(max_concurrent),
        locale_config(),
        cache_config(),
    )
}

pub fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        enabled: true,
        instance_name: Some(unique("test-scheduler")),
        mode: "embedded".to_string(),
        heartbeat_seconds: 30,
        stale_threshold_seconds: 300,
        lock_duration_seconds: 3600,
        history_retention_days: 30,
        manual_timeout_seconds: 15,
    }
}

pub fn scheduler(
    pool: PgPool,
    registry: Arc<JobRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
) -> Arc<SchedulerCore> {
    SchedulerCore::new(pool, registry, dispatcher, scheduler_config())
}

/// Insert an active user with an optional bcrypt-hashed password.
pub async fn create_user(pool: &PgPool, username: &str, password: Option<&str>) -> User {
    let now = clock::now();
    let password_hash = password.map(|p| test_hasher().hash(p).expect("hash"));
    let user = User {
        id: clock::db_id(),
        username: username.to_string(),
        password_hash,
        is_super_admin: false,
        is_active: true,
        is_blocked: false,
        user_source: UserSource::Manual,
        status_override: false,
        override_reason: None,
        override_set_by: None,
        override_set_at: None,
        employee_id: None,
        preferred_locale: None,
        created_at: now,
        updated_at: now,
    };
    user.insert(pool).await.expect("insert user")
}

pub async fn create_department(pool: &PgPool, hris_id: i64) -> Department {
    sqlx::query_as::<_, Department>(
        "INSERT INTO departments (id, hris_id, name_en, name_ar, is_active, created_at, updated_at)
         VALUES ($1, $2, $3, $4, true, NOW(), NOW())
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(hris_id)
    .bind(unique("dept"))
    .bind("قسم")
    .fetch_one(pool)
    .await
    .expect("insert department")
}

pub async fn create_employee(
    pool: &PgPool,
    id: i64,
    code: &str,
    department_id: Option<Uuid>,
) -> Employee {
    sqlx::query_as::<_, Employee>(
        "INSERT INTO employees (id, code, name_en, name_ar, is_active, department_id, created_at, updated_at)
         VALUES ($1, $2, $3, $4, true, $5, NOW(), NOW())
         RETURNING *",
    )
    .bind(id)
    .bind(code)
    .bind(unique("employee"))
    .bind("موظف")
    .bind(department_id)
    .fetch_one(pool)
    .await
    .expect("insert employee")
}

/// Seed status/meal-type lookups shared by the meal tests.
pub async fn seed_meal_lookups(pool: &PgPool) -> MealType {
    seed_statuses(pool).await.expect("seed statuses");
    sqlx::query(
        "INSERT INTO meal_types (id, name_en, name_ar, is_active)
         VALUES (1, 'Lunch', 'غداء', true)
         ON CONFLICT (id) DO NOTHING",
    )
    .execute(pool)
    .await
    .expect("seed meal type");
    MealType::find_by_id(1, pool).await.expect("meal type")
}

/// Seed scheduler lookups and create a task function for tests.
pub async fn create_task_function(pool: &PgPool, key: &str) -> TaskFunction {
    seed_lookup_tables(pool).await.expect("seed scheduler lookups");
    TaskFunction::ensure(key, "tests::noop", "Test Task", "مهمة اختبار", pool)
        .await
        .expect("task function")
}

/// A fresh HRIS employee id that will not collide across parallel tests.
pub fn unique_employee_id() -> i64 {
    // Unix micros truncated into a positive i64 window plus entropy.
    let micros = clock::now().timestamp_micros() & 0x7FFF_FFFF_FFFF;
    micros ^ (Uuid::new_v4().as_u128() as i64 & 0xFFFF_FFFF)
}

/// In-memory HRIS/TMS double. Fields left as `None` simulate a transient
/// read failure.
#[derive(Default, Clone)]
pub struct StubDirectory {
    pub departments: Option<Vec<HrisDepartment>>,
    pub employees: Option<Vec<HrisEmployee>>,
    pub security_users: Option<Vec<HrisSecurityUser>>,
    pub assignments: Option<Vec<HrisDepartmentAssignment>>,
    pub attendance: Vec<AttendanceRecord>,
}

#[async_trait::async_trait]
impl HrisDirectory for StubDirectory {
    async fn active_employees(&self) -> AppResult<Option<Vec<HrisEmployee>>> {
        Ok(self.employees.clone())
    }

    async fn departments(&self) -> AppResult<Option<Vec<HrisDepartment>>> {
        Ok(self.departments.clone())
    }

    async fn security_users(&self) -> AppResult<Option<Vec<HrisSecurityUser>>> {
        Ok(self.security_users.clone())
    }

    async fn department_assignments(&self) -> AppResult<Option<Vec<HrisDepartmentAssignment>>> {
        Ok(self.assignments.clone())
    }

    async fn attendance_for_employees(
        &self,
        employee_ids: &[i64],
        date: chrono::NaiveDate,
    ) -> AppResult<Vec<AttendanceRecord>> {
        let _ = date;
        Ok(self
            .attendance
            .iter()
            .filter(|r| employee_ids.contains(&r.employee_id))
            .cloned()
            .collect())
    }
}
