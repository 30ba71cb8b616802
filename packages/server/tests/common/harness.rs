//! Database test harness.
//!
//! Integration tests run against a real Postgres named by
//! `TEST_DATABASE_URL` (falling back to `DATABASE_URL`) and bootstrap the
//! schema themselves; they are `#[ignore]`d so a plain `cargo test` passes
//! without a database.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

const SCHEMA: &str = include_str!("schema.sql");

/// Connect to the test database and ensure the schema exists.
pub async fn test_pool() -> PgPool {
    let url = std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("TEST_DATABASE_URL or DATABASE_URL must point at a Postgres instance");
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await
        .expect("connect to test database");
    sqlx::raw_sql(SCHEMA)
        .execute(&pool)
        .await
        .expect("bootstrap test schema");
    pool
}

/// Short unique suffix so concurrent tests never collide on unique columns.
pub fn unique(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &id[..12])
}
