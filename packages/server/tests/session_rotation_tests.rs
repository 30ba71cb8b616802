//! Session lifecycle integration tests.
//!
//! These hit a real Postgres (TEST_DATABASE_URL) and are ignored by default:
//! `cargo test -- --ignored` runs them.

mod common;

use std::sync::Arc;

use common::*;
use mealdesk_core::common::cache::{MemoryCache, NoopCache};
use mealdesk_core::domains::auth::session_manager::LoginRequest;
use mealdesk_core::domains::auth::Session;

fn login_request(username: &str, password: &str) -> LoginRequest {
    LoginRequest {
        username: username.to_string(),
        password: password.to_string(),
        device_info: Some("integration-test".to_string()),
        ip_address: Some("10.0.0.1".to_string()),
        fingerprint: None,
        locale_query: None,
        locale_cookie: None,
        accept_language: Some("en-US,en;q=0.9".to_string()),
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn login_refresh_validate_round_trip() {
    let pool = test_pool().await;
    let username = unique("jdoe");
    let user = create_user(&pool, &username, Some("hunter2")).await;
    let manager = session_manager(pool.clone(), Arc::new(NoopCache), 5);

    let outcome = manager
        .login(login_request(&username, "hunter2"))
        .await
        .expect("login succeeds");
    assert_eq!(outcome.locale, "en");

    let pair = manager
        .refresh(&outcome.refresh_token.token)
        .await
        .expect("refresh succeeds");

    let (claims, snapshot) = manager
        .validate(&pair.refresh_token.token)
        .await
        .expect("validate succeeds");
    assert_eq!(claims.user_id, user.id);
    assert_eq!(snapshot.username.to_lowercase(), username.to_lowercase());
    assert_eq!(claims.locale, "en");
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn wrong_password_is_invalid_credentials() {
    let pool = test_pool().await;
    let username = unique("jdoe");
    create_user(&pool, &username, Some("hunter2")).await;
    let manager = session_manager(pool.clone(), Arc::new(NoopCache), 5);

    let err = manager
        .login(login_request(&username, "wrong"))
        .await
        .expect_err("login fails");
    assert_eq!(err.kind(), "authentication");
    assert_eq!(err.to_string(), "invalid credentials");
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn refresh_race_has_exactly_one_winner() {
    let pool = test_pool().await;
    let username = unique("jdoe");
    create_user(&pool, &username, Some("hunter2")).await;
    let manager = Arc::new(session_manager(pool.clone(), Arc::new(NoopCache), 5));

    let outcome = manager
        .login(login_request(&username, "hunter2"))
        .await
        .expect("login succeeds");
    let stolen = outcome.refresh_token.token.clone();

    let (a, b) = tokio::join!(manager.refresh(&stolen), manager.refresh(&stolen));
    let (winner, loser) = match (a, b) {
        (Ok(pair), Err(e)) | (Err(e), Ok(pair)) => (pair, e),
        (Ok(_), Ok(_)) => panic!("both refreshes succeeded"),
        (Err(a), Err(b)) => panic!("both refreshes failed: {a} / {b}"),
    };
    assert!(
        matches!(
            loser.kind(),
            "invalid_token" | "expired_token" | "revoked_token"
        ),
        "unexpected loser kind: {}",
        loser.kind()
    );

    let session = Session::find_by_id(outcome.session_id, &pool)
        .await
        .expect("session row");
    assert!(!session.revoked);
    assert_eq!(session.refresh_token_id, winner.refresh_token.jti);
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn replayed_refresh_token_is_rejected() {
    let pool = test_pool().await;
    let username = unique("jdoe");
    create_user(&pool, &username, Some("hunter2")).await;
    let manager = session_manager(pool.clone(), Arc::new(NoopCache), 5);

    let outcome = manager
        .login(login_request(&username, "hunter2"))
        .await
        .expect("login succeeds");
    manager
        .refresh(&outcome.refresh_token.token)
        .await
        .expect("first refresh succeeds");

    let err = manager
        .refresh(&outcome.refresh_token.token)
        .await
        .expect_err("replay fails");
    assert!(matches!(
        err.kind(),
        "invalid_token" | "expired_token" | "revoked_token"
    ));
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn concurrent_session_limit_revokes_oldest() {
    let pool = test_pool().await;
    let username = unique("jdoe");
    let user = create_user(&pool, &username, Some("hunter2")).await;
    let manager = session_manager(pool.clone(), Arc::new(NoopCache), 2);

    let first = manager
        .login(login_request(&username, "hunter2"))
        .await
        .expect("first login");
    let _second = manager
        .login(login_request(&username, "hunter2"))
        .await
        .expect("second login");
    let _third = manager
        .login(login_request(&username, "hunter2"))
        .await
        .expect("third login");

    let sessions = Session::list_by_user(user.id, &pool).await.expect("sessions");
    assert_eq!(sessions.len(), 3, "three session rows created");

    let active: Vec<_> = sessions.iter().filter(|s| !s.revoked).collect();
    assert_eq!(active.len(), 2, "only two sessions remain active");

    let oldest = sessions
        .iter()
        .min_by_key(|s| s.created_at)
        .expect("oldest session");
    assert_eq!(oldest.id, first.session_id);
    assert!(oldest.revoked, "oldest session was revoked");
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn logout_revokes_the_session() {
    let pool = test_pool().await;
    let username = unique("jdoe");
    create_user(&pool, &username, Some("hunter2")).await;
    let manager = session_manager(pool.clone(), Arc::new(MemoryCache::new()), 5);

    let outcome = manager
        .login(login_request(&username, "hunter2"))
        .await
        .expect("login succeeds");
    manager
        .logout(&outcome.refresh_token.token)
        .await
        .expect("logout succeeds");

    let err = manager
        .refresh(&outcome.refresh_token.token)
        .await
        .expect_err("refresh after logout fails");
    assert_eq!(err.kind(), "revoked_token");

    let session = Session::find_by_id(outcome.session_id, &pool)
        .await
        .expect("session row");
    assert!(session.revoked);
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn blocked_user_cannot_login() {
    let pool = test_pool().await;
    let username = unique("jdoe");
    let user = create_user(&pool, &username, Some("hunter2")).await;
    sqlx::query("UPDATE users SET is_blocked = true WHERE id = $1")
        .bind(user.id)
        .execute(&pool)
        .await
        .expect("block user");

    let manager = session_manager(pool.clone(), Arc::new(NoopCache), 5);
    let err = manager
        .login(login_request(&username, "hunter2"))
        .await
        .expect_err("blocked login fails");
    assert_eq!(err.kind(), "authentication");
}

#[tokio::test]
#[ignore = "requires PostgreSQL via TEST_DATABASE_URL"]
async fn cache_disabled_and_enabled_agree() {
    // The cache holds only negative knowledge: with it disabled every
    // decision must be identical, just slower.
    let pool = test_pool().await;
    let username = unique("jdoe");
    create_user(&pool, &username, Some("hunter2")).await;

    for cache in [
        Arc::new(NoopCache) as Arc<dyn mealdesk_core::common::cache::Cache>,
        Arc::new(MemoryCache::new()),
    ] {
        let manager = session_manager(pool.clone(), cache, 5);
        let outcome = manager
            .login(login_request(&username, "hunter2"))
            .await
            .expect("login succeeds");
        manager
            .validate(&outcome.refresh_token.token)
            .await
            .expect("validate succeeds");
        manager
            .logout(&outcome.refresh_token.token)
            .await
            .expect("logout succeeds");
        let err = manager
            .validate(&outcome.refresh_token.token)
            .await
            .expect_err("validate after logout fails");
        assert_eq!(err.kind(), "revoked_token");
    }
}
