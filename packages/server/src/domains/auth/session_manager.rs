//! Session lifecycle: login, rotation, validation, revocation.
//!
//! Failure semantics are fixed: every path surfaces one of
//! `invalid_token | expired_token | revoked_token | authentication |
//! not_found | validation`; callers never see a bare database error for a
//! bad credential or a replayed token.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::common::cache::Cache;
use crate::common::{clock, AppError, AppResult, DbErrorKind};
use crate::config::{CacheConfig, LocaleConfig, SessionConfig};
use crate::domains::audit::LogAuthentication;
use crate::domains::identity::User;

use super::hasher::Hasher;
use super::locale::resolve_locale;
use super::models::revoked_token::RevokedToken;
use super::models::session::Session;
use super::rate_limit::LoginRateLimiter;
use super::tokens::{Claims, IssuedToken, TokenAuthority, TokenType};

/// External directory credential check for HRIS-sourced users that carry no
/// local password hash. The LDAP probe itself lives outside the core.
#[async_trait]
pub trait DirectoryAuthenticator: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> AppResult<bool>;
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub fingerprint: Option<String>,
    pub locale_query: Option<String>,
    pub locale_cookie: Option<String>,
    pub accept_language: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub access_token: IssuedToken,
    pub refresh_token: IssuedToken,
    pub session_id: Uuid,
    pub locale: String,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: IssuedToken,
    pub refresh_token: IssuedToken,
}

/// Profile snapshot served on the read-only validation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSnapshot {
    pub user_id: Uuid,
    pub username: String,
    pub roles: Vec<String>,
    pub pages: Vec<String>,
    pub locale: String,
}

pub struct SessionManager {
    pool: PgPool,
    cache: Arc<dyn Cache>,
    tokens: Arc<TokenAuthority>,
    hasher: Arc<dyn Hasher>,
    directory: Option<Arc<dyn DirectoryAuthenticator>>,
    limiter: LoginRateLimiter,
    session_config: SessionConfig,
    locale_config: LocaleConfig,
    cache_config: CacheConfig,
}

impl SessionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        cache: Arc<dyn Cache>,
        tokens: Arc<TokenAuthority>,
        hasher: Arc<dyn Hasher>,
        directory: Option<Arc<dyn DirectoryAuthenticator>>,
        limiter: LoginRateLimiter,
        session_config: SessionConfig,
        locale_config: LocaleConfig,
        cache_config: CacheConfig,
    ) -> Self {
        Self {
            pool,
            cache,
            tokens,
            hasher,
            directory,
            limiter,
            session_config,
            locale_config,
            cache_config,
        }
    }

    /// Authenticate and open a session.
    pub async fn login(&self, request: LoginRequest) -> AppResult<LoginOutcome> {
        let rate_key = format!(
            "{}@{}",
            request.username.to_lowercase(),
            request.ip_address.as_deref().unwrap_or("unknown")
        );
        self.limiter.check(&rate_key).await?;

        let user = match User::find_by_username(&request.username, &self.pool).await? {
            Some(user) => user,
            None => {
                self.log_attempt(None, &request, false, "unknown username").await;
                return Err(AppError::Authentication);
            }
        };

        if user.is_blocked || !user.is_active {
            self.log_attempt(Some(&user), &request, false, "blocked or inactive").await;
            return Err(AppError::Authentication);
        }

        if !self.check_credentials(&user, &request.password).await? {
            self.log_attempt(Some(&user), &request, false, "bad credentials").await;
            return Err(AppError::Authentication);
        }

        let locale = resolve_locale(
            request.locale_query.as_deref(),
            request.locale_cookie.as_deref(),
            user.preferred_locale.as_deref(),
            request.accept_language.as_deref(),
            &self.locale_config,
        );

        let (scopes, roles) = self.scopes_and_roles(&user).await?;
        let access_token =
            self.tokens
                .issue_access(&user.username, user.id, scopes.clone(), roles.clone(), &locale)?;
        let refresh_token =
            self.tokens
                .issue_refresh(&user.username, user.id, scopes, roles, &locale)?;

        let session = Session::create(
            user.id,
            &refresh_token.jti,
            refresh_token.expires_at,
            request.device_info.as_deref(),
            request.ip_address.as_deref(),
            request.fingerprint.as_deref(),
            &locale,
            &self.pool,
        )
        .await?;

        let revoked = Session::enforce_limit(
            user.id,
            self.session_config.max_concurrent,
            Some(session.id),
            &self.pool,
        )
        .await?;
        for jti in &revoked {
            self.mark_session_invalid(jti).await;
        }
        if !revoked.is_empty() {
            info!(
                user_id = %user.id,
                revoked = revoked.len(),
                "concurrent session limit enforced"
            );
        }

        self.log_attempt(Some(&user), &request, true, "ok").await;

        Ok(LoginOutcome {
            access_token,
            refresh_token,
            session_id: session.id,
            locale,
        })
    }

    /// Rotate a refresh token for a fresh pair.
    ///
    /// The whole swap runs in one transaction with the session row locked;
    /// concurrent refreshes of the same token serialise here and all but the
    /// winner fail.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let claims = self.tokens.verify(refresh_token, TokenType::Refresh)?;
        self.ensure_not_revoked(&claims).await?;

        let user = User::find_by_id(claims.user_id, &self.pool)
            .await
            .map_err(|_| AppError::InvalidToken)?;
        if user.is_blocked || !user.is_active {
            return Err(AppError::Authentication);
        }

        let locale = claims.locale.clone();
        let (scopes, roles) = self.scopes_and_roles(&user).await?;
        let new_access =
            self.tokens
                .issue_access(&user.username, user.id, scopes.clone(), roles.clone(), &locale)?;
        let new_refresh =
            self.tokens
                .issue_refresh(&user.username, user.id, scopes, roles, &locale)?;

        let mut tx = self.pool.begin().await?;
        let session =
            Session::rotate_refresh_id(&claims.jti, &new_refresh.jti, Some(&locale), &mut tx)
                .await?;
        tx.commit().await?;

        debug!(session_id = %session.id, "refresh token rotated");
        Ok(TokenPair {
            access_token: new_access,
            refresh_token: new_refresh,
        })
    }

    /// Read-only validation for server-side rendering. Never rotates.
    pub async fn validate(&self, refresh_token: &str) -> AppResult<(Claims, ValidationSnapshot)> {
        let claims = self.tokens.verify(refresh_token, TokenType::Refresh)?;
        self.ensure_not_revoked(&claims).await?;

        let session = Session::find_by_refresh_id(&claims.jti, &self.pool)
            .await?
            .ok_or(AppError::InvalidToken)?;
        let now = clock::now();
        if session.revoked {
            return Err(AppError::RevokedToken);
        }
        if session.expires_at <= now {
            return Err(AppError::ExpiredToken);
        }

        let snapshot = self.snapshot(&claims).await?;
        Session::touch_last_seen(session.id, &self.pool).await?;
        Ok((claims, snapshot))
    }

    /// Revoke a single session by id.
    pub async fn revoke_session(&self, session_id: Uuid) -> AppResult<()> {
        let session = Session::find_by_id(session_id, &self.pool).await?;
        let jti = Session::revoke(session_id, &self.pool).await?;
        RevokedToken::record(&jti, "refresh", session.user_id, session.expires_at, &self.pool)
            .await?;
        self.mark_session_invalid(&jti).await;
        self.mark_token_revoked(&jti).await;
        Ok(())
    }

    /// Revoke every session for a user, optionally sparing the current one.
    pub async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        except: Option<Uuid>,
    ) -> AppResult<usize> {
        let jtis = Session::revoke_all_for_user(user_id, except, &self.pool).await?;
        for jti in &jtis {
            self.mark_session_invalid(jti).await;
        }
        Ok(jtis.len())
    }

    /// Revoke the session behind a refresh token (logout).
    pub async fn logout(&self, refresh_token: &str) -> AppResult<()> {
        let claims = self.tokens.verify(refresh_token, TokenType::Refresh)?;
        if let Some(session) = Session::find_by_refresh_id(&claims.jti, &self.pool).await? {
            Session::revoke(session.id, &self.pool).await?;
            RevokedToken::record(
                &claims.jti,
                "refresh",
                session.user_id,
                session.expires_at,
                &self.pool,
            )
            .await?;
        }
        self.mark_session_invalid(&claims.jti).await;
        self.mark_token_revoked(&claims.jti).await;
        Ok(())
    }

    pub async fn list_sessions(&self, user_id: Uuid) -> AppResult<Vec<Session>> {
        Session::list_by_user(user_id, &self.pool).await
    }

    /// Drop expired sessions and spent revocation rows. Registered as the
    /// `session_cleanup` task function.
    pub async fn cleanup_expired(&self) -> AppResult<(u64, u64)> {
        let sessions = Session::cleanup_expired(&self.pool).await?;
        let tokens = RevokedToken::cleanup_expired(&self.pool).await?;
        if sessions > 0 || tokens > 0 {
            info!(sessions, tokens, "expired session state cleaned up");
        }
        Ok((sessions, tokens))
    }

    async fn check_credentials(&self, user: &User, password: &str) -> AppResult<bool> {
        if let Some(hash) = &user.password_hash {
            // bcrypt is deliberately slow; keep it off the async threads.
            let hasher = self.hasher.clone();
            let plain = password.to_string();
            let hash_owned = hash.clone();
            let matched = tokio::task::spawn_blocking(move || hasher.verify(&plain, &hash_owned))
                .await
                .map_err(|e| AppError::Database {
                    kind: DbErrorKind::Other,
                    message: format!("hash verification task failed: {e}"),
                })?;

            if matched && self.hasher.needs_rehash(hash) {
                self.upgrade_hash(user, password.to_string()).await;
            }
            return Ok(matched);
        }

        // No local hash: HRIS-sourced users authenticate against the
        // external directory.
        match &self.directory {
            Some(directory) => directory.authenticate(&user.username, password).await,
            None => {
                warn!(username = %user.username, "no password hash and no directory configured");
                Ok(false)
            }
        }
    }

    async fn upgrade_hash(&self, user: &User, password: String) {
        let hasher = self.hasher.clone();
        let rehash = tokio::task::spawn_blocking(move || hasher.hash(&password)).await;
        if let Ok(Ok(new_hash)) = rehash {
            let update = sqlx::query(
                "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(user.id)
            .bind(&new_hash)
            .execute(&self.pool)
            .await;
            match update {
                Ok(_) => debug!(user_id = %user.id, "password hash upgraded"),
                Err(e) => warn!(user_id = %user.id, "password hash upgrade failed: {e}"),
            }
        }
    }

    async fn scopes_and_roles(&self, user: &User) -> AppResult<(Vec<String>, Vec<String>)> {
        let roles = User::role_names(user.id, &self.pool).await?;
        let mut scopes: Vec<String> = roles.iter().map(|r| r.to_lowercase()).collect();
        if user.is_super_admin {
            scopes.push("super_admin".to_string());
        }
        Ok((scopes, roles))
    }

    /// Reject tokens whose jti is known revoked, consulting the positive
    /// cache before the authoritative table. With the cache down every check
    /// falls through to the store and the decision is unchanged.
    async fn ensure_not_revoked(&self, claims: &Claims) -> AppResult<()> {
        if self.cache.exists(&format!("revoked_token:{}", claims.jti)).await
            || self.cache.exists(&format!("session_invalid:{}", claims.jti)).await
        {
            return Err(AppError::RevokedToken);
        }
        if RevokedToken::is_revoked(&claims.jti, &self.pool).await? {
            self.mark_token_revoked(&claims.jti).await;
            return Err(AppError::RevokedToken);
        }
        Ok(())
    }

    async fn snapshot(&self, claims: &Claims) -> AppResult<ValidationSnapshot> {
        let key = format!("session_snapshot:{}:{}", claims.user_id, claims.locale);
        if let Some(raw) = self.cache.get(&key).await {
            if let Ok(snapshot) = serde_json::from_str::<ValidationSnapshot>(&raw) {
                return Ok(snapshot);
            }
        }

        let user = User::find_by_id(claims.user_id, &self.pool).await?;
        let roles = User::role_names(user.id, &self.pool).await?;
        let pages = User::accessible_page_keys(user.id, &self.pool).await?;
        let snapshot = ValidationSnapshot {
            user_id: user.id,
            username: user.username,
            roles,
            pages,
            locale: claims.locale.clone(),
        };

        if let Ok(raw) = serde_json::to_string(&snapshot) {
            self.cache
                .set(
                    &key,
                    &raw,
                    StdDuration::from_secs(self.cache_config.session_cache_ttl_seconds.min(300)),
                )
                .await;
        }
        Ok(snapshot)
    }

    async fn mark_token_revoked(&self, jti: &str) {
        self.cache
            .set(
                &format!("revoked_token:{jti}"),
                "1",
                StdDuration::from_secs(self.cache_config.revoked_token_ttl_seconds),
            )
            .await;
    }

    async fn mark_session_invalid(&self, jti: &str) {
        self.cache
            .set(
                &format!("session_invalid:{jti}"),
                "1",
                StdDuration::from_secs(60),
            )
            .await;
    }

    async fn log_attempt(
        &self,
        user: Option<&User>,
        request: &LoginRequest,
        success: bool,
        detail: &str,
    ) {
        let log = LogAuthentication::new(
            user.map(|u| u.id),
            &request.username,
            success,
            request.ip_address.as_deref(),
            request.device_info.as_deref(),
            serde_json::json!({ "detail": detail }),
        );
        if let Err(e) = log.insert(&self.pool).await {
            warn!("failed to write authentication log: {e}");
        }
    }
}
