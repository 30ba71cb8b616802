use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub hris_database_url: String,
    /// Deployment environment. A JWT secret may be synthesised only when
    /// this is explicitly "local".
    pub environment: String,
    pub auth: AuthConfig,
    pub session: SessionConfig,
    pub locale: LocaleConfig,
    pub scheduler: SchedulerConfig,
    pub attendance: AttendanceConfig,
    pub cache: CacheConfig,
    /// Route job dispatch to the external task queue when true.
    pub queue_enabled: bool,
    /// Login rate limit, e.g. "10/min".
    pub login_rate_limit: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
    pub jwt_algorithm: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub cookie_samesite: String,
    pub refresh_lifetime_days: i64,
    pub max_concurrent: i64,
}

#[derive(Debug, Clone)]
pub struct LocaleConfig {
    pub default: String,
    pub supported: Vec<String>,
    pub cookie_name: String,
    pub cookie_max_age_days: i64,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub instance_name: Option<String>,
    pub mode: String,
    pub heartbeat_seconds: u64,
    pub stale_threshold_seconds: i64,
    pub lock_duration_seconds: i64,
    pub history_retention_days: i64,
    pub manual_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct AttendanceConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
    pub months_back: i32,
    pub min_shift_hours: f64,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: Option<String>,
    pub revoked_token_ttl_seconds: u64,
    pub session_cache_ttl_seconds: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let access_token_minutes = env_i64("ACCESS_TOKEN_MINUTES", 15)?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            hris_database_url: env::var("HRIS_DATABASE_URL")
                .context("HRIS_DATABASE_URL must be set")?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "production".to_string()),
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET").ok(),
                jwt_algorithm: env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string()),
                access_token_minutes,
                refresh_token_days: env_i64("REFRESH_TOKEN_DAYS", 7)?,
            },
            session: SessionConfig {
                cookie_name: env::var("SESSION_COOKIE_NAME")
                    .unwrap_or_else(|_| "refresh_token".to_string()),
                cookie_secure: env_bool("SESSION_COOKIE_SECURE", true)?,
                cookie_samesite: env::var("SESSION_COOKIE_SAMESITE")
                    .unwrap_or_else(|_| "lax".to_string()),
                refresh_lifetime_days: env_i64("SESSION_REFRESH_LIFETIME_DAYS", 7)?,
                max_concurrent: env_i64("SESSION_MAX_CONCURRENT", 5)?,
            },
            locale: LocaleConfig {
                default: env::var("LOCALE_DEFAULT").unwrap_or_else(|_| "en".to_string()),
                supported: env::var("LOCALE_SUPPORTED")
                    .unwrap_or_else(|_| "en,ar".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                cookie_name: env::var("LOCALE_COOKIE_NAME")
                    .unwrap_or_else(|_| "locale".to_string()),
                cookie_max_age_days: env_i64("LOCALE_COOKIE_MAX_AGE_DAYS", 365)?,
            },
            scheduler: SchedulerConfig {
                enabled: env_bool("SCHEDULER_ENABLED", true)?,
                instance_name: env::var("SCHEDULER_INSTANCE_NAME").ok(),
                mode: env::var("SCHEDULER_MODE").unwrap_or_else(|_| "embedded".to_string()),
                heartbeat_seconds: env_i64("SCHEDULER_HEARTBEAT_SECONDS", 30)? as u64,
                stale_threshold_seconds: env_i64("SCHEDULER_STALE_THRESHOLD_SECONDS", 300)?,
                lock_duration_seconds: env_i64("SCHEDULER_LOCK_DURATION_SECONDS", 3600)?,
                history_retention_days: env_i64("SCHEDULER_HISTORY_RETENTION_DAYS", 30)?,
                manual_timeout_seconds: env_i64("SCHEDULER_MANUAL_TIMEOUT_SECONDS", 15)? as u64,
            },
            attendance: AttendanceConfig {
                enabled: env_bool("ATTENDANCE_SYNC_ENABLED", true)?,
                interval_minutes: env_i64("ATTENDANCE_SYNC_INTERVAL_MINUTES", 30)? as u64,
                months_back: env_i64("ATTENDANCE_MONTHS_BACK", 3)? as i32,
                min_shift_hours: env::var("ATTENDANCE_MIN_SHIFT_HOURS")
                    .unwrap_or_else(|_| "4".to_string())
                    .parse()
                    .context("ATTENDANCE_MIN_SHIFT_HOURS must be a number")?,
            },
            cache: CacheConfig {
                redis_url: env::var("REDIS_URL").ok(),
                revoked_token_ttl_seconds: env_i64(
                    "REVOKED_TOKEN_TTL_SECONDS",
                    access_token_minutes * 60,
                )? as u64,
                session_cache_ttl_seconds: env_i64("SESSION_CACHE_TTL_SECONDS", 300)? as u64,
            },
            queue_enabled: env_bool("QUEUE_ENABLED", false)?,
            login_rate_limit: env::var("LOGIN_RATE_LIMIT").unwrap_or_else(|_| "10/min".to_string()),
        })
    }

    /// Whether the deployment is explicitly declared local development.
    pub fn is_local(&self) -> bool {
        self.environment.eq_ignore_ascii_case("local")
    }
}

fn env_i64(key: &str, default: i64) -> Result<i64> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{key} must be a valid number")),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => anyhow::bail!("{key} must be a boolean, got {other:?}"),
        },
        Err(_) => Ok(default),
    }
}
