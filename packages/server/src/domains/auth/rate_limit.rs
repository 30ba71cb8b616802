//! Fixed-window login rate limiter.
//!
//! Keys are `username@ip`; the window and budget come from the
//! `LOGIN_RATE_LIMIT` setting (e.g. `"10/min"`). The limiter is in-process;
//! it bounds credential-stuffing per instance, while the authoritative
//! lockout remains `is_blocked` on the user row.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::common::{AppError, AppResult};

/// Parsed limit such as `10/min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_attempts: u32,
    pub window: Duration,
}

impl FromStr for RateLimit {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (count, unit) = raw
            .split_once('/')
            .ok_or_else(|| AppError::validation(format!("invalid rate limit: {raw:?}")))?;
        let max_attempts: u32 = count
            .trim()
            .parse()
            .map_err(|_| AppError::validation(format!("invalid rate limit count: {raw:?}")))?;
        if max_attempts == 0 {
            return Err(AppError::validation("rate limit count must be positive"));
        }
        let window = match unit.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" => Duration::from_secs(1),
            "m" | "min" | "minute" => Duration::from_secs(60),
            "h" | "hour" => Duration::from_secs(3600),
            other => {
                return Err(AppError::validation(format!(
                    "invalid rate limit unit: {other:?}"
                )))
            }
        };
        Ok(Self {
            max_attempts,
            window,
        })
    }
}

struct Window {
    started_at: Instant,
    attempts: u32,
}

pub struct LoginRateLimiter {
    limit: RateLimit,
    windows: Mutex<HashMap<String, Window>>,
}

impl LoginRateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_setting(raw: &str) -> AppResult<Self> {
        Ok(Self::new(raw.parse()?))
    }

    /// Record an attempt for `key`, rejecting once the window budget is
    /// spent.
    pub async fn check(&self, key: &str) -> AppResult<()> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        // Expired windows are dropped wholesale so the map stays bounded.
        windows.retain(|_, w| now.duration_since(w.started_at) < self.limit.window);

        let window = windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            attempts: 0,
        });
        if window.attempts >= self.limit.max_attempts {
            return Err(AppError::validation(
                "too many login attempts, try again later",
            ));
        }
        window.attempts += 1;
        Ok(())
    }
}
