//! Refresh and locale cookie construction.
//!
//! The core never writes HTTP responses; it produces fully configured
//! `Cookie` values that the transport layer serialises verbatim.

use cookie::time::Duration as CookieDuration;
use cookie::{Cookie, SameSite};

use crate::config::{LocaleConfig, SessionConfig};

fn parse_same_site(raw: &str) -> SameSite {
    match raw.to_ascii_lowercase().as_str() {
        "strict" => SameSite::Strict,
        "none" => SameSite::None,
        _ => SameSite::Lax,
    }
}

/// Build the HttpOnly refresh-token cookie.
pub fn refresh_cookie(config: &SessionConfig, refresh_token: &str) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), refresh_token.to_string()))
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(parse_same_site(&config.cookie_samesite))
        .path("/")
        .max_age(CookieDuration::seconds(
            config.refresh_lifetime_days * 86_400,
        ))
        .build()
}

/// Build the (non-HttpOnly) locale cookie.
pub fn locale_cookie(config: &LocaleConfig, locale: &str) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), locale.to_string()))
        .path("/")
        .max_age(CookieDuration::seconds(config.cookie_max_age_days * 86_400))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_config() -> SessionConfig {
        SessionConfig {
            cookie_name: "refresh_token".to_string(),
            cookie_secure: true,
            cookie_samesite: "lax".to_string(),
            refresh_lifetime_days: 7,
            max_concurrent: 5,
        }
    }

    #[test]
    fn refresh_cookie_is_locked_down() {
        let cookie = refresh_cookie(&session_config(), "tok");
        assert_eq!(cookie.name(), "refresh_token");
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(
            cookie.max_age(),
            Some(CookieDuration::seconds(7 * 86_400))
        );
    }

    #[test]
    fn same_site_falls_back_to_lax() {
        let mut config = session_config();
        config.cookie_samesite = "bogus".to_string();
        let cookie = refresh_cookie(&config, "tok");
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }
}
