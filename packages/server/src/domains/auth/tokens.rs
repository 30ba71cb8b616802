//! Token authority: signs and verifies the two bearer token types.
//!
//! Access and refresh tokens share one claim envelope and differ in `type`
//! and lifetime. Verification is call-site typed: an access token presented
//! where a refresh token is expected fails as `invalid_token`, never as a
//! silent success.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::common::clock;
use crate::common::{AppError, AppResult};
use crate::config::AuthConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claim envelope shared by both token types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub user_id: Uuid,
    pub scopes: Vec<String>,
    pub roles: Vec<String>,
    pub locale: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

/// A freshly signed token plus the metadata callers persist.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    access_token_minutes: i64,
    refresh_token_days: i64,
}

impl TokenAuthority {
    /// Build from configuration.
    ///
    /// A missing secret is only tolerated when the environment is explicitly
    /// local development, in which case a throwaway secret is synthesised;
    /// every restart then invalidates outstanding tokens.
    pub fn from_config(auth: &AuthConfig, is_local: bool) -> anyhow::Result<Self> {
        let secret = match (&auth.jwt_secret, is_local) {
            (Some(secret), _) => secret.clone(),
            (None, true) => {
                warn!("JWT_SECRET not set; synthesising a local-development secret");
                format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
            }
            (None, false) => anyhow::bail!("JWT_SECRET must be set outside local development"),
        };
        let algorithm = Algorithm::from_str(&auth.jwt_algorithm)
            .map_err(|_| anyhow::anyhow!("unsupported JWT algorithm: {}", auth.jwt_algorithm))?;

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
            access_token_minutes: auth.access_token_minutes,
            refresh_token_days: auth.refresh_token_days,
        })
    }

    pub fn issue_access(
        &self,
        username: &str,
        user_id: Uuid,
        scopes: Vec<String>,
        roles: Vec<String>,
        locale: &str,
    ) -> AppResult<IssuedToken> {
        self.issue(
            username,
            user_id,
            scopes,
            roles,
            locale,
            TokenType::Access,
            Duration::minutes(self.access_token_minutes),
        )
    }

    pub fn issue_refresh(
        &self,
        username: &str,
        user_id: Uuid,
        scopes: Vec<String>,
        roles: Vec<String>,
        locale: &str,
    ) -> AppResult<IssuedToken> {
        self.issue(
            username,
            user_id,
            scopes,
            roles,
            locale,
            TokenType::Refresh,
            Duration::days(self.refresh_token_days),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn issue(
        &self,
        username: &str,
        user_id: Uuid,
        scopes: Vec<String>,
        roles: Vec<String>,
        locale: &str,
        token_type: TokenType,
        lifetime: Duration,
    ) -> AppResult<IssuedToken> {
        let now = clock::now();
        let expires_at = now + lifetime;
        let jti = Uuid::new_v4().to_string();
        let claims = Claims {
            sub: username.to_string(),
            user_id,
            scopes,
            roles,
            locale: locale.to_string(),
            token_type,
            jti: jti.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };
        let token = jsonwebtoken::encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|_| AppError::InvalidToken)?;
        Ok(IssuedToken {
            token,
            jti,
            expires_at,
        })
    }

    /// Verify a token and require it to be of the expected type.
    pub fn verify(&self, token: &str, expected: TokenType) -> AppResult<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::InvalidToken,
            },
        )?;

        if data.claims.token_type != expected {
            return Err(AppError::InvalidToken);
        }
        Ok(data.claims)
    }

    pub fn access_token_lifetime(&self) -> Duration {
        Duration::minutes(self.access_token_minutes)
    }

    pub fn refresh_token_lifetime(&self) -> Duration {
        Duration::days(self.refresh_token_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> TokenAuthority {
        let auth = AuthConfig {
            jwt_secret: Some("test-secret".to_string()),
            jwt_algorithm: "HS256".to_string(),
            access_token_minutes: 15,
            refresh_token_days: 7,
        };
        TokenAuthority::from_config(&auth, false).expect("authority builds")
    }

    #[test]
    fn access_token_round_trips() {
        let authority = authority();
        let user_id = Uuid::new_v4();
        let issued = authority
            .issue_access("jdoe", user_id, vec!["requester".into()], vec!["Requester".into()], "en")
            .expect("issue");

        let claims = authority
            .verify(&issued.token, TokenType::Access)
            .expect("verify");
        assert_eq!(claims.sub, "jdoe");
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.locale, "en");
    }

    #[test]
    fn refresh_token_rejected_at_access_call_site() {
        let authority = authority();
        let issued = authority
            .issue_refresh("jdoe", Uuid::new_v4(), vec![], vec![], "en")
            .expect("issue");

        let err = authority
            .verify(&issued.token, TokenType::Access)
            .expect_err("type mismatch");
        assert_eq!(err.kind(), "invalid_token");
    }

    #[test]
    fn garbage_is_invalid_token() {
        let authority = authority();
        let err = authority
            .verify("not-a-token", TokenType::Access)
            .expect_err("garbage");
        assert_eq!(err.kind(), "invalid_token");
    }

    #[test]
    fn wrong_secret_is_invalid_token() {
        let issued = authority()
            .issue_access("jdoe", Uuid::new_v4(), vec![], vec![], "en")
            .expect("issue");

        let other = TokenAuthority::from_config(
            &AuthConfig {
                jwt_secret: Some("different-secret".to_string()),
                jwt_algorithm: "HS256".to_string(),
                access_token_minutes: 15,
                refresh_token_days: 7,
            },
            false,
        )
        .expect("authority builds");

        let err = other
            .verify(&issued.token, TokenType::Access)
            .expect_err("bad signature");
        assert_eq!(err.kind(), "invalid_token");
    }

    #[test]
    fn missing_secret_outside_local_is_fatal() {
        let auth = AuthConfig {
            jwt_secret: None,
            jwt_algorithm: "HS256".to_string(),
            access_token_minutes: 15,
            refresh_token_days: 7,
        };
        assert!(TokenAuthority::from_config(&auth, false).is_err());
        assert!(TokenAuthority::from_config(&auth, true).is_ok());
    }
}
