//! Authentication domain: token authority, sessions, and their supporting
//! capabilities (hashing, locale resolution, rate limiting, cookies).

pub mod cookie;
pub mod hasher;
pub mod locale;
pub mod models;
pub mod rate_limit;
pub mod session_manager;
pub mod tokens;

pub use hasher::{BcryptHasher, Hasher};
pub use locale::resolve_locale;
pub use models::revoked_token::RevokedToken;
pub use models::session::Session;
pub use rate_limit::{LoginRateLimiter, RateLimit};
pub use session_manager::{
    DirectoryAuthenticator, LoginOutcome, LoginRequest, SessionManager, TokenPair,
    ValidationSnapshot,
};
pub use tokens::{Claims, IssuedToken, TokenAuthority, TokenType};
