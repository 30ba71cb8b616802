//! Application-wide error kinds.
//!
//! Every component fails with one of these kinds; boundary adapters translate
//! them into protocol responses. Database errors keep enough structure that
//! callers can distinguish unique-key violations, foreign-key violations and
//! deadlocks without parsing driver messages.

use thiserror::Error;
use uuid::Uuid;

/// Distinguishable classes of database failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    UniqueViolation,
    ForeignKeyViolation,
    Deadlock,
    Other,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{entity} not found: {identifier}")]
    NotFound {
        entity: &'static str,
        identifier: String,
    },

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Authorization(String),

    /// Authentication failures never reveal which part of the credential
    /// check failed.
    #[error("invalid credentials")]
    Authentication,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    ExpiredToken,

    #[error("token revoked")]
    RevokedToken,

    #[error("status already changed: expected {expected}, current {current}")]
    StatusAlreadyChanged { expected: i32, current: i32 },

    #[error("database error: {message}")]
    Database { kind: DbErrorKind, message: String },

    #[error("external system unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("lock held")]
    LockHeld,

    #[error("timed out after {0} seconds")]
    Timeout(u64),
}

impl AppError {
    pub fn not_found(entity: &'static str, identifier: impl ToString) -> Self {
        Self::NotFound {
            entity,
            identifier: identifier.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization(message.into())
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::ExternalUnavailable(message.into())
    }

    /// Validation error for a duplicate manual trigger, carrying the id of
    /// the execution that is already in flight.
    pub fn duplicate_trigger(execution_id: Uuid) -> Self {
        Self::Validation(format!(
            "job already has an execution in progress (execution_id: {execution_id})"
        ))
    }

    /// Stable snake_case name of the error kind, for logs and callers that
    /// match on kind rather than message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::Authorization(_) => "authorization",
            Self::Authentication => "authentication",
            Self::InvalidToken => "invalid_token",
            Self::ExpiredToken => "expired_token",
            Self::RevokedToken => "revoked_token",
            Self::StatusAlreadyChanged { .. } => "status_already_changed",
            Self::Database { .. } => "database",
            Self::ExternalUnavailable(_) => "external_unavailable",
            Self::LockHeld => "lock_held",
            Self::Timeout(_) => "timeout",
        }
    }

    pub fn db_kind(&self) -> Option<DbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let kind = match err.as_database_error().and_then(|e| e.code()) {
            Some(code) => match code.as_ref() {
                "23505" => DbErrorKind::UniqueViolation,
                "23503" => DbErrorKind::ForeignKeyViolation,
                "40001" | "40P01" => DbErrorKind::Deadlock,
                _ => DbErrorKind::Other,
            },
            None => DbErrorKind::Other,
        };
        Self::Database {
            kind,
            message: err.to_string(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(AppError::not_found("Session", "x").kind(), "not_found");
        assert_eq!(AppError::Authentication.kind(), "authentication");
        assert_eq!(AppError::LockHeld.kind(), "lock_held");
        assert_eq!(
            AppError::StatusAlreadyChanged {
                expected: 1,
                current: 2
            }
            .kind(),
            "status_already_changed"
        );
    }

    #[test]
    fn authentication_reveals_nothing() {
        assert_eq!(AppError::Authentication.to_string(), "invalid credentials");
    }

    #[test]
    fn duplicate_trigger_mentions_execution_id() {
        let id = Uuid::new_v4();
        let err = AppError::duplicate_trigger(id);
        assert!(err.to_string().contains(&id.to_string()));
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn row_not_found_maps_to_database_other() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.db_kind(), Some(DbErrorKind::Other));
    }
}
