use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Why the server refused the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// Token expired or otherwise invalid; a fresh token may succeed.
    TokenRejected,
    /// The identity authenticated but has no database access. Permanent.
    IdentityUnauthorized,
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthRejection::TokenRejected => f.write_str("token rejected"),
            AuthRejection::IdentityUnauthorized => f.write_str("identity unauthorized"),
        }
    }
}

/// Failures while opening a session, classified for retry decisions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Authentication failed ({reason}): {cause}")]
    AuthenticationFailure { reason: AuthRejection, cause: String },

    #[error("Transport failure after {attempts} attempt(s): {cause}")]
    TransportFailure { attempts: u32, cause: String },

    #[error("Configuration failure: {cause}")]
    ConfigurationFailure { cause: String },
}

impl ConnectionError {
    pub fn token_rejected(cause: impl Into<String>) -> Self {
        ConnectionError::AuthenticationFailure {
            reason: AuthRejection::TokenRejected,
            cause: cause.into(),
        }
    }

    pub fn unauthorized(cause: impl Into<String>) -> Self {
        ConnectionError::AuthenticationFailure {
            reason: AuthRejection::IdentityUnauthorized,
            cause: cause.into(),
        }
    }

    pub fn transport(cause: impl Into<String>) -> Self {
        ConnectionError::TransportFailure {
            attempts: 1,
            cause: cause.into(),
        }
    }

    pub fn configuration(cause: impl Into<String>) -> Self {
        ConnectionError::ConfigurationFailure { cause: cause.into() }
    }

    /// Only an expired or invalid token is worth one retry with a new one.
    pub fn is_retryable_with_fresh_credential(&self) -> bool {
        matches!(
            self,
            ConnectionError::AuthenticationFailure {
                reason: AuthRejection::TokenRejected,
                ..
            }
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ConnectionError::AuthenticationFailure { .. } => "authentication",
            ConnectionError::TransportFailure { .. } => "transport",
            ConnectionError::ConfigurationFailure { .. } => "configuration",
        }
    }
}

impl From<ConfigError> for ConnectionError {
    fn from(err: ConfigError) -> Self {
        ConnectionError::configuration(err.to_string())
    }
}

/// Failures while executing statements on an open session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cannot map column {column}: {reason}")]
    Mapping { column: String, reason: String },
}

impl From<sqlx::Error> for QueryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { index, source } => QueryError::Mapping {
                column: index,
                reason: source.to_string(),
            },
            other => QueryError::Database(other.to_string()),
        }
    }
}
