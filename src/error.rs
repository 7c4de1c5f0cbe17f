// Data access error types surfaced to callers
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::catalog::StatementError;
use crate::config::ConfigError;
use crate::credential::CredentialError;
use crate::database::{ConnectionError, QueryError};
use crate::filter::FilterError;

/// Underlying failure carried by a [`DataAccessError`].
#[derive(Debug, Error, Clone)]
pub enum Cause {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Statement(#[from] StatementError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The only error type the facade returns.
///
/// `Display` includes the underlying cause for logs and operators; callers
/// showing errors to end users should use [`DataAccessError::user_message`].
#[derive(Debug, Error, Clone)]
pub enum DataAccessError {
    #[error("Authentication failed: {0}")]
    AuthFailed(#[source] Cause),

    #[error("Query failed: {0}")]
    QueryFailed(#[source] Cause),

    #[error("Service unavailable: {0}")]
    Unavailable(#[source] Cause),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataAccessErrorKind {
    AuthFailed,
    QueryFailed,
    Unavailable,
}

impl DataAccessError {
    pub fn kind(&self) -> DataAccessErrorKind {
        match self {
            DataAccessError::AuthFailed(_) => DataAccessErrorKind::AuthFailed,
            DataAccessError::QueryFailed(_) => DataAccessErrorKind::QueryFailed,
            DataAccessError::Unavailable(_) => DataAccessErrorKind::Unavailable,
        }
    }

    pub fn cause(&self) -> &Cause {
        match self {
            DataAccessError::AuthFailed(cause)
            | DataAccessError::QueryFailed(cause)
            | DataAccessError::Unavailable(cause) => cause,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            DataAccessError::AuthFailed(_) => "AUTH_FAILED",
            DataAccessError::QueryFailed(_) => "QUERY_FAILED",
            DataAccessError::Unavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Client-safe message. Never contains database or identity error text.
    pub fn user_message(&self) -> &'static str {
        match self.cause() {
            Cause::Filter(_) | Cause::Statement(_) => "The request could not be processed",
            _ => "Service temporarily unavailable",
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.user_message(),
            "code": self.error_code()
        })
    }
}

impl From<CredentialError> for DataAccessError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Exhausted { .. } => DataAccessError::AuthFailed(err.into()),
            CredentialError::SourceFailure { .. } => DataAccessError::Unavailable(err.into()),
        }
    }
}

impl From<ConnectionError> for DataAccessError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::AuthenticationFailure { .. } => DataAccessError::AuthFailed(err.into()),
            ConnectionError::TransportFailure { .. } | ConnectionError::ConfigurationFailure { .. } => {
                DataAccessError::Unavailable(err.into())
            }
        }
    }
}

impl From<QueryError> for DataAccessError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Timeout(_) => DataAccessError::Unavailable(err.into()),
            QueryError::Database(_) | QueryError::Mapping { .. } => DataAccessError::QueryFailed(err.into()),
        }
    }
}

impl From<FilterError> for DataAccessError {
    fn from(err: FilterError) -> Self {
        DataAccessError::QueryFailed(err.into())
    }
}

impl From<StatementError> for DataAccessError {
    fn from(err: StatementError) -> Self {
        DataAccessError::QueryFailed(err.into())
    }
}

impl From<ConfigError> for DataAccessError {
    fn from(err: ConfigError) -> Self {
        DataAccessError::Unavailable(err.into())
    }
}
