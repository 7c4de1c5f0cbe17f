//! Map connect-time driver errors onto [`ConnectionError`] kinds.

use super::error::ConnectionError;

/// SQLSTATE `28P01` invalid_password: the token was refused (usually expired).
const INVALID_PASSWORD: &str = "28P01";
/// SQLSTATE `28000` invalid_authorization_specification: unknown role or no
/// matching access rule for the identity.
const INVALID_AUTHORIZATION: &str = "28000";
const INSUFFICIENT_PRIVILEGE: &str = "42501";
const INVALID_CATALOG_NAME: &str = "3D000";
const TOO_MANY_CONNECTIONS: &str = "53300";
const CANNOT_CONNECT_NOW: &str = "57P03";

pub fn classify_connect_error(err: &sqlx::Error) -> ConnectionError {
    match err {
        sqlx::Error::Database(db) => classify_server_error(db.code().as_deref(), db.message()),
        sqlx::Error::Configuration(e) => ConnectionError::configuration(e.to_string()),
        sqlx::Error::Io(e) => ConnectionError::transport(format!("I/O error: {}", e)),
        sqlx::Error::Tls(e) => ConnectionError::transport(format!("TLS error: {}", e)),
        sqlx::Error::Protocol(msg) => ConnectionError::transport(format!("protocol error: {}", msg)),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
            ConnectionError::transport(err.to_string())
        }
        other => ConnectionError::configuration(other.to_string()),
    }
}

/// Classify an error the server sent during the handshake.
///
/// The SQLSTATE decides when present. Message matching is a fallback for
/// servers that report everything under a generic code.
pub fn classify_server_error(code: Option<&str>, message: &str) -> ConnectionError {
    match code {
        Some(INVALID_PASSWORD) => ConnectionError::token_rejected(message),
        Some(INVALID_AUTHORIZATION) | Some(INSUFFICIENT_PRIVILEGE) => ConnectionError::unauthorized(message),
        Some(INVALID_CATALOG_NAME) => ConnectionError::configuration(message),
        Some(TOO_MANY_CONNECTIONS) | Some(CANNOT_CONNECT_NOW) => ConnectionError::transport(message),
        Some(c) if c.starts_with("08") => ConnectionError::transport(message),
        _ => classify_by_message(message),
    }
}

fn classify_by_message(message: &str) -> ConnectionError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission denied")
        || lower.contains("not authorized")
        || (lower.contains("role") && lower.contains("does not exist"))
    {
        ConnectionError::unauthorized(message)
    } else if lower.contains("password authentication failed") || (lower.contains("token") && lower.contains("expired")) {
        ConnectionError::token_rejected(message)
    } else if lower.contains("timeout") || lower.contains("timed out") {
        ConnectionError::transport(message)
    } else {
        ConnectionError::configuration(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::error::AuthRejection;
    use std::io;

    fn reason(err: &ConnectionError) -> Option<AuthRejection> {
        match err {
            ConnectionError::AuthenticationFailure { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    #[test]
    fn expired_token_is_retryable() {
        let err = classify_server_error(Some("28P01"), "password authentication failed for user \"reader\"");
        assert_eq!(reason(&err), Some(AuthRejection::TokenRejected));
        assert!(err.is_retryable_with_fresh_credential());
    }

    #[test]
    fn unauthorized_identity_is_permanent() {
        for (code, message) in [
            ("28000", "role \"reader@example.com\" does not exist"),
            ("42501", "permission denied for database lego"),
        ] {
            let err = classify_server_error(Some(code), message);
            assert_eq!(reason(&err), Some(AuthRejection::IdentityUnauthorized), "{code}");
            assert!(!err.is_retryable_with_fresh_credential());
        }
    }

    #[test]
    fn missing_database_is_configuration() {
        let err = classify_server_error(Some("3D000"), "database \"legoo\" does not exist");
        assert!(matches!(err, ConnectionError::ConfigurationFailure { .. }));
    }

    #[test]
    fn server_busy_is_transport() {
        let err = classify_server_error(Some("53300"), "sorry, too many clients already");
        assert!(matches!(err, ConnectionError::TransportFailure { attempts: 1, .. }));
        let err = classify_server_error(Some("08006"), "connection failure");
        assert!(matches!(err, ConnectionError::TransportFailure { .. }));
    }

    #[test]
    fn message_fallback_without_code() {
        assert_eq!(
            reason(&classify_server_error(None, "FATAL: password authentication failed for user")),
            Some(AuthRejection::TokenRejected)
        );
        assert_eq!(
            reason(&classify_server_error(None, "FATAL: role \"svc\" does not exist")),
            Some(AuthRejection::IdentityUnauthorized)
        );
        assert_eq!(
            reason(&classify_server_error(Some("XX000"), "The access token has expired")),
            Some(AuthRejection::TokenRejected)
        );
    }

    #[test]
    fn driver_errors() {
        let refused = sqlx::Error::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert!(matches!(classify_connect_error(&refused), ConnectionError::TransportFailure { .. }));

        let bad_config = sqlx::Error::Configuration("invalid port".into());
        assert!(matches!(
            classify_connect_error(&bad_config),
            ConnectionError::ConfigurationFailure { .. }
        ));
    }
}
