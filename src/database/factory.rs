use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::{ConnectOptions, PgConnection};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::classify::classify_connect_error;
use super::error::ConnectionError;
use super::session::{PgSession, Session};
use crate::config::{AppConfig, DatabaseConfig, QueryConfig, RetryConfig, TransportSecurity};
use crate::credential::Credential;

const APPLICATION_NAME: &str = "catalog-access";

/// Opens authenticated sessions from a credential.
///
/// Implementations never fetch or refresh credentials themselves.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    type Session: Session;

    async fn open(&self, credential: &Credential) -> Result<Self::Session, ConnectionError>;
}

/// Opens one Postgres connection per call, authenticating with the bearer
/// token as the password.
pub struct PgConnectionFactory {
    database: DatabaseConfig,
    retry: RetryConfig,
    query_timeout: Duration,
}

impl PgConnectionFactory {
    pub fn new(database: DatabaseConfig, retry: RetryConfig, query: &QueryConfig) -> Result<Self, ConnectionError> {
        database.validate()?;
        Ok(Self {
            database,
            retry,
            query_timeout: query.query_timeout,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ConnectionError> {
        Self::new(config.database.clone(), config.retry.clone(), &config.query)
    }

    pub fn database(&self) -> &DatabaseConfig {
        &self.database
    }

    fn connect_options(&self, credential: &Credential) -> PgConnectOptions {
        let ssl_mode = match self.database.transport {
            TransportSecurity::Require => PgSslMode::Require,
            TransportSecurity::VerifyCa => PgSslMode::VerifyCa,
            TransportSecurity::VerifyFull => PgSslMode::VerifyFull,
        };

        PgConnectOptions::new()
            .host(&self.database.host)
            .port(self.database.port)
            .database(&self.database.name)
            .username(&self.database.user)
            .password(credential.token().expose())
            .ssl_mode(ssl_mode)
            .application_name(APPLICATION_NAME)
            .disable_statement_logging()
    }

    async fn connect_once(&self, options: &PgConnectOptions) -> Result<PgConnection, ConnectionError> {
        let limit = self.database.connect_timeout;
        match tokio::time::timeout(limit, options.connect()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(classify_connect_error(&e)),
            Err(_) => Err(ConnectionError::transport(format!(
                "connect to {}:{} timed out after {:?}",
                self.database.host, self.database.port, limit
            ))),
        }
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    type Session = PgSession;

    async fn open(&self, credential: &Credential) -> Result<PgSession, ConnectionError> {
        if credential.is_expired(Utc::now()) {
            return Err(ConnectionError::token_rejected("credential expired before connecting"));
        }

        let options = self.connect_options(credential);
        debug!(
            "Connecting to {}:{}/{} as {} (sslmode={}, credential #{} from {})",
            self.database.host,
            self.database.port,
            self.database.name,
            self.database.user,
            self.database.transport.as_str(),
            credential.serial(),
            credential.source()
        );

        let conn = retry_transport(&self.retry, |_| self.connect_once(&options)).await?;
        info!("Database session opened on {}", self.database.host);
        Ok(PgSession::new(conn, self.query_timeout))
    }
}

/// Run `attempt` until it succeeds, fails with a non-transport error, or
/// `policy.max_attempts` transport failures have happened.
pub async fn retry_transport<T, F, Fut>(policy: &RetryConfig, mut attempt: F) -> Result<T, ConnectionError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ConnectionError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut n = 1;
    loop {
        match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(ConnectionError::TransportFailure { cause, .. }) => {
                if n >= max_attempts {
                    return Err(ConnectionError::TransportFailure { attempts: n, cause });
                }
                let delay = policy.delay_after(n);
                warn!(
                    "Transport failure on connect attempt {}/{}: {} (retrying in {:?})",
                    n, max_attempts, cause, delay
                );
                tokio::time::sleep(delay).await;
                n += 1;
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{AccessToken, IssuedToken, SourceKind};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn transport_failures_retry_until_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_transport(&quick_policy(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ConnectionError::transport("connection refused")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(ConnectionError::TransportFailure { attempts: 3, .. })));
    }

    #[tokio::test]
    async fn transient_failure_then_success() {
        let result = retry_transport(&quick_policy(3), |n| async move {
            if n == 1 {
                Err(ConnectionError::transport("reset"))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn auth_and_config_failures_are_not_retried() {
        for failure in [
            ConnectionError::token_rejected("expired"),
            ConnectionError::unauthorized("role does not exist"),
            ConnectionError::configuration("database does not exist"),
        ] {
            let calls = AtomicU32::new(0);
            let result: Result<(), _> = retry_transport(&quick_policy(5), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                let failure = failure.clone();
                async move { Err(failure) }
            })
            .await;
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert_eq!(result, Err(failure));
        }
    }

    #[test]
    fn invalid_host_fails_before_any_connect() {
        let database = DatabaseConfig::new("not a host!", "lego", "reader");
        let err = PgConnectionFactory::new(database, RetryConfig::default(), &QueryConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, ConnectionError::ConfigurationFailure { .. }));
    }

    #[tokio::test]
    async fn expired_credential_is_rejected_without_connecting() {
        let factory = PgConnectionFactory::new(
            DatabaseConfig::new("db.invalid", "lego", "reader"),
            quick_policy(1),
            &QueryConfig::default(),
        )
        .unwrap();
        let credential = Credential::new(
            IssuedToken {
                token: AccessToken::new("old"),
                expires_at: Utc::now() - chrono::Duration::seconds(5),
            },
            SourceKind::AzureCli,
            7,
        );

        let err = factory.open(&credential).await.err().unwrap();
        assert!(err.is_retryable_with_fresh_credential());
    }

    #[tokio::test]
    async fn refused_port_is_transport_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut database = DatabaseConfig::new("127.0.0.1", "lego", "reader");
        database.port = port;
        database.connect_timeout = Duration::from_secs(2);
        let factory = PgConnectionFactory::new(database, quick_policy(2), &QueryConfig::default()).unwrap();
        let credential = Credential::new(
            IssuedToken {
                token: AccessToken::new("token"),
                expires_at: Utc::now() + chrono::Duration::hours(1),
            },
            SourceKind::Environment,
            1,
        );

        let err = factory.open(&credential).await.err().unwrap();
        assert!(matches!(err, ConnectionError::TransportFailure { attempts: 2, .. }), "{err}");
    }
}
