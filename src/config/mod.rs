use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::credential::SourceKind;

/// Resource identifier requested from identity sources for database tokens.
pub const DEFAULT_TOKEN_SCOPE: &str = "https://ossrdbms-aad.database.windows.net";

/// Largest accepted credential safety margin.
pub const MAX_SAFETY_MARGIN: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Transport security mode {0:?} allows a cleartext handshake; use require, verify-ca or verify-full")]
    CleartextTransport(String),

    #[error("Identity source {0:?} is interactive and cannot be used non-interactively")]
    InteractiveSource(String),

    #[error("Unknown identity source: {0:?}")]
    UnknownSource(String),
}

impl ConfigError {
    fn invalid(key: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Immutable configuration for the data access layer.
///
/// Built once by the caller (usually via [`AppConfig::from_env`]) and handed to
/// each component at construction time. Nothing in the core reads the
/// environment or configuration files on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub credential: CredentialConfig,
    pub retry: RetryConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    /// Identity name presented as the database user alongside the token.
    pub user: String,
    pub transport: TransportSecurity,
    pub connect_timeout: Duration,
}

/// Encryption-in-transit modes. Only modes that refuse a cleartext handshake
/// are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportSecurity {
    Require,
    VerifyCa,
    VerifyFull,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    pub scope: String,
    /// A cached credential is reused only while `now < expiry - safety_margin`.
    pub safety_margin: Duration,
    pub source_timeout: Duration,
    /// Identity sources in priority order.
    pub sources: Vec<SourceKind>,
    pub token_cache_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total connect attempts for transport failures, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub query_timeout: Duration,
    pub max_page_size: u32,
}

impl FromStr for TransportSecurity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "require" => Ok(TransportSecurity::Require),
            "verify-ca" | "verify_ca" => Ok(TransportSecurity::VerifyCa),
            "verify-full" | "verify_full" => Ok(TransportSecurity::VerifyFull),
            "disable" | "allow" | "prefer" => Err(ConfigError::CleartextTransport(s.to_string())),
            other => Err(ConfigError::invalid("DB_SSLMODE", other, "unknown transport security mode")),
        }
    }
}

impl TransportSecurity {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportSecurity::Require => "require",
            TransportSecurity::VerifyCa => "verify-ca",
            TransportSecurity::VerifyFull => "verify-full",
        }
    }
}

impl RetryConfig {
    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(self.base_delay.saturating_mul(factor), self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(30),
            max_page_size: 100,
        }
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            scope: DEFAULT_TOKEN_SCOPE.to_string(),
            safety_margin: Duration::from_secs(60),
            source_timeout: Duration::from_secs(15),
            sources: SourceKind::default_chain(),
            token_cache_path: None,
        }
    }
}

impl DatabaseConfig {
    pub fn new(host: impl Into<String>, name: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 5432,
            name: name.into(),
            user: user.into(),
            transport: TransportSecurity::Require,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Reject values that can never produce a working connection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Missing("DB_HOST"));
        }
        if !self.host.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == ':')
            || self.host.starts_with('-')
            || self.host.starts_with('.')
        {
            return Err(ConfigError::invalid("DB_HOST", &self.host, "not a valid host name or address"));
        }
        if self.port == 0 {
            return Err(ConfigError::invalid("DB_PORT", "0", "port must be non-zero"));
        }
        if self.name.is_empty() {
            return Err(ConfigError::Missing("DB_NAME"));
        }
        if !self.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(ConfigError::invalid("DB_NAME", &self.name, "database names use [A-Za-z0-9_-]"));
        }
        if self.user.trim().is_empty() {
            return Err(ConfigError::Missing("AZURE_AD_USER"));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::invalid("CATALOG_CONNECT_TIMEOUT_SECS", "0", "timeout must be positive"));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Build from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; defaults first, then overrides.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("DB_HOST").ok_or(ConfigError::Missing("DB_HOST"))?;
        let user = lookup("AZURE_AD_USER").ok_or(ConfigError::Missing("AZURE_AD_USER"))?;
        let name = lookup("DB_NAME").unwrap_or_else(|| "lego".to_string());

        let config = Self {
            database: DatabaseConfig::new(host, name, user),
            credential: CredentialConfig::default(),
            retry: RetryConfig::default(),
            query: QueryConfig::default(),
        }
        .with_overrides(&lookup)?;

        config.validate()?;
        Ok(config)
    }

    fn with_overrides<F>(mut self, lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Database overrides
        if let Some(v) = lookup("DB_PORT") {
            self.database.port = parse_value("DB_PORT", &v)?;
        }
        if let Some(v) = lookup("DB_SSLMODE") {
            self.database.transport = v.parse()?;
        }
        if let Some(v) = lookup("CATALOG_CONNECT_TIMEOUT_SECS") {
            self.database.connect_timeout = Duration::from_secs(parse_value("CATALOG_CONNECT_TIMEOUT_SECS", &v)?);
        }

        // Credential overrides
        if let Some(v) = lookup("CATALOG_TOKEN_SCOPE") {
            self.credential.scope = v;
        }
        if let Some(v) = lookup("CATALOG_CREDENTIAL_SAFETY_MARGIN_SECS") {
            self.credential.safety_margin =
                Duration::from_secs(parse_value("CATALOG_CREDENTIAL_SAFETY_MARGIN_SECS", &v)?);
        }
        if let Some(v) = lookup("CATALOG_SOURCE_TIMEOUT_SECS") {
            self.credential.source_timeout = Duration::from_secs(parse_value("CATALOG_SOURCE_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("CATALOG_CREDENTIAL_SOURCES") {
            self.credential.sources = SourceKind::parse_list(&v)?;
        }
        if let Some(v) = lookup("CATALOG_TOKEN_CACHE_PATH") {
            self.credential.token_cache_path = Some(PathBuf::from(v));
        }

        // Retry overrides
        if let Some(v) = lookup("CATALOG_CONNECT_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_value("CATALOG_CONNECT_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("CATALOG_CONNECT_BACKOFF_MS") {
            self.retry.base_delay = Duration::from_millis(parse_value("CATALOG_CONNECT_BACKOFF_MS", &v)?);
        }
        if let Some(v) = lookup("CATALOG_CONNECT_MAX_BACKOFF_MS") {
            self.retry.max_delay = Duration::from_millis(parse_value("CATALOG_CONNECT_MAX_BACKOFF_MS", &v)?);
        }

        // Query overrides
        if let Some(v) = lookup("CATALOG_QUERY_TIMEOUT_SECS") {
            self.query.query_timeout = Duration::from_secs(parse_value("CATALOG_QUERY_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("CATALOG_MAX_PAGE_SIZE") {
            self.query.max_page_size = parse_value("CATALOG_MAX_PAGE_SIZE", &v)?;
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        if self.credential.sources.is_empty() {
            return Err(ConfigError::Missing("CATALOG_CREDENTIAL_SOURCES"));
        }
        if self.credential.scope.trim().is_empty() {
            return Err(ConfigError::Missing("CATALOG_TOKEN_SCOPE"));
        }
        if self.credential.safety_margin > MAX_SAFETY_MARGIN {
            return Err(ConfigError::invalid(
                "CATALOG_CREDENTIAL_SAFETY_MARGIN_SECS",
                self.credential.safety_margin.as_secs().to_string(),
                format!("margin must not exceed {}s", MAX_SAFETY_MARGIN.as_secs()),
            ));
        }
        if self.credential.source_timeout.is_zero() {
            return Err(ConfigError::invalid("CATALOG_SOURCE_TIMEOUT_SECS", "0", "timeout must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("CATALOG_CONNECT_MAX_ATTEMPTS", "0", "at least one attempt is required"));
        }
        if self.query.query_timeout.is_zero() {
            return Err(ConfigError::invalid("CATALOG_QUERY_TIMEOUT_SECS", "0", "timeout must be positive"));
        }
        if self.query.max_page_size == 0 {
            return Err(ConfigError::invalid("CATALOG_MAX_PAGE_SIZE", "0", "page size cap must be positive"));
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, raw, "could not parse value"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_required_values() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DB_HOST", "catalog.postgres.example.com"),
            ("AZURE_AD_USER", "catalog-reader"),
        ]))
        .unwrap();

        assert_eq!(config.database.name, "lego");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.transport, TransportSecurity::Require);
        assert_eq!(config.database.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.credential.safety_margin, Duration::from_secs(60));
        assert_eq!(config.credential.sources, SourceKind::default_chain());
        assert_eq!(config.query.max_page_size, 100);
    }

    #[test]
    fn test_missing_user_is_fatal() {
        let err = AppConfig::from_lookup(lookup_from(&[("DB_HOST", "localhost")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("AZURE_AD_USER"));
    }

    #[test]
    fn test_cleartext_modes_rejected_at_startup() {
        for mode in ["disable", "allow", "prefer"] {
            let err = AppConfig::from_lookup(lookup_from(&[
                ("DB_HOST", "localhost"),
                ("AZURE_AD_USER", "reader"),
                ("DB_SSLMODE", mode),
            ]))
            .unwrap_err();
            assert!(matches!(err, ConfigError::CleartextTransport(_)), "{mode}: {err}");
        }
    }

    #[test]
    fn test_malformed_numbers_are_errors() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("DB_HOST", "localhost"),
            ("AZURE_AD_USER", "reader"),
            ("DB_PORT", "five"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DB_PORT", .. }));
    }

    #[test]
    fn test_oversized_safety_margin_rejected() {
        for margin in ["86401", "18446744073709551615"] {
            let err = AppConfig::from_lookup(lookup_from(&[
                ("DB_HOST", "localhost"),
                ("AZURE_AD_USER", "reader"),
                ("CATALOG_CREDENTIAL_SAFETY_MARGIN_SECS", margin),
            ]))
            .unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: "CATALOG_CREDENTIAL_SAFETY_MARGIN_SECS", .. }),
                "{}",
                margin
            );
        }

        let config = AppConfig::from_lookup(lookup_from(&[
            ("DB_HOST", "localhost"),
            ("AZURE_AD_USER", "reader"),
            ("CATALOG_CREDENTIAL_SAFETY_MARGIN_SECS", "86400"),
        ]))
        .unwrap();
        assert_eq!(config.credential.safety_margin, MAX_SAFETY_MARGIN);
    }

    #[test]
    fn test_invalid_host_rejected() {
        let config = DatabaseConfig::new("bad host;", "lego", "reader");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { key: "DB_HOST", .. })));
    }

    #[test]
    fn test_source_order_override() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DB_HOST", "localhost"),
            ("AZURE_AD_USER", "reader"),
            ("CATALOG_CREDENTIAL_SOURCES", "managed_identity, azure_cli"),
        ]))
        .unwrap();
        assert_eq!(
            config.credential.sources,
            vec![SourceKind::ManagedIdentity, SourceKind::AzureCli]
        );
    }

    #[test]
    fn test_backoff_is_bounded() {
        let retry = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(retry.delay_after(1), Duration::from_millis(100));
        assert_eq!(retry.delay_after(2), Duration::from_millis(200));
        assert_eq!(retry.delay_after(3), Duration::from_millis(350));
        assert_eq!(retry.delay_after(30), Duration::from_millis(350));
    }
}
