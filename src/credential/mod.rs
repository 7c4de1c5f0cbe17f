//! Bearer credentials for database authentication.
//!
//! A [`CredentialProvider`] walks an ordered chain of [`CredentialSource`]s and
//! caches the first token it gets until shortly before expiry.

pub mod provider;
pub mod sources;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::ConfigError;

pub use provider::CredentialProvider;

/// Opaque bearer token. Formatting never reveals the secret, only its length.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Raw secret, for the connection handshake only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(<redacted, {} chars>)", self.0.len())
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<redacted, {} chars>", self.0.len())
    }
}

/// Non-interactive identity sources. Browser and device-code flows are not
/// representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    AzureCli,
    Environment,
    ManagedIdentity,
    SharedTokenCache,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::AzureCli => "azure_cli",
            SourceKind::Environment => "environment",
            SourceKind::ManagedIdentity => "managed_identity",
            SourceKind::SharedTokenCache => "shared_token_cache",
        }
    }

    pub fn default_chain() -> Vec<SourceKind> {
        vec![
            SourceKind::AzureCli,
            SourceKind::Environment,
            SourceKind::ManagedIdentity,
            SourceKind::SharedTokenCache,
        ]
    }

    /// Parse a comma separated priority list, rejecting duplicates.
    pub fn parse_list(raw: &str) -> Result<Vec<SourceKind>, ConfigError> {
        let mut out = Vec::new();
        for part in raw.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let kind: SourceKind = trimmed.parse()?;
            if out.contains(&kind) {
                return Err(ConfigError::Invalid {
                    key: "CATALOG_CREDENTIAL_SOURCES",
                    value: raw.to_string(),
                    reason: format!("{} listed more than once", kind),
                });
            }
            out.push(kind);
        }
        Ok(out)
    }
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "azure_cli" | "cli" => Ok(SourceKind::AzureCli),
            "environment" | "env" => Ok(SourceKind::Environment),
            "managed_identity" => Ok(SourceKind::ManagedIdentity),
            "shared_token_cache" => Ok(SourceKind::SharedTokenCache),
            "interactive_browser" | "interactive" | "device_code" => {
                Err(ConfigError::InteractiveSource(s.to_string()))
            }
            _ => Err(ConfigError::UnknownSource(s.to_string())),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A token as returned by a source, before the provider adopts it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: AccessToken,
    pub expires_at: DateTime<Utc>,
}

/// Result of asking one source for a token.
#[derive(Debug, Clone)]
pub enum SourceOutcome {
    Token(IssuedToken),
    /// The source is not available on this host; try the next one.
    Declined(String),
    /// The source is available but failed; stops the chain.
    Fault(String),
}

#[async_trait]
pub trait CredentialSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn fetch(&self, scope: &str) -> SourceOutcome;
}

/// A token adopted by the provider. Lives in process memory only.
#[derive(Debug, Clone)]
pub struct Credential {
    token: AccessToken,
    expires_at: DateTime<Utc>,
    source: SourceKind,
    serial: u64,
}

impl Credential {
    pub(crate) fn new(issued: IssuedToken, source: SourceKind, serial: u64) -> Self {
        Self {
            token: issued.token,
            expires_at: issued.expires_at,
            source,
            serial,
        }
    }

    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    /// Monotonic number assigned by the provider; distinguishes refreshes.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the cache may keep handing this credential out.
    pub fn is_fresh(&self, now: DateTime<Utc>, safety_margin: chrono::Duration) -> bool {
        self.expires_at
            .checked_sub_signed(safety_margin)
            .is_some_and(|refresh_at| now < refresh_at)
    }
}

#[derive(Debug, Error, Clone)]
pub enum CredentialError {
    #[error("No identity source produced a credential: {}", describe_declines(.declined))]
    Exhausted { declined: Vec<(SourceKind, String)> },

    #[error("Identity source {origin} failed: {cause}")]
    SourceFailure { origin: SourceKind, cause: String },
}

fn describe_declines(declined: &[(SourceKind, String)]) -> String {
    if declined.is_empty() {
        return "no sources configured".to_string();
    }
    declined
        .iter()
        .map(|(kind, reason)| format!("{}: {}", kind, reason))
        .collect::<Vec<_>>()
        .join("; ")
}
