pub mod azure_cli;
pub mod environment;
pub mod managed_identity;
pub mod shared_cache;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;

use super::{CredentialSource, SourceKind};
use crate::config::CredentialConfig;

pub use azure_cli::AzureCliSource;
pub use environment::EnvironmentSource;
pub use managed_identity::ManagedIdentitySource;
pub use shared_cache::SharedTokenCacheSource;

/// Instantiate the configured sources in priority order.
pub fn build_chain(config: &CredentialConfig) -> Vec<Arc<dyn CredentialSource>> {
    config
        .sources
        .iter()
        .map(|kind| -> Arc<dyn CredentialSource> {
            match kind {
                SourceKind::AzureCli => Arc::new(AzureCliSource::new()),
                SourceKind::Environment => Arc::new(EnvironmentSource::from_env()),
                SourceKind::ManagedIdentity => Arc::new(ManagedIdentitySource::from_env()),
                SourceKind::SharedTokenCache => {
                    Arc::new(SharedTokenCacheSource::new(config.token_cache_path.clone()))
                }
            }
        })
        .collect()
}

/// Token endpoints report expiry as epoch seconds, either as a number or a
/// numeric string.
pub(crate) fn parse_epoch_seconds(value: &Value) -> Option<DateTime<Utc>> {
    let secs = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    Utc.timestamp_opt(secs, 0).single()
}

/// `resource` form of a scope: no trailing slash and no `/.default` suffix.
pub(crate) fn resource_of(scope: &str) -> &str {
    scope
        .trim_end_matches("/.default")
        .trim_end_matches('/')
}
