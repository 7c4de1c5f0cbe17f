use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::sources;
use super::{Credential, CredentialError, CredentialSource, SourceOutcome};
use crate::config::CredentialConfig;

/// Resolves database credentials from an ordered chain of identity sources.
///
/// The last successful credential is cached and shared by all callers. Reads
/// go through an `RwLock`; refreshes are serialized by a separate mutex so a
/// burst of callers that all find the cache stale trigger one chain walk and
/// then reuse its result.
pub struct CredentialProvider {
    sources: Vec<Arc<dyn CredentialSource>>,
    scope: String,
    safety_margin: chrono::Duration,
    source_timeout: Duration,
    cached: RwLock<Option<Credential>>,
    refresh: Mutex<()>,
    serial: AtomicU64,
}

impl CredentialProvider {
    pub fn new(sources: Vec<Arc<dyn CredentialSource>>, config: &CredentialConfig) -> Self {
        Self {
            sources,
            scope: config.scope.clone(),
            safety_margin: safety_margin(config.safety_margin),
            source_timeout: config.source_timeout,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
            serial: AtomicU64::new(0),
        }
    }

    /// Provider over the real identity sources named in the configuration.
    pub fn from_config(config: &CredentialConfig) -> Self {
        Self::new(sources::build_chain(config), config)
    }

    /// Return the cached credential while it is fresh, otherwise walk the chain.
    pub async fn acquire(&self) -> Result<Credential, CredentialError> {
        if let Some(credential) = self.cached_fresh().await {
            return Ok(credential);
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited for the lock
        if let Some(credential) = self.cached_fresh().await {
            debug!("Reusing credential #{} refreshed by a concurrent caller", credential.serial());
            return Ok(credential);
        }
        self.refresh_locked().await
    }

    /// Bypass the cache after the database rejected `rejected`.
    ///
    /// If a concurrent caller already replaced the rejected credential, the
    /// replacement is returned instead of walking the chain again.
    pub async fn acquire_fresh(&self, rejected: &Credential) -> Result<Credential, CredentialError> {
        let _guard = self.refresh.lock().await;
        if let Some(credential) = self.cached_fresh().await {
            if credential.serial() != rejected.serial() {
                debug!(
                    "Credential #{} already replaced by #{}",
                    rejected.serial(),
                    credential.serial()
                );
                return Ok(credential);
            }
        }
        self.cached.write().await.take();
        self.refresh_locked().await
    }

    /// Drop the cached credential.
    pub async fn invalidate(&self) {
        self.cached.write().await.take();
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    async fn cached_fresh(&self) -> Option<Credential> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .filter(|c| c.is_fresh(Utc::now(), self.safety_margin))
            .cloned()
    }

    /// Walk the chain and store the result. Caller holds the refresh lock.
    async fn refresh_locked(&self) -> Result<Credential, CredentialError> {
        let credential = self.run_chain().await?;
        *self.cached.write().await = Some(credential.clone());
        Ok(credential)
    }

    async fn run_chain(&self) -> Result<Credential, CredentialError> {
        let mut declined = Vec::new();

        for source in &self.sources {
            let kind = source.kind();
            debug!("Requesting credential from {}", kind);

            let outcome = match tokio::time::timeout(self.source_timeout, source.fetch(&self.scope)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("Identity source {} timed out after {:?}", kind, self.source_timeout);
                    return Err(CredentialError::SourceFailure {
                        origin: kind,
                        cause: format!("timed out after {:?}", self.source_timeout),
                    });
                }
            };

            match outcome {
                SourceOutcome::Token(issued) if issued.token.is_empty() => {
                    debug!("Identity source {} returned an empty token", kind);
                    declined.push((kind, "returned an empty token".to_string()));
                }
                SourceOutcome::Token(issued) if issued.expires_at <= Utc::now() => {
                    debug!("Identity source {} returned a token that expired at {}", kind, issued.expires_at);
                    declined.push((kind, format!("returned a token that expired at {}", issued.expires_at)));
                }
                SourceOutcome::Token(issued) => {
                    let serial = self.serial.fetch_add(1, Ordering::SeqCst) + 1;
                    let credential = Credential::new(issued, kind, serial);
                    info!(
                        "Acquired database credential #{} from {} (length {}, expires {})",
                        serial,
                        kind,
                        credential.token().len(),
                        credential.expires_at()
                    );
                    return Ok(credential);
                }
                SourceOutcome::Declined(reason) => {
                    debug!("Identity source {} declined: {}", kind, reason);
                    declined.push((kind, reason));
                }
                SourceOutcome::Fault(cause) => {
                    warn!("Identity source {} failed: {}", kind, cause);
                    return Err(CredentialError::SourceFailure { origin: kind, cause });
                }
            }
        }

        warn!("All {} identity sources declined", self.sources.len());
        Err(CredentialError::Exhausted { declined })
    }
}

/// Margins chrono cannot represent never let a credential be reused.
fn safety_margin(configured: Duration) -> chrono::Duration {
    chrono::Duration::from_std(configured).unwrap_or_else(|_| {
        warn!("Credential safety margin {:?} is out of range; cached credentials will not be reused", configured);
        chrono::Duration::MAX
    })
}
