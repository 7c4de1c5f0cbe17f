#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use catalog_access::config::AppConfig;
use catalog_access::credential::{AccessToken, CredentialSource, IssuedToken, SourceKind, SourceOutcome};

/// Configuration for a real database, or `None` when the environment does
/// not name one. Live tests return early in that case.
pub fn live_config() -> Option<AppConfig> {
    dotenvy::dotenv().ok();
    if std::env::var("DB_HOST").is_err() || std::env::var("AZURE_AD_USER").is_err() {
        eprintln!("skipping: DB_HOST / AZURE_AD_USER not set");
        return None;
    }
    match AppConfig::from_env() {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("skipping: invalid configuration: {}", e);
            None
        }
    }
}

/// Source that issues tokens with a fixed lifetime and counts calls.
pub struct CountingSource {
    pub kind: SourceKind,
    pub lifetime: chrono::Duration,
    pub delay: Duration,
    calls: AtomicUsize,
}

impl CountingSource {
    pub fn new(kind: SourceKind, lifetime: chrono::Duration) -> Self {
        Self {
            kind,
            lifetime,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for CountingSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, _scope: &str) -> SourceOutcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        SourceOutcome::Token(IssuedToken {
            token: AccessToken::new(format!("token-{}", n)),
            expires_at: Utc::now() + self.lifetime,
        })
    }
}
