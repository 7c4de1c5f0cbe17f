use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::PathBuf;

use super::{parse_epoch_seconds, resource_of};
use crate::credential::{AccessToken, CredentialSource, IssuedToken, SourceKind, SourceOutcome};

/// Access tokens left behind in a shared MSAL token cache file by other tools.
pub struct SharedTokenCacheSource {
    path: Option<PathBuf>,
}

impl SharedTokenCacheSource {
    /// `path` overrides the default `~/.azure/msal_token_cache.json`.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path: path.or_else(default_cache_path),
        }
    }
}

fn default_cache_path() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    Some(PathBuf::from(home).join(".azure").join("msal_token_cache.json"))
}

#[async_trait]
impl CredentialSource for SharedTokenCacheSource {
    fn kind(&self) -> SourceKind {
        SourceKind::SharedTokenCache
    }

    async fn fetch(&self, scope: &str) -> SourceOutcome {
        let Some(path) = &self.path else {
            return SourceOutcome::Declined("no token cache location (HOME is not set)".to_string());
        };

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return SourceOutcome::Declined(format!("no token cache at {}", path.display()));
            }
            Err(e) => return SourceOutcome::Fault(format!("cannot read {}: {}", path.display(), e)),
        };

        match find_cached_token(&content, scope) {
            Ok(Some(issued)) => SourceOutcome::Token(issued),
            Ok(None) => SourceOutcome::Declined(format!("no unexpired token for {} in cache", resource_of(scope))),
            Err(reason) => SourceOutcome::Fault(format!("{}: {}", path.display(), reason)),
        }
    }
}

/// Latest unexpired `AccessToken` entry whose target covers `scope`.
pub fn find_cached_token(content: &str, scope: &str) -> Result<Option<IssuedToken>, String> {
    let cache: Value = serde_json::from_str(content).map_err(|e| format!("unparsable token cache: {}", e))?;
    let Some(entries) = cache.get("AccessToken").and_then(|v| v.as_object()) else {
        return Ok(None);
    };

    let wanted = resource_of(scope).to_ascii_lowercase();
    let now = Utc::now();

    let best = entries
        .values()
        .filter(|entry| {
            entry
                .get("target")
                .and_then(|v| v.as_str())
                .map(|target| {
                    target
                        .split_whitespace()
                        .any(|t| resource_of(t).eq_ignore_ascii_case(&wanted))
                })
                .unwrap_or(false)
        })
        .filter_map(|entry| {
            let secret = entry.get("secret").and_then(|v| v.as_str())?;
            let expires_at = entry.get("expires_on").and_then(parse_epoch_seconds)?;
            (expires_at > now && !secret.is_empty()).then(|| IssuedToken {
                token: AccessToken::new(secret),
                expires_at,
            })
        })
        .max_by_key(|issued| issued.expires_at);

    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    const SCOPE: &str = "https://ossrdbms-aad.database.windows.net";

    fn cache_json() -> String {
        let later = Utc::now().timestamp() + 3600;
        let sooner = Utc::now().timestamp() + 600;
        let past = Utc::now().timestamp() - 60;
        json!({
            "AccessToken": {
                "a": { "secret": "stale", "expires_on": past.to_string(), "target": "https://ossrdbms-aad.database.windows.net/.default" },
                "b": { "secret": "sooner", "expires_on": sooner.to_string(), "target": "https://ossrdbms-aad.database.windows.net/.default" },
                "c": { "secret": "later", "expires_on": later.to_string(), "target": "https://ossrdbms-aad.database.windows.net/user_impersonation https://ossrdbms-aad.database.windows.net/.default" },
                "d": { "secret": "graph", "expires_on": (later + 100).to_string(), "target": "https://graph.microsoft.com/.default" }
            }
        })
        .to_string()
    }

    #[test]
    fn picks_latest_matching_token() {
        let issued = find_cached_token(&cache_json(), SCOPE).unwrap().unwrap();
        assert_eq!(issued.token.expose(), "later");
    }

    #[test]
    fn no_matching_entry_is_none() {
        assert!(find_cached_token(&cache_json(), "https://vault.azure.net").unwrap().is_none());
        assert!(find_cached_token("{}", SCOPE).unwrap().is_none());
        assert!(find_cached_token("not json", SCOPE).is_err());
    }

    #[tokio::test]
    async fn reads_cache_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(cache_json().as_bytes()).unwrap();

        let source = SharedTokenCacheSource::new(Some(file.path().to_path_buf()));
        match source.fetch(SCOPE).await {
            SourceOutcome::Token(issued) => assert_eq!(issued.token.expose(), "later"),
            other => panic!("expected token, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_file_declines() {
        let dir = tempfile::tempdir().unwrap();
        let source = SharedTokenCacheSource::new(Some(dir.path().join("absent.json")));
        assert!(matches!(source.fetch(SCOPE).await, SourceOutcome::Declined(_)));
    }

    #[tokio::test]
    async fn corrupt_file_is_a_fault() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ truncated").unwrap();
        let source = SharedTokenCacheSource::new(Some(file.path().to_path_buf()));
        assert!(matches!(source.fetch(SCOPE).await, SourceOutcome::Fault(_)));
    }
}
