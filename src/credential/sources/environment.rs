use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::env;
use std::fmt;

use super::resource_of;
use crate::credential::{AccessToken, CredentialSource, IssuedToken, SourceKind, SourceOutcome};

pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Service principal supplied through the environment.
#[derive(Clone)]
pub struct ClientSecretIdentity {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ClientSecretIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecretIdentity")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Client-credentials exchange for a secret found in `AZURE_*` variables.
pub struct EnvironmentSource {
    identity: Option<ClientSecretIdentity>,
    authority: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

impl EnvironmentSource {
    pub fn new(identity: Option<ClientSecretIdentity>, authority: impl Into<String>) -> Self {
        Self {
            identity,
            authority: authority.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        let non_empty = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());
        let identity = match (
            non_empty("AZURE_TENANT_ID"),
            non_empty("AZURE_CLIENT_ID"),
            non_empty("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => Some(ClientSecretIdentity {
                tenant_id,
                client_id,
                client_secret,
            }),
            _ => None,
        };
        let authority = non_empty("AZURE_AUTHORITY_HOST").unwrap_or_else(|| DEFAULT_AUTHORITY.to_string());
        Self::new(identity, authority)
    }

    fn token_url(&self, tenant_id: &str) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority.trim_end_matches('/'), tenant_id)
    }
}

#[async_trait]
impl CredentialSource for EnvironmentSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Environment
    }

    async fn fetch(&self, scope: &str) -> SourceOutcome {
        let Some(identity) = &self.identity else {
            return SourceOutcome::Declined(
                "AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET are not all set".to_string(),
            );
        };

        let scope = format!("{}/.default", resource_of(scope));
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", identity.client_id.as_str()),
            ("client_secret", identity.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = match self.client.post(self.token_url(&identity.tenant_id)).form(&form).send().await {
            Ok(response) => response,
            Err(e) => return SourceOutcome::Fault(format!("token endpoint unreachable: {}", e)),
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<TokenErrorResponse>()
                .await
                .ok()
                .and_then(|e| e.error_description.or(e.error))
                .unwrap_or_else(|| "no error detail".to_string());
            return SourceOutcome::Fault(format!("token endpoint returned {}: {}", status, detail));
        }

        let body = match response.json::<TokenResponse>().await {
            Ok(body) => body,
            Err(e) => return SourceOutcome::Fault(format!("unparsable token response: {}", e)),
        };
        let expires_at = chrono::Duration::try_seconds(body.expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
        match expires_at {
            Some(expires_at) => SourceOutcome::Token(IssuedToken {
                token: AccessToken::new(body.access_token),
                expires_at,
            }),
            None => SourceOutcome::Fault(format!("invalid expires_in {} in token response", body.expires_in)),
        }
    }
}
