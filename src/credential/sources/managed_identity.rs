use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::warn;

use super::{parse_epoch_seconds, resource_of};
use crate::credential::{AccessToken, CredentialSource, IssuedToken, SourceKind, SourceOutcome};

pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

#[derive(Debug, Clone)]
enum Endpoint {
    /// App Service / Functions local identity endpoint.
    AppService { url: String, secret_header: String },
    /// VM instance metadata service.
    Imds { url: String },
}

/// Token for the identity the hosting platform assigned to this machine.
pub struct ManagedIdentitySource {
    endpoint: Endpoint,
    client_id: Option<String>,
    client: reqwest::Client,
}

impl ManagedIdentitySource {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());
        let endpoint = match (non_empty("IDENTITY_ENDPOINT"), non_empty("IDENTITY_HEADER")) {
            (Some(url), Some(secret_header)) => Endpoint::AppService { url, secret_header },
            _ => Endpoint::Imds { url: IMDS_ENDPOINT.to_string() },
        };
        Self::with_endpoint(endpoint, non_empty("AZURE_CLIENT_ID"))
    }

    /// Instance metadata style endpoint at `url`.
    pub fn imds(url: impl Into<String>, client_id: Option<String>) -> Self {
        Self::with_endpoint(Endpoint::Imds { url: url.into() }, client_id)
    }

    fn with_endpoint(endpoint: Endpoint, client_id: Option<String>) -> Self {
        // Short connect timeout: off-platform the metadata address is a black hole
        let client = build_client(reqwest::Client::builder().connect_timeout(Duration::from_secs(2)));
        Self { endpoint, client_id, client }
    }

    fn request(&self, scope: &str) -> Result<reqwest::RequestBuilder, String> {
        let resource = resource_of(scope);
        let (base, api_version) = match &self.endpoint {
            Endpoint::AppService { url, .. } => (url.as_str(), "2019-08-01"),
            Endpoint::Imds { url } => (url.as_str(), "2018-02-01"),
        };

        let mut params = vec![("api-version", api_version), ("resource", resource)];
        if let Some(client_id) = &self.client_id {
            params.push(("client_id", client_id.as_str()));
        }
        let url = url::Url::parse_with_params(base, &params)
            .map_err(|e| format!("invalid managed identity endpoint {}: {}", base, e))?;

        Ok(match &self.endpoint {
            Endpoint::AppService { secret_header, .. } => {
                self.client.get(url).header("X-IDENTITY-HEADER", secret_header)
            }
            Endpoint::Imds { .. } => self.client.get(url).header("Metadata", "true"),
        })
    }
}

#[async_trait]
impl CredentialSource for ManagedIdentitySource {
    fn kind(&self) -> SourceKind {
        SourceKind::ManagedIdentity
    }

    async fn fetch(&self, scope: &str) -> SourceOutcome {
        let request = match self.request(scope) {
            Ok(request) => request,
            Err(reason) => return SourceOutcome::Fault(reason),
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return SourceOutcome::Declined("managed identity endpoint is unreachable".to_string());
            }
            Err(e) => return SourceOutcome::Fault(format!("managed identity request failed: {}", e)),
        };

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND {
            // IMDS answers 400 when no identity is assigned to the host
            return SourceOutcome::Declined(format!("no managed identity assigned ({})", status));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return SourceOutcome::Fault(format!("managed identity endpoint returned {}: {}", status, body.trim()));
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => return SourceOutcome::Fault(format!("unparsable managed identity response: {}", e)),
        };

        let token = body.get("access_token").and_then(|v| v.as_str());
        let expires_at = body.get("expires_on").and_then(parse_epoch_seconds);
        match (token, expires_at) {
            (Some(token), Some(expires_at)) => SourceOutcome::Token(IssuedToken {
                token: AccessToken::new(token),
                expires_at,
            }),
            _ => SourceOutcome::Fault("managed identity response lacks access_token or expires_on".to_string()),
        }
    }
}

fn build_client(builder: reqwest::ClientBuilder) -> reqwest::Client {
    builder.build().unwrap_or_else(|e| {
        warn!("Managed identity client setup failed, using defaults without connect timeout: {}", e);
        reqwest::Client::new()
    })
}
