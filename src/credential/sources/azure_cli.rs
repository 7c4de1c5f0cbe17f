use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::process::Command;

use super::{parse_epoch_seconds, resource_of};
use crate::credential::{AccessToken, CredentialSource, IssuedToken, SourceKind, SourceOutcome};

/// Token from the developer's cached `az login` session.
pub struct AzureCliSource {
    program: String,
}

impl AzureCliSource {
    pub fn new() -> Self {
        Self::with_program("az")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

impl Default for AzureCliSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialSource for AzureCliSource {
    fn kind(&self) -> SourceKind {
        SourceKind::AzureCli
    }

    async fn fetch(&self, scope: &str) -> SourceOutcome {
        let output = Command::new(&self.program)
            .args(["account", "get-access-token", "--output", "json", "--resource"])
            .arg(resource_of(scope))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return SourceOutcome::Declined(format!("{} is not installed", self.program));
            }
            Err(e) => return SourceOutcome::Fault(format!("failed to run {}: {}", self.program, e)),
        };

        if !output.status.success() {
            // Usually means no `az login` session for this resource
            let stderr = String::from_utf8_lossy(&output.stderr);
            let first_line = stderr.lines().find(|l| !l.trim().is_empty()).unwrap_or("no output");
            return SourceOutcome::Declined(format!("{} exited with {}: {}", self.program, output.status, first_line.trim()));
        }

        match parse_cli_token(&String::from_utf8_lossy(&output.stdout)) {
            Ok(issued) => SourceOutcome::Token(issued),
            Err(reason) => SourceOutcome::Fault(reason),
        }
    }
}

/// Parse `az account get-access-token` JSON output.
pub fn parse_cli_token(stdout: &str) -> Result<IssuedToken, String> {
    let json: Value = serde_json::from_str(stdout).map_err(|e| format!("unparsable CLI output: {}", e))?;

    let token = json
        .get("accessToken")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "CLI output has no accessToken".to_string())?;

    let expires_at = json
        .get("expires_on")
        .and_then(parse_epoch_seconds)
        .or_else(|| json.get("expiresOn").and_then(|v| v.as_str()).and_then(parse_local_timestamp))
        .ok_or_else(|| "CLI output has no usable expiry".to_string())?;

    Ok(IssuedToken {
        token: AccessToken::new(token),
        expires_at,
    })
}

/// Older CLI versions only report `expiresOn` in local time.
fn parse_local_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}
