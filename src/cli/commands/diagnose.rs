use serde_json::{json, Value};

use crate::cli::utils::{connect, fail, print_record};
use crate::cli::OutputFormat;
use crate::credential::CredentialError;
use crate::database::{AuthRejection, ConnectionError};
use crate::error::{Cause, DataAccessError};

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let access = connect(&output_format)?;
    let text = matches!(output_format, OutputFormat::Text);

    if text {
        println!("Checking credential sources...");
    }
    let credential = access
        .credentials()
        .acquire()
        .await
        .map_err(|e| report(&output_format, e.into()))?;
    if text {
        println!("✓ Credential from {}", credential.source());
        println!("  Expires at: {}", credential.expires_at());
        println!("  Token length: {} characters", credential.token().len());
        println!("\nConnecting to database...");
    }

    let diagnostics = access.diagnostics().await.map_err(|e| report(&output_format, e))?;

    match output_format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "success": true,
                    "credential": {
                        "source": credential.source(),
                        "expires_at": credential.expires_at().to_rfc3339(),
                        "token_length": credential.token().len(),
                    },
                    "database": Value::Object(diagnostics),
                }))?
            );
        }
        OutputFormat::Text => {
            println!("✓ Database connection successful");
            print_record(&diagnostics);
        }
    }
    Ok(())
}

fn report(output_format: &OutputFormat, err: DataAccessError) -> anyhow::Error {
    if matches!(output_format, OutputFormat::Text) {
        for hint in hints(&err) {
            eprintln!("  hint: {}", hint);
        }
    }
    fail(output_format, err)
}

/// Operator hints for the common failure causes.
pub fn hints(err: &DataAccessError) -> Vec<&'static str> {
    match err.cause() {
        Cause::Credential(CredentialError::Exhausted { .. }) => vec![
            "No identity source is available; run `az login` or set AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET",
            "Check CATALOG_CREDENTIAL_SOURCES if the source order was customised",
        ],
        Cause::Credential(CredentialError::SourceFailure { .. }) => vec![
            "An identity source failed; set CLI_VERBOSE=1 to see which one and why",
        ],
        Cause::Connection(ConnectionError::AuthenticationFailure {
            reason: AuthRejection::IdentityUnauthorized,
            ..
        }) => vec![
            "The identity authenticated but has no database access",
            "Check that AZURE_AD_USER is configured as a Microsoft Entra role on the server",
        ],
        Cause::Connection(ConnectionError::AuthenticationFailure { .. }) => vec![
            "The server rejected the token even after a refresh; check the token scope (CATALOG_TOKEN_SCOPE)",
        ],
        Cause::Connection(ConnectionError::TransportFailure { .. }) => vec![
            "Check that the server is running and DB_HOST is correct",
            "Verify firewall rules allow this client address",
        ],
        Cause::Connection(ConnectionError::ConfigurationFailure { .. }) => vec![
            "Check that the database named by DB_NAME exists",
        ],
        _ => vec![],
    }
}
