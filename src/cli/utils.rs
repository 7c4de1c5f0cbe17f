use serde_json::{json, Map, Value};

use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::database::PgConnectionFactory;
use crate::error::DataAccessError;
use crate::services::DataAccess;

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = Map::new();
            response.insert("success".to_string(), json!(true));
            response.insert("message".to_string(), json!(message));

            if let Some(Value::Object(fields)) = data {
                response.extend(fields);
            }

            println!("{}", serde_json::to_string_pretty(&Value::Object(response))?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(output_format: &OutputFormat, message: &str, error_code: Option<&str>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": false,
                "error": message
            });

            if let Some(code) = error_code {
                response["error_code"] = json!(code);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {}
    }
    Ok(())
}

pub fn verbose() -> bool {
    matches!(std::env::var("CLI_VERBOSE").as_deref(), Ok("true") | Ok("1"))
}

/// Report a facade error and turn it into the command's failure.
///
/// Operators see the full cause only with `CLI_VERBOSE`; otherwise only the
/// generic message and code are shown.
pub fn fail(output_format: &OutputFormat, err: DataAccessError) -> anyhow::Error {
    tracing::error!("{}", err);
    let shown = if verbose() {
        err.to_string()
    } else {
        format!("{} [{}]", err.user_message(), err.error_code())
    };
    if let Err(e) = output_error(output_format, &shown, Some(err.error_code())) {
        tracing::warn!("Failed to write error output: {}", e);
    }
    if verbose() {
        anyhow::Error::new(err)
    } else {
        anyhow::anyhow!(shown)
    }
}

/// Facade over the database configured in the environment.
pub fn connect(output_format: &OutputFormat) -> anyhow::Result<DataAccess<PgConnectionFactory>> {
    let config = AppConfig::from_env().map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    DataAccess::from_config(&config).map_err(|e| fail(output_format, e))
}

/// Render a record as aligned `key: value` lines.
pub fn print_record(record: &Map<String, Value>) {
    let width = record.keys().map(|k| k.len()).max().unwrap_or(0);
    for (key, value) in record {
        println!("  {:width$}  {}", key, display_value(value), width = width);
    }
}

pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
