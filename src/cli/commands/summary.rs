use serde_json::{json, Value};

use crate::cli::utils::{connect, display_value, fail, print_record};
use crate::cli::OutputFormat;
use crate::filter::{FilterSet, PageRequest};

const TOP_THEMES: u32 = 5;

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let access = connect(&output_format)?;
    let summary = access.fetch_summary().await.map_err(|e| fail(&output_format, e))?;
    let themes = access
        .fetch_page("popular_themes", &FilterSet::new(), PageRequest::new(1, TOP_THEMES)?)
        .await
        .map_err(|e| fail(&output_format, e))?;

    match output_format {
        OutputFormat::Json => {
            let body = json!({
                "totals": Value::Object(summary),
                "popular_themes": themes.records,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => {
            println!("Catalog summary:");
            print_record(&summary);
            println!();
            println!("Popular themes:");
            for theme in &themes.records {
                let field = |key: &str| theme.get(key).map(display_value).unwrap_or_default();
                println!("  {:<30} {}", field("name"), field("set_count"));
            }
        }
    }
    Ok(())
}
