use serde_json::json;

use crate::catalog::Catalog;
use crate::cli::OutputFormat;
use crate::filter::{MatchMode, ValueKind};

pub fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let catalog = Catalog::lego();

    match output_format {
        OutputFormat::Json => {
            let views: Vec<_> = catalog
                .views()
                .iter()
                .map(|v| {
                    json!({
                        "name": v.name,
                        "default_order": v.default_order,
                        "filters": v.filters,
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "views": views,
                    "statements": catalog.statements(),
                }))?
            );
        }
        OutputFormat::Text => {
            for view in catalog.views() {
                println!("{}  (order: {})", view.name, view.default_order);
                for filter in &view.filters {
                    let mode = match (filter.mode, filter.kind) {
                        (MatchMode::ContainsInsensitive, _) => "contains",
                        (MatchMode::Exact, ValueKind::Integer) => "equals (integer)",
                        (MatchMode::Exact, ValueKind::Text) => "equals",
                    };
                    println!("  --filter {}=...  {} {}", filter.name, mode, filter.columns.join(", "));
                }
            }
            println!();
            for statement in catalog.statements() {
                let params: Vec<String> = statement
                    .params
                    .iter()
                    .map(|p| if p.required { p.name.to_string() } else { format!("[{}]", p.name) })
                    .collect();
                println!("{}({})", statement.id, params.join(", "));
            }
        }
    }
    Ok(())
}
