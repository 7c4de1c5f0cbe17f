use clap::Args;
use serde_json::json;

use crate::cli::utils::{connect, display_value, fail};
use crate::cli::OutputFormat;
use crate::filter::{FilterSet, PageRequest};

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(help = "Entity view name (see `catalog views`)")]
    pub view: String,

    #[arg(long = "filter", value_name = "KEY=VALUE", value_parser = parse_filter, help = "Filter value, repeatable")]
    pub filters: Vec<(String, String)>,

    #[arg(long, default_value_t = 1, help = "Page number, starting at 1")]
    pub page: u32,

    #[arg(long, default_value_t = 20, help = "Records per page")]
    pub page_size: u32,
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", raw))
}

pub async fn handle(args: ListArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let page = PageRequest::new(args.page, args.page_size)?;
    let mut filters = FilterSet::new();
    for (key, value) in args.filters {
        filters.insert(key, value);
    }

    let access = connect(&output_format)?;
    let result = access
        .fetch_page(&args.view, &filters, page)
        .await
        .map_err(|e| fail(&output_format, e))?;

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!(result))?);
        }
        OutputFormat::Text => {
            if result.records.is_empty() {
                println!("No {} found", args.view);
                return Ok(());
            }
            for record in &result.records {
                let line: Vec<String> = record
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, display_value(v)))
                    .collect();
                println!("{}", line.join("  "));
            }
            println!(
                "\nPage {} of {} ({} matching, {} per page)",
                result.page, result.total_pages, result.total_matching, result.page_size
            );
        }
    }
    Ok(())
}
