use clap::Args;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::cli::utils::{connect, fail, output_success};
use crate::cli::OutputFormat;

#[derive(Args, Debug)]
pub struct AddArgs {
    #[arg(help = "Set number, e.g. 75192-1")]
    pub set_num: String,

    #[arg(long, help = "Number of copies owned")]
    pub quantity: i64,

    #[arg(long, help = "Build status, e.g. built, sealed, in progress")]
    pub build_status: Option<String>,

    #[arg(long, help = "Where the set is displayed or stored")]
    pub location: Option<String>,

    #[arg(long)]
    pub notes: Option<String>,
}

impl AddArgs {
    fn params(&self) -> HashMap<String, Value> {
        let mut params = HashMap::new();
        params.insert("set_num".to_string(), json!(self.set_num));
        params.insert("quantity".to_string(), json!(self.quantity));
        if let Some(status) = &self.build_status {
            params.insert("build_status".to_string(), json!(status));
        }
        if let Some(location) = &self.location {
            params.insert("display_location".to_string(), json!(location));
        }
        if let Some(notes) = &self.notes {
            params.insert("notes".to_string(), json!(notes));
        }
        params
    }
}

pub async fn add(args: AddArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    if args.quantity < 1 {
        anyhow::bail!("Quantity must be at least 1");
    }

    let access = connect(&output_format)?;
    let affected = access
        .execute_write("user_inventory.add", &args.params())
        .await
        .map_err(|e| fail(&output_format, e))?;

    output_success(
        &output_format,
        &format!("Added {} x{} to the collection", args.set_num, args.quantity),
        Some(json!({ "affected": affected })),
    )
}

pub async fn remove(id: i64, output_format: OutputFormat) -> anyhow::Result<()> {
    let params: HashMap<String, Value> = [("id".to_string(), json!(id))].into_iter().collect();

    let access = connect(&output_format)?;
    let affected = access
        .execute_write("user_inventory.remove", &params)
        .await
        .map_err(|e| fail(&output_format, e))?;

    if affected == 0 {
        anyhow::bail!("No collection entry with id {}", id);
    }
    output_success(
        &output_format,
        &format!("Removed collection entry {}", id),
        Some(json!({ "affected": affected })),
    )
}
