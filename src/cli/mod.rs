pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "catalog")]
#[command(about = "Catalog CLI - token-authenticated access to the LEGO catalog database")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Check credential acquisition and database connectivity")]
    Diagnose,

    #[command(about = "List entity views and the filters they accept")]
    Views,

    #[command(about = "List one page of an entity view")]
    List(commands::list::ListArgs),

    #[command(about = "Show dashboard totals")]
    Summary,

    #[command(about = "Add a set to the personal collection")]
    Add(commands::collection::AddArgs),

    #[command(about = "Remove an entry from the personal collection")]
    Remove {
        #[arg(help = "Collection entry id")]
        id: i64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Diagnose => commands::diagnose::handle(output_format).await,
        Commands::Views => commands::views::handle(output_format),
        Commands::List(args) => commands::list::handle(args, output_format).await,
        Commands::Summary => commands::summary::handle(output_format).await,
        Commands::Add(args) => commands::collection::add(args, output_format).await,
        Commands::Remove { id } => commands::collection::remove(id, output_format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_command() {
        let cli = Cli::try_parse_from([
            "catalog", "--json", "list", "sets", "--filter", "search=star", "--filter", "theme=Star Wars",
            "--page", "2",
        ])
        .unwrap();
        assert!(matches!(OutputFormat::from_cli(&cli), OutputFormat::Json));
        match cli.command {
            Commands::List(args) => {
                assert_eq!(args.view, "sets");
                assert_eq!(args.filters.len(), 2);
                assert_eq!(args.page, 2);
                assert_eq!(args.page_size, 20);
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn test_parse_add_command() {
        let cli = Cli::try_parse_from(["catalog", "add", "75192-1", "--quantity", "2", "--notes", "gift"]).unwrap();
        match cli.command {
            Commands::Add(args) => {
                assert_eq!(args.set_num, "75192-1");
                assert_eq!(args.quantity, 2);
                assert_eq!(args.notes.as_deref(), Some("gift"));
                assert!(args.build_status.is_none());
            }
            _ => panic!("expected add"),
        }
    }
}
