mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::alignment::{OverTimeArgs, ScoreArgs};
use commands::scenarios::ScenariosArgs;

/// Portfolio climate-alignment scoring
#[derive(Parser)]
#[command(
    name = "aca",
    version,
    about = "Portfolio climate-alignment scoring",
    long_about = "A CLI for scoring loan-book climate alignment with decimal precision. \
                  Derives TMS/SDA production targets from scenario pathways, consolidates \
                  exposure over ownership hierarchies, and aggregates exposure-weighted \
                  deviations into bounded alignment scores and over-time shift metrics."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute net alignment scores for the loaded loan book
    Score(ScoreArgs),
    /// Compute alignment change over time with shift decomposition
    OverTime(OverTimeArgs),
    /// List the scenarios available in the configured scenario files
    Scenarios(ScenariosArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Score(args) => commands::alignment::run_score(args),
        Commands::OverTime(args) => commands::alignment::run_over_time(args),
        Commands::Scenarios(args) => commands::scenarios::run_scenarios(args),
        Commands::Version => {
            println!("aca {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
