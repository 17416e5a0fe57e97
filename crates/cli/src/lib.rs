pub mod commands;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "kodbook",
    about = "Kodbook operator CLI",
    long_about = "Operate the kodbook order store: migrations, code listings, config inspection, and readiness checks.",
    after_help = "Examples:\n  kodbook migrate\n  kodbook seed --date 2026-03-10 K1 K2 K3\n  kodbook doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Register codes in the listing for one date (existing codes are kept)")]
    Seed {
        #[arg(long, help = "Listing date as YYYY-MM-DD")]
        date: NaiveDate,
        #[arg(required = true, num_args = 1.., help = "Codes to offer on that date")]
        codes: Vec<String>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, Telegram token shape, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { date, codes } => commands::seed::run(date, &codes),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
