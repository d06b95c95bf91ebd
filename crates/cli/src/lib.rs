pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "cutplan",
    about = "Cutplan operator CLI",
    long_about = "Operate cutplan migrations, pattern reseeding, retention sweeps, and corpus statistics.",
    after_help = "Examples:\n  cutplan migrate\n  cutplan reseed\n  cutplan cleanup --days 90\n  cutplan stats"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Rebuild the suggestion pattern store from full cutting-list history")]
    Reseed,
    #[command(about = "Delete patterns unused beyond the retention window")]
    Cleanup {
        #[arg(long, help = "Retention window in days (defaults to the configured window)")]
        days: Option<u32>,
    },
    #[command(about = "Print corpus-wide pattern statistics")]
    Stats,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Reseed => commands::reseed::run(),
        Command::Cleanup { days } => commands::cleanup::run(days),
        Command::Stats => commands::stats::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
