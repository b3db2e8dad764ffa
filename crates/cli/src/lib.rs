pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "wagewiz",
    about = "WageWiz operator CLI",
    long_about = "Apply migrations, load the demo payroll dataset, and inspect effective configuration.",
    after_help = "Examples:\n  wagewiz migrate\n  wagewiz seed --reset\n  wagewiz config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo company, employees, and leave records")]
    Seed {
        #[arg(long, help = "Remove the demo dataset and its conversations before loading")]
        reset: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { reset } => commands::seed::run(reset),
        Command::Config => commands::config::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
