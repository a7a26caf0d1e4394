pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "henhouse",
    about = "Henhouse operator CLI",
    long_about = "Apply Henhouse database migrations and inspect the effective configuration.",
    after_help = "Examples:\n  henhouse migrate\n  henhouse config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::CommandResult::text(commands::config::run()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
