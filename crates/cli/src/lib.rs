pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "parley",
    about = "Parley operator CLI",
    long_about = "Operate Parley migrations, demo fixtures, and smoke validation.",
    after_help = "Examples:\n  parley migrate\n  parley seed\n  parley smoke"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load deterministic demo negotiation threads into the configured database")]
    Seed,
    #[command(
        about = "Drive a full negotiate/pause/resume/close cycle in-process and report per-check results"
    )]
    Smoke,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Smoke => commands::smoke::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
