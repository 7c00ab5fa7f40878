pub mod commands;

use std::ffi::OsString;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::commands::price::PriceArgs;

#[derive(Debug, Parser)]
#[command(
    name = "tradeflow",
    about = "Tradeflow operator CLI",
    long_about = "Operate Tradeflow migrations, readiness checks, config inspection, and ad-hoc pricing.",
    after_help = "Examples:\n  tradeflow doctor --json\n  tradeflow config\n  tradeflow price --cost 100 --method margin_based --margin 40"
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
        about = "Inspect effective configuration values with source attribution"
    )]
    Config,
    #[command(about = "Validate config, exchange rates, DB connectivity and schema version")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run the pricing engine for one item and print the breakdown as JSON")]
    Price(PriceArgs),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let result = dispatch(cli.command);

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Parses `args` (program name first) and runs the selected command.
pub fn execute<I, T>(args: I) -> Result<commands::CommandResult, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args)?;
    Ok(dispatch(cli.command))
}

fn dispatch(command: Command) -> commands::CommandResult {
    match command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Price(args) => commands::price::run(&args),
    }
}
