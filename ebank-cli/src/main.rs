//! eBank CLI - remote banking in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{demo, history, logs, shell, status};

/// eBank - remote banking in your terminal
#[derive(Parser)]
#[command(name = "ebank", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive banking session (default)
    Shell,

    /// Show the persisted transaction history of an account
    History {
        /// Account ID
        account: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show bank endpoint, mode and reachability
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the diagnostics log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },

    /// Manage demo mode
    Demo {
        #[command(subcommand)]
        command: Option<demo::DemoCommands>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        None | Some(Commands::Shell) => shell::run(),
        Some(Commands::History { account, json }) => history::run(&account, json),
        Some(Commands::Status { json }) => status::run(json),
        Some(Commands::Logs { command }) => logs::run(command),
        Some(Commands::Demo { command }) => demo::run(command),
    }
}
