//! Status command - show endpoint, mode and reachability

use anyhow::Result;
use colored::Colorize;

use super::{get_ebank_dir, get_logger};
use crate::output;
use ebank_core::services::{EntryPoint, StatusService};

pub fn run(json: bool) -> Result<()> {
    let ebank_dir = get_ebank_dir();
    let status = StatusService::new(&ebank_dir, get_logger(EntryPoint::Cli)).get_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "eBank Client Status".bold());
    println!();

    let reachable = if status.reachable {
        "yes".green().to_string()
    } else {
        "no".red().to_string()
    };
    let mode = if status.demo_mode { "demo" } else { "remote" };

    let mut table = output::create_table();
    table.add_row(vec!["Mode", mode]);
    table.add_row(vec!["Bank", &status.endpoint]);
    table.add_row(vec!["Reachable", &reachable]);
    table.add_row(vec!["Client directory", &status.ebank_dir]);
    table.add_row(vec!["Transaction logs", &status.transaction_log_dir]);
    if let Some(count) = status.diagnostics_entries {
        table.add_row(vec!["Diagnostics entries".to_string(), count.to_string()]);
    }
    println!("{}", table);

    if let Some(err) = &status.reachability_error {
        println!();
        output::error(err);
    }

    if !status.logged_accounts.is_empty() {
        println!();
        println!("{}", "Accounts with history".bold());
        for account in &status.logged_accounts {
            println!("  • {}", account);
        }
    }

    Ok(())
}
