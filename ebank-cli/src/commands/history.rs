//! History command - show an account's persisted transaction log

use anyhow::{Context, Result};
use colored::Colorize;

use super::get_ebank_dir;
use crate::output;
use ebank_core::adapters::csv_log::CsvTransactionLog;
use ebank_core::config::Config;
use ebank_core::AccountId;

pub fn run(account: &str, json: bool) -> Result<()> {
    let ebank_dir = get_ebank_dir();
    let config = Config::load(&ebank_dir)?;
    let account_id = AccountId::parse(account)?;

    let log = CsvTransactionLog::new(config.transaction_log_dir(&ebank_dir));
    let rows = log
        .read_history(&account_id)
        .with_context(|| format!("Failed to read history for {}", account_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No history for account {}.", account_id);
        return Ok(());
    }

    println!("{}", format!("History for {}", account_id).bold());
    if config.demo_mode {
        output::warning("(demo mode)");
    }

    let mut table = output::create_table();
    table.set_header(vec!["Time", "Type", "Detail", "Amount", "Balance"]);
    for row in &rows {
        table.add_row(vec![
            row.time.clone(),
            row.kind.to_string(),
            row.detail.clone(),
            output::format_amount(row.amount),
            output::format_amount(row.balance),
        ]);
    }
    println!("{}", table);
    println!("{} entries, written to {}", rows.len(), log.path_for(&account_id).display());

    Ok(())
}
