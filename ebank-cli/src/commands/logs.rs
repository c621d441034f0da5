//! Logs command - inspect and prune the diagnostics log

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;

use super::get_ebank_dir;
use crate::output;
use ebank_core::services::{EntryPoint, LogEntry, LogStats, LoggingService};

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent diagnostics, newest first
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Only entries that carry an error
        #[arg(long)]
        errors: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete old diagnostics
    Clear {
        /// Keep the last N days
        #[arg(long, default_value = "30")]
        older_than_days: u32,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show entry counts, time span and where the log lives
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn open_log() -> Result<LoggingService> {
    let ebank_dir = get_ebank_dir();
    std::fs::create_dir_all(&ebank_dir)
        .with_context(|| format!("Cannot create {}", ebank_dir.display()))?;
    LoggingService::open(&ebank_dir, EntryPoint::Cli).context("Cannot open the diagnostics log")
}

pub fn run(command: LogsCommands) -> Result<()> {
    match command {
        LogsCommands::List { limit, errors, json } => list(limit, errors, json),
        LogsCommands::Clear {
            older_than_days,
            force,
            json,
        } => clear(older_than_days, force, json),
        LogsCommands::Stats { json } => stats(json),
    }
}

fn list(limit: usize, errors_only: bool, json: bool) -> Result<()> {
    let entries = open_log()?.recent(limit, errors_only)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        output::info("Diagnostics log is empty");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Time", "From", "Event", "Operation", "Error"]);
    for entry in &entries {
        table.add_row(row_for(entry));
    }
    println!("{}", table);
    Ok(())
}

fn row_for(entry: &LogEntry) -> Vec<String> {
    let event = if entry.is_error() {
        entry.event.red().to_string()
    } else {
        entry.event.clone()
    };
    vec![
        local_time(entry.recorded_at),
        entry.entry_point.clone(),
        event,
        entry.operation.clone().unwrap_or_default(),
        entry.error.clone().unwrap_or_default(),
    ]
}

fn clear(older_than_days: u32, force: bool, json: bool) -> Result<()> {
    let log = open_log()?;
    let cutoff = cutoff_for(Utc::now(), older_than_days);

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete diagnostics recorded before {}?",
                local_time(cutoff.timestamp_millis())
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let deleted = log.purge_before(cutoff)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": deleted }));
    } else {
        output::success(&format!("Deleted {} entries", deleted));
    }
    Ok(())
}

fn cutoff_for(now: DateTime<Utc>, older_than_days: u32) -> DateTime<Utc> {
    now - Duration::days(i64::from(older_than_days))
}

fn stats(json: bool) -> Result<()> {
    let stats = open_log()?.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &LogStats) {
    println!("{}", "Diagnostics log".bold());
    println!("  Entries: {} ({} errors)", stats.total, stats.errors);
    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        println!("  Span:    {} to {}", local_time(oldest), local_time(newest));
    }
    println!("  File:    {}", stats.path.display());
    println!("  Size:    {}", format_size(stats.size_bytes));
}

fn local_time(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    match bytes {
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{} bytes", b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_cutoff_counts_whole_days() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(cutoff_for(now, 0), now);
        assert_eq!(
            cutoff_for(now, 30),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_error_rows_keep_their_message() {
        let entry = LogEntry {
            id: "x".to_string(),
            recorded_at: 0,
            entry_point: "shell".to_string(),
            app_version: "0.1.0".to_string(),
            platform: "linux".to_string(),
            event: "remote_error".to_string(),
            operation: Some("withdraw".to_string()),
            error: Some("Insufficient funds".to_string()),
        };
        let row = row_for(&entry);
        assert_eq!(row[1], "shell");
        assert_eq!(row[3], "withdraw");
        assert_eq!(row[4], "Insufficient funds");
    }
}
