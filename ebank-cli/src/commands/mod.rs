//! CLI command implementations

pub mod demo;
pub mod history;
pub mod logs;
pub mod shell;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ebank_core::config::default_ebank_dir;
use ebank_core::services::{EntryPoint, LoggingService};
use ebank_core::BankClientContext;

/// Get the diagnostics logger
///
/// Returns None if logging fails to initialize (never blocks operations)
pub fn get_logger(entry_point: EntryPoint) -> Option<Arc<LoggingService>> {
    let ebank_dir = get_ebank_dir();
    std::fs::create_dir_all(&ebank_dir).ok()?;
    LoggingService::open(&ebank_dir, entry_point)
        .ok()
        .map(Arc::new)
}

/// Get the client directory from environment or default
pub fn get_ebank_dir() -> PathBuf {
    default_ebank_dir()
}

/// Create the client context (checks the bank is reachable unless in demo mode)
pub fn get_context(logger: Option<Arc<LoggingService>>) -> Result<BankClientContext> {
    let ebank_dir = get_ebank_dir();
    BankClientContext::new(&ebank_dir, logger).context("Failed to initialize eBank client")
}
