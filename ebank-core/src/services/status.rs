//! Status service - where the client points and whether it can get there

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::adapters::http::HttpBankService;
use crate::config::Config;
use crate::services::LoggingService;

pub struct StatusService {
    ebank_dir: PathBuf,
    diagnostics: Option<Arc<LoggingService>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub demo_mode: bool,
    pub endpoint: String,
    pub reachable: bool,
    pub reachability_error: Option<String>,
    pub ebank_dir: String,
    pub transaction_log_dir: String,
    pub logged_accounts: Vec<String>,
    pub diagnostics_entries: Option<u64>,
}

impl StatusService {
    pub fn new(ebank_dir: &Path, diagnostics: Option<Arc<LoggingService>>) -> Self {
        Self {
            ebank_dir: ebank_dir.to_path_buf(),
            diagnostics,
        }
    }

    /// Summarize configuration and check the bank is reachable
    ///
    /// In demo mode the bank is in-process and always reachable.
    pub fn get_status(&self) -> Result<StatusSummary> {
        let config = Config::load(&self.ebank_dir)?;
        let log_dir = config.transaction_log_dir(&self.ebank_dir);

        let (endpoint, health) = if config.demo_mode {
            ("in-process demo bank".to_string(), Ok(()))
        } else {
            match config.remote_settings() {
                Ok(settings) => {
                    let endpoint = settings.base_url.to_string();
                    let health = HttpBankService::new(settings).and_then(|s| s.health_check());
                    (endpoint, health)
                }
                Err(e) => (config.url.clone().unwrap_or_default(), Err(e)),
            }
        };

        Ok(StatusSummary {
            demo_mode: config.demo_mode,
            endpoint,
            reachable: health.is_ok(),
            reachability_error: health.err().map(|e| e.to_string()),
            ebank_dir: self.ebank_dir.display().to_string(),
            transaction_log_dir: log_dir.display().to_string(),
            logged_accounts: logged_accounts(&log_dir),
            diagnostics_entries: self.diagnostics.as_ref().and_then(|d| d.count().ok()),
        })
    }
}

/// Accounts with a history file, sorted
fn logged_accounts(log_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return Vec::new();
    };
    let mut accounts: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.strip_prefix("history_")?
                .strip_suffix(".csv")
                .map(str::to_string)
        })
        .collect();
    accounts.sort();
    accounts
}
