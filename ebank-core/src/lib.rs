//! eBank Core - session coordination for a remote banking client
//!
//! This crate implements the client core following hexagonal architecture:
//!
//! - **domain**: Core types (AccountId, TransactionEvent, SessionState, Error)
//! - **ports**: Trait definitions for external dependencies (BankService, TransactionLog)
//! - **services**: EventSink, PushNotificationReceiver, BankSession and friends
//! - **adapters**: Concrete implementations (HTTP bank client, push endpoint, CSV log, demo bank)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::csv_log::CsvTransactionLog;
use adapters::demo::InMemoryBank;
use adapters::http::HttpBankService;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{AccountId, EventKind, RecordedEvent, SessionState, TransactionEvent};
pub use ports::{BankService, TransactionLog, TransferCallback};

/// Main context for client operations
///
/// Resolves configuration, picks the bank (HTTP or the in-process demo
/// bank) and the transaction log directory, and hands out sessions wired to
/// both.
pub struct BankClientContext {
    pub config: Config,
    pub ebank_dir: PathBuf,
    pub remote: Arc<dyn BankService>,
    /// Set in demo mode; the same bank as `remote`
    pub demo_bank: Option<Arc<InMemoryBank>>,
    pub transaction_log: Arc<CsvTransactionLog>,
    pub diagnostics: Option<Arc<LoggingService>>,
}

impl BankClientContext {
    /// Create a context; outside demo mode this checks the bank is reachable
    pub fn new(ebank_dir: &Path, diagnostics: Option<Arc<LoggingService>>) -> Result<Self> {
        std::fs::create_dir_all(ebank_dir)
            .with_context(|| format!("Failed to create {}", ebank_dir.display()))?;
        let config = Config::load(ebank_dir)?;

        let (remote, demo_bank) = if config.demo_mode {
            let bank = Arc::new(InMemoryBank::with_demo_accounts());
            let remote: Arc<dyn BankService> = bank.clone();
            (remote, Some(bank))
        } else {
            let settings = config.remote_settings()?;
            let endpoint = settings.base_url.clone();
            let http = HttpBankService::connect(settings)
                .with_context(|| format!("Cannot reach bank at {}", endpoint))?;
            let remote: Arc<dyn BankService> = Arc::new(http);
            (remote, None)
        };

        let mut transaction_log = CsvTransactionLog::new(config.transaction_log_dir(ebank_dir));
        if let Some(logger) = &diagnostics {
            transaction_log = transaction_log.with_diagnostics(Arc::clone(logger));
        }

        Ok(Self {
            config,
            ebank_dir: ebank_dir.to_path_buf(),
            remote,
            demo_bank,
            transaction_log: Arc::new(transaction_log),
            diagnostics,
        })
    }

    /// A fresh, unauthenticated session that logs to the CSV transaction log
    pub fn new_session(&self) -> Result<BankSession> {
        let mut session = BankSession::new(Arc::clone(&self.remote));
        if let Some(logger) = &self.diagnostics {
            session = session.with_diagnostics(Arc::clone(logger));
        }
        let log: Arc<dyn TransactionLog> = self.transaction_log.clone();
        session
            .attach_log(log)
            .context("Failed to start transaction log")?;
        Ok(session)
    }
}
