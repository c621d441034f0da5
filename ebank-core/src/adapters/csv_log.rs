//! CSV transaction log
//!
//! One file per account, `history_<accountId>.csv`, header
//! `time,type,detail,amount,balance`. Appends take an exclusive advisory
//! lock so two clients logged into the same account never interleave rows.
//! Write failures are reported to the diagnostics log and otherwise ignored.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};
use crate::domain::{AccountId, EventKind, TransactionEvent};
use crate::ports::TransactionLog;
use crate::services::logging::{record_quietly, Diagnostic, LoggingService};

pub const CSV_HEADER: [&str; 5] = ["time", "type", "detail", "amount", "balance"];
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One persisted row, as read back for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub time: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub detail: String,
    pub amount: i64,
    pub balance: i64,
}

pub struct CsvTransactionLog {
    dir: PathBuf,
    diagnostics: Option<Arc<LoggingService>>,
}

impl CsvTransactionLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            diagnostics: None,
        }
    }

    pub fn with_diagnostics(mut self, logger: Arc<LoggingService>) -> Self {
        self.diagnostics = Some(logger);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the history of `account_id`
    ///
    /// Bytes outside `[A-Za-z0-9_-]` are written as `%XX`, so distinct ids
    /// never share a file.
    pub fn path_for(&self, account_id: &AccountId) -> PathBuf {
        self.dir
            .join(format!("history_{}.csv", encode_file_stem(account_id.as_str())))
    }

    fn try_append(&self, account_id: &AccountId, event: &TransactionEvent) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(account_id))?;

        FileExt::lock_exclusive(&file)?;
        let written = write_row(&file, event);
        let unlocked = FileExt::unlock(&file);
        written?;
        unlocked?;
        Ok(())
    }

    /// Read back everything logged for `account_id`
    ///
    /// A missing file is an empty history.
    pub fn read_history(&self, account_id: &AccountId) -> Result<Vec<HistoryRow>> {
        let path = self.path_for(account_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path)?;
        FileExt::lock_shared(&file)?;
        let mut reader = csv::Reader::from_reader(&file);
        let rows = reader
            .deserialize()
            .collect::<std::result::Result<Vec<HistoryRow>, _>>()
            .map_err(|e| Error::Logging(format!("{}: {}", path.display(), e)));
        let _ = FileExt::unlock(&file);
        rows
    }
}

fn encode_file_stem(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

// The header is written only into an empty file, checked under the lock
fn write_row(file: &File, event: &TransactionEvent) -> Result<()> {
    let needs_header = file.metadata()?.len() == 0;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    let to_logging = |e: csv::Error| Error::Logging(e.to_string());

    if needs_header {
        writer.write_record(CSV_HEADER).map_err(to_logging)?;
    }
    writer
        .write_record([
            event.occurred_at.with_timezone(&Local).format(TIME_FORMAT).to_string(),
            event.kind.as_str().to_string(),
            event.detail.replace(',', " "),
            event.amount.to_string(),
            event.balance_after.to_string(),
        ])
        .map_err(to_logging)?;
    writer.flush()?;
    Ok(())
}

impl TransactionLog for CsvTransactionLog {
    fn name(&self) -> &str {
        "csv"
    }

    fn append(&self, account_id: &AccountId, event: &TransactionEvent) {
        if let Err(e) = self.try_append(account_id, event) {
            record_quietly(
                self.diagnostics.as_deref(),
                Diagnostic::TransactionLogFailed {
                    error: e.to_string(),
                },
            );
        }
    }
}
