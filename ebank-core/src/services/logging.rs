//! Diagnostics log
//!
//! A record of what the client went through, kept in `logs.duckdb` in the
//! client directory: which operation failed and with what message, when a
//! session ended, when the transaction log could not be written. Entries
//! never hold an account id, an amount or a balance. Money movements belong
//! to the transaction log.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use serde::Serialize;
use uuid::Uuid;

use crate::log_migrations::{LOG_MIGRATIONS, MIGRATIONS_TABLE};

/// Front end that opened the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPoint {
    /// One-shot subcommands (`status`, `history`, ...)
    Cli,
    /// The interactive banking shell
    Shell,
}

impl EntryPoint {
    fn label(self) -> &'static str {
        match self {
            EntryPoint::Cli => "cli",
            EntryPoint::Shell => "shell",
        }
    }
}

/// Something worth keeping about a session or a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    LoginSucceeded,
    /// `step` is the remote call that failed: `login` or `register_callback`.
    /// No error text for a plain credential mismatch.
    LoginFailed {
        step: &'static str,
        error: Option<String>,
    },
    RemoteError {
        operation: &'static str,
        error: String,
    },
    /// An authenticated session ended; `fatal` when a connection failure
    /// ended it rather than a logout
    SessionClosed { fatal: bool },
    /// The push route could not be released at teardown
    UnregisterFailed { error: String },
    TransactionLogFailed { error: String },
    CommandExecuted { command: &'static str },
}

impl Diagnostic {
    pub fn name(&self) -> &'static str {
        match self {
            Diagnostic::LoginSucceeded => "login_succeeded",
            Diagnostic::LoginFailed { .. } => "login_failed",
            Diagnostic::RemoteError { .. } => "remote_error",
            Diagnostic::SessionClosed { fatal: false } => "session_closed",
            Diagnostic::SessionClosed { fatal: true } => "session_lost",
            Diagnostic::UnregisterFailed { .. } => "unregister_failed",
            Diagnostic::TransactionLogFailed { .. } => "transaction_log_failed",
            Diagnostic::CommandExecuted { .. } => "command_executed",
        }
    }

    fn operation(&self) -> Option<&'static str> {
        match self {
            Diagnostic::LoginFailed { step, .. } => Some(*step),
            Diagnostic::RemoteError { operation, .. } => Some(*operation),
            Diagnostic::CommandExecuted { command } => Some(*command),
            _ => None,
        }
    }

    fn error(&self) -> Option<&str> {
        match self {
            Diagnostic::LoginFailed { error, .. } => error.as_deref(),
            Diagnostic::RemoteError { error, .. }
            | Diagnostic::UnregisterFailed { error }
            | Diagnostic::TransactionLogFailed { error } => Some(error),
            _ => None,
        }
    }
}

/// One stored diagnostics entry
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: String,
    /// Unix milliseconds
    pub recorded_at: i64,
    pub entry_point: String,
    pub app_version: String,
    pub platform: String,
    pub event: String,
    pub operation: Option<String>,
    pub error: Option<String>,
}

impl LogEntry {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogStats {
    pub total: u64,
    pub errors: u64,
    pub oldest: Option<i64>,
    pub newest: Option<i64>,
    pub path: PathBuf,
    pub size_bytes: u64,
}

pub struct LoggingService {
    conn: Mutex<Connection>,
    path: PathBuf,
    entry_point: EntryPoint,
}

impl LoggingService {
    /// Open `logs.duckdb` in `ebank_dir`, applying pending migrations
    pub fn open(ebank_dir: &Path, entry_point: EntryPoint) -> Result<Self> {
        let path = ebank_dir.join("logs.duckdb");
        let conn = Connection::open(&path)?;
        migrate(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
            entry_point,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Diagnostics log lock poisoned"))
    }

    pub fn record(&self, diagnostic: &Diagnostic) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO diagnostics \
             (id, recorded_at, entry_point, app_version, platform, event, operation, error) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                Uuid::new_v4().to_string(),
                Utc::now().timestamp_millis(),
                self.entry_point.label(),
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS,
                diagnostic.name(),
                diagnostic.operation(),
                diagnostic.error(),
            ],
        )?;
        Ok(())
    }

    /// Newest entries first, in recording order
    pub fn recent(&self, limit: usize, errors_only: bool) -> Result<Vec<LogEntry>> {
        let filter = if errors_only {
            "WHERE error IS NOT NULL"
        } else {
            ""
        };
        let sql = format!(
            "SELECT id, recorded_at, entry_point, app_version, platform, event, operation, error \
             FROM diagnostics {} ORDER BY seq DESC LIMIT ?",
            filter
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(LogEntry {
                id: row.get(0)?,
                recorded_at: row.get(1)?,
                entry_point: row.get(2)?,
                app_version: row.get(3)?,
                platform: row.get(4)?,
                event: row.get(5)?,
                operation: row.get(6)?,
                error: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn count(&self) -> Result<u64> {
        let total: i64 =
            self.conn()?
                .query_row("SELECT COUNT(*) FROM diagnostics", [], |row| row.get(0))?;
        Ok(total.max(0) as u64)
    }

    pub fn stats(&self) -> Result<LogStats> {
        let (total, errors, oldest, newest): (i64, i64, Option<i64>, Option<i64>) =
            self.conn()?.query_row(
                "SELECT COUNT(*), COUNT(error), MIN(recorded_at), MAX(recorded_at) FROM diagnostics",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        Ok(LogStats {
            total: total.max(0) as u64,
            errors: errors.max(0) as u64,
            oldest,
            newest,
            path: self.path.clone(),
            size_bytes: std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0),
        })
    }

    /// Delete entries recorded before `cutoff`; returns how many went
    pub fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = self.conn()?.execute(
            "DELETE FROM diagnostics WHERE recorded_at < ?",
            [cutoff.timestamp_millis()],
        )?;
        Ok(deleted as u64)
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    for (name, sql) in LOG_MIGRATIONS {
        // The bootstrap migration is idempotent and creates the table consulted below
        if *name != MIGRATIONS_TABLE {
            let applied: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sys_migrations WHERE migration_name = ?",
                [name],
                |row| row.get(0),
            )?;
            if applied > 0 {
                continue;
            }
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT OR IGNORE INTO sys_migrations (migration_name) VALUES (?)",
            [name],
        )?;
    }
    Ok(())
}

/// Record a diagnostic if a log is attached; failures are dropped
pub fn record_quietly(logger: Option<&LoggingService>, diagnostic: Diagnostic) {
    if let Some(logger) = logger {
        let _ = logger.record(&diagnostic);
    }
}
