//! Transaction event domain model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountId;

/// What kind of occurrence an event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "LOGIN")]
    Login,
    #[serde(rename = "BALANCE")]
    BalanceQuery,
    #[serde(rename = "DEPOSIT")]
    Deposit,
    #[serde(rename = "WITHDRAW")]
    Withdraw,
    #[serde(rename = "TRANSFER_OUT")]
    TransferOut,
    #[serde(rename = "TRANSFER_IN")]
    TransferIn,
    #[serde(rename = "ERROR")]
    Error,
}

impl EventKind {
    /// Label used in the CSV log and on screen
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Login => "LOGIN",
            EventKind::BalanceQuery => "BALANCE",
            EventKind::Deposit => "DEPOSIT",
            EventKind::Withdraw => "WITHDRAW",
            EventKind::TransferOut => "TRANSFER_OUT",
            EventKind::TransferIn => "TRANSFER_IN",
            EventKind::Error => "ERROR",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One state-relevant occurrence: a request result or a push notification
///
/// `occurred_at` is stamped locally at construction; it is not
/// server-authoritative and plays no part in ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub occurred_at: DateTime<Utc>,
    pub kind: EventKind,
    pub detail: String,
    /// Minor currency units, 0 when not applicable
    pub amount: i64,
    /// Most recently known remote balance when the event was recorded
    pub balance_after: i64,
}

impl TransactionEvent {
    /// Create an event stamped with the current time
    pub fn new(kind: EventKind, detail: impl Into<String>, amount: i64, balance_after: i64) -> Self {
        Self {
            occurred_at: Utc::now(),
            kind,
            detail: detail.into(),
            amount,
            balance_after,
        }
    }

    pub fn login(account_id: &AccountId, balance: i64) -> Self {
        Self::new(EventKind::Login, format!("Logged in as {}", account_id), 0, balance)
    }

    pub fn balance_query(balance: i64) -> Self {
        Self::new(EventKind::BalanceQuery, "Balance inquiry", 0, balance)
    }

    pub fn deposit(amount: i64, balance: i64) -> Self {
        Self::new(EventKind::Deposit, "Deposit", amount, balance)
    }

    pub fn withdraw(amount: i64, balance: i64) -> Self {
        Self::new(EventKind::Withdraw, "Withdrawal", amount, balance)
    }

    pub fn transfer_out(to_id: &AccountId, amount: i64, balance: i64) -> Self {
        Self::new(EventKind::TransferOut, format!("Transfer to {}", to_id), amount, balance)
    }

    pub fn transfer_in(from_id: &str, amount: i64, new_balance: i64) -> Self {
        Self::new(
            EventKind::TransferIn,
            format!("Received from {}", from_id),
            amount,
            new_balance,
        )
    }

    /// Error events never carry an amount
    pub fn error(detail: impl Into<String>, balance: i64) -> Self {
        Self::new(EventKind::Error, detail, 0, balance)
    }

    pub fn is_error(&self) -> bool {
        self.kind == EventKind::Error
    }
}

/// An event after it passed the linearization point
///
/// `sequence` is the 1-based position in the session history. `account_id`
/// is absent only for events recorded before any account was known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub sequence: u64,
    pub account_id: Option<AccountId>,
    pub event: TransactionEvent,
}
