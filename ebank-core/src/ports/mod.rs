//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The session layer
//! depends only on these traits, not on concrete implementations.

mod bank_service;
mod transaction_log;

pub use bank_service::{BankService, TransferCallback};
pub use transaction_log::TransactionLog;
