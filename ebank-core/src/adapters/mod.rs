//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - HTTP (blocking reqwest) client for BankService
//! - Embedded axum server for inbound transfer notifications
//! - In-process demo bank for demo mode and tests
//! - CSV files for TransactionLog

pub mod callback_server;
pub mod csv_log;
pub mod demo;
pub mod http;

#[cfg(test)]
pub mod bank_mock;
