//! Transaction log port - append-only external event sink

use crate::domain::{AccountId, TransactionEvent};

/// Append-only log of finalized events, one stream per account
///
/// Entries must be written in the order `append` is called. The log owns its
/// own failures: an I/O problem is swallowed here and never reaches the
/// session, which is why `append` returns nothing.
pub trait TransactionLog: Send + Sync {
    /// Log name (for diagnostics)
    fn name(&self) -> &str;

    fn append(&self, account_id: &AccountId, event: &TransactionEvent);
}
