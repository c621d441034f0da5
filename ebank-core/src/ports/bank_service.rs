//! Remote bank service port
//!
//! Defines the contract of the remote account service and of the push
//! endpoint the service calls back into. The remote service is the single
//! source of truth for balances; the client only observes it.

use std::sync::Arc;

use crate::domain::result::Result;
use crate::domain::AccountId;

/// Remote account service
///
/// Every method is a blocking remote call. Implementations report transport
/// failures as `Error::Connection` and anything the service itself rejects
/// (invalid amount, insufficient funds, unknown account) as `Error::Remote`.
/// There is no structured failure code beyond that.
pub trait BankService: Send + Sync {
    /// Check credentials
    ///
    /// Returns `Ok(false)` on a credential mismatch. Never registers a push
    /// receiver; the caller does that after a `true` result.
    fn login(&self, account_id: &AccountId, password: &str) -> Result<bool>;

    /// Current authoritative balance, in minor units
    fn get_balance(&self, account_id: &AccountId) -> Result<i64>;

    fn deposit(&self, account_id: &AccountId, amount: i64) -> Result<()>;

    fn withdraw(&self, account_id: &AccountId, amount: i64) -> Result<()>;

    /// Move funds between accounts
    ///
    /// The service is not guaranteed to reject a non-positive amount, a
    /// self-transfer or an overdraft with a distinguishable error. Callers
    /// validate those first.
    fn transfer(&self, from_id: &AccountId, to_id: &AccountId, amount: i64) -> Result<()>;

    /// Bind a push endpoint to the account
    ///
    /// Only valid after a successful login. A later registration for the same
    /// account replaces the earlier one.
    fn register_callback(
        &self,
        account_id: &AccountId,
        receiver: Arc<dyn TransferCallback>,
    ) -> Result<()>;

    /// Release the account's push endpoint
    ///
    /// Pushes stop reaching the receiver registered for the account. A
    /// missing registration is not an error.
    fn unregister_callback(&self, account_id: &AccountId) -> Result<()>;
}

/// Push endpoint invoked by the remote service
///
/// Called on an execution context the client does not control, possibly
/// concurrently with (or nested inside) any in-flight client request.
/// Delivery is at-least-once. Implementations must hand off and return
/// promptly.
pub trait TransferCallback: Send + Sync {
    /// Funds from `from_id` were credited; `new_balance` is the balance the
    /// service reports right after the credit.
    fn notify_transfer(&self, from_id: &str, amount: i64, new_balance: i64) -> Result<()>;
}
