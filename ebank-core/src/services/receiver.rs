//! Push notification receiver
//!
//! The endpoint registered with the remote service at login. It turns each
//! inbound credit into a `TransferIn` event and hands it to the session's
//! sink. Once the session is torn down the receiver is invalidated and every
//! later push is rejected instead of touching the closed session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::result::{Error, Result};
use crate::domain::{AccountId, TransactionEvent};
use crate::ports::TransferCallback;
use crate::services::EventSink;

pub struct PushNotificationReceiver {
    account_id: AccountId,
    sink: Arc<EventSink>,
    active: AtomicBool,
}

impl PushNotificationReceiver {
    pub fn new(account_id: AccountId, sink: Arc<EventSink>) -> Self {
        Self {
            account_id,
            sink,
            active: AtomicBool::new(true),
        }
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop accepting pushes; idempotent
    pub fn invalidate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl TransferCallback for PushNotificationReceiver {
    fn notify_transfer(&self, from_id: &str, amount: i64, new_balance: i64) -> Result<()> {
        if !self.is_active() {
            return Err(Error::SessionClosed);
        }
        if amount < 0 {
            return Err(Error::validation(format!(
                "Malformed transfer notification: negative amount {}",
                amount
            )));
        }

        let event = TransactionEvent::transfer_in(from_id, amount, new_balance);
        self.sink.append(Some(&self.account_id), event)?;
        Ok(())
    }
}
