//! In-process demo bank
//!
//! Implements the remote contract entirely in memory so the client can run
//! without a server (demo mode) and so tests can drive real push deliveries.
//! Incoming-transfer notifications are delivered the way a remote service
//! would: on a thread the client does not own, or inline inside the
//! transfer call to mimic a nested callback.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crate::domain::result::{Error, Result};
use crate::domain::AccountId;
use crate::ports::{BankService, TransferCallback};

/// Demo accounts: (id, password, opening balance)
pub const DEMO_ACCOUNTS: &[(&str, &str, i64)] = &[
    ("1001", "123456", 1_000_000),
    ("1002", "123456", 500_000),
    ("1003", "123456", 250_000),
];

/// How transfer notifications reach the recipient's receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// On a freshly spawned thread
    Spawned,
    /// Inside the transfer call, before it returns
    Inline,
}

struct DemoAccount {
    password: String,
    balance: i64,
}

#[derive(Default)]
struct BankState {
    accounts: HashMap<String, DemoAccount>,
    logged_in: HashSet<String>,
    callbacks: HashMap<String, Arc<dyn TransferCallback>>,
}

pub struct InMemoryBank {
    state: Mutex<BankState>,
    delivery: DeliveryMode,
    deliveries: Mutex<Vec<JoinHandle<()>>>,
}

impl InMemoryBank {
    /// An empty bank
    pub fn new(delivery: DeliveryMode) -> Self {
        Self {
            state: Mutex::new(BankState::default()),
            delivery,
            deliveries: Mutex::new(Vec::new()),
        }
    }

    /// A bank seeded with [`DEMO_ACCOUNTS`], delivering on spawned threads
    pub fn with_demo_accounts() -> Self {
        DEMO_ACCOUNTS
            .iter()
            .fold(Self::new(DeliveryMode::Spawned), |bank, (id, password, balance)| {
                bank.with_account(id, password, *balance)
            })
    }

    pub fn with_account(self, id: &str, password: &str, balance: i64) -> Self {
        self.lock().accounts.insert(
            id.to_string(),
            DemoAccount {
                password: password.to_string(),
                balance,
            },
        );
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    fn lock(&self) -> MutexGuard<'_, BankState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    pub fn balance_of(&self, id: &str) -> Option<i64> {
        self.lock().accounts.get(id).map(|a| a.balance)
    }

    #[cfg(test)]
    pub fn has_callback(&self, id: &str) -> bool {
        self.lock().callbacks.contains_key(id)
    }

    /// A third party moves funds into `to_id`; no login needed
    ///
    /// Used by the demo shell to produce pushes on demand.
    pub fn simulate_incoming(&self, from_id: &str, to_id: &str, amount: i64) -> Result<()> {
        let from = AccountId::parse(from_id)?;
        let to = AccountId::parse(to_id)?;
        self.move_funds(&from, &to, amount, false)
    }

    #[cfg(test)]
    fn pending_deliveries(&self) -> usize {
        self.deliveries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Wait until every spawned notification has been delivered
    pub fn wait_for_deliveries(&self) {
        let handles: Vec<_> = {
            let mut deliveries = self
                .deliveries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            deliveries.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn require_login(state: &BankState, id: &AccountId) -> Result<()> {
        if state.logged_in.contains(id.as_str()) {
            Ok(())
        } else {
            Err(Error::remote("Not logged in"))
        }
    }

    fn account_mut<'a>(state: &'a mut BankState, id: &AccountId) -> Result<&'a mut DemoAccount> {
        state
            .accounts
            .get_mut(id.as_str())
            .ok_or_else(|| Error::remote(format!("Account {} not found", id)))
    }

    fn move_funds(
        &self,
        from_id: &AccountId,
        to_id: &AccountId,
        amount: i64,
        require_login: bool,
    ) -> Result<()> {
        let (callback, new_balance) = {
            let mut state = self.lock();
            if require_login {
                Self::require_login(&state, from_id)?;
            }
            if amount <= 0 {
                return Err(Error::remote("Invalid amount"));
            }
            if from_id == to_id {
                return Err(Error::remote("Cannot transfer to the same account"));
            }
            if !state.accounts.contains_key(to_id.as_str()) {
                return Err(Error::remote(format!("Account {} not found", to_id)));
            }

            let from = Self::account_mut(&mut state, from_id)?;
            if from.balance < amount {
                return Err(Error::remote("Insufficient funds"));
            }
            from.balance -= amount;

            let to = Self::account_mut(&mut state, to_id)?;
            to.balance += amount;
            let new_balance = to.balance;

            (state.callbacks.get(to_id.as_str()).cloned(), new_balance)
        };

        if let Some(callback) = callback {
            self.deliver(callback, from_id.to_string(), amount, new_balance);
        }
        Ok(())
    }

    // Receiver errors (e.g. a torn-down session) are the client's business
    fn deliver(
        &self,
        callback: Arc<dyn TransferCallback>,
        from_id: String,
        amount: i64,
        new_balance: i64,
    ) {
        match self.delivery {
            DeliveryMode::Inline => {
                let _ = callback.notify_transfer(&from_id, amount, new_balance);
            }
            DeliveryMode::Spawned => {
                let handle = thread::spawn(move || {
                    let _ = callback.notify_transfer(&from_id, amount, new_balance);
                });
                let mut deliveries = self
                    .deliveries
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                // Finished deliveries have nothing left to wait for
                deliveries.retain(|handle| !handle.is_finished());
                deliveries.push(handle);
            }
        }
    }
}

impl BankService for InMemoryBank {
    fn login(&self, account_id: &AccountId, password: &str) -> Result<bool> {
        let mut state = self.lock();
        let matches = state
            .accounts
            .get(account_id.as_str())
            .map(|a| a.password == password)
            .unwrap_or(false);
        if matches {
            state.logged_in.insert(account_id.to_string());
        }
        Ok(matches)
    }

    fn get_balance(&self, account_id: &AccountId) -> Result<i64> {
        let mut state = self.lock();
        Self::require_login(&state, account_id)?;
        Ok(Self::account_mut(&mut state, account_id)?.balance)
    }

    fn deposit(&self, account_id: &AccountId, amount: i64) -> Result<()> {
        let mut state = self.lock();
        Self::require_login(&state, account_id)?;
        if amount <= 0 {
            return Err(Error::remote("Invalid amount"));
        }
        Self::account_mut(&mut state, account_id)?.balance += amount;
        Ok(())
    }

    fn withdraw(&self, account_id: &AccountId, amount: i64) -> Result<()> {
        let mut state = self.lock();
        Self::require_login(&state, account_id)?;
        if amount <= 0 {
            return Err(Error::remote("Invalid amount"));
        }
        let account = Self::account_mut(&mut state, account_id)?;
        if account.balance < amount {
            return Err(Error::remote("Insufficient funds"));
        }
        account.balance -= amount;
        Ok(())
    }

    fn transfer(&self, from_id: &AccountId, to_id: &AccountId, amount: i64) -> Result<()> {
        self.move_funds(from_id, to_id, amount, true)
    }

    fn register_callback(
        &self,
        account_id: &AccountId,
        receiver: Arc<dyn TransferCallback>,
    ) -> Result<()> {
        let mut state = self.lock();
        Self::require_login(&state, account_id)?;
        state.callbacks.insert(account_id.to_string(), receiver);
        Ok(())
    }

    fn unregister_callback(&self, account_id: &AccountId) -> Result<()> {
        self.lock().callbacks.remove(account_id.as_str());
        Ok(())
    }
}
