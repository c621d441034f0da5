//! Bank session - request flow, validation and lifecycle
//!
//! A `BankSession` drives the caller's side: it issues blocking remote calls
//! one at a time, turns every outcome (success or failure) into an event on
//! the session's `EventSink`, and owns the push receiver's registration.
//! Failures never escape as bare errors only; each is also recorded as an
//! `Error` event so the event stream is the one channel a presentation layer
//! has to watch.

use std::sync::Arc;

use crate::domain::result::{Error, Result};
use crate::domain::{AccountId, RecordedEvent, SessionState, TransactionEvent};
use crate::ports::{BankService, TransactionLog, TransferCallback};
use crate::services::logging::{record_quietly, Diagnostic, LoggingService};
use crate::services::{EventSink, PushNotificationReceiver, TransactionLogWorker};

pub const LOGIN_FAILED: &str = "Login failed: wrong account ID or password";
pub const AMOUNT_NOT_POSITIVE: &str = "Amount must be greater than 0";
pub const RECIPIENT_REQUIRED: &str = "Recipient account is required";
pub const SELF_TRANSFER: &str = "Cannot transfer to your own account";

pub struct BankSession {
    remote: Arc<dyn BankService>,
    sink: Arc<EventSink>,
    state: SessionState,
    account_id: Option<AccountId>,
    receiver: Option<Arc<PushNotificationReceiver>>,
    log_workers: Vec<TransactionLogWorker>,
    diagnostics: Option<Arc<LoggingService>>,
}

impl BankSession {
    /// Create an unauthenticated session against `remote`
    pub fn new(remote: Arc<dyn BankService>) -> Self {
        Self {
            remote,
            sink: Arc::new(EventSink::new()),
            state: SessionState::Disconnected,
            account_id: None,
            receiver: None,
            log_workers: Vec::new(),
            diagnostics: None,
        }
    }

    pub fn with_diagnostics(mut self, logger: Arc<LoggingService>) -> Self {
        self.diagnostics = Some(logger);
        self
    }

    /// Feed every event of this session to a transaction log
    ///
    /// The log runs on its own worker thread and receives events already in
    /// the history as well as all later ones.
    pub fn attach_log(&mut self, log: Arc<dyn TransactionLog>) -> Result<()> {
        let (backlog, rx) = self.sink.subscribe_channel(log.name().to_string());
        let worker = TransactionLogWorker::spawn(log, backlog, rx)?;
        self.log_workers.push(worker);
        Ok(())
    }

    pub fn sink(&self) -> &Arc<EventSink> {
        &self.sink
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.permits_transactions()
    }

    pub fn account_id(&self) -> Option<&AccountId> {
        self.account_id.as_ref()
    }

    pub fn current_balance(&self) -> Option<i64> {
        self.sink.current_balance()
    }

    pub fn history(&self) -> Vec<RecordedEvent> {
        self.sink.history()
    }

    /// Authenticate, register the push receiver and load the balance
    ///
    /// The receiver is registered only after the remote login returned true.
    /// Ends with a `Login` event carrying the freshly read balance.
    pub fn login(&mut self, account_id: &str, password: &str) -> Result<RecordedEvent> {
        if self.state.is_terminal() {
            return Err(Error::SessionClosed);
        }
        if !self.state.can_begin_login() {
            return Err(Error::validation("Already logged in"));
        }

        let account_id = match AccountId::parse(account_id) {
            Ok(id) => id,
            Err(e) => return Err(self.reject(None, e)),
        };

        self.state = SessionState::Authenticating;
        match self.remote.login(&account_id, password) {
            Ok(true) => {}
            Ok(false) => {
                self.state = SessionState::Disconnected;
                self.diagnose(Diagnostic::LoginFailed {
                    step: "login",
                    error: None,
                });
                return Err(self.reject(Some(&account_id), Error::Auth(LOGIN_FAILED.to_string())));
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                self.diagnose(Diagnostic::LoginFailed {
                    step: "login",
                    error: Some(e.to_string()),
                });
                return Err(self.reject(Some(&account_id), e));
            }
        }

        let receiver = Arc::new(PushNotificationReceiver::new(
            account_id.clone(),
            Arc::clone(&self.sink),
        ));
        let callback: Arc<dyn TransferCallback> = receiver.clone();
        if let Err(e) = self.remote.register_callback(&account_id, callback) {
            receiver.invalidate();
            self.state = SessionState::Disconnected;
            self.diagnose(Diagnostic::LoginFailed {
                step: "register_callback",
                error: Some(e.to_string()),
            });
            return Err(self.reject(Some(&account_id), e));
        }

        self.account_id = Some(account_id.clone());
        self.receiver = Some(receiver);
        self.state = SessionState::Authenticated;
        self.diagnose(Diagnostic::LoginSucceeded);

        // A failed read leaves the balance unknown; transfer queries first
        match self.remote.get_balance(&account_id) {
            Ok(balance) => self.record(TransactionEvent::login(&account_id, balance)),
            Err(e) => Err(self.fail("login", e)),
        }
    }

    /// Read the authoritative balance
    pub fn query_balance(&mut self) -> Result<RecordedEvent> {
        let account_id = self.require_authenticated()?;
        match self.remote.get_balance(&account_id) {
            Ok(balance) => self.record(TransactionEvent::balance_query(balance)),
            Err(e) => Err(self.fail("balance", e)),
        }
    }

    pub fn deposit(&mut self, amount: i64) -> Result<RecordedEvent> {
        let account_id = self.require_authenticated()?;
        if amount <= 0 {
            return Err(self.reject_own(Error::validation(AMOUNT_NOT_POSITIVE)));
        }

        let result = self
            .remote
            .deposit(&account_id, amount)
            .and_then(|_| self.remote.get_balance(&account_id));
        match result {
            Ok(balance) => self.record(TransactionEvent::deposit(amount, balance)),
            Err(e) => Err(self.fail("deposit", e)),
        }
    }

    pub fn withdraw(&mut self, amount: i64) -> Result<RecordedEvent> {
        let account_id = self.require_authenticated()?;
        if amount <= 0 {
            return Err(self.reject_own(Error::validation(AMOUNT_NOT_POSITIVE)));
        }

        let result = self
            .remote
            .withdraw(&account_id, amount)
            .and_then(|_| self.remote.get_balance(&account_id));
        match result {
            Ok(balance) => self.record(TransactionEvent::withdraw(amount, balance)),
            Err(e) => Err(self.fail("withdraw", e)),
        }
    }

    /// Transfer to another account
    ///
    /// Amount, recipient and the last known balance are checked locally
    /// before the remote call. The checks are advisory: the remote service
    /// may still refuse, which is recorded like any other remote error.
    pub fn transfer(&mut self, to_id: &str, amount: i64) -> Result<RecordedEvent> {
        let account_id = self.require_authenticated()?;
        if amount <= 0 {
            return Err(self.reject_own(Error::validation(AMOUNT_NOT_POSITIVE)));
        }

        let to_id = match AccountId::parse(to_id) {
            Ok(id) => id,
            Err(_) => return Err(self.reject_own(Error::validation(RECIPIENT_REQUIRED))),
        };
        if to_id == account_id {
            return Err(self.reject_own(Error::validation(SELF_TRANSFER)));
        }

        let known_balance = match self.sink.current_balance() {
            Some(balance) => balance,
            None => self.query_balance()?.event.balance_after,
        };
        if amount > known_balance {
            return Err(self.reject_own(Error::validation(format!(
                "Amount exceeds balance ({})",
                known_balance
            ))));
        }

        let result = self
            .remote
            .transfer(&account_id, &to_id, amount)
            .and_then(|_| self.remote.get_balance(&account_id));
        match result {
            Ok(balance) => self.record(TransactionEvent::transfer_out(&to_id, amount, balance)),
            Err(e) => Err(self.fail("transfer", e)),
        }
    }

    /// End the session
    ///
    /// Releases the push endpoint, invalidates the receiver, closes the sink
    /// and waits for every attached transaction log to finish writing.
    /// History remains readable. Idempotent.
    pub fn logout(&mut self) {
        self.teardown(false);
    }

    fn teardown(&mut self, fatal: bool) {
        if self.state.is_terminal() {
            return;
        }
        let was_authenticated = self.state.permits_transactions();

        let release = match (&self.account_id, was_authenticated) {
            (Some(account_id), true) => self.remote.unregister_callback(account_id),
            _ => Ok(()),
        };
        if let Err(e) = release {
            self.diagnose(Diagnostic::UnregisterFailed {
                error: e.to_string(),
            });
        }
        // Covers pushes already in flight past the endpoint
        if let Some(receiver) = self.receiver.take() {
            receiver.invalidate();
        }
        self.state = SessionState::Closed;
        self.sink.close();

        for worker in self.log_workers.drain(..) {
            worker.join();
        }

        if was_authenticated {
            self.diagnose(Diagnostic::SessionClosed { fatal });
        }
    }

    fn require_authenticated(&self) -> Result<AccountId> {
        match (&self.state, &self.account_id) {
            (SessionState::Authenticated, Some(id)) => Ok(id.clone()),
            (SessionState::Closed, _) => Err(Error::SessionClosed),
            _ => Err(Error::NotAuthenticated),
        }
    }

    fn record(&self, event: TransactionEvent) -> Result<RecordedEvent> {
        self.record_for(self.account_id.as_ref(), event)
    }

    fn record_for(
        &self,
        account_id: Option<&AccountId>,
        event: TransactionEvent,
    ) -> Result<RecordedEvent> {
        self.sink.append(account_id, event)
    }

    /// Record a failure as an `Error` event and hand the error back
    ///
    /// The sink stamps the event with the last known balance; before any
    /// balance is known the event carries 0 and the balance stays unknown.
    fn reject(&self, account_id: Option<&AccountId>, err: Error) -> Error {
        // A closed sink already holds the final history
        let _ = self.record_for(account_id, TransactionEvent::error(err.detail(), 0));
        err
    }

    fn reject_own(&self, err: Error) -> Error {
        self.reject(self.account_id.as_ref(), err)
    }

    /// Like `reject`, for remote-call failures; a fatal error ends the session
    fn fail(&mut self, operation: &'static str, err: Error) -> Error {
        self.diagnose(Diagnostic::RemoteError {
            operation,
            error: err.to_string(),
        });
        let err = self.reject_own(err);
        if err.is_fatal() {
            self.teardown(true);
        }
        err
    }

    fn diagnose(&self, diagnostic: Diagnostic) {
        record_quietly(self.diagnostics.as_deref(), diagnostic);
    }
}

impl Drop for BankSession {
    fn drop(&mut self) {
        self.teardown(false);
    }
}
