//! Session behavior against a scripted bank
//!
//! `ScriptedBank` records every call it receives and answers from a small
//! amount of state, so the tests can check which remote calls a session
//! issues (and which it must not), how failures surface as events, and how
//! pushes arriving in the middle of a call are ordered.

use std::sync::{Arc, Mutex};

use ebank_core::services::BankSession;
use ebank_core::services::session::{AMOUNT_NOT_POSITIVE, LOGIN_FAILED, SELF_TRANSFER};
use ebank_core::{AccountId, BankService, Error, EventKind, SessionState, TransferCallback};

type Hook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct ScriptedState {
    calls: Vec<String>,
    balance: i64,
    password: String,
    callback: Option<Arc<dyn TransferCallback>>,
    failures: Vec<(String, Error)>,
}

/// Fake bank with a single account
#[derive(Default)]
struct ScriptedBank {
    state: Mutex<ScriptedState>,
    /// Runs inside `withdraw`, before it returns
    during_withdraw: Mutex<Option<Hook>>,
}

impl ScriptedBank {
    fn new(balance: i64) -> Arc<Self> {
        let bank = Self::default();
        {
            let mut state = bank.state.lock().unwrap();
            state.balance = balance;
            state.password = "secret".to_string();
        }
        Arc::new(bank)
    }

    fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn called(&self, name: &str) -> bool {
        self.calls().iter().any(|c| c == name)
    }

    /// Make the next call to `call` fail with `err`
    fn fail_on(&self, call: &str, err: Error) {
        self.state.lock().unwrap().failures.push((call.to_string(), err));
    }

    fn callback(&self) -> Arc<dyn TransferCallback> {
        self.state.lock().unwrap().callback.clone().expect("no callback registered")
    }

    /// Credit the account and push the notification from another thread
    fn push_from(&self, from: &str, amount: i64) {
        let (callback, balance) = {
            let mut state = self.state.lock().unwrap();
            state.balance += amount;
            (state.callback.clone().expect("no callback registered"), state.balance)
        };
        let from = from.to_string();
        std::thread::spawn(move || callback.notify_transfer(&from, amount, balance))
            .join()
            .unwrap()
            .unwrap();
    }

    fn enter(&self, call: &str) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.to_string());
        match state.failures.iter().position(|(name, _)| name == call) {
            Some(index) => Err(state.failures.remove(index).1),
            None => Ok(()),
        }
    }
}

impl BankService for ScriptedBank {
    fn login(&self, _account_id: &AccountId, password: &str) -> Result<bool, Error> {
        self.enter("login")?;
        Ok(self.state.lock().unwrap().password == password)
    }

    fn get_balance(&self, _account_id: &AccountId) -> Result<i64, Error> {
        self.enter("get_balance")?;
        Ok(self.state.lock().unwrap().balance)
    }

    fn deposit(&self, _account_id: &AccountId, amount: i64) -> Result<(), Error> {
        self.enter("deposit")?;
        self.state.lock().unwrap().balance += amount;
        Ok(())
    }

    fn withdraw(&self, _account_id: &AccountId, amount: i64) -> Result<(), Error> {
        self.enter("withdraw")?;
        self.state.lock().unwrap().balance -= amount;
        if let Some(hook) = self.during_withdraw.lock().unwrap().as_ref() {
            hook();
        }
        Ok(())
    }

    fn transfer(&self, _from: &AccountId, _to: &AccountId, amount: i64) -> Result<(), Error> {
        self.enter("transfer")?;
        self.state.lock().unwrap().balance -= amount;
        Ok(())
    }

    fn register_callback(
        &self,
        _account_id: &AccountId,
        receiver: Arc<dyn TransferCallback>,
    ) -> Result<(), Error> {
        self.enter("register_callback")?;
        self.state.lock().unwrap().callback = Some(receiver);
        Ok(())
    }

    fn unregister_callback(&self, _account_id: &AccountId) -> Result<(), Error> {
        self.enter("unregister_callback")?;
        self.state.lock().unwrap().callback = None;
        Ok(())
    }
}

fn logged_in(balance: i64) -> (Arc<ScriptedBank>, BankSession) {
    let bank = ScriptedBank::new(balance);
    let mut session = BankSession::new(bank.clone());
    session.login("1001", "secret").unwrap();
    (bank, session)
}

#[test]
fn test_login_calls_in_order() {
    let (bank, session) = logged_in(1_000_000);

    assert_eq!(bank.calls(), vec!["login", "register_callback", "get_balance"]);
    assert_eq!(session.state(), SessionState::Authenticated);
    assert_eq!(session.current_balance(), Some(1_000_000));
}

#[test]
fn test_receiver_registered_only_after_successful_login() {
    let bank = ScriptedBank::new(100);
    let mut session = BankSession::new(bank.clone());

    let err = session.login("1001", "wrong").unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
    assert!(!bank.called("register_callback"));

    let history = session.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event.kind, EventKind::Error);
    assert_eq!(history[0].event.detail, LOGIN_FAILED);
    assert_eq!(history[0].event.balance_after, 0);
}

#[test]
fn test_blank_account_id_never_reaches_bank() {
    let bank = ScriptedBank::new(100);
    let mut session = BankSession::new(bank.clone());

    assert!(matches!(session.login("  ", "secret"), Err(Error::Validation(_))));
    assert!(bank.calls().is_empty());
    assert_eq!(session.history().len(), 1);
}

#[test]
fn test_rejected_transfers_never_call_bank() {
    let (bank, mut session) = logged_in(1_000);

    session.transfer("1002", 0).unwrap_err();
    session.transfer("1002", -5).unwrap_err();
    session.transfer("1001", 10).unwrap_err();
    session.transfer("", 10).unwrap_err();
    session.transfer("1002", 1_001).unwrap_err();

    assert!(!bank.called("transfer"));
    assert!(session.history().iter().skip(1).all(|r| r.event.is_error()));
}

#[test]
fn test_self_transfer_yields_exactly_one_error_event() {
    let (_bank, mut session) = logged_in(1_000);
    let before = session.history().len();

    let err = session.transfer("1001", 10).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let history = session.history();
    assert_eq!(history.len(), before + 1);
    assert_eq!(history.last().unwrap().event.detail, SELF_TRANSFER);
}

#[test]
fn test_non_positive_deposit_is_local() {
    let (bank, mut session) = logged_in(1_000);

    session.deposit(0).unwrap_err();
    assert!(!bank.called("deposit"));
    assert_eq!(session.sink().last().unwrap().event.detail, AMOUNT_NOT_POSITIVE);
}

#[test]
fn test_remote_error_keeps_session_open() {
    let (bank, mut session) = logged_in(1_000);
    bank.fail_on("withdraw", Error::remote("Daily limit reached"));

    let err = session.withdraw(10).unwrap_err();
    assert!(!err.is_fatal());

    let last = session.sink().last().unwrap();
    assert!(last.event.is_error());
    assert_eq!(last.event.detail, "Daily limit reached");
    assert_eq!(last.event.balance_after, 1_000);
    assert!(session.is_authenticated());

    session.deposit(5).unwrap();
}

#[test]
fn test_connection_error_tears_session_down() {
    let (bank, mut session) = logged_in(1_000);
    let receiver = bank.callback();
    bank.fail_on("deposit", Error::connection("connection reset"));

    let err = session.deposit(10).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(session.state(), SessionState::Closed);

    let last = session.sink().last().unwrap();
    assert_eq!(last.event.detail, "connection reset");

    // Late pushes are refused once the session is gone
    assert!(matches!(
        receiver.notify_transfer("1002", 1, 1_001),
        Err(Error::SessionClosed)
    ));
    assert!(matches!(session.query_balance(), Err(Error::SessionClosed)));
}

#[test]
fn test_failed_registration_aborts_login() {
    let bank = ScriptedBank::new(100);
    let mut session = BankSession::new(bank.clone());
    bank.fail_on("register_callback", Error::remote("callback refused"));

    let err = session.login("1001", "secret").unwrap_err();
    assert_eq!(err.detail(), "callback refused");
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!bank.called("get_balance"));
    assert!(session.history().iter().all(|r| r.event.is_error()));

    bank.state.lock().unwrap().calls.clear();
    session.login("1001", "secret").unwrap();
    assert_eq!(bank.calls(), vec!["login", "register_callback", "get_balance"]);
}

/// Deposit, push, withdraw (with a push arriving while the withdraw call is
/// still in flight) and a self-transfer, after login.
#[test]
fn test_event_stream_with_pushes_mid_call() {
    let (bank, mut session) = logged_in(1_000_000);

    session.deposit(50_000).unwrap();
    bank.push_from("1002", 20_000);

    let mid_call_bank = bank.clone();
    *bank.during_withdraw.lock().unwrap() = Some(Box::new(move || {
        mid_call_bank.push_from("1003", 5_000);
    }));
    session.withdraw(30_000).unwrap();
    *bank.during_withdraw.lock().unwrap() = None;

    session.transfer("1001", 10).unwrap_err();

    let kinds: Vec<EventKind> = session.history().iter().map(|r| r.event.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Login,
            EventKind::Deposit,
            EventKind::TransferIn,
            EventKind::TransferIn,
            EventKind::Withdraw,
            EventKind::Error,
        ]
    );

    let history = session.history();
    assert_eq!(history[1].event.balance_after, 1_050_000);
    assert_eq!(history[2].event.balance_after, 1_070_000);
    // The withdraw result reflects the credit that arrived during the call
    assert_eq!(history[4].event.balance_after, 1_045_000);
    assert_eq!(session.current_balance(), Some(1_045_000));
}

#[test]
fn test_logout_then_push_is_refused() {
    let (bank, mut session) = logged_in(1_000);
    let receiver = bank.callback();

    session.logout();
    assert!(receiver.notify_transfer("1002", 1, 1_001).is_err());
    assert_eq!(session.history().len(), 1);

    // History stays readable after teardown
    assert_eq!(session.history()[0].event.kind, EventKind::Login);
}

#[test]
fn test_transfer_rereads_balance_after_success() {
    let bank = ScriptedBank::new(500);
    let mut session = BankSession::new(bank.clone());
    session.login("1001", "secret").unwrap();

    bank.state.lock().unwrap().calls.clear();
    session.transfer("1002", 100).unwrap();

    assert_eq!(bank.calls(), vec!["transfer", "get_balance"]);
    let last = session.sink().last().unwrap();
    assert_eq!(last.event.kind, EventKind::TransferOut);
    assert_eq!(last.event.detail, "Transfer to 1002");
    assert_eq!(last.event.balance_after, 400);
}

#[test]
fn test_balance_failure_during_login_keeps_session() {
    let bank = ScriptedBank::new(500);
    let mut session = BankSession::new(bank.clone());
    bank.fail_on("get_balance", Error::remote("Balance service busy"));

    let err = session.login("1001", "secret").unwrap_err();
    assert!(!err.is_fatal());
    assert_eq!(session.state(), SessionState::Authenticated);
    assert_eq!(session.current_balance(), None);

    let last = session.sink().last().unwrap();
    assert!(last.event.is_error());
    assert_eq!(last.event.detail, "Balance service busy");
    assert_eq!(last.event.balance_after, 0);
}

#[test]
fn test_transfer_with_unknown_balance_queries_first() {
    let bank = ScriptedBank::new(500);
    let mut session = BankSession::new(bank.clone());
    bank.fail_on("get_balance", Error::remote("Balance service busy"));
    session.login("1001", "secret").unwrap_err();

    session.transfer("1002", 100).unwrap();

    assert_eq!(
        bank.calls(),
        vec![
            "login",
            "register_callback",
            "get_balance",
            "get_balance",
            "transfer",
            "get_balance",
        ]
    );
    let kinds: Vec<EventKind> = session.history().iter().map(|r| r.event.kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::Error, EventKind::BalanceQuery, EventKind::TransferOut]
    );
    assert_eq!(session.current_balance(), Some(400));
}

#[test]
fn test_unknown_balance_still_bounds_transfer() {
    let bank = ScriptedBank::new(50);
    let mut session = BankSession::new(bank.clone());
    bank.fail_on("get_balance", Error::remote("Balance service busy"));
    session.login("1001", "secret").unwrap_err();

    let err = session.transfer("1002", 100).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(!bank.called("transfer"));
    assert_eq!(session.sink().last().unwrap().event.balance_after, 50);
}

#[test]
fn test_error_event_does_not_block_next_transfer() {
    let (bank, mut session) = logged_in(1_000);
    bank.fail_on("withdraw", Error::remote("Daily limit reached"));
    session.withdraw(10).unwrap_err();

    assert_eq!(session.current_balance(), Some(1_000));
    session.transfer("1002", 600).unwrap();
    assert_eq!(session.current_balance(), Some(400));
}

#[test]
fn test_error_events_carry_zero_amount() {
    let (bank, mut session) = logged_in(1_000);
    bank.fail_on("deposit", Error::remote("Account frozen"));

    session.withdraw(-5).unwrap_err();
    session.deposit(300).unwrap_err();
    session.transfer("1002", 5_000).unwrap_err();

    let errors: Vec<_> = session.history().into_iter().skip(1).collect();
    assert_eq!(errors.len(), 3);
    for recorded in errors {
        assert_eq!(recorded.event.kind, EventKind::Error);
        assert_eq!(recorded.event.amount, 0);
        assert_eq!(recorded.event.balance_after, 1_000);
    }
}

#[test]
fn test_logout_releases_push_route() {
    let (bank, mut session) = logged_in(1_000);

    session.logout();
    session.logout();

    let calls = bank.calls();
    assert_eq!(calls.iter().filter(|c| *c == "unregister_callback").count(), 1);
    assert!(bank.state.lock().unwrap().callback.is_none());
}

#[test]
fn test_failed_release_still_closes_session() {
    let (bank, mut session) = logged_in(1_000);
    let receiver = bank.callback();
    bank.fail_on("unregister_callback", Error::connection("connection reset"));

    session.logout();

    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(
        receiver.notify_transfer("1002", 1, 1_001),
        Err(Error::SessionClosed)
    ));
}

#[test]
fn test_unauthenticated_teardown_skips_release() {
    let bank = ScriptedBank::new(100);
    let mut session = BankSession::new(bank.clone());
    session.login("1001", "wrong").unwrap_err();

    session.logout();
    assert!(!bank.called("unregister_callback"));
}

#[test]
fn test_second_login_is_refused_without_remote_calls() {
    let (bank, mut session) = logged_in(1_000);
    bank.state.lock().unwrap().calls.clear();

    let err = session.login("1001", "secret").unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(bank.calls().is_empty());
    assert_eq!(session.state(), SessionState::Authenticated);
}
