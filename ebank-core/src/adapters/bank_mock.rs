//! Mock bank server for testing
//!
//! Serves the bank's HTTP contract with axum, backed by an `InMemoryBank`,
//! so the HTTP client and the push endpoint can be tested end to end
//! without a real bank:
//! - GET  /health
//! - POST /login, /transfers
//! - GET  /accounts/{id}/balance
//! - POST /accounts/{id}/deposit|withdraw|callback
//!
//! Registered callbacks are wrapped in a client that POSTs to the
//! advertised notify URL, the way a real bank would call back. Bank calls
//! run on the blocking pool since a push may go out inline.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

use super::demo::InMemoryBank;
use crate::domain::result::{Error, Result};
use crate::domain::AccountId;
use crate::ports::{BankService, TransferCallback};

/// Mock bank server for testing
pub struct MockBankServer {
    port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    runtime: Option<Runtime>,
}

/// Failure injection
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Answer 503 to /health
    pub fail_health: bool,
    /// Answer 500 to callback registration
    pub reject_callbacks: bool,
    /// Delay in milliseconds before responding
    pub delay_ms: u64,
}

#[derive(Clone)]
struct MockState {
    bank: Arc<InMemoryBank>,
    config: MockConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginBody {
    account_id: String,
    password: String,
}

#[derive(Deserialize)]
struct AmountBody {
    amount: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferBody {
    from_id: String,
    to_id: String,
    amount: i64,
}

#[derive(Deserialize)]
struct CallbackBody {
    url: String,
    token: String,
}

/// Server-side stub of a client's push endpoint
struct HttpPushClient {
    client: reqwest::blocking::Client,
    url: String,
    token: String,
}

impl TransferCallback for HttpPushClient {
    fn notify_transfer(&self, from_id: &str, amount: i64, new_balance: i64) -> Result<()> {
        let body = json!({
            "token": self.token,
            "fromId": from_id,
            "amount": amount,
            "newBalance": new_balance,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .map_err(|e| Error::connection(e.to_string()))?;
        match response.status().as_u16() {
            410 => Err(Error::SessionClosed),
            s if (200..300).contains(&s) => Ok(()),
            s => Err(Error::remote(format!("Push rejected with {}", s))),
        }
    }
}

struct MockError {
    status: StatusCode,
    message: String,
}

impl MockError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(e: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::BAD_REQUEST, e.to_string())
    }
}

impl From<Error> for MockError {
    fn from(e: Error) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, e.detail())
    }
}

impl IntoResponse for MockError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type MockResult = std::result::Result<Json<Value>, MockError>;

impl MockState {
    /// Run a bank call off the async workers, after the configured delay
    async fn call<F>(&self, f: F) -> MockResult
    where
        F: FnOnce(&InMemoryBank) -> std::result::Result<Value, MockError> + Send + 'static,
    {
        if self.config.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
        }
        let bank = Arc::clone(&self.bank);
        tokio::task::spawn_blocking(move || f(&bank))
            .await
            .map_err(|e| MockError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
            .map(Json)
    }
}

fn account(raw: &str) -> std::result::Result<AccountId, MockError> {
    AccountId::parse(raw).map_err(MockError::bad_request)
}

async fn health(State(state): State<MockState>) -> MockResult {
    if state.config.fail_health {
        return Err(MockError::new(StatusCode::SERVICE_UNAVAILABLE, "Maintenance"));
    }
    Ok(Json(json!({ "status": "ok" })))
}

async fn login(State(state): State<MockState>, Json(body): Json<LoginBody>) -> MockResult {
    state
        .call(move |bank| {
            let id = account(&body.account_id)?;
            let success = bank.login(&id, &body.password)?;
            Ok(json!({ "success": success }))
        })
        .await
}

async fn transfer(State(state): State<MockState>, Json(body): Json<TransferBody>) -> MockResult {
    state
        .call(move |bank| {
            bank.transfer(&account(&body.from_id)?, &account(&body.to_id)?, body.amount)?;
            Ok(json!({}))
        })
        .await
}

async fn balance(State(state): State<MockState>, Path(id): Path<String>) -> MockResult {
    state
        .call(move |bank| {
            let balance = bank.get_balance(&account(&id)?)?;
            Ok(json!({ "balance": balance }))
        })
        .await
}

async fn deposit(
    State(state): State<MockState>,
    Path(id): Path<String>,
    Json(body): Json<AmountBody>,
) -> MockResult {
    state
        .call(move |bank| {
            bank.deposit(&account(&id)?, body.amount)?;
            Ok(json!({}))
        })
        .await
}

async fn withdraw(
    State(state): State<MockState>,
    Path(id): Path<String>,
    Json(body): Json<AmountBody>,
) -> MockResult {
    state
        .call(move |bank| {
            bank.withdraw(&account(&id)?, body.amount)?;
            Ok(json!({}))
        })
        .await
}

async fn register_callback(
    State(state): State<MockState>,
    Path(id): Path<String>,
    Json(body): Json<CallbackBody>,
) -> MockResult {
    if state.config.reject_callbacks {
        return Err(MockError::new(StatusCode::INTERNAL_SERVER_ERROR, ""));
    }
    // The blocking client must be built outside the async workers
    state
        .call(move |bank| {
            let push = HttpPushClient {
                client: reqwest::blocking::Client::new(),
                url: body.url,
                token: body.token,
            };
            bank.register_callback(&account(&id)?, Arc::new(push))?;
            Ok(json!({}))
        })
        .await
}

fn router(state: MockState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/transfers", post(transfer))
        .route("/accounts/:id/balance", get(balance))
        .route("/accounts/:id/deposit", post(deposit))
        .route("/accounts/:id/withdraw", post(withdraw))
        .route("/accounts/:id/callback", post(register_callback))
        .with_state(state)
}

impl MockBankServer {
    /// Start on a random port
    pub fn start(bank: Arc<InMemoryBank>) -> std::io::Result<Self> {
        Self::start_with(bank, MockConfig::default())
    }

    pub fn start_with(bank: Arc<InMemoryBank>, config: MockConfig) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("mock-bank")
            .enable_all()
            .build()?;
        let listener = runtime.block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))?;
        let port = listener.local_addr()?.port();

        let app = router(MockState { bank, config });
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        runtime.spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Ok(Self {
            port,
            shutdown: Some(shutdown_tx),
            runtime: Some(runtime),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(2));
        }
    }
}

impl Drop for MockBankServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::demo::DeliveryMode;
    use crate::adapters::http::HttpBankService;
    use crate::config::{Config, RemoteSettings};
    use crate::domain::EventKind;
    use crate::services::BankSession;

    fn settings(server: &MockBankServer) -> RemoteSettings {
        Config {
            url: Some(server.base_url()),
            callback_bind: "127.0.0.1:0".to_string(),
            ..Config::default()
        }
        .remote_settings()
        .unwrap()
    }

    fn id(raw: &str) -> AccountId {
        AccountId::parse(raw).unwrap()
    }

    #[test]
    fn test_connect_checks_health() {
        let bank = Arc::new(InMemoryBank::with_demo_accounts());
        let server = MockBankServer::start(bank).unwrap();
        assert!(HttpBankService::connect(settings(&server)).is_ok());
    }

    #[test]
    fn test_failed_health_check_is_remote_error() {
        let bank = Arc::new(InMemoryBank::with_demo_accounts());
        let config = MockConfig {
            fail_health: true,
            ..Default::default()
        };
        let server = MockBankServer::start_with(bank, config).unwrap();

        let err = HttpBankService::connect(settings(&server)).err().unwrap();
        assert_eq!(err.detail(), "Maintenance");
    }

    #[test]
    fn test_remote_rejection_carries_bank_message() {
        let bank = Arc::new(InMemoryBank::with_demo_accounts());
        let server = MockBankServer::start(bank).unwrap();
        let remote = HttpBankService::connect(settings(&server)).unwrap();

        assert!(remote.login(&id("1003"), "123456").unwrap());
        let err = remote.withdraw(&id("1003"), 9_999_999).unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
        assert_eq!(err.detail(), "Insufficient funds");
    }

    #[test]
    fn test_wrong_password_returns_false() {
        let bank = Arc::new(InMemoryBank::with_demo_accounts());
        let server = MockBankServer::start(bank).unwrap();
        let remote = HttpBankService::connect(settings(&server)).unwrap();

        assert!(!remote.login(&id("1001"), "nope").unwrap());
    }

    #[test]
    fn test_session_receives_push_over_http() {
        let bank = Arc::new(InMemoryBank::with_demo_accounts());
        let server = MockBankServer::start(bank.clone()).unwrap();
        let remote = Arc::new(HttpBankService::connect(settings(&server)).unwrap());

        let mut session = BankSession::new(remote.clone());
        session.login("1001", "123456").unwrap();
        assert!(remote.callback_url().is_some());

        bank.simulate_incoming("1002", "1001", 20_000).unwrap();
        bank.wait_for_deliveries();

        let last = session.sink().last().unwrap();
        assert_eq!(last.event.kind, EventKind::TransferIn);
        assert_eq!(last.event.detail, "Received from 1002");
        assert_eq!(session.current_balance(), Some(1_020_000));
    }

    #[test]
    fn test_push_after_logout_is_not_recorded() {
        let bank = Arc::new(InMemoryBank::with_demo_accounts().with_delivery(DeliveryMode::Inline));
        let server = MockBankServer::start(bank.clone()).unwrap();
        let remote = Arc::new(HttpBankService::connect(settings(&server)).unwrap());

        let mut session = BankSession::new(remote);
        session.login("1001", "123456").unwrap();
        session.logout();

        bank.simulate_incoming("1002", "1001", 1).unwrap();
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_slow_bank_times_out_as_connection_error() {
        let bank = Arc::new(InMemoryBank::with_demo_accounts());
        let config = MockConfig {
            delay_ms: 500,
            ..Default::default()
        };
        let server = MockBankServer::start_with(bank, config).unwrap();
        let mut settings = settings(&server);
        settings.request_timeout = Some(std::time::Duration::from_millis(100));

        let err = HttpBankService::connect(settings).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_rejected_registration_aborts_login() {
        let bank = Arc::new(InMemoryBank::with_demo_accounts());
        let config = MockConfig {
            reject_callbacks: true,
            ..Default::default()
        };
        let server = MockBankServer::start_with(bank, config).unwrap();
        let remote = Arc::new(HttpBankService::connect(settings(&server)).unwrap());

        let mut session = BankSession::new(remote);
        let err = session.login("1001", "123456").unwrap_err();
        assert_eq!(err.detail(), "500 Internal Server Error");
        assert!(!session.is_authenticated());
    }
}
