//! Inbound push endpoint
//!
//! An axum server the client hosts so the bank can call back with
//! incoming-transfer notifications. It runs on a small tokio runtime owned
//! by the server and hands each push straight to the registered receiver,
//! so pushes reach the session on threads the session does not control.
//!
//! Routes are keyed by a random token handed to the bank at registration.
//! `POST /notify-transfer {"token","fromId","amount","newBalance"}` answers:
//! - 204 once the receiver took the push
//! - 400 for a malformed body or an amount the receiver refuses
//! - 404 for a token that is not (or no longer) registered
//! - 410 when the receiver's session has ended

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::AccountId;
use crate::ports::TransferCallback;

pub const NOTIFY_PATH: &str = "/notify-transfer";

const WORKER_THREADS: usize = 2;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotifyTransferRequest {
    token: Uuid,
    from_id: String,
    amount: i64,
    new_balance: i64,
}

struct Route {
    account_id: AccountId,
    receiver: Arc<dyn TransferCallback>,
}

#[derive(Clone, Default)]
struct RouteTable(Arc<Mutex<HashMap<Uuid, Route>>>);

impl RouteTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Route>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Cloned out so the receiver never runs with the table locked
    fn receiver(&self, token: &Uuid) -> Option<Arc<dyn TransferCallback>> {
        self.lock()
            .get(token)
            .map(|route| Arc::clone(&route.receiver))
    }
}

#[derive(Debug)]
struct PushRejection {
    status: StatusCode,
    message: String,
}

impl PushRejection {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<Error> for PushRejection {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::SessionClosed => StatusCode::GONE,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.detail())
    }
}

impl IntoResponse for PushRejection {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

// The body is read raw: banks are not required to send a JSON content type
async fn notify_transfer(
    State(routes): State<RouteTable>,
    body: Bytes,
) -> std::result::Result<StatusCode, PushRejection> {
    let notification: NotifyTransferRequest = serde_json::from_slice(&body).map_err(|e| {
        PushRejection::new(StatusCode::BAD_REQUEST, format!("Malformed notification: {}", e))
    })?;

    let receiver = routes
        .receiver(&notification.token)
        .ok_or_else(|| PushRejection::new(StatusCode::NOT_FOUND, "Unknown registration"))?;

    receiver.notify_transfer(
        &notification.from_id,
        notification.amount,
        notification.new_balance,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

fn router(routes: RouteTable) -> Router {
    Router::new()
        .route(NOTIFY_PATH, post(notify_transfer))
        .with_state(routes)
}

pub struct CallbackServer {
    local_addr: SocketAddr,
    advertised_host: String,
    routes: RouteTable,
    shutdown: Option<oneshot::Sender<()>>,
    runtime: Option<Runtime>,
}

impl CallbackServer {
    /// Bind to `bind` (e.g. `0.0.0.0:0`) and start serving pushes
    ///
    /// `advertised_host` is the address the bank should call; when absent,
    /// the bound address is used, with an unspecified address replaced by
    /// loopback. Must not be called from inside an async runtime.
    pub fn start(bind: &str, advertised_host: Option<&str>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(WORKER_THREADS)
            .thread_name("push-endpoint")
            .enable_all()
            .build()?;

        let listener = runtime
            .block_on(tokio::net::TcpListener::bind(bind))
            .map_err(|e| Error::connection(format!("Cannot bind push endpoint on {}: {}", bind, e)))?;
        let local_addr = listener.local_addr()?;

        let advertised_host = match advertised_host {
            Some(host) => host.to_string(),
            None if local_addr.ip().is_unspecified() => "127.0.0.1".to_string(),
            None => local_addr.ip().to_string(),
        };

        let routes = RouteTable::default();
        let app = router(routes.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        runtime.spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Ok(Self {
            local_addr,
            advertised_host,
            routes,
            shutdown: Some(shutdown_tx),
            runtime: Some(runtime),
        })
    }

    /// URL the bank must POST notifications to
    pub fn notify_url(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.advertised_host,
            self.local_addr.port(),
            NOTIFY_PATH
        )
    }

    /// Route pushes carrying the returned token to `receiver`
    ///
    /// Replaces any earlier route for the same account.
    pub fn register(&self, account_id: &AccountId, receiver: Arc<dyn TransferCallback>) -> Uuid {
        let token = Uuid::new_v4();
        let mut routes = self.routes.lock();
        routes.retain(|_, route| &route.account_id != account_id);
        routes.insert(
            token,
            Route {
                account_id: account_id.clone(),
                receiver,
            },
        );
        token
    }

    /// Drop the account's route; returns whether there was one
    pub fn unregister(&self, account_id: &AccountId) -> bool {
        let mut routes = self.routes.lock();
        let before = routes.len();
        routes.retain(|_, route| &route.account_id != account_id);
        routes.len() != before
    }

    /// Stop accepting connections and shut the runtime down; idempotent
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::domain::EventKind;
    use crate::services::{EventSink, PushNotificationReceiver};

    fn push(server: &CallbackServer, token: Uuid, amount: i64) -> u16 {
        let body = serde_json::json!({
            "token": token,
            "fromId": "1002",
            "amount": amount,
            "newBalance": 1_000_000 + amount,
        });
        reqwest::blocking::Client::new()
            .post(server.notify_url())
            .json(&body)
            .send()
            .unwrap()
            .status()
            .as_u16()
    }

    fn account() -> AccountId {
        AccountId::parse("1001").unwrap()
    }

    fn setup() -> (CallbackServer, Arc<EventSink>, Arc<PushNotificationReceiver>, Uuid) {
        let server = CallbackServer::start("127.0.0.1:0", None).unwrap();
        let sink = Arc::new(EventSink::new());
        let receiver = Arc::new(PushNotificationReceiver::new(account(), Arc::clone(&sink)));
        let token = server.register(&account(), receiver.clone());
        (server, sink, receiver, token)
    }

    #[test]
    fn test_push_reaches_receiver() {
        let (server, sink, _receiver, token) = setup();

        assert_eq!(push(&server, token, 20_000), 204);

        let last = sink.last().unwrap();
        assert_eq!(last.event.kind, EventKind::TransferIn);
        assert_eq!(last.event.balance_after, 1_020_000);
    }

    #[test]
    fn test_unknown_token_is_not_found() {
        let (server, sink, _receiver, _token) = setup();

        assert_eq!(push(&server, Uuid::new_v4(), 1), 404);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_malformed_body_is_bad_request() {
        let (server, sink, _receiver, _token) = setup();

        let response = reqwest::blocking::Client::new()
            .post(server.notify_url())
            .body(r#"{"fromId": "1002"}"#)
            .send()
            .unwrap();

        assert_eq!(response.status().as_u16(), 400);
        let body: serde_json::Value = response.json().unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("Malformed notification"));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_negative_amount_is_bad_request() {
        let (server, sink, _receiver, token) = setup();

        assert_eq!(push(&server, token, -5), 400);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_torn_down_receiver_is_gone() {
        let (server, sink, receiver, token) = setup();
        receiver.invalidate();

        assert_eq!(push(&server, token, 1), 410);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_reregistration_retires_old_token() {
        let (server, sink, _receiver, old_token) = setup();
        let replacement = Arc::new(PushNotificationReceiver::new(account(), Arc::clone(&sink)));
        let new_token = server.register(&account(), replacement);

        assert_eq!(push(&server, old_token, 1), 404);
        assert_eq!(push(&server, new_token, 1), 204);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_unregistered_account_is_not_found() {
        let (server, sink, _receiver, token) = setup();

        assert!(server.unregister(&account()));
        assert!(!server.unregister(&account()));
        assert_eq!(push(&server, token, 1), 404);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_wrong_method_and_path() {
        let (server, _sink, _receiver, _token) = setup();

        let get = reqwest::blocking::get(server.notify_url()).unwrap();
        assert_eq!(get.status().as_u16(), 405);

        let other = server.notify_url().replace(NOTIFY_PATH, "/elsewhere");
        let missing = reqwest::blocking::Client::new().post(other).send().unwrap();
        assert_eq!(missing.status().as_u16(), 404);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut server, _sink, _receiver, _token) = setup();
        server.stop();
        server.stop();
    }
}
