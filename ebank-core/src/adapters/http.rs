//! HTTP bank client
//!
//! Implements `BankService` as JSON over HTTP with blocking reqwest. Every
//! call blocks the calling thread until the bank answers; without a
//! configured timeout a stalled bank stalls the caller.
//!
//! Error mapping:
//! - transport failure (refused, reset, timed out) → `Error::Connection`
//! - non-2xx → `Error::Remote` with the body's `error` field, or the status text
//! - undecodable success body → `Error::Remote`

use std::sync::{Arc, Mutex};

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use super::callback_server::CallbackServer;
use crate::config::RemoteSettings;
use crate::domain::result::{Error, Result};
use crate::domain::AccountId;
use crate::ports::{BankService, TransferCallback};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    account_id: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    success: bool,
}

#[derive(Deserialize)]
struct BalanceResponse {
    balance: i64,
}

#[derive(Serialize)]
struct AmountRequest {
    amount: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequest<'a> {
    from_id: &'a str,
    to_id: &'a str,
    amount: i64,
}

#[derive(Serialize)]
struct CallbackRequest<'a> {
    url: &'a str,
    token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct HttpBankService {
    client: Client,
    base_url: Url,
    callback_bind: String,
    callback_host: Option<String>,
    callbacks: Mutex<Option<CallbackServer>>,
}

impl HttpBankService {
    /// Build a client without contacting the bank
    pub fn new(settings: RemoteSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.base_url,
            callback_bind: settings.callback_bind,
            callback_host: settings.callback_host,
            callbacks: Mutex::new(None),
        })
    }

    /// Build a client and check the bank is reachable; an unreachable bank is a
    /// `Connection` error here rather than at first use
    pub fn connect(settings: RemoteSettings) -> Result<Self> {
        let service = Self::new(settings)?;
        service.health_check()?;
        Ok(service)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn health_check(&self) -> Result<()> {
        self.send(self.client.get(self.url("health")?))?;
        Ok(())
    }

    /// Address the push endpoint advertises, once it has been started
    pub fn callback_url(&self) -> Option<String> {
        self.callbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(CallbackServer::notify_url)
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid request path '{}': {}", path, e)))
    }

    fn account_url(&self, account_id: &AccountId, action: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Invalid remote endpoint '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(["accounts", account_id.as_str(), action]);
        Ok(url)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().map_err(transport_error)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(remote_error(response))
        }
    }

    fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        self.send(request)?
            .json()
            .map_err(|e| Error::remote(format!("Invalid response from bank: {}", e)))
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::connection(format!("Request timed out: {}", e))
    } else {
        Error::connection(e.to_string())
    }
}

fn remote_error(response: Response) -> Error {
    let status = response.status();
    let fallback = format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error")
    );
    match response.json::<ErrorBody>() {
        Ok(body) if !body.error.trim().is_empty() => Error::Remote(body.error),
        _ => Error::Remote(fallback),
    }
}

impl BankService for HttpBankService {
    fn login(&self, account_id: &AccountId, password: &str) -> Result<bool> {
        let body = LoginRequest {
            account_id: account_id.as_str(),
            password,
        };
        let response: LoginResponse = self.send_json(self.client.post(self.url("login")?).json(&body))?;
        Ok(response.success)
    }

    fn get_balance(&self, account_id: &AccountId) -> Result<i64> {
        let url = self.account_url(account_id, "balance")?;
        let response: BalanceResponse = self.send_json(self.client.get(url))?;
        Ok(response.balance)
    }

    fn deposit(&self, account_id: &AccountId, amount: i64) -> Result<()> {
        let url = self.account_url(account_id, "deposit")?;
        self.send(self.client.post(url).json(&AmountRequest { amount }))?;
        Ok(())
    }

    fn withdraw(&self, account_id: &AccountId, amount: i64) -> Result<()> {
        let url = self.account_url(account_id, "withdraw")?;
        self.send(self.client.post(url).json(&AmountRequest { amount }))?;
        Ok(())
    }

    fn transfer(&self, from_id: &AccountId, to_id: &AccountId, amount: i64) -> Result<()> {
        let body = TransferRequest {
            from_id: from_id.as_str(),
            to_id: to_id.as_str(),
            amount,
        };
        self.send(self.client.post(self.url("transfers")?).json(&body))?;
        Ok(())
    }

    /// Starts the push endpoint on first use, routes a fresh token to
    /// `receiver` and hands the token and URL to the bank
    fn register_callback(
        &self,
        account_id: &AccountId,
        receiver: Arc<dyn TransferCallback>,
    ) -> Result<()> {
        let mut guard = self
            .callbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.is_none() {
            *guard = Some(CallbackServer::start(
                &self.callback_bind,
                self.callback_host.as_deref(),
            )?);
        }
        let server = guard
            .as_ref()
            .ok_or_else(|| Error::Other("Push endpoint unavailable".to_string()))?;

        let token = server.register(account_id, receiver);
        let notify_url = server.notify_url();
        let body = CallbackRequest {
            url: &notify_url,
            token: token.to_string(),
        };
        let url = self.account_url(account_id, "callback")?;
        if let Err(e) = self.send(self.client.post(url).json(&body)) {
            server.unregister(account_id);
            return Err(e);
        }
        Ok(())
    }

    /// Drops the local route only; the bank's next push for the account
    /// gets a 404 from the endpoint
    fn unregister_callback(&self, account_id: &AccountId) -> Result<()> {
        let guard = self
            .callbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(server) = guard.as_ref() {
            server.unregister(account_id);
        }
        Ok(())
    }
}
