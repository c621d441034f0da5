//! Configuration management
//!
//! settings.json in the client directory:
//! ```json
//! {
//!   "app": { "demoMode": false },
//!   "remote": { "host": "127.0.0.1", "port": 8080, "callbackBind": "0.0.0.0:0" }
//! }
//! ```
//! Keys the client does not manage are preserved on save.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::result::Error;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CALLBACK_BIND: &str = "0.0.0.0:0";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(default)]
    remote: RemoteSettingsFile,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default)]
    demo_mode: bool,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteSettingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    callback_bind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    callback_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_timeout_secs: Option<u64>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Everything the HTTP adapter needs to reach the bank and be reached back
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub base_url: Url,
    pub callback_bind: String,
    pub callback_host: Option<String>,
    pub request_timeout: Option<Duration>,
}

/// Client configuration (resolved view of settings.json plus environment)
#[derive(Debug, Clone)]
pub struct Config {
    pub demo_mode: bool,
    pub host: String,
    pub port: u16,
    /// Full base URL; wins over host and port
    pub url: Option<String>,
    pub callback_bind: String,
    pub callback_host: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            demo_mode: false,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            url: None,
            callback_bind: DEFAULT_CALLBACK_BIND.to_string(),
            callback_host: None,
            request_timeout_secs: None,
        }
    }
}

fn parse_flag(value: Option<&str>) -> Option<bool> {
    match value {
        Some("true" | "1" | "yes" | "TRUE" | "YES") => Some(true),
        Some("false" | "0" | "no" | "FALSE" | "NO") => Some(false),
        _ => None,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Client directory: `$EBANK_DIR`, else `~/.ebank`
pub fn default_ebank_dir() -> PathBuf {
    if let Some(dir) = non_blank(std::env::var("EBANK_DIR").ok()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ebank")
}

fn read_settings(settings_path: &Path) -> Result<SettingsFile> {
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(settings_path)
        .with_context(|| format!("Failed to read {}", settings_path.display()))?;
    Ok(serde_json::from_str(&content).unwrap_or_default())
}

impl Config {
    /// Load config from the client directory
    ///
    /// Environment overrides (for CI and scripted runs):
    /// `EBANK_DEMO_MODE`, `EBANK_HOST`, `EBANK_URL`.
    pub fn load(ebank_dir: &Path) -> Result<Self> {
        let raw = read_settings(&ebank_dir.join("settings.json"))?;
        let defaults = Self::default();

        let demo_mode = parse_flag(std::env::var("EBANK_DEMO_MODE").ok().as_deref())
            .unwrap_or(raw.app.demo_mode);
        let host = non_blank(std::env::var("EBANK_HOST").ok())
            .or_else(|| non_blank(raw.remote.host))
            .unwrap_or(defaults.host);
        let url = non_blank(std::env::var("EBANK_URL").ok()).or_else(|| non_blank(raw.remote.url));

        Ok(Self {
            demo_mode,
            host,
            port: raw.remote.port.unwrap_or(defaults.port),
            url,
            callback_bind: non_blank(raw.remote.callback_bind).unwrap_or(defaults.callback_bind),
            callback_host: non_blank(raw.remote.callback_host),
            request_timeout_secs: raw.remote.request_timeout_secs.filter(|s| *s > 0),
        })
    }

    /// Save config to the client directory
    ///
    /// Only demo mode and the remote block are written; everything else in
    /// the file is kept as it was.
    pub fn save(&self, ebank_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(ebank_dir)
            .with_context(|| format!("Failed to create {}", ebank_dir.display()))?;
        let settings_path = ebank_dir.join("settings.json");
        let mut settings = read_settings(&settings_path)?;

        settings.app.demo_mode = self.demo_mode;
        settings.remote.host = Some(self.host.clone());
        settings.remote.port = Some(self.port);
        settings.remote.url = self.url.clone();
        settings.remote.callback_bind = Some(self.callback_bind.clone());
        settings.remote.callback_host = self.callback_host.clone();
        settings.remote.request_timeout_secs = self.request_timeout_secs;

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)
            .with_context(|| format!("Failed to write {}", settings_path.display()))?;
        Ok(())
    }

    pub fn enable_demo_mode(&mut self) {
        self.demo_mode = true;
    }

    pub fn disable_demo_mode(&mut self) {
        self.demo_mode = false;
    }

    /// Base URL of the remote bank
    pub fn endpoint(&self) -> crate::domain::result::Result<Url> {
        let raw = match &self.url {
            Some(url) => url.clone(),
            None => format!("http://{}:{}/", self.host, self.port),
        };
        let mut url = Url::parse(&raw)
            .map_err(|e| Error::Config(format!("Invalid remote endpoint '{}': {}", raw, e)))?;
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(Error::Config(format!("Invalid remote endpoint '{}'", raw)));
        }
        // Relative joins would otherwise replace the last path segment
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    pub fn remote_settings(&self) -> crate::domain::result::Result<RemoteSettings> {
        Ok(RemoteSettings {
            base_url: self.endpoint()?,
            callback_bind: self.callback_bind.clone(),
            callback_host: self.callback_host.clone(),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
        })
    }

    /// Directory holding the per-account CSV transaction logs
    pub fn transaction_log_dir(&self, ebank_dir: &Path) -> PathBuf {
        if self.demo_mode {
            ebank_dir.join("demo_logs")
        } else {
            ebank_dir.join("client_logs")
        }
    }
}
