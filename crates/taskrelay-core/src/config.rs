//! TaskRelay configuration system.
//!
//! Sources, lowest to highest precedence: built-in defaults, a TOML file,
//! then environment variables (a `.env` file is loaded into the environment first).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RelayError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub twilio: Option<TwilioConfig>,
    #[serde(default)]
    pub whatsapp_gateway: Option<WhatsAppGatewayConfig>,
    #[serde(default)]
    pub microsoft: Option<MicrosoftConfig>,
    #[serde(default)]
    pub google: Option<GoogleConfig>,
}

impl RelayConfig {
    /// Load config: `.env`, then `path` (or the default path if it exists), then env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::load_from(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load config from a specific TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("Failed to read config {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {e}")))
    }

    /// Default config path (~/.taskrelay/config.toml).
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// TaskRelay home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".taskrelay")
    }

    /// Overlay environment variables. `get` is injected so tests don't touch the process env.
    pub fn apply_env<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(host) = var("TASKRELAY_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("TASKRELAY_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(secs) = var("TASKRELAY_POLL_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.worker.poll_interval_secs = secs;
        }
        if let Some(n) = var("TASKRELAY_BATCH_SIZE").and_then(|v| v.parse().ok()) {
            self.worker.batch_size = n;
        }

        if let Some(sid) = var("TWILIO_ACCOUNT_SID") {
            self.twilio.get_or_insert_with(TwilioConfig::default).account_sid = sid;
        }
        if let Some(token) = var("TWILIO_AUTH_TOKEN") {
            self.twilio.get_or_insert_with(TwilioConfig::default).auth_token = token;
        }
        if let Some(number) = var("TWILIO_PHONE_NUMBER") {
            self.twilio.get_or_insert_with(TwilioConfig::default).phone_number = number;
        }

        if let Some(url) = var("WHATSAPP_GATEWAY_URL") {
            self.whatsapp_gateway.get_or_insert_with(WhatsAppGatewayConfig::default).url = url;
        }
        if let Some(instance) = var("WHATSAPP_GATEWAY_INSTANCE") {
            self.whatsapp_gateway.get_or_insert_with(WhatsAppGatewayConfig::default).instance = instance;
        }
        if let Some(key) = var("WHATSAPP_GATEWAY_API_KEY") {
            self.whatsapp_gateway.get_or_insert_with(WhatsAppGatewayConfig::default).api_key = key;
        }

        if let Some(tenant) = var("OUTLOOK_TENANT_ID") {
            self.microsoft.get_or_insert_with(MicrosoftConfig::default).tenant_id = tenant;
        }
        if let Some(client) = var("OUTLOOK_CLIENT_ID") {
            self.microsoft.get_or_insert_with(MicrosoftConfig::default).client_id = client;
        }
        if let Some(secret) = var("OUTLOOK_CLIENT_SECRET") {
            self.microsoft.get_or_insert_with(MicrosoftConfig::default).client_secret = secret;
        }
        if let Some(sender) = var("OUTLOOK_SENDER_EMAIL") {
            self.microsoft.get_or_insert_with(MicrosoftConfig::default).sender_email = sender;
        }

        if let Some(path) = var("GOOGLE_CREDENTIALS_JSON") {
            self.google.get_or_insert_with(GoogleConfig::default).credentials_path = path;
        }
    }

    /// Config as JSON with every secret masked, for startup logs.
    pub fn redacted(&self) -> serde_json::Value {
        serde_json::json!({
            "server": { "host": self.server.host, "port": self.server.port },
            "database": { "url": self.database.url },
            "worker": {
                "poll_interval_secs": self.worker.poll_interval_secs,
                "batch_size": self.worker.batch_size,
            },
            "twilio": self.twilio.as_ref().map(|t| serde_json::json!({
                "account_sid": t.account_sid,
                "auth_token": mask_secret(&t.auth_token),
                "phone_number": t.phone_number,
            })),
            "whatsapp_gateway": self.whatsapp_gateway.as_ref().map(|w| serde_json::json!({
                "url": w.url,
                "instance": w.instance,
                "api_key": mask_secret(&w.api_key),
            })),
            "microsoft": self.microsoft.as_ref().map(|m| serde_json::json!({
                "tenant_id": m.tenant_id,
                "client_id": m.client_id,
                "client_secret": mask_secret(&m.client_secret),
                "sender_email": m.sender_email,
            })),
            "google": self.google.as_ref().map(|g| serde_json::json!({
                "credentials_path": g.credentials_path,
                "calendar_id": g.calendar_id,
            })),
        })
    }
}

/// Mask all but the last four characters.
pub fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 4 {
        return "•".repeat(count);
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("••••{tail}")
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String { "0.0.0.0".into() }
fn default_port() -> u16 { 8000 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

/// Task store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `sqlite://path`, `sqlite:path`, a bare path, or `:memory:`.
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String { "sqlite://~/.taskrelay/tasks.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: default_database_url() }
    }
}

impl DatabaseConfig {
    /// Resolve the URL to a SQLite path, expanding `~`.
    pub fn sqlite_path(&self) -> Result<PathBuf> {
        let url = self.url.trim();
        if url == ":memory:" {
            return Ok(PathBuf::from(url));
        }
        let raw = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        if raw.contains("://") {
            return Err(RelayError::Config(format!(
                "unsupported database url '{url}' (expected a SQLite path)"
            )));
        }
        if raw.is_empty() {
            return Err(RelayError::Config("database url is empty".into()));
        }
        Ok(PathBuf::from(shellexpand::tilde(raw).to_string()))
    }
}

/// Dispatch worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Max due tasks dispatched per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Submissions due within this window are logged as "immediate".
    #[serde(default = "default_immediate_threshold")]
    pub immediate_threshold_secs: i64,
}

fn default_poll_interval() -> u64 { 60 }
fn default_batch_size() -> u32 { 100 }
fn default_immediate_threshold() -> i64 { 65 }

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            immediate_threshold_secs: default_immediate_threshold(),
        }
    }
}

/// Outbound HTTP settings shared by every adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_http_timeout() -> u64 { 30 }

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: default_http_timeout() }
    }
}

/// Twilio carrier API (SMS, voice, WhatsApp).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    /// Sender number in E.164.
    #[serde(default)]
    pub phone_number: String,
    /// `language` attribute for the `<Say>` verb on voice calls.
    #[serde(default = "default_voice_language")]
    pub voice_language: String,
    #[serde(default = "default_twilio_base")]
    pub api_base: String,
}

fn default_voice_language() -> String { "es-MX".into() }
fn default_twilio_base() -> String { "https://api.twilio.com".into() }

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            phone_number: String::new(),
            voice_language: default_voice_language(),
            api_base: default_twilio_base(),
        }
    }
}

impl TwilioConfig {
    pub fn is_complete(&self) -> bool {
        !self.account_sid.is_empty() && !self.auth_token.is_empty() && !self.phone_number.is_empty()
    }
}

/// Self-hosted WhatsApp gateway (Evolution-style REST API).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhatsAppGatewayConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub instance: String,
    #[serde(default)]
    pub api_key: String,
}

impl WhatsAppGatewayConfig {
    pub fn is_complete(&self) -> bool {
        !self.url.is_empty() && !self.instance.is_empty() && !self.api_key.is_empty()
    }
}

/// Microsoft Graph app registration (mail + Outlook calendar).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicrosoftConfig {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Mailbox that sends mail and owns the calendar.
    #[serde(default)]
    pub sender_email: String,
    /// Zone Graph renders event times in (`Prefer: outlook.timezone`).
    #[serde(default = "default_outlook_timezone")]
    pub timezone: String,
    #[serde(default = "default_graph_base")]
    pub graph_base: String,
    #[serde(default = "default_login_base")]
    pub login_base: String,
}

fn default_outlook_timezone() -> String { "America/Mexico_City".into() }
fn default_graph_base() -> String { "https://graph.microsoft.com/v1.0".into() }
fn default_login_base() -> String { "https://login.microsoftonline.com".into() }

impl Default for MicrosoftConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            sender_email: String::new(),
            timezone: default_outlook_timezone(),
            graph_base: default_graph_base(),
            login_base: default_login_base(),
        }
    }
}

impl MicrosoftConfig {
    pub fn is_complete(&self) -> bool {
        !self.tenant_id.is_empty()
            && !self.client_id.is_empty()
            && !self.client_secret.is_empty()
            && !self.sender_email.is_empty()
    }
}

/// Google Calendar via a service account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// Path to the service-account JSON key.
    #[serde(default)]
    pub credentials_path: String,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    #[serde(default = "default_google_timezone")]
    pub timezone: String,
    #[serde(default = "default_google_base")]
    pub api_base: String,
}

fn default_calendar_id() -> String { "primary".into() }
fn default_google_timezone() -> String { "UTC".into() }
fn default_google_base() -> String { "https://www.googleapis.com/calendar/v3".into() }

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            credentials_path: String::new(),
            calendar_id: default_calendar_id(),
            timezone: default_google_timezone(),
            api_base: default_google_base(),
        }
    }
}

impl GoogleConfig {
    pub fn credentials_file(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.credentials_path).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.worker.poll_interval_secs, 60);
        assert_eq!(config.worker.batch_size, 100);
        assert_eq!(config.worker.immediate_threshold_secs, 65);
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.twilio.is_none());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [server]
            port = 9090

            [worker]
            poll_interval_secs = 15
            batch_size = 20

            [twilio]
            account_sid = "AC123"
            auth_token = "secret-token"
            phone_number = "+15550001111"

            [microsoft]
            tenant_id = "t"
            client_id = "c"
            client_secret = "s"
            sender_email = "bot@corp.com"
        "#;
        let config: RelayConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.worker.batch_size, 20);
        let twilio = config.twilio.unwrap();
        assert!(twilio.is_complete());
        assert_eq!(twilio.voice_language, "es-MX");
        let ms = config.microsoft.unwrap();
        assert!(ms.is_complete());
        assert_eq!(ms.graph_base, "https://graph.microsoft.com/v1.0");
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: RelayConfig = toml::from_str("").unwrap();
        assert_eq!(config.database.url, "sqlite://~/.taskrelay/tasks.db");
        assert!(config.google.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("DATABASE_URL", "sqlite:///tmp/relay.db"),
            ("TWILIO_ACCOUNT_SID", "AC999"),
            ("TWILIO_AUTH_TOKEN", "tok"),
            ("TWILIO_PHONE_NUMBER", "+15551112222"),
            ("WHATSAPP_GATEWAY_URL", "http://evo:8080"),
            ("TASKRELAY_POLL_INTERVAL_SECS", "5"),
            ("OUTLOOK_SENDER_EMAIL", ""),
        ]);
        let mut config = RelayConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.database.url, "sqlite:///tmp/relay.db");
        assert_eq!(config.worker.poll_interval_secs, 5);
        assert!(config.twilio.as_ref().unwrap().is_complete());
        let gw = config.whatsapp_gateway.unwrap();
        assert_eq!(gw.url, "http://evo:8080");
        assert!(!gw.is_complete());
        // Blank values never create a section.
        assert!(config.microsoft.is_none());
    }

    #[test]
    fn test_sqlite_path_forms() {
        let db = |url: &str| DatabaseConfig { url: url.into() };
        assert_eq!(db("sqlite:///var/lib/relay.db").sqlite_path().unwrap(), PathBuf::from("/var/lib/relay.db"));
        assert_eq!(db("sqlite:relay.db").sqlite_path().unwrap(), PathBuf::from("relay.db"));
        assert_eq!(db("relay.db").sqlite_path().unwrap(), PathBuf::from("relay.db"));
        assert_eq!(db(":memory:").sqlite_path().unwrap(), PathBuf::from(":memory:"));
        assert!(db("postgresql://u@h/db").sqlite_path().is_err());
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let mut config = RelayConfig::default();
        config.twilio = Some(TwilioConfig {
            auth_token: "supersecret1234".into(),
            ..Default::default()
        });
        let v = config.redacted();
        assert_eq!(v["twilio"]["auth_token"], "••••1234");
        assert!(!v.to_string().contains("supersecret"));
    }

    #[test]
    fn test_home_dir() {
        assert!(RelayConfig::home_dir().to_string_lossy().contains("taskrelay"));
    }
}
