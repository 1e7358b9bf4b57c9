// MIT License - Copyright (c) 2026 Peter Wright
// Bridge configuration and its TOML persistence

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::secret::PasswordCipher;

/// Base URL of the Sector Alarm cloud API.
pub const DEFAULT_API_URL: &str = "https://mypagesapi.sectoralarm.net";

/// Full bridge configuration.
///
/// The core reads this every tick and writes back only the `cloud.token`
/// field after a successful authentication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub cloud: CloudSettings,
    #[serde(default)]
    pub mqtt: MqttSettings,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudSettings {
    #[serde(default)]
    pub email: String,
    /// Clear text in memory, sealed with [`PasswordCipher`] on disk.
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub panel_id: String,
    /// Code used for arm/disarm commands.
    #[serde(default)]
    pub panel_code: String,
    /// Last bearer token obtained from the API.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_poll_interval() -> u64 {
    60
}
fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

// Credentials, panel code and token are never printed; only whether set.
impl std::fmt::Debug for CloudSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudSettings")
            .field("email", &self.email)
            .field("has_password", &!self.password.is_empty())
            .field("panel_id", &self.panel_id)
            .field("has_panel_code", &!self.panel_code.is_empty())
            .field("has_token", &!self.token.is_empty())
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: String::new(),
            panel_id: String::new(),
            panel_code: String::new(),
            token: String::new(),
            poll_interval_secs: default_poll_interval(),
            api_url: default_api_url(),
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttSettings {
    #[serde(default = "default_broker")]
    pub broker: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

// Broker defaults can be injected by the container environment; values in
// the config file still win.
fn default_broker() -> String {
    std::env::var("MQTT_BROKER").unwrap_or_else(|_| "192.168.0.100".to_string())
}
fn default_port() -> u16 {
    std::env::var("MQTT_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(1883)
}
fn default_client_id() -> String {
    "sector2mqtt".to_string()
}
fn default_prefix() -> String {
    "sector".to_string()
}
fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}
fn default_keep_alive() -> u64 {
    30
}

impl std::fmt::Debug for MqttSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttSettings")
            .field("broker", &self.broker)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("has_password", &self.password.as_deref().is_some_and(|p| !p.is_empty()))
            .field("client_id", &self.client_id)
            .field("prefix", &self.prefix)
            .field("discovery_prefix", &self.discovery_prefix)
            .field("keep_alive_secs", &self.keep_alive_secs)
            .finish()
    }
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker: default_broker(),
            port: default_port(),
            username: None,
            password: None,
            client_id: default_client_id(),
            prefix: default_prefix(),
            discovery_prefix: default_discovery_prefix(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

impl BridgeConfig {
    /// Whether enough is configured to talk to the cloud API at all.
    pub fn is_complete(&self) -> bool {
        !self.cloud.email.trim().is_empty() && !self.cloud.panel_id.trim().is_empty()
    }

    /// Poll period while connected. Never shorter than ten seconds.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.cloud.poll_interval_secs.max(10))
    }

    /// Stored token, if any.
    pub fn token(&self) -> Option<&str> {
        Some(self.cloud.token.as_str()).filter(|t| !t.is_empty())
    }

    /// Apply fields edited in the UI.
    ///
    /// An empty password keeps the stored one. Returns `true` when the
    /// credentials changed, in which case the stored token has been cleared.
    pub fn apply(&mut self, update: ConfigUpdate) -> bool {
        let email = update.email.trim().to_string();
        let panel_id = update.panel_id.trim().to_string();
        let password = if update.password.is_empty() {
            self.cloud.password.clone()
        } else {
            update.password
        };

        let credentials_changed = email != self.cloud.email
            || panel_id != self.cloud.panel_id
            || password != self.cloud.password;

        self.cloud.email = email;
        self.cloud.password = password;
        self.cloud.panel_id = panel_id;
        self.cloud.panel_code = update.panel_code.trim().to_string();
        if let Some(broker) = update.mqtt_broker.filter(|b| !b.trim().is_empty()) {
            self.mqtt.broker = broker.trim().to_string();
        }
        if let Some(port) = update.mqtt_port {
            self.mqtt.port = port;
        }

        if credentials_changed {
            self.cloud.token.clear();
        }
        credentials_changed
    }
}

/// Fields the UI/API layer may change.
#[derive(Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub panel_id: String,
    #[serde(default)]
    pub panel_code: String,
    #[serde(default)]
    pub mqtt_broker: Option<String>,
    #[serde(default)]
    pub mqtt_port: Option<u16>,
}

impl std::fmt::Debug for ConfigUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigUpdate")
            .field("email", &self.email)
            .field("has_password", &!self.password.is_empty())
            .field("panel_id", &self.panel_id)
            .field("has_panel_code", &!self.panel_code.is_empty())
            .field("mqtt_broker", &self.mqtt_broker)
            .field("mqtt_port", &self.mqtt_port)
            .finish()
    }
}

/// Reads and writes [`BridgeConfig`] as TOML, sealing the cloud password.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    cipher: PasswordCipher,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, cipher: PasswordCipher) -> Self {
        Self {
            path: path.into(),
            cipher,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration. A missing file yields the defaults.
    pub fn load(&self) -> Result<BridgeConfig> {
        if !self.path.exists() {
            info!("No config file at {}, starting with defaults", self.path.display());
            return Ok(BridgeConfig::default());
        }
        let text = std::fs::read_to_string(&self.path)?;
        let mut config: BridgeConfig = toml::from_str(&text)?;
        match self.cipher.decrypt(&config.cloud.password) {
            Ok(clear) => config.cloud.password = clear,
            Err(_) => {
                // Written by hand or by an older version: keep as-is, the next
                // save seals it.
                warn!("Stored password is not encrypted; treating it as plain text");
            }
        }
        Ok(config)
    }

    /// Persist the configuration, replacing the file atomically.
    pub fn save(&self, config: &BridgeConfig) -> Result<()> {
        let mut on_disk = config.clone();
        on_disk.cloud.password = self.cipher.encrypt(&config.cloud.password)?;
        let text = toml::to_string_pretty(&on_disk)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
