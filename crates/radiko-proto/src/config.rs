use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub radiko: RadikoConfig,
    #[serde(default)]
    pub radiru: RadiruConfig,
    #[serde(default)]
    pub premium: PremiumConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

/// Local relay that injects session headers into media requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    /// Requests whose destination host equals this are routed through the relay.
    #[serde(default = "default_streaming_host")]
    pub streaming_host: String,
}

/// Endpoints and transport settings for the radiko protocol client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadikoConfig {
    /// Scheme and host every API path is appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Public probe page that reveals the caller's area code.
    #[serde(default = "default_area_url")]
    pub area_url: String,
    /// Player script the base partial key is scraped from.
    #[serde(default = "default_player_script_url")]
    pub player_script_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// NHK radio (radiru) configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadiruConfig {
    #[serde(default = "default_radiru_config_url")]
    pub config_url: String,
}

/// Optional radiko premium credentials; login is attempted only when both
/// are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PremiumConfig {
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Explicit mpv binary; searched beside the exe and on PATH when unset.
    #[serde(default)]
    pub mpv_path: Option<PathBuf>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_proxy_port(),
            streaming_host: default_streaming_host(),
        }
    }
}

impl Default for RadikoConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            area_url: default_area_url(),
            player_script_url: default_player_script_url(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for RadiruConfig {
    fn default() -> Self {
        Self {
            config_url: default_radiru_config_url(),
        }
    }
}

impl RadikoConfig {
    /// Point every endpoint at one origin, e.g. a local mock server.
    pub fn with_origin(origin: &str) -> Self {
        let origin = origin.trim_end_matches('/');
        Self {
            base_url: origin.to_string(),
            area_url: format!("{}/area/", origin),
            player_script_url: format!("{}/apps/js/playerCommon.js", origin),
            ..Self::default()
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl PremiumConfig {
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.mail.as_deref(), self.pass.as_deref()) {
            (Some(mail), Some(pass)) if !mail.is_empty() && !pass.is_empty() => Some((mail, pass)),
            _ => None,
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_proxy_port() -> u16 {
    8991
}

fn default_streaming_host() -> String {
    "f-radiko.smartstream.ne.jp".to_string()
}

fn default_base_url() -> String {
    "https://radiko.jp".to_string()
}

fn default_area_url() -> String {
    "http://radiko.jp/area/".to_string()
}

fn default_player_script_url() -> String {
    "http://radiko.jp/apps/js/playerCommon.js".to_string()
}

fn default_user_agent() -> String {
    concat!("radiko-daemon/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_radiru_config_url() -> String {
    "https://www.nhk.or.jp/radio/config/config_web.xml".to_string()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
