//! Environment-driven configuration (spec §6). File-based configuration
//! is out of scope for this crate; environment variables are read
//! directly, matching the teacher's `KRYPIN_*` convention but under a
//! `BRIDGE_` prefix.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenv::dotenv;

#[derive(Clone, Debug)]
pub struct Config {
    pub cloud_client_id: String,
    pub cloud_client_secret: String,
    pub redirect_uri: Option<String>,
    pub token_path: PathBuf,
    pub device_state_path: PathBuf,
    pub auto_mode_state_path: PathBuf,
    pub accessory_cache_path: PathBuf,
    pub poll_interval: Duration,
    pub display_light_scan_interval: Duration,
    pub accessory_bridge_port: u16,
    pub accessory_bridge_pin: Option<String>,
    pub bridge_username: Option<String>,
    pub health_bind: SocketAddr,
    pub cloud_base_url: String,
    pub oauth_token_url: String,
}

impl Config {
    /// Loads configuration from the environment, falling back to
    /// conservative defaults for everything but the OAuth credentials.
    /// Missing mandatory credentials are an unrecoverable configuration
    /// error (spec §7): the orchestrator is expected to terminate on it.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let cloud_client_id =
            std::env::var("BRIDGE_CLOUD_CLIENT_ID").context("BRIDGE_CLOUD_CLIENT_ID is required")?;
        let cloud_client_secret =
            std::env::var("BRIDGE_CLOUD_CLIENT_SECRET").context("BRIDGE_CLOUD_CLIENT_SECRET is required")?;

        let persist_root = env_path("BRIDGE_PERSIST_PATH", "./var");
        let poll_interval_secs = env_var_parsed("BRIDGE_POLL_INTERVAL_SECONDS", 60u64)?;

        Ok(Self {
            cloud_client_id,
            cloud_client_secret,
            redirect_uri: std::env::var("BRIDGE_REDIRECT_URI").ok(),
            token_path: env_path("BRIDGE_TOKEN_PATH", persist_root.join("token.json").to_string_lossy().as_ref()),
            device_state_path: env_path(
                "BRIDGE_DEVICE_STATE_PATH",
                persist_root.join("coordinator-state.json").to_string_lossy().as_ref(),
            ),
            auto_mode_state_path: env_path(
                "BRIDGE_AUTO_MODE_STATE_PATH",
                persist_root.join("auto-mode-state.json").to_string_lossy().as_ref(),
            ),
            accessory_cache_path: env_path(
                "BRIDGE_ACCESSORY_CACHE_PATH",
                persist_root.join("accessories.json").to_string_lossy().as_ref(),
            ),
            poll_interval: normalize_poll_interval(poll_interval_secs),
            display_light_scan_interval: Duration::from_secs(env_var_parsed(
                "BRIDGE_DISPLAY_LIGHT_SCAN_INTERVAL_SECONDS",
                120u64,
            )?),
            accessory_bridge_port: env_var_parsed("BRIDGE_ACCESSORY_PORT", 51_826u16)?,
            accessory_bridge_pin: std::env::var("BRIDGE_ACCESSORY_PIN").ok(),
            bridge_username: std::env::var("BRIDGE_USERNAME").ok(),
            health_bind: env_var_parsed("BRIDGE_HEALTH_BIND", "127.0.0.1:8787".parse::<SocketAddr>().unwrap())?,
            cloud_base_url: std::env::var("BRIDGE_CLOUD_BASE_URL")
                .unwrap_or_else(|_| "https://api.smartthings.com".to_string()),
            oauth_token_url: std::env::var("BRIDGE_OAUTH_TOKEN_URL")
                .unwrap_or_else(|_| "https://api.smartthings.com/oauth/token".to_string()),
        })
    }
}

/// Normalizes a poll interval to the spec §4.4 rule: minute-granular
/// intervals of 60s or more run every K minutes; anything else
/// (including sub-minute configurations) degrades to every minute.
fn normalize_poll_interval(seconds: u64) -> Duration {
    if seconds >= 60 && seconds % 60 == 0 {
        Duration::from_secs(seconds)
    } else {
        Duration::from_secs(60)
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

fn env_var_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|e| anyhow::anyhow!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}
