use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

// ── Top-level config ──────────────────────────────────────────────

/// Top-level slackrelay configuration, loaded from `config.toml`.
///
/// Resolution order: `SLACKRELAY_CONFIG_DIR` env → `~/.slackrelay/config.toml`.
/// Environment overrides are applied after the file is read and always win.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Slack connection configuration (`[slack]`).
    #[serde(default)]
    pub slack: SlackConfig,

    /// Remote agent relay configuration (`[relay]`).
    #[serde(default)]
    pub relay: RelayConfig,

    /// Session store configuration (`[sessions]`).
    #[serde(default)]
    pub sessions: SessionsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            slack: SlackConfig::default(),
            relay: RelayConfig::default(),
            sessions: SessionsConfig::default(),
        }
    }
}

// ── Slack ────────────────────────────────────────────────────────

/// Slack connection configuration (`[slack]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot token (`xoxb-…`). Overridden by `SLACK_BOT_TOKEN`.
    pub bot_token: Option<String>,
    /// App-level token (`xapp-…`) for Socket Mode. Overridden by `SLACK_APP_TOKEN`.
    pub app_token: Option<String>,
    /// Slack Web API base URL. Default: `https://slack.com/api`.
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
    /// Delay before reconnecting a dropped Socket Mode websocket, in seconds.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Per-request timeout toward the Slack Web API, in seconds.
    #[serde(default = "default_slack_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".into()
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_slack_timeout_secs() -> u64 {
    30
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            app_token: None,
            api_base: default_slack_api_base(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            request_timeout_secs: default_slack_timeout_secs(),
        }
    }
}

impl SlackConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs.max(1))
    }
}

// ── Relay ────────────────────────────────────────────────────────

/// Remote agent relay configuration (`[relay]` section).
///
/// The endpoint receives the fixed configuration block below merged with
/// each prompt; see the relay client for the wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Agent endpoint URL. Overridden by `RELAY_ENDPOINT`.
    #[serde(default)]
    pub endpoint: String,
    /// Bearer token for the agent endpoint. Overridden by `RELAY_API_KEY`.
    pub api_key: Option<String>,
    /// User identity reported to the agent. Default: `"slackrelay"`.
    #[serde(default = "default_relay_user_id")]
    pub user_id: String,
    /// Agent identifier on the remote service. Overridden by `RELAY_AGENT_ID`.
    #[serde(default = "default_relay_agent_id")]
    pub agent_id: String,
    /// Prompt temperature (0.0–2.0). Default: `0.7`.
    #[serde(default = "default_relay_temperature")]
    pub temperature: f64,
    /// Result-limiting parameter forwarded to the agent. Default: `5`.
    #[serde(default = "default_relay_max_results")]
    pub max_results: u32,
    /// Outbound request timeout, in seconds. Default: `60`.
    #[serde(default = "default_relay_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_relay_user_id() -> String {
    "slackrelay".into()
}

fn default_relay_agent_id() -> String {
    "default".into()
}

fn default_relay_temperature() -> f64 {
    0.7
}

fn default_relay_max_results() -> u32 {
    5
}

fn default_relay_timeout_secs() -> u64 {
    60
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            user_id: default_relay_user_id(),
            agent_id: default_relay_agent_id(),
            temperature: default_relay_temperature(),
            max_results: default_relay_max_results(),
            timeout_secs: default_relay_timeout_secs(),
        }
    }
}

// ── Sessions ─────────────────────────────────────────────────────

/// Session store configuration (`[sessions]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Hours of inactivity after which a thread session is discarded. Default: `24`.
    #[serde(default = "default_session_expiry_hours")]
    pub expiry_hours: u64,
    /// Interval between expiry sweeps, in hours. Default: `24`.
    #[serde(default = "default_sweep_interval_hours")]
    pub sweep_interval_hours: u64,
}

fn default_session_expiry_hours() -> u64 {
    24
}

fn default_sweep_interval_hours() -> u64 {
    24
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            expiry_hours: default_session_expiry_hours(),
            sweep_interval_hours: default_sweep_interval_hours(),
        }
    }
}

impl SessionsConfig {
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_hours.max(1) * 60 * 60)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_hours.max(1) * 60 * 60)
    }
}

// ── Loading and validation ───────────────────────────────────────

fn resolve_config_dir() -> Result<PathBuf> {
    if let Ok(custom_dir) = std::env::var("SLACKRELAY_CONFIG_DIR") {
        if !custom_dir.trim().is_empty() {
            return Ok(PathBuf::from(custom_dir));
        }
    }

    let user_dirs = UserDirs::new().context("Could not determine home directory")?;
    Ok(user_dirs.home_dir().join(".slackrelay"))
}

impl Config {
    /// Load `config.toml`, creating a default one on first run.
    pub async fn load_or_init() -> Result<Self> {
        let config_dir = resolve_config_dir()?;
        let config_path = config_dir.join("config.toml");

        fs::create_dir_all(&config_dir)
            .await
            .with_context(|| format!("Failed to create config directory {}", config_dir.display()))?;

        let mut config = if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path.clone();
            config
        } else {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.save().await?;

            // Restrict permissions on the newly created file (it may later hold tokens)
            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }

            config
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(path = %config.config_path.display(), "Config loaded");
        Ok(config)
    }

    /// Write the current configuration back to `config_path`.
    pub async fn save(&self) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, contents)
            .await
            .with_context(|| format!("Failed to write config file {}", self.config_path.display()))?;
        Ok(())
    }

    /// Apply environment variable overrides to config.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("SLACK_BOT_TOKEN") {
            if !token.is_empty() {
                self.slack.bot_token = Some(token);
            }
        }

        if let Ok(token) = std::env::var("SLACK_APP_TOKEN") {
            if !token.is_empty() {
                self.slack.app_token = Some(token);
            }
        }

        if let Ok(key) = std::env::var("RELAY_API_KEY") {
            if !key.is_empty() {
                self.relay.api_key = Some(key);
            }
        }

        if let Ok(endpoint) = std::env::var("RELAY_ENDPOINT") {
            if !endpoint.is_empty() {
                self.relay.endpoint = endpoint;
            }
        }

        if let Ok(agent_id) = std::env::var("RELAY_AGENT_ID") {
            if !agent_id.is_empty() {
                self.relay.agent_id = agent_id;
            }
        }
    }

    /// Structural validation, applied on every load.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.relay.temperature) {
            anyhow::bail!(
                "relay.temperature must be between 0.0 and 2.0 (got {})",
                self.relay.temperature
            );
        }
        if self.relay.max_results == 0 {
            anyhow::bail!("relay.max_results must be at least 1");
        }
        Ok(())
    }

    /// Credential validation, applied before serving traffic. Missing
    /// required credentials are fatal: the process exits before any
    /// connection is opened.
    pub fn require_credentials(&self) -> Result<()> {
        let missing_token = |token: &Option<String>| {
            token.as_deref().map_or(true, |value| value.trim().is_empty())
        };

        if missing_token(&self.slack.bot_token) {
            anyhow::bail!("slack.bot_token is not set (or export SLACK_BOT_TOKEN)");
        }
        if missing_token(&self.slack.app_token) {
            anyhow::bail!("slack.app_token is not set (or export SLACK_APP_TOKEN)");
        }
        if missing_token(&self.relay.api_key) {
            anyhow::bail!("relay.api_key is not set (or export RELAY_API_KEY)");
        }
        if self.relay.endpoint.trim().is_empty() {
            anyhow::bail!("relay.endpoint is not set (or export RELAY_ENDPOINT)");
        }
        Ok(())
    }

    /// Short description of where this config came from, for `status`.
    pub fn source_path(&self) -> &Path {
        &self.config_path
    }
}
