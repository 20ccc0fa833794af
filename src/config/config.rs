//! Livedesk configuration management
//! Handles loading and saving the config file plus environment overrides

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::artwork::DEFAULT_ARTWORK_API;
use crate::agent::ArtworkToolSettings;
use crate::monitor::MonitorConfig;
use crate::session::AgentEngineClient;

/// Livedesk configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Google Cloud project id
    #[serde(default)]
    pub project: String,

    #[serde(default = "default_location")]
    pub location: String,

    /// Reasoning engine id or full resource name of the deployed agent
    #[serde(default)]
    pub agent_engine_id: String,

    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub staging_bucket: String,

    /// Pub/Sub topic the live agent handoff is published to
    #[serde(default)]
    pub topic_id: String,

    /// API endpoint override, e.g. for a local emulator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// OAuth access token (environment only, never written to disk)
    #[serde(skip)]
    pub access_token: Option<String>,

    #[serde(default = "default_app_name")]
    pub app_name: String,

    #[serde(default = "default_user_id")]
    pub user_id: String,

    #[serde(default)]
    pub monitor: MonitorSettings,

    #[serde(default)]
    pub artwork: ArtworkSettings,
}

fn default_location() -> String {
    "us-central1".to_string()
}

fn default_app_name() -> String {
    "live-cx-agent".to_string()
}

fn default_user_id() -> String {
    "cx_user".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: String::new(),
            location: default_location(),
            agent_engine_id: String::new(),
            display_name: String::new(),
            staging_bucket: String::new(),
            topic_id: String::new(),
            endpoint: None,
            access_token: None,
            app_name: default_app_name(),
            user_id: default_user_id(),
            monitor: MonitorSettings::default(),
            artwork: ArtworkSettings::default(),
        }
    }
}

/// Monitor timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_timeout_secs: Option<f64>,
}

fn default_poll_interval() -> f64 {
    1.0
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            callback_timeout_secs: None,
        }
    }
}

impl MonitorSettings {
    pub fn to_monitor_config(&self) -> Result<MonitorConfig> {
        let mut config = MonitorConfig::from_secs_f64(self.poll_interval_secs)?;
        if let Some(secs) = self.callback_timeout_secs {
            let timeout = Duration::try_from_secs_f64(secs)
                .with_context(|| format!("Invalid callback timeout: {}", secs))?;
            config = config.with_callback_timeout(timeout);
        }
        Ok(config)
    }
}

/// Long-running artwork tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtworkSettings {
    #[serde(default = "default_artwork_api")]
    pub base_url: String,
    #[serde(default = "default_artwork_id")]
    pub artwork_id: u64,
    #[serde(default = "default_artwork_delay")]
    pub delay_secs: f64,
}

fn default_artwork_api() -> String {
    DEFAULT_ARTWORK_API.to_string()
}

fn default_artwork_id() -> u64 {
    27992
}

fn default_artwork_delay() -> f64 {
    5.0
}

impl Default for ArtworkSettings {
    fn default() -> Self {
        Self {
            base_url: default_artwork_api(),
            artwork_id: default_artwork_id(),
            delay_secs: default_artwork_delay(),
        }
    }
}

impl Config {
    /// Load config from the default location or specified path
    ///
    /// A missing file is created with defaults. Environment variables are
    /// applied on top of the file contents.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = Self::load_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load the file contents only, without environment overrides
    pub fn load_file(path: Option<&str>) -> Result<Self> {
        let config_path = Self::config_path(path)?;

        let config = if config_path.exists() {
            let raw = fs::read_to_string(&config_path).context("Failed to read config file")?;
            let config: Config =
                serde_yaml::from_str(&raw).context("Failed to parse config file")?;
            debug!("Loaded config from {:?}", config_path);
            config
        } else {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Config::default();
            config.save(path)?;
            config
        };

        Ok(config)
    }

    /// Save config to the default location or specified path
    pub fn save(&self, path: Option<&str>) -> Result<()> {
        let config_path = Self::config_path(path)?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(&self)?;
        fs::write(&config_path, content).context("Failed to write config file")?;

        info!("Saved config to {:?}", config_path);
        Ok(())
    }

    /// Get the config file path
    pub fn config_path(path: Option<&str>) -> Result<PathBuf> {
        if let Some(p) = path {
            return Ok(PathBuf::from(p));
        }

        if let Ok(env_path) = std::env::var("LIVEDESK_CONFIG") {
            return Ok(PathBuf::from(env_path));
        }

        let home = dirs::home_dir().context("Cannot find home directory")?;
        Ok(home.join(".livedesk").join("config.yml"))
    }

    /// Overlay values from the deployment environment
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("GOOGLE_CLOUD_PROJECT") {
            self.project = v;
        }
        if let Some(v) = get("GOOGLE_CLOUD_LOCATION") {
            self.location = v;
        }
        if let Some(v) = get("AGENT_ENGINE_ID") {
            self.agent_engine_id = v;
        }
        if let Some(v) = get("DISPLAY_NAME") {
            self.display_name = v;
        }
        if let Some(v) = get("STAGING_BUCKET") {
            self.staging_bucket = v;
        }
        if let Some(v) = get("TOPIC_ID") {
            self.topic_id = v;
        }
        if let Some(v) = get("GOOGLE_ACCESS_TOKEN") {
            self.access_token = Some(v);
        }
    }

    /// Record the id of a freshly deployed engine
    pub fn set_agent_engine_id(&mut self, id: impl Into<String>) {
        self.agent_engine_id = id.into();
    }

    /// Check if enough is configured to reach the deployed agent
    pub fn can_connect(&self) -> bool {
        !self.project.is_empty() && !self.location.is_empty() && !self.agent_engine_id.is_empty()
    }

    /// Build a client for the deployed agent engine
    pub fn engine_client(&self) -> Result<AgentEngineClient> {
        if !self.can_connect() {
            anyhow::bail!(
                "project, location and agent_engine_id must be set (or GOOGLE_CLOUD_PROJECT, GOOGLE_CLOUD_LOCATION, AGENT_ENGINE_ID)"
            );
        }

        let client = match &self.endpoint {
            Some(endpoint) => AgentEngineClient::with_endpoint(
                endpoint,
                &self.project,
                &self.location,
                &self.agent_engine_id,
            )?,
            None => AgentEngineClient::new(&self.project, &self.location, &self.agent_engine_id)?,
        };

        Ok(match &self.access_token {
            Some(token) => client.with_access_token(token),
            None => client,
        })
    }

    pub fn artwork_tool_settings(&self) -> Result<ArtworkToolSettings> {
        let delay = Duration::try_from_secs_f64(self.artwork.delay_secs)
            .with_context(|| format!("Invalid artwork delay: {}", self.artwork.delay_secs))?;

        Ok(ArtworkToolSettings {
            artwork_id: self.artwork.artwork_id,
            delay,
            monitor: self.monitor.to_monitor_config()?,
        })
    }
}
