use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::error::{Result, TriageError};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub triage: TriageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP endpoints bind to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Public base URL of the deployment, used to build the OAuth redirect URI
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Path to the OAuth client id/secret JSON file (Google console format)
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,
    /// Directory holding one credential record per identity
    #[serde(default = "default_store_dir")]
    pub store_dir: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            store_dir: default_store_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Fully qualified Pub/Sub topic, e.g. "projects/my-project/topics/new-mail"
    #[serde(default = "default_topic")]
    pub topic: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    /// Classification label that gates the mutation (exact, case-sensitive)
    #[serde(default = "default_target_label")]
    pub target_label: String,
    /// Mail label applied when the target concept is found
    #[serde(default = "default_star_label_id")]
    pub star_label_id: String,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            target_label: default_target_label(),
            star_label_id: default_star_label_id(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_credentials_path() -> String {
    "credentials.json".to_string()
}

fn default_store_dir() -> String {
    ".gmail-triage/credentials".to_string()
}

fn default_topic() -> String {
    String::new()
}

fn default_target_label() -> String {
    "bird".to_string()
}

fn default_star_label_id() -> String {
    "STARRED".to_string()
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TriageError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TriageError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TriageError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| TriageError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| TriageError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if Url::parse(&self.server.base_url).is_err() {
            return Err(TriageError::ConfigError(format!(
                "server.base_url is not a valid URL: '{}'",
                self.server.base_url
            )));
        }

        if self.triage.target_label.is_empty() {
            return Err(TriageError::ConfigError(
                "triage.target_label cannot be empty".to_string(),
            ));
        }

        if self.triage.star_label_id.is_empty() {
            return Err(TriageError::ConfigError(
                "triage.star_label_id cannot be empty".to_string(),
            ));
        }

        // The topic may stay empty until deployment; watch registration
        // checks it again before calling the provider
        if !self.watch.topic.is_empty() && !self.watch.topic.starts_with("projects/") {
            return Err(TriageError::ConfigError(format!(
                "watch.topic must be fully qualified (projects/<p>/topics/<t>), got '{}'",
                self.watch.topic
            )));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }
}
