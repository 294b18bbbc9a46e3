use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

use crate::logging::LoggingConfig;

/// Main configuration structure for EC2 ChatOps
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Backend API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Conversation behavior configuration
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL resolution strategy for the backend
    #[serde(default)]
    pub base_url: BaseUrlStrategy,

    /// Total request timeout in seconds
    pub request_timeout_secs: u64,

    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: BaseUrlStrategy::default(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// How the backend base URL is derived for a given deployment topology.
///
/// The original deployment grew several near-identical clients that differed
/// only in this choice; it is a single injected strategy here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum BaseUrlStrategy {
    /// Same host as the hosting service, explicit API port
    SameHostPort { host: String, port: u16 },

    /// Reverse-proxied under a path prefix on a shared origin
    ProxyPath { origin: String, prefix: String },

    /// Local development backend on 127.0.0.1:5000
    LocalhostInternal,

    /// Fully explicit base URL
    Explicit { url: String },
}

impl Default for BaseUrlStrategy {
    fn default() -> Self {
        BaseUrlStrategy::LocalhostInternal
    }
}

impl BaseUrlStrategy {
    /// Resolve the strategy to a concrete base URL (no trailing slash)
    pub fn resolve(&self) -> String {
        match self {
            BaseUrlStrategy::SameHostPort { host, port } => {
                format!("http://{}:{}", host, port)
            }
            BaseUrlStrategy::ProxyPath { origin, prefix } => {
                format!(
                    "{}/{}",
                    origin.trim_end_matches('/'),
                    prefix.trim_matches('/')
                )
            }
            BaseUrlStrategy::LocalhostInternal => "http://127.0.0.1:5000".to_string(),
            BaseUrlStrategy::Explicit { url } => url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Delay before refreshing the instance list after a mutating action,
    /// in seconds. Backend mutations are asynchronous and are not reflected
    /// immediately by discovery.
    pub refresh_delay_secs: u64,

    /// Display name used for bot messages
    pub bot_name: String,

    /// Maximum transcript length kept in memory (0 = unlimited)
    pub max_transcript: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            refresh_delay_secs: 8,
            bot_name: "CloudWatch Assistant".to_string(),
            max_transcript: 0,
        }
    }
}

impl ConversationConfig {
    pub fn refresh_delay(&self) -> Duration {
        Duration::from_secs(self.refresh_delay_secs)
    }
}

impl Config {
    /// Default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let base_dir = if cfg!(windows) {
            dirs::config_dir().context("Could not determine config directory")?
        } else {
            dirs::home_dir()
                .map(|h| h.join(".config"))
                .or_else(dirs::config_dir)
                .context("Could not determine config directory")?
        }
        .join("ec2-chatops");

        Ok(base_dir.join("config.toml"))
    }

    /// Load configuration from an explicit path, the default location, or
    /// fall back to defaults when no file exists. Environment overrides are
    /// applied last.
    pub async fn load(path: Option<&str>) -> Result<Self> {
        let path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_path()?,
        };

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("EC2_CHATOPS_BASE_URL") {
            if !url.trim().is_empty() {
                self.api.base_url = BaseUrlStrategy::Explicit { url };
            }
        }
        if let Ok(level) = env::var("EC2_CHATOPS_LOG_LEVEL") {
            if !level.trim().is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.api.request_timeout_secs == 0 {
            anyhow::bail!("api.request_timeout_secs must be greater than 0");
        }
        if self.api.connect_timeout_secs == 0 {
            anyhow::bail!("api.connect_timeout_secs must be greater than 0");
        }
        if let BaseUrlStrategy::Explicit { url } = &self.api.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("api.base_url.url must start with http:// or https://");
            }
        }
        match &self.logging.level.to_lowercase()[..] {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("Unknown log level: {}", other),
        }
        Ok(())
    }

    /// Write an example configuration file
    pub async fn generate(path: Option<&str>) -> Result<PathBuf> {
        let path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_path()?,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default configuration")?;
        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_base_url_resolution() {
        assert_eq!(
            BaseUrlStrategy::LocalhostInternal.resolve(),
            "http://127.0.0.1:5000"
        );
        assert_eq!(
            BaseUrlStrategy::SameHostPort {
                host: "ops.internal".to_string(),
                port: 5000
            }
            .resolve(),
            "http://ops.internal:5000"
        );
        assert_eq!(
            BaseUrlStrategy::ProxyPath {
                origin: "https://ops.example.com/".to_string(),
                prefix: "/cloudwatch-bot/".to_string()
            }
            .resolve(),
            "https://ops.example.com/cloudwatch-bot"
        );
        assert_eq!(
            BaseUrlStrategy::Explicit {
                url: "https://bot.example.com/".to_string()
            }
            .resolve(),
            "https://bot.example.com"
        );
    }

    #[test]
    fn test_default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let mut config = Config::default();
        config.api.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");

        let toml = r#"
[api]
request_timeout_secs = 15
connect_timeout_secs = 5

[api.base_url]
strategy = "same-host-port"
host = "ops.internal"
port = 8080

[conversation]
refresh_delay_secs = 3
bot_name = "Ops Bot"
max_transcript = 200
"#;
        fs::write(&path, toml).await.unwrap();

        let config = Config::load(Some(path.to_string_lossy().as_ref()))
            .await
            .unwrap();
        assert_eq!(config.api.request_timeout_secs, 15);
        assert_eq!(
            config.api.base_url.resolve(),
            "http://ops.internal:8080"
        );
        assert_eq!(config.conversation.refresh_delay_secs, 3);
        assert_eq!(config.conversation.bot_name, "Ops Bot");
    }

    #[tokio::test]
    async fn test_generate_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("generated.toml");

        let written = Config::generate(Some(path.to_string_lossy().as_ref()))
            .await
            .unwrap();
        let loaded = Config::load(Some(written.to_string_lossy().as_ref()))
            .await
            .unwrap();
        assert_eq!(loaded.api.request_timeout_secs, 30);
        assert_eq!(loaded.api.base_url, BaseUrlStrategy::LocalhostInternal);
    }
}
