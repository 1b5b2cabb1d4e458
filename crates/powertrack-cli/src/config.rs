//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use powertrack_core::{HttpConfig, PipelineConfig, RetryPolicy};
use powertrack_gnip::ApiConfig;
use serde::Deserialize;

/// Global configuration for powertrack
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub credentials: CredentialsConfig,
    pub output: OutputConfig,
    pub http: HttpSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    #[serde(deserialize_with = "deserialize_env_var")]
    pub account: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub username: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub password: String,
    /// Search stream label
    pub label: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        let env = |k: &str| std::env::var(k).unwrap_or_default();
        Self {
            account: env("GNIP_ACCOUNT"),
            username: env("GNIP_USERNAME"),
            password: env("GNIP_PASSWORD"),
            label: "prod".to_string(),
        }
    }
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("account", &self.account)
            .field("username", &self.username)
            .field("password", &"***")
            .field("label", &self.label)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub folder: PathBuf,
    /// Concurrent shard downloads
    pub workers: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("./output"),
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Seconds
    pub connect_timeout: u64,
    /// Seconds without body bytes before a download is abandoned
    pub read_timeout: u64,
    /// Attempts per shard; 0 retries forever
    pub max_retries: u32,
    /// Seconds before the first retry
    pub backoff: u64,
    /// Upper bound for one retry delay, seconds
    pub max_backoff: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: 30,
            read_timeout: 30,
            max_retries: 5,
            backoff: 2,
            max_backoff: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Seconds the writer may keep draining after cancellation
    pub grace_period: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self { grace_period: 5 }
    }
}

/// Deserialize a string that may be an environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(expand_env_var(&s).unwrap_or_default())
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./powertrack.toml (current directory)
    /// 2. ~/.config/powertrack/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("powertrack.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(user_config) = Self::user_config_path() {
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn user_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "powertrack")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            account: self.credentials.account.clone(),
            username: self.credentials.username.clone(),
            password: self.credentials.password.clone(),
            label: self.credentials.label.clone(),
            ..Default::default()
        }
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            connect_timeout: Duration::from_secs(self.http.connect_timeout),
            read_timeout: Duration::from_secs(self.http.read_timeout),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: (self.http.max_retries > 0).then_some(self.http.max_retries),
            base_delay: Duration::from_secs(self.http.backoff),
            max_delay: Duration::from_secs(self.http.max_backoff),
        }
    }

    /// Pipeline settings for a run; `workers` overrides the configured count
    pub fn pipeline_config(&self, output: PathBuf, workers: Option<usize>, append: bool) -> PipelineConfig {
        PipelineConfig {
            output,
            workers: workers.unwrap_or(self.output.workers).max(1),
            append,
            retry: self.retry_policy(),
            grace_period: Duration::from_secs(self.pipeline.grace_period),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.output.folder, PathBuf::from("./output"));
        assert_eq!(config.output.workers, 4);
        assert_eq!(config.credentials.label, "prod");
        assert_eq!(config.http.max_retries, 5);
    }

    #[test]
    fn expand_env_var_simple() {
        std::env::set_var("POWERTRACK_TEST_VAR", "test_value");
        assert_eq!(
            expand_env_var("${POWERTRACK_TEST_VAR}"),
            Some("test_value".to_string())
        );
        std::env::remove_var("POWERTRACK_TEST_VAR");
    }

    #[test]
    fn expand_env_var_literal() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
    }

    #[test]
    fn expand_env_var_missing() {
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_12345}"), None);
    }

    #[test]
    fn parse_config_toml() {
        std::env::set_var("POWERTRACK_TEST_PASSWORD", "s3cret");
        let toml = r#"
[credentials]
account = "acme"
username = "ops@acme.test"
password = "${POWERTRACK_TEST_PASSWORD}"
label = "dev"

[output]
folder = "/tmp/tweets"
workers = 8

[http]
read_timeout = 10
max_retries = 0

[pipeline]
grace_period = 1
"#;
        let config: Config = toml::from_str(toml).unwrap();
        std::env::remove_var("POWERTRACK_TEST_PASSWORD");

        assert_eq!(config.credentials.account, "acme");
        assert_eq!(config.credentials.password, "s3cret");
        assert_eq!(config.credentials.label, "dev");
        assert_eq!(config.output.folder, PathBuf::from("/tmp/tweets"));
        assert_eq!(config.http.read_timeout, 10);
        assert_eq!(config.http.connect_timeout, 30);
        assert_eq!(config.pipeline.grace_period, 1);
        assert_eq!(config.retry_policy().max_attempts, None);
    }

    #[test]
    fn pipeline_config_overrides() {
        let config = Config::default();
        let pc = config.pipeline_config(PathBuf::from("a.csv"), Some(0), true);
        assert_eq!(pc.workers, 1);
        assert!(pc.append);
        assert_eq!(pc.retry.max_attempts, Some(5));
        assert_eq!(pc.grace_period, Duration::from_secs(5));

        let pc = config.pipeline_config(PathBuf::from("a.csv"), None, false);
        assert_eq!(pc.workers, 4);
    }

    #[test]
    fn credentials_hidden_in_debug() {
        let mut config = Config::default();
        config.credentials.password = "hunter2".into();
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
