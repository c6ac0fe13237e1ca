use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sf_auth::{FileStorage, SessionConfig};
use sf_request::RequestOptions;

pub const API_URL_ENV: &str = sf_auth::config::API_BASE_ENV;
pub const EMAIL_ENV: &str = "SF_EMAIL";
pub const PASSWORD_ENV: &str = "SF_PASSWORD";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_url: Option<String>,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Seconds between login and the proactive token refresh
    pub refresh_delay_secs: Option<u64>,
    pub storage_dir: Option<PathBuf>,
    pub request: RequestSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestSection {
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl AppConfig {
    /// Read `config.toml` from the user config dir, then apply env overrides
    pub async fn load() -> anyhow::Result<Self> {
        let path = config_path()?;
        let config = match tokio::fs::read_to_string(&path).await {
            Ok(content) => Self::from_toml(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Invalid configuration")
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(API_URL_ENV) {
            self.api_url = Some(url);
        }
        if let Some(email) = lookup(EMAIL_ENV) {
            self.email = Some(email);
        }
        if let Some(password) = lookup(PASSWORD_ENV) {
            self.password = Some(password);
        }
        self
    }

    pub fn session_config(&self) -> anyhow::Result<SessionConfig> {
        let mut config = match &self.api_url {
            Some(url) => SessionConfig::parse(url).context("Invalid api_url")?,
            None => SessionConfig::default(),
        };
        if let Some(secs) = self.refresh_delay_secs {
            config = config.with_refresh_delay(Duration::from_secs(secs));
        }
        Ok(config)
    }

    pub fn request_options(&self) -> RequestOptions {
        let mut options = RequestOptions::default();
        if let Some(ms) = self.request.timeout_ms {
            options = options.with_timeout(Duration::from_millis(ms));
        }
        if let Some(retries) = self.request.retries {
            options = options.with_retries(retries);
        }
        if let Some(ms) = self.request.retry_delay_ms {
            options = options.with_retry_delay(Duration::from_millis(ms));
        }
        options
    }

    pub fn storage_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.storage_dir {
            Some(dir) => Ok(dir.clone()),
            None => FileStorage::default_storage_dir().context("Failed to resolve session directory"),
        }
    }
}

fn config_path() -> anyhow::Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("", "", "securet-flow")
        .context("Failed to get project directories")?;
    Ok(proj_dirs.config_dir().join("config.toml"))
}
