use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::Credentials;

const SYSTEM_CONFIG_PATH: &str = "/etc/exportmon/config.toml";
const LOCAL_CONFIG_PATH: &str = "exportmon.toml";
const ENV_PREFIX: &str = "EXPORTMON_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannelType {
    #[default]
    None,
    Slack,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub channel: NotificationChannelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_webhook: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub provider_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub simulation: bool,
    pub verbose: bool,
    pub json_logs: bool,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider_url: "http://localhost:8080/api/v1".to_string(),
            access_token: None,
            access_token_expires_at: None,
            poll_interval_secs: 10,
            request_timeout_secs: 30,
            simulation: false,
            verbose: false,
            json_logs: false,
            notifications: NotificationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config files, `EXPORTMON_*` environment
    /// variables and finally the given CLI arguments, later sources winning.
    pub fn new<T: Serialize>(args: Option<&T>) -> Result<Self> {
        let files = [PathBuf::from(SYSTEM_CONFIG_PATH), PathBuf::from(LOCAL_CONFIG_PATH)];
        Self::load(&files, args)
    }

    pub fn load<T: Serialize>(files: &[PathBuf], args: Option<&T>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        for file in files {
            figment = figment.merge(Toml::file(file));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(args) = args {
            figment = figment.merge(Serialized::defaults(args));
        }

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        Self::load(&[path.to_path_buf()], None::<&()>)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        if self.provider_url.is_empty() {
            bail!("provider_url must not be empty");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Credentials for the provider. The simulated provider accepts anything.
    pub fn credentials(&self) -> Result<Credentials> {
        match &self.access_token {
            Some(token) if !token.is_empty() => {
                Ok(Credentials::new(token.clone(), self.access_token_expires_at))
            }
            _ if self.simulation => Ok(Credentials::new("simulated", None)),
            _ => bail!("No access token configured (set {}ACCESS_TOKEN)", ENV_PREFIX),
        }
    }

    /// Copy of the config that is safe to print.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.access_token.is_some() {
            config.access_token = Some("<redacted>".to_string());
        }
        if config.notifications.slack_webhook.is_some() {
            config.notifications.slack_webhook = Some("<redacted>".to_string());
        }
        config
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
