//! beacon.toml configuration.
//!
//! ```toml
//! [server]
//! port = 8080
//! data_dir = "/var/lib/beacon"
//!
//! [check]
//! interval_secs = 60
//! timeout_ms = 10000
//! max_attempts = 3
//! retry_delay_ms = 1000
//! backoff = "flat"          # or "exponential"
//! first_check = "silent"    # or "notify"
//!
//! [notify.telegram]
//! token = "..."
//! chat_id = "..."
//!
//! [[services]]
//! name = "api"
//! url = "https://api.example.com/health"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;

use beacon_health::{
    CheckSettings, FirstCheckPolicy, RetryBackoff, RetryPolicy, TelegramChannel,
};

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BeaconConfig {
    pub server: ServerConfig,
    pub check: CheckConfig,
    pub notify: NotifyConfig,
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: PathBuf::from("/var/lib/beacon"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CheckConfig {
    pub interval_secs: u64,
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub backoff: RetryBackoff,
    pub first_check: FirstCheckPolicy,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            timeout_ms: 10_000,
            max_attempts: 3,
            retry_delay_ms: 1_000,
            backoff: RetryBackoff::Flat,
            first_check: FirstCheckPolicy::Silent,
        }
    }
}

impl CheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settings(&self) -> CheckSettings {
        CheckSettings {
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                delay: Duration::from_millis(self.retry_delay_ms),
                backoff: self.backoff,
                timeout: self.timeout(),
            },
            first_check: self.first_check,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TelegramConfig {
    pub token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: Option<String>,
}

impl TelegramConfig {
    /// The configured channel, or `None` if either credential is missing.
    pub fn channel(&self) -> Option<TelegramChannel> {
        let channel = TelegramChannel::from_credentials(self.token.clone(), self.chat_id.clone())?;
        Some(match &self.api_base {
            Some(base) => channel.with_api_base(base.clone()),
            None => channel,
        })
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub name: String,
    pub url: String,
}

impl BeaconConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path` if given. Without one, `beacon.toml` in the working
    /// directory is used if present, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Credentials from the environment or command line win over the file.
    pub fn override_telegram(&mut self, token: Option<String>, chat_id: Option<String>) {
        if token.is_some() {
            self.notify.telegram.token = token;
        }
        if chat_id.is_some() {
            self.notify.telegram.chat_id = chat_id;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.check.interval_secs == 0 {
            bail!("check.interval_secs must be greater than zero");
        }
        if self.check.timeout_ms == 0 {
            bail!("check.timeout_ms must be greater than zero");
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            let name = service.name.trim();
            if name.is_empty() {
                bail!("service with url {:?} has an empty name", service.url);
            }
            if !seen.insert(name) {
                bail!("duplicate service name {name:?}");
            }

            let url = reqwest::Url::parse(&service.url)
                .with_context(|| format!("service {name:?} has an invalid url"))?;
            if !matches!(url.scheme(), "http" | "https") {
                bail!("service {name:?} url must be http or https, got {}", url.scheme());
            }
        }
        Ok(())
    }
}

pub const DEFAULT_CONFIG_PATH: &str = "beacon.toml";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = BeaconConfig::from_toml("").unwrap();
        assert_eq!(config, BeaconConfig::default());
        assert_eq!(config.check.interval(), Duration::from_secs(60));
        assert_eq!(config.check.settings(), CheckSettings::default());
        assert!(config.notify.telegram.channel().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn parse_full() {
        let config = BeaconConfig::from_toml(
            r#"
[server]
port = 9000
data_dir = "/tmp/beacon"

[check]
interval_secs = 30
timeout_ms = 5000
max_attempts = 5
retry_delay_ms = 250
backoff = "exponential"
first_check = "notify"

[notify.telegram]
token = "abc"
chat_id = "-100"
api_base = "http://localhost:8081"

[[services]]
name = "api"
url = "https://api.example.com/health"

[[services]]
name = "web"
url = "http://web.internal:8080"
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.services.len(), 2);

        let settings = config.check.settings();
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.delay, Duration::from_millis(250));
        assert_eq!(settings.retry.timeout, Duration::from_secs(5));
        assert_eq!(settings.retry.backoff, RetryBackoff::Exponential);
        assert_eq!(settings.first_check, FirstCheckPolicy::Notify);

        let channel = config.notify.telegram.channel().unwrap();
        assert_eq!(channel.api_base, "http://localhost:8081");
        config.validate().unwrap();
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(BeaconConfig::from_toml("[check]\ninterval = 5\n").is_err());
    }

    #[test]
    fn env_credentials_override_file() {
        let mut config = BeaconConfig::from_toml(
            "[notify.telegram]\ntoken = \"file\"\nchat_id = \"1\"\n",
        )
        .unwrap();
        config.override_telegram(Some("env".into()), None);
        assert_eq!(config.notify.telegram.token.as_deref(), Some("env"));
        assert_eq!(config.notify.telegram.chat_id.as_deref(), Some("1"));
    }

    fn with_services(services: &[(&str, &str)]) -> BeaconConfig {
        BeaconConfig {
            services: services
                .iter()
                .map(|(name, url)| ServiceConfig {
                    name: name.to_string(),
                    url: url.to_string(),
                })
                .collect(),
            ..BeaconConfig::default()
        }
    }

    #[test]
    fn validate_rejects_bad_services() {
        assert!(with_services(&[("", "https://a.example.com")]).validate().is_err());
        assert!(with_services(&[("a", "ftp://a.example.com")]).validate().is_err());
        assert!(with_services(&[("a", "not a url")]).validate().is_err());
        assert!(
            with_services(&[("a", "https://a.example.com"), ("a", "https://b.example.com")])
                .validate()
                .is_err()
        );
        assert!(
            with_services(&[("a", "https://a.example.com"), ("b", "http://b.example.com")])
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn validate_rejects_zero_interval_and_timeout() {
        let mut config = BeaconConfig::default();
        config.check.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = BeaconConfig::default();
        config.check.timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
