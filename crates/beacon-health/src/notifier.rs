//! Change notifications.
//!
//! Delivers plain-text messages to a Telegram chat through the Bot API.
//! Delivery is best-effort: [`Notifier::notify`] never fails, it logs.

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

/// Credentials and endpoint for the Telegram channel.
#[derive(Clone, PartialEq, Eq)]
pub struct TelegramChannel {
    pub token: String,
    pub chat_id: String,
    /// Base URL of the Bot API, overridable for testing.
    pub api_base: String,
}

impl TelegramChannel {
    /// Build a channel only if both credentials are present and non-empty.
    pub fn from_credentials(token: Option<String>, chat_id: Option<String>) -> Option<Self> {
        let token = token.filter(|t| !t.trim().is_empty())?;
        let chat_id = chat_id.filter(|c| !c.trim().is_empty())?;
        Some(Self {
            token,
            chat_id,
            api_base: DEFAULT_TELEGRAM_API.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.token
        )
    }
}

impl std::fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    /// The request never got a response. The url is stripped from the
    /// inner error since it carries the bot token.
    #[error("request failed: {0}")]
    Request(reqwest::Error),

    #[error("channel rejected message with status {0}")]
    Rejected(reqwest::StatusCode),
}

/// Sends transition messages to the configured channel, if any.
#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    channel: Option<TelegramChannel>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(client: Client, channel: Option<TelegramChannel>, timeout: Duration) -> Self {
        if channel.is_none() {
            info!("telegram credentials not configured, notifications disabled");
        }
        Self {
            client,
            channel,
            timeout,
        }
    }

    /// A notifier that drops every message.
    pub fn disabled(client: Client) -> Self {
        Self {
            client,
            channel: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.channel.is_some()
    }

    /// Deliver `message`, logging instead of failing.
    ///
    /// Returns whether the channel accepted the message.
    pub async fn notify(&self, message: &str) -> bool {
        let Some(channel) = &self.channel else {
            debug!(%message, "notification skipped, no channel configured");
            return false;
        };

        match self.send(channel, message).await {
            Ok(()) => {
                debug!("notification delivered");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to deliver notification");
                false
            }
        }
    }

    async fn send(&self, channel: &TelegramChannel, message: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(channel.send_message_url())
            .timeout(self.timeout)
            .form(&[("chat_id", channel.chat_id.as_str()), ("text", message)])
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.without_url()))?;

        let status = response.status();
        // Body is not needed.
        drop(response);

        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected(status))
        }
    }
}
