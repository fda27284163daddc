//! Slack notification backend.
//!
//! Posts one message per security event to a channel using the Web API
//! `chat.postMessage` method:
//!
//! ```text
//! <application_name> (<event_category>): <description> - <event_url>
//! ```
//!
//! Slack answers HTTP 200 with `"ok": false` and an error code (e.g.
//! `invalid_auth`) for most API-level failures, so the body is always decoded.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::Backend;
use crate::error::{ConfigError, DeliveryError};
use crate::event::{Event, FieldError};

/// Production Slack Web API root.
pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";

/// Channel used when none is configured.
pub const DEFAULT_CHANNEL: &str = "general";

const TEXT_MISMATCH: &str = "response text different than sent text";

/// Settings for [`SlackBackend`].
#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub api_token: String,
    /// Channel name without the leading '#'
    pub channel: String,
    pub api_url: String,
    pub request_timeout: Duration,
}

impl SlackConfig {
    pub fn new(api_token: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            channel: channel.into(),
            api_url: DEFAULT_SLACK_API_URL.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<PostedMessage>,
}

#[derive(Debug, Deserialize)]
struct PostedMessage {
    #[serde(default)]
    text: String,
}

/// Render the chat notification for a security event.
pub fn format_notification(event: &Event) -> Result<String, FieldError> {
    Ok(format!(
        "{} ({}): {} - {}",
        event.application_name()?,
        event.event_category()?,
        event.description()?,
        event.event_url()?,
    ))
}

/// Backend sending security events to a Slack channel.
///
/// The client is stateless across calls; no local locking is needed.
#[derive(Debug, Clone)]
pub struct SlackBackend {
    client: Client,
    endpoint: String,
    token: String,
    channel: String,
}

impl SlackBackend {
    /// Build the backend and its HTTP client.
    pub fn new(config: SlackConfig) -> Result<Self, ConfigError> {
        if config.api_token.trim().is_empty() {
            return Err(ConfigError::MissingSetting("SLACK_API_TOKEN"));
        }

        let api_url = Url::parse(&config.api_url).map_err(|e| ConfigError::InvalidSetting {
            name: "SLACK_API_URL",
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::InvalidSetting {
                name: "SLACK_REQUEST_TIMEOUT_MS",
                reason: e.to_string(),
            })?;

        let channel = config.channel.trim_start_matches('#').to_string();
        let endpoint = format!("{}/chat.postMessage", api_url.as_str().trim_end_matches('/'));

        info!(channel = %channel, endpoint = %endpoint, "slack_backend_configured");

        Ok(Self {
            client,
            endpoint,
            token: config.api_token,
            channel,
        })
    }

    /// Configured channel name, without '#'.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    async fn post_message(&self, text: &str) -> Result<(), DeliveryError> {
        let channel = format!("#{}", self.channel);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&PostMessageRequest {
                channel: &channel,
                text,
            })
            .send()
            .await
            .map_err(|e| DeliveryError::new(format!("slack request failed: {}", e)))?;

        let status = response.status();
        let body: PostMessageResponse = response.json().await.map_err(|e| {
            DeliveryError::new(format!(
                "slack response unreadable (HTTP {}): {}",
                status.as_u16(),
                e
            ))
        })?;

        if !body.ok {
            return Err(DeliveryError::new(body.error.unwrap_or_else(|| {
                format!("slack returned ok=false (HTTP {})", status.as_u16())
            })));
        }

        match body.message {
            Some(posted) if posted.text == text => Ok(()),
            _ => Err(DeliveryError::new(TEXT_MISMATCH)),
        }
    }

    async fn dispatch_events(&self, events: &[Event]) -> Vec<DeliveryError> {
        let mut errors = Vec::new();

        for event in events.iter().filter(|e| e.is_security_event()) {
            let text = match format_notification(event) {
                Ok(text) => text,
                Err(e) => {
                    errors.push(DeliveryError::new(format!(
                        "unexpected error sending slack message: {} (event {})",
                        e,
                        event.label()
                    )));
                    continue;
                }
            };

            match self.post_message(&text).await {
                Ok(()) => debug!(event_id = event.label(), channel = %self.channel, "slack_message_sent"),
                Err(e) => errors.push(e),
            }
        }

        errors
    }
}

impl Backend for SlackBackend {
    fn name(&self) -> &str {
        "slack"
    }

    fn dispatch<'a>(&'a self, events: &'a [Event]) -> BoxFuture<'a, Vec<DeliveryError>> {
        self.dispatch_events(events).boxed()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        // Nothing to release; pooled connections drop with the client.
        async {}.boxed()
    }
}
