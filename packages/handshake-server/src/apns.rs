//! Apple Push Notification service sink.
//!
//! Delivers alerts through the APNs HTTP/2 provider API using a
//! pre-issued provider token. Token minting and rotation happen outside
//! the server; the token is read from configuration as-is.
//!
//! - `POST {endpoint}/3/device/{device_token}` with `{"aps":{"alert":…}}`

use async_trait::async_trait;
use handshake_core::{Error, Notification, PushSink, Result};
use serde_json::{json, Value};

/// APNs sandbox host.
pub const DEFAULT_APNS_ENDPOINT: &str = "https://api.sandbox.push.apple.com";

/// Connection settings for APNs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApnsConfig {
    /// Base URL, without a trailing slash.
    pub endpoint: String,
    /// App bundle ID sent as `apns-topic`.
    pub topic: String,
    /// Provider authentication token (JWT).
    pub auth_token: String,
}

impl ApnsConfig {
    /// Build a config from optional CLI/env values.
    ///
    /// Returns `None` unless both topic and token are set and non-empty.
    pub fn from_parts(
        endpoint: &str,
        topic: Option<String>,
        auth_token: Option<String>,
    ) -> Option<Self> {
        let topic = topic.filter(|t| !t.trim().is_empty())?;
        let auth_token = auth_token.filter(|t| !t.trim().is_empty())?;
        Some(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            topic,
            auth_token,
        })
    }

    /// Device URL for a push token.
    pub fn device_url(&self, device_token: &str) -> String {
        format!("{}/3/device/{}", self.endpoint, device_token)
    }
}

/// Alert payload in the shape APNs expects.
pub fn alert_payload(message: &str) -> Value {
    json!({ "aps": { "alert": message } })
}

/// A [`PushSink`] that posts to APNs.
pub struct ApnsSink {
    client: reqwest::Client,
    config: ApnsConfig,
}

impl ApnsSink {
    /// Create a sink with its own HTTP client.
    pub fn new(config: ApnsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl PushSink for ApnsSink {
    fn name(&self) -> &'static str {
        "apns"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(self.config.device_url(&notification.device_token))
            .header("apns-topic", self.config.topic.as_str())
            .header("apns-push-type", "alert")
            .bearer_auth(&self.config.auth_token)
            .json(&alert_payload(&notification.message))
            .send()
            .await
            .map_err(|e| Error::DispatchFailed(format!("APNs request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::DispatchFailed(format!(
                "APNs returned {}: {}",
                status, body
            )));
        }

        tracing::debug!(status = status.as_u16(), "Push notification delivered");
        Ok(())
    }
}
