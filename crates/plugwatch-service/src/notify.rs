//! Notification dispatch.
//!
//! Notifications fan out to every configured channel (desktop, webhook).
//! Dispatch is best-effort: a channel failure is logged and swallowed, and
//! must never abort the loop that triggered the notification.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use plugwatch_types::Urgency;

use crate::config::NotifyConfig;

/// Errors a notification channel can produce.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("desktop notification failed: {0}")]
    Desktop(String),
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook returned HTTP {0}")]
    HttpStatus(u16),
}

/// One delivery channel.
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    /// Channel name used in logs.
    fn name(&self) -> &str;

    /// Deliver one notification.
    async fn send(&self, title: &str, body: &str, urgency: Urgency) -> Result<(), NotifyError>;
}

/// Fan-out dispatcher over the configured channels.
#[derive(Clone)]
pub struct Notifier {
    channels: Arc<Vec<Box<dyn NotifyChannel>>>,
}

impl Notifier {
    /// Build the channel set from configuration.
    pub fn from_config(config: &NotifyConfig) -> Self {
        let mut channels: Vec<Box<dyn NotifyChannel>> = Vec::new();
        if config.desktop {
            channels.push(Box::new(DesktopChannel::new(&config.app_name)));
        }
        if let Some(url) = &config.webhook_url {
            channels.push(Box::new(WebhookChannel::new(url)));
        }
        Self::with_channels(channels)
    }

    /// Build a notifier over explicit channels (used by tests).
    pub fn with_channels(channels: Vec<Box<dyn NotifyChannel>>) -> Self {
        Self {
            channels: Arc::new(channels),
        }
    }

    /// A notifier with no channels.
    pub fn disabled() -> Self {
        Self::with_channels(Vec::new())
    }

    /// Dispatch to every channel, logging per-channel outcomes.
    pub async fn notify(&self, title: &str, body: &str, urgency: Urgency) {
        for channel in self.channels.iter() {
            match channel.send(title, body, urgency).await {
                Ok(()) => info!("notification sent via {}: {title} - {body}", channel.name()),
                Err(e) => warn!("notification via {} failed: {e}", channel.name()),
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("channels", &self.channels.len())
            .finish()
    }
}

/// Desktop notifications via the notification daemon.
pub struct DesktopChannel {
    app_name: String,
}

impl DesktopChannel {
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
        }
    }
}

#[async_trait]
impl NotifyChannel for DesktopChannel {
    fn name(&self) -> &str {
        "desktop"
    }

    async fn send(&self, title: &str, body: &str, urgency: Urgency) -> Result<(), NotifyError> {
        let app_name = self.app_name.clone();
        let title = title.to_string();
        let body = body.to_string();
        let desktop_urgency = match urgency {
            Urgency::Normal => notify_rust::Urgency::Normal,
            Urgency::Critical => notify_rust::Urgency::Critical,
        };

        // show() blocks on the notification bus.
        let result = tokio::task::spawn_blocking(move || {
            notify_rust::Notification::new()
                .appname(&app_name)
                .summary(&title)
                .body(&body)
                .urgency(desktop_urgency)
                .show()
                .map(|_handle| ())
                .map_err(|e| e.to_string())
        })
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(NotifyError::Desktop(message)),
            Err(e) => Err(NotifyError::Desktop(e.to_string())),
        }
    }
}

/// Chat/webhook channel posting the notification as JSON.
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl NotifyChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, title: &str, body: &str, urgency: Urgency) -> Result<(), NotifyError> {
        let payload = serde_json::json!({
            "title": title,
            "message": body,
            "urgency": urgency.as_str(),
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Recording channel for tests. Clones share the same buffer, so a copy
/// can be kept for assertions after boxing one into a [`Notifier`].
#[derive(Debug, Default, Clone)]
pub struct RecordingChannel {
    sent: Arc<std::sync::Mutex<Vec<(String, String, Urgency)>>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications captured so far as `(title, body, urgency)`.
    pub fn sent(&self) -> Vec<(String, String, Urgency)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifyChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, title: &str, body: &str, urgency: Urgency) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string(), urgency));
        Ok(())
    }
}
