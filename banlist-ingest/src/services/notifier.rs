//! Notification sinks
//!
//! The notifier task subscribes to the EventBus and hands every event to a
//! [`NotificationSink`]. Delivery is fire-and-forget: failures are logged and
//! never reach the dispatcher.

use async_trait::async_trait;
use banlist_common::models::ROLE_SEPARATOR;
use banlist_common::BlacklistEvent;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

pub const COLOR_OK: u32 = 0x00ff00;
pub const COLOR_ERROR: u32 = 0xff0000;

const WEBHOOK_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Webhook returned {0}: {1}")]
    Rejected(u16, String),
}

/// Destination for outbound events
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &BlacklistEvent) -> Result<(), NotifyError>;
}

/// Discord-style embed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub description: String,
    pub color: u32,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    embeds: [&'a Embed; 1],
}

/// Human-readable rendering of an event
pub fn render(event: &BlacklistEvent) -> Embed {
    let (description, color) = match event {
        BlacklistEvent::SessionSummary {
            server_id,
            new_count,
            updated_count,
            ..
        } => (
            format!(
                "Import done for **{}**\n New users: **{}**\n Updated users: **{}**",
                server_id, new_count, updated_count
            ),
            COLOR_OK,
        ),
        BlacklistEvent::ServerMissing { server_id, .. } => {
            (format!("{} doesn't exist in the database", server_id), COLOR_ERROR)
        }
        BlacklistEvent::WhitelistHit {
            user_id,
            server_id,
            roles,
            feed,
            ..
        } => (
            format!(
                "{}: User <@{}> was found in {}\n roles: {}",
                feed.log_label(),
                user_id,
                server_id,
                roles.join(ROLE_SEPARATOR)
            ),
            COLOR_OK,
        ),
        BlacklistEvent::BatchRunSummary {
            file_count,
            total_new,
            total_updated,
            elapsed_ms,
            unknown_servers,
            ..
        } => {
            let mut description = format!(
                "Bulk import done: **{}** files in {:.1}s\n New users: **{}**\n Updated users: **{}**",
                file_count,
                *elapsed_ms as f64 / 1000.0,
                total_new,
                total_updated
            );
            if !unknown_servers.is_empty() {
                description.push_str(&format!("\n Unknown servers: {}", unknown_servers.join(ROLE_SEPARATOR)));
            }
            let color = if unknown_servers.is_empty() { COLOR_OK } else { COLOR_ERROR };
            (description, color)
        }
        BlacklistEvent::FeedReady { feed, .. } => {
            (format!("Ready to import users from {}", feed.source_name()), COLOR_OK)
        }
        BlacklistEvent::FeedDigest {
            feed,
            new_count,
            updated_count,
            ..
        } => (
            format!(
                "Total Users added from {} log: **{}**\n Total Users updated from {} log: **{}**",
                feed.source_name(),
                new_count,
                feed.source_name(),
                updated_count
            ),
            COLOR_OK,
        ),
    };

    Embed { description, color }
}

/// Posts embeds to Discord-compatible webhooks
///
/// Management events go to the management URL, everything else to the main
/// URL. An event whose URL is not configured is written to the log instead.
pub struct WebhookSink {
    http_client: reqwest::Client,
    main_url: Option<String>,
    management_url: Option<String>,
}

impl WebhookSink {
    pub fn new(main_url: Option<String>, management_url: Option<String>) -> Result<Self, NotifyError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            main_url,
            management_url,
        })
    }

    fn url_for(&self, event: &BlacklistEvent) -> Option<&str> {
        if event.is_management() {
            self.management_url.as_deref()
        } else {
            self.main_url.as_deref()
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, event: &BlacklistEvent) -> Result<(), NotifyError> {
        let Some(url) = self.url_for(event) else {
            return LogSink.deliver(event).await;
        };

        let embed = render(event);
        let response = self
            .http_client
            .post(url)
            .json(&WebhookPayload { embeds: [&embed] })
            .send()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected(status.as_u16(), body));
        }

        debug!(event_type = event.event_type(), "Webhook delivered");
        Ok(())
    }
}

/// Writes rendered events to the log
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, event: &BlacklistEvent) -> Result<(), NotifyError> {
        let embed = render(event);
        if embed.color == COLOR_ERROR {
            warn!(event_type = event.event_type(), "{}", embed.description);
        } else {
            info!(event_type = event.event_type(), "{}", embed.description);
        }
        Ok(())
    }
}

/// Forward bus events to `sink` until the bus closes
pub async fn run_notifier(mut rx: broadcast::Receiver<BlacklistEvent>, sink: Arc<dyn NotificationSink>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Err(e) = sink.deliver(&event).await {
                    warn!(event_type = event.event_type(), error = %e, "Notification delivery failed");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Notifier lagged behind event bus, events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("Notifier stopped");
}
