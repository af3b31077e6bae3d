//! Event types for the banlist event system
//!
//! Provides the outbound event definitions and the EventBus shared by the
//! dispatcher, the notifier and the SSE stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// Upstream producer of observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feed {
    /// Live queue fed by the web scraper
    Scraper,
    /// Live queue fed by chat-log analysis
    Chat,
    /// JSON files deposited in batch
    Bulk,
}

impl Feed {
    /// Queue name the feed is published under
    pub fn queue_name(self) -> &'static str {
        match self {
            Feed::Scraper => "users",
            Feed::Chat => "usersChat",
            Feed::Bulk => "bulk",
        }
    }

    /// Live queue feed for a queue name. The bulk feed has no queue.
    pub fn from_queue_name(name: &str) -> Option<Feed> {
        match name {
            "users" => Some(Feed::Scraper),
            "usersChat" => Some(Feed::Chat),
            _ => None,
        }
    }

    /// Prefix used in management log lines
    pub fn log_label(self) -> &'static str {
        match self {
            Feed::Scraper => "SCAN LOG",
            Feed::Chat => "CHAT LOG",
            Feed::Bulk => "BULK LOG",
        }
    }

    /// Human name of the source, as used in readiness notices
    pub fn source_name(self) -> &'static str {
        match self {
            Feed::Scraper => "web",
            Feed::Chat => "chat",
            Feed::Bulk => "files",
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Feed::Scraper => "scraper",
            Feed::Chat => "chat",
            Feed::Bulk => "bulk",
        })
    }
}

/// Outbound events
///
/// Broadcast via EventBus; the notifier turns them into webhook messages and
/// the SSE endpoint streams them as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum BlacklistEvent {
    /// A server's batch session went quiet and was flushed
    SessionSummary {
        server_id: String,
        new_count: u64,
        updated_count: u64,
        /// Feeds that contributed to the session
        feeds: Vec<Feed>,
        timestamp: DateTime<Utc>,
    },

    /// Observations referenced an unregistered server (once per session)
    ServerMissing {
        server_id: String,
        feed: Feed,
        timestamp: DateTime<Utc>,
    },

    /// A whitelisted user turned up in a flagged server
    WhitelistHit {
        user_id: String,
        server_id: String,
        roles: Vec<String>,
        feed: Feed,
        timestamp: DateTime<Utc>,
    },

    /// Bulk-file run finished
    BatchRunSummary {
        file_count: usize,
        total_new: u64,
        total_updated: u64,
        elapsed_ms: u64,
        unknown_servers: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A live feed is accepting observations
    FeedReady {
        feed: Feed,
        timestamp: DateTime<Utc>,
    },

    /// Periodic totals for a feed
    FeedDigest {
        feed: Feed,
        new_count: u64,
        updated_count: u64,
        timestamp: DateTime<Utc>,
    },
}

impl BlacklistEvent {
    /// Variant name, used as the SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            BlacklistEvent::SessionSummary { .. } => "SessionSummary",
            BlacklistEvent::ServerMissing { .. } => "ServerMissing",
            BlacklistEvent::WhitelistHit { .. } => "WhitelistHit",
            BlacklistEvent::BatchRunSummary { .. } => "BatchRunSummary",
            BlacklistEvent::FeedReady { .. } => "FeedReady",
            BlacklistEvent::FeedDigest { .. } => "FeedDigest",
        }
    }

    /// Audit events routed to the management channel
    pub fn is_management(&self) -> bool {
        matches!(self, BlacklistEvent::WhitelistHit { .. })
    }
}

/// Central distribution bus for outbound events
///
/// Uses tokio::broadcast internally: publishing never blocks on slow
/// subscribers, and a subscriber that falls behind loses the oldest events
/// rather than stalling the dispatcher.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BlacklistEvent>,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<BlacklistEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring whether anyone is listening
    pub fn emit_lossy(&self, event: BlacklistEvent) {
        let _ = self.tx.send(event);
    }

    /// Live receivers (notifier plus open event streams)
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
