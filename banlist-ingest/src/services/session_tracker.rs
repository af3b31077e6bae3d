//! Batch session tracker
//!
//! Per-server debounce state machine:
//!
//! ```text
//! Idle --observation--> Active --observation--> Active (window re-armed)
//!                         |
//!                         +--window elapsed--> Flushing --> Idle
//! ```
//!
//! Sessions are keyed by server id only, so observations for one server from
//! different feeds land in the same session and produce one summary.
//! The tracker holds no timers itself: the owner asks for [`SessionTracker::next_deadline`],
//! sleeps until it, and calls [`SessionTracker::flush_expired`]. All methods take
//! the current instant explicitly.

use super::dispatcher::ObservationOutcome;
use banlist_common::{BlacklistEvent, Feed};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::time::Instant;

/// Observable state of a server key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No aggregate exists
    Idle,
    /// Aggregate exists and its window is armed
    Active,
}

/// In-memory aggregate for one server's open session
#[derive(Debug, Clone)]
pub struct SessionAggregate {
    pub server_id: String,
    pub new_count: u64,
    pub updated_count: u64,
    /// Sticky: once set, further observations skip the reconciler
    pub server_missing: bool,
    pub feeds: BTreeSet<Feed>,
    pub started_at: Instant,
    pub last_activity_at: Instant,
}

impl SessionAggregate {
    fn new(server_id: &str, now: Instant) -> Self {
        Self {
            server_id: server_id.to_string(),
            new_count: 0,
            updated_count: 0,
            server_missing: false,
            feeds: BTreeSet::new(),
            started_at: now,
            last_activity_at: now,
        }
    }
}

/// Counts of a flushed session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub server_id: String,
    pub new_count: u64,
    pub updated_count: u64,
    pub server_missing: bool,
    pub feeds: Vec<Feed>,
}

impl SessionSummary {
    pub fn into_event(self, timestamp: DateTime<Utc>) -> BlacklistEvent {
        BlacklistEvent::SessionSummary {
            server_id: self.server_id,
            new_count: self.new_count,
            updated_count: self.updated_count,
            feeds: self.feeds,
            timestamp,
        }
    }
}

impl From<SessionAggregate> for SessionSummary {
    fn from(aggregate: SessionAggregate) -> Self {
        Self {
            server_id: aggregate.server_id,
            new_count: aggregate.new_count,
            updated_count: aggregate.updated_count,
            server_missing: aggregate.server_missing,
            feeds: aggregate.feeds.into_iter().collect(),
        }
    }
}

/// Debounced session bookkeeping for every active server
#[derive(Debug)]
pub struct SessionTracker {
    window: Duration,
    sessions: HashMap<String, SessionAggregate>,
}

impl SessionTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            sessions: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn state(&self, server_id: &str) -> SessionState {
        if self.sessions.contains_key(server_id) {
            SessionState::Active
        } else {
            SessionState::Idle
        }
    }

    pub fn get(&self, server_id: &str) -> Option<&SessionAggregate> {
        self.sessions.get(server_id)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Register activity for `server_id`, opening a session when idle and
    /// re-arming the window otherwise. Returns `true` when a session opened.
    ///
    /// Callers must flush expired sessions first, so that activity arriving
    /// after a window elapsed opens a fresh session instead of extending the
    /// old one.
    pub fn touch(&mut self, server_id: &str, feed: Feed, now: Instant) -> bool {
        let mut opened = false;
        let aggregate = self.sessions.entry(server_id.to_string()).or_insert_with(|| {
            opened = true;
            SessionAggregate::new(server_id, now)
        });
        aggregate.feeds.insert(feed);
        aggregate.last_activity_at = now;
        opened
    }

    pub fn is_server_missing(&self, server_id: &str) -> bool {
        self.sessions
            .get(server_id)
            .is_some_and(|aggregate| aggregate.server_missing)
    }

    /// Accumulate an observation's outcome and re-arm the window
    pub fn record(&mut self, server_id: &str, outcome: &ObservationOutcome, now: Instant) {
        let Some(aggregate) = self.sessions.get_mut(server_id) else {
            return;
        };
        match outcome {
            ObservationOutcome::Added => aggregate.new_count += 1,
            ObservationOutcome::Updated => aggregate.updated_count += 1,
            ObservationOutcome::Skipped(_)
            | ObservationOutcome::ServerMissing
            | ObservationOutcome::Failed => {}
        }
        aggregate.last_activity_at = now;
    }

    /// Set the sticky server-missing flag. Returns `true` only the first time
    /// within a session, so the caller reports the server once.
    pub fn mark_server_missing(&mut self, server_id: &str) -> bool {
        match self.sessions.get_mut(server_id) {
            Some(aggregate) if !aggregate.server_missing => {
                aggregate.server_missing = true;
                true
            }
            _ => false,
        }
    }

    /// Earliest instant at which some session's window elapses
    pub fn next_deadline(&self) -> Option<Instant> {
        self.sessions
            .values()
            .map(|aggregate| aggregate.last_activity_at + self.window)
            .min()
    }

    /// Close every session whose window has elapsed at `now`
    pub fn flush_expired(&mut self, now: Instant) -> Vec<SessionSummary> {
        let window = self.window;
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, aggregate)| now >= aggregate.last_activity_at + window)
            .map(|(server_id, _)| server_id.clone())
            .collect();

        let mut summaries: Vec<SessionSummary> = expired
            .into_iter()
            .filter_map(|server_id| self.sessions.remove(&server_id))
            .map(SessionSummary::from)
            .collect();
        summaries.sort_by(|a, b| a.server_id.cmp(&b.server_id));
        summaries
    }

    /// Close every open session regardless of its window (shutdown)
    pub fn flush_all(&mut self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .drain()
            .map(|(_, aggregate)| SessionSummary::from(aggregate))
            .collect();
        summaries.sort_by(|a, b| a.server_id.cmp(&b.server_id));
        summaries
    }
}
