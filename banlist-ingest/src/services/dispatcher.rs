//! Ingestion dispatcher
//!
//! Every feed submits observations into one bounded queue drained by a
//! single worker. One worker means observations are applied strictly in
//! arrival order, so the reconciler's read-compare-write never races
//! against another write for the same server.
//!
//! The worker also owns the [`SessionTracker`]: it sleeps until the earliest
//! session deadline, flushes expired sessions and publishes their summaries
//! on the [`EventBus`]. When every [`DispatcherHandle`] is dropped the queue
//! drains, remaining sessions are flushed and the worker exits.

use super::reconciler::{Outcome, SkipReason};
use super::session_tracker::{SessionSummary, SessionTracker};
use crate::db::store::{apply_observation, ApplyError};
use crate::services::normalizer::RawObservation;
use crate::utils::retry_on_lock;
use banlist_common::config::{
    TomlConfig, DEFAULT_DIGEST_INTERVAL_SECS, DEFAULT_ITEM_DELAY_MS, DEFAULT_MAX_LOCK_WAIT_MS,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_SESSION_WINDOW_SECS,
};
use banlist_common::{BlacklistEvent, EventBus, Feed};
use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Per-observation result reported back to submitters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationOutcome {
    Added,
    Updated,
    Skipped(SkipReason),
    /// Server not registered (also returned for short-circuited observations)
    ServerMissing,
    /// Storage failure; the observation was dropped
    Failed,
}

impl From<Outcome> for ObservationOutcome {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Added => ObservationOutcome::Added,
            Outcome::Updated => ObservationOutcome::Updated,
            Outcome::Skipped(reason) => ObservationOutcome::Skipped(reason),
        }
    }
}

/// Queue item
#[derive(Debug)]
pub struct Envelope {
    pub feed: Feed,
    pub observation: RawObservation,
    pub reply: Option<oneshot::Sender<ObservationOutcome>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("ingestion dispatcher is closed")]
pub struct DispatcherClosed;

/// Producer side of the dispatcher queue
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<Envelope>,
}

impl DispatcherHandle {
    /// Enqueue an observation; waits while the queue is full
    pub async fn submit(&self, feed: Feed, observation: RawObservation) -> Result<(), DispatcherClosed> {
        self.tx
            .send(Envelope {
                feed,
                observation,
                reply: None,
            })
            .await
            .map_err(|_| DispatcherClosed)
    }

    /// Enqueue an observation and wait until the worker has processed it
    pub async fn submit_and_wait(
        &self,
        feed: Feed,
        observation: RawObservation,
    ) -> Result<ObservationOutcome, DispatcherClosed> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                feed,
                observation,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| DispatcherClosed)?;
        reply_rx.await.map_err(|_| DispatcherClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Worker settings
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub session_window: Duration,
    pub item_delay: Duration,
    /// Chat-feed digest period, `None` disables
    pub digest_interval: Option<Duration>,
    pub queue_capacity: usize,
    pub max_lock_wait_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            session_window: Duration::from_secs(DEFAULT_SESSION_WINDOW_SECS),
            item_delay: Duration::from_millis(DEFAULT_ITEM_DELAY_MS),
            digest_interval: Some(Duration::from_secs(DEFAULT_DIGEST_INTERVAL_SECS)),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }
}

impl From<&TomlConfig> for DispatcherConfig {
    fn from(config: &TomlConfig) -> Self {
        Self {
            session_window: config.session_window(),
            item_delay: config.item_delay(),
            digest_interval: config.digest_interval(),
            queue_capacity: config.queue_capacity,
            max_lock_wait_ms: config.max_lock_wait_ms,
        }
    }
}

/// Running totals for the chat-feed digest
#[derive(Debug, Default, Clone, Copy)]
struct FeedTotals {
    new_count: u64,
    updated_count: u64,
}

/// Consumer side of the dispatcher queue
pub struct Dispatcher {
    rx: mpsc::Receiver<Envelope>,
    worker: Worker,
}

struct Worker {
    db: SqlitePool,
    event_bus: EventBus,
    config: DispatcherConfig,
    tracker: SessionTracker,
    chat_totals: FeedTotals,
}

impl Dispatcher {
    pub fn new(db: SqlitePool, event_bus: EventBus, config: DispatcherConfig) -> (Self, DispatcherHandle) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let dispatcher = Self {
            rx,
            worker: Worker {
                db,
                event_bus,
                tracker: SessionTracker::new(config.session_window),
                chat_totals: FeedTotals::default(),
                config,
            },
        };
        (dispatcher, DispatcherHandle { tx })
    }

    /// Drain the queue until every handle is dropped, then flush open sessions
    pub async fn run(self) {
        let Dispatcher { mut rx, mut worker } = self;

        let mut digest = worker.config.digest_interval.map(|period| {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        info!(
            window_secs = worker.config.session_window.as_secs(),
            queue_capacity = worker.config.queue_capacity,
            "Ingestion dispatcher started"
        );

        loop {
            let next_deadline = worker.tracker.next_deadline();

            tokio::select! {
                envelope = rx.recv() => {
                    match envelope {
                        Some(envelope) => worker.handle(envelope).await,
                        None => break,
                    }
                }
                () = async {
                    if let Some(deadline) = next_deadline {
                        time::sleep_until(deadline).await;
                    }
                }, if next_deadline.is_some() => {
                    worker.flush_expired(Instant::now());
                }
                () = tick(&mut digest), if digest.is_some() => {
                    worker.emit_chat_digest();
                }
            }
        }

        worker.flush_all();
        worker.emit_chat_digest();
        info!("Ingestion dispatcher stopped");
    }
}

async fn tick(interval: &mut Option<Interval>) {
    if let Some(interval) = interval.as_mut() {
        interval.tick().await;
    }
}

impl Worker {
    async fn handle(&mut self, envelope: Envelope) {
        let Envelope {
            feed,
            observation,
            reply,
        } = envelope;
        let server_id = observation.guild_id.clone();

        // A session whose window already elapsed must close before this
        // observation opens the next one.
        let now = Instant::now();
        self.flush_expired(now);

        if self.tracker.touch(&server_id, feed, now) {
            debug!(server_id = %server_id, feed = %feed, "Session opened");
        }

        let outcome = if self.tracker.is_server_missing(&server_id) {
            ObservationOutcome::ServerMissing
        } else {
            self.apply(feed, &observation).await
        };

        if outcome == ObservationOutcome::ServerMissing && self.tracker.mark_server_missing(&server_id) {
            warn!(server_id = %server_id, feed = %feed, "Observation for unregistered server");
            self.event_bus.emit_lossy(BlacklistEvent::ServerMissing {
                server_id: server_id.clone(),
                feed,
                timestamp: Utc::now(),
            });
        }

        self.tracker.record(&server_id, &outcome, Instant::now());

        if feed == Feed::Chat {
            match outcome {
                ObservationOutcome::Added => self.chat_totals.new_count += 1,
                ObservationOutcome::Updated => self.chat_totals.updated_count += 1,
                _ => {}
            }
        }

        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }

        if !self.config.item_delay.is_zero() {
            time::sleep(self.config.item_delay).await;
        }
    }

    async fn apply(&self, feed: Feed, observation: &RawObservation) -> ObservationOutcome {
        let result = retry_on_lock("apply observation", self.config.max_lock_wait_ms, || {
            apply_observation(&self.db, feed, observation, Utc::now())
        })
        .await;

        match result {
            Ok(applied) => {
                let outcome = ObservationOutcome::from(applied.reconciliation.outcome);
                let user_id = applied.record.user_id.as_deref().unwrap_or_default();
                debug!(
                    server_id = %applied.record.server_id,
                    user_id = %user_id,
                    feed = %feed,
                    outcome = ?outcome,
                    "Observation processed"
                );

                if outcome == ObservationOutcome::Skipped(SkipReason::Whitelisted) {
                    info!(
                        server_id = %applied.record.server_id,
                        user_id = %user_id,
                        "Whitelisted user found in server"
                    );
                    self.event_bus.emit_lossy(BlacklistEvent::WhitelistHit {
                        user_id: user_id.to_string(),
                        server_id: applied.record.server_id.clone(),
                        roles: applied.record.roles.clone(),
                        feed,
                        timestamp: Utc::now(),
                    });
                }
                outcome
            }
            Err(ApplyError::UnknownServer(_)) => ObservationOutcome::ServerMissing,
            Err(ApplyError::Storage(err)) => {
                error!(
                    server_id = %observation.guild_id,
                    feed = %feed,
                    error = %err,
                    "Failed to apply observation, dropping it"
                );
                ObservationOutcome::Failed
            }
        }
    }

    fn flush_expired(&mut self, now: Instant) {
        for summary in self.tracker.flush_expired(now) {
            self.publish_summary(summary);
        }
    }

    fn flush_all(&mut self) {
        for summary in self.tracker.flush_all() {
            self.publish_summary(summary);
        }
    }

    fn publish_summary(&self, summary: SessionSummary) {
        info!(
            server_id = %summary.server_id,
            new_count = summary.new_count,
            updated_count = summary.updated_count,
            server_missing = summary.server_missing,
            "Session complete"
        );
        self.event_bus.emit_lossy(summary.into_event(Utc::now()));
    }

    fn emit_chat_digest(&mut self) {
        let totals = std::mem::take(&mut self.chat_totals);
        if totals.new_count == 0 && totals.updated_count == 0 {
            return;
        }
        info!(
            new_count = totals.new_count,
            updated_count = totals.updated_count,
            "Chat feed digest"
        );
        self.event_bus.emit_lossy(BlacklistEvent::FeedDigest {
            feed: Feed::Chat,
            new_count: totals.new_count,
            updated_count: totals.updated_count,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_reconciler() {
        assert_eq!(ObservationOutcome::from(Outcome::Added), ObservationOutcome::Added);
        assert_eq!(
            ObservationOutcome::from(Outcome::Skipped(SkipReason::Whitelisted)),
            ObservationOutcome::Skipped(SkipReason::Whitelisted)
        );
    }

    #[test]
    fn test_config_from_toml() {
        let toml = TomlConfig {
            session_window_secs: 5,
            item_delay_ms: 0,
            digest_interval_secs: 0,
            ..TomlConfig::default()
        };
        let config = DispatcherConfig::from(&toml);
        assert_eq!(config.session_window, Duration::from_secs(5));
        assert!(config.item_delay.is_zero());
        assert!(config.digest_interval.is_none());
    }

    #[tokio::test]
    async fn test_submit_after_worker_dropped_fails() {
        let pool = banlist_common::db::init_memory_database().await.unwrap();
        let (dispatcher, handle) = Dispatcher::new(pool, EventBus::new(4), DispatcherConfig::default());
        drop(dispatcher);

        let observation = RawObservation {
            guild_id: "s1".to_string(),
            id: None,
            category: None,
            roles: None,
        };
        assert!(handle.is_closed());
        assert_eq!(handle.submit(Feed::Scraper, observation).await, Err(DispatcherClosed));
    }
}
