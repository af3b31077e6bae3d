//! Ingestion services
//!
//! Pure reconciliation and session logic plus the worker, feeds and sinks
//! built on top of them.

pub mod dispatcher;
pub mod file_batch;
pub mod normalizer;
pub mod notifier;
pub mod reconciler;
pub mod session_tracker;

pub use dispatcher::{
    Dispatcher, DispatcherClosed, DispatcherConfig, DispatcherHandle, Envelope, ObservationOutcome,
};
pub use file_batch::{run_batch, BatchError, BatchReport};
pub use normalizer::{normalize, BulkEntry, CanonicalRecord, RawObservation};
pub use notifier::{run_notifier, LogSink, NotificationSink, NotifyError, WebhookSink};
pub use reconciler::{reconcile, Outcome, Reconciliation, SkipReason, UnknownServerError};
pub use session_tracker::{SessionState, SessionSummary, SessionTracker};
