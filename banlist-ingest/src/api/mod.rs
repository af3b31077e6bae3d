//! HTTP API handlers
//!
//! Queue bridge for the live feeds, bulk-run trigger, event stream and
//! health check.

pub mod batch;
pub mod health;
pub mod queue;
pub mod sse;

pub use batch::batch_routes;
pub use health::health_routes;
pub use queue::queue_routes;
pub use sse::event_stream;
