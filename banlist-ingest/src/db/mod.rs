//! Database access for the ingest engine
//!
//! Row-level reads/writes per table plus the transactional apply path.

pub mod imports;
pub mod servers;
pub mod store;
pub mod users;

pub use store::{apply_observation, Applied, ApplyError};
