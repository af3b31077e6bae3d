//! # Banlist Common Library
//!
//! Shared code for the banlist services including:
//! - Offense category precedence and the chat-feed translation table
//! - Storage models for servers, users and import associations
//! - Outbound event types and the EventBus
//! - Configuration loading
//! - Database schema initialization

pub mod category;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;

pub use category::Category;
pub use error::{Error, Result};
pub use events::{BlacklistEvent, EventBus, Feed};
