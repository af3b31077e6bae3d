//! Storage models
//!
//! Rows of the `BadServers`, `Users` and `Imports` tables.

use crate::category::Category;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display name given to users first seen through an import
pub const PLACEHOLDER_USERNAME: &str = "EMPTY";

/// Avatar given to users first seen through an import
pub const PLACEHOLDER_AVATAR: &str = "https://cdn.discordapp.com/embed/avatars/0.png";

/// Separator used when storing role labels
pub const ROLE_SEPARATOR: &str = ", ";

/// A registered source server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratedServer {
    pub server_id: String,
    /// Server's own offense label (`BadServers.type`), used by the chat feed
    pub offense_category: Option<String>,
}

/// Moderation status of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    None,
    Blacklisted,
    PermBlacklisted,
    /// Operator override; frozen against automated mutation
    Whitelisted,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::None => "NONE",
            UserStatus::Blacklisted => "BLACKLISTED",
            UserStatus::PermBlacklisted => "PERM_BLACKLISTED",
            UserStatus::Whitelisted => "WHITELISTED",
        }
    }

    pub fn parse(label: &str) -> Option<UserStatus> {
        match label {
            "NONE" => Some(UserStatus::None),
            "BLACKLISTED" => Some(UserStatus::Blacklisted),
            "PERM_BLACKLISTED" => Some(UserStatus::PermBlacklisted),
            "WHITELISTED" => Some(UserStatus::Whitelisted),
            _ => None,
        }
    }

    /// Status earned by an observation of `category`, given the current status.
    ///
    /// A permanent blacklist is never downgraded.
    pub fn derive(category: Category, current: Option<UserStatus>) -> UserStatus {
        if category.is_permanent() || current == Some(UserStatus::PermBlacklisted) {
            UserStatus::PermBlacklisted
        } else {
            UserStatus::Blacklisted
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A moderation subject (`Users` row)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub last_username: String,
    pub avatar: String,
    /// Global category, the most severe ever observed
    pub category: Category,
    pub status: UserStatus,
}

impl UserRecord {
    /// New user with placeholder profile fields
    pub fn placeholder(user_id: &str, category: Category, status: UserStatus) -> Self {
        Self {
            user_id: user_id.to_string(),
            last_username: PLACEHOLDER_USERNAME.to_string(),
            avatar: PLACEHOLDER_AVATAR.to_string(),
            category,
            status,
        }
    }
}

/// "User X was observed in server Y" (`Imports` row)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportAssociation {
    pub user_id: String,
    pub server_id: String,
    /// Category within this server; independent of the user's global category
    pub category: Category,
    pub roles: Vec<String>,
    pub appealed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reason: String,
}

impl ImportAssociation {
    /// Roles as stored
    pub fn roles_label(&self) -> String {
        join_roles(&self.roles)
    }
}

/// Join role labels for storage
pub fn join_roles(roles: &[String]) -> String {
    roles.join(ROLE_SEPARATOR)
}

/// Split a stored role label
pub fn split_roles(stored: &str) -> Vec<String> {
    if stored.is_empty() {
        return Vec::new();
    }
    stored.split(ROLE_SEPARATOR).map(str::to_string).collect()
}

/// Parse a stored category, failing on labels outside the precedence table
pub fn parse_stored_category(label: &str, context: &str) -> Result<Category> {
    Category::parse(label)
        .ok_or_else(|| Error::InvalidInput(format!("unknown category '{}' stored for {}", label, context)))
}

/// Parse a stored status; NULL reads as `NONE`
pub fn parse_stored_status(label: Option<&str>, context: &str) -> Result<UserStatus> {
    match label {
        None => Ok(UserStatus::None),
        Some(label) => UserStatus::parse(label)
            .ok_or_else(|| Error::InvalidInput(format!("unknown status '{}' stored for {}", label, context))),
    }
}
