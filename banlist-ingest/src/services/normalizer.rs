//! Observation normalization
//!
//! Turns feed-specific inbound shapes into the canonical
//! `{serverId, userId, category, roles}` record the reconciler consumes.

use banlist_common::category::chat_user_category;
use banlist_common::models::ModeratedServer;
use banlist_common::Feed;
use serde::{Deserialize, Serialize};

/// Inbound observation as published on the live queues
///
/// `id` and `type` may be absent; such messages are skipped, not rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObservation {
    pub guild_id: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub category: Option<String>,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

/// One entry of a bulk JSON file; the server comes from the file name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub category: Option<String>,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

impl BulkEntry {
    pub fn into_observation(self, server_id: &str) -> RawObservation {
        RawObservation {
            guild_id: server_id.to_string(),
            id: self.id,
            category: self.category,
            roles: self.roles,
        }
    }
}

/// Feed-independent record handed to the reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRecord {
    pub server_id: String,
    pub user_id: Option<String>,
    /// Category label, not yet checked against the precedence table
    pub category: Option<String>,
    pub roles: Vec<String>,
}

/// Normalize a raw observation.
///
/// The chat feed carries no category of its own: its participants take the
/// server's offense label, translated through the chat category table.
/// Labels the table does not know pass through untouched so the reconciler
/// rejects them.
pub fn normalize(feed: Feed, raw: &RawObservation, server: Option<&ModeratedServer>) -> CanonicalRecord {
    let category = match feed {
        Feed::Chat => server
            .and_then(|s| s.offense_category.as_deref())
            .map(|label| {
                chat_user_category(label)
                    .map(|c| c.as_str().to_string())
                    .unwrap_or_else(|| label.to_string())
            }),
        Feed::Scraper | Feed::Bulk => raw.category.clone(),
    };

    CanonicalRecord {
        server_id: raw.guild_id.clone(),
        user_id: non_empty(raw.id.as_deref()),
        category: category.filter(|c| !c.is_empty()),
        roles: raw.roles.clone().unwrap_or_default(),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}
