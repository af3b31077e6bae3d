//! Offense category precedence
//!
//! Categories are totally ordered from least to most severe. Every severity
//! comparison in the system goes through [`Category::rank`]; labels that do
//! not name a known category have no rank and must be rejected by the caller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Offense category of a moderated user, least severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// Catch-all
    Other,
    /// Content leaking
    Leaker,
    /// Cheating
    Cheater,
    /// Paid support of a flagged server
    Supporter,
    /// Ownership of a flagged server
    Owner,
}

/// Precedence table, index = rank
pub const PRECEDENCE: [Category; 5] = [
    Category::Other,
    Category::Leaker,
    Category::Cheater,
    Category::Supporter,
    Category::Owner,
];

/// Server offense label → user category, applied to chat-log participants.
///
/// Several server labels collapse onto the catch-all on purpose. Labels not
/// listed here pass through unchanged and are parsed as user categories.
pub const CHAT_CATEGORY_MAP: &[(&str, Category)] = &[
    ("CHEATING", Category::Cheater),
    ("RESELLING", Category::Other),
    ("ADVERTISING", Category::Other),
    ("OTHER", Category::Other),
    ("LEAKING", Category::Leaker),
];

impl Category {
    /// Position in [`PRECEDENCE`]
    pub fn rank(self) -> u8 {
        match self {
            Category::Other => 0,
            Category::Leaker => 1,
            Category::Cheater => 2,
            Category::Supporter => 3,
            Category::Owner => 4,
        }
    }

    /// Storage / wire label
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Other => "OTHER",
            Category::Leaker => "LEAKER",
            Category::Cheater => "CHEATER",
            Category::Supporter => "SUPPORTER",
            Category::Owner => "OWNER",
        }
    }

    /// Parse a storage / wire label. Matching is exact.
    pub fn parse(label: &str) -> Option<Category> {
        PRECEDENCE.iter().copied().find(|c| c.as_str() == label)
    }

    /// Categories that earn a permanent blacklist
    pub fn is_permanent(self) -> bool {
        matches!(self, Category::Supporter | Category::Owner)
    }

    /// More severe of `a` and `b`; ties return `a`
    pub fn max(a: Category, b: Category) -> Category {
        if b.rank() > a.rank() {
            b
        } else {
            a
        }
    }
}

/// Rank of a raw label, `None` when the label is not a known category
pub fn rank(label: &str) -> Option<u8> {
    Category::parse(label).map(Category::rank)
}

/// Translate a server's offense label into the category its chat
/// participants receive.
pub fn chat_user_category(server_label: &str) -> Option<Category> {
    CHAT_CATEGORY_MAP
        .iter()
        .find(|(label, _)| *label == server_label)
        .map(|(_, category)| *category)
        .or_else(|| Category::parse(server_label))
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for labels outside the precedence table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::parse(s).ok_or_else(|| UnknownCategory(s.to_string()))
    }
}
