//! Persisted data model for extension recommendations.
//!
//! The whole model lives in a single JSON file. Field names are camelCase
//! and timestamps are epoch milliseconds so the file stays readable by
//! other recommender implementations sharing the same directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Root persisted entity, one per backing directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationModel {
    /// Time of the last successful write.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,

    /// Host session that last wrote the model.
    pub session_id: String,

    /// When that session started writing.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub session_timestamp: DateTime<Utc>,

    /// Ids suppressed for the rest of the current session. Cleared on rollover.
    #[serde(default)]
    pub timelocked: Vec<String>,

    /// Recommendations in insertion order.
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
}

impl RecommendationModel {
    /// Creates an empty model owned by the given session.
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            last_updated: now,
            session_id: session_id.into(),
            session_timestamp: now,
            timelocked: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    /// Finds the record for an exact source/target pair.
    pub fn find(&self, source_id: &str, extension_id: &str) -> Option<&Recommendation> {
        self.recommendations
            .iter()
            .find(|r| r.matches(source_id, extension_id))
    }

    /// Returns every record recommending the given target.
    pub fn for_target<'a>(&'a self, extension_id: &'a str) -> impl Iterator<Item = &'a Recommendation> + 'a {
        self.recommendations
            .iter()
            .filter(move |r| r.extension_id == extension_id)
    }

    /// Distinct target ids in order of first appearance.
    pub fn target_ids(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for rec in &self.recommendations {
            if !seen.contains(&rec.extension_id.as_str()) {
                seen.push(&rec.extension_id);
            }
        }
        seen
    }

    /// Whether the target is suppressed for the remainder of this session.
    pub fn is_timelocked(&self, id: &str) -> bool {
        self.timelocked.iter().any(|t| t == id)
    }
}

/// One advertised source -> target relationship.
///
/// `(source_id, extension_id)` is the natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// The recommending extension.
    pub source_id: String,

    /// The recommended extension.
    pub extension_id: String,

    /// Human label for the target as supplied by the source.
    pub extension_display_name: String,

    /// Why the source recommends the target.
    pub description: String,

    /// Whether this entry participates in the startup batch.
    pub should_show_on_startup: bool,

    /// Creation time. Never mutated.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Sticky "never show again" flag.
    #[serde(default)]
    pub user_ignored: bool,
}

impl Recommendation {
    pub fn new(
        source_id: impl Into<String>,
        extension_id: impl Into<String>,
        extension_display_name: impl Into<String>,
        description: impl Into<String>,
        should_show_on_startup: bool,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            extension_id: extension_id.into(),
            extension_display_name: extension_display_name.into(),
            description: description.into(),
            should_show_on_startup,
            timestamp: Utc::now(),
            user_ignored: false,
        }
    }

    /// Key match on `(source_id, extension_id)`.
    pub fn matches(&self, source_id: &str, extension_id: &str) -> bool {
        self.source_id == source_id && self.extension_id == extension_id
    }

    /// Whether two records share the same natural key.
    pub fn same_key(&self, other: &Recommendation) -> bool {
        self.matches(&other.source_id, &other.extension_id)
    }
}

/// The user's answer to a recommendation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserChoice {
    Install,
    Never,
    Later,
}

impl UserChoice {
    /// Choices offered in every prompt, in display order.
    pub const ALL: [UserChoice; 3] = [UserChoice::Install, UserChoice::Never, UserChoice::Later];
}

impl std::fmt::Display for UserChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserChoice::Install => write!(f, "Install"),
            UserChoice::Never => write!(f, "Never"),
            UserChoice::Later => write!(f, "Later"),
        }
    }
}
