use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::section;

/// A registered page and its snapshot as of the last processed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredTarget {
    pub id: String,
    pub url: String,
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_normalized_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Section-scoped links seen at the last check, one per line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_link_snapshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_new_item_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_new_item_link: Option<String>,
}

impl MonitoredTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            url: url.into(),
            created_at: Utc::now(),
            last_content_hash: None,
            last_normalized_content: None,
            last_checked_at: None,
            last_changed_at: None,
            last_error: None,
            last_link_snapshot: None,
            last_new_item_link: None,
            previous_new_item_link: None,
        }
    }

    pub fn snapshot_links(&self) -> Vec<String> {
        self.last_link_snapshot
            .as_deref()
            .map(|raw| section::parse_snapshot(raw).map(str::to_owned).collect())
            .unwrap_or_default()
    }

    pub fn set_snapshot_links(&mut self, links: &[String]) {
        self.last_link_snapshot = Some(section::join_snapshot(links));
    }
}

/// Immutable history entry written whenever a cycle detects a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageVersion {
    pub version_id: String,
    pub target_id: String,
    pub created_at: DateTime<Utc>,
    pub content_hash: String,
    pub content: String,
}

impl PageVersion {
    pub fn new(
        target_id: impl Into<String>,
        content: impl Into<String>,
        content_hash: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version_id: uuid::Uuid::new_v4().simple().to_string(),
            target_id: target_id.into(),
            created_at,
            content_hash: content_hash.into(),
            content: content.into(),
        }
    }
}
