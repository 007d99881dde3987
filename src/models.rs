//! Domain models shared by the scraper, the Bitable writer and the sync service.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single Douyin post, flattened from the listing API's nested item.
///
/// Built once by [`crate::scrapers::douyin::parse_item`] and consumed by the
/// Bitable writer. Counters default to zero and strings to empty when the
/// upstream item omits them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Platform-assigned post id (`aweme_id`). Natural key in the sink table.
    pub aweme_id: String,
    /// Post description, used as the title.
    pub title: String,
    pub author_name: String,
    pub author_uid: String,
    /// Creation time in epoch seconds.
    pub create_timestamp: i64,
    /// Creation time formatted as `%Y-%m-%d %H:%M:%S` in local time.
    pub create_time: String,
    pub digg_count: u64,
    pub comment_count: u64,
    pub share_count: u64,
    pub play_count: u64,
    pub collect_count: u64,
    pub cover_url: String,
    pub video_url: String,
    /// Duration as reported by the platform.
    pub duration: u64,
}

impl VideoRecord {
    /// Records without an id come from items that could not be parsed.
    pub fn is_empty(&self) -> bool {
        self.aweme_id.is_empty()
    }
}

/// Outcome of a single record in a sync batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Success,
    Updated,
    Skipped,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Success => "success",
            RecordStatus::Updated => "updated",
            RecordStatus::Skipped => "skipped",
            RecordStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-record line of a [`SyncResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDetail {
    pub aweme_id: String,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Accumulated result of one `batch_upsert` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub total: usize,
    pub success_count: usize,
    pub updated_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub details: Vec<RecordDetail>,
}

impl SyncResult {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Record an outcome and bump the matching counter.
    pub fn push(&mut self, aweme_id: &str, status: RecordStatus, reason: Option<String>) {
        match status {
            RecordStatus::Success => self.success_count += 1,
            RecordStatus::Updated => self.updated_count += 1,
            RecordStatus::Skipped => self.skipped_count += 1,
            RecordStatus::Failed => self.failed_count += 1,
        }
        self.details.push(RecordDetail {
            aweme_id: aweme_id.to_string(),
            status,
            reason,
        });
    }

    /// Mark every record as failed with the same reason.
    pub fn fail_all<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>, reason: &str) {
        for id in ids {
            self.push(id, RecordStatus::Failed, Some(reason.to_string()));
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count > 0
    }
}
