//! Sync service: fetch a profile's videos and upsert them into Bitable.

use thiserror::Error;
use tracing::{error, info, info_span, Instrument};

use crate::bitable::{BitableWriter, SinkError};
use crate::config::{ConfigError, Settings};
use crate::models::SyncResult;
use crate::scrapers::{DouyinScraper, SourceError};

/// One sync invocation.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Profile URL: long-form, `/user/` path or short link.
    pub url: String,
    pub max_videos: usize,
    pub batch_size: usize,
    /// Rewrite existing records instead of skipping them.
    pub update_existing: bool,
}

impl SyncRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_videos: 1000,
            batch_size: 10,
            update_existing: false,
        }
    }
}

/// Reasons a sync run aborts before producing a result.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not resolve a user id from {0}")]
    UnresolvedProfile(String),

    #[error("no videos fetched from {0}")]
    NoVideos(String),

    #[error("Douyin request failed: {0}")]
    Source(SourceError),

    #[error("Bitable request failed: {0}")]
    Sink(#[from] SinkError),
}

impl From<SourceError> for SyncError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::UnrecognizedProfileUrl(url) => SyncError::UnresolvedProfile(url),
            other => SyncError::Source(other),
        }
    }
}

/// Runs the fetch-then-upsert pipeline.
pub struct SyncService {
    settings: Settings,
}

impl SyncService {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Fetch up to `max_videos` videos and upsert them.
    ///
    /// Configuration is validated before any network call.
    pub async fn run(&self, request: &SyncRequest) -> Result<SyncResult, SyncError> {
        self.settings.validate()?;

        let span = info_span!("sync", url = %request.url);
        async {
            info!(
                max_videos = request.max_videos,
                batch_size = request.batch_size,
                region = self.settings.region.display_name(),
                "Starting sync"
            );

            let scraper = DouyinScraper::new(&self.settings)?
                .with_span(info_span!(parent: &span, "douyin"));
            let videos = scraper.fetch_all(&request.url, request.max_videos).await?;
            if videos.is_empty() {
                error!("No videos fetched");
                return Err(SyncError::NoVideos(request.url.clone()));
            }
            info!("Fetched {} videos, writing to Bitable", videos.len());

            let mut writer = BitableWriter::new(&self.settings)?
                .with_span(info_span!(parent: &span, "bitable"))
                .with_update_existing(request.update_existing);
            let result = writer.batch_upsert(&videos, request.batch_size).await?;

            info!(
                success = result.success_count,
                updated = result.updated_count,
                skipped = result.skipped_count,
                failed = result.failed_count,
                "Sync finished"
            );
            Ok(result)
        }
        .instrument(span.clone())
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_config_fails_before_network() {
        let mut settings = Settings::default();
        settings.web_base_url = "http://127.0.0.1:9".to_string();
        settings.table_id = Some("tbl".to_string());

        let err = SyncService::new(settings)
            .run(&SyncRequest::new("https://www.douyin.com/user/MS4wUSER"))
            .await
            .unwrap_err();

        match err {
            SyncError::Config(ConfigError::Missing(keys)) => {
                assert_eq!(keys, vec!["APP_TOKEN", "PERSONAL_BASE_TOKEN"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unrecognized_url_maps_to_unresolved_profile() {
        let err: SyncError = SourceError::UnrecognizedProfileUrl("https://x".to_string()).into();
        assert!(matches!(err, SyncError::UnresolvedProfile(url) if url == "https://x"));

        let err: SyncError = SourceError::EmptyBody.into();
        assert!(matches!(err, SyncError::Source(_)));
    }
}
