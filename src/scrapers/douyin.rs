//! Douyin user post scraper.
//!
//! Resolves a profile URL to a `sec_user_id`, then walks the post listing
//! with cursor pagination. Every page is requested with the configured
//! [`RequestVariant`]s in order; the first one that decodes to a valid page
//! wins, except that an empty first page lets later variants try. A page that no variant can fetch within the retry budget is treated
//! as the end of the listing.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use url::Url;

use super::http_client::HttpClient;
use super::request_variant::{Page, PageRequest, RequestVariant};
use super::SourceError;
use crate::config::Settings;
use crate::mapper;
use crate::models::VideoRecord;
use crate::retry::{retry, RetryPolicy};

/// Patterns tried in order against the (possibly redirected) profile URL.
static USER_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"sec_user_id=([^&#]+)", r"/user/([^/?#]+)", r"sec_uid=([^&#]+)"]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

/// Extract the `sec_user_id` from a profile URL without any network access.
pub fn extract_user_id(url: &str) -> Option<String> {
    USER_ID_PATTERNS
        .iter()
        .filter_map(|re| re.captures(url))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .find(|id| !id.is_empty())
}

/// Scraper for one user's post listing.
pub struct DouyinScraper {
    http: HttpClient,
    web_base_url: String,
    api_base_url: String,
    variants: Vec<RequestVariant>,
    short_link_hosts: Vec<String>,
    page_size: usize,
    page_delay: Duration,
    retry: RetryPolicy,
    span: Span,
}

impl DouyinScraper {
    pub fn new(settings: &Settings) -> Result<Self, SourceError> {
        let http = HttpClient::with_user_agent(
            settings.request_timeout(),
            settings.user_agent.as_deref(),
        )?;

        let variants = if settings.request_variants.is_empty() {
            RequestVariant::default_order()
        } else {
            settings.request_variants.clone()
        };

        Ok(Self {
            http,
            web_base_url: settings.web_base_url.clone(),
            api_base_url: settings.api_base_url.clone(),
            variants,
            short_link_hosts: settings.short_link_hosts.clone(),
            page_size: settings.page_size.max(1),
            page_delay: Duration::from_millis(settings.page_delay_ms),
            retry: settings.source_retry.clone(),
            span: info_span!("douyin"),
        })
    }

    /// Attach the span all of this scraper's log lines are recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    fn is_short_link(&self, url: &str) -> bool {
        let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) else {
            return false;
        };
        self.short_link_hosts
            .iter()
            .any(|h| host == *h || host.ends_with(&format!(".{}", h)))
    }

    /// Resolve a profile URL to its `sec_user_id`.
    ///
    /// Short links are followed first. Returns `None` when no pattern
    /// matches.
    pub async fn resolve_user_id(&self, url: &str) -> Option<String> {
        async {
            let url = url.trim();
            let target = if self.is_short_link(url) {
                match self.http.resolve_redirect(url).await {
                    Ok(resolved) => {
                        debug!("Short link {} resolved to {}", url, resolved);
                        resolved
                    }
                    Err(e) => {
                        warn!("Failed to resolve short link {}: {}", url, e);
                        url.to_string()
                    }
                }
            } else {
                url.to_string()
            };

            let user_id = extract_user_id(&target);
            match &user_id {
                Some(id) => info!("Resolved user id: {}", id),
                None => warn!("Could not extract a user id from {}", target),
            }
            user_id
        }
        .instrument(self.span.clone())
        .await
    }

    /// Fetch one listing page.
    ///
    /// Transient failures are retried with backoff. Once the retry budget is
    /// spent an empty page is returned, which callers treat as end of data.
    pub async fn fetch_page(&self, sec_user_id: &str, max_cursor: i64, count: usize) -> Page {
        let req = PageRequest {
            sec_user_id,
            max_cursor,
            count,
        };

        retry(&self.retry, "fetch page", || self.try_variants(&req))
            .instrument(self.span.clone())
            .await
            .unwrap_or_else(|e| {
                warn!(parent: &self.span, max_cursor, "Giving up on page: {}", e);
                Page::default()
            })
    }

    /// Walk the variant list once, returning the first valid page.
    ///
    /// An empty first page does not win outright: some endpoints answer
    /// unsigned requests with a well-formed empty listing, so later variants
    /// get a chance before the empty page is accepted.
    async fn try_variants(&self, req: &PageRequest<'_>) -> Result<Page, SourceError> {
        let mut last_error = SourceError::Malformed("no request variants configured".to_string());
        let mut empty_first_page: Option<Page> = None;
        for variant in &self.variants {
            match self.request_variant(*variant, req).await {
                Ok(page) if page.is_empty() && req.max_cursor == 0 => {
                    debug!(variant = variant.name(), "First page came back empty, trying next variant");
                    empty_first_page.get_or_insert(page);
                }
                Ok(page) => {
                    debug!(
                        variant = variant.name(),
                        items = page.items.len(),
                        has_more = page.has_more,
                        "Page fetched"
                    );
                    return Ok(page);
                }
                Err(e) => {
                    debug!(variant = variant.name(), "Request variant failed: {}", e);
                    last_error = e;
                }
            }
        }
        empty_first_page.ok_or(last_error)
    }

    async fn request_variant(
        &self,
        variant: RequestVariant,
        req: &PageRequest<'_>,
    ) -> Result<Page, SourceError> {
        let shape = variant.build(&self.web_base_url, &self.api_base_url, req);
        let response = self.http.get(&shape.url, &shape.query, &shape.headers).await?;
        if !response.is_success() {
            return Err(SourceError::Status(response.status.as_u16()));
        }
        let body = response.text().await?;
        variant.decode(&body)
    }

    /// Fetch up to `max_videos` posts from the profile at `url`.
    pub async fn fetch_all(&self, url: &str, max_videos: usize) -> Result<Vec<VideoRecord>, SourceError> {
        let sec_user_id = self
            .resolve_user_id(url)
            .await
            .ok_or_else(|| SourceError::UnrecognizedProfileUrl(url.to_string()))?;

        async {
            let mut videos: Vec<VideoRecord> = Vec::new();
            let mut seen: HashSet<String> = HashSet::new();
            let mut cursor = 0i64;
            let mut page_number = 0u32;

            while videos.len() < max_videos {
                page_number += 1;
                let count = self.page_size.min(max_videos - videos.len());
                let page = self.fetch_page(&sec_user_id, cursor, count).await;

                if page.is_empty() {
                    info!(page_number, "No more videos");
                    break;
                }

                let before = videos.len();
                for item in &page.items {
                    if videos.len() >= max_videos {
                        break;
                    }
                    let record = parse_item(item);
                    if record.is_empty() {
                        debug!("Skipping unparseable item");
                        continue;
                    }
                    if !seen.insert(record.aweme_id.clone()) {
                        debug!(aweme_id = %record.aweme_id, "Skipping duplicate item");
                        continue;
                    }
                    videos.push(record);
                }
                let added = videos.len() - before;

                info!(
                    page_number,
                    added,
                    fetched = videos.len(),
                    has_more = page.has_more,
                    "Fetched page"
                );

                if !page.has_more || videos.len() >= max_videos {
                    break;
                }
                if page.next_cursor == cursor {
                    warn!(cursor, "Cursor did not advance, stopping");
                    break;
                }
                if added == 0 {
                    warn!(cursor, "Page added no new videos, stopping");
                    break;
                }
                cursor = page.next_cursor;
                tokio::time::sleep(self.page_delay).await;
            }

            videos.truncate(max_videos);
            info!("Fetched {} videos in total", videos.len());
            Ok(videos)
        }
        .instrument(self.span.clone())
        .await
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawItem {
    #[serde(deserialize_with = "lenient_string")]
    aweme_id: String,
    #[serde(deserialize_with = "lenient_string")]
    desc: String,
    #[serde(deserialize_with = "lenient_i64")]
    create_time: i64,
    author: Option<RawAuthor>,
    statistics: Option<RawStatistics>,
    video: Option<RawVideo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAuthor {
    #[serde(deserialize_with = "lenient_string")]
    nickname: String,
    #[serde(deserialize_with = "lenient_string")]
    uid: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStatistics {
    #[serde(deserialize_with = "lenient_u64")]
    digg_count: u64,
    #[serde(deserialize_with = "lenient_u64")]
    comment_count: u64,
    #[serde(deserialize_with = "lenient_u64")]
    share_count: u64,
    #[serde(deserialize_with = "lenient_u64")]
    play_count: u64,
    #[serde(deserialize_with = "lenient_u64")]
    collect_count: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawVideo {
    cover: Option<RawUrlList>,
    play_addr: Option<RawUrlList>,
    #[serde(deserialize_with = "lenient_u64")]
    duration: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawUrlList {
    url_list: Option<Vec<Value>>,
}

impl RawUrlList {
    fn first(list: Option<&RawUrlList>) -> String {
        list.and_then(|l| l.url_list.as_ref())
            .and_then(|urls| urls.first())
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

/// Flatten one raw listing item into a [`VideoRecord`].
///
/// Missing blocks default to empty strings and zeros. Anything that is not an
/// item object yields an empty record.
pub fn parse_item(raw: &Value) -> VideoRecord {
    if !raw.is_object() {
        return VideoRecord::default();
    }
    let item = match RawItem::deserialize(raw) {
        Ok(item) => item,
        Err(e) => {
            debug!("Failed to parse item: {}", e);
            return VideoRecord::default();
        }
    };

    let author = item.author.unwrap_or_default();
    let stats = item.statistics.unwrap_or_default();
    let video = item.video.unwrap_or_default();

    let create_time = if item.create_time > 0 {
        mapper::format_local(item.create_time)
    } else {
        String::new()
    };

    VideoRecord {
        aweme_id: item.aweme_id,
        title: item.desc,
        author_name: author.nickname,
        author_uid: author.uid,
        create_timestamp: item.create_time,
        create_time,
        digg_count: stats.digg_count,
        comment_count: stats.comment_count,
        share_count: stats.share_count,
        play_count: stats.play_count,
        collect_count: stats.collect_count,
        cover_url: RawUrlList::first(video.cover.as_ref()),
        video_url: RawUrlList::first(video.play_addr.as_ref()),
        duration: video.duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LISTING: &str = "/aweme/v1/web/aweme/post/";
    const HYBRID: &str = "/api/douyin/web/fetch_user_post_videos";

    fn settings_for(server: &MockServer) -> Settings {
        let mut settings = Settings::default().without_delays();
        settings.web_base_url = server.uri();
        settings.api_base_url = server.uri();
        settings.request_variants = vec![RequestVariant::Web];
        settings.short_link_hosts = vec!["127.0.0.1".to_string()];
        settings.source_retry = RetryPolicy::immediate(3);
        settings
    }

    fn item(id: usize) -> Value {
        json!({
            "aweme_id": format!("7{:018}", id),
            "desc": format!("video {}", id),
            "create_time": 1_700_000_000 + id as i64,
            "author": {"nickname": "creator", "uid": "1001"},
            "statistics": {"digg_count": 10, "comment_count": 2, "share_count": 1,
                           "play_count": 500, "collect_count": 3},
            "video": {
                "cover": {"url_list": ["https://p3.example/cover.jpg"]},
                "play_addr": {"url_list": ["https://v3.example/play.mp4", "https://backup"]},
                "duration": 15000
            }
        })
    }

    fn listing(ids: std::ops::Range<usize>, has_more: i64, max_cursor: i64) -> Value {
        json!({
            "status_code": 0,
            "aweme_list": ids.map(item).collect::<Vec<_>>(),
            "has_more": has_more,
            "max_cursor": max_cursor
        })
    }

    #[test]
    fn test_extract_user_id_shapes() {
        let id = "MS4wLjABAAAAabc-123_x";
        let expected = Some(id.to_string());
        assert_eq!(
            extract_user_id(&format!(
                "https://www.douyin.com/aweme/v1/web/aweme/post/?sec_user_id={id}&count=20"
            )),
            expected
        );
        assert_eq!(
            extract_user_id(&format!("https://www.douyin.com/user/{id}?from_tab_name=main")),
            expected
        );
        assert_eq!(
            extract_user_id(&format!("https://www.iesdouyin.com/share/profile?sec_uid={id}&u_code=1")),
            expected
        );
        assert_eq!(extract_user_id("https://www.douyin.com/discover"), None);
    }

    #[test]
    fn test_parse_item_full() {
        let record = parse_item(&item(1));
        assert_eq!(record.aweme_id, "7000000000000000001");
        assert_eq!(record.title, "video 1");
        assert_eq!(record.author_name, "creator");
        assert_eq!(record.author_uid, "1001");
        assert_eq!(record.create_timestamp, 1_700_000_001);
        assert_eq!(record.create_time, mapper::format_local(1_700_000_001));
        assert_eq!(record.play_count, 500);
        assert_eq!(record.collect_count, 3);
        assert_eq!(record.cover_url, "https://p3.example/cover.jpg");
        assert_eq!(record.video_url, "https://v3.example/play.mp4");
        assert_eq!(record.duration, 15000);
    }

    #[test]
    fn test_parse_item_missing_blocks_defaults() {
        let record = parse_item(&json!({"aweme_id": "42", "author": null, "video": {}}));
        assert_eq!(record.aweme_id, "42");
        assert_eq!(record.title, "");
        assert_eq!(record.author_name, "");
        assert_eq!(record.digg_count, 0);
        assert_eq!(record.create_time, "");
        assert_eq!(record.video_url, "");
        assert_eq!(record.duration, 0);
    }

    #[test]
    fn test_parse_item_lenient_scalars() {
        let record = parse_item(&json!({
            "aweme_id": 42,
            "statistics": {"digg_count": "17", "play_count": null},
            "create_time": "1700000000"
        }));
        assert_eq!(record.aweme_id, "42");
        assert_eq!(record.digg_count, 17);
        assert_eq!(record.play_count, 0);
        assert_eq!(record.create_timestamp, 1_700_000_000);
    }

    #[test]
    fn test_parse_item_non_object_is_empty() {
        assert!(parse_item(&json!("garbage")).is_empty());
        assert!(parse_item(&json!([1, 2, 3])).is_empty());
    }

    #[tokio::test]
    async fn test_resolve_user_id_follows_short_link() {
        let server = MockServer::start().await;
        Mock::given(path("/AbCdEf/"))
            .respond_with(ResponseTemplate::new(302).insert_header(
                "location",
                format!("{}/user/MS4wSHORT?from=share", server.uri()),
            ))
            .mount(&server)
            .await;
        Mock::given(path("/user/MS4wSHORT"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let scraper = DouyinScraper::new(&settings_for(&server)).unwrap();
        let id = scraper
            .resolve_user_id(&format!("{}/AbCdEf/", server.uri()))
            .await;
        assert_eq!(id.as_deref(), Some("MS4wSHORT"));
    }

    #[tokio::test]
    async fn test_fetch_page_retries_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(0..3, 0, 0)))
            .mount(&server)
            .await;

        let scraper = DouyinScraper::new(&settings_for(&server)).unwrap();
        let page = scraper.fetch_page("MS4wUSER", 0, 20).await;
        assert_eq!(page.items.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_page_returns_empty_after_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status_code": 2053})),
            )
            .expect(3)
            .mount(&server)
            .await;

        let scraper = DouyinScraper::new(&settings_for(&server)).unwrap();
        let page = scraper.fetch_page("MS4wUSER", 0, 20).await;
        assert!(page.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_fetch_page_falls_through_variants() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(HYBRID))
            .and(query_param("sec_user_id", "MS4wUSER"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "data": {"aweme_list": [item(9)], "has_more": false, "max_cursor": 0}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = settings_for(&server);
        settings.request_variants = vec![
            RequestVariant::Web,
            RequestVariant::WebMinimal,
            RequestVariant::Hybrid,
        ];
        let scraper = DouyinScraper::new(&settings).unwrap();
        let page = scraper.fetch_page("MS4wUSER", 0, 20).await;
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_all_stops_when_has_more_is_zero() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(0..20, 0, 123)))
            .expect(1)
            .mount(&server)
            .await;

        let scraper = DouyinScraper::new(&settings_for(&server)).unwrap();
        let videos = scraper
            .fetch_all("https://www.douyin.com/user/MS4wUSER", 1000)
            .await
            .unwrap();
        assert_eq!(videos.len(), 20);
    }

    #[tokio::test]
    async fn test_fetch_all_follows_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .and(query_param("max_cursor", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(0..20, 1, 100)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .and(query_param("max_cursor", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(20..25, 0, 0)))
            .expect(1)
            .mount(&server)
            .await;

        let scraper = DouyinScraper::new(&settings_for(&server)).unwrap();
        let videos = scraper
            .fetch_all("https://www.douyin.com/user/MS4wUSER", 1000)
            .await
            .unwrap();
        assert_eq!(videos.len(), 25);
        assert_eq!(videos[24].aweme_id, "7000000000000000024");
    }

    #[tokio::test]
    async fn test_fetch_all_truncates_to_max() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .and(query_param("count", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(0..20, 1, 100)))
            .expect(1)
            .mount(&server)
            .await;

        let scraper = DouyinScraper::new(&settings_for(&server)).unwrap();
        let videos = scraper
            .fetch_all("https://www.douyin.com/user/MS4wUSER", 5)
            .await
            .unwrap();
        assert_eq!(videos.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_first_page_falls_through_to_hybrid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": 0, "aweme_list": [], "has_more": 0
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(HYBRID))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "data": {"aweme_list": [item(1), item(2)], "has_more": false, "max_cursor": 0}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = settings_for(&server);
        settings.request_variants = RequestVariant::default_order();
        let scraper = DouyinScraper::new(&settings).unwrap();
        let videos = scraper
            .fetch_all("https://www.douyin.com/user/MS4wUSER", 1000)
            .await
            .unwrap();
        assert_eq!(videos.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_first_page_is_accepted_when_every_variant_agrees() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": 0, "aweme_list": [], "has_more": 0
            })))
            .expect(2)
            .mount(&server)
            .await;

        let mut settings = settings_for(&server);
        settings.request_variants = vec![RequestVariant::Web, RequestVariant::WebMinimal];
        let scraper = DouyinScraper::new(&settings).unwrap();
        let page = scraper.fetch_page("MS4wUSER", 0, 20).await;
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_all_stops_when_cursor_stalls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(0..20, 1, 0)))
            .expect(1)
            .mount(&server)
            .await;

        let scraper = DouyinScraper::new(&settings_for(&server)).unwrap();
        let videos = scraper
            .fetch_all("https://www.douyin.com/user/MS4wUSER", 100)
            .await
            .unwrap();
        assert_eq!(videos.len(), 20);
    }

    #[tokio::test]
    async fn test_fetch_all_drops_repeated_items_and_stops() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .and(query_param("max_cursor", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(0..20, 1, 100)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .and(query_param("max_cursor", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(10..20, 1, 200)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .and(query_param("max_cursor", "200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(20..30, 0, 0)))
            .expect(0)
            .mount(&server)
            .await;

        let scraper = DouyinScraper::new(&settings_for(&server)).unwrap();
        let videos = scraper
            .fetch_all("https://www.douyin.com/user/MS4wUSER", 100)
            .await
            .unwrap();

        let ids: HashSet<&str> = videos.iter().map(|v| v.aweme_id.as_str()).collect();
        assert_eq!(videos.len(), 20);
        assert_eq!(ids.len(), 20);
    }

    #[tokio::test]
    async fn test_fetch_all_pauses_between_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .and(query_param("max_cursor", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(0..20, 1, 100)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .and(query_param("max_cursor", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(20..40, 1, 200)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .and(query_param("max_cursor", "200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(40..45, 0, 0)))
            .mount(&server)
            .await;

        let mut settings = settings_for(&server);
        settings.page_delay_ms = 150;
        let scraper = DouyinScraper::new(&settings).unwrap();

        let start = std::time::Instant::now();
        let videos = scraper
            .fetch_all("https://www.douyin.com/user/MS4wUSER", 1000)
            .await
            .unwrap();
        assert_eq!(videos.len(), 45);
        // Two gaps between three pages.
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_fetch_all_does_not_pause_after_last_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LISTING))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(0..5, 0, 0)))
            .mount(&server)
            .await;

        let mut settings = settings_for(&server);
        settings.page_delay_ms = 60_000;
        let scraper = DouyinScraper::new(&settings).unwrap();

        let videos = tokio::time::timeout(
            Duration::from_secs(10),
            scraper.fetch_all("https://www.douyin.com/user/MS4wUSER", 1000),
        )
        .await
        .expect("fetch_all slept after the last page")
        .unwrap();
        assert_eq!(videos.len(), 5);
    }

    #[tokio::test]
    async fn test_fetch_all_rejects_unrecognized_url() {
        let server = MockServer::start().await;
        let scraper = DouyinScraper::new(&settings_for(&server)).unwrap();
        let err = scraper
            .fetch_all("https://www.douyin.com/discover", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::UnrecognizedProfileUrl(_)));
    }
}
