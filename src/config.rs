//! Configuration management for douyin-sync using the prefer crate.
//!
//! Settings are layered: built-in defaults, then an optional config file
//! discovered by prefer, then environment variables (a `.env` file is loaded
//! into the environment by the binary before this runs).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::retry::RetryPolicy;
use crate::scrapers::RequestVariant;

/// Default table created or adopted in the Bitable app.
pub const DEFAULT_TABLE_NAME: &str = "抖音视频数据";
/// Default primary display column of a fresh Bitable table.
pub const DEFAULT_PRIMARY_FIELD: &str = "视频名称";
/// Default base URL of the hybrid listing proxy.
pub const DEFAULT_API_BASE_URL: &str = "https://tiktok-api-miaomiaocompany-c35bd5a6.koyeb.app";
/// Default base URL of the Douyin web API.
pub const DEFAULT_WEB_BASE_URL: &str = "https://www.douyin.com";
/// Default append-only diagnostic log.
pub const DEFAULT_LOG_FILE: &str = "douyin_sync.log";

/// Required keys, reported by their environment variable names.
pub const APP_TOKEN_KEY: &str = "APP_TOKEN";
pub const PERSONAL_BASE_TOKEN_KEY: &str = "PERSONAL_BASE_TOKEN";
pub const TABLE_ID_KEY: &str = "TABLE_ID";

/// Configuration errors. Always reported before any network activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Which Bitable deployment to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    /// Feishu (mainland China).
    #[default]
    Domestic,
    /// Lark (international).
    Overseas,
}

impl Region {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "domestic" | "feishu" | "cn" => Some(Region::Domestic),
            "overseas" | "lark" | "intl" => Some(Region::Overseas),
            _ => None,
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Region::Domestic => "https://base-api.feishu.cn",
            Region::Overseas => "https://base-api.larksuite.com",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Region::Domestic => "Feishu",
            Region::Overseas => "Lark",
        }
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the hybrid listing proxy.
    pub api_base_url: String,
    /// Base URL of the Douyin web API.
    pub web_base_url: String,
    /// User agent: None for the default, "impersonate" to rotate, or a literal.
    pub user_agent: Option<String>,
    /// Request timeout in seconds, for both services.
    pub request_timeout: u64,
    /// Maximum items requested per listing page.
    pub page_size: usize,
    /// Pause between successful listing pages in milliseconds.
    pub page_delay_ms: u64,
    /// Request shapes tried in order for every listing page.
    pub request_variants: Vec<RequestVariant>,
    /// Hosts whose links must be resolved through a redirect first.
    pub short_link_hosts: Vec<String>,
    /// Retry policy for listing pages.
    pub source_retry: RetryPolicy,

    /// Bitable app token.
    pub app_token: Option<String>,
    /// Bitable personal access token.
    pub personal_base_token: Option<String>,
    /// Target table id. Replaced by the adopted id once the table is resolved.
    pub table_id: Option<String>,
    pub region: Region,
    /// Explicit Bitable endpoint, overriding the region default.
    pub sink_base_url: Option<String>,
    /// Table name to adopt or create.
    pub table_name: String,
    /// Primary display column that receives the video title, if present.
    pub primary_field: Option<String>,
    /// Pause after every record in milliseconds.
    pub record_delay_ms: u64,
    /// Pause after every full batch in milliseconds.
    pub batch_delay_ms: u64,
    /// Retry policy for Bitable calls.
    pub sink_retry: RetryPolicy,

    /// Append-only diagnostic log file.
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            web_base_url: DEFAULT_WEB_BASE_URL.to_string(),
            user_agent: None,
            request_timeout: 30,
            page_size: 20,
            page_delay_ms: 1000,
            request_variants: RequestVariant::default_order(),
            short_link_hosts: vec!["v.douyin.com".to_string(), "iesdouyin.com".to_string()],
            source_retry: RetryPolicy::new(3, Duration::from_secs(2)),

            app_token: None,
            personal_base_token: None,
            table_id: None,
            region: Region::Domestic,
            sink_base_url: None,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            primary_field: Some(DEFAULT_PRIMARY_FIELD.to_string()),
            record_delay_ms: 300,
            batch_delay_ms: 1000,
            sink_retry: RetryPolicy::new(3, Duration::from_secs(1)),

            log_file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
        }
    }
}

impl Settings {
    /// Apply environment variables from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment variables from an arbitrary lookup.
    ///
    /// The `FEISHU_`-prefixed name wins over the short one.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| lookup(k))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        if let Some(v) = get(&["FEISHU_APP_TOKEN", APP_TOKEN_KEY]) {
            self.app_token = Some(v);
        }
        if let Some(v) = get(&["FEISHU_PERSONAL_BASE_TOKEN", PERSONAL_BASE_TOKEN_KEY]) {
            self.personal_base_token = Some(v);
        }
        if let Some(v) = get(&["FEISHU_TABLE_ID", TABLE_ID_KEY]) {
            self.table_id = Some(v);
        }
        if let Some(v) = get(&["FEISHU_REGION", "REGION"]) {
            self.region = Region::parse(&v).ok_or(ConfigError::Invalid {
                key: "FEISHU_REGION",
                value: v,
            })?;
        }
        if let Some(v) = get(&["FEISHU_BASE_URL"]) {
            self.sink_base_url = Some(v);
        }
        if let Some(v) = get(&["DOUYIN_API_BASE_URL"]) {
            self.api_base_url = v;
        }
        if let Some(v) = get(&["DOUYIN_WEB_BASE_URL"]) {
            self.web_base_url = v;
        }
        Ok(())
    }

    /// Names of required settings that are absent.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.app_token) {
            missing.push(APP_TOKEN_KEY);
        }
        if is_blank(&self.personal_base_token) {
            missing.push(PERSONAL_BASE_TOKEN_KEY);
        }
        if is_blank(&self.table_id) {
            missing.push(TABLE_ID_KEY);
        }
        missing
    }

    /// Fail with every missing key at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing = self.missing_required();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(missing))
        }
    }

    /// Effective Bitable endpoint.
    pub fn sink_base_url(&self) -> String {
        self.sink_base_url
            .clone()
            .unwrap_or_else(|| self.region.base_url().to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Zero out every pause and backoff. Used by tests.
    pub fn without_delays(mut self) -> Self {
        self.page_delay_ms = 0;
        self.record_delay_ms = 0;
        self.batch_delay_ms = 0;
        self.source_retry.base_delay = Duration::ZERO;
        self.sink_retry.base_delay = Duration::ZERO;
        self
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or_default().is_empty()
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// User agent string, or "impersonate".
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub request_timeout: Option<u64>,
    /// Items per listing page.
    #[serde(default)]
    pub page_size: Option<usize>,
    /// Delay between listing pages in milliseconds.
    #[serde(default)]
    pub page_delay_ms: Option<u64>,
    /// Delay after every record in milliseconds.
    #[serde(default)]
    pub record_delay_ms: Option<u64>,
    /// Delay after every batch in milliseconds.
    #[serde(default)]
    pub batch_delay_ms: Option<u64>,
    /// Attempts per remote call, for both services.
    #[serde(default)]
    pub retry_attempts: Option<u32>,
    /// First backoff delay in milliseconds, for both services.
    #[serde(default)]
    pub retry_base_delay_ms: Option<u64>,
    /// Table name to adopt or create.
    #[serde(default)]
    pub table_name: Option<String>,
    /// Primary display column. An empty string disables it.
    #[serde(default)]
    pub primary_field: Option<String>,
    /// Diagnostic log file path.
    #[serde(default)]
    pub log_file: Option<String>,
    /// Ordered request shape names for listing pages.
    #[serde(default)]
    pub request_variants: Option<Vec<String>>,
}

impl Config {
    /// Load configuration using prefer crate.
    /// Automatically discovers douyin-sync config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("douyin-sync").await {
            Ok(pref_config) => {
                let user_agent: Option<String> = pref_config.get("user_agent").ok();
                let request_timeout: Option<u64> = pref_config.get("request_timeout").ok();
                let page_size: Option<usize> = pref_config.get("page_size").ok();
                let page_delay_ms: Option<u64> = pref_config.get("page_delay_ms").ok();
                let record_delay_ms: Option<u64> = pref_config.get("record_delay_ms").ok();
                let batch_delay_ms: Option<u64> = pref_config.get("batch_delay_ms").ok();
                let retry_attempts: Option<u32> = pref_config.get("retry_attempts").ok();
                let retry_base_delay_ms: Option<u64> =
                    pref_config.get("retry_base_delay_ms").ok();
                let table_name: Option<String> = pref_config.get("table_name").ok();
                let primary_field: Option<String> = pref_config.get("primary_field").ok();
                let log_file: Option<String> = pref_config.get("log_file").ok();
                let request_variants: Option<Vec<String>> =
                    pref_config.get("request_variants").ok();

                Config {
                    user_agent,
                    request_timeout,
                    page_size,
                    page_delay_ms,
                    record_delay_ms,
                    batch_delay_ms,
                    retry_attempts,
                    retry_base_delay_ms,
                    table_name,
                    primary_field,
                    log_file,
                    request_variants,
                }
            }
            Err(_) => {
                // No config file found, use defaults
                Self::default()
            }
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(page_size) = self.page_size {
            settings.page_size = page_size.max(1);
        }
        if let Some(delay) = self.page_delay_ms {
            settings.page_delay_ms = delay;
        }
        if let Some(delay) = self.record_delay_ms {
            settings.record_delay_ms = delay;
        }
        if let Some(delay) = self.batch_delay_ms {
            settings.batch_delay_ms = delay;
        }
        if let Some(attempts) = self.retry_attempts {
            settings.source_retry.max_attempts = attempts;
            settings.sink_retry.max_attempts = attempts;
        }
        if let Some(delay) = self.retry_base_delay_ms {
            settings.source_retry.base_delay = Duration::from_millis(delay);
            settings.sink_retry.base_delay = Duration::from_millis(delay);
        }
        if let Some(ref table_name) = self.table_name {
            settings.table_name = table_name.clone();
        }
        if let Some(ref primary) = self.primary_field {
            settings.primary_field = if primary.is_empty() {
                None
            } else {
                Some(primary.clone())
            };
        }
        if let Some(ref log_file) = self.log_file {
            let path = shellexpand::tilde(log_file);
            settings.log_file = Some(PathBuf::from(path.as_ref()));
        }
        if let Some(ref names) = self.request_variants {
            let variants: Vec<RequestVariant> = names
                .iter()
                .filter_map(|name| {
                    let variant = RequestVariant::from_name(name);
                    if variant.is_none() {
                        warn!("Ignoring unknown request variant {:?}", name);
                    }
                    variant
                })
                .collect();
            if !variants.is_empty() {
                settings.request_variants = variants;
            }
        }
    }
}

/// Load settings from defaults, the config file and the environment.
pub async fn load_settings() -> Result<Settings, ConfigError> {
    let config = Config::load().await;
    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    settings.apply_env()?;
    Ok(settings)
}
