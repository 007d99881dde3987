//! Request shapes for the post listing endpoint.
//!
//! The listing API's parameter and header requirements change without
//! notice, so every page is requested with an ordered list of shapes. Each
//! shape knows how to build its request and how to decode its own response
//! envelope into a [`Page`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SourceError;

/// Web client id expected by the listing endpoint.
const WEB_AID: &str = "6383";

const SEC_CH_UA: &str =
    r#""Chromium";v="131", "Not_A Brand";v="24", "Google Chrome";v="131""#;

/// Hybrid API success code.
const HYBRID_OK: i64 = 200;

/// One strategy for requesting a listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestVariant {
    /// Douyin web endpoint with the full browser header set.
    Web,
    /// Douyin web endpoint with only user agent and referer.
    WebMinimal,
    /// Third-party hybrid proxy that wraps the web response.
    Hybrid,
}

impl RequestVariant {
    pub fn default_order() -> Vec<Self> {
        vec![
            RequestVariant::Web,
            RequestVariant::WebMinimal,
            RequestVariant::Hybrid,
        ]
    }

    /// Parse a variant from its configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "web" => Some(RequestVariant::Web),
            "web_minimal" => Some(RequestVariant::WebMinimal),
            "hybrid" => Some(RequestVariant::Hybrid),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RequestVariant::Web => "web",
            RequestVariant::WebMinimal => "web_minimal",
            RequestVariant::Hybrid => "hybrid",
        }
    }

    /// Build the request for one page.
    pub fn build(&self, web_base_url: &str, api_base_url: &str, req: &PageRequest<'_>) -> RequestShape {
        match self {
            RequestVariant::Web | RequestVariant::WebMinimal => {
                let web_base = web_base_url.trim_end_matches('/');
                let query = vec![
                    ("device_platform", "webapp".to_string()),
                    ("aid", WEB_AID.to_string()),
                    ("channel", "channel_pc_web".to_string()),
                    ("sec_user_id", req.sec_user_id.to_string()),
                    ("max_cursor", req.max_cursor.to_string()),
                    ("count", req.count.to_string()),
                    ("publish_video_strategy_type", "2".to_string()),
                ];

                let mut headers = vec![("referer", format!("{}/user/{}", web_base, req.sec_user_id))];
                if *self == RequestVariant::Web {
                    headers.push(("accept", "application/json, text/plain, */*".to_string()));
                    headers.push(("accept-language", "zh-CN,zh;q=0.9".to_string()));
                    headers.push(("sec-ch-ua", SEC_CH_UA.to_string()));
                    headers.push(("sec-ch-ua-mobile", "?0".to_string()));
                    headers.push(("sec-ch-ua-platform", "\"Windows\"".to_string()));
                }

                RequestShape {
                    url: format!("{}/aweme/v1/web/aweme/post/", web_base),
                    query,
                    headers,
                }
            }
            RequestVariant::Hybrid => RequestShape {
                url: format!(
                    "{}/api/douyin/web/fetch_user_post_videos",
                    api_base_url.trim_end_matches('/')
                ),
                query: vec![
                    ("sec_user_id", req.sec_user_id.to_string()),
                    ("max_cursor", req.max_cursor.to_string()),
                    ("count", req.count.to_string()),
                ],
                headers: vec![("accept", "application/json".to_string())],
            },
        }
    }

    /// Decode a response body into a page, rejecting anything that is not a
    /// structurally valid, successful listing response.
    pub fn decode(&self, body: &str) -> Result<Page, SourceError> {
        if body.trim().is_empty() {
            return Err(SourceError::EmptyBody);
        }
        let root: Value = serde_json::from_str(body)?;

        match self {
            RequestVariant::Web | RequestVariant::WebMinimal => {
                let code = root
                    .get("status_code")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| SourceError::Malformed("missing status_code".to_string()))?;
                if code != 0 {
                    return Err(SourceError::Application {
                        code,
                        message: message_of(&root, "status_msg"),
                    });
                }
                Page::from_listing(&root)
            }
            RequestVariant::Hybrid => {
                let code = root
                    .get("code")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| SourceError::Malformed("missing code".to_string()))?;
                if code != HYBRID_OK {
                    return Err(SourceError::Application {
                        code,
                        message: message_of(&root, "message"),
                    });
                }
                let data = root
                    .get("data")
                    .ok_or_else(|| SourceError::Malformed("missing data".to_string()))?;
                Page::from_listing(data)
            }
        }
    }
}

fn message_of(root: &Value, key: &str) -> String {
    root.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Parameters of one listing page request.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub sec_user_id: &'a str,
    pub max_cursor: i64,
    pub count: usize,
}

/// A fully built request: URL, query string and extra headers.
#[derive(Debug, Clone)]
pub struct RequestShape {
    pub url: String,
    pub query: Vec<(&'static str, String)>,
    pub headers: Vec<(&'static str, String)>,
}

/// One decoded listing page.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Raw items, parsed later by `parse_item`.
    pub items: Vec<Value>,
    pub has_more: bool,
    /// Cursor for the next page.
    pub next_cursor: i64,
}

impl Page {
    /// Read `aweme_list`, `has_more` and `max_cursor` from a listing object.
    ///
    /// A missing or null `aweme_list` is an empty page, not an error.
    fn from_listing(listing: &Value) -> Result<Self, SourceError> {
        if !listing.is_object() {
            return Err(SourceError::Malformed("listing is not an object".to_string()));
        }

        let items = match listing.get("aweme_list") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(_) => {
                return Err(SourceError::Malformed("aweme_list is not an array".to_string()));
            }
        };

        let has_more = match listing.get("has_more") {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
            _ => false,
        };

        let next_cursor = match listing.get("max_cursor") {
            Some(Value::Number(n)) => n.as_i64().unwrap_or_default(),
            Some(Value::String(s)) => s.parse().unwrap_or_default(),
            _ => 0,
        };

        Ok(Self {
            items,
            has_more,
            next_cursor,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
