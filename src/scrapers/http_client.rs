//! HTTP client for the listing source, with browser user agents and redirect resolution.

use std::time::{Duration, Instant};

use reqwest::{Client, Response, StatusCode};
use tracing::debug;

/// Default desktop Chrome user agent. The listing endpoint rejects obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Real browser user agents for impersonate mode.
const IMPERSONATE_USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    // Chrome on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
    // Safari on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
];

/// Pick a browser user agent for impersonate mode.
fn random_user_agent() -> &'static str {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as usize)
        .unwrap_or(0);
    IMPERSONATE_USER_AGENTS[nanos % IMPERSONATE_USER_AGENTS.len()]
}

/// Resolve user agent from config value.
/// - None => default desktop Chrome user agent
/// - "impersonate" => random real browser user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None => USER_AGENT.to_string(),
        Some("impersonate") => random_user_agent().to_string(),
        Some(custom) => custom.to_string(),
    }
}

/// Cookie-aware HTTP client with request logging.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client with the default user agent.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::with_user_agent(timeout, None)
    }

    /// Create a new HTTP client with custom user agent configuration.
    pub fn with_user_agent(
        timeout: Duration,
        user_agent_config: Option<&str>,
    ) -> Result<Self, reqwest::Error> {
        let user_agent = resolve_user_agent(user_agent_config);
        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .cookie_store(true)
            .build()?;

        Ok(Self { client })
    }

    /// Make a GET request with query parameters and extra headers.
    pub async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<HttpResponse, reqwest::Error> {
        let mut request = self.client.get(url).query(query);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let start = Instant::now();
        let response = request.send().await?;
        let duration = start.elapsed();

        debug!(
            url,
            status = response.status().as_u16(),
            elapsed_ms = duration.as_millis() as u64,
            "GET"
        );

        Ok(HttpResponse {
            status: response.status(),
            response,
        })
    }

    /// Follow redirects from `url` and return the final location.
    ///
    /// Tries HEAD first; some share hosts reject it, so a non-success HEAD
    /// falls back to GET.
    pub async fn resolve_redirect(&self, url: &str) -> Result<String, reqwest::Error> {
        match self.client.head(url).send().await {
            Ok(response) if response.status().is_success() => {
                return Ok(response.url().to_string());
            }
            Ok(response) => {
                debug!(url, status = response.status().as_u16(), "HEAD rejected, retrying with GET");
            }
            Err(e) => {
                debug!(url, "HEAD failed ({}), retrying with GET", e);
            }
        }

        let response = self.client.get(url).send().await?;
        Ok(response.url().to_string())
    }
}

/// HTTP response wrapper.
pub struct HttpResponse {
    pub status: StatusCode,
    response: Response,
}

impl HttpResponse {
    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get response body as text.
    pub async fn text(self) -> Result<String, reqwest::Error> {
        self.response.text().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_resolve_user_agent_default() {
        let ua = resolve_user_agent(None);
        assert!(ua.contains("Chrome"));
    }

    #[test]
    fn test_resolve_user_agent_impersonate() {
        let ua = resolve_user_agent(Some("impersonate"));
        assert!(IMPERSONATE_USER_AGENTS.contains(&ua.as_str()));
    }

    #[test]
    fn test_resolve_user_agent_custom() {
        let ua = resolve_user_agent(Some("MyBot/1.0"));
        assert_eq!(ua, "MyBot/1.0");
    }

    #[tokio::test]
    async fn test_get_sends_query_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/listing"))
            .and(query_param("count", "5"))
            .and(header("referer", "https://example.com/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(Duration::from_secs(5)).unwrap();
        let response = client
            .get(
                &format!("{}/listing", server.uri()),
                &[("count", "5".to_string())],
                &[("referer", "https://example.com/".to_string())],
            )
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.text().await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_resolve_redirect_follows_location() {
        let server = MockServer::start().await;
        Mock::given(path("/s/abc"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/user/MS4wTARGET", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(path("/user/MS4wTARGET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = HttpClient::new(Duration::from_secs(5)).unwrap();
        let resolved = client
            .resolve_redirect(&format!("{}/s/abc", server.uri()))
            .await
            .unwrap();
        assert_eq!(resolved, format!("{}/user/MS4wTARGET", server.uri()));
    }

    #[tokio::test]
    async fn test_resolve_redirect_falls_back_to_get() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/s/xyz"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/s/xyz"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/landing", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = HttpClient::new(Duration::from_secs(5)).unwrap();
        let resolved = client
            .resolve_redirect(&format!("{}/s/xyz", server.uri()))
            .await
            .unwrap();
        assert_eq!(resolved, format!("{}/landing", server.uri()));
    }
}
