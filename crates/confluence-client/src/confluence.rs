use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;

/// Maximum number of child pages requested per enumeration call.
///
/// Confluence caps `limit` server-side anyway; a guideline space with more
/// direct children than this is not a layout this server supports.
const CHILD_PAGE_LIMIT: u32 = 200;

#[derive(Clone, Debug)]
pub struct ConfluenceConfig {
    /// Site root, e.g. "https://wiki.example.com". No trailing slash.
    pub base_url: String,
    /// Account name for basic auth. Token-only auth uses a bearer header.
    pub username: Option<String>,
    /// API token. `None` means the wiki is read anonymously.
    pub api_token: Option<String>,
    pub default_timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_error_body_bytes: usize,
}

impl ConfluenceConfig {
    /// Build a config from environment variables.
    ///
    /// `CONFLUENCE_BASE_URL` is required and validated by the caller
    /// (see the server crate's `Config::from_env`); everything else has
    /// a serviceable default.
    pub fn from_env(base_url: String) -> Self {
        let default_timeout = std::env::var("CONFLUENCE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(30));

        let max_retries = std::env::var("CONFLUENCE_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(3);

        let initial_backoff = std::env::var("CONFLUENCE_RETRY_INITIAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(200));

        let max_backoff = std::env::var("CONFLUENCE_RETRY_MAX_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(5_000));

        let max_error_body_bytes = std::env::var("CONFLUENCE_MAX_ERROR_BODY_BYTES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(8 * 1024);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: std::env::var("CONFLUENCE_USER").ok(),
            api_token: std::env::var("CONFLUENCE_API_TOKEN").ok(),
            default_timeout,
            max_retries,
            initial_backoff,
            max_backoff,
            max_error_body_bytes,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfluenceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("confluence returned error: status={status} message={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("confluence returned non-JSON error: status={status} body={body}")]
    UpstreamBody { status: StatusCode, body: String },
}

/// One fetched wiki page: raw markup plus enough metadata to build a record.
#[derive(Debug, Clone)]
pub struct Page {
    pub id: String,
    pub title: String,
    /// Rendered body HTML (`body.view.value`). May be empty.
    pub body_html: String,
    /// Canonical web URL for the page, used as the provenance marker.
    pub url: String,
}

/// A child-page reference from the content tree, before its body is fetched.
#[derive(Debug, Clone)]
pub struct PageRef {
    pub id: String,
    pub title: String,
}

#[derive(Clone)]
pub struct ConfluenceClient {
    config: ConfluenceConfig,
    http: reqwest::Client,
}

impl ConfluenceClient {
    pub fn new(config: ConfluenceConfig) -> Result<Self, ConfluenceError> {
        let http = reqwest::Client::builder()
            .user_agent("confluence-guidelines")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ConfluenceConfig {
        &self.config
    }

    /// Fetch one page by id, with its rendered body.
    pub async fn fetch_page(&self, page_id: &str) -> Result<Page, ConfluenceError> {
        let url = format!(
            "{}/rest/api/content/{}?expand=body.view",
            self.config.base_url, page_id
        );
        let raw: ContentResponse = self
            .request_with_retry(|| async {
                let resp = self.authorized(self.http.get(&url)).send().await?;
                self.parse_json_response(resp).await
            })
            .await?;

        Ok(self.to_page(raw))
    }

    /// Enumerate the direct child pages of `page_id`. An empty list is a
    /// legitimate answer, not an error.
    pub async fn child_pages(&self, page_id: &str) -> Result<Vec<PageRef>, ConfluenceError> {
        let url = format!(
            "{}/rest/api/content/{}/child/page?limit={}",
            self.config.base_url, page_id, CHILD_PAGE_LIMIT
        );
        let raw: ChildPageResponse = self
            .request_with_retry(|| async {
                let resp = self.authorized(self.http.get(&url)).send().await?;
                self.parse_json_response(resp).await
            })
            .await?;

        Ok(raw
            .results
            .into_iter()
            .map(|c| PageRef {
                id: c.id,
                title: c.title,
            })
            .collect())
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.timeout(self.config.default_timeout);
        match (&self.config.username, &self.config.api_token) {
            (Some(user), Some(token)) => req.basic_auth(user, Some(token)),
            (None, Some(token)) => req.bearer_auth(token),
            _ => req,
        }
    }

    fn to_page(&self, raw: ContentResponse) -> Page {
        let url = match raw.links.and_then(|l| l.webui) {
            Some(webui) => format!("{}{}", self.config.base_url, webui),
            None => format!(
                "{}/pages/viewpage.action?pageId={}",
                self.config.base_url, raw.id
            ),
        };
        Page {
            id: raw.id,
            title: raw.title.unwrap_or_default(),
            body_html: raw.body.and_then(|b| b.view).map(|v| v.value).unwrap_or_default(),
            url,
        }
    }

    async fn parse_json_response<T: for<'de> Deserialize<'de>>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ConfluenceError> {
        if resp.status().is_success() {
            let json = resp.json::<T>().await?;
            return Ok(json);
        }
        Err(self.to_upstream_error(resp).await)
    }

    async fn to_upstream_error(&self, resp: reqwest::Response) -> ConfluenceError {
        let status = resp.status();
        let body = read_limited_text(resp, self.config.max_error_body_bytes).await;
        if let Ok(parsed) = serde_json::from_str::<ConfluenceErrorEnvelope>(&body) {
            if let Some(message) = parsed.message {
                return ConfluenceError::Upstream { status, message };
            }
        }
        ConfluenceError::UpstreamBody { status, body }
    }

    async fn request_with_retry<T, Fut, F>(&self, mut f: F) -> Result<T, ConfluenceError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ConfluenceError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if attempt > self.config.max_retries || !should_retry(&e) {
                        return Err(e);
                    }
                    let delay = backoff_delay(
                        self.config.initial_backoff,
                        self.config.max_backoff,
                        attempt - 1,
                    );
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "confluence request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn should_retry(err: &ConfluenceError) -> bool {
    match err {
        ConfluenceError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        ConfluenceError::Upstream { status, .. }
        | ConfluenceError::UpstreamBody { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
        }
        ConfluenceError::InvalidJson(_) => false,
    }
}

fn backoff_delay(initial: Duration, max: Duration, exponent: u32) -> Duration {
    let mult = 1u128.checked_shl(exponent).unwrap_or(u128::MAX);
    let base_ms = initial.as_millis().saturating_mul(mult);
    let capped_ms = std::cmp::min(base_ms, max.as_millis()) as u64;
    let jitter_cap = std::cmp::max(1, capped_ms / 4);
    let jitter_ms = pseudo_jitter_ms(jitter_cap);
    Duration::from_millis(capped_ms.saturating_add(jitter_ms))
}

fn pseudo_jitter_ms(max_inclusive: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    let nanos = now.subsec_nanos() as u64;
    nanos % (max_inclusive + 1)
}

async fn read_limited_text(resp: reqwest::Response, max_bytes: usize) -> String {
    match resp.bytes().await {
        Ok(mut b) => {
            if b.len() > max_bytes {
                b.truncate(max_bytes);
            }
            String::from_utf8_lossy(&b).to_string()
        }
        Err(e) => {
            warn!(error = %e, "failed to read confluence error body");
            "<failed to read error body>".to_string()
        }
    }
}

/// Confluence REST error envelope, e.g. `{"statusCode":404,"message":"..."}`.
#[derive(Debug, Deserialize)]
struct ConfluenceErrorEnvelope {
    message: Option<String>,
    #[allow(dead_code)]
    #[serde(rename = "statusCode")]
    status_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    id: String,
    title: Option<String>,
    body: Option<ContentBody>,
    #[serde(rename = "_links")]
    links: Option<ContentLinks>,
}

#[derive(Debug, Deserialize)]
struct ContentBody {
    view: Option<ContentBodyView>,
}

#[derive(Debug, Deserialize)]
struct ContentBodyView {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ContentLinks {
    webui: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChildPageResponse {
    results: Vec<ChildPageEntry>,
}

#[derive(Debug, Deserialize)]
struct ChildPageEntry {
    id: String,
    title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_parses_confluence_shape() {
        let body = r#"{"statusCode":404,"message":"No content found with id: 12345"}"#;
        let parsed: ConfluenceErrorEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.message.as_deref(),
            Some("No content found with id: 12345")
        );
    }

    #[test]
    fn content_response_tolerates_missing_body() {
        let body = r#"{"id":"98301","title":"Standards"}"#;
        let parsed: ContentResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.id, "98301");
        assert!(parsed.body.is_none());
    }

    #[test]
    fn backoff_is_bounded_by_max() {
        let d = backoff_delay(
            Duration::from_millis(200),
            Duration::from_millis(1_000),
            10,
        );
        // capped at max plus at most 25% jitter
        assert!(d <= Duration::from_millis(1_250));
    }
}
