use crate::error::AppError;

/// Application configuration loaded explicitly from environment variables.
///
/// No defaults are assumed for the wiki location or the root page — the
/// caller must provide them. Credentials are optional; without them the
/// wiki is read anonymously.
#[derive(Debug, Clone)]
pub struct Config {
    /// Confluence site root, e.g. "https://wiki.example.com".
    pub base_url: String,
    /// Id of the page whose subtree holds the guideline corpus.
    pub root_page_id: String,
    /// TCP listen address (e.g. "127.0.0.1:7007"). `None` selects stdio.
    pub tcp_listen_addr: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `CONFLUENCE_BASE_URL`: site root of the wiki
    /// - `CONFLUENCE_ROOT_PAGE_ID`: id of the guidelines root page
    ///
    /// Optional:
    /// - `CONFLUENCE_USER` / `CONFLUENCE_API_TOKEN`: credentials (read by
    ///   the client crate)
    /// - `MCP_TCP_LISTEN_ADDR`: serve MCP over TCP instead of stdio
    pub fn from_env() -> Result<Self, AppError> {
        let base_url = std::env::var("CONFLUENCE_BASE_URL").map_err(|_| {
            AppError::Config("CONFLUENCE_BASE_URL environment variable is required".to_string())
        })?;

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "CONFLUENCE_BASE_URL must be an http(s) URL, got: {base_url}"
            )));
        }

        let root_page_id = std::env::var("CONFLUENCE_ROOT_PAGE_ID").map_err(|_| {
            AppError::Config(
                "CONFLUENCE_ROOT_PAGE_ID environment variable is required".to_string(),
            )
        })?;

        if root_page_id.trim().is_empty() {
            return Err(AppError::Config(
                "CONFLUENCE_ROOT_PAGE_ID must not be empty".to_string(),
            ));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            root_page_id: root_page_id.trim().to_string(),
            tcp_listen_addr: std::env::var("MCP_TCP_LISTEN_ADDR").ok(),
        })
    }
}
