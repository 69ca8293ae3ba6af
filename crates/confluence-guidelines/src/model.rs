use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One normalized unit of corpus content, keyed by its Confluence page id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidelineRecord {
    /// Stable page id from the wiki, e.g. "98306". Reused across reloads.
    pub id: String,
    /// Page title, e.g. "Naming". Falls back to "Page {id}" when absent.
    pub title: String,
    /// Whitespace-collapsed plain text, ending with a "Source: {url}" marker.
    pub text: String,
    /// Canonical web URL of the source page.
    pub source_url: String,
}

/// An `{id, title}` pair for discovery listings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GuidelineSummary {
    pub id: String,
    pub title: String,
}
