//! Read views over the guideline store.
//!
//! All three views are pure functions of the current store contents; there
//! is no caching layer between them and the store.

use crate::store::GuidelineStore;

/// Returned instead of an error when a requested guideline id is absent, so
/// a stale reference degrades to an empty answer rather than failing the
/// protocol exchange.
pub const MISSING_PLACEHOLDER: &str = "No guideline content found.";

/// Delimiter for the condensed whole-corpus rendering.
const CONDENSED_SEPARATOR: &str = " | ";

/// A single record's text, verbatim, or the placeholder when absent.
pub fn single(store: &GuidelineStore, id: &str) -> String {
    match store.get(id) {
        Some(record) => record.text.clone(),
        None => MISSING_PLACEHOLDER.to_string(),
    }
}

/// Every record as `"### {title}\n{text}"`, blank-line separated, in
/// insertion order. Used for full-context scenarios such as code review
/// against the whole corpus.
pub fn combined(store: &GuidelineStore) -> String {
    store
        .iter()
        .map(|r| format!("### {}\n{}", r.title, r.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Every record as `"{title}: {text}"` on one line, for contexts with a
/// tight size budget.
pub fn condensed(store: &GuidelineStore) -> String {
    store
        .iter()
        .map(|r| format!("{}: {}", r.title, crate::text::collapse_whitespace(&r.text)))
        .collect::<Vec<_>>()
        .join(CONDENSED_SEPARATOR)
}
