//! Document tree aggregator.
//!
//! Walks the two-level page hierarchy (root + direct children) and builds
//! the in-memory guideline store. The root fetch is fatal; everything below
//! it degrades: a failed child enumeration leaves a root-only corpus, a
//! failed child fetch skips that child.

use futures::future::join_all;
use tracing::{error, info, warn};

use confluence_client::confluence::{ConfluenceClient, ConfluenceError, Page, PageRef};

use crate::error::AppError;
use crate::model::GuidelineRecord;
use crate::store::GuidelineStore;
use crate::text;

/// The aggregator's view of the remote wiki. `ConfluenceClient` is the real
/// implementation; tests substitute an in-memory fake.
pub trait PageSource: Sync {
    fn fetch_page(
        &self,
        page_id: &str,
    ) -> impl std::future::Future<Output = Result<Page, ConfluenceError>> + Send;

    fn child_pages(
        &self,
        page_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<PageRef>, ConfluenceError>> + Send;
}

impl PageSource for ConfluenceClient {
    async fn fetch_page(&self, page_id: &str) -> Result<Page, ConfluenceError> {
        ConfluenceClient::fetch_page(self, page_id).await
    }

    async fn child_pages(&self, page_id: &str) -> Result<Vec<PageRef>, ConfluenceError> {
        ConfluenceClient::child_pages(self, page_id).await
    }
}

/// Build a fresh store from the page tree rooted at `root_id`.
///
/// Children are fetched concurrently; writes are disjoint by page id, and a
/// duplicate id in the enumeration resolves to last-occurrence-wins.
pub async fn load<S: PageSource>(source: &S, root_id: &str) -> Result<GuidelineStore, AppError> {
    let root = source.fetch_page(root_id).await?;

    let mut store = GuidelineStore::new();
    store.insert(to_record(root));

    let children = match source.child_pages(root_id).await {
        Ok(children) => children,
        Err(e) => {
            warn!(error = %e, root_id, "child enumeration failed, keeping root-only corpus");
            Vec::new()
        }
    };

    let fetches = children.iter().map(|child| {
        let id = child.id.clone();
        async move { (id.clone(), source.fetch_page(&id).await) }
    });

    for (id, result) in join_all(fetches).await {
        match result {
            Ok(page) => store.insert(to_record(page)),
            Err(e) => {
                error!(error = %e, page_id = %id, "child fetch failed, skipping page");
            }
        }
    }

    info!(guideline_count = store.len(), root_id, "guideline corpus loaded");
    Ok(store)
}

fn to_record(page: Page) -> GuidelineRecord {
    let title = if page.title.trim().is_empty() {
        format!("Page {}", page.id)
    } else {
        page.title.trim().to_string()
    };

    let body = text::html_to_text(&page.body_html);
    let text = format!("{body}\n\nSource: {}", page.url);

    GuidelineRecord {
        id: page.id,
        title,
        text,
        source_url: page.url,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::collections::HashSet;

    use confluence_client::confluence::StatusCode;

    use super::*;

    /// In-memory page tree; ids listed in `broken` fail their fetch.
    struct FakeWiki {
        pages: HashMap<String, Page>,
        children: Result<Vec<PageRef>, ()>,
        broken: HashSet<String>,
    }

    impl FakeWiki {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
                children: Ok(Vec::new()),
                broken: HashSet::new(),
            }
        }

        fn page(mut self, id: &str, title: &str, body_html: &str) -> Self {
            self.pages.insert(
                id.to_string(),
                Page {
                    id: id.to_string(),
                    title: title.to_string(),
                    body_html: body_html.to_string(),
                    url: format!("https://wiki.example.com/pages/{id}"),
                },
            );
            self
        }

        fn with_children(mut self, ids: &[(&str, &str)]) -> Self {
            self.children = Ok(ids
                .iter()
                .map(|(id, title)| PageRef {
                    id: id.to_string(),
                    title: title.to_string(),
                })
                .collect());
            self
        }

        fn with_broken_children_listing(mut self) -> Self {
            self.children = Err(());
            self
        }

        fn with_broken_page(mut self, id: &str) -> Self {
            self.broken.insert(id.to_string());
            self
        }
    }

    fn not_found(id: &str) -> ConfluenceError {
        ConfluenceError::Upstream {
            status: StatusCode::NOT_FOUND,
            message: format!("No content found with id: {id}"),
        }
    }

    impl PageSource for FakeWiki {
        async fn fetch_page(&self, page_id: &str) -> Result<Page, ConfluenceError> {
            if self.broken.contains(page_id) {
                return Err(not_found(page_id));
            }
            self.pages
                .get(page_id)
                .cloned()
                .ok_or_else(|| not_found(page_id))
        }

        async fn child_pages(&self, _page_id: &str) -> Result<Vec<PageRef>, ConfluenceError> {
            match &self.children {
                Ok(children) => Ok(children.clone()),
                Err(()) => Err(ConfluenceError::Upstream {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "child listing unavailable".to_string(),
                }),
            }
        }
    }

    fn standards_wiki() -> FakeWiki {
        FakeWiki::new()
            .page("1", "Standards", "<p>Team engineering standards.</p>")
            .page("2", "Naming", "<p>Use  kebab-case\nfor endpoints.</p>")
            .page("3", "Logging", "<p>Log with structured fields.</p>")
            .with_children(&[("2", "Naming"), ("3", "Logging")])
    }

    #[tokio::test]
    async fn load_builds_root_plus_children() {
        let wiki = standards_wiki();
        let store = load(&wiki, "1").await.unwrap();

        assert_eq!(store.len(), 3);
        let naming = store.get("2").unwrap();
        assert_eq!(naming.title, "Naming");
        assert_eq!(
            naming.text,
            "Use kebab-case for endpoints.\n\nSource: https://wiki.example.com/pages/2"
        );
    }

    #[tokio::test]
    async fn root_fetch_failure_is_fatal() {
        let wiki = FakeWiki::new();
        let result = load(&wiki, "1").await;
        assert!(matches!(result, Err(AppError::Confluence(_))));
    }

    #[tokio::test]
    async fn child_enumeration_failure_keeps_root_record() {
        let wiki = FakeWiki::new()
            .page("1", "Standards", "<p>root</p>")
            .with_broken_children_listing();

        let store = load(&wiki, "1").await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("1").is_some());
    }

    #[tokio::test]
    async fn one_bad_child_does_not_abort_traversal() {
        let wiki = standards_wiki().with_broken_page("2");
        let store = load(&wiki, "1").await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.get("1").is_some());
        assert!(store.get("2").is_none());
        assert!(store.get("3").is_some());
    }

    #[tokio::test]
    async fn load_is_idempotent_against_unchanged_source() {
        let wiki = standards_wiki();
        let first = load(&wiki, "1").await.unwrap();
        let second = load(&wiki, "1").await.unwrap();

        assert_eq!(first.len(), second.len());
        for record in first.iter() {
            assert_eq!(second.get(&record.id).unwrap().text, record.text);
        }
    }

    #[tokio::test]
    async fn duplicate_child_ids_resolve_to_one_record() {
        let wiki = FakeWiki::new()
            .page("1", "Standards", "<p>root</p>")
            .page("2", "Naming", "<p>naming</p>")
            .with_children(&[("2", "Naming"), ("2", "Naming")]);

        let store = load(&wiki, "1").await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn blank_title_falls_back_to_page_id() {
        let wiki = FakeWiki::new().page("7", "  ", "<p>body</p>");
        let store = load(&wiki, "7").await.unwrap();
        assert_eq!(store.get("7").unwrap().title, "Page 7");
    }
}
