use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::model::{GuidelineRecord, GuidelineSummary};

/// Process-wide mapping from page id to guideline record.
///
/// Rebuilt wholesale by the loader, never patched incrementally. Insertion
/// order is tracked so the combined and condensed views render records in the
/// order the traversal produced them.
#[derive(Debug, Default)]
pub struct GuidelineStore {
    records: HashMap<String, GuidelineRecord>,
    order: Vec<String>,
}

/// Single writer (the load/reload path), many readers.
pub type SharedStore = Arc<RwLock<GuidelineStore>>;

impl GuidelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, last-writer-wins on duplicate ids. A replaced record
    /// keeps its original position in iteration order.
    pub fn insert(&mut self, record: GuidelineRecord) {
        let id = record.id.clone();
        if self.records.insert(id.clone(), record).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<&GuidelineRecord> {
        self.records.get(id)
    }

    /// Iterate records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &GuidelineRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summaries(&self) -> Vec<GuidelineSummary> {
        self.iter()
            .map(|r| GuidelineSummary {
                id: r.id.clone(),
                title: r.title.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str) -> GuidelineRecord {
        GuidelineRecord {
            id: id.to_string(),
            title: title.to_string(),
            text: format!("{title} body\n\nSource: https://wiki.example.com/{id}"),
            source_url: format!("https://wiki.example.com/{id}"),
        }
    }

    #[test]
    fn unknown_id_returns_none() {
        let store = GuidelineStore::new();
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn duplicate_insert_overwrites_but_keeps_position() {
        let mut store = GuidelineStore::new();
        store.insert(record("1", "First"));
        store.insert(record("2", "Second"));
        store.insert(record("1", "First, revised"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("1").unwrap().title, "First, revised");
        let titles: Vec<&str> = store.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["First, revised", "Second"]);
    }

    #[test]
    fn summaries_follow_insertion_order() {
        let mut store = GuidelineStore::new();
        store.insert(record("10", "Standards"));
        store.insert(record("11", "Naming"));
        let summaries = store.summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, "10");
        assert_eq!(summaries[1].title, "Naming");
    }
}
