use crate::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type DocId = u32;

/// A publication record. Owned by the [`DocumentStore`]; the index only keeps its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    /// RFC 3339 timestamp of the last modification, if known.
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Space-joined normalized terms written back by the builder. Not authoritative.
    #[serde(default)]
    pub searchable_content: String,
}

impl Document {
    pub fn new(id: DocId, title: impl Into<String>, abstract_text: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            abstract_text: abstract_text.into(),
            link: None,
            published_date: None,
            authors: Vec::new(),
            updated_at: None,
            searchable_content: String::new(),
        }
    }

    /// Title and abstract joined; this is what gets indexed.
    pub fn indexable_text(&self) -> String {
        format!("{} {}", self.title, self.abstract_text)
    }
}

/// Durable home of the documents. Every call may fail and failures must reach the caller.
pub trait DocumentStore: Send + Sync {
    fn all_documents(&self) -> Result<Vec<Document>>;
    fn document_count(&self) -> Result<usize>;
    fn get_document(&self, id: DocId) -> Result<Option<Document>>;
    fn set_searchable_content(&self, id: DocId, text: &str) -> Result<()>;
}

/// Documents kept in memory, ordered by id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<DocId, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn from_documents<I: IntoIterator<Item = Document>>(docs: I) -> Self {
        let map = docs.into_iter().map(|d| (d.id, d)).collect();
        Self { docs: RwLock::new(map) }
    }

    /// Inserts or replaces a document. Returns true when the id was new.
    pub fn upsert(&self, doc: Document) -> bool {
        self.docs.write().insert(doc.id, doc).is_none()
    }

    pub fn remove(&self, id: DocId) -> Option<Document> {
        self.docs.write().remove(&id)
    }

    pub fn len(&self) -> usize { self.docs.read().len() }

    pub fn is_empty(&self) -> bool { self.docs.read().is_empty() }
}

impl DocumentStore for MemoryStore {
    fn all_documents(&self) -> Result<Vec<Document>> {
        Ok(self.docs.read().values().cloned().collect())
    }

    fn document_count(&self) -> Result<usize> {
        Ok(self.len())
    }

    fn get_document(&self, id: DocId) -> Result<Option<Document>> {
        Ok(self.docs.read().get(&id).cloned())
    }

    fn set_searchable_content(&self, id: DocId, text: &str) -> Result<()> {
        // Unknown ids are ignored: the content is a cache, not the source of truth.
        if let Some(doc) = self.docs.write().get_mut(&id) {
            doc.searchable_content = text.to_string();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_reports_new_ids() {
        let store = MemoryStore::new();
        assert!(store.upsert(Document::new(1, "a", "b")));
        assert!(!store.upsert(Document::new(1, "c", "d")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_document(1).unwrap().unwrap().title, "c");
    }

    #[test]
    fn abstract_uses_json_name() {
        let doc: Document = serde_json::from_str(r#"{"id": 7, "title": "T", "abstract": "body"}"#).unwrap();
        assert_eq!(doc.abstract_text, "body");
        assert_eq!(doc.indexable_text(), "T body");
        assert!(doc.authors.is_empty());
    }
}
