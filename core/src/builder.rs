use crate::scorer::tfidf;
use crate::{DocId, Document, DocumentStore, InvertedIndex, Posting, Preprocessor, Result, Term};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Success,
    NoDocuments,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub status: BuildStatus,
    pub documents_indexed: usize,
    pub entries_created: usize,
    pub unique_terms: usize,
}

impl BuildReport {
    fn no_documents() -> Self {
        Self { status: BuildStatus::NoDocuments, documents_indexed: 0, entries_created: 0, unique_terms: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub doc_id: DocId,
    pub entries_created: usize,
    /// `N` used for the new document's weights.
    pub corpus_size: u32,
}

/// Computes postings and weights. Never publishes anything itself: it hands back a new
/// [`InvertedIndex`] and the caller decides when readers get to see it.
#[derive(Clone)]
pub struct IndexBuilder {
    preprocessor: Arc<dyn Preprocessor>,
}

impl IndexBuilder {
    pub fn new(preprocessor: Arc<dyn Preprocessor>) -> Self {
        Self { preprocessor }
    }

    /// Builds a fresh index over `documents`.
    ///
    /// An empty corpus yields an empty index with [`BuildStatus::NoDocuments`]; publishing
    /// it clears whatever was there before. Normalized terms are written back to `store`
    /// as each document's searchable content.
    pub fn rebuild(&self, documents: &[Document], store: &dyn DocumentStore) -> Result<(InvertedIndex, BuildReport)> {
        if documents.is_empty() {
            warn!("no documents found, index cleared");
            return Ok((InvertedIndex::new(), BuildReport::no_documents()));
        }
        info!(documents = documents.len(), "building index");

        // Last occurrence wins if the same id shows up twice.
        let mut unique: BTreeMap<DocId, &Document> = BTreeMap::new();
        for doc in documents {
            unique.insert(doc.id, doc);
        }

        let mut df: BTreeMap<Term, u32> = BTreeMap::new();
        let mut tf_by_doc: BTreeMap<DocId, BTreeMap<Term, u32>> = BTreeMap::new();
        for (&doc_id, doc) in &unique {
            let tokens = self.preprocessor.normalize(&doc.indexable_text())?;
            let tf = term_frequencies(&tokens);
            for term in tf.keys() {
                *df.entry(term.clone()).or_insert(0) += 1;
            }
            store.set_searchable_content(doc_id, &tokens.join(" "))?;
            tf_by_doc.insert(doc_id, tf);
        }

        let n = tf_by_doc.len() as u32;
        let mut postings: BTreeMap<Term, Vec<Posting>> = BTreeMap::new();
        let mut doc_terms: BTreeMap<DocId, Vec<Term>> = BTreeMap::new();
        // Documents are visited in ascending id order, so every list comes out sorted.
        for (doc_id, tf) in tf_by_doc {
            if tf.is_empty() {
                continue;
            }
            for (term, &freq) in &tf {
                let weight = tfidf(freq, df[term], n);
                postings
                    .entry(term.clone())
                    .or_default()
                    .push(Posting { doc_id, term_frequency: freq, weight });
            }
            doc_terms.insert(doc_id, tf.into_keys().collect());
        }

        let report = BuildReport {
            status: BuildStatus::Success,
            documents_indexed: n as usize,
            entries_created: postings.values().map(Vec::len).sum(),
            unique_terms: df.len(),
        };
        info!(
            documents = report.documents_indexed,
            entries = report.entries_created,
            terms = report.unique_terms,
            "index built"
        );
        Ok((InvertedIndex::from_parts(postings, df, doc_terms, n), report))
    }

    /// Returns a copy of `current` with `document`'s postings replaced.
    ///
    /// Document frequencies of the terms involved are exact afterwards. Weights of other
    /// documents keep the IDF they had at their last computation, so they drift until the
    /// next [`IndexBuilder::rebuild`]; the returned index counts this via
    /// [`InvertedIndex::updates_since_rebuild`].
    pub fn update(
        &self,
        current: &InvertedIndex,
        document: &Document,
        store: &dyn DocumentStore,
    ) -> Result<(InvertedIndex, UpdateReport)> {
        let tokens = self.preprocessor.normalize(&document.indexable_text())?;
        store.set_searchable_content(document.id, &tokens.join(" "))?;
        let stored = store.document_count()?;

        let mut next = current.clone();
        next.remove_document(document.id);

        let tf = term_frequencies(&tokens);
        let indexed_after = next.num_indexed_docs() + usize::from(!tf.is_empty());
        let n = stored.max(indexed_after) as u32;

        for (term, &freq) in &tf {
            let df = next.document_frequency(term) + 1;
            let posting = Posting { doc_id: document.id, term_frequency: freq, weight: tfidf(freq, df, n) };
            next.insert_posting(term, posting);
        }
        next.set_doc_terms(document.id, tf.keys().cloned().collect());
        next.set_num_docs(n);
        next.record_update();

        let report = UpdateReport { doc_id: document.id, entries_created: tf.len(), corpus_size: n };
        info!(doc_id = document.id, entries = report.entries_created, corpus_size = n, "document reindexed");
        Ok((next, report))
    }
}

fn term_frequencies(tokens: &[Term]) -> BTreeMap<Term, u32> {
    let mut tf = BTreeMap::new();
    for token in tokens {
        *tf.entry(token.clone()).or_insert(0) += 1;
    }
    tf
}
