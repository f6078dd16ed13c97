use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type Term = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub term_frequency: u32,
    pub weight: f64, // tf-idf
}

/// One (term, document) row, as exposed for inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexEntry {
    pub term: Term,
    pub doc_id: DocId,
    pub term_frequency: u32,
    pub tfidf_score: f64,
}

/// Term → postings, plus document frequencies and corpus size.
///
/// Posting lists are sorted by `doc_id` and hold at most one posting per document.
/// `df[term] == postings[term].len()` whenever the index is published. Lists are
/// `Arc`-shared so a writer can clone the whole index cheaply and copy only the lists
/// it touches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvertedIndex {
    postings: BTreeMap<Term, Arc<Vec<Posting>>>,
    df: BTreeMap<Term, u32>,
    doc_terms: BTreeMap<DocId, Vec<Term>>,
    num_docs: u32,
    generation: u64,
    updates_since_rebuild: u64,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    pub(crate) fn from_parts(
        postings: BTreeMap<Term, Vec<Posting>>,
        df: BTreeMap<Term, u32>,
        doc_terms: BTreeMap<DocId, Vec<Term>>,
        num_docs: u32,
    ) -> Self {
        Self {
            postings: postings.into_iter().map(|(t, p)| (t, Arc::new(p))).collect(),
            df,
            doc_terms,
            num_docs,
            generation: 0,
            updates_since_rebuild: 0,
        }
    }

    /// Postings for `term`, sorted by document id. Empty for unknown terms.
    pub fn postings(&self, term: &str) -> &[Posting] {
        self.postings.get(term).map(|p| p.as_slice()).unwrap_or(&[])
    }

    pub fn document_frequency(&self, term: &str) -> u32 {
        self.df.get(term).copied().unwrap_or(0)
    }

    /// Corpus size used as `N` when weights were last computed.
    pub fn num_docs(&self) -> u32 { self.num_docs }

    pub fn num_terms(&self) -> usize { self.postings.len() }

    pub fn num_postings(&self) -> usize {
        self.postings.values().map(|p| p.len()).sum()
    }

    /// Documents that contributed at least one posting.
    pub fn num_indexed_docs(&self) -> usize { self.doc_terms.len() }

    pub fn generation(&self) -> u64 { self.generation }

    pub fn updates_since_rebuild(&self) -> u64 { self.updates_since_rebuild }

    pub fn is_empty(&self) -> bool { self.postings.is_empty() }

    pub fn contains_doc(&self, doc_id: DocId) -> bool { self.doc_terms.contains_key(&doc_id) }

    /// Distinct terms of a document, sorted.
    pub fn terms_of(&self, doc_id: DocId) -> &[Term] {
        self.doc_terms.get(&doc_id).map(|t| t.as_slice()).unwrap_or(&[])
    }

    pub fn average_terms_per_doc(&self) -> f64 {
        if self.doc_terms.is_empty() {
            return 0.0;
        }
        self.num_postings() as f64 / self.doc_terms.len() as f64
    }

    /// All postings in (term, doc id) order.
    pub fn entries(&self) -> impl Iterator<Item = IndexEntry> + '_ {
        self.postings.iter().flat_map(|(term, list)| {
            list.iter().map(move |p| IndexEntry {
                term: term.clone(),
                doc_id: p.doc_id,
                term_frequency: p.term_frequency,
                tfidf_score: p.weight,
            })
        })
    }

    /// True when the df table agrees with the postings and no list holds a document twice.
    pub fn is_consistent(&self) -> bool {
        if self.df.len() != self.postings.len() {
            return false;
        }
        self.postings.iter().all(|(term, list)| {
            let sorted_unique = list.windows(2).all(|w| w[0].doc_id < w[1].doc_id);
            sorted_unique && self.df.get(term).copied() == Some(list.len() as u32)
        })
    }

    /// Drops every posting of `doc_id`, keeping df exact for the affected terms.
    pub(crate) fn remove_document(&mut self, doc_id: DocId) -> Vec<Term> {
        let Some(terms) = self.doc_terms.remove(&doc_id) else {
            return Vec::new();
        };
        for term in &terms {
            let now_empty = match self.postings.get_mut(term) {
                Some(list) => {
                    let list = Arc::make_mut(list);
                    if let Ok(pos) = list.binary_search_by_key(&doc_id, |p| p.doc_id) {
                        list.remove(pos);
                    }
                    self.df.insert(term.clone(), list.len() as u32);
                    list.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.postings.remove(term);
                self.df.remove(term);
            }
        }
        terms
    }

    /// Inserts (or replaces) the posting of `posting.doc_id` under `term`. Returns the new df.
    pub(crate) fn insert_posting(&mut self, term: &str, posting: Posting) -> u32 {
        let list = Arc::make_mut(self.postings.entry(term.to_string()).or_default());
        match list.binary_search_by_key(&posting.doc_id, |p| p.doc_id) {
            Ok(pos) => list[pos] = posting,
            Err(pos) => list.insert(pos, posting),
        }
        let df = list.len() as u32;
        self.df.insert(term.to_string(), df);
        df
    }

    pub(crate) fn set_doc_terms(&mut self, doc_id: DocId, mut terms: Vec<Term>) {
        terms.sort();
        terms.dedup();
        if terms.is_empty() {
            self.doc_terms.remove(&doc_id);
        } else {
            self.doc_terms.insert(doc_id, terms);
        }
    }

    pub(crate) fn set_num_docs(&mut self, num_docs: u32) { self.num_docs = num_docs; }

    pub(crate) fn set_generation(&mut self, generation: u64) { self.generation = generation; }

    pub(crate) fn record_update(&mut self) { self.updates_since_rebuild += 1; }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(doc_id: DocId, tf: u32) -> Posting {
        Posting { doc_id, term_frequency: tf, weight: tf as f64 }
    }

    #[test]
    fn insert_keeps_lists_sorted_and_unique() {
        let mut idx = InvertedIndex::new();
        idx.insert_posting("rust", posting(3, 1));
        idx.insert_posting("rust", posting(1, 1));
        assert_eq!(idx.insert_posting("rust", posting(3, 2)), 2);

        let ids: Vec<DocId> = idx.postings("rust").iter().map(|p| p.doc_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(idx.postings("rust")[1].term_frequency, 2);
        assert_eq!(idx.document_frequency("rust"), 2);
        assert!(idx.is_consistent());
    }

    #[test]
    fn remove_document_drops_empty_terms() {
        let mut idx = InvertedIndex::new();
        idx.insert_posting("rust", posting(1, 1));
        idx.insert_posting("rust", posting(2, 1));
        idx.insert_posting("crab", posting(1, 1));
        idx.set_doc_terms(1, vec!["rust".into(), "crab".into()]);
        idx.set_doc_terms(2, vec!["rust".into()]);

        let removed = idx.remove_document(1);
        assert_eq!(removed, vec!["crab".to_string(), "rust".to_string()]);
        assert_eq!(idx.document_frequency("rust"), 1);
        assert_eq!(idx.document_frequency("crab"), 0);
        assert!(idx.postings("crab").is_empty());
        assert_eq!(idx.num_terms(), 1);
        assert!(!idx.contains_doc(1));
        assert!(idx.is_consistent());
    }

    #[test]
    fn cloned_index_does_not_share_mutations() {
        let mut idx = InvertedIndex::new();
        idx.insert_posting("rust", posting(1, 1));
        let snapshot = idx.clone();
        idx.insert_posting("rust", posting(2, 1));
        assert_eq!(snapshot.postings("rust").len(), 1);
        assert_eq!(idx.postings("rust").len(), 2);
    }

    #[test]
    fn entries_are_ordered_by_term_then_doc() {
        let mut idx = InvertedIndex::new();
        idx.insert_posting("zeta", posting(1, 1));
        idx.insert_posting("alpha", posting(2, 1));
        idx.insert_posting("alpha", posting(1, 1));
        let rows: Vec<(String, DocId)> = idx.entries().map(|e| (e.term, e.doc_id)).collect();
        assert_eq!(rows, vec![("alpha".into(), 1), ("alpha".into(), 2), ("zeta".into(), 1)]);
    }
}
