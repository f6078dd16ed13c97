use crate::scorer::round4;
use crate::{
    BuildReport, DocId, Document, DocumentStore, EngineConfig, Error, IndexBuilder, IndexEntry, InvertedIndex,
    Preprocessor, QueryCache, Result, Term, UpdateReport,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    /// Summed tf-idf over matched query terms, rounded to 4 decimals.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchPage {
    /// Hits available across all pages (bounded by the engine's result cap).
    pub total: usize,
    pub page: usize,
    pub size: usize,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchDetails {
    pub hits: Vec<SearchHit>,
    pub query_tokens: Vec<Term>,
    pub matched_terms: Vec<Term>,
    pub unmatched_terms: Vec<Term>,
    pub total_results: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub total_documents: usize,
    pub indexed_documents: usize,
    pub corpus_size: u32,
    pub total_postings: usize,
    pub unique_terms: usize,
    pub avg_document_length: f64,
    pub generation: u64,
    pub updates_since_rebuild: u64,
    /// Latest `updated_at` among indexed documents.
    pub last_updated: Option<String>,
}

/// Query and maintenance entry point over a published [`InvertedIndex`].
///
/// Readers grab the current `Arc` and work on it undisturbed. Writers are serialized,
/// build the next index off to the side and publish it with a single pointer swap, so a
/// reader sees either the old complete index or the new one. Each publish bumps the
/// generation, which retires every cached answer.
pub struct SearchEngine {
    store: Arc<dyn DocumentStore>,
    preprocessor: Arc<dyn Preprocessor>,
    builder: IndexBuilder,
    config: EngineConfig,
    index: RwLock<Arc<InvertedIndex>>,
    writer: Mutex<()>,
    cache: Option<QueryCache>,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn DocumentStore>, preprocessor: Arc<dyn Preprocessor>, config: EngineConfig) -> Self {
        Self {
            builder: IndexBuilder::new(preprocessor.clone()),
            cache: QueryCache::with_capacity(config.cache_capacity),
            store,
            preprocessor,
            config,
            index: RwLock::new(Arc::new(InvertedIndex::new())),
            writer: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    pub fn cache(&self) -> Option<&QueryCache> { self.cache.as_ref() }

    /// The currently published index.
    pub fn snapshot(&self) -> Arc<InvertedIndex> {
        self.index.read().clone()
    }

    /// Replaces the whole index from the store's current content.
    pub fn rebuild(&self) -> Result<BuildReport> {
        let _writer = self.writer.lock();
        let documents = self.store.all_documents()?;
        let (next, report) = self.builder.rebuild(&documents, self.store.as_ref())?;
        self.publish(next);
        Ok(report)
    }

    /// Reindexes a single document without a corpus pass.
    pub fn update_one(&self, document: &Document) -> Result<UpdateReport> {
        let _writer = self.writer.lock();
        let current = self.snapshot();
        let (next, report) = self.builder.update(&current, document, self.store.as_ref())?;
        self.publish(next);
        Ok(report)
    }

    /// Installs a previously saved index, e.g. one loaded from disk.
    pub fn restore(&self, index: InvertedIndex) {
        let _writer = self.writer.lock();
        self.publish(index);
    }

    // Callers must hold `self.writer`.
    fn publish(&self, mut next: InvertedIndex) {
        let mut slot = self.index.write();
        let generation = slot.generation() + 1;
        next.set_generation(generation);
        *slot = Arc::new(next);
        drop(slot);
        if let Some(cache) = &self.cache {
            cache.clear();
        }
        debug!(generation, "index published");
    }

    /// Ranked documents for `query`, best first, at most `min(limit, max_results)` of them.
    ///
    /// Multi-term queries are OR queries: a document matching any term is a candidate and
    /// its score is the sum of the weights of every query term it contains, so documents
    /// matching more (or rarer) terms rank higher. Duplicate query terms count once.
    /// Equal scores are ordered by ascending document id. Blank queries, queries that
    /// normalize to nothing and queries without a vocabulary match all give an empty list.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let tokens = self.query_tokens(query)?;
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let index = self.snapshot();
        let hits = self.search_in(&index, &tokens, limit);
        info!(query, hits = hits.len(), generation = index.generation(), "search");
        Ok(hits)
    }

    /// One page of the full ranked list. `page` is 1-based.
    pub fn search_page(&self, query: &str, page: usize, size: usize) -> Result<SearchPage> {
        let page = page.max(1);
        let size = size.clamp(1, self.config.max_results.max(1));
        let all = self.search(query, self.config.max_results)?;
        let total = all.len();
        let hits = all
            .into_iter()
            .skip((page - 1).saturating_mul(size))
            .take(size)
            .collect();
        Ok(SearchPage { total, page, size, hits })
    }

    /// Like [`SearchEngine::search`], plus which query terms the returned hits matched.
    pub fn search_with_details(&self, query: &str, limit: usize) -> Result<SearchDetails> {
        let query_tokens = self.query_tokens(query)?;
        let index = self.snapshot();
        let hits = if query_tokens.is_empty() {
            Vec::new()
        } else {
            self.search_in(&index, &query_tokens, limit)
        };

        let distinct: BTreeSet<&Term> = query_tokens.iter().collect();
        let (matched_terms, unmatched_terms): (Vec<Term>, Vec<Term>) = distinct
            .into_iter()
            .cloned()
            .partition(|term| hits.iter().any(|h| index.terms_of(h.doc_id).binary_search(term).is_ok()));

        Ok(SearchDetails {
            total_results: hits.len(),
            hits,
            query_tokens,
            matched_terms,
            unmatched_terms,
        })
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let index = self.snapshot();
        // RFC 3339 UTC timestamps order lexicographically.
        let last_updated = self
            .store
            .all_documents()?
            .into_iter()
            .filter(|doc| index.contains_doc(doc.id))
            .filter_map(|doc| doc.updated_at)
            .max();
        Ok(IndexStats {
            total_documents: self.store.document_count()?,
            indexed_documents: index.num_indexed_docs(),
            corpus_size: index.num_docs(),
            total_postings: index.num_postings(),
            unique_terms: index.num_terms(),
            avg_document_length: (index.average_terms_per_doc() * 100.0).round() / 100.0,
            generation: index.generation(),
            updates_since_rebuild: index.updates_since_rebuild(),
            last_updated,
        })
    }

    pub fn document(&self, id: DocId) -> Result<Document> {
        self.store.get_document(id)?.ok_or(Error::DocumentNotFound(id))
    }

    /// The first `n` postings in (term, document) order.
    pub fn sample_entries(&self, n: usize) -> Vec<IndexEntry> {
        self.snapshot().entries().take(n).collect()
    }

    fn query_tokens(&self, query: &str) -> Result<Vec<Term>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let tokens = self.preprocessor.normalize(query)?;
        if tokens.is_empty() {
            warn!(query, "query produced no tokens after preprocessing");
        }
        Ok(tokens)
    }

    fn search_in(&self, index: &InvertedIndex, tokens: &[Term], limit: usize) -> Vec<SearchHit> {
        let limit = limit.min(self.config.max_results);
        if limit == 0 {
            return Vec::new();
        }
        let key = tokens.join(" ");
        if let Some(cache) = &self.cache {
            if let Some(hits) = cache.get(&key, limit, index.generation()) {
                debug!(query = %key, limit, "cache hit");
                return hits;
            }
        }

        let hits = self.rank(index, tokens, limit);
        if let Some(cache) = &self.cache {
            cache.put(key, limit, index.generation(), hits.clone());
        }
        hits
    }

    fn rank(&self, index: &InvertedIndex, tokens: &[Term], limit: usize) -> Vec<SearchHit> {
        // Terms are visited in a fixed order so float sums are reproducible.
        let terms: BTreeSet<&str> = tokens.iter().map(String::as_str).collect();
        let mut scores: HashMap<DocId, f64> = HashMap::new();
        for term in terms {
            for posting in index.postings(term) {
                *scores.entry(posting.doc_id).or_insert(0.0) += posting.weight;
            }
        }

        let mut ranked: Vec<(DocId, f64)> = scores
            .into_iter()
            .filter(|&(_, score)| score >= self.config.min_score_threshold)
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
            .into_iter()
            .map(|(doc_id, score)| SearchHit { doc_id, score: round4(score) })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, TextPreprocessor};

    fn engine(docs: Vec<Document>, config: EngineConfig) -> SearchEngine {
        let store = Arc::new(MemoryStore::from_documents(docs));
        SearchEngine::new(store, Arc::new(TextPreprocessor::new()), config)
    }

    fn ids(hits: &[SearchHit]) -> Vec<DocId> {
        hits.iter().map(|h| h.doc_id).collect()
    }

    #[test]
    fn equal_scores_order_by_doc_id() {
        let e = engine(
            vec![
                Document::new(9, "rust", ""),
                Document::new(4, "rust", ""),
                Document::new(6, "rust", ""),
                Document::new(1, "other", ""),
            ],
            EngineConfig::default(),
        );
        e.rebuild().unwrap();
        assert_eq!(ids(&e.search("rust", 10).unwrap()), vec![4, 6, 9]);
    }

    #[test]
    fn limit_is_capped_by_max_results() {
        let docs = (1..=5).map(|i| Document::new(i, "rust", "")).chain([Document::new(99, "java", "")]).collect();
        let cfg = EngineConfig { max_results: 3, ..EngineConfig::default() };
        let e = engine(docs, cfg);
        e.rebuild().unwrap();
        assert_eq!(e.search("rust", 100).unwrap().len(), 3);
        assert!(e.search("rust", 0).unwrap().is_empty());
    }

    #[test]
    fn duplicate_query_terms_count_once() {
        let e = engine(vec![Document::new(1, "rust", ""), Document::new(2, "java", "")], EngineConfig::default());
        e.rebuild().unwrap();
        let once = e.search("rust", 10).unwrap();
        let twice = e.search("rust rust rust", 10).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn details_split_matched_and_unmatched_terms() {
        let e = engine(vec![Document::new(1, "rust crab", ""), Document::new(2, "java", "")], EngineConfig::default());
        e.rebuild().unwrap();
        let details = e.search_with_details("crab quantum", 10).unwrap();
        assert_eq!(ids(&details.hits), vec![1]);
        assert_eq!(details.matched_terms, vec!["crab".to_string()]);
        assert_eq!(details.unmatched_terms, vec!["quantum".to_string()]);
        assert_eq!(details.total_results, 1);
    }

    #[test]
    fn publish_bumps_generation() {
        let e = engine(vec![Document::new(1, "rust", "")], EngineConfig::default());
        assert_eq!(e.snapshot().generation(), 0);
        e.rebuild().unwrap();
        e.rebuild().unwrap();
        assert_eq!(e.snapshot().generation(), 2);
        e.restore(InvertedIndex::new());
        assert_eq!(e.snapshot().generation(), 3);
    }

    #[test]
    fn old_snapshot_survives_rebuild() {
        let store = Arc::new(MemoryStore::from_documents(vec![Document::new(1, "rust", ""), Document::new(2, "java", "")]));
        let e = SearchEngine::new(store.clone(), Arc::new(TextPreprocessor::new()), EngineConfig::default());
        e.rebuild().unwrap();
        let before = e.snapshot();
        store.remove(1);
        store.remove(2);
        e.rebuild().unwrap();
        assert_eq!(before.document_frequency("rust"), 1);
        assert!(e.snapshot().is_empty());
    }

    #[test]
    fn stats_reflect_index() {
        let e = engine(vec![Document::new(1, "rust crab", ""), Document::new(2, "rust", "")], EngineConfig::default());
        e.rebuild().unwrap();
        let stats = e.stats().unwrap();
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.indexed_documents, 2);
        assert_eq!(stats.total_postings, 3);
        assert_eq!(stats.unique_terms, 2);
        assert_eq!(stats.avg_document_length, 1.5);
        assert_eq!(e.sample_entries(2).len(), 2);
        assert_eq!(stats.last_updated, None);
    }

    #[test]
    fn stats_report_latest_update_of_indexed_documents() {
        let stamped = |id: DocId, title: &str, at: &str| {
            let mut doc = Document::new(id, title, "");
            doc.updated_at = Some(at.to_string());
            doc
        };
        let store = Arc::new(MemoryStore::from_documents(vec![
            stamped(1, "rust", "2024-03-01T10:00:00Z"),
            stamped(2, "crab", "2024-05-20T08:30:00Z"),
        ]));
        let e = SearchEngine::new(store.clone(), Arc::new(TextPreprocessor::new()), EngineConfig::default());
        e.rebuild().unwrap();
        // Not indexed yet, so it must not count.
        store.upsert(stamped(3, "java", "2025-01-01T00:00:00Z"));

        assert_eq!(e.stats().unwrap().last_updated.as_deref(), Some("2024-05-20T08:30:00Z"));
    }
}
