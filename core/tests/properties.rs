use proptest::prelude::*;
use pubsearch_core::{Document, IndexBuilder, MemoryStore, TextPreprocessor};
use std::collections::HashSet;
use std::sync::Arc;

const VOCAB: &[&str] = &[
    "rust", "crab", "python", "graph", "network", "search", "index", "protein", "compiler", "learning",
];

fn corpus() -> impl Strategy<Value = Vec<Document>> {
    prop::collection::vec(prop::collection::vec(prop::sample::select(VOCAB), 0..8), 0..12).prop_map(|docs| {
        docs.into_iter()
            .enumerate()
            .map(|(i, words)| Document::new(i as u32 + 1, words.join(" "), ""))
            .collect()
    })
}

fn distinct_terms(doc: &Document) -> HashSet<String> {
    TextPreprocessor::new().tokens(&doc.indexable_text()).into_iter().collect()
}

fn builder() -> IndexBuilder {
    IndexBuilder::new(Arc::new(TextPreprocessor::new()))
}

proptest! {
    #[test]
    fn df_matches_documents_containing_term(docs in corpus()) {
        let store = MemoryStore::from_documents(docs.clone());
        let (index, _) = builder().rebuild(&docs, &store).unwrap();
        prop_assert!(index.is_consistent());

        let per_doc: Vec<HashSet<String>> = docs.iter().map(distinct_terms).collect();
        let vocabulary: HashSet<&String> = per_doc.iter().flatten().collect();
        prop_assert_eq!(index.num_terms(), vocabulary.len());
        for term in vocabulary {
            let expected = per_doc.iter().filter(|terms| terms.contains(term)).count() as u32;
            prop_assert_eq!(index.document_frequency(term), expected);
            for posting in index.postings(term) {
                prop_assert!(posting.weight >= 0.0);
                if expected as usize == docs.len() {
                    prop_assert_eq!(posting.weight, 0.0);
                }
            }
        }
    }

    #[test]
    fn rebuild_is_idempotent(docs in corpus()) {
        let store = MemoryStore::from_documents(docs.clone());
        let b = builder();
        let (first, r1) = b.rebuild(&docs, &store).unwrap();
        let (second, r2) = b.rebuild(&docs, &store).unwrap();
        prop_assert_eq!(r1, r2);
        prop_assert_eq!(bincode::serialize(&first).unwrap(), bincode::serialize(&second).unwrap());
    }

    #[test]
    fn incremental_update_keeps_df_exact(docs in corpus(), pick in any::<prop::sample::Index>(), words in prop::collection::vec(prop::sample::select(VOCAB), 0..6)) {
        prop_assume!(!docs.is_empty());
        let store = MemoryStore::from_documents(docs.clone());
        let b = builder();
        let (index, _) = b.rebuild(&docs, &store).unwrap();

        let target = pick.index(docs.len());
        let replacement = Document::new(docs[target].id, words.join(" "), "");
        store.upsert(replacement.clone());
        let (next, _) = b.update(&index, &replacement, &store).unwrap();
        prop_assert!(next.is_consistent());

        let mut current = docs.clone();
        current[target] = replacement;
        let per_doc: Vec<HashSet<String>> = current.iter().map(distinct_terms).collect();
        let vocabulary: HashSet<&String> = per_doc.iter().flatten().collect();
        prop_assert_eq!(next.num_terms(), vocabulary.len());
        for term in vocabulary {
            let expected = per_doc.iter().filter(|terms| terms.contains(term)).count() as u32;
            prop_assert_eq!(next.document_frequency(term), expected);
        }
    }
}
