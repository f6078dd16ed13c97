//! TF-IDF inverted index over short publication records (title + abstract).
//!
//! The pieces, leaf first:
//! - [`tokenizer`]: the [`Preprocessor`] contract and the stemming [`TextPreprocessor`].
//! - [`index`]: the [`InvertedIndex`] data store and its postings.
//! - [`scorer`]: TF-IDF weight computation.
//! - [`builder`]: full rebuild and single-document incremental update.
//! - [`cache`]: generation-tagged LRU cache of ranked answers.
//! - [`engine`]: the [`SearchEngine`] service tying everything together.
//! - [`persist`]: on-disk snapshots used by the indexer and server binaries.

pub mod builder;
pub mod cache;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod index;
pub mod persist;
pub mod scorer;
pub mod tokenizer;

pub use builder::{BuildReport, BuildStatus, IndexBuilder, UpdateReport};
pub use cache::QueryCache;
pub use config::EngineConfig;
pub use document::{DocId, Document, DocumentStore, MemoryStore};
pub use engine::{IndexStats, SearchDetails, SearchEngine, SearchHit, SearchPage};
pub use error::{Error, Result};
pub use index::{IndexEntry, InvertedIndex, Posting, Term};
pub use tokenizer::{Preprocessor, PreprocessingInfo, TextPreprocessor};
