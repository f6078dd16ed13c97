use crate::DocId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the public operations of this crate.
///
/// "No documents" and "no matches" are not errors; they are reported through
/// [`crate::BuildStatus::NoDocuments`] and empty hit lists respectively.
#[derive(Error, Debug)]
pub enum Error {
    #[error("document store error: {0}")]
    Store(String),

    #[error("preprocessing error: {0}")]
    Preprocess(String),

    #[error("document {0} not found")]
    DocumentNotFound(DocId),
}
