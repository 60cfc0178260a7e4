//! Errors raised while building and querying the overlap index.
//!
//! All variants but [`SearchError::NoValidUnits`] are fatal: they abort a build or a query and
//! must be propagated to the caller. A record with no valid comparison unit only invalidates
//! that record and the stream readers skip it.

use thiserror::Error;

use crate::seqid::SeqId;

#[derive(Debug, Error)]
pub enum SearchError {
    /// signature of a sketch does not have the number of hash functions the index was built with
    #[error("number of hashes does not match, stored size {expected}, input size {got}")]
    HashCountMismatch { expected: usize, got: usize },

    #[error("sequence id {0} already exists in the sketch store")]
    DuplicateSequence(SeqId),

    /// an id was found in a bucket but not in the store, the index is corrupted
    #[error("sketch not found in store for id {0}")]
    MissingSketch(SeqId),

    #[error("could not process sketch for a read, zero valid comparison units found: {message}")]
    NoValidUnits { message: String },

    #[error("truncated record in sketch stream, expected {expected} bytes, got {got}")]
    TruncatedRecord { expected: usize, got: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("build aborted: {0}")]
    BuildAborted(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SearchError {
    /// true if the error concerns a single record and the stream can go on
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SearchError::NoValidUnits { .. })
    }
} // end of impl SearchError

pub type Result<T> = std::result::Result<T, SearchError>;
