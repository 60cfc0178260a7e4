//! Sketches as seen by the search engine.
//!
//! A [`Sketch`] is built outside this crate. The engine only needs its identity, the length
//! of the sequence, the min hash values used as bucket keys and an opaque payload that is
//! handed back to a [`Verifier`] for the exact comparison of two sequences.
//!
//! The min hashes of a sequence are organised in windows: each window holds one value per hash
//! function. A sketch of the whole sequence is the one window case, a sequence cut in
//! sub-sequences has as many windows as sub-sequences.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SearchError};
use crate::seqid::SeqId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinHashes {
    /// number of hash functions, (H)
    nb_hashes: usize,
    /// nb_windows * nb_hashes values, window after window
    values: Vec<u32>,
}

impl MinHashes {
    /// values must contain a whole number of windows of nb_hashes values
    pub fn new(nb_hashes: usize, values: Vec<u32>) -> Result<Self> {
        if nb_hashes == 0 {
            return Err(SearchError::InvalidParameter("min hashes with 0 hash function".to_string()));
        }
        if values.is_empty() || values.len() % nb_hashes != 0 {
            return Err(SearchError::HashCountMismatch {
                expected: nb_hashes,
                got: values.len(),
            });
        }
        Ok(MinHashes { nb_hashes, values })
    }

    /// one window covering the whole sequence
    pub fn whole(values: Vec<u32>) -> Result<Self> {
        let nb_hashes = values.len();
        MinHashes::new(nb_hashes, values)
    }

    /// builds from sub-sequence signatures, all of the same length
    pub fn from_windows(windows: &[Vec<u32>]) -> Result<Self> {
        let nb_hashes = windows.first().map(|w| w.len()).unwrap_or(0);
        if let Some(bad) = windows.iter().find(|w| w.len() != nb_hashes) {
            return Err(SearchError::HashCountMismatch {
                expected: nb_hashes,
                got: bad.len(),
            });
        }
        MinHashes::new(nb_hashes, windows.concat())
    }

    pub fn nb_hashes(&self) -> usize {
        self.nb_hashes
    }

    pub fn nb_windows(&self) -> usize {
        self.values.len() / self.nb_hashes
    }

    /// iterates on windows, each a slice of nb_hashes values
    pub fn windows(&self) -> std::slice::ChunksExact<'_, u32> {
        self.values.chunks_exact(self.nb_hashes)
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }
} // end of impl MinHashes

//======================================================================

/// Immutable signature of a sequence.
#[derive(Clone, Debug)]
pub struct Sketch<P> {
    id: SeqId,
    /// length of sequence in bases
    length: usize,
    signature: MinHashes,
    /// what the verifier needs to compare 2 sequences exactly
    payload: P,
}

impl<P> Sketch<P> {
    pub fn new(id: SeqId, length: usize, signature: MinHashes, payload: P) -> Self {
        Sketch {
            id,
            length,
            signature,
            payload,
        }
    }

    pub fn get_id(&self) -> SeqId {
        self.id
    }

    pub fn get_length(&self) -> usize {
        self.length
    }

    pub fn get_signature(&self) -> &MinHashes {
        &self.signature
    }

    pub fn get_payload(&self) -> &P {
        &self.payload
    }
} // end of impl Sketch

//======================================================================

/// Result of an exact comparison.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlapInfo {
    /// in [0,1]
    pub score: f64,
    /// offset of the candidate start relative to the query start
    pub shift: i64,
}

impl OverlapInfo {
    pub fn new(score: f64, shift: i64) -> Self {
        OverlapInfo { score, shift }
    }
}

/// Exact comparison of the payloads of two sketches.
///
/// Must be deterministic: the same pair of payloads always gives the same answer.
/// It is called concurrently from query threads.
pub trait Verifier<P>: Send + Sync {
    /// max_shift bounds the shift explored, as a fraction of the query length
    fn compare(&self, query: &P, candidate: &P, max_shift: f64) -> OverlapInfo;
}

//======================================================================

// end of mod tests
