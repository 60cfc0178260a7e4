//! Rules deciding which candidates of a query go to exact verification.
//!
//! Rules are applied in order, the first one failing excludes the candidate:
//!
//! 1. a sequence is never matched with itself, whatever the strand
//! 2. in self search, a pair of long sequences is reported only from the query with the
//!    lower numeric id, so each pair is reported once
//! 3. two short sequences are never compared
//! 4. in self search, a long query does not report a short candidate
//! 5. the candidate must have at least min_matches votes
//!
//! A sequence is short if its length is below min_store_length.

use serde::{Deserialize, Serialize};

use crate::seqid::SeqId;

/// Do we search the index with sequences it contains (all pairs) or with other sequences.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    SelfSearch,
    ExternalQuery,
}

/// Why a candidate was dropped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    SameSequence,
    /// long pair, reported from the other direction
    SymmetricPair,
    ShortShort,
    ShortTarget,
    TooFewVotes,
}

/// What the filter needs to know about a query or a candidate
#[derive(Copy, Clone, Debug)]
pub struct Participant {
    pub id: SeqId,
    pub length: usize,
}

impl Participant {
    pub fn new(id: SeqId, length: usize) -> Self {
        Participant { id, length }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct FilterPolicy {
    min_store_length: usize,
    min_matches: u32,
}

impl FilterPolicy {
    pub fn new(min_store_length: usize, min_matches: u32) -> Self {
        FilterPolicy {
            min_store_length,
            min_matches,
        }
    }

    #[inline]
    pub fn is_short(&self, length: usize) -> bool {
        length < self.min_store_length
    }

    /// Ok if candidate must be verified, else the first rule that excluded it
    pub fn admit(&self, query: &Participant, candidate: &Participant, nb_votes: u32, mode: SearchMode) -> Result<(), Rejection> {
        if candidate.id.same_sequence(&query.id) {
            return Err(Rejection::SameSequence);
        }
        let query_short = self.is_short(query.length);
        let candidate_short = self.is_short(candidate.length);
        let self_search = mode == SearchMode::SelfSearch;
        //
        if self_search && !query_short && !candidate_short && candidate.id.header_id() < query.id.header_id() {
            return Err(Rejection::SymmetricPair);
        }
        if query_short && candidate_short {
            return Err(Rejection::ShortShort);
        }
        if self_search && candidate_short && !query_short {
            return Err(Rejection::ShortTarget);
        }
        if nb_votes < self.min_matches {
            return Err(Rejection::TooFewVotes);
        }
        Ok(())
    } // end of admit
} // end of impl FilterPolicy

//==========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(id: u64, forward: bool, length: usize) -> Participant {
        Participant::new(SeqId::new(id, forward), length)
    }

    #[test]
    fn test_same_sequence_any_strand() {
        let policy = FilterPolicy::new(100, 2);
        let query = participant(4, true, 500);
        for mode in [SearchMode::SelfSearch, SearchMode::ExternalQuery] {
            assert_eq!(policy.admit(&query, &participant(4, false, 500), 10, mode), Err(Rejection::SameSequence));
            assert_eq!(policy.admit(&query, &participant(4, true, 500), 10, mode), Err(Rejection::SameSequence));
        }
    }

    #[test]
    fn test_long_pair_reported_once() {
        let policy = FilterPolicy::new(100, 2);
        let a = participant(1, true, 500);
        let b = participant(2, true, 500);
        assert_eq!(policy.admit(&a, &b, 5, SearchMode::SelfSearch), Ok(()));
        assert_eq!(policy.admit(&b, &a, 5, SearchMode::SelfSearch), Err(Rejection::SymmetricPair));
        // reverse strand of a lower id is also dropped
        assert_eq!(
            policy.admit(&b, &participant(1, false, 500), 5, SearchMode::SelfSearch),
            Err(Rejection::SymmetricPair)
        );
        // no dedup for external queries
        assert_eq!(policy.admit(&b, &a, 5, SearchMode::ExternalQuery), Ok(()));
    }

    #[test]
    fn test_short_rules() {
        let policy = FilterPolicy::new(100, 2);
        let long_low = participant(1, true, 500);
        let short_high = participant(2, true, 50);
        let short_other = participant(3, true, 60);
        // short query keeps a long candidate of lower id
        assert_eq!(policy.admit(&short_high, &long_low, 5, SearchMode::SelfSearch), Ok(()));
        // long query does not report a short target in self search
        assert_eq!(policy.admit(&long_low, &short_high, 5, SearchMode::SelfSearch), Err(Rejection::ShortTarget));
        assert_eq!(policy.admit(&long_low, &short_high, 5, SearchMode::ExternalQuery), Ok(()));
        // never short to short
        for mode in [SearchMode::SelfSearch, SearchMode::ExternalQuery] {
            assert_eq!(policy.admit(&short_high, &short_other, 5, mode), Err(Rejection::ShortShort));
        }
    }

    #[test]
    fn test_votes_threshold() {
        let policy = FilterPolicy::new(0, 3);
        let a = participant(1, true, 10);
        let b = participant(2, false, 10);
        assert_eq!(policy.admit(&a, &b, 2, SearchMode::SelfSearch), Err(Rejection::TooFewVotes));
        assert_eq!(policy.admit(&a, &b, 3, SearchMode::SelfSearch), Ok(()));
        // with min_store_length 0 nothing is short
        assert!(!policy.is_short(0));
    }
} // end of mod tests
