//! An accepted overlap between a query and a candidate.

use serde::{Deserialize, Serialize};

use crate::seqid::SeqId;
use crate::sketch::OverlapInfo;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    query_id: SeqId,
    candidate_id: SeqId,
    /// verifier score, in [0,1]
    score: f64,
    /// shift of candidate start relative to query start
    forward_shift: i64,
    /// shift of candidate end relative to query end
    reverse_shift: i64,
    query_length: usize,
    candidate_length: usize,
}

impl MatchResult {
    pub fn new(query_id: SeqId, candidate_id: SeqId, overlap: OverlapInfo, query_length: usize, candidate_length: usize) -> Self {
        let forward_shift = overlap.shift;
        let reverse_shift = -forward_shift - query_length as i64 + candidate_length as i64;
        MatchResult {
            query_id,
            candidate_id,
            score: overlap.score,
            forward_shift,
            reverse_shift,
            query_length,
            candidate_length,
        }
    }

    pub fn get_query_id(&self) -> SeqId {
        self.query_id
    }

    pub fn get_candidate_id(&self) -> SeqId {
        self.candidate_id
    }

    pub fn get_score(&self) -> f64 {
        self.score
    }

    pub fn get_forward_shift(&self) -> i64 {
        self.forward_shift
    }

    pub fn get_reverse_shift(&self) -> i64 {
        self.reverse_shift
    }

    pub fn get_query_length(&self) -> usize {
        self.query_length
    }

    pub fn get_candidate_length(&self) -> usize {
        self.candidate_length
    }
} // end of impl MatchResult

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_shift() {
        let res = MatchResult::new(SeqId::forward(1), SeqId::forward(2), OverlapInfo::new(0.9, 50), 1000, 900);
        assert_eq!(res.get_forward_shift(), 50);
        assert_eq!(res.get_reverse_shift(), -150);
        //
        let res = MatchResult::new(SeqId::forward(1), SeqId::new(2, false), OverlapInfo::new(0.9, -20), 500, 800);
        assert_eq!(res.get_reverse_shift(), 320);
    }
}
