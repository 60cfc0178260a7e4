//! Vote counting for one query.
//!
//! Each bucket shared by a query window and a candidate window is one vote for the pair
//! (candidate window, query window). The more buckets shared, the more likely an overlap.
//! When sequences are cut in windows the votes are then reduced to the best window pair
//! of each candidate sequence.

use fxhash::FxHashMap;

use crate::index::WindowId;
use crate::seqid::SeqId;

pub struct HitCounter {
    /// (candidate window, query window) -> nb of shared buckets
    hits: FxHashMap<(WindowId, u32), u32>,
}

impl HitCounter {
    pub fn with_capacity(capacity: usize) -> Self {
        HitCounter {
            hits: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    #[inline]
    pub fn add_hit(&mut self, candidate: &WindowId, query_window: u32) {
        *self.hits.entry((*candidate, query_window)).or_insert(0) += 1;
    }

    /// number of distinct window pairs hit
    pub fn nb_window_pairs(&self) -> usize {
        self.hits.len()
    }

    /// reduces votes to the best window pair of each candidate sequence
    pub fn best_per_sequence(&self) -> FxHashMap<SeqId, u32> {
        let mut best = FxHashMap::<SeqId, u32>::with_capacity_and_hasher(self.hits.len(), Default::default());
        for ((candidate, _), count) in &self.hits {
            let current = best.entry(candidate.id).or_insert(0);
            if *current < *count {
                *current = *count;
            }
        }
        best
    }
} // end of impl HitCounter

// end of mod tests
