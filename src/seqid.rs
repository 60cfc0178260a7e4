//! Sequence identities.
//!
//! A sequence is identified by a numeric id, unique per physical sequence, and a strand.
//! The forward and reverse complement sketches of a read share the numeric id.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeqId {
    id: u64,
    forward: bool,
}

impl SeqId {
    pub fn new(id: u64, forward: bool) -> Self {
        SeqId { id, forward }
    }

    /// the forward strand id
    pub fn forward(id: u64) -> Self {
        SeqId { id, forward: true }
    }

    /// same physical sequence, opposite strand
    pub fn complement(&self) -> Self {
        SeqId {
            id: self.id,
            forward: !self.forward,
        }
    }

    pub fn is_forward(&self) -> bool {
        self.forward
    }

    /// numeric id, shared by both strands. Used alone to order pairs when deduplicating.
    pub fn header_id(&self) -> u64 {
        self.id
    }

    /// true if both ids designate the same physical sequence
    pub fn same_sequence(&self, other: &SeqId) -> bool {
        self.id == other.id
    }
} // end of impl SeqId

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strand = if self.forward { "fwd" } else { "rev" };
        write!(f, "{}({})", self.id, strand)
    }
}

//==========================================================================

/// Hands out numeric ids to producers of sketches.
///
/// The allocator is passed explicitly to whatever creates sketches, so two independent
/// sets of sequences (an indexed file and a query file) can use distinct id ranges by
/// starting from different offsets.
#[derive(Debug, Default)]
pub struct IdAllocator {
    counter: AtomicU64,
}

impl IdAllocator {
    /// the first id returned will be offset + 1
    pub fn new(offset: u64) -> Self {
        IdAllocator {
            counter: AtomicU64::new(offset),
        }
    }

    /// returns a fresh forward id
    pub fn next_id(&self) -> SeqId {
        let id = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        SeqId::forward(id)
    }

    /// the last numeric id handed out (or the offset if none)
    pub fn last_id(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
} // end of impl IdAllocator

//==========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    #[test]
    fn test_strands_are_distinct() {
        let fwd = SeqId::forward(7);
        let rev = fwd.complement();
        assert_ne!(fwd, rev);
        assert!(fwd.same_sequence(&rev));
        assert_eq!(rev.complement(), fwd);
        assert!(!rev.is_forward());
        //
        let set: HashSet<SeqId> = [fwd, rev, SeqId::new(7, true)].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(format!("{}", rev), "7(rev)");
    }

    #[test]
    fn test_allocator_concurrent() {
        let allocator = IdAllocator::new(100);
        let ids: Vec<u64> = crossbeam_utils::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|_| (0..250).map(|_| allocator.next_id().header_id()).collect::<Vec<u64>>()))
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        })
        .unwrap();
        let unique: HashSet<u64> = ids.iter().copied().collect();
        assert_eq!(unique.len(), 1000);
        assert_eq!(*unique.iter().min().unwrap(), 101);
        assert_eq!(allocator.last_id(), 1100);
    }
} // end of mod tests
