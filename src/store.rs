//! Sketch store: the owner of all inserted sketches.
//!
//! Each id can be inserted once. Insertion is an atomic insert-if-absent, so a rejected
//! duplicate never touches the sketch already stored, even under concurrent inserts.
//! Readers do not block each other: the map is sharded and values are shared through `Arc`.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fxhash::FxBuildHasher;

use crate::errors::{Result, SearchError};
use crate::seqid::SeqId;
use crate::sketch::Sketch;

pub struct SketchStore<P> {
    sketches: DashMap<SeqId, Arc<Sketch<P>>, FxBuildHasher>,
}

impl<P> SketchStore<P> {
    /// capacity is the expected number of sketches
    pub fn new(capacity: usize) -> Self {
        SketchStore {
            sketches: DashMap::with_capacity_and_hasher(capacity, FxBuildHasher::default()),
        }
    }

    /// stores sketch, fails with DuplicateSequence if its id is already present
    pub fn insert(&self, sketch: Arc<Sketch<P>>) -> Result<()> {
        let id = sketch.get_id();
        match self.sketches.entry(id) {
            Entry::Occupied(_) => {
                log::error!("SketchStore insert, sequence id {} already exists", id);
                Err(SearchError::DuplicateSequence(id))
            }
            Entry::Vacant(slot) => {
                slot.insert(sketch);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &SeqId) -> Option<Arc<Sketch<P>>> {
        self.sketches.get(id).map(|s| Arc::clone(s.value()))
    }

    pub fn contains(&self, id: &SeqId) -> bool {
        self.sketches.contains_key(id)
    }

    /// number of sketches stored, both strands counted
    pub fn len(&self) -> usize {
        self.sketches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sketches.is_empty()
    }

    /// ids of forward strand sketches. Reverse strands are not enumerated.
    pub fn forward_ids(&self) -> Vec<SeqId> {
        let mut ids = Vec::<SeqId>::with_capacity(self.sketches.len());
        for entry in self.sketches.iter() {
            if entry.key().is_forward() {
                ids.push(*entry.key());
            }
        }
        ids
    }
} // end of impl SketchStore

//==========================================================================

// end of mod tests
