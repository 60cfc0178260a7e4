//! LSH bucket tables.
//!
//! There is one table per hash function. A table maps a min hash value to the list of
//! (sequence, window) that had this value for this hash function.
//! Tables only grow, entries are never removed.
//!
//! Locking is per bucket list: the sharded map is locked just the time needed to fetch or
//! create the list, then the list has its own mutex. Insertions in different buckets
//! never wait on each other except on a short shard access.

use std::sync::Arc;

use dashmap::DashMap;
use fxhash::FxBuildHasher;
use parking_lot::Mutex;

use crate::errors::{Result, SearchError};
use crate::seqid::SeqId;
use crate::sketch::MinHashes;

/// A window of a sequence as stored in buckets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct WindowId {
    pub id: SeqId,
    /// rank of the window in the sequence, 0 for whole sequence sketches
    pub window: u32,
}

impl WindowId {
    pub fn new(id: SeqId, window: u32) -> Self {
        WindowId { id, window }
    }
}

type Bucket = Arc<Mutex<Vec<WindowId>>>;

pub struct BucketTables {
    tables: Vec<DashMap<u32, Bucket, FxBuildHasher>>,
}

impl BucketTables {
    /// capacity is the expected number of distinct keys per table
    pub fn new(nb_hashes: usize, capacity: usize) -> Self {
        log::debug!("allocating {} bucket tables, capacity {}", nb_hashes, capacity);
        let tables = (0..nb_hashes)
            .map(|_| DashMap::with_capacity_and_hasher(capacity, FxBuildHasher::default()))
            .collect();
        BucketTables { tables }
    }

    pub fn nb_hashes(&self) -> usize {
        self.tables.len()
    }

    /// adds all windows of signature. Returns the number of windows inserted.
    pub fn insert(&self, id: SeqId, signature: &MinHashes) -> Result<usize> {
        if signature.nb_hashes() != self.tables.len() {
            return Err(SearchError::HashCountMismatch {
                expected: self.tables.len(),
                got: signature.nb_hashes(),
            });
        }
        let mut nb_windows = 0;
        for (window, values) in signature.windows().enumerate() {
            let window_id = WindowId::new(id, window as u32);
            for (table, key) in self.tables.iter().zip(values) {
                // the shard guard is released at end of statement, before we lock the list
                let bucket = Arc::clone(
                    table
                        .entry(*key)
                        .or_insert_with(|| Arc::new(Mutex::new(Vec::with_capacity(2))))
                        .value(),
                );
                bucket.lock().push(window_id);
            }
            nb_windows += 1;
        }
        Ok(nb_windows)
    } // end of insert

    // None if there is no such table or no such key
    fn bucket(&self, hash_rank: usize, key: u32) -> Option<Bucket> {
        self.tables.get(hash_rank)?.get(&key).map(|b| Arc::clone(b.value()))
    }

    /// calls f on each window stored in bucket key of table hash_rank,
    /// returns the number of windows visited (0 if hash_rank is not a table rank)
    pub fn for_each_in_bucket<F>(&self, hash_rank: usize, key: u32, mut f: F) -> usize
    where
        F: FnMut(&WindowId),
    {
        match self.bucket(hash_rank, key) {
            Some(bucket) => {
                let list = bucket.lock();
                list.iter().for_each(&mut f);
                list.len()
            }
            None => 0,
        }
    }

    /// number of non empty buckets over all tables
    pub fn nb_buckets(&self) -> usize {
        self.tables.iter().map(|t| t.len()).sum()
    }

    /// Mean over tables of the normalized entropy of bucket occupancy.
    /// 1. means windows are spread evenly over buckets, 0. that they all fall in one bucket.
    pub fn normalized_entropy(&self) -> f64 {
        if self.tables.is_empty() {
            return 0.;
        }
        let sum: f64 = self.tables.iter().map(table_entropy).sum();
        sum / self.tables.len() as f64
    }
} // end of impl BucketTables

fn table_entropy(table: &DashMap<u32, Bucket, FxBuildHasher>) -> f64 {
    let sizes: Vec<usize> = table.iter().map(|b| b.value().lock().len()).collect();
    if sizes.len() <= 1 {
        return 0.;
    }
    let total = sizes.iter().sum::<usize>() as f64;
    let entropy: f64 = sizes
        .iter()
        .filter(|s| **s > 0)
        .map(|s| {
            let p = *s as f64 / total;
            -p * p.ln()
        })
        .sum();
    entropy / (sizes.len() as f64).ln()
} // end of table_entropy

//==========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let tables = BucketTables::new(3, 10);
        let id1 = SeqId::forward(1);
        let id2 = SeqId::forward(2);
        tables.insert(id1, &MinHashes::whole(vec![10, 20, 30]).unwrap()).unwrap();
        tables.insert(id2, &MinHashes::whole(vec![10, 21, 30]).unwrap()).unwrap();
        //
        let mut seen = Vec::new();
        assert_eq!(tables.for_each_in_bucket(0, 10, |w| seen.push(*w)), 2);
        assert!(seen.contains(&WindowId::new(id1, 0)));
        assert!(seen.contains(&WindowId::new(id2, 0)));
        assert_eq!(tables.for_each_in_bucket(1, 20, |_| ()), 1);
        // a key of table 0 is not a key of table 1
        assert_eq!(tables.for_each_in_bucket(1, 10, |_| ()), 0);
        assert_eq!(tables.nb_buckets(), 4);
        // rank past the last table
        assert_eq!(tables.for_each_in_bucket(3, 10, |_| ()), 0);
    }

    #[test]
    fn test_windows_and_mismatch() {
        let tables = BucketTables::new(2, 10);
        let id = SeqId::forward(5);
        let signature = MinHashes::new(2, vec![1, 2, 3, 4, 1, 9]).unwrap();
        assert_eq!(tables.insert(id, &signature).unwrap(), 3);
        let mut windows = Vec::new();
        tables.for_each_in_bucket(0, 1, |w| windows.push(w.window));
        windows.sort();
        assert_eq!(windows, vec![0, 2]);
        //
        let bad = MinHashes::whole(vec![1, 2, 3]).unwrap();
        assert!(matches!(
            tables.insert(id, &bad),
            Err(SearchError::HashCountMismatch { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn test_concurrent_same_bucket() {
        let tables = BucketTables::new(4, 10);
        crossbeam_utils::thread::scope(|s| {
            for t in 0..8u64 {
                let tables = &tables;
                s.spawn(move |_| {
                    for i in 0..500u64 {
                        let id = SeqId::forward(t * 1000 + i);
                        tables.insert(id, &MinHashes::whole(vec![1, 2, 3, (i % 7) as u32]).unwrap()).unwrap();
                    }
                });
            }
        })
        .unwrap();
        assert_eq!(tables.for_each_in_bucket(0, 1, |_| ()), 4000);
        assert_eq!(tables.for_each_in_bucket(2, 3, |_| ()), 4000);
        let total_last: usize = (0..7).map(|k| tables.for_each_in_bucket(3, k, |_| ())).sum();
        assert_eq!(total_last, 4000);
    }

    #[test]
    fn test_entropy() {
        let even = BucketTables::new(1, 10);
        for i in 0..8u64 {
            even.insert(SeqId::forward(i), &MinHashes::whole(vec![i as u32]).unwrap()).unwrap();
        }
        assert!((even.normalized_entropy() - 1.).abs() < 1.0e-10);
        //
        let collapsed = BucketTables::new(1, 10);
        for i in 0..8u64 {
            collapsed.insert(SeqId::forward(i), &MinHashes::whole(vec![0]).unwrap()).unwrap();
        }
        assert_eq!(collapsed.normalized_entropy(), 0.);
    }
} // end of mod tests
