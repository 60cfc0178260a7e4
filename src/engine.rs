//! The overlap search engine.
//!
//! Sketches are inserted (possibly by many threads) in a [`SketchStore`] and, for long
//! sequences, in the LSH [`BucketTables`]. Once the build is joined the engine can be queried
//! concurrently: a query votes for each stored window sharing a bucket with one of its windows,
//! candidates surviving the [`FilterPolicy`] are compared exactly by the [`Verifier`], and those
//! scoring at least `accept_score` are returned as [`MatchResult`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use cpu_time::ProcessTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SearchError};
use crate::filter::{FilterPolicy, Participant, SearchMode};
use crate::index::BucketTables;
use crate::results::MatchResult;
use crate::seqid::SeqId;
use crate::sketch::{Sketch, Verifier};
use crate::store::SketchStore;
use crate::stream::source::SketchSource;
use crate::utils::{run_workers, SearchParams};
use crate::vote::HitCounter;

#[derive(Default)]
struct SearchCounters {
    nb_sequences_indexed: AtomicU64,
    nb_sub_windows_indexed: AtomicU64,
    nb_bucket_hits: AtomicU64,
    nb_windows_hit: AtomicU64,
    nb_sequences_hit: AtomicU64,
    nb_fully_compared: AtomicU64,
    nb_long_stored: AtomicU64,
}

impl SearchCounters {
    fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            nb_sequences_indexed: self.nb_sequences_indexed.load(Ordering::Relaxed),
            nb_sub_windows_indexed: self.nb_sub_windows_indexed.load(Ordering::Relaxed),
            nb_bucket_hits: self.nb_bucket_hits.load(Ordering::Relaxed),
            nb_windows_hit: self.nb_windows_hit.load(Ordering::Relaxed),
            nb_sequences_hit: self.nb_sequences_hit.load(Ordering::Relaxed),
            nb_fully_compared: self.nb_fully_compared.load(Ordering::Relaxed),
            nb_long_stored: self.nb_long_stored.load(Ordering::Relaxed),
        }
    }
} // end of impl SearchCounters

/// Values of the engine counters at some point.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersSnapshot {
    /// sequences inserted in bucket tables
    pub nb_sequences_indexed: u64,
    pub nb_sub_windows_indexed: u64,
    /// window ids visited in buckets by queries
    pub nb_bucket_hits: u64,
    /// distinct (candidate window, query window) pairs with at least one vote
    pub nb_windows_hit: u64,
    /// distinct candidate sequences with at least one vote
    pub nb_sequences_hit: u64,
    /// candidates passed to the verifier
    pub nb_fully_compared: u64,
    /// sketches stored with length >= min_store_length
    pub nb_long_stored: u64,
}

//=====================================================================================

pub struct SearchEngine<P, V> {
    params: SearchParams,
    policy: FilterPolicy,
    store: SketchStore<P>,
    index: BucketTables,
    counters: SearchCounters,
    verifier: V,
}

impl<P, V> SearchEngine<P, V>
where
    P: Send + Sync,
    V: Verifier<P>,
{
    /// an empty engine
    pub fn new(params: SearchParams, verifier: V) -> Result<Self> {
        SearchEngine::with_capacity(params, verifier, 0, 0)
    }

    /// an empty engine with store sized for nb_sequences and tables for nb_windows
    pub fn with_capacity(params: SearchParams, verifier: V, nb_sequences: usize, nb_windows: usize) -> Result<Self> {
        params.check()?;
        log::info!(
            "SearchEngine::new nb hashes : {}, min matches : {}, min store length : {}, accept score : {}",
            params.num_hashes,
            params.min_matches,
            params.min_store_length,
            params.accept_score
        );
        Ok(SearchEngine {
            params,
            policy: FilterPolicy::new(params.min_store_length, params.min_matches),
            store: SketchStore::new(nb_sequences),
            index: BucketTables::new(params.num_hashes, nb_windows),
            counters: SearchCounters::default(),
            verifier,
        })
    }

    /// Builds an engine holding all sketches of source.
    /// Tables are sized from what source has already processed (all of it for a closed [`crate::stream::SketchQueue`]).
    pub fn from_source<S>(params: SearchParams, verifier: V, source: &S, nb_workers: usize) -> Result<Self>
    where
        S: SketchSource<P> + ?Sized,
    {
        let engine = SearchEngine::with_capacity(params, verifier, source.nb_processed(), source.nb_sub_windows_processed())?;
        engine.build(source, nb_workers)?;
        Ok(engine)
    }

    pub fn get_params(&self) -> &SearchParams {
        &self.params
    }

    fn check_nb_hashes(&self, sketch: &Sketch<P>) -> Result<()> {
        let got = sketch.get_signature().nb_hashes();
        if got != self.params.num_hashes {
            log::error!(
                "sketch {} has {} hashes, engine has {}",
                sketch.get_id(),
                got,
                self.params.num_hashes
            );
            return Err(SearchError::HashCountMismatch {
                expected: self.params.num_hashes,
                got,
            });
        }
        Ok(())
    }

    /// Stores sketch and, if it is long (or short targets are indexed), adds its windows to buckets.
    pub fn insert(&self, sketch: Sketch<P>) -> Result<()> {
        self.check_nb_hashes(&sketch)?;
        let sketch = Arc::new(sketch);
        self.store.insert(Arc::clone(&sketch))?;
        //
        let short = self.policy.is_short(sketch.get_length());
        if !short {
            self.counters.nb_long_stored.fetch_add(1, Ordering::Relaxed);
        }
        if !short || self.params.index_short_targets {
            let nb_windows = self.index.insert(sketch.get_id(), sketch.get_signature())?;
            self.counters.nb_sequences_indexed.fetch_add(1, Ordering::Relaxed);
            self.counters
                .nb_sub_windows_indexed
                .fetch_add(nb_windows as u64, Ordering::Relaxed);
        } else {
            log::trace!("short sequence {} stored but not indexed", sketch.get_id());
        }
        Ok(())
    } // end of insert

    /// Inserts all sketches of source with nb_workers threads.
    /// Returns when all workers are joined, with the number of sketches inserted or the first error.
    pub fn build<S>(&self, source: &S, nb_workers: usize) -> Result<usize>
    where
        S: SketchSource<P> + ?Sized,
    {
        log::info!("SearchEngine::build with {} workers", nb_workers);
        let start_t = SystemTime::now();
        let cpu_start = ProcessTime::now();
        //
        let nb_inserted = run_workers(nb_workers, |abort| {
            let mut nb = 0;
            while !abort.load(Ordering::Relaxed) {
                match source.next_sketch()? {
                    Some(sketch) => {
                        self.insert(sketch)?;
                        nb += 1;
                    }
                    None => break,
                }
            }
            Ok(nb)
        })?;
        //
        let cpu_time = cpu_start.try_elapsed().unwrap_or_default();
        let sys_time = start_t.elapsed().unwrap_or_default();
        let counters = self.counters();
        log::info!(
            "SearchEngine::build inserted {} sketches, {} indexed, {} windows indexed, {} long stored",
            nb_inserted,
            counters.nb_sequences_indexed,
            counters.nb_sub_windows_indexed,
            counters.nb_long_stored
        );
        log::info!(
            "SearchEngine::build sys time(s) {:.2e} cpu time(s) {:.2e}",
            sys_time.as_secs_f64(),
            cpu_time.as_secs_f64()
        );
        Ok(nb_inserted)
    } // end of build

    /// Returns the accepted overlaps of query, in no particular order.
    pub fn find_matches(&self, query: &Sketch<P>, mode: SearchMode) -> Result<Vec<MatchResult>> {
        self.check_nb_hashes(query)?;
        let query_id = query.get_id();
        //
        let mut hit_counter = HitCounter::with_capacity(64);
        let mut nb_bucket_hits = 0;
        for (query_window, values) in query.get_signature().windows().enumerate() {
            for (hash_rank, key) in values.iter().enumerate() {
                nb_bucket_hits += self.index.for_each_in_bucket(hash_rank, *key, |window_id| {
                    hit_counter.add_hit(window_id, query_window as u32)
                });
            }
        }
        let best = hit_counter.best_per_sequence();
        self.counters
            .nb_bucket_hits
            .fetch_add(nb_bucket_hits as u64, Ordering::Relaxed);
        self.counters
            .nb_windows_hit
            .fetch_add(hit_counter.nb_window_pairs() as u64, Ordering::Relaxed);
        self.counters
            .nb_sequences_hit
            .fetch_add(best.len() as u64, Ordering::Relaxed);
        //
        let query_part = Participant::new(query_id, query.get_length());
        let mut results = Vec::<MatchResult>::new();
        for (candidate_id, nb_votes) in best {
            let candidate = self.store.get(&candidate_id).ok_or_else(|| {
                log::error!("candidate {} found in buckets but not in store", candidate_id);
                SearchError::MissingSketch(candidate_id)
            })?;
            let candidate_part = Participant::new(candidate_id, candidate.get_length());
            if let Err(rejection) = self.policy.admit(&query_part, &candidate_part, nb_votes, mode) {
                log::trace!("query {} candidate {} rejected : {:?}", query_id, candidate_id, rejection);
                continue;
            }
            self.counters.nb_fully_compared.fetch_add(1, Ordering::Relaxed);
            let overlap = self
                .verifier
                .compare(query.get_payload(), candidate.get_payload(), self.params.max_shift);
            if overlap.score >= self.params.accept_score {
                results.push(MatchResult::new(
                    query_id,
                    candidate_id,
                    overlap,
                    query.get_length(),
                    candidate.get_length(),
                ));
            }
        }
        log::debug!("query {} nb matches : {}", query_id, results.len());
        Ok(results)
    } // end of find_matches

    /// All pairs search: every stored forward strand sketch is queried in self search mode.
    pub fn find_all_self_matches(&self, nb_threads: usize) -> Result<Vec<MatchResult>> {
        let ids = self.store.forward_ids();
        log::info!("SearchEngine::find_all_self_matches, nb queries : {}", ids.len());
        let start_t = SystemTime::now();
        let cpu_start = ProcessTime::now();
        //
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(nb_threads.max(1))
            .build()
            .map_err(|e| SearchError::BuildAborted(format!("could not build thread pool : {}", e)))?;
        let per_query: Vec<Vec<MatchResult>> = pool.install(|| {
            ids.par_iter()
                .map(|id| {
                    let query = self.store.get(id).ok_or(SearchError::MissingSketch(*id))?;
                    self.find_matches(&query, SearchMode::SelfSearch)
                })
                .collect::<Result<Vec<Vec<MatchResult>>>>()
        })?;
        let results: Vec<MatchResult> = per_query.into_iter().flatten().collect();
        //
        log::info!(
            "SearchEngine::find_all_self_matches, nb matches : {}, sys time(s) {:.2e} cpu time(s) {:.2e}",
            results.len(),
            start_t.elapsed().unwrap_or_default().as_secs_f64(),
            cpu_start.try_elapsed().unwrap_or_default().as_secs_f64()
        );
        Ok(results)
    } // end of find_all_self_matches

    /// Queries every sketch of source with nb_workers threads. The results of each query
    /// are passed to consumer, which runs on the calling thread.
    /// Returns the number of queries run. A panic in consumer stops the queries and gives a
    /// [`SearchError::BuildAborted`].
    pub fn run_queries<S, F>(&self, source: &S, nb_workers: usize, mode: SearchMode, mut consumer: F) -> Result<usize>
    where
        S: SketchSource<P> + ?Sized,
        F: FnMut(Vec<MatchResult>),
    {
        let nb_workers = nb_workers.max(1);
        let (sender, receiver) = crossbeam_channel::bounded::<Vec<MatchResult>>(4 * nb_workers);
        //
        let joined = crossbeam_utils::thread::scope(|scope| {
            let queriers = scope.spawn(move |_| {
                run_workers(nb_workers, |abort| {
                    let mut nb = 0;
                    while !abort.load(Ordering::Relaxed) {
                        match source.next_sketch()? {
                            Some(query) => {
                                let results = self.find_matches(&query, mode)?;
                                if sender.send(results).is_err() {
                                    return Err(SearchError::BuildAborted("result collector is gone".to_string()));
                                }
                                nb += 1;
                            }
                            None => break,
                        }
                    }
                    Ok(nb)
                })
            });
            // owned here so that it is dropped, and senders fail, whenever we leave the loop
            let receiver = receiver;
            let mut consumer_failed = false;
            // ends when all senders are dropped, i.e. when queriers are done
            for results in receiver.iter() {
                if panic::catch_unwind(AssertUnwindSafe(|| consumer(results))).is_err() {
                    log::error!("SearchEngine::run_queries, result consumer panicked, stopping queries");
                    consumer_failed = true;
                    break;
                }
            }
            drop(receiver);
            (queriers.join(), consumer_failed)
        })
        .map_err(|_| SearchError::BuildAborted("query thread could not be joined".to_string()))?;
        //
        let (joined, consumer_failed) = joined;
        if consumer_failed {
            return Err(SearchError::BuildAborted("result consumer panicked".to_string()));
        }
        let nb_queries = match joined {
            Ok(res) => res?,
            Err(_) => return Err(SearchError::BuildAborted("query thread panicked".to_string())),
        };
        log::info!("SearchEngine::run_queries, nb queries : {}", nb_queries);
        Ok(nb_queries)
    } // end of run_queries

    /// number of stored sketches with length >= min_store_length
    pub fn size(&self) -> usize {
        self.counters.nb_long_stored.load(Ordering::Relaxed) as usize
    }

    /// number of stored sketches, short ones included
    pub fn nb_stored(&self) -> usize {
        self.store.len()
    }

    pub fn stored_forward_ids(&self) -> Vec<SeqId> {
        self.store.forward_ids()
    }

    pub fn stored_sketch(&self, id: &SeqId) -> Option<Arc<Sketch<P>>> {
        self.store.get(id)
    }

    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    /// mean normalized entropy of bucket occupancy, see [`BucketTables::normalized_entropy`]
    pub fn hash_table_entropy(&self) -> f64 {
        self.index.normalized_entropy()
    }
} // end of impl SearchEngine

//=====================================================================================

// end of mod tests
