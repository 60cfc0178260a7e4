//! Sources of sketches feeding the index.
//!
//! A [`SketchSource`] is shared by all worker threads of a build, each popping sketches until
//! the source is exhausted. [`SketchQueue`] is the in memory buffer: a producer (or
//! [`SketchQueue::drain_all`] on another source) fills it, then it is closed. Knowing how many
//! sketches and windows were queued lets the engine size its tables before insertion.

use std::sync::atomic::{AtomicUsize, Ordering};

use concurrent_queue::{ConcurrentQueue, PopError, PushError};
use crossbeam_utils::Backoff;

use crate::errors::{Result, SearchError};
use crate::sketch::Sketch;
use crate::utils::run_workers;

/// log progress every LOG_STEP sketches
const LOG_STEP: usize = 5000;

pub trait SketchSource<P>: Sync {
    /// Returns next sketch, blocking until one is available.
    /// Returns None when the source is exhausted.
    fn next_sketch(&self) -> Result<Option<Sketch<P>>>;

    /// number of sketches delivered or queued so far
    fn nb_processed(&self) -> usize;

    /// number of windows in sketches delivered or queued so far
    fn nb_sub_windows_processed(&self) -> usize;
}

//=====================================================================================

pub struct SketchQueue<P> {
    queue: ConcurrentQueue<Sketch<P>>,
    nb_processed: AtomicUsize,
    nb_sub_windows: AtomicUsize,
}

impl<P: Send> Default for SketchQueue<P> {
    fn default() -> Self {
        SketchQueue::new()
    }
}

impl<P: Send> SketchQueue<P> {
    pub fn new() -> Self {
        SketchQueue {
            queue: ConcurrentQueue::unbounded(),
            nb_processed: AtomicUsize::new(0),
            nb_sub_windows: AtomicUsize::new(0),
        }
    }

    /// a closed queue containing sketches
    pub fn from_sketches<I>(sketches: I) -> Result<Self>
    where
        I: IntoIterator<Item = Sketch<P>>,
    {
        let queue = SketchQueue::new();
        for sketch in sketches {
            queue.push(sketch)?;
        }
        queue.close();
        Ok(queue)
    }

    /// Pulls all sketches of source with nb_threads threads, then closes the queue.
    pub fn drain_all<S>(source: &S, nb_threads: usize) -> Result<Self>
    where
        S: SketchSource<P> + ?Sized,
    {
        let queue = SketchQueue::new();
        let nb_drained = run_workers(nb_threads, |abort| {
            let mut nb = 0;
            while !abort.load(Ordering::Relaxed) {
                match source.next_sketch()? {
                    Some(sketch) => {
                        queue.push(sketch)?;
                        nb += 1;
                    }
                    None => break,
                }
            }
            Ok(nb)
        })?;
        queue.close();
        log::info!(
            "SketchQueue::drain_all, nb sketches : {}, nb windows : {}",
            nb_drained,
            queue.nb_sub_windows_processed()
        );
        Ok(queue)
    } // end of drain_all

    pub fn push(&self, sketch: Sketch<P>) -> Result<()> {
        let nb_windows = sketch.get_signature().nb_windows();
        match self.queue.push(sketch) {
            Ok(()) => {}
            Err(PushError::Closed(s)) => {
                log::error!("SketchQueue push of {} in a closed queue", s.get_id());
                return Err(SearchError::BuildAborted("push in closed sketch queue".to_string()));
            }
            Err(PushError::Full(_)) => {
                return Err(SearchError::BuildAborted("sketch queue is full".to_string()));
            }
        }
        self.nb_sub_windows.fetch_add(nb_windows, Ordering::Relaxed);
        let nb_processed = self.nb_processed.fetch_add(1, Ordering::Relaxed) + 1;
        if nb_processed % LOG_STEP == 0 {
            log::info!("current nb sequences loaded and processed : {}", nb_processed);
        }
        Ok(())
    } // end of push

    /// no more push accepted, poppers get None once the queue is empty
    pub fn close(&self) -> bool {
        self.queue.close()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// nb of sketches currently in queue
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
} // end of impl SketchQueue

impl<P: Send> SketchSource<P> for SketchQueue<P> {
    fn next_sketch(&self) -> Result<Option<Sketch<P>>> {
        let backoff = Backoff::new();
        loop {
            match self.queue.pop() {
                Ok(sketch) => return Ok(Some(sketch)),
                Err(PopError::Closed) => return Ok(None),
                Err(PopError::Empty) => backoff.snooze(),
            }
        }
    } // end of next_sketch

    fn nb_processed(&self) -> usize {
        self.nb_processed.load(Ordering::Relaxed)
    }

    fn nb_sub_windows_processed(&self) -> usize {
        self.nb_sub_windows.load(Ordering::Relaxed)
    }
} // end of impl SketchSource for SketchQueue

//=====================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::seqid::SeqId;
    use crate::sketch::MinHashes;

    fn sketch(id: u64, nb_windows: usize) -> Sketch<()> {
        let signature = MinHashes::new(2, vec![id as u32; 2 * nb_windows]).unwrap();
        Sketch::new(SeqId::forward(id), 100, signature, ())
    }

    #[test]
    fn test_counts_and_exhaustion() {
        let queue = SketchQueue::from_sketches((1..=10).map(|i| sketch(i, 3))).unwrap();
        assert_eq!(queue.nb_processed(), 10);
        assert_eq!(queue.nb_sub_windows_processed(), 30);
        let mut ids = Vec::new();
        while let Some(s) = queue.next_sketch().unwrap() {
            ids.push(s.get_id().header_id());
        }
        ids.sort();
        assert_eq!(ids, (1..=10).collect::<Vec<u64>>());
        assert!(queue.push(sketch(11, 1)).is_err());
    }

    #[test]
    fn test_blocking_pop_waits_for_producer() {
        let queue = SketchQueue::<()>::new();
        let popped = crossbeam_utils::thread::scope(|s| {
            let consumer = s.spawn(|_| {
                let mut nb = 0;
                while queue.next_sketch().unwrap().is_some() {
                    nb += 1;
                }
                nb
            });
            for i in 0..100 {
                queue.push(sketch(i, 1)).unwrap();
            }
            queue.close();
            consumer.join().unwrap()
        })
        .unwrap();
        assert_eq!(popped, 100);
    }

    #[test]
    fn test_drain_all() {
        let source = SketchQueue::from_sketches((0..500).map(|i| sketch(i, 2))).unwrap();
        let drained = SketchQueue::drain_all(&source, 4).unwrap();
        assert!(drained.is_closed());
        assert_eq!(drained.len(), 500);
        assert_eq!(drained.nb_processed(), 500);
        assert_eq!(drained.nb_sub_windows_processed(), 1000);
    }
} // end of mod tests
