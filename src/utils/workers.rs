//! A fixed pool of scoped worker threads, failing fast.
//!
//! Every worker runs the same task, typically a loop popping items from a shared source.
//! The first worker returning an error raises an abort flag that the others poll between
//! items, and the error is returned once all workers are joined.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::{Result, SearchError};

/// runs task on nb_workers threads and waits for all of them.
/// Returns the sum of the counts returned by workers or the first error met.
pub fn run_workers<F>(nb_workers: usize, task: F) -> Result<usize>
where
    F: Fn(&AtomicBool) -> Result<usize> + Sync,
{
    let nb_workers = nb_workers.max(1);
    let abort = AtomicBool::new(false);
    log::debug!("run_workers launching {} threads", nb_workers);
    //
    let joined = crossbeam_utils::thread::scope(|scope| {
        let handles: Vec<_> = (0..nb_workers)
            .map(|rank| {
                let task = &task;
                let abort = &abort;
                scope.spawn(move |_| {
                    let res = task(abort);
                    if let Err(e) = &res {
                        log::error!("worker {} failed, aborting other workers : {}", rank, e);
                        abort.store(true, Ordering::SeqCst);
                    }
                    res
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
    })
    .map_err(|_| SearchError::BuildAborted("a worker thread could not be joined".to_string()))?;
    //
    let mut total = 0;
    for res in joined {
        match res {
            Ok(Ok(nb)) => total += nb,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(SearchError::BuildAborted("a worker thread panicked".to_string())),
        }
    }
    Ok(total)
} // end of run_workers

// end of mod tests
