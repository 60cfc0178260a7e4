//! Overlap detection between long reads with a MinHash / LSH index.
//!
//! Sketches of reads, computed elsewhere, are streamed into a [`SearchEngine`]: an insert once
//! [`store::SketchStore`] plus one bucket table per hash function. The engine is then queried
//! with its own sketches (all pairs search) or with external ones. Candidates sharing enough
//! buckets with a query are filtered, then compared exactly by a user provided [`Verifier`].
//!
//! The engine is built and queried concurrently:
//! - build: [`SearchEngine::build`] runs a pool of workers popping a [`stream::SketchSource`]
//! - query: [`SearchEngine::find_all_self_matches`] on a rayon pool or [`SearchEngine::run_queries`]
//!   on a stream of external queries.

pub mod engine;
pub mod errors;
pub mod filter;
pub mod index;
pub mod results;
pub mod seqid;
pub mod sketch;
pub mod store;
pub mod stream;
pub mod utils;
pub mod vote;

pub use engine::{CountersSnapshot, SearchEngine};
pub use errors::{Result, SearchError};
pub use filter::{FilterPolicy, SearchMode};
pub use results::MatchResult;
pub use seqid::{IdAllocator, SeqId};
pub use sketch::{MinHashes, OverlapInfo, Sketch, Verifier};
pub use utils::SearchParams;
