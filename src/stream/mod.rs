//! Feeding sketches to the engine: in memory queues and persisted binary streams.

pub mod binary;
pub mod source;

pub use binary::{RecordReader, SketchCodec, SketchStreamReader, SketchStreamWriter};
pub use source::{SketchQueue, SketchSource};
