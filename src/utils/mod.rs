//! contains utils used to configure search and run worker threads

pub mod parameters;
pub mod workers;

pub use parameters::*;
pub use workers::*;
