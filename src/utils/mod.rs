//! Small helpers shared across the pipeline.
pub mod duration;

pub use duration::{parse_extended_duration, DurationError};
