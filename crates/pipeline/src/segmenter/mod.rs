pub mod accumulator;
pub mod driver;

pub use accumulator::{AccumulatorState, SpeakerAccumulator};
pub use driver::{SegmenterDriver, SegmenterReport, SegmenterStats};
