pub mod clip;
pub mod collab;
pub mod config;
pub mod merge;
pub mod model;
pub mod scanner;
pub mod segmenter;
pub mod timecode;
pub mod workflow;

pub use collab::{HttpMediaSeparator, MediaSeparator, SeparatedMedia};
pub use config::{ModelConfig, SegmenterConfig};
pub use merge::{MergeEngine, MergeSummary};
pub use model::stream::SegmentStream;
pub use model::{ModelClient, RawSegment, TranscribeRequest};
pub use scanner::JsonArrayScanner;
pub use segmenter::{SegmenterDriver, SegmenterReport, SegmenterStats};
pub use workflow::{TranslationOptions, TranslationWorkflow, WorkflowOutcome, WorkflowRequest};
