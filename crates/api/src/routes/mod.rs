pub mod segmenter;
pub mod task;
pub mod transcript;
