mod media_task;
mod transcription;

pub use media_task::{MediaTask, TaskStatus};
pub use transcription::{
    ContentType, TargetLanguage, Transcription, TranscriptSegment, TranslationStyle,
};
