use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// Translation target language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetLanguage {
    Chinese,
    English,
}

impl TargetLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetLanguage::Chinese => "chinese",
            TargetLanguage::English => "english",
        }
    }

    /// Separator used when concatenating merged utterance text.
    pub fn merge_separator(&self) -> &'static str {
        match self {
            TargetLanguage::Chinese => "",
            TargetLanguage::English => " ",
        }
    }
}

/// Translation register requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationStyle {
    Normal,
    Classical,
}

impl TranslationStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationStyle::Normal => "normal",
            TranslationStyle::Classical => "classical",
        }
    }
}

/// Audio content classification supplied by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Speech,
    Singing,
    NonSpeechHumanVocalizations,
    NonHumanSounds,
}

impl ContentType {
    /// Whether this row participates in merging and clip assembly.
    pub fn is_speech(&self) -> bool {
        matches!(self, ContentType::Speech)
    }
}

/// One transcription job; segments reference it by `transcription_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub transcription_id: String,
    pub task_id: String,
    pub target_language: TargetLanguage,
    pub style: TranslationStyle,
    /// Final row count; written once when the stream terminates cleanly.
    pub total_segments: Option<u32>,
    pub processing_time_ms: Option<u64>,
    pub created_at: DateTime,
}

impl Transcription {
    pub const COLLECTION: &'static str = "transcriptions";
}

/// One merged utterance row.
///
/// `sequence` is dense and 1-based, assigned by the merge engine rather than
/// taken from the model's raw counter. Rows are written in `sequence` order
/// and readers never observe gaps below the current maximum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub transcription_id: String,
    pub sequence: u32,
    pub start_ms: u64,
    pub end_ms: u64,
    pub content_type: ContentType,
    /// Free speaker label from the model; `"N/A"` for non-speech.
    pub speaker: String,
    /// Text in the source language.
    pub original: String,
    /// Text in the target language.
    pub translation: String,
    /// Object-store key or public URL of the clip containing this row.
    /// Null until the segmenter dispatches the owning clip.
    pub audio_key: Option<String>,
    #[serde(default)]
    pub is_first: bool,
    #[serde(default)]
    pub is_last: bool,
}

impl TranscriptSegment {
    pub const COLLECTION: &'static str = "transcript_segments";

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&TargetLanguage::Chinese).unwrap(),
            "\"chinese\""
        );
        assert_eq!(
            serde_json::to_string(&ContentType::NonSpeechHumanVocalizations).unwrap(),
            "\"non_speech_human_vocalizations\""
        );
        let ct: ContentType = serde_json::from_str("\"non_human_sounds\"").unwrap();
        assert!(!ct.is_speech());
    }

    #[test]
    fn test_merge_separator() {
        assert_eq!(TargetLanguage::Chinese.merge_separator(), "");
        assert_eq!(TargetLanguage::English.merge_separator(), " ");
    }
}
