use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{Router, response::IntoResponse, routing::post};
use bson::DateTime;
use dubflow_db::models::{MediaTask, TargetLanguage, TaskStatus, TranslationStyle};
use dubflow_pipeline::{
    MediaSeparator, ModelClient, ModelConfig, SegmenterConfig, SeparatedMedia,
    TranslationOptions, TranslationWorkflow, WorkflowRequest,
};
use dubflow_services::{
    MemoryObjectStore, MemoryTaskStore, MemoryTranscriptStore, ObjectStore, TaskStore,
    TranscriptStore,
};

const AUDIO_KEY: &str = "users/u1/task1/audio.wav";
const VIDEO_KEY: &str = "users/u1/task1/video.mp4";

/// Demuxer stub: the tracks are already in the object store.
struct StubSeparator;

#[async_trait]
impl MediaSeparator for StubSeparator {
    async fn separate(
        &self,
        _original_key: &str,
        _file_type: &str,
    ) -> anyhow::Result<SeparatedMedia> {
        Ok(SeparatedMedia {
            audio_key: AUDIO_KEY.to_string(),
            video_key: VIDEO_KEY.to_string(),
        })
    }
}

fn wav_blob(duration_ms: u64) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut buf = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec).unwrap();
        for i in 0..duration_ms * 16 {
            writer.write_sample((i % 3_000) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    buf
}

fn sse_segment(seq: u32, start: &str, end: &str, speaker: &str, text: &str) -> String {
    format!(
        "data: {{\"type\":\"segment\",\"sequence\":{seq},\"segment\":{{\"sequence\":{seq},\
         \"start\":\"{start}\",\"end\":\"{end}\",\"content_type\":\"speech\",\
         \"speaker\":\"{speaker}\",\"original\":\"{text}\",\"translation\":\"{text}\"}}}}\n\n"
    )
}

/// Serves a canned SSE body on a random port; returns the endpoint URL.
async fn spawn_model_stub(body: String) -> String {
    let app = Router::new().route(
        "/transcribe",
        post(move || async move {
            (
                [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
                body.clone(),
            )
                .into_response()
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/transcribe")
}

struct TestHarness {
    tasks: Arc<MemoryTaskStore>,
    store: Arc<MemoryTranscriptStore>,
    objects: Arc<MemoryObjectStore>,
    workflow: TranslationWorkflow,
}

async fn harness(sse_body: String) -> TestHarness {
    let tasks = Arc::new(MemoryTaskStore::new());
    let store = Arc::new(MemoryTranscriptStore::new());
    let objects = Arc::new(MemoryObjectStore::new());

    objects
        .put(AUDIO_KEY, &wav_blob(10_000), "audio/wav")
        .await
        .unwrap();

    let now = DateTime::now();
    tasks
        .create(MediaTask {
            id: None,
            task_id: "task1".to_string(),
            user_id: "u1".to_string(),
            status: TaskStatus::Uploaded,
            progress: 0,
            error_message: None,
            file_type: "video/mp4".to_string(),
            original_key: "users/u1/task1/original.mp4".to_string(),
            audio_key: None,
            video_key: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

    let endpoint = spawn_model_stub(sse_body).await;
    let model = Arc::new(
        ModelClient::new(ModelConfig {
            endpoint,
            ..ModelConfig::default()
        })
        .unwrap(),
    );

    let workflow = TranslationWorkflow::new(
        tasks.clone() as Arc<dyn TaskStore>,
        store.clone() as Arc<dyn TranscriptStore>,
        objects.clone() as Arc<dyn ObjectStore>,
        Arc::new(StubSeparator),
        model,
        SegmenterConfig::default(),
    );

    TestHarness {
        tasks,
        store,
        objects,
        workflow,
    }
}

fn request() -> WorkflowRequest {
    WorkflowRequest {
        task_id: "task1".to_string(),
        user_id: "u1".to_string(),
        original_key: "users/u1/task1/original.mp4".to_string(),
        file_type: "video/mp4".to_string(),
        options: TranslationOptions {
            target_language: TargetLanguage::English,
            style: TranslationStyle::Normal,
        },
    }
}

#[tokio::test]
async fn full_pipeline_merges_persists_and_clips() {
    let body = format!(
        "data: {{\"type\":\"start\",\"metadata\":{{\"fileName\":\"audio.wav\"}}}}\n\n{}{}{}data: {{\"type\":\"end\",\"totalSegments\":3}}\n\n",
        sse_segment(1, "0m0s0ms", "0m2s0ms", "A", "Hi."),
        sse_segment(2, "0m2s500ms", "0m4s0ms", "A", "There."),
        sse_segment(3, "0m5s0ms", "0m7s0ms", "B", "Hello."),
    );
    let h = harness(body).await;

    let outcome = h.workflow.run(request()).await.unwrap();

    // The two A sentences merged; B stayed separate.
    assert_eq!(outcome.total_segments, 2);
    let rows = h.store.select_after(&outcome.transcription_id, 0, 10).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].original, "Hi. There.");
    assert_eq!((rows[0].start_ms, rows[0].end_ms), (0, 4_000));
    assert!(rows[0].is_first);
    assert_eq!(rows[1].speaker, "B");
    assert!(rows[1].is_last);

    // The transcription row carries the totals.
    let transcription = h
        .store
        .read_transcription(&outcome.transcription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transcription.total_segments, Some(2));
    assert!(transcription.processing_time_ms.is_some());

    // One clip per speaker run, and every row points at its clip.
    assert_eq!(outcome.segmenter.segment_count, 2);
    for r in &rows {
        assert!(r.audio_key.is_some(), "row {} has no clip", r.sequence);
    }
    let a_clip = h
        .objects
        .get("users/u1/task1/audio-segments/sequence_0001_A.wav")
        .await
        .unwrap();
    assert!(!a_clip.is_empty());

    // Task reached the terminal state.
    let task = h.tasks.get("task1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 100);
    assert_eq!(task.audio_key.as_deref(), Some(AUDIO_KEY));
    assert_eq!(task.video_key.as_deref(), Some(VIDEO_KEY));
}

#[tokio::test]
async fn model_error_fails_task_but_keeps_flushed_rows() {
    let body = format!(
        "{}{}data: {{\"type\":\"error\",\"error\":\"model overloaded\"}}\n\n",
        sse_segment(1, "0m0s0ms", "0m2s0ms", "A", "Hi."),
        // The speaker change flushes A's group before the error arrives.
        sse_segment(2, "0m3s0ms", "0m4s0ms", "B", "Hello."),
    );
    let h = harness(body).await;

    let err = h.workflow.run(request()).await.unwrap_err();
    assert!(err.to_string().contains("model overloaded"));

    let task = h.tasks.get("task1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(
        task.error_message
            .as_deref()
            .unwrap_or_default()
            .contains("model overloaded")
    );

    // The row flushed before the error survived; no totals were written.
    let ids = h.store.transcription_ids();
    assert_eq!(ids.len(), 1);
    let rows = h.store.select_after(&ids[0], 0, 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].speaker, "A");
    let transcription = h.store.read_transcription(&ids[0]).await.unwrap().unwrap();
    assert_eq!(transcription.total_segments, None);
}

#[tokio::test]
async fn empty_stream_completes_with_zero_segments() {
    let body = "data: {\"type\":\"end\",\"totalSegments\":0}\n\n".to_string();
    let h = harness(body).await;

    let outcome = h.workflow.run(request()).await.unwrap();

    assert_eq!(outcome.total_segments, 0);
    assert_eq!(outcome.segmenter.segment_count, 0);
    let task = h.tasks.get("task1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}
