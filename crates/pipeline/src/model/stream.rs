use std::collections::VecDeque;

use serde::Deserialize;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, warn};

use crate::scanner::JsonArrayScanner;
use super::{RawSegment, WireSegment};

/// Adapter over the model's streaming response body.
///
/// Yields one [`RawSegment`] at a time and releases the scheduler between
/// items so the merge engine's store writes are never starved. A transport
/// error or a model-reported `error` event propagates; an empty stream is
/// not an error.
pub struct SegmentStream {
    response: reqwest::Response,
    decoder: StreamDecoder,
    pending: VecDeque<RawSegment>,
    finished: bool,
    total_segments: Option<u32>,
    /// Model-reported error, raised only after pending segments drain so
    /// rows that arrived before the error stay durable.
    stream_error: Option<String>,
    _permit: OwnedSemaphorePermit,
}

impl SegmentStream {
    pub(crate) fn new(response: reqwest::Response, permit: OwnedSemaphorePermit) -> Self {
        Self {
            response,
            decoder: StreamDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
            total_segments: None,
            stream_error: None,
            _permit: permit,
        }
    }

    /// Segment count reported by the model's `end` event, once seen.
    pub fn total_segments(&self) -> Option<u32> {
        self.total_segments
    }

    pub async fn next_segment(&mut self) -> anyhow::Result<Option<RawSegment>> {
        loop {
            if let Some(segment) = self.pending.pop_front() {
                // Cooperative yield between emitted items.
                tokio::task::yield_now().await;
                return Ok(Some(segment));
            }
            if let Some(error) = self.stream_error.take() {
                anyhow::bail!("Model stream reported error: {error}");
            }
            if self.finished {
                return Ok(None);
            }

            match self.response.chunk().await? {
                Some(bytes) => {
                    let outcome = self.decoder.push(&String::from_utf8_lossy(&bytes));
                    self.absorb(outcome);
                }
                None => {
                    let outcome = self.decoder.finish();
                    self.absorb(outcome);
                    self.finished = true;
                }
            }
        }
    }

    fn absorb(&mut self, outcome: DecodeOutcome) {
        self.pending.extend(outcome.segments);
        if outcome.total_segments.is_some() {
            self.total_segments = outcome.total_segments;
        }
        if outcome.error.is_some() {
            self.stream_error = outcome.error;
            self.finished = true;
        }
        if outcome.ended {
            self.finished = true;
        }
    }
}

/// Segments and lifecycle signals decoded from one chunk of body text.
#[derive(Debug, Default)]
pub struct DecodeOutcome {
    pub segments: Vec<RawSegment>,
    pub total_segments: Option<u32>,
    pub ended: bool,
    /// A model-reported `error` event; nothing after it is decoded.
    pub error: Option<String>,
}

/// Wire framing of the model response.
///
/// The endpoint's documented surface is `text/event-stream` with typed
/// `data: {json}` events; some gateways instead stream the bare JSON array
/// as chunked text, which goes through the array scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Sse,
    BareArray,
}

/// Incremental decoder for either framing, detected from the first
/// non-whitespace content. Stateless with respect to chunk boundaries: any
/// chunking of the same body decodes to the same segments.
#[derive(Default)]
pub struct StreamDecoder {
    framing: Option<Framing>,
    /// Text buffered before the framing is decided.
    probe: String,
    /// Partial SSE line carried across chunks.
    line_buf: String,
    scanner: JsonArrayScanner,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireEvent {
    Start {
        #[serde(default)]
        metadata: serde_json::Value,
    },
    Segment {
        #[serde(default)]
        sequence: u32,
        segment: WireSegment,
    },
    End {
        #[serde(rename = "totalSegments", default)]
        total_segments: u32,
    },
    Error {
        error: String,
    },
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: &str) -> DecodeOutcome {
        let mut outcome = DecodeOutcome::default();

        let framing = match self.framing {
            Some(f) => f,
            None => {
                self.probe.push_str(text);
                match detect_framing(&self.probe) {
                    Some(f) => {
                        self.framing = Some(f);
                        let buffered = std::mem::take(&mut self.probe);
                        self.decode(f, &buffered, &mut outcome);
                        return outcome;
                    }
                    None => return outcome,
                }
            }
        };

        self.decode(framing, text, &mut outcome);
        outcome
    }

    /// Flushes buffered state at end of body (an SSE line without a trailing
    /// newline, or an undecided probe).
    pub fn finish(&mut self) -> DecodeOutcome {
        let mut outcome = DecodeOutcome::default();

        if self.framing.is_none() && !self.probe.trim().is_empty() {
            let f = detect_framing(&self.probe).unwrap_or(Framing::BareArray);
            self.framing = Some(f);
            let buffered = std::mem::take(&mut self.probe);
            self.decode(f, &buffered, &mut outcome);
        }

        if self.framing == Some(Framing::Sse) && !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            self.decode_sse_line(line.trim_end_matches('\r'), &mut outcome);
        }

        outcome
    }

    fn decode(&mut self, framing: Framing, text: &str, outcome: &mut DecodeOutcome) {
        match framing {
            Framing::BareArray => {
                for value in self.scanner.push(text) {
                    push_wire_value(value, outcome);
                }
            }
            Framing::Sse => {
                self.line_buf.push_str(text);
                while let Some(pos) = self.line_buf.find('\n') {
                    let line: String = self.line_buf.drain(..=pos).collect();
                    self.decode_sse_line(line.trim_end().trim_end_matches('\r'), outcome);
                    if outcome.error.is_some() {
                        // Nothing after a reported error is decoded.
                        self.line_buf.clear();
                        break;
                    }
                }
            }
        }
    }

    fn decode_sse_line(&mut self, line: &str, outcome: &mut DecodeOutcome) {
        let Some(payload) = line.strip_prefix("data:") else {
            // Non-data lines: event-type fields, comments, blank separators.
            return;
        };
        let payload = payload.trim();
        if payload.is_empty() {
            return;
        }

        match serde_json::from_str::<WireEvent>(payload) {
            Ok(WireEvent::Start { metadata }) => {
                debug!(%metadata, "Model stream started");
            }
            Ok(WireEvent::Segment { sequence, segment }) => {
                let mut raw = segment.into_raw();
                if raw.sequence == 0 {
                    raw.sequence = sequence;
                }
                outcome.segments.push(raw);
            }
            Ok(WireEvent::End { total_segments }) => {
                debug!(total_segments, "Model stream ended");
                outcome.total_segments = Some(total_segments);
                outcome.ended = true;
            }
            Ok(WireEvent::Error { error }) => {
                warn!(%error, "Model stream reported error");
                outcome.error = Some(error);
            }
            Err(e) => {
                warn!(error = %e, "Dropping unparseable stream event");
            }
        }
    }
}

fn push_wire_value(value: serde_json::Value, outcome: &mut DecodeOutcome) {
    match serde_json::from_value::<WireSegment>(value) {
        Ok(segment) => outcome.segments.push(segment.into_raw()),
        Err(e) => warn!(error = %e, "Dropping unparseable segment object"),
    }
}

/// Decides the framing from the earliest conclusive prefix; `None` means
/// more input is needed.
fn detect_framing(text: &str) -> Option<Framing> {
    let t = text.trim_start();
    if t.is_empty() {
        return None;
    }
    if t.starts_with('[') || t.starts_with('{') {
        return Some(Framing::BareArray);
    }
    for prefix in ["data:", "event:", "retry:", "id:", ":"] {
        if t.starts_with(prefix) {
            return Some(Framing::Sse);
        }
        if prefix.starts_with(t) {
            // Could still become an SSE field name.
            return None;
        }
    }
    Some(Framing::BareArray)
}
