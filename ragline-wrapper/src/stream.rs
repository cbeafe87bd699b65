//! Relaying LightRAG answers as `chat.completion.chunk` events.
//!
//! LightRAG's stream endpoint emits newline-delimited JSON, but the object
//! shape differs between releases and proxies. Every line is reduced to text
//! before it is re-emitted. When the stream endpoint is unavailable the full
//! answer is fetched from the query endpoint and replayed in word groups.

use crate::completion::CompletionChunk;
use axum::response::sse::Event;
use futures_util::StreamExt;
use ragline_common::text::chunk_words;
use ragline_common::{LightRagClient, QueryRequest};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Top-level keys holding a whole answer.
const ANSWER_KEYS: &[&str] = &["response", "answer", "result"];

/// Keys tried when an object carries no answer key.
const TEXT_KEYS: &[&str] = &["text", "content", "message", "data"];

/// Keys tried inside an object-valued `delta.content`.
const DELTA_KEYS: &[&str] = &["response", "answer", "result", "content"];

/// Text recovered from one stream line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamText {
    /// A delta string from an upstream chunk, forwarded untouched.
    Delta(String),
    /// Free text, split into word groups before sending.
    Text(String),
}

fn first_text<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| {
        value
            .get(*key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    })
}

/// Normalise one line of LightRAG stream output. Blank lines yield `None`.
pub fn extract_stream_text(line: &str) -> Option<StreamText> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(line) {
        Ok(value @ Value::Object(_)) => Some(object_text(&value)),
        _ => Some(StreamText::Text(line.to_string())),
    }
}

fn object_text(value: &Value) -> StreamText {
    if value.get("object").and_then(Value::as_str) == Some("chat.completion.chunk") {
        return chunk_text(value);
    }

    let text = first_text(value, ANSWER_KEYS)
        .or_else(|| first_text(value, TEXT_KEYS))
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string());
    StreamText::Text(text)
}

fn chunk_text(value: &Value) -> StreamText {
    let Some(choice) = value.get("choices").and_then(|c| c.get(0)) else {
        return StreamText::Text(value.to_string());
    };

    match choice.get("delta").and_then(|d| d.get("content")) {
        Some(Value::String(s)) => StreamText::Delta(s.clone()),
        Some(content @ Value::Object(_)) => StreamText::Text(
            first_text(content, DELTA_KEYS)
                .map(str::to_string)
                .unwrap_or_else(|| content.to_string()),
        ),
        // Role-only or empty deltas carry no text.
        Some(Value::Null) | None => StreamText::Delta(String::new()),
        Some(other) => StreamText::Text(other.to_string()),
    }
}

/// Splits a byte stream into lines without breaking multi-byte characters.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append bytes and return every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).trim_end().to_string());
        }
        lines
    }

    /// Whatever is left after the last newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Chunking behaviour for one stream.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    pub words_per_chunk: usize,
    /// Pause between replayed pieces in fallback mode.
    pub delay: Duration,
}

struct ChunkSink {
    id: String,
    tx: mpsc::Sender<Event>,
    words_per_chunk: usize,
    sent: AtomicUsize,
}

impl ChunkSink {
    /// Send one chunk. Returns `false` once the client has gone away.
    async fn send_piece(&self, piece: &str) -> bool {
        match Event::default().json_data(CompletionChunk::new(&self.id, piece)) {
            Ok(event) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                self.tx.send(event).await.is_ok()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode chunk");
                true
            }
        }
    }

    async fn send_text(&self, text: &str, delay: Option<Duration>) -> bool {
        for (i, piece) in chunk_words(text, self.words_per_chunk).iter().enumerate() {
            if i > 0 {
                if let Some(delay) = delay.filter(|d| !d.is_zero()) {
                    tokio::time::sleep(delay).await;
                }
            }
            if !self.send_piece(piece).await {
                return false;
            }
        }
        true
    }

    async fn send_line(&self, line: &str) -> bool {
        match extract_stream_text(line) {
            Some(StreamText::Delta(delta)) if delta.is_empty() => true,
            Some(StreamText::Delta(delta)) => self.send_piece(&delta).await,
            Some(StreamText::Text(text)) => self.send_text(&text, None).await,
            None => true,
        }
    }

    async fn done(&self) {
        let _ = self.tx.send(Event::default().data("[DONE]")).await;
    }
}

/// Produce the full event sequence for one streaming completion.
///
/// Always ends with `[DONE]`, whatever happened upstream.
pub async fn relay(
    client: LightRagClient,
    request: QueryRequest,
    stream_id: String,
    options: ChunkOptions,
    tx: mpsc::Sender<Event>,
) {
    let start = Instant::now();
    let sink = ChunkSink {
        id: stream_id,
        tx,
        words_per_chunk: options.words_per_chunk,
        sent: AtomicUsize::new(0),
    };

    let source = match client.open_stream(&request).await {
        Ok(response) => {
            proxy(response, &sink).await;
            "stream"
        }
        Err(e) => {
            tracing::debug!(error = %e, "Stream endpoint unavailable, falling back to query");
            replay(&client, &request, &sink, options.delay).await;
            "query"
        }
    };

    sink.done().await;

    tracing::info!(
        stream_id = %sink.id,
        source,
        chunks = sink.sent.load(Ordering::Relaxed),
        duration_ms = start.elapsed().as_millis() as u64,
        "Stream finished"
    );
}

async fn proxy(response: reqwest::Response, sink: &ChunkSink) {
    let mut body = response.bytes_stream();
    let mut lines = LineBuffer::default();

    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "LightRAG stream interrupted");
                return;
            }
        };
        for line in lines.push(&bytes) {
            if !sink.send_line(&line).await {
                return;
            }
        }
    }

    if let Some(rest) = lines.finish() {
        sink.send_line(&rest).await;
    }
}

async fn replay(
    client: &LightRagClient,
    request: &QueryRequest,
    sink: &ChunkSink,
    delay: Duration,
) {
    match client.query(request).await {
        Ok(text) => {
            sink.send_text(&text, Some(delay)).await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "LightRAG query failed during stream");
            sink.send_piece(&e.to_string()).await;
        }
    }
}
