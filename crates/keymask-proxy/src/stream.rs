//! Streaming restorer.
//!
//! Consumes upstream SSE bytes, runs every chunk's delta through the bounded
//! look-behind buffer, and re-emits events with placeholders restored. A
//! placeholder split across any number of chunks is restored as long as it
//! fits the buffer window, which is sized to the placeholder length.

use std::sync::Arc;
use std::time::Instant;

use keymask_core::protocol::{ProtocolHandler, SseDecoder, SseEvent, StreamBuffer, StreamChunk};

use crate::service::SecretService;

/// Restores placeholders across an SSE stream.
pub struct StreamRestorer {
    service: Arc<SecretService>,
    handler: Arc<dyn ProtocolHandler>,
    decoder: SseDecoder,
    buffer: StreamBuffer,
    /// Role announced by the stream, carried onto rewritten chunks.
    role: Option<String>,
    chunks_seen: u64,
}

impl StreamRestorer {
    pub fn new(service: Arc<SecretService>, handler: Arc<dyn ProtocolHandler>) -> Self {
        let window = service.codec().max_len();
        Self {
            service,
            handler,
            decoder: SseDecoder::new(),
            buffer: StreamBuffer::new(window),
            role: None,
            chunks_seen: 0,
        }
    }

    /// Feeds upstream bytes; returns the bytes to forward to the client now.
    pub async fn process_bytes(&mut self, bytes: &[u8]) -> Vec<u8> {
        self.decoder.push(bytes);
        let mut out = Vec::new();
        while let Some(event) = self.decoder.next_event() {
            self.handle_event(event, &mut out).await;
        }
        out
    }

    /// Flushes everything still buffered. Call when the upstream body ends.
    pub async fn finish(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(event) = self.decoder.finish() {
            self.handle_event(event, &mut out).await;
        }
        let tail = self.buffer_drain();
        self.emit_buffered(&mut out, tail, None).await;
        out
    }

    fn buffer_drain(&mut self) -> Vec<u8> {
        self.buffer.flush_all()
    }

    async fn handle_event(&mut self, event: SseEvent, out: &mut Vec<u8>) {
        let chunk = match self.handler.parse_stream_chunk(&event.data) {
            Ok(chunk) => chunk,
            Err(_) => {
                // Not a chunk we understand; forward verbatim.
                out.extend_from_slice(&event.serialize());
                return;
            }
        };

        if chunk.is_done {
            let tail = self.buffer_drain();
            self.emit_buffered(out, tail, None).await;
            out.extend_from_slice(&event.serialize());
            return;
        }

        self.chunks_seen += 1;
        self.service.metrics().streaming_chunks_total.inc();
        if chunk.role.is_some() {
            self.role = chunk.role.clone();
        }

        self.buffer.write(chunk.delta.as_bytes());

        if chunk.finish_reason.is_some() {
            // The closing content chunk; flush everything so the finish
            // reason rides on restored content.
            let tail = self.buffer_drain();
            self.emit_rewritten(out, tail, &chunk).await;
            return;
        }

        if let Some(safe) = self.buffer.flush(self.service.codec()) {
            self.emit_rewritten(out, safe, &chunk).await;
        }
    }

    /// Restores `content` and emits it as a rewrite of `basis`.
    async fn emit_rewritten(&mut self, out: &mut Vec<u8>, content: Vec<u8>, basis: &StreamChunk) {
        if content.is_empty() && basis.finish_reason.is_none() {
            return;
        }
        let restored = self.restore(content).await;

        let rewritten = StreamChunk {
            raw: Vec::new(),
            delta: restored,
            role: basis.role.clone().or_else(|| self.role.clone()),
            finish_reason: basis.finish_reason.clone(),
            is_done: false,
            raw_value: basis.raw_value.clone(),
        };

        match self.handler.serialize_stream_chunk(&rewritten) {
            Ok(data) => out.extend_from_slice(
                &SseEvent {
                    event: None,
                    data,
                }
                .serialize(),
            ),
            Err(e) => {
                tracing::warn!(error = %e, "stream chunk serialization failed, dropping rewrite");
            }
        }
    }

    /// Emits buffered bytes with no basis chunk (stream ended without a
    /// finish marker).
    async fn emit_buffered(&mut self, out: &mut Vec<u8>, content: Vec<u8>, event: Option<&str>) {
        if content.is_empty() {
            return;
        }
        let restored = self.restore(content).await;
        let chunk = StreamChunk {
            delta: restored,
            role: self.role.clone(),
            ..StreamChunk::default()
        };
        match self.handler.serialize_stream_chunk(&chunk) {
            Ok(data) => out.extend_from_slice(
                &SseEvent {
                    event: event.map(str::to_string),
                    data,
                }
                .serialize(),
            ),
            Err(e) => {
                tracing::warn!(error = %e, "final stream chunk serialization failed");
            }
        }
    }

    async fn restore(&self, content: Vec<u8>) -> String {
        let text = String::from_utf8_lossy(&content).into_owned();
        let started = Instant::now();
        let (restored, _, _) = self.service.restore_text(&text).await;
        self.service
            .metrics()
            .stream_flush_duration_seconds
            .observe(started.elapsed().as_secs_f64());
        restored
    }

    /// Chunks processed so far.
    pub fn chunks_seen(&self) -> u64 {
        self.chunks_seen
    }
}
