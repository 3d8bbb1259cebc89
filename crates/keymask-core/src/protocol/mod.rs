//! Protocol layer: lifts LLM wire formats into a neutral message model.
//!
//! A [`ProtocolRegistry`] holds handlers sorted by priority; the first
//! handler whose `can_handle` accepts a request owns both legs of it. When no
//! handler matches, the proxy forwards the request untouched.
//!
//! Handlers keep a snapshot of the parsed JSON payload in
//! [`MessageMetadata::raw`] and, on serialization, splice only modified
//! message contents back into that tree, so fields the core never looks at
//! survive the round trip.

mod openai;
mod sse;
mod stream;

pub use openai::OpenAiHandler;
pub use sse::{SseDecoder, SseEvent};
pub use stream::{StreamBuffer, StreamChunk};

use std::sync::Arc;

use serde_json::Value;

use crate::error::ProtocolError;

/// A single message of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// `system`, `user`, `assistant`, `tool`, ... - an open set.
    pub role: String,
    pub content: String,
}

/// The metadata the core observes, plus a snapshot of the original payload.
#[derive(Debug, Clone, Default)]
pub struct MessageMetadata {
    pub model: Option<String>,
    pub stream: bool,
    /// Parsed original payload; used to re-serialize unmodified fields
    /// faithfully.
    pub raw: Option<Value>,
}

/// Neutral representation of an LLM request or response body.
#[derive(Debug, Clone, Default)]
pub struct StandardMessage {
    pub messages: Vec<Message>,
    pub metadata: MessageMetadata,
}

/// The request attributes handlers use to decide whether they apply.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    pub content_type: &'a str,
}

/// A wire-format handler.
///
/// `serialize(parse(b))` need not be byte-equal to `b`, but every semantic
/// field the upstream relies on must survive.
pub trait ProtocolHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Higher priority handlers are consulted first.
    fn priority(&self) -> i32;

    fn can_handle(&self, ctx: &RequestContext<'_>) -> bool;

    fn parse_request(&self, body: &[u8]) -> Result<StandardMessage, ProtocolError>;
    fn parse_response(&self, body: &[u8]) -> Result<StandardMessage, ProtocolError>;

    fn serialize_request(&self, msg: &StandardMessage) -> Result<Vec<u8>, ProtocolError>;
    fn serialize_response(&self, msg: &StandardMessage) -> Result<Vec<u8>, ProtocolError>;

    /// Whether the request body asks for a streaming response.
    fn is_streaming(&self, body: &[u8]) -> bool;

    /// Parses the data payload of one SSE event.
    fn parse_stream_chunk(&self, data: &[u8]) -> Result<StreamChunk, ProtocolError>;

    /// Serializes a chunk back to its data payload.
    fn serialize_stream_chunk(&self, chunk: &StreamChunk) -> Result<Vec<u8>, ProtocolError>;
}

/// Priority-ordered handler registry.
#[derive(Clone, Default)]
pub struct ProtocolRegistry {
    handlers: Vec<Arc<dyn ProtocolHandler>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OpenAiHandler::new()));
        registry
    }

    /// Adds a handler, keeping the set sorted by descending priority.
    pub fn register(&mut self, handler: Arc<dyn ProtocolHandler>) {
        self.handlers.push(handler);
        self.handlers.sort_by_key(|h| std::cmp::Reverse(h.priority()));
    }

    /// Returns the first handler that accepts the request, if any.
    pub fn detect(&self, ctx: &RequestContext<'_>) -> Option<Arc<dyn ProtocolHandler>> {
        self.handlers
            .iter()
            .find(|h| h.can_handle(ctx))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
