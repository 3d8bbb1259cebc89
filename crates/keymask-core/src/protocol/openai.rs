//! OpenAI-compatible chat completions handler.
//!
//! This shape is shared by the OpenAI API, Azure OpenAI deployments, GitHub
//! Copilot endpoints, and (close enough for message extraction) Anthropic's
//! messages API. Parsing extracts roles and text content; serialization
//! splices modified contents back into the retained JSON tree so sampling
//! parameters, tool calls, usage blocks, and anything else we never model
//! pass through byte-faithfully.

use serde_json::{json, Value};

use crate::error::ProtocolError;

use super::{
    Message, MessageMetadata, ProtocolHandler, RequestContext, StandardMessage, StreamChunk,
};

/// Hosts that speak this format regardless of path.
const COPILOT_HOSTS: &[&str] = &["api.githubcopilot.com", "copilot-proxy", "api.github.com"];

/// End-of-stream sentinel payload.
const DONE_SENTINEL: &[u8] = b"[DONE]";

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiHandler;

impl OpenAiHandler {
    pub fn new() -> Self {
        Self
    }
}

/// Extracts text from a `content` value: either a plain string or a list of
/// typed parts whose `text` parts are joined with newlines.
fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            texts.join("\n")
        }
        _ => String::new(),
    }
}

/// Splices `text` into a message object's `content`, but only when the text
/// actually differs from what extraction produced - unmodified messages keep
/// their original shape (including part lists).
fn splice_content(message: &mut Value, text: &str) {
    let unchanged = message
        .get("content")
        .map(|c| content_text(c) == text)
        .unwrap_or(false);
    if unchanged {
        return;
    }
    if let Some(obj) = message.as_object_mut() {
        obj.insert("content".to_string(), Value::String(text.to_string()));
    }
}

impl ProtocolHandler for OpenAiHandler {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn can_handle(&self, ctx: &RequestContext<'_>) -> bool {
        if !ctx.content_type.contains("application/json") {
            return false;
        }
        if ctx.path.contains("/chat/completions") {
            return true;
        }
        // Azure OpenAI deployments route through the same chat path, but
        // keep the explicit check in case the deployment prefix ever comes
        // without it.
        if ctx.path.contains("/openai/deployments/") && ctx.path.contains("/chat/completions") {
            return true;
        }
        if ctx.path.contains("/v1/messages") {
            return true;
        }
        COPILOT_HOSTS.iter().any(|h| ctx.host.contains(h))
    }

    fn parse_request(&self, body: &[u8]) -> Result<StandardMessage, ProtocolError> {
        let raw: Value = serde_json::from_slice(body)?;
        let messages = raw
            .get("messages")
            .and_then(Value::as_array)
            .ok_or_else(|| ProtocolError::Shape("request has no messages array".into()))?;

        let parsed = messages
            .iter()
            .map(|m| Message {
                role: m
                    .get("role")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                content: m.get("content").map(content_text).unwrap_or_default(),
            })
            .collect();

        Ok(StandardMessage {
            messages: parsed,
            metadata: MessageMetadata {
                model: raw.get("model").and_then(Value::as_str).map(str::to_string),
                stream: raw.get("stream").and_then(Value::as_bool).unwrap_or(false),
                raw: Some(raw),
            },
        })
    }

    fn parse_response(&self, body: &[u8]) -> Result<StandardMessage, ProtocolError> {
        let raw: Value = serde_json::from_slice(body)?;
        let choices = raw
            .get("choices")
            .and_then(Value::as_array)
            .ok_or_else(|| ProtocolError::Shape("response has no choices array".into()))?;

        let parsed = choices
            .iter()
            .filter_map(|choice| choice.get("message"))
            .map(|m| Message {
                role: m
                    .get("role")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                content: m.get("content").map(content_text).unwrap_or_default(),
            })
            .collect();

        Ok(StandardMessage {
            messages: parsed,
            metadata: MessageMetadata {
                model: raw.get("model").and_then(Value::as_str).map(str::to_string),
                stream: false,
                raw: Some(raw),
            },
        })
    }

    fn serialize_request(&self, msg: &StandardMessage) -> Result<Vec<u8>, ProtocolError> {
        let mut raw = match &msg.metadata.raw {
            Some(raw) => raw.clone(),
            None => json!({ "messages": [] }),
        };

        match raw.get_mut("messages").and_then(Value::as_array_mut) {
            Some(messages) => {
                for (i, m) in msg.messages.iter().enumerate() {
                    if let Some(target) = messages.get_mut(i) {
                        splice_content(target, &m.content);
                    }
                }
            }
            None => {
                // No snapshot to splice into; rebuild a minimal body.
                let rebuilt: Vec<Value> = msg
                    .messages
                    .iter()
                    .map(|m| json!({ "role": m.role, "content": m.content }))
                    .collect();
                raw["messages"] = Value::Array(rebuilt);
                if let Some(model) = &msg.metadata.model {
                    raw["model"] = json!(model);
                }
                if msg.metadata.stream {
                    raw["stream"] = json!(true);
                }
            }
        }

        Ok(serde_json::to_vec(&raw)?)
    }

    fn serialize_response(&self, msg: &StandardMessage) -> Result<Vec<u8>, ProtocolError> {
        let mut raw = match &msg.metadata.raw {
            Some(raw) => raw.clone(),
            None => json!({ "choices": [] }),
        };

        match raw.get_mut("choices").and_then(Value::as_array_mut) {
            Some(choices) => {
                for (i, m) in msg.messages.iter().enumerate() {
                    if let Some(message) = choices.get_mut(i).and_then(|c| c.get_mut("message")) {
                        splice_content(message, &m.content);
                    }
                }
            }
            None => {
                let rebuilt: Vec<Value> = msg
                    .messages
                    .iter()
                    .enumerate()
                    .map(|(i, m)| {
                        json!({
                            "index": i,
                            "message": { "role": m.role, "content": m.content },
                        })
                    })
                    .collect();
                raw["choices"] = Value::Array(rebuilt);
            }
        }

        Ok(serde_json::to_vec(&raw)?)
    }

    fn is_streaming(&self, body: &[u8]) -> bool {
        serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(|v| v.get("stream").and_then(Value::as_bool))
            .unwrap_or(false)
    }

    fn parse_stream_chunk(&self, data: &[u8]) -> Result<StreamChunk, ProtocolError> {
        let trimmed = data.strip_suffix(b"\n").unwrap_or(data);
        if trimmed == DONE_SENTINEL {
            return Ok(StreamChunk::done(data.to_vec()));
        }

        let raw: Value = serde_json::from_slice(data)?;
        let mut chunk = StreamChunk {
            raw: data.to_vec(),
            ..StreamChunk::default()
        };

        if let Some(choice) = raw.get("choices").and_then(Value::as_array).and_then(|c| c.first()) {
            if let Some(delta) = choice.get("delta") {
                chunk.delta = delta
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                chunk.role = delta
                    .get("role")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            chunk.finish_reason = choice
                .get("finish_reason")
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        chunk.raw_value = Some(raw);
        Ok(chunk)
    }

    fn serialize_stream_chunk(&self, chunk: &StreamChunk) -> Result<Vec<u8>, ProtocolError> {
        if chunk.is_done {
            return Ok(DONE_SENTINEL.to_vec());
        }

        let mut raw = match &chunk.raw_value {
            Some(raw) => raw.clone(),
            None => json!({
                "object": "chat.completion.chunk",
                "choices": [{ "index": 0, "delta": {}, "finish_reason": null }],
            }),
        };

        if let Some(choice) = raw
            .get_mut("choices")
            .and_then(Value::as_array_mut)
            .and_then(|c| c.first_mut())
        {
            if let Some(delta) = choice.get_mut("delta").and_then(Value::as_object_mut) {
                delta.insert("content".to_string(), Value::String(chunk.delta.clone()));
                if let Some(role) = &chunk.role {
                    delta.insert("role".to_string(), Value::String(role.clone()));
                }
            }
            match &chunk.finish_reason {
                Some(reason) => {
                    choice["finish_reason"] = Value::String(reason.clone());
                }
                None => {
                    choice["finish_reason"] = Value::Null;
                }
            }
        }

        Ok(serde_json::to_vec(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> OpenAiHandler {
        OpenAiHandler::new()
    }

    fn ctx<'a>(host: &'a str, path: &'a str, content_type: &'a str) -> RequestContext<'a> {
        RequestContext {
            method: "POST",
            host,
            path,
            content_type,
        }
    }

    #[test]
    fn can_handle_known_endpoints() {
        let h = handler();
        assert!(h.can_handle(&ctx(
            "api.openai.com",
            "/v1/chat/completions",
            "application/json"
        )));
        assert!(h.can_handle(&ctx(
            "example.openai.azure.com",
            "/openai/deployments/gpt4/chat/completions",
            "application/json; charset=utf-8"
        )));
        assert!(h.can_handle(&ctx(
            "api.anthropic.com",
            "/v1/messages",
            "application/json"
        )));
        assert!(h.can_handle(&ctx(
            "api.githubcopilot.com",
            "/anything",
            "application/json"
        )));
    }

    #[test]
    fn rejects_non_json_and_unknown_paths() {
        let h = handler();
        assert!(!h.can_handle(&ctx("api.openai.com", "/v1/chat/completions", "text/plain")));
        assert!(!h.can_handle(&ctx("example.com", "/api", "application/json")));
    }

    #[test]
    fn parses_string_content() {
        let body = br#"{"model":"gpt-4","stream":true,"messages":[
            {"role":"system","content":"be nice"},
            {"role":"user","content":"hello"}]}"#;
        let msg = handler().parse_request(body).expect("parses");

        assert_eq!(msg.messages.len(), 2);
        assert_eq!(msg.messages[0].role, "system");
        assert_eq!(msg.messages[1].content, "hello");
        assert_eq!(msg.metadata.model.as_deref(), Some("gpt-4"));
        assert!(msg.metadata.stream);
    }

    #[test]
    fn parses_part_list_content() {
        let body = br#"{"messages":[{"role":"user","content":[
            {"type":"text","text":"first"},
            {"type":"image_url","image_url":{"url":"https://x/y.png"}},
            {"type":"text","text":"second"}]}]}"#;
        let msg = handler().parse_request(body).expect("parses");
        assert_eq!(msg.messages[0].content, "first\nsecond");
    }

    #[test]
    fn serialize_preserves_unmodified_fields() {
        let body = br#"{"model":"gpt-4","temperature":0.2,"seed":7,"messages":[
            {"role":"user","content":"with ghp_secret inside","name":"alice"}]}"#;
        let mut msg = handler().parse_request(body).expect("parses");
        msg.messages[0].content = "with __SECRET_deadbeef__ inside".to_string();

        let out = handler().serialize_request(&msg).expect("serializes");
        let value: Value = serde_json::from_slice(&out).expect("valid json");

        assert_eq!(value["temperature"], json!(0.2));
        assert_eq!(value["seed"], json!(7));
        assert_eq!(value["messages"][0]["name"], json!("alice"));
        assert_eq!(
            value["messages"][0]["content"],
            json!("with __SECRET_deadbeef__ inside")
        );
    }

    #[test]
    fn serialize_keeps_part_lists_when_content_unchanged() {
        let body = br#"{"messages":[{"role":"user","content":[
            {"type":"text","text":"unchanged"}]}]}"#;
        let msg = handler().parse_request(body).expect("parses");
        let out = handler().serialize_request(&msg).expect("serializes");
        let value: Value = serde_json::from_slice(&out).expect("valid json");
        assert!(value["messages"][0]["content"].is_array());
    }

    #[test]
    fn response_round_trip_splices_choice_content() {
        let body = br#"{"id":"chatcmpl-1","object":"chat.completion","created":1700000000,
            "model":"gpt-4","system_fingerprint":"fp_x","choices":[
            {"index":0,"message":{"role":"assistant","content":"I saw __SECRET_12ab34cd__"},
             "finish_reason":"stop"}],
            "usage":{"prompt_tokens":3,"completion_tokens":5,"total_tokens":8}}"#;
        let mut msg = handler().parse_response(body).expect("parses");
        assert_eq!(msg.messages[0].content, "I saw __SECRET_12ab34cd__");

        msg.messages[0].content = "I saw ghp_realtoken".to_string();
        let out = handler().serialize_response(&msg).expect("serializes");
        let value: Value = serde_json::from_slice(&out).expect("valid json");

        assert_eq!(value["choices"][0]["message"]["content"], json!("I saw ghp_realtoken"));
        assert_eq!(value["usage"]["total_tokens"], json!(8));
        assert_eq!(value["system_fingerprint"], json!("fp_x"));
        assert_eq!(value["choices"][0]["finish_reason"], json!("stop"));
    }

    #[test]
    fn is_streaming_reads_the_stream_flag() {
        let h = handler();
        assert!(h.is_streaming(br#"{"stream":true,"messages":[]}"#));
        assert!(!h.is_streaming(br#"{"stream":false,"messages":[]}"#));
        assert!(!h.is_streaming(br#"{"messages":[]}"#));
        assert!(!h.is_streaming(b"not json"));
    }

    #[test]
    fn parses_done_sentinel() {
        let chunk = handler().parse_stream_chunk(b"[DONE]").expect("parses");
        assert!(chunk.is_done);
    }

    #[test]
    fn stream_chunk_round_trip_keeps_metadata() {
        let data = br#"{"id":"chatcmpl-1","object":"chat.completion.chunk","created":1700000000,
            "model":"gpt-4","choices":[{"index":0,"delta":{"content":"hi"},"finish_reason":null}]}"#;
        let mut chunk = handler().parse_stream_chunk(data).expect("parses");
        assert_eq!(chunk.delta, "hi");
        assert!(chunk.finish_reason.is_none());

        chunk.delta = "rewritten".to_string();
        let out = handler().serialize_stream_chunk(&chunk).expect("serializes");
        let value: Value = serde_json::from_slice(&out).expect("valid json");
        assert_eq!(value["choices"][0]["delta"]["content"], json!("rewritten"));
        assert_eq!(value["id"], json!("chatcmpl-1"));
        assert_eq!(value["model"], json!("gpt-4"));
    }

    #[test]
    fn stream_chunk_carries_finish_reason() {
        let data = br#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
        let chunk = handler().parse_stream_chunk(data).expect("parses");
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
        assert_eq!(chunk.delta, "");
    }

    #[test]
    fn serialize_done_emits_sentinel() {
        let out = handler()
            .serialize_stream_chunk(&StreamChunk::done(Vec::new()))
            .expect("serializes");
        assert_eq!(out, b"[DONE]");
    }
}
