//! Server-Sent Events codec.
//!
//! The decoder is incremental: feed it whatever byte slices arrive from the
//! network and pull complete events out. Events can straddle any number of
//! reads; `data:` lines of one event are joined with `\n`; comment lines are
//! dropped.

use bytes::{Buf, BytesMut};

/// One decoded SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, if present.
    pub event: Option<String>,
    /// Joined `data:` payload.
    pub data: Vec<u8>,
}

impl SseEvent {
    /// Serializes the event back to the wire: optional `event:` line, one
    /// `data:` line per payload line, blank-line terminator.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() + 16);
        if let Some(event) = &self.event {
            out.extend_from_slice(b"event: ");
            out.extend_from_slice(event.as_bytes());
            out.push(b'\n');
        }
        for line in self.data.split(|&b| b == b'\n') {
            out.extend_from_slice(b"data: ");
            out.extend_from_slice(line);
            out.push(b'\n');
        }
        out.push(b'\n');
        out
    }
}

/// Incremental SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: BytesMut,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends network bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops the next complete event, if one is buffered.
    pub fn next_event(&mut self) -> Option<SseEvent> {
        loop {
            let (block_end, consumed) = find_event_boundary(&self.buf)?;
            let block = self.buf[..block_end].to_vec();
            self.buf.advance(consumed);

            if let Some(event) = parse_block(&block) {
                return Some(event);
            }
            // Blank-line run or comment-only block; keep scanning.
        }
    }

    /// Consumes whatever is left as a final, unterminated event. Called when
    /// the upstream closes without a trailing blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buf.is_empty() {
            return None;
        }
        let block = self.buf.split().to_vec();
        parse_block(&block)
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Finds the end of the first event block: returns (block length, bytes to
/// consume including the terminator).
fn find_event_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] != b'\n' {
            i += 1;
            continue;
        }
        // A line feed followed by an (optionally CR-prefixed) line feed
        // terminates the event.
        if i + 1 < buf.len() && buf[i + 1] == b'\n' {
            return Some((i, i + 2));
        }
        if i + 2 < buf.len() && buf[i + 1] == b'\r' && buf[i + 2] == b'\n' {
            return Some((i, i + 3));
        }
        i += 1;
    }
    None
}

/// Parses the lines of one event block. Returns `None` for blocks with
/// neither an event type nor data (comments, stray blank lines).
fn parse_block(block: &[u8]) -> Option<SseEvent> {
    let mut event = None;
    let mut data_lines: Vec<&[u8]> = Vec::new();

    for mut line in block.split(|&b| b == b'\n') {
        if line.ends_with(b"\r") {
            line = &line[..line.len() - 1];
        }
        if line.is_empty() || line.starts_with(b":") {
            continue;
        }
        if let Some(rest) = line.strip_prefix(b"event:") {
            let value = trim_leading_space(rest);
            event = Some(String::from_utf8_lossy(value).into_owned());
        } else if let Some(rest) = line.strip_prefix(b"data:") {
            data_lines.push(trim_leading_space(rest));
        }
    }

    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data_lines.join(&b'\n'),
    })
}

fn trim_leading_space(line: &[u8]) -> &[u8] {
    line.strip_prefix(b" ").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<SseEvent> {
        let mut decoder = SseDecoder::new();
        decoder.push(input);
        let mut events = Vec::new();
        while let Some(ev) = decoder.next_event() {
            events.push(ev);
        }
        if let Some(ev) = decoder.finish() {
            events.push(ev);
        }
        events
    }

    #[test]
    fn decodes_a_simple_event() {
        let events = decode_all(b"data: {\"x\":1}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, b"{\"x\":1}");
        assert!(events[0].event.is_none());
    }

    #[test]
    fn decodes_event_type_and_crlf_lines() {
        let events = decode_all(b"event: message\r\ndata: hello\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("message"));
        assert_eq!(events[0].data, b"hello");
    }

    #[test]
    fn joins_multiline_data_with_newline() {
        let events = decode_all(b"data: first\ndata: second\n\n");
        assert_eq!(events[0].data, b"first\nsecond");
    }

    #[test]
    fn skips_comment_lines() {
        let events = decode_all(b": keep-alive\n\ndata: real\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, b"real");
    }

    #[test]
    fn events_split_across_pushes_are_reassembled() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: {\"delta\":\"he");
        assert!(decoder.next_event().is_none());
        decoder.push(b"llo\"}\n");
        assert!(decoder.next_event().is_none());
        decoder.push(b"\ndata: [DONE]\n\n");

        let first = decoder.next_event().expect("first event");
        assert_eq!(first.data, b"{\"delta\":\"hello\"}");
        let done = decoder.next_event().expect("done event");
        assert_eq!(done.data, b"[DONE]");
    }

    #[test]
    fn finish_returns_trailing_unterminated_event() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: tail");
        assert!(decoder.next_event().is_none());
        let tail = decoder.finish().expect("tail event");
        assert_eq!(tail.data, b"tail");
    }

    #[test]
    fn serialize_round_trips() {
        let event = SseEvent {
            event: Some("message".into()),
            data: b"line1\nline2".to_vec(),
        };
        let wire = event.serialize();
        let decoded = decode_all(&wire);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0], event);
    }
}
