//! Streaming chunk model and the bounded look-behind buffer.

use crate::placeholder::PlaceholderCodec;

/// One parsed chunk of a streaming response.
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    /// The raw data payload the chunk was parsed from.
    pub raw: Vec<u8>,
    /// Incremental content carried by this chunk.
    pub delta: String,
    /// Role, if this chunk announces one (usually only the first chunk).
    pub role: Option<String>,
    /// Finish reason, if this is the closing content chunk.
    pub finish_reason: Option<String>,
    /// Set when the chunk is the protocol's end-of-stream sentinel.
    pub is_done: bool,
    /// Parsed payload, kept so serialization can splice the delta back in
    /// without dropping fields the core does not model.
    pub raw_value: Option<serde_json::Value>,
}

impl StreamChunk {
    /// An end-of-stream sentinel chunk.
    pub fn done(raw: Vec<u8>) -> Self {
        Self {
            raw,
            is_done: true,
            ..Self::default()
        }
    }
}

/// Bounded look-behind buffer for cross-chunk placeholder restoration.
///
/// The buffer retains the trailing `max_len` bytes (the length of one
/// placeholder) so that a placeholder split across chunk boundaries is never
/// emitted half-restored. [`flush`](StreamBuffer::flush) additionally backs
/// off to a UTF-8 boundary so the emitted prefix is always valid text.
#[derive(Debug)]
pub struct StreamBuffer {
    buf: Vec<u8>,
    max_len: usize,
}

impl StreamBuffer {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_len * 2),
            max_len,
        }
    }

    /// Appends chunk content.
    pub fn write(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Returns the safe prefix, or `None` when the buffer is not over the
    /// watermark yet.
    ///
    /// The cut starts `max_len` bytes from the end. A *complete* placeholder
    /// straddling that point pulls the cut to its own end, so it is emitted
    /// (and restored) whole; an *incomplete* placeholder tail is at most
    /// `max_len - 1` bytes and therefore always inside the retained window.
    /// The cut also backs off to a UTF-8 boundary so the prefix is valid
    /// text.
    pub fn flush(&mut self, codec: &PlaceholderCodec) -> Option<Vec<u8>> {
        if self.buf.len() <= self.max_len {
            return None;
        }
        let mut cut = self.buf.len() - self.max_len;

        // Scan only the valid-UTF-8 prefix so match offsets are exact byte
        // offsets into the buffer.
        let valid_len = match std::str::from_utf8(&self.buf) {
            Ok(_) => self.buf.len(),
            Err(e) => e.valid_up_to(),
        };
        let text = std::str::from_utf8(&self.buf[..valid_len]).expect("validated prefix");
        for m in codec.find_all(text) {
            if m.start < cut && m.end > cut {
                cut = m.end;
                break;
            }
        }

        // Do not split a multi-byte character across the boundary.
        while cut > 0 && cut < self.buf.len() && (self.buf[cut] & 0b1100_0000) == 0b1000_0000 {
            cut -= 1;
        }
        if cut == 0 {
            return None;
        }
        let safe = self.buf[..cut].to_vec();
        self.buf.drain(..cut);
        Some(safe)
    }

    /// Returns everything that is buffered, emptying the buffer.
    pub fn flush_all(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
