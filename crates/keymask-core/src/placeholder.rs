//! Deterministic placeholder codec.
//!
//! A placeholder is `<prefix><hash><suffix>` where `<hash>` is the first
//! [`HASH_LEN`] lowercase hex characters of SHA-256 over the secret's UTF-8
//! bytes. The same secret always maps to the same placeholder, which is what
//! lets the proxy reuse mappings across requests and recognize placeholders
//! in responses with a single compiled regex.

use regex::Regex;
use sha2::{Digest, Sha256};

/// Default placeholder prefix.
pub const DEFAULT_PREFIX: &str = "__SECRET_";
/// Default placeholder suffix.
pub const DEFAULT_SUFFIX: &str = "__";
/// Number of hex characters taken from the SHA-256 digest.
///
/// 8 hex chars = 32 bits. Collisions become likely around ~64k distinct
/// secrets; raise via [`PlaceholderCodec::with_hash_len`] if that matters for
/// a deployment.
pub const HASH_LEN: usize = 8;

/// A placeholder occurrence located in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderMatch {
    /// Byte offset where the placeholder starts.
    pub start: usize,
    /// Byte offset one past the end.
    pub end: usize,
    /// The placeholder text itself.
    pub text: String,
}

/// Generates, recognizes, and locates placeholders.
#[derive(Debug, Clone)]
pub struct PlaceholderCodec {
    prefix: String,
    suffix: String,
    hash_len: usize,
    max_len: usize,
    pattern: Regex,
}

impl Default for PlaceholderCodec {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX, DEFAULT_SUFFIX)
    }
}

impl PlaceholderCodec {
    /// Creates a codec with the given affixes and the default hash length.
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self::with_hash_len(prefix, suffix, HASH_LEN)
    }

    /// Creates a codec with an explicit hash length.
    pub fn with_hash_len(
        prefix: impl Into<String>,
        suffix: impl Into<String>,
        hash_len: usize,
    ) -> Self {
        let prefix = prefix.into();
        let suffix = suffix.into();
        let pattern = Regex::new(&format!(
            "{}[0-9a-f]{{{}}}{}",
            regex::escape(&prefix),
            hash_len,
            regex::escape(&suffix)
        ))
        .expect("placeholder pattern is a valid regex");

        let max_len = prefix.len() + hash_len + suffix.len();
        Self {
            prefix,
            suffix,
            hash_len,
            max_len,
            pattern,
        }
    }

    /// Generates the placeholder for a secret.
    pub fn generate(&self, secret: &str) -> String {
        let digest = Sha256::digest(secret.as_bytes());
        let hash = hex::encode(digest);
        format!("{}{}{}", self.prefix, &hash[..self.hash_len], self.suffix)
    }

    /// The length of every placeholder this codec emits.
    ///
    /// This value sizes the streaming look-behind buffer.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Returns true if `s` contains a placeholder.
    pub fn is_placeholder(&self, s: &str) -> bool {
        self.pattern.is_match(s)
    }

    /// Finds all placeholders in `text`, non-overlapping, left to right.
    pub fn find_all(&self, text: &str) -> Vec<PlaceholderMatch> {
        self.pattern
            .find_iter(text)
            .map(|m| PlaceholderMatch {
                start: m.start(),
                end: m.end(),
                text: m.as_str().to_string(),
            })
            .collect()
    }

    /// Replaces every placeholder whose lookup returns a hit; misses are left
    /// in place.
    pub fn restore<F>(&self, text: &str, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        self.pattern
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let placeholder = &caps[0];
                lookup(placeholder).unwrap_or_else(|| placeholder.to_string())
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_is_deterministic() {
        let codec = PlaceholderCodec::default();
        assert_eq!(codec.generate("hunter2"), codec.generate("hunter2"));
        assert_ne!(codec.generate("hunter2"), codec.generate("hunter3"));
    }

    #[test]
    fn generated_placeholder_has_expected_shape() {
        let codec = PlaceholderCodec::default();
        let ph = codec.generate("sk-ant-abc123");
        assert!(ph.starts_with("__SECRET_"));
        assert!(ph.ends_with("__"));
        assert_eq!(ph.len(), codec.max_len());
        assert_eq!(codec.max_len(), 19);
        assert!(codec.is_placeholder(&ph));
    }

    #[test]
    fn custom_affixes_are_escaped() {
        let codec = PlaceholderCodec::new("[[KEY.", "]]");
        let ph = codec.generate("x");
        assert!(codec.is_placeholder(&ph));
        assert!(!codec.is_placeholder("[[KEYXabcdef12]]"));
    }

    #[test]
    fn find_all_returns_ordered_matches() {
        let codec = PlaceholderCodec::default();
        let a = codec.generate("one");
        let b = codec.generate("two");
        let text = format!("start {a} middle {b} end");

        let found = codec.find_all(&text);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].text, a);
        assert_eq!(found[1].text, b);
        assert!(found[0].end <= found[1].start);
        assert_eq!(&text[found[0].start..found[0].end], a);
    }

    #[test]
    fn restore_replaces_hits_and_keeps_misses() {
        let codec = PlaceholderCodec::default();
        let known = codec.generate("swordfish");
        let unknown = codec.generate("mystery");
        let text = format!("a {known} b {unknown} c");

        let restored = codec.restore(&text, |ph| {
            (ph == known).then(|| "swordfish".to_string())
        });
        assert_eq!(restored, format!("a swordfish b {unknown} c"));
    }

    #[test]
    fn plain_text_is_not_a_placeholder() {
        let codec = PlaceholderCodec::default();
        assert!(!codec.is_placeholder("nothing to see here"));
        // Wrong case in the hash part.
        assert!(!codec.is_placeholder("__SECRET_ABCDEF12__"));
    }
}
