//! Shannon-entropy secret detector.
//!
//! Finds token-shaped substrings, discards obvious non-secrets with a fixed
//! heuristic set, and emits anything whose codepoint entropy clears the
//! configured threshold.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::{DetectedSecret, SecretDetector, SecretKind};

/// Candidate substrings: the characters tokens, API keys, and base64 blobs
/// are made of.
static CANDIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9+/=_\-]{8,}").expect("candidate pattern is valid"));

/// Canonical 8-4-4-4-12 UUID shape.
static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("uuid pattern is valid")
});

/// Programming identifiers that show up constantly in pasted code and are
/// never secrets.
const COMMON_KEYWORDS: &[&str] = &[
    "function", "return", "import", "export", "const", "class", "interface", "package",
    "undefined", "null", "true", "false", "string", "number", "boolean", "object", "async",
    "await", "promise", "callback", "localhost", "githubusercontent", "example",
];

const FILE_EXTENSIONS: &[&str] = &[".js", ".ts", ".go", ".py", ".json"];

/// Entropy above which confidence saturates at 1.0.
const SATURATION_ENTROPY: f64 = 6.0;

/// Typed configuration for the entropy detector.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EntropyConfig {
    pub enabled: bool,
    pub threshold: f64,
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for EntropyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 4.5,
            min_length: 8,
            max_length: 128,
        }
    }
}

/// Detects high-entropy strings that are likely secrets.
pub struct EntropyDetector {
    enabled: bool,
    threshold: f64,
    min_length: usize,
    max_length: usize,
}

impl Default for EntropyDetector {
    fn default() -> Self {
        Self::from_config(&EntropyConfig::default())
    }
}

impl EntropyDetector {
    pub fn new(threshold: f64, min_length: usize, max_length: usize) -> Self {
        Self {
            enabled: true,
            threshold,
            min_length,
            max_length,
        }
    }

    pub fn from_config(config: &EntropyConfig) -> Self {
        let mut detector = Self::new(config.threshold, config.min_length, config.max_length);
        detector.enabled = config.enabled;
        detector
    }

    /// Shannon entropy over codepoint frequencies, in bits.
    fn entropy(s: &str) -> f64 {
        if s.is_empty() {
            return 0.0;
        }
        let mut freq: HashMap<char, usize> = HashMap::new();
        let mut total = 0usize;
        for c in s.chars() {
            *freq.entry(c).or_insert(0) += 1;
            total += 1;
        }
        let total = total as f64;
        freq.values()
            .map(|&count| {
                let p = count as f64 / total;
                -p * p.log2()
            })
            .sum()
    }

    /// Maps entropy to confidence: threshold -> 0.5, 6.0 bits -> 1.0, linear
    /// between, clamped at 1.0.
    fn confidence(&self, entropy: f64) -> f64 {
        if entropy >= SATURATION_ENTROPY || self.threshold >= SATURATION_ENTROPY {
            return 1.0;
        }
        if entropy < self.threshold {
            return 0.0;
        }
        0.5 + 0.5 * (entropy - self.threshold) / (SATURATION_ENTROPY - self.threshold)
    }

    /// Heuristics for strings that match the candidate shape but are clearly
    /// not secrets.
    fn is_likely_not_secret(s: &str) -> bool {
        let lower = s.to_lowercase();

        is_lowercase_word(s)
            || COMMON_KEYWORDS.contains(&lower.as_str())
            || is_path_or_url(s, &lower)
            || is_file_reference(s, &lower)
            || is_short_base64(s)
            || UUID.is_match(&lower)
    }
}

fn is_lowercase_word(s: &str) -> bool {
    !s.chars().any(|c| c.is_uppercase() || c.is_ascii_digit())
}

fn is_path_or_url(s: &str, lower: &str) -> bool {
    s.starts_with('/') || s.starts_with("./") || lower.starts_with("http") || lower.starts_with("www")
}

fn is_file_reference(s: &str, lower: &str) -> bool {
    s.starts_with('.') || FILE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn is_short_base64(s: &str) -> bool {
    s.ends_with("==") && s.len() < 20
}

impl SecretDetector for EntropyDetector {
    fn name(&self) -> &'static str {
        "entropy"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn detect(&self, text: &str) -> Vec<DetectedSecret> {
        let mut found = Vec::new();
        for m in CANDIDATE.find_iter(text) {
            let candidate = m.as_str();
            if candidate.len() < self.min_length || candidate.len() > self.max_length {
                continue;
            }
            if Self::is_likely_not_secret(candidate) {
                continue;
            }
            let entropy = Self::entropy(candidate);
            if entropy >= self.threshold {
                found.push(DetectedSecret {
                    value: candidate.to_string(),
                    start: m.start(),
                    end: m.end(),
                    kind: SecretKind::HighEntropy,
                    confidence: self.confidence(entropy),
                    source: "",
                });
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entropy_of_uniform_string_is_zero() {
        assert_eq!(EntropyDetector::entropy("aaaaaaaa"), 0.0);
    }

    #[test]
    fn entropy_grows_with_variety() {
        let low = EntropyDetector::entropy("abababab");
        let high = EntropyDetector::entropy("aB3cD4eF5gH6iJ7kL8mN");
        assert!(high > low);
        assert!(high > 4.0);
    }

    #[test]
    fn low_entropy_candidate_is_suppressed() {
        let detector = EntropyDetector::new(4.0, 8, 128);
        let found = detector.detect("check abcdefghij and aB3cD4eF5gH6iJ7kL8mN");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, "aB3cD4eF5gH6iJ7kL8mN");
        assert_eq!(found[0].kind, SecretKind::HighEntropy);
    }

    #[test]
    fn offsets_point_into_the_text() {
        let detector = EntropyDetector::new(4.0, 8, 128);
        let text = "see aB3cD4eF5gH6iJ7kL8mN here";
        let found = detector.detect(text);
        assert_eq!(&text[found[0].start..found[0].end], found[0].value);
    }

    #[test]
    fn keywords_are_excluded() {
        let detector = EntropyDetector::new(1.0, 4, 128);
        for word in ["function", "Interface", "LOCALHOST"] {
            assert!(
                EntropyDetector::is_likely_not_secret(word) || detector.detect(word).is_empty(),
                "{word} should not be detected"
            );
        }
    }

    #[test]
    fn paths_urls_and_files_are_excluded() {
        assert!(EntropyDetector::is_likely_not_secret("/usr/local/bin"));
        assert!(EntropyDetector::is_likely_not_secret("./relative"));
        assert!(EntropyDetector::is_likely_not_secret("https8x9KqQ"));
        assert!(EntropyDetector::is_likely_not_secret("bundle.min.js"));
    }

    #[test]
    fn uuids_are_excluded() {
        assert!(EntropyDetector::is_likely_not_secret(
            "a1b2c3d4-e5f6-7890-abcd-ef0123456789"
        ));
    }

    #[test]
    fn short_padded_base64_is_excluded() {
        assert!(EntropyDetector::is_likely_not_secret("aGVsbG8hIQ=="));
        // Long padded blobs are still candidates.
        assert!(!EntropyDetector::is_likely_not_secret(
            "aB3cD4eF5gH6iJ7kL8mNoPqR9sTuVw=="
        ));
    }

    #[test]
    fn confidence_maps_linearly_and_clamps() {
        let detector = EntropyDetector::new(4.0, 8, 128);
        assert!((detector.confidence(4.0) - 0.5).abs() < 1e-9);
        assert!((detector.confidence(5.0) - 0.75).abs() < 1e-9);
        assert_eq!(detector.confidence(6.0), 1.0);
        assert_eq!(detector.confidence(7.5), 1.0);
    }

    #[test]
    fn length_bounds_are_enforced() {
        let detector = EntropyDetector::new(1.0, 12, 16);
        // 10 chars, below min_length.
        assert!(detector.detect("aB3cD4eF5g").is_empty());
        // 20 chars, above max_length.
        assert!(detector.detect("aB3cD4eF5gH6iJ7kL8mN").is_empty());
    }
}
