//! Secret detection.
//!
//! Detectors are independent strategies behind the object-safe
//! [`SecretDetector`] trait; the [`DetectorManager`] runs every enabled
//! detector over a text, tags findings with their source, and merges the
//! results into an ordered, overlap-free list.

mod entropy;
mod pattern;

pub use entropy::{EntropyConfig, EntropyDetector};
pub use pattern::{PatternConfig, PatternDetector, RuleSpec};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::metrics::Metrics;

/// Coarse taxonomy of detected secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    ApiKey,
    Token,
    Password,
    ConnectionString,
    Webhook,
    PrivateKey,
    Credentials,
    HighEntropy,
}

impl SecretKind {
    /// Stable snake_case name, used as a metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretKind::ApiKey => "api_key",
            SecretKind::Token => "token",
            SecretKind::Password => "password",
            SecretKind::ConnectionString => "connection_string",
            SecretKind::Webhook => "webhook",
            SecretKind::PrivateKey => "private_key",
            SecretKind::Credentials => "credentials",
            SecretKind::HighEntropy => "high_entropy",
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A secret found by a detector.
///
/// `start..end` are byte offsets into the scanned text, half-open.
#[derive(Debug, Clone, Serialize)]
pub struct DetectedSecret {
    pub value: String,
    pub start: usize,
    pub end: usize,
    pub kind: SecretKind,
    pub confidence: f64,
    /// Name of the detector that produced this finding.
    pub source: &'static str,
}

/// A secret detection strategy.
pub trait SecretDetector: Send + Sync {
    /// Detector name, used for logging and metric labels.
    fn name(&self) -> &'static str;

    /// Whether this detector participates in [`DetectorManager::detect_all`].
    fn is_enabled(&self) -> bool;

    /// Enables or disables the detector.
    fn set_enabled(&mut self, enabled: bool);

    /// Scans `text` and returns findings with byte-offset ranges into it.
    fn detect(&self, text: &str) -> Vec<DetectedSecret>;
}

/// Runs all registered detectors and deduplicates their findings.
#[derive(Default)]
pub struct DetectorManager {
    detectors: Vec<Box<dyn SecretDetector>>,
    metrics: Option<Arc<Metrics>>,
}

impl DetectorManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a metric set; detector scan durations are observed per
    /// detector.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Adds a detector.
    pub fn register(&mut self, detector: Box<dyn SecretDetector>) {
        self.detectors.push(detector);
    }

    /// Number of registered detectors.
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Runs every enabled detector over `text`, tags each finding with its
    /// source, and deduplicates.
    ///
    /// The result is ordered by start offset and free of overlaps; no two
    /// findings share the same value.
    pub fn detect_all(&self, text: &str) -> Vec<DetectedSecret> {
        let mut all = Vec::new();
        for detector in &self.detectors {
            if !detector.is_enabled() {
                continue;
            }
            let started = Instant::now();
            let mut found = detector.detect(text);
            if let Some(metrics) = &self.metrics {
                metrics
                    .interceptor_duration_seconds
                    .with_label_values(&[detector.name()])
                    .observe(started.elapsed().as_secs_f64());
            }
            for finding in &mut found {
                finding.source = detector.name();
            }
            all.append(&mut found);
        }
        dedupe(all)
    }
}

/// Merges findings from multiple detectors.
///
/// 1. Findings with identical values collapse to the highest-confidence
///    representative (ties keep the first encountered).
/// 2. Remaining findings are sorted by start offset.
/// 3. A left-to-right sweep drops overlapping findings, keeping the higher
///    confidence one (ties keep the earlier).
fn dedupe(found: Vec<DetectedSecret>) -> Vec<DetectedSecret> {
    if found.is_empty() {
        return found;
    }

    let mut best_by_value: HashMap<String, DetectedSecret> = HashMap::new();
    for finding in found {
        match best_by_value.get(&finding.value) {
            Some(existing) if existing.confidence >= finding.confidence => {}
            _ => {
                best_by_value.insert(finding.value.clone(), finding);
            }
        }
    }

    let mut unique: Vec<DetectedSecret> = best_by_value.into_values().collect();
    unique.sort_by(|a, b| a.start.cmp(&b.start).then(b.confidence.total_cmp(&a.confidence)));

    let mut kept: Vec<DetectedSecret> = Vec::with_capacity(unique.len());
    for candidate in unique {
        match kept.last() {
            Some(last) if candidate.start < last.end => {
                if candidate.confidence > last.confidence {
                    *kept.last_mut().expect("kept is non-empty") = candidate;
                }
            }
            _ => kept.push(candidate),
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDetector {
        name: &'static str,
        enabled: bool,
        findings: Vec<DetectedSecret>,
    }

    impl SecretDetector for FixedDetector {
        fn name(&self) -> &'static str {
            self.name
        }
        fn is_enabled(&self) -> bool {
            self.enabled
        }
        fn set_enabled(&mut self, enabled: bool) {
            self.enabled = enabled;
        }
        fn detect(&self, _text: &str) -> Vec<DetectedSecret> {
            self.findings.clone()
        }
    }

    fn finding(value: &str, start: usize, confidence: f64) -> DetectedSecret {
        DetectedSecret {
            value: value.to_string(),
            start,
            end: start + value.len(),
            kind: SecretKind::Token,
            confidence,
            source: "",
        }
    }

    #[test]
    fn detect_all_tags_sources() {
        let mut manager = DetectorManager::new();
        manager.register(Box::new(FixedDetector {
            name: "fixed",
            enabled: true,
            findings: vec![finding("abcd1234efgh", 0, 0.9)],
        }));

        let found = manager.detect_all("abcd1234efgh");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, "fixed");
    }

    #[test]
    fn disabled_detectors_are_skipped() {
        let mut manager = DetectorManager::new();
        manager.register(Box::new(FixedDetector {
            name: "off",
            enabled: false,
            findings: vec![finding("tok", 0, 1.0)],
        }));
        assert!(manager.detect_all("tok").is_empty());
    }

    #[test]
    fn identical_values_collapse_to_highest_confidence() {
        let found = dedupe(vec![
            finding("same-value-here", 0, 0.6),
            finding("same-value-here", 0, 0.9),
        ]);
        assert_eq!(found.len(), 1);
        assert!((found[0].confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn overlapping_findings_keep_higher_confidence() {
        let low = finding("aaaaaaaaaa", 0, 0.6);
        let mut high = finding("bbbbbb", 4, 0.95);
        high.end = 10;

        let found = dedupe(vec![low, high]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, "bbbbbb");
    }

    #[test]
    fn non_overlapping_findings_are_ordered_by_start() {
        let found = dedupe(vec![
            finding("second", 20, 0.8),
            finding("first", 0, 0.7),
            finding("third", 40, 0.9),
        ]);
        let starts: Vec<usize> = found.iter().map(|f| f.start).collect();
        assert_eq!(starts, vec![0, 20, 40]);
    }

    #[test]
    fn overlap_tie_keeps_earlier_finding() {
        let a = finding("abcdef", 0, 0.8);
        let mut b = finding("cdefgh", 2, 0.8);
        b.end = 8;

        let found = dedupe(vec![a, b]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].start, 0);
    }
}
