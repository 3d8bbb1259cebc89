//! Keymask core - secret detection and placeholder substitution for LLM traffic.
//!
//! This crate holds everything the proxy needs that does not touch the
//! network: the deterministic placeholder codec, the secret detectors and
//! their manager, the replacer that drives substitution and restoration, the
//! protocol layer that lifts LLM wire formats into a neutral message model,
//! the SSE codec with its bounded stream buffer, and the Prometheus metric
//! set.
//!
//! ## Pipeline
//!
//! ```text
//! request body ─▶ ProtocolRegistry::detect ─▶ parse_request
//!                                               │
//!                             DetectorManager::detect_all per message
//!                                               │
//!                        Replacer / placeholder substitution ─▶ serialize
//!
//! response body ─▶ parse_response ─▶ PlaceholderCodec::find_all ─▶ restore
//! ```

pub mod detect;
pub mod error;
pub mod metrics;
pub mod placeholder;
pub mod protocol;
pub mod replace;

pub use detect::{
    DetectedSecret, DetectorManager, EntropyConfig, EntropyDetector, PatternConfig,
    PatternDetector, RuleSpec, SecretDetector, SecretKind,
};
pub use error::ProtocolError;
pub use metrics::Metrics;
pub use placeholder::PlaceholderCodec;
pub use protocol::{
    Message, MessageMetadata, OpenAiHandler, ProtocolHandler, ProtocolRegistry, RequestContext,
    SseDecoder, SseEvent, StandardMessage, StreamBuffer, StreamChunk,
};
pub use replace::{ReplaceOutcome, Replacer, RestoreOutcome};
