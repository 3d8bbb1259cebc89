//! Keymask proxy - TLS interception and the request/response pipeline.
//!
//! The engine accepts CONNECT tunnels, terminates the client's TLS with a
//! per-host leaf certificate minted on demand from a local root CA, and runs
//! each decoded request through the secret service: detection and placeholder
//! substitution on the way upstream, restoration (whole-body or streaming)
//! on the way back.
//!
//! ```text
//! client ──CONNECT──▶ engine ──TLS(minted leaf)──▶ HTTP/1.1 loop
//!                                                     │
//!                              SecretService::process_request
//!                                                     │
//!                                upstream (rustls, HTTP/1.1 only)
//!                                                     │
//!                  streaming? StreamRestorer : whole-body restore
//! ```

mod ca;
mod engine;
mod error;
mod minter;
mod service;
mod stream;

pub use ca::CertificateAuthority;
pub use engine::{BoundProxy, ProxyConfig, ProxyServer};
pub use error::{CaError, ProxyError, Result};
pub use minter::MintingResolver;
pub use service::{RequestOutcome, ResponseOutcome, SecretService};
pub use stream::StreamRestorer;

/// Default listen address, `host:port` with an empty host meaning all
/// interfaces.
pub const DEFAULT_LISTEN: &str = ":8080";

/// Default cap on buffered request/response bodies.
pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
