//! Per-host leaf minting behind rustls's certificate callback.
//!
//! [`MintingResolver`] implements `ResolvesServerCert`: on every client
//! handshake it returns the cached leaf for the presented SNI name, minting
//! one on first miss. The cache is never invalidated; the host set a proxy
//! sees in practice is small.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;

use crate::ca::CertificateAuthority;
use crate::error::CaError;

/// SNI name used when the client presents none.
const FALLBACK_HOSTNAME: &str = "localhost";

/// Mints and caches leaf certificates keyed by SNI hostname.
pub struct MintingResolver {
    ca: Arc<CertificateAuthority>,
    cache: RwLock<HashMap<String, Arc<CertifiedKey>>>,
}

impl MintingResolver {
    pub fn new(ca: Arc<CertificateAuthority>) -> Self {
        Self {
            ca,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Cached leaf for `hostname`, minting on first request.
    pub fn certified_key_for(&self, hostname: &str) -> Result<Arc<CertifiedKey>, CaError> {
        if let Some(key) = self.cache.read().get(hostname) {
            return Ok(Arc::clone(key));
        }

        let minted = Arc::new(self.ca.issue(hostname)?);
        let mut cache = self.cache.write();
        // Another connection may have raced us; keep the first mint.
        let entry = cache
            .entry(hostname.to_string())
            .or_insert_with(|| Arc::clone(&minted));
        Ok(Arc::clone(entry))
    }

    /// Number of cached leaves.
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }
}

impl fmt::Debug for MintingResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MintingResolver")
            .field("cached", &self.cached())
            .finish()
    }
}

impl ResolvesServerCert for MintingResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let hostname = client_hello
            .server_name()
            .map(str::to_string)
            .unwrap_or_else(|| FALLBACK_HOSTNAME.to_string());

        match self.certified_key_for(&hostname) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(hostname = %hostname, error = %e, "failed to mint leaf certificate");
                None
            }
        }
    }
}
