//! TLS options for one side of a connection
//!
//! An agent carries two independent sets: one for the handshake with an
//! `https` proxy, one for the handshake with the destination (inside the tunnel
//! or on a direct connection).

use serde::{Deserialize, Serialize};

/// Trust and negotiation settings for a TLS client handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsOptions {
    /// Extra trust anchors (DER-encoded certificates)
    pub root_certs: Vec<Vec<u8>>,

    /// Include the bundled webpki root store
    pub use_webpki_roots: bool,

    /// Accept any server certificate (INSECURE - only for testing!)
    pub danger_accept_invalid_certs: bool,

    /// ALPN protocols to offer, in preference order
    pub alpn_protocols: Vec<String>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            root_certs: Vec::new(),
            use_webpki_roots: true,
            danger_accept_invalid_certs: false,
            alpn_protocols: Vec::new(),
        }
    }
}

impl TlsOptions {
    /// Trust an additional DER-encoded certificate
    pub fn with_root_cert(mut self, der: impl Into<Vec<u8>>) -> Self {
        self.root_certs.push(der.into());
        self
    }

    /// Enable or disable the bundled webpki roots
    pub fn with_webpki_roots(mut self, enabled: bool) -> Self {
        self.use_webpki_roots = enabled;
        self
    }

    /// Disable certificate verification (INSECURE - only for testing!)
    pub fn with_insecure_skip_verify(mut self) -> Self {
        self.danger_accept_invalid_certs = true;
        self
    }

    pub fn with_alpn_protocols(mut self, protocols: Vec<String>) -> Self {
        self.alpn_protocols = protocols;
        self
    }
}
