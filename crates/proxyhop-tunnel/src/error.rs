//! Tunnel errors

use proxyhop_proto::ProtoError;
use thiserror::Error;

/// Why a connection attempt failed. The connection is always destroyed.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Proxy timeout")]
    ProxyTimeout,

    #[error("Bad response: {status_code}")]
    ProxyConnectFailed { status_code: u16 },

    #[error("TLS handshake with {host} failed: {source}")]
    TlsHandshakeFailed {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Invalid TLS server name: {0}")]
    InvalidServerName(String),

    #[error(transparent)]
    MalformedResponse(#[from] ProtoError),
}

impl TunnelError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TunnelError::ProxyTimeout)
    }

    /// Status code returned by the proxy, if it rejected the tunnel
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TunnelError::ProxyConnectFailed { status_code } => Some(*status_code),
            _ => None,
        }
    }
}
