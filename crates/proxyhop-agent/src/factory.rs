//! The socket-creation contract between a pool and whatever opens connections

use async_trait::async_trait;
use http::Uri;
use proxyhop_config::no_proxy::candidate;
use proxyhop_tunnel::TunnelRequest;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::AgentError;

/// What a pool asks a connection for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    /// Hostname or IP literal, without IPv6 brackets
    pub host: String,
    /// Port named explicitly by the request, if any
    pub port: Option<u16>,
    pub secure: bool,
}

impl Destination {
    pub fn new(host: impl Into<String>, port: Option<u16>, secure: bool) -> Self {
        let host = host.into();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .map(str::to_string)
            .unwrap_or(host);

        Self { host, port, secure }
    }

    pub fn http(host: impl Into<String>, port: Option<u16>) -> Self {
        Self::new(host, port, false)
    }

    pub fn https(host: impl Into<String>, port: Option<u16>) -> Self {
        Self::new(host, port, true)
    }

    /// `http`/`ws` URIs are plain, `https`/`wss` secure; a missing scheme means plain
    pub fn from_uri(uri: &Uri) -> Result<Self, AgentError> {
        let secure = match uri.scheme_str() {
            Some("https") | Some("wss") => true,
            Some("http") | Some("ws") | None => false,
            Some(other) => {
                return Err(AgentError::InvalidDestination(format!(
                    "unsupported scheme '{}' in {}",
                    other, uri
                )))
            }
        };

        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AgentError::InvalidDestination(format!("no host in {}", uri)))?;

        Ok(Self::new(host, uri.port_u16(), secure))
    }

    /// Port to actually connect to: the explicit one, else 443/80
    pub fn effective_port(&self) -> u16 {
        match (self.port, self.secure) {
            (Some(port), _) => port,
            (None, true) => 443,
            (None, false) => 80,
        }
    }

    /// The string no-proxy patterns are evaluated against
    pub fn no_proxy_candidate(&self) -> String {
        candidate(&self.host, self.port)
    }

    /// Connections are interchangeable only within the same key
    pub fn pool_key(&self) -> String {
        format!("{}:{}:{}", self.host, self.effective_port(), self.secure)
    }

    pub fn tunnel_request(&self) -> TunnelRequest {
        TunnelRequest::new(self.host.clone(), self.effective_port(), self.secure)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.secure { "https" } else { "http" };
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", scheme, self.host, self.effective_port())
        } else {
            write!(f, "{}://{}:{}", scheme, self.host, self.effective_port())
        }
    }
}

/// Creates fresh raw connections on demand.
///
/// A pool calls this whenever it has no idle connection to hand out. A
/// connection that failed to set up must never be returned.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    async fn create_connection(
        &self,
        destination: &Destination,
        keep_alive: bool,
    ) -> Result<Self::Connection, AgentError>;
}
