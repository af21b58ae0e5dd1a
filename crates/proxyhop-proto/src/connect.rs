//! `CONNECT` request encoding

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};

/// A `CONNECT` request asking the proxy to open a byte pipe to `host:port`.
///
/// Headers are always written in the same order: `Host`, then
/// `Proxy-Authorization` (only when credentials are set), then `Connection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    authority: String,
    proxy_authorization: Option<String>,
    keep_alive: bool,
}

impl ConnectRequest {
    /// Create a request for the given target. IPv6 literals are bracketed.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            authority: authority(host, port),
            proxy_authorization: None,
            keep_alive: false,
        }
    }

    /// Attach Basic credentials. Username and password are joined with `:`
    /// and encoded as-is, with no percent-decoding or other transformation.
    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        self.proxy_authorization = Some(basic_auth_value(username, password));
        self
    }

    /// Select `Connection: keep-alive` (true) or `Connection: close` (false)
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// The `host:port` string used both as request target and `Host` value
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn proxy_authorization(&self) -> Option<&str> {
        self.proxy_authorization.as_deref()
    }

    pub fn connection_header(&self) -> &'static str {
        if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        }
    }

    /// Serialize the request line and headers, including the terminating blank line
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(128 + self.authority.len() * 2);

        buf.put_slice(b"CONNECT ");
        buf.put_slice(self.authority.as_bytes());
        buf.put_slice(b" HTTP/1.1\r\n");

        buf.put_slice(b"Host: ");
        buf.put_slice(self.authority.as_bytes());
        buf.put_slice(b"\r\n");

        if let Some(value) = &self.proxy_authorization {
            buf.put_slice(b"Proxy-Authorization: ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }

        buf.put_slice(b"Connection: ");
        buf.put_slice(self.connection_header().as_bytes());
        buf.put_slice(b"\r\n");

        buf.put_slice(b"\r\n");
        buf.freeze()
    }
}

/// Build a `Basic <base64(username:password)>` header value
pub fn basic_auth_value(username: &str, password: &str) -> String {
    let credentials = format!("{}:{}", username, password);
    format!("Basic {}", STANDARD.encode(credentials.as_bytes()))
}

fn authority(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
