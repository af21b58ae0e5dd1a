//! Proxy response head parsing using httparse

use thiserror::Error;

use crate::MAX_HEADERS;

/// Errors raised while interpreting the proxy's answer to `CONNECT`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtoError {
    #[error("Proxy response head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("Incomplete proxy response head")]
    Incomplete,

    #[error("Malformed proxy response: {0}")]
    Malformed(String),
}

/// Status line and headers of a proxy response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// HTTP status code
    pub status: u16,
    /// Reason phrase
    pub reason: String,
    /// Minor HTTP version (0 for HTTP/1.0, 1 for HTTP/1.1)
    pub version: u8,
    /// Response headers
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// Parse a complete response head (status line, headers, blank line)
    pub fn parse(data: &[u8]) -> Result<Self, ProtoError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut response = httparse::Response::new(&mut headers);

        match response.parse(data) {
            Ok(httparse::Status::Complete(_)) => {
                let status = response
                    .code
                    .ok_or_else(|| ProtoError::Malformed("missing status code".to_string()))?;

                Ok(Self {
                    status,
                    reason: response.reason.unwrap_or("").to_string(),
                    version: response.version.unwrap_or(1),
                    headers: response
                        .headers
                        .iter()
                        .map(|h| {
                            (
                                h.name.to_string(),
                                String::from_utf8_lossy(h.value).into_owned(),
                            )
                        })
                        .collect(),
                })
            }
            Ok(httparse::Status::Partial) => Err(ProtoError::Incomplete),
            Err(e) => Err(ProtoError::Malformed(e.to_string())),
        }
    }

    /// Any 2xx status opens the tunnel
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Whether `data` ends with the blank line that terminates a response head
pub fn is_head_complete(data: &[u8]) -> bool {
    data.ends_with(b"\r\n\r\n") || data.ends_with(b"\n\n")
}
