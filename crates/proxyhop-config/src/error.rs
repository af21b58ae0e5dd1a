//! Configuration errors

use thiserror::Error;

/// Raised while building an agent; all of these are fatal at construction time
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No proxy configured and none found in HTTPS_PROXY/HTTP_PROXY")]
    MissingProxy,

    #[error("Invalid proxy URL: {0}")]
    InvalidProxyUrl(String),

    #[error("Unsupported proxy scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Proxy URL has no host")]
    MissingHost,

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("TLS configuration error: {0}")]
    Tls(String),
}
