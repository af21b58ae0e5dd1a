//! HTTP CONNECT wire format
//!
//! This crate encodes the tunnel request sent to a forward proxy and parses
//! the response head the proxy answers with before the tunnel opens.

pub mod connect;
pub mod response;

pub use connect::{basic_auth_value, ConnectRequest};
pub use response::{is_head_complete, ProtoError, ResponseHead};

/// Maximum size of a proxy response head (8KB)
pub const MAX_HEAD_SIZE: usize = 8 * 1024;

/// Maximum number of headers accepted in a proxy response head
pub const MAX_HEADERS: usize = 64;
