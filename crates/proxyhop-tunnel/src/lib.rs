//! CONNECT tunnel establishment
//!
//! Opens a connection to a forward proxy (optionally over TLS), asks it to
//! open a tunnel with `CONNECT`, and optionally runs a second, independent TLS
//! handshake with the destination inside that tunnel.

pub mod dial;
pub mod error;
pub mod establish;
pub mod stream;
pub mod tls;

pub use dial::Dialer;
pub use error::TunnelError;
pub use establish::{TunnelEstablisher, TunnelRequest};
pub use stream::{Connection, MaybeTls, ProxyLeg};
pub use tls::{client_config, handshake};
