//! proxyhop: forward-proxy aware connections
//!
//! Opens connections through an HTTP or HTTPS forward proxy using `CONNECT`
//! tunnels, including TLS-over-TLS when both the proxy and the destination
//! speak TLS, and bypasses the proxy for destinations on the no-proxy list.
//!
//! ```no_run
//! use proxyhop::{AgentOptions, Destination, ProxyAgent};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let options = AgentOptions::builder()
//!     .proxy("http://proxy.local:3128")
//!     .no_proxy("localhost, *.internal")
//!     .keep_alive(true)
//!     .build()?;
//!
//! let pool = ProxyAgent::from_env(options)?.into_pool();
//! let conn = pool.checkout(&Destination::https("example.com", None)).await?;
//! // ... speak HTTP over `conn`, then hand it back
//! pool.release(conn).await;
//! # Ok(())
//! # }
//! ```

pub use proxyhop_agent::{
    AgentError, ConnectionFactory, Destination, Pool, PooledConnection, ProxyAgent,
};
pub use proxyhop_config::{
    AgentOptions, AgentOptionsBuilder, ConfigError, Credentials, NoProxy, NoProxyRule,
    PoolOptions, ProxyConfig, ProxyEnv, ProxyScheme, ProxySource, Scheduling, TlsOptions,
};
pub use proxyhop_tunnel::{Connection, MaybeTls, TunnelError, TunnelEstablisher, TunnelRequest};

/// Lower-level building blocks
pub mod proto {
    pub use proxyhop_proto::*;
}
