//! Proxy configuration resolution
//!
//! Turns explicit options and a one-time snapshot of the process environment
//! into immutable values: the upstream proxy to tunnel through, the compiled
//! no-proxy exception list, and the TLS and pooling options of an agent.

pub mod env;
pub mod error;
pub mod no_proxy;
pub mod options;
pub mod proxy;
pub mod tls;

pub use env::ProxyEnv;
pub use error::ConfigError;
pub use no_proxy::{NoProxy, NoProxyRule};
pub use options::{AgentOptions, AgentOptionsBuilder, PoolOptions, Scheduling};
pub use proxy::{resolve_proxy, Credentials, ProxyConfig, ProxyScheme, ProxySource};
pub use tls::TlsOptions;
