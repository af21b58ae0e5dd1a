//! Proxy connection agent
//!
//! [`ProxyAgent`] decides per destination whether to tunnel through the
//! configured proxy or connect directly, and implements [`ConnectionFactory`]
//! so a pool can ask it for fresh connections. [`Pool`] is a small keyed pool
//! built on that contract.

pub mod agent;
pub mod error;
pub mod factory;
pub mod pool;

pub use agent::ProxyAgent;
pub use error::AgentError;
pub use factory::{ConnectionFactory, Destination};
pub use pool::{Pool, PooledConnection};
