//! Agent errors

use proxyhop_config::ConfigError;
use proxyhop_tunnel::TunnelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("Connection pool is closed")]
    PoolClosed,
}

impl AgentError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AgentError::Tunnel(e) if e.is_timeout())
    }

    pub fn tunnel_error(&self) -> Option<&TunnelError> {
        match self {
            AgentError::Tunnel(e) => Some(e),
            _ => None,
        }
    }
}
