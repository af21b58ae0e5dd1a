//! Agent construction options

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::proxy::ProxySource;
use crate::tls::TlsOptions;

/// Order in which idle connections are handed out again
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheduling {
    /// Most recently released first
    #[default]
    Lifo,
    /// Least recently released first
    Fifo,
}

/// Pooling knobs. The agent forwards these untouched to the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Keep released connections around for reuse
    pub keep_alive: bool,

    /// Maximum checked-out connections per destination (None = unlimited)
    pub max_sockets: Option<usize>,

    /// Maximum idle connections kept per destination
    pub max_free_sockets: usize,

    pub scheduling: Scheduling,

    /// Idle connections older than this are discarded instead of reused
    #[serde(with = "duration_millis")]
    pub free_socket_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            keep_alive: false,
            max_sockets: None,
            max_free_sockets: 256,
            scheduling: Scheduling::Lifo,
            free_socket_timeout: Duration::from_secs(15),
        }
    }
}

/// Everything needed to build an agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentOptions {
    /// Upstream proxy; falls back to HTTPS_PROXY/HTTP_PROXY when unset
    pub proxy: Option<ProxySource>,

    /// TLS settings for the handshake with an `https` proxy only
    pub proxy_tls: TlsOptions,

    /// TLS settings for the handshake with the destination
    pub tls: TlsOptions,

    /// Exception list; falls back to NO_PROXY/no_proxy when unset or blank
    pub no_proxy: Option<String>,

    /// Deadline for a whole connection attempt
    #[serde(with = "duration_millis_opt")]
    pub timeout: Option<Duration>,

    /// Fixed host to address mappings, consulted before DNS
    pub resolve: BTreeMap<String, IpAddr>,

    #[serde(flatten)]
    pub pool: PoolOptions,
}

impl AgentOptions {
    pub fn builder() -> AgentOptionsBuilder {
        AgentOptionsBuilder::default()
    }

    /// The pooling knobs, for handing to a pool
    pub fn pool_options(&self) -> &PoolOptions {
        &self.pool
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_sockets == Some(0) {
            return Err(ConfigError::InvalidOption(
                "max_sockets must be > 0".to_string(),
            ));
        }

        if self.timeout == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidOption("timeout must be > 0".to_string()));
        }

        Ok(())
    }
}

/// Builder for AgentOptions
#[derive(Default)]
pub struct AgentOptionsBuilder {
    options: AgentOptions,
}

impl AgentOptionsBuilder {
    pub fn proxy(mut self, proxy: impl Into<ProxySource>) -> Self {
        self.options.proxy = Some(proxy.into());
        self
    }

    pub fn proxy_tls(mut self, tls: TlsOptions) -> Self {
        self.options.proxy_tls = tls;
        self
    }

    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.options.tls = tls;
        self
    }

    pub fn no_proxy(mut self, list: impl Into<String>) -> Self {
        self.options.no_proxy = Some(list.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Pin `host` to `addr`, like curl's `--resolve`
    pub fn resolve(mut self, host: impl Into<String>, addr: IpAddr) -> Self {
        self.options
            .resolve
            .insert(host.into().to_ascii_lowercase(), addr);
        self
    }

    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.options.pool.keep_alive = enabled;
        self
    }

    pub fn max_sockets(mut self, max: usize) -> Self {
        self.options.pool.max_sockets = Some(max);
        self
    }

    pub fn max_free_sockets(mut self, max: usize) -> Self {
        self.options.pool.max_free_sockets = max;
        self
    }

    pub fn scheduling(mut self, scheduling: Scheduling) -> Self {
        self.options.pool.scheduling = scheduling;
        self
    }

    pub fn free_socket_timeout(mut self, timeout: Duration) -> Self {
        self.options.pool.free_socket_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<AgentOptions, ConfigError> {
        self.options.validate()?;
        Ok(self.options)
    }
}

/// Helper module for serializing Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod duration_millis_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
