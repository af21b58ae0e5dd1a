//! Proxy-aware connection agent
//!
//! Resolves the proxy and the no-proxy list once, then creates connections on
//! demand: bypassed destinations are dialed directly, everything else goes
//! through a `CONNECT` tunnel.

use async_trait::async_trait;
use proxyhop_config::{
    resolve_proxy, AgentOptions, ConfigError, NoProxy, PoolOptions, ProxyConfig, ProxyEnv,
};
use proxyhop_tunnel::{
    client_config, handshake, Connection, Dialer, MaybeTls, TunnelError, TunnelEstablisher,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::error::AgentError;
use crate::factory::{ConnectionFactory, Destination};
use crate::pool::Pool;

/// Creates proxied (or bypassing) connections. Cheap to clone.
#[derive(Clone)]
pub struct ProxyAgent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    establisher: TunnelEstablisher,
    no_proxy: NoProxy,
    dialer: Dialer,
    destination_tls: TlsConnector,
    timeout: Option<Duration>,
    pool: PoolOptions,
}

impl ProxyAgent {
    /// Build an agent from options, falling back to `env` for the proxy and
    /// the exception list.
    pub fn new(options: AgentOptions, env: &ProxyEnv) -> Result<Self, ConfigError> {
        options.validate()?;

        let proxy = Arc::new(resolve_proxy(options.proxy.as_ref(), env)?);
        let no_proxy = NoProxy::resolve(options.no_proxy.as_deref(), env);

        let proxy_tls = client_config(&options.proxy_tls)?;
        let destination_tls = client_config(&options.tls)?;
        let dialer = Dialer::new(options.resolve);

        info!(
            "Proxy agent using {} ({} no_proxy rules, keep-alive {})",
            proxy,
            no_proxy.len(),
            if options.pool.keep_alive { "on" } else { "off" }
        );

        let establisher = TunnelEstablisher::new(
            proxy,
            dialer.clone(),
            proxy_tls,
            destination_tls.clone(),
        )
        .with_timeout(options.timeout);

        Ok(Self {
            inner: Arc::new(AgentInner {
                establisher,
                no_proxy,
                dialer,
                destination_tls: TlsConnector::from(destination_tls),
                timeout: options.timeout,
                pool: options.pool,
            }),
        })
    }

    /// Like [`ProxyAgent::new`] with a snapshot of the current process environment
    pub fn from_env(options: AgentOptions) -> Result<Self, ConfigError> {
        Self::new(options, &ProxyEnv::from_process())
    }

    pub fn proxy(&self) -> &ProxyConfig {
        self.inner.establisher.proxy()
    }

    pub fn no_proxy(&self) -> &NoProxy {
        &self.inner.no_proxy
    }

    /// Pooling knobs, untouched, for whichever pool consumes this agent
    pub fn pool_options(&self) -> &PoolOptions {
        &self.inner.pool
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    pub fn should_use_proxy(&self, destination: &Destination) -> bool {
        self.inner
            .no_proxy
            .should_use_proxy(&destination.host, destination.port)
    }

    /// Open a fresh connection to `destination`.
    ///
    /// `keep_alive` only shapes the `CONNECT` request; reuse is up to the caller.
    pub async fn connect(
        &self,
        destination: &Destination,
        keep_alive: bool,
    ) -> Result<Connection, AgentError> {
        self.connect_with_timeout(destination, keep_alive, None).await
    }

    /// Like [`connect`](Self::connect), but `timeout` bounds this attempt
    /// instead of the agent-wide timeout. `None` keeps the agent's setting.
    pub async fn connect_with_timeout(
        &self,
        destination: &Destination,
        keep_alive: bool,
        timeout: Option<Duration>,
    ) -> Result<Connection, AgentError> {
        if !self.should_use_proxy(destination) {
            debug!("{} matches no_proxy, connecting directly", destination);
            return Ok(self.connect_direct(destination, timeout).await?);
        }

        debug!("{} via proxy {}", destination, self.proxy());
        let conn = self
            .inner
            .establisher
            .establish_with_timeout(&destination.tunnel_request(), keep_alive, timeout)
            .await?;

        Ok(conn)
    }

    async fn connect_direct(
        &self,
        destination: &Destination,
        timeout: Option<Duration>,
    ) -> Result<Connection, TunnelError> {
        let attempt = async {
            let tcp = self
                .inner
                .dialer
                .dial(&destination.host, destination.effective_port())
                .await?;
            let leg = MaybeTls::Plain(tcp);

            if !destination.secure {
                return Ok(MaybeTls::Plain(leg));
            }

            let tls = handshake(&self.inner.destination_tls, &destination.host, leg).await?;
            Ok::<Connection, TunnelError>(MaybeTls::Tls(Box::new(tls)))
        };

        match timeout.or(self.inner.timeout) {
            Some(limit) => match tokio::time::timeout(limit, attempt).await {
                Ok(result) => result,
                Err(_) => Err(TunnelError::Transport(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("direct connection to {} timed out", destination),
                ))),
            },
            None => attempt.await,
        }
    }

    /// Wrap this agent in a pool configured with its own pooling knobs
    pub fn into_pool(self) -> Pool<Self> {
        let options = self.pool_options().clone();
        Pool::new(self, options)
    }
}

#[async_trait]
impl ConnectionFactory for ProxyAgent {
    type Connection = Connection;

    async fn create_connection(
        &self,
        destination: &Destination,
        keep_alive: bool,
    ) -> Result<Connection, AgentError> {
        self.connect(destination, keep_alive).await
    }
}

impl std::fmt::Debug for ProxyAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyAgent")
            .field("proxy", &self.proxy().to_string())
            .field("no_proxy", &self.inner.no_proxy.entries())
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}
