//! CONNECT handshake state machine
//!
//! One attempt walks through: dial the proxy, optional TLS with the proxy,
//! send `CONNECT`, read the response head, optional TLS with the destination.
//! A single deadline covers every step; when it fires the in-flight future is
//! dropped, which closes whatever was opened so far.

use proxyhop_config::ProxyConfig;
use proxyhop_proto::{is_head_complete, ConnectRequest, ProtoError, ResponseHead, MAX_HEAD_SIZE};
use rustls::ClientConfig;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::dial::Dialer;
use crate::error::TunnelError;
use crate::stream::{Connection, MaybeTls, ProxyLeg};
use crate::tls::handshake;

/// Where the tunnel should lead
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRequest {
    pub target_host: String,
    pub target_port: u16,
    /// Run a TLS handshake with the target inside the tunnel
    pub target_is_secure: bool,
}

impl TunnelRequest {
    pub fn new(target_host: impl Into<String>, target_port: u16, target_is_secure: bool) -> Self {
        Self {
            target_host: target_host.into(),
            target_port,
            target_is_secure,
        }
    }
}

/// Creates tunneled connections through one proxy. Cheap to clone; all
/// state is immutable and shared.
#[derive(Clone)]
pub struct TunnelEstablisher {
    proxy: Arc<ProxyConfig>,
    dialer: Dialer,
    proxy_tls: TlsConnector,
    destination_tls: TlsConnector,
    timeout: Option<Duration>,
}

impl TunnelEstablisher {
    /// `proxy_tls` is only used when the proxy scheme is `https`;
    /// `destination_tls` only for secure targets.
    pub fn new(
        proxy: Arc<ProxyConfig>,
        dialer: Dialer,
        proxy_tls: Arc<ClientConfig>,
        destination_tls: Arc<ClientConfig>,
    ) -> Self {
        Self {
            proxy,
            dialer,
            proxy_tls: TlsConnector::from(proxy_tls),
            destination_tls: TlsConnector::from(destination_tls),
            timeout: None,
        }
    }

    /// Deadline for a whole attempt
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn proxy(&self) -> &ProxyConfig {
        &self.proxy
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Open a tunnel to `request`'s target.
    ///
    /// `keep_alive` selects the `Connection` header sent with `CONNECT`.
    /// On any failure nothing is returned and every opened stream is closed.
    pub async fn establish(
        &self,
        request: &TunnelRequest,
        keep_alive: bool,
    ) -> Result<Connection, TunnelError> {
        self.establish_with_timeout(request, keep_alive, None).await
    }

    /// Like [`establish`](Self::establish), with a limit for this attempt only.
    ///
    /// `None` falls back to the establisher's own timeout.
    pub async fn establish_with_timeout(
        &self,
        request: &TunnelRequest,
        keep_alive: bool,
        timeout: Option<Duration>,
    ) -> Result<Connection, TunnelError> {
        let attempt = self.negotiate(request, keep_alive);

        let result = match timeout.or(self.timeout) {
            Some(limit) => match tokio::time::timeout(limit, attempt).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        "Tunnel to {}:{} via {} timed out after {:?}",
                        request.target_host, request.target_port, self.proxy, limit
                    );
                    Err(TunnelError::ProxyTimeout)
                }
            },
            None => attempt.await,
        };

        if let Err(e) = &result {
            debug!(
                "Tunnel to {}:{} failed: {}",
                request.target_host, request.target_port, e
            );
        }

        result
    }

    async fn negotiate(
        &self,
        request: &TunnelRequest,
        keep_alive: bool,
    ) -> Result<Connection, TunnelError> {
        let mut leg = self.connect_proxy().await?;

        let mut connect = ConnectRequest::new(&request.target_host, request.target_port)
            .with_keep_alive(keep_alive);
        if let Some(creds) = &self.proxy.credentials {
            connect = connect.with_basic_auth(&creds.username, &creds.password);
        }

        debug!(
            "CONNECT {} via {} (Connection: {})",
            connect.authority(),
            self.proxy,
            connect.connection_header()
        );

        leg.write_all(&connect.encode()).await?;
        leg.flush().await?;

        let head = read_response_head(&mut leg).await?;
        if !head.is_success() {
            warn!(
                "Proxy {} refused CONNECT {}: {} {}",
                self.proxy,
                connect.authority(),
                head.status,
                head.reason
            );
            return Err(TunnelError::ProxyConnectFailed {
                status_code: head.status,
            });
        }

        info!(
            "Tunnel established to {} via {}",
            connect.authority(),
            self.proxy
        );

        if !request.target_is_secure {
            return Ok(MaybeTls::Plain(leg));
        }

        let tls = handshake(&self.destination_tls, &request.target_host, leg).await?;
        Ok(MaybeTls::Tls(Box::new(tls)))
    }

    async fn connect_proxy(&self) -> Result<ProxyLeg, TunnelError> {
        let tcp = self.dialer.dial(&self.proxy.host, self.proxy.port).await?;

        if !self.proxy.is_tls() {
            return Ok(MaybeTls::Plain(tcp));
        }

        let tls = handshake(&self.proxy_tls, &self.proxy.host, tcp).await?;
        Ok(MaybeTls::Tls(Box::new(tls)))
    }
}

impl std::fmt::Debug for TunnelEstablisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelEstablisher")
            .field("proxy", &self.proxy.to_string())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Read the proxy's response head one byte at a time so that no byte
/// belonging to the tunnel is consumed.
async fn read_response_head<S>(stream: &mut S) -> Result<ResponseHead, TunnelError>
where
    S: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(128);
    let mut byte = [0u8; 1];

    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(TunnelError::Transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "proxy closed the connection before responding to CONNECT",
            )));
        }

        head.push(byte[0]);

        if is_head_complete(&head) {
            break;
        }
        if head.len() >= MAX_HEAD_SIZE {
            return Err(ProtoError::HeadTooLarge(MAX_HEAD_SIZE).into());
        }
    }

    Ok(ResponseHead::parse(&head)?)
}
