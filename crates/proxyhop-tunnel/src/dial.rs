//! TCP dialing with fixed address overrides

use std::collections::BTreeMap;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::debug;

/// Opens TCP connections, consulting fixed host mappings before DNS
#[derive(Debug, Clone, Default)]
pub struct Dialer {
    overrides: Arc<BTreeMap<String, IpAddr>>,
}

impl Dialer {
    pub fn new(overrides: BTreeMap<String, IpAddr>) -> Self {
        let overrides = overrides
            .into_iter()
            .map(|(host, addr)| (host.to_ascii_lowercase(), addr))
            .collect();

        Self {
            overrides: Arc::new(overrides),
        }
    }

    /// Address pinned for `host`, if any. The port always comes from the caller.
    pub fn override_for(&self, host: &str) -> Option<IpAddr> {
        self.overrides.get(&host.to_ascii_lowercase()).copied()
    }

    pub async fn dial(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let stream = match self.override_for(host) {
            Some(ip) => {
                let addr = SocketAddr::new(ip, port);
                debug!("Dialing {}:{} via pinned address {}", host, port, addr);
                TcpStream::connect(addr).await?
            }
            None => {
                debug!("Dialing {}:{}", host, port);
                TcpStream::connect((host, port)).await?
            }
        };

        stream.set_nodelay(true)?;
        Ok(stream)
    }
}
