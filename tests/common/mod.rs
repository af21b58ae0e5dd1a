//! Shared fixtures for end-to-end tests
//!
//! - `TestProxy`: a forwarding CONNECT proxy, plain or TLS, that records every
//!   request it sees
//! - `TestServer`: a hyper origin answering `ok`, plain or TLS
//! - `TestCert`: rcgen self-signed certificates
//!
//! Every fake hostname resolves to 127.0.0.1 through the agent's resolve
//! overrides; the proxy connects every tunnel target to 127.0.0.1.

#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use proxyhop::{AgentOptionsBuilder, Destination, ProxyAgent, ProxyEnv, TlsOptions};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

pub const PROXY_HOST: &str = "proxy.proxyhop.test";
pub const SERVER_HOST: &str = "server.proxyhop.test";

/// (proxy over TLS, destination over TLS)
pub const MATRIX: [(bool, bool); 4] = [(false, false), (false, true), (true, false), (true, true)];

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "proxyhop=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// CERTIFICATES
// ============================================================================

pub struct TestCert {
    pub cert: CertificateDer<'static>,
    key: PrivateKeyDer<'static>,
}

impl TestCert {
    pub fn self_signed(name: &str) -> Self {
        let mut params = rcgen::CertificateParams::new(vec![name.to_string()]).unwrap();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, name);
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key_pair).unwrap();

        Self {
            cert: cert.der().clone(),
            key: PrivateKeyDer::Pkcs8(key_pair.serialize_der().into()),
        }
    }

    pub fn acceptor(&self) -> TlsAcceptor {
        let config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![self.cert.clone()], self.key.clone_key())
        .unwrap();

        TlsAcceptor::from(Arc::new(config))
    }

    /// Client options trusting only this certificate
    pub fn trust(&self) -> TlsOptions {
        TlsOptions::default()
            .with_webpki_roots(false)
            .with_root_cert(self.cert.to_vec())
    }
}

// ============================================================================
// PROXY
// ============================================================================

#[derive(Debug, Clone)]
pub enum ProxyBehavior {
    /// Open every requested tunnel
    Tunnel,
    /// Open the tunnel only when `Proxy-Authorization` equals this value, else 407
    RequireAuth(String),
    /// Read the request and never answer
    Stall,
    /// Answer every request with this status
    Reject(u16),
}

/// One CONNECT request as received
#[derive(Debug, Clone)]
pub struct RecordedConnect {
    pub target: String,
    pub headers: Vec<(String, String)>,
}

impl RecordedConnect {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Header names in the order they were sent
    pub fn header_names(&self) -> Vec<&str> {
        self.headers.iter().map(|(n, _)| n.as_str()).collect()
    }
}

pub struct TestProxy {
    pub addr: SocketAddr,
    pub cert: Option<Arc<TestCert>>,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedConnect>>>,
    sni: Arc<Mutex<Vec<Option<String>>>>,
}

impl TestProxy {
    pub async fn start(tls: bool, behavior: ProxyBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cert = tls.then(|| Arc::new(TestCert::self_signed(PROXY_HOST)));
        let acceptor = cert.as_ref().map(|c| c.acceptor());

        let connections = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let sni = Arc::new(Mutex::new(Vec::new()));

        let proxy = Self {
            addr,
            cert,
            connections: connections.clone(),
            requests: requests.clone(),
            sni: sni.clone(),
        };

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                connections.fetch_add(1, Ordering::SeqCst);
                let behavior = behavior.clone();
                let requests = requests.clone();
                let sni = sni.clone();
                let acceptor = acceptor.clone();

                tokio::spawn(async move {
                    let result = match acceptor {
                        Some(acceptor) => match acceptor.accept(tcp).await {
                            Ok(stream) => {
                                let name = stream.get_ref().1.server_name().map(str::to_string);
                                sni.lock().unwrap().push(name);
                                handle_connect(stream, behavior, requests).await
                            }
                            Err(e) => Err(e),
                        },
                        None => handle_connect(tcp, behavior, requests).await,
                    };

                    if let Err(e) = result {
                        debug!("test proxy connection ended: {}", e);
                    }
                });
            }
        });

        proxy
    }

    pub fn url(&self) -> String {
        let scheme = if self.cert.is_some() { "https" } else { "http" };
        format!("{}://{}:{}", scheme, PROXY_HOST, self.addr.port())
    }

    /// Proxy URL carrying `userinfo` verbatim
    pub fn url_with_auth(&self, userinfo: &str) -> String {
        let scheme = if self.cert.is_some() { "https" } else { "http" };
        format!("{}://{}@{}:{}", scheme, userinfo, PROXY_HOST, self.addr.port())
    }

    /// TCP connections accepted so far
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedConnect> {
        self.requests.lock().unwrap().clone()
    }

    pub fn server_names(&self) -> Vec<Option<String>> {
        self.sni.lock().unwrap().clone()
    }

    /// Options pointing at this proxy, trusting its certificate, with both
    /// test hostnames pinned to 127.0.0.1
    pub fn agent_options(&self) -> AgentOptionsBuilder {
        let localhost = "127.0.0.1".parse().unwrap();
        let mut builder = proxyhop::AgentOptions::builder()
            .proxy(self.url())
            .resolve(PROXY_HOST, localhost)
            .resolve(SERVER_HOST, localhost);

        if let Some(cert) = &self.cert {
            builder = builder.proxy_tls(cert.trust());
        }

        builder
    }
}

async fn handle_connect<S>(
    mut stream: S,
    behavior: ProxyBehavior,
    requests: Arc<Mutex<Vec<RecordedConnect>>>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let head = read_head(&mut stream).await?;

    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut req = httparse::Request::new(&mut headers);
    req.parse(&head)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if req.method != Some("CONNECT") {
        stream
            .write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n")
            .await?;
        return Ok(());
    }

    let recorded = RecordedConnect {
        target: req.path.unwrap_or_default().to_string(),
        headers: req
            .headers
            .iter()
            .map(|h| {
                (
                    h.name.to_string(),
                    String::from_utf8_lossy(h.value).into_owned(),
                )
            })
            .collect(),
    };
    requests.lock().unwrap().push(recorded.clone());

    match behavior {
        ProxyBehavior::Tunnel => {}
        ProxyBehavior::RequireAuth(expected) => {
            if recorded.header("proxy-authorization") != Some(expected.as_str()) {
                stream
                    .write_all(
                        b"HTTP/1.1 407 Proxy Authentication Required\r\n\
                          Proxy-Authenticate: Basic realm=\"test\"\r\n\
                          Content-Length: 0\r\n\r\n",
                    )
                    .await?;
                return Ok(());
            }
        }
        ProxyBehavior::Stall => {
            let mut sink = [0u8; 256];
            while stream.read(&mut sink).await? > 0 {}
            return Ok(());
        }
        ProxyBehavior::Reject(status) => {
            let response = format!("HTTP/1.1 {} Rejected\r\nContent-Length: 0\r\n\r\n", status);
            stream.write_all(response.as_bytes()).await?;
            return Ok(());
        }
    }

    let port = recorded
        .target
        .rsplit_once(':')
        .and_then(|(_, port)| port.parse::<u16>().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target without port"))?;

    let mut upstream = match TcpStream::connect(("127.0.0.1", port)).await {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!("test proxy could not reach {}: {}", recorded.target, e);
            stream
                .write_all(b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n")
                .await?;
            return Ok(());
        }
    };

    stream
        .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
        .await?;

    tokio::io::copy_bidirectional(&mut stream, &mut upstream).await?;
    Ok(())
}

async fn read_head<S: AsyncRead + Unpin>(stream: &mut S) -> io::Result<Vec<u8>> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if stream.read(&mut byte).await? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        head.push(byte[0]);
    }

    Ok(head)
}

// ============================================================================
// ORIGIN SERVER
// ============================================================================

pub struct TestServer {
    pub addr: SocketAddr,
    pub cert: Option<Arc<TestCert>>,
    connections: Arc<AtomicUsize>,
    hosts: Arc<Mutex<Vec<String>>>,
    sni: Arc<Mutex<Vec<Option<String>>>>,
}

impl TestServer {
    pub async fn start(tls: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cert = tls.then(|| Arc::new(TestCert::self_signed(SERVER_HOST)));
        let acceptor = cert.as_ref().map(|c| c.acceptor());

        let connections = Arc::new(AtomicUsize::new(0));
        let hosts = Arc::new(Mutex::new(Vec::new()));
        let sni = Arc::new(Mutex::new(Vec::new()));

        let server = Self {
            addr,
            cert,
            connections: connections.clone(),
            hosts: hosts.clone(),
            sni: sni.clone(),
        };

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                connections.fetch_add(1, Ordering::SeqCst);
                let hosts = hosts.clone();
                let sni = sni.clone();
                let acceptor = acceptor.clone();

                tokio::spawn(async move {
                    match acceptor {
                        Some(acceptor) => match acceptor.accept(tcp).await {
                            Ok(stream) => {
                                let name = stream.get_ref().1.server_name().map(str::to_string);
                                sni.lock().unwrap().push(name);
                                serve_ok(stream, hosts).await;
                            }
                            Err(e) => debug!("test server handshake failed: {}", e),
                        },
                        None => serve_ok(tcp, hosts).await,
                    }
                });
            }
        });

        server
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn is_tls(&self) -> bool {
        self.cert.is_some()
    }

    pub fn destination(&self) -> Destination {
        Destination::new(SERVER_HOST, Some(self.port()), self.is_tls())
    }

    /// Value the `Host` header (and the CONNECT target) should carry
    pub fn authority(&self) -> String {
        format!("{}:{}", SERVER_HOST, self.port())
    }

    /// Destination TLS options trusting this server
    pub fn trust(&self) -> TlsOptions {
        self.cert
            .as_ref()
            .map(|c| c.trust())
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn host_headers(&self) -> Vec<String> {
        self.hosts.lock().unwrap().clone()
    }

    pub fn server_names(&self) -> Vec<Option<String>> {
        self.sni.lock().unwrap().clone()
    }
}

async fn serve_ok<S>(stream: S, hosts: Arc<Mutex<Vec<String>>>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req: Request<Incoming>| {
        let hosts = hosts.clone();
        async move {
            if let Some(host) = req.headers().get(hyper::header::HOST) {
                hosts
                    .lock()
                    .unwrap()
                    .push(host.to_str().unwrap_or_default().to_string());
            }
            Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(b"ok"))))
        }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        debug!("test server connection error: {}", e);
    }
}

// ============================================================================
// CLIENT HELPERS
// ============================================================================

pub fn agent(options: AgentOptionsBuilder) -> ProxyAgent {
    ProxyAgent::new(options.build().unwrap(), &ProxyEnv::empty()).unwrap()
}

/// Minimal HTTP/1.1 GET over an established connection. Returns status and body.
pub async fn get<S>(stream: &mut S, authority: &str) -> io::Result<(u16, String)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = format!("GET / HTTP/1.1\r\nHost: {}\r\n\r\n", authority);
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let head = read_head(stream).await?;
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut response = httparse::Response::new(&mut headers);
    response
        .parse(&head)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let status = response.code.unwrap_or_default();
    let length = response
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("content-length"))
        .and_then(|h| std::str::from_utf8(h.value).ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await?;

    Ok((status, String::from_utf8_lossy(&body).into_owned()))
}
