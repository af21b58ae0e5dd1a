//! Example: fetch a URL through the proxy configured in the environment
//!
//! Reads `HTTPS_PROXY`/`HTTP_PROXY` and `NO_PROXY` once, opens a connection to
//! the URL's host (tunneled or direct), sends a GET over it with hyper and
//! prints the response.
//!
//! Run this example:
//! ```bash
//! HTTPS_PROXY=http://127.0.0.1:3128 cargo run --example fetch_via_proxy -- https://example.com/
//! ```
//!
//! Set `RUST_LOG=proxyhop=debug` to see the route taken for the request.

use anyhow::{Context, Result};
use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::{Request, Uri};
use http_body_util::{BodyExt, Empty};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use proxyhop::{AgentOptions, Destination, ProxyAgent};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("proxyhop=info")),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://example.com/".to_string());
    let uri: Uri = url.parse().context("invalid URL")?;

    let options = AgentOptions::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let agent = ProxyAgent::from_env(options).context("no usable proxy configuration")?;
    info!("Using proxy {}", agent.proxy());

    let destination = Destination::from_uri(&uri)?;
    let route = if agent.should_use_proxy(&destination) {
        "tunnel"
    } else {
        "direct"
    };
    info!("Connecting to {} ({})", destination, route);

    let conn = agent.connect(&destination, false).await?;

    let (mut sender, connection) = http1::handshake(TokioIo::new(conn))
        .await
        .context("HTTP handshake failed")?;

    // Spawn connection driver
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("Connection closed: {}", e);
        }
    });

    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let authority = uri
        .authority()
        .map(|a| a.as_str())
        .unwrap_or(&destination.host);
    let request = Request::builder()
        .uri(path)
        .header(HOST, authority)
        .header(USER_AGENT, "proxyhop-demo")
        .body(Empty::<Bytes>::new())?;

    let response = sender.send_request(request).await?;
    println!("{:?} {}", response.version(), response.status());
    for (name, value) in response.headers() {
        println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    println!();

    let body = response.into_body().collect().await?.to_bytes();
    println!("{}", String::from_utf8_lossy(&body));

    Ok(())
}
