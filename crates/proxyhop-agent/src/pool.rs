//! Minimal keyed connection pool
//!
//! Idle connections are kept per destination key and handed out again in
//! LIFO or FIFO order. Fresh connections come from a [`ConnectionFactory`].
//! A connection only returns to the pool through [`Pool::release`]; dropping a
//! [`PooledConnection`] closes it.
//!
//! Per-key state is forgotten as soon as a key has no idle connections, no
//! checked-out connections and no waiters, so the pool only grows with the
//! number of keys actually in use.

use futures::FutureExt;
use proxyhop_config::{PoolOptions, Scheduling};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

use crate::error::AgentError;
use crate::factory::{ConnectionFactory, Destination};

struct IdleConnection<C> {
    conn: C,
    idle_since: Instant,
}

struct HostSlot<C> {
    idle: VecDeque<IdleConnection<C>>,
    /// Caps checked-out connections for this key
    limit: Option<Arc<Semaphore>>,
}

impl<C> HostSlot<C> {
    fn new(max_sockets: Option<usize>) -> Self {
        Self {
            idle: VecDeque::new(),
            limit: max_sockets.map(|max| Arc::new(Semaphore::new(max))),
        }
    }

    /// Nothing idle, nothing checked out and nobody waiting.
    ///
    /// Permits and waiters each hold a clone of the semaphore, and clones are
    /// only made under the pool lock, so the count cannot go up behind our back.
    fn is_unused(&self) -> bool {
        self.idle.is_empty()
            && self
                .limit
                .as_ref()
                .map_or(true, |limit| Arc::strong_count(limit) == 1)
    }
}

struct PoolState<C> {
    closed: bool,
    hosts: HashMap<String, HostSlot<C>>,
}

impl<C> PoolState<C> {
    fn remove_if_unused(&mut self, key: &str) {
        if self.hosts.get(key).is_some_and(HostSlot::is_unused) {
            self.hosts.remove(key);
        }
    }

    /// Drop expired idle connections and forget unused keys
    fn sweep(&mut self, max_idle: Duration) {
        self.hosts.retain(|_, slot| {
            slot.idle.retain(|entry| entry.idle_since.elapsed() < max_idle);
            !slot.is_unused()
        });
    }
}

/// Whether an idle connection was closed by its peer, or received bytes
/// nobody asked for, while it sat in the pool
fn is_stale<C: AsyncRead + Unpin>(conn: &mut C) -> bool {
    let mut byte = [0u8; 1];
    match conn.read(&mut byte).now_or_never() {
        None => false,
        Some(Ok(0)) => {
            debug!("Idle connection closed by peer");
            true
        }
        Some(Ok(_)) => {
            debug!("Idle connection received unexpected data");
            true
        }
        Some(Err(e)) => {
            debug!("Idle connection failed: {}", e);
            true
        }
    }
}

/// Connection pool over a [`ConnectionFactory`]
pub struct Pool<F: ConnectionFactory> {
    factory: F,
    options: PoolOptions,
    state: Mutex<PoolState<F::Connection>>,
}

impl<F: ConnectionFactory> Pool<F> {
    pub fn new(factory: F, options: PoolOptions) -> Self {
        Self {
            factory,
            options,
            state: Mutex::new(PoolState {
                closed: false,
                hosts: HashMap::new(),
            }),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Get a connection for `destination`, reusing an idle one when possible.
    ///
    /// Waits while `max_sockets` connections for the same key are checked out.
    pub async fn checkout(
        &self,
        destination: &Destination,
    ) -> Result<PooledConnection<F::Connection>, AgentError> {
        let key = destination.pool_key();

        let limit = {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(AgentError::PoolClosed);
            }
            // Also reclaims keys whose connections were dropped instead of released
            state.sweep(self.options.free_socket_timeout);

            let max_sockets = self.options.max_sockets;
            state
                .hosts
                .entry(key.clone())
                .or_insert_with(|| HostSlot::new(max_sockets))
                .limit
                .clone()
        };

        let permit = match limit {
            Some(semaphore) => Some(
                semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| AgentError::PoolClosed)?,
            ),
            None => None,
        };

        if let Some(conn) = self.take_idle(&key).await? {
            debug!("Reusing idle connection for {}", key);
            return Ok(PooledConnection {
                conn,
                key,
                reused: true,
                _permit: permit,
            });
        }

        debug!("Opening new connection for {}", key);
        let created = self
            .factory
            .create_connection(destination, self.options.keep_alive)
            .await;

        match created {
            Ok(conn) => Ok(PooledConnection {
                conn,
                key,
                reused: false,
                _permit: permit,
            }),
            Err(e) => {
                drop(permit);
                self.state.lock().await.remove_if_unused(&key);
                Err(e)
            }
        }
    }

    async fn take_idle(&self, key: &str) -> Result<Option<F::Connection>, AgentError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(AgentError::PoolClosed);
        }

        let Some(slot) = state.hosts.get_mut(key) else {
            return Ok(None);
        };

        let before = slot.idle.len();
        let max_idle = self.options.free_socket_timeout;
        slot.idle.retain(|entry| entry.idle_since.elapsed() < max_idle);
        if slot.idle.len() < before {
            debug!(
                "Discarded {} expired idle connection(s) for {}",
                before - slot.idle.len(),
                key
            );
        }

        let mut found = None;
        loop {
            let entry = match self.options.scheduling {
                Scheduling::Lifo => slot.idle.pop_back(),
                Scheduling::Fifo => slot.idle.pop_front(),
            };
            let Some(mut entry) = entry else {
                break;
            };
            if !is_stale(&mut entry.conn) {
                found = Some(entry.conn);
                break;
            }
            debug!("Discarding stale idle connection for {}", key);
        }

        state.remove_if_unused(key);
        Ok(found)
    }

    /// Hand a connection back after a successful exchange.
    ///
    /// It is kept for reuse only if keep-alive is on and the key has room for
    /// another idle connection; otherwise it is closed.
    pub async fn release(&self, conn: PooledConnection<F::Connection>) {
        let PooledConnection {
            conn,
            key,
            _permit: permit,
            ..
        } = conn;

        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }

        if !self.options.keep_alive {
            debug!("Keep-alive disabled, closing connection for {}", key);
            drop(conn);
        } else {
            let max_sockets = self.options.max_sockets;
            let slot = state
                .hosts
                .entry(key.clone())
                .or_insert_with(|| HostSlot::new(max_sockets));

            if slot.idle.len() >= self.options.max_free_sockets {
                debug!("Idle list for {} is full, closing connection", key);
                drop(conn);
            } else {
                slot.idle.push_back(IdleConnection {
                    conn,
                    idle_since: Instant::now(),
                });
            }
        }

        // Give the permit back before deciding whether the key is still in use
        drop(permit);
        state.remove_if_unused(&key);
    }

    /// Number of idle connections currently held for `destination`
    pub async fn idle_count(&self, destination: &Destination) -> usize {
        let state = self.state.lock().await;
        state
            .hosts
            .get(&destination.pool_key())
            .map(|slot| slot.idle.len())
            .unwrap_or(0)
    }

    /// Number of keys the pool currently tracks
    pub async fn key_count(&self) -> usize {
        self.state.lock().await.hosts.len()
    }

    /// Close every idle connection and refuse further checkouts
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;

        for slot in state.hosts.values_mut() {
            slot.idle.clear();
            if let Some(limit) = &slot.limit {
                limit.close();
            }
        }
    }
}

impl<F: ConnectionFactory + std::fmt::Debug> std::fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("factory", &self.factory)
            .field("options", &self.options)
            .finish()
    }
}

/// A checked-out connection. Reads and writes go straight to the inner stream.
pub struct PooledConnection<C> {
    conn: C,
    key: String,
    reused: bool,
    _permit: Option<OwnedSemaphorePermit>,
}

impl<C> PooledConnection<C> {
    /// Whether this connection came from the idle list
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get_ref(&self) -> &C {
        &self.conn
    }

    pub fn get_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Detach from the pool. The connection no longer counts against `max_sockets`.
    pub fn into_inner(self) -> C {
        self.conn
    }
}

impl<C: AsyncRead + Unpin> AsyncRead for PooledConnection<C> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().conn).poll_read(cx, buf)
    }
}

impl<C: AsyncWrite + Unpin> AsyncWrite for PooledConnection<C> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().conn).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().conn).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().conn).poll_shutdown(cx)
    }
}
