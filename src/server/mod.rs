//! Client-facing connection server
//!
//! Accepts TCP connections and maps the line protocol onto the bound
//! store: one task per connection, commands handled sequentially within
//! a connection and concurrently across connections.

pub mod command;

pub use command::{parse, Command, ParseError};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, RwLock};
use tokio_util::codec::{Framed, LinesCodec};

use crate::error::{Error, Result};
use crate::store::Store;

/// Pause after binding before the server reports itself accepting
const STARTUP_GRACE: Duration = Duration::from_millis(50);

/// Longest accepted input line in bytes
const MAX_LINE_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    Stopped,
    Running,
}

/// Concurrent line-protocol front end over a store.
///
/// `start` and `stop` may be called repeatedly; starting a running
/// server is an error, stopping a stopped one is a no-op.
pub struct ConnectionServer<S> {
    store: Arc<S>,
    bind_address: String,
    state: RwLock<ServerState>,
    shutdown: watch::Sender<bool>,
    local_addr: RwLock<Option<SocketAddr>>,
}

impl<S> ConnectionServer<S>
where
    S: Store<String, String> + 'static,
{
    /// Create a server that will bind to `bind_address` once started
    pub fn new(bind_address: impl Into<String>, store: Arc<S>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            bind_address: bind_address.into(),
            state: RwLock::new(ServerState::Stopped),
            shutdown: shutdown_tx,
            local_addr: RwLock::new(None),
        }
    }

    /// Address the listener is bound to, once running.
    ///
    /// Useful when the configured port is 0 and the OS picked one.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().await
    }

    /// Whether the accept loop is running
    pub async fn is_running(&self) -> bool {
        *self.state.read().await == ServerState::Running
    }

    /// Bind the listener and start accepting connections.
    ///
    /// Returns once the server is accepting; fails if it is already
    /// running or the listener cannot bind.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state == ServerState::Running {
            return Err(Error::InvalidState("Server is already running".to_string()));
        }

        let listener = TcpListener::bind(&self.bind_address).await?;
        let local = listener.local_addr()?;
        *self.local_addr.write().await = Some(local);
        tracing::info!("Connection server listening on {}", local);

        let store = Arc::clone(&self.store);
        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((socket, addr)) => {
                                let store = Arc::clone(&store);
                                let conn_shutdown = shutdown_rx.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_client(socket, addr, store, conn_shutdown).await {
                                        tracing::debug!("Connection error from {}: {}", addr, e);
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::info!("Connection server stopped accepting");
        });

        *state = ServerState::Running;
        drop(state);

        // Bridge the gap between binding and the accept task being polled
        tokio::time::sleep(STARTUP_GRACE).await;
        Ok(())
    }

    /// Stop accepting connections; idempotent and safe to call while
    /// connections are in flight
    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        if *state == ServerState::Stopped {
            return;
        }
        *state = ServerState::Stopped;
        *self.local_addr.write().await = None;
        let _ = self.shutdown.send(true);
        tracing::info!("Connection server stopped");
    }
}

/// Serve one client connection
async fn handle_client<S>(
    socket: TcpStream,
    addr: SocketAddr,
    store: Arc<S>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    S: Store<String, String>,
{
    tracing::debug!("Client connected from {}", addr);
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_BYTES));

    loop {
        let line = tokio::select! {
            line = framed.next() => line,
            _ = shutdown.changed() => break,
        };

        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                tracing::debug!("Read error from {}: {}", addr, e);
                break;
            }
            None => break,
        };

        match command::parse(&line) {
            Ok(Command::Set { key, value }) => {
                let response = match store.put(key, value).await {
                    Ok(()) => "OK".to_string(),
                    Err(e) => {
                        tracing::warn!("Put failed: {}", e);
                        "ERROR: Internal error".to_string()
                    }
                };
                framed.send(response).await?;
            }
            Ok(Command::Get { key }) => {
                let response = match store.get(&key).await {
                    Some(value) => value,
                    None => "ERROR: Key not found".to_string(),
                };
                framed.send(response).await?;
            }
            Ok(Command::Exit) => {
                framed.send("Bye!".to_string()).await?;
                break;
            }
            Err(e) => {
                framed.send(e.response().to_string()).await?;
            }
        }
    }

    tracing::debug!("Client disconnected from {}", addr);
    Ok(())
}
