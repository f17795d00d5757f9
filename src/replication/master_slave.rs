//! Master/slave replication strategy
//!
//! One node accepts writes and pushes them to its slave peers over
//! persistent framed TCP links; slaves apply what they are sent. Every
//! node binds a replication listener regardless of role, so roles can
//! be reassigned without re-provisioning. A peer acknowledges each
//! operation after applying it, and the sender always drains the
//! acknowledgement so the link stays in lockstep; only synchronous
//! delivery surfaces a missing acknowledgement to the caller.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::time::timeout;

use crate::config::{NodeInfo, NodeRole, ReplicationConfig, StrategyKind};
use crate::error::{Error, Result};
use crate::replication::wire::{read_message, write_message, PeerMessage};
use crate::replication::{
    OperationSink, ReplicationStatus, ReplicationStrategy, StrategyState, WriteOperation,
};

/// Base delay between delivery retries; grows linearly per attempt
const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(50);

/// Capacity of the asynchronous delivery queue
const DELIVERY_QUEUE_CAPACITY: usize = 1024;

/// Persistent outbound link to one peer.
///
/// The stream is established lazily on first use and dropped on any
/// delivery failure; the next delivery or health sweep reconnects.
struct PeerLink {
    info: NodeInfo,
    stream: Mutex<Option<TcpStream>>,
    connected: AtomicBool,
}

impl PeerLink {
    fn new(info: NodeInfo) -> Self {
        Self {
            info,
            stream: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    async fn reset(&self) {
        *self.stream.lock().await = None;
        self.connected.store(false, Ordering::Relaxed);
    }

    /// Lock-free connectivity check; true only between a successful
    /// connect and the next reset, so a connect attempt still in flight
    /// is not counted as a live link
    fn is_connected_now(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Master/slave implementation of [`ReplicationStrategy`]
pub struct MasterSlaveStrategy {
    state: RwLock<StrategyState>,
    config: RwLock<Option<ReplicationConfig>>,
    links: Arc<RwLock<HashMap<String, Arc<PeerLink>>>>,
    sink: Arc<RwLock<Option<OperationSink>>>,
    shutdown: watch::Sender<bool>,
    delivery_tx: RwLock<Option<mpsc::Sender<WriteOperation>>>,
    listen_addr: RwLock<Option<SocketAddr>>,
    propagated: Arc<AtomicU64>,
    received: Arc<AtomicU64>,
    pending: Arc<AtomicU64>,
    last_sync: Arc<RwLock<Option<chrono::DateTime<chrono::Utc>>>>,
}

impl MasterSlaveStrategy {
    /// Create a strategy in the CREATED state
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            state: RwLock::new(StrategyState::Created),
            config: RwLock::new(None),
            links: Arc::new(RwLock::new(HashMap::new())),
            sink: Arc::new(RwLock::new(None)),
            shutdown: shutdown_tx,
            delivery_tx: RwLock::new(None),
            listen_addr: RwLock::new(None),
            propagated: Arc::new(AtomicU64::new(0)),
            received: Arc::new(AtomicU64::new(0)),
            pending: Arc::new(AtomicU64::new(0)),
            last_sync: Arc::new(RwLock::new(None)),
        }
    }

    /// Address the replication listener is bound to, once running.
    ///
    /// Useful when the configured port is 0 and the OS picked one.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.listen_addr.read().await
    }
}

impl Default for MasterSlaveStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ReplicationStrategy for MasterSlaveStrategy {
    async fn initialize(&self, config: ReplicationConfig) -> Result<()> {
        let mut state = self.state.write().await;
        if *state != StrategyState::Created {
            return Err(Error::InvalidState(format!(
                "initialize called in state {}",
                state
            )));
        }

        if config.strategy != StrategyKind::MasterSlave {
            return Err(Error::Config(format!(
                "Strategy {} is not handled by the master-slave engine",
                config.strategy
            )));
        }
        config.validate()?;

        let mut links = self.links.write().await;
        for peer in config.replication_targets() {
            links.insert(peer.id.clone(), Arc::new(PeerLink::new(peer)));
        }
        drop(links);

        tracing::info!(
            "Replication initialized: node={} role={} targets={}",
            config.node_id,
            config.role,
            config.replication_targets().len()
        );

        *self.config.write().await = Some(config);
        *state = StrategyState::Initialized;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state != StrategyState::Initialized {
            return Err(Error::InvalidState(format!(
                "start called in state {}",
                state
            )));
        }

        let config = match self.config.read().await.clone() {
            Some(config) => config,
            None => return Err(Error::InvalidState("start called before initialize".to_string())),
        };

        let bind_addr = format!("0.0.0.0:{}", config.replication_port);
        let listener = match TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                return Err(Error::Replication(format!(
                    "Failed to bind replication listener on {}: {}",
                    bind_addr, e
                )));
            }
        };
        let local = listener.local_addr()?;
        *self.listen_addr.write().await = Some(local);
        tracing::info!("Replication listener bound on {}", local);

        // Receiver side: accept peers and hand inbound operations to the sink
        let sink = Arc::clone(&self.sink);
        let received = Arc::clone(&self.received);
        let mut accept_shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((socket, addr)) => {
                                let sink = Arc::clone(&sink);
                                let received = Arc::clone(&received);
                                let conn_shutdown = accept_shutdown.clone();
                                tokio::spawn(async move {
                                    if let Err(e) =
                                        handle_peer(socket, addr, sink, received, conn_shutdown).await
                                    {
                                        tracing::debug!("Peer connection error from {}: {}", addr, e);
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::error!("Replication accept error: {}", e);
                            }
                        }
                    }
                    _ = accept_shutdown.changed() => break,
                }
            }
            tracing::debug!("Replication listener stopped");
        });

        // Health sweep: keep peer links alive and record the sweep time
        let links = Arc::clone(&self.links);
        let last_sync = Arc::clone(&self.last_sync);
        let sweep_config = config.clone();
        let mut sweep_shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_config.sync_interval());
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweep_links(&links, &sweep_config).await;
                        *last_sync.write().await = Some(chrono::Utc::now());
                    }
                    _ = sweep_shutdown.changed() => break,
                }
            }
            tracing::debug!("Health sweep stopped");
        });

        // Asynchronous delivery: drain the queue one operation at a time
        if config.async_replication {
            let (tx, mut rx) = mpsc::channel::<WriteOperation>(DELIVERY_QUEUE_CAPACITY);
            *self.delivery_tx.write().await = Some(tx);

            let links = Arc::clone(&self.links);
            let propagated = Arc::clone(&self.propagated);
            let pending = Arc::clone(&self.pending);
            let delivery_config = config.clone();
            let mut delivery_shutdown = self.shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    let op = tokio::select! {
                        op = rx.recv() => match op {
                            Some(op) => op,
                            None => break,
                        },
                        _ = delivery_shutdown.changed() => break,
                    };

                    let result = deliver_to_all(&links, &delivery_config, &op).await;
                    pending.fetch_sub(1, Ordering::Relaxed);
                    match result {
                        Ok(()) => {
                            propagated.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            tracing::warn!("Asynchronous delivery failed for {}: {}", op, e);
                        }
                    }
                }
                tracing::debug!("Delivery queue stopped");
            });
        }

        *state = StrategyState::Running;
        tracing::info!(
            "Replication running: role={} mode={}",
            config.role,
            if config.async_replication { "async" } else { "sync" }
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state == StrategyState::Stopped {
            return Ok(());
        }
        *state = StrategyState::Stopped;
        drop(state);

        let _ = self.shutdown.send(true);
        *self.delivery_tx.write().await = None;
        *self.sink.write().await = None;

        let mut links = self.links.write().await;
        for link in links.values() {
            link.reset().await;
        }
        links.clear();
        drop(links);

        *self.listen_addr.write().await = None;
        tracing::info!("Replication stopped");
        Ok(())
    }

    async fn can_accept_writes(&self) -> bool {
        match self.config.read().await.as_ref() {
            Some(config) => config.role != NodeRole::Slave,
            None => false,
        }
    }

    async fn propagate_write(&self, op: WriteOperation) -> Result<()> {
        {
            let state = self.state.read().await;
            if *state != StrategyState::Running {
                return Err(Error::InvalidState(format!(
                    "propagate_write called in state {}",
                    state
                )));
            }
        }

        let config = match self.config.read().await.clone() {
            Some(config) => config,
            None => return Err(Error::InvalidState("strategy not initialized".to_string())),
        };

        if config.role == NodeRole::Slave {
            return Err(Error::Replication(
                "Slave nodes do not originate propagation".to_string(),
            ));
        }

        if config.async_replication {
            let tx = self.delivery_tx.read().await.clone();
            match tx {
                Some(tx) => {
                    self.pending.fetch_add(1, Ordering::Relaxed);
                    if tx.send(op).await.is_err() {
                        self.pending.fetch_sub(1, Ordering::Relaxed);
                        return Err(Error::Internal("Delivery queue closed".to_string()));
                    }
                    Ok(())
                }
                None => Err(Error::Internal("Delivery queue not running".to_string())),
            }
        } else {
            deliver_to_all(&self.links, &config, &op).await?;
            self.propagated.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    async fn set_apply_sink(&self, sink: OperationSink) {
        *self.sink.write().await = Some(sink);
    }

    async fn status(&self) -> ReplicationStatus {
        let state = *self.state.read().await;
        let role = self
            .config
            .read()
            .await
            .as_ref()
            .map(|c| c.role)
            .unwrap_or(NodeRole::Slave);

        let links = self.links.read().await;
        let connected_peers = links.values().filter(|l| l.is_connected_now()).count();
        drop(links);

        ReplicationStatus {
            role,
            state,
            connected_peers,
            operations_propagated: self.propagated.load(Ordering::Relaxed),
            operations_received: self.received.load(Ordering::Relaxed),
            pending_queue: self.pending.load(Ordering::Relaxed) as usize,
            last_sync: *self.last_sync.read().await,
        }
    }
}

/// Serve one inbound peer connection: apply operations through the sink,
/// acknowledge each one, answer pings
async fn handle_peer(
    socket: TcpStream,
    addr: SocketAddr,
    sink: Arc<RwLock<Option<OperationSink>>>,
    received: Arc<AtomicU64>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    tracing::debug!("Peer connected from {}", addr);
    let (mut reader, mut writer) = socket.into_split();

    loop {
        let message = tokio::select! {
            message = read_message(&mut reader) => message,
            _ = shutdown.changed() => break,
        };

        match message {
            Ok(PeerMessage::Operation(op)) => {
                let id = op.id;
                let apply = sink.read().await.clone();
                match apply {
                    Some(apply) => apply(op).await,
                    None => tracing::warn!("Dropping operation {}: no apply sink installed", id),
                }
                received.fetch_add(1, Ordering::Relaxed);
                write_message(&mut writer, &PeerMessage::OperationAck { id }).await?;
            }
            Ok(PeerMessage::Ping) => {
                write_message(&mut writer, &PeerMessage::Pong).await?;
            }
            Ok(other) => {
                tracing::trace!("Ignoring {} from {}", other.type_name(), addr);
            }
            Err(Error::Io(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                tracing::warn!("Error reading from peer {}: {}", addr, e);
                break;
            }
        }
    }

    tracing::debug!("Peer disconnected from {}", addr);
    Ok(())
}

/// Deliver one operation to every replication target.
///
/// Targets are attempted concurrently; the call succeeds only when every
/// target acknowledged the operation.
async fn deliver_to_all(
    links: &RwLock<HashMap<String, Arc<PeerLink>>>,
    config: &ReplicationConfig,
    op: &WriteOperation,
) -> Result<()> {
    let targets = config.replication_targets();
    if targets.is_empty() {
        return Ok(());
    }

    let sends = targets.iter().map(|peer| async move {
        let link = link_for(links, peer).await;
        deliver_with_retries(&link, config, op)
            .await
            .map_err(|e| (peer.id.clone(), e))
    });

    let failures: Vec<(String, Error)> = futures::future::join_all(sends)
        .await
        .into_iter()
        .filter_map(|result| result.err())
        .collect();

    if failures.is_empty() {
        tracing::debug!("Propagated {} to {} peer(s)", op, targets.len());
        return Ok(());
    }

    for (peer, e) in &failures {
        tracing::warn!("Delivery to {} failed: {}", peer, e);
    }
    Err(Error::Replication(format!(
        "{} of {} peers unacknowledged for operation {}",
        failures.len(),
        targets.len(),
        op.id
    )))
}

/// Get or create the link for a peer
async fn link_for(
    links: &RwLock<HashMap<String, Arc<PeerLink>>>,
    peer: &NodeInfo,
) -> Arc<PeerLink> {
    {
        let map = links.read().await;
        if let Some(link) = map.get(&peer.id) {
            return Arc::clone(link);
        }
    }

    let mut map = links.write().await;
    Arc::clone(
        map.entry(peer.id.clone())
            .or_insert_with(|| Arc::new(PeerLink::new(peer.clone()))),
    )
}

/// Deliver one operation to one peer, retrying up to the configured
/// budget. Each attempt is bounded by the connection timeout; the link
/// is dropped after any failed attempt so the next one reconnects.
async fn deliver_with_retries(
    link: &PeerLink,
    config: &ReplicationConfig,
    op: &WriteOperation,
) -> Result<()> {
    let address = link.info.address();
    let mut attempt: u32 = 0;

    loop {
        let result = match timeout(config.connection_timeout(), deliver_once(link, op)).await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionTimeout(address.clone())),
        };

        match result {
            Ok(()) => return Ok(()),
            Err(e) => {
                link.reset().await;
                if attempt >= config.max_retries || !e.is_retryable() {
                    return Err(e);
                }
                attempt += 1;
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..25));
                tokio::time::sleep(RETRY_BACKOFF_BASE * attempt + jitter).await;
                tracing::debug!(
                    "Retrying delivery to {} (attempt {}/{})",
                    address,
                    attempt,
                    config.max_retries
                );
            }
        }
    }
}

/// One delivery attempt: connect if needed, send the operation, wait for
/// the matching acknowledgement
async fn deliver_once(link: &PeerLink, op: &WriteOperation) -> Result<()> {
    let mut guard = link.stream.lock().await;
    let stream = match guard.as_mut() {
        Some(stream) => stream,
        None => {
            let stream = connect(&link.info).await?;
            link.connected.store(true, Ordering::Relaxed);
            guard.insert(stream)
        }
    };

    write_message(stream, &PeerMessage::Operation(op.clone())).await?;
    match read_message(stream).await? {
        PeerMessage::OperationAck { id } if id == op.id => Ok(()),
        other => Err(Error::Replication(format!(
            "Unexpected reply {} for operation {}",
            other.type_name(),
            op.id
        ))),
    }
}

/// Establish an outbound connection to a peer
async fn connect(info: &NodeInfo) -> Result<TcpStream> {
    let address = info.address();
    match TcpStream::connect(&address).await {
        Ok(stream) => {
            stream.set_nodelay(true)?;
            tracing::debug!("Connected to peer {} at {}", info.id, address);
            Ok(stream)
        }
        Err(e) => Err(Error::ConnectionFailed {
            address,
            reason: e.to_string(),
        }),
    }
}

/// Ping every link, re-establishing dropped ones
async fn sweep_links(links: &RwLock<HashMap<String, Arc<PeerLink>>>, config: &ReplicationConfig) {
    let snapshot: Vec<Arc<PeerLink>> = links.read().await.values().cloned().collect();

    for link in snapshot {
        let result = timeout(config.connection_timeout(), probe_link(&link)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!("Peer {} unreachable: {}", link.info.address(), e);
                link.reset().await;
            }
            Err(_) => {
                tracing::debug!("Peer {} probe timed out", link.info.address());
                link.reset().await;
            }
        }
    }
}

/// Connect if needed, then ping
async fn probe_link(link: &PeerLink) -> Result<()> {
    let mut guard = link.stream.lock().await;
    let stream = match guard.as_mut() {
        Some(stream) => stream,
        None => {
            let stream = connect(&link.info).await?;
            link.connected.store(true, Ordering::Relaxed);
            guard.insert(stream)
        }
    };

    write_message(stream, &PeerMessage::Ping).await?;
    match read_message(stream).await? {
        PeerMessage::Pong => Ok(()),
        other => Err(Error::Replication(format!(
            "Unexpected reply {} to ping",
            other.type_name()
        ))),
    }
}
