//! Server network layer: accepts TCP connections and multiplexes their frames
//! through a single dispatch loop

use crate::registry::{ConnectionId, ConnectionRegistry, DuplicateOriginPolicy};
use crate::session::{Session, SessionOutcome};
use log::{debug, error, info, warn};
use shared::framing::{receive_frame, send_frame, Frame, FrameConfig, FramingError};
use shared::{World, WorldCodec, WorldCodecError};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode world snapshot: {0}")]
    Codec(#[from] WorldCodecError),

    #[error("failed to frame world snapshot: {0}")]
    Framing(#[from] FramingError),
}

/// Largest frame a client may send; player states are a few dozen bytes
pub const DEFAULT_INBOUND_MAX_FRAME_LEN: usize = 64 * 1024;

/// Frames buffered between all reader tasks and the dispatch loop
pub const READER_QUEUE_CAPACITY: usize = 32;

/// Listener and protocol settings for a [`Server`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub duplicate_origin: DuplicateOriginPolicy,
    /// Applied to the world snapshot and peer-list replies
    pub outbound: FrameConfig,
    /// Applied to every frame read from a client
    pub inbound: FrameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            duplicate_origin: DuplicateOriginPolicy::default(),
            outbound: FrameConfig::default(),
            inbound: FrameConfig {
                max_frame_len: DEFAULT_INBOUND_MAX_FRAME_LEN,
                ..FrameConfig::default()
            },
        }
    }
}

/// Messages sent from connection reader tasks to the dispatch loop
#[derive(Debug)]
pub enum ServerMessage {
    FrameReceived {
        conn_id: ConnectionId,
        payload: Vec<u8>,
    },
    PeerDisconnected {
        conn_id: ConnectionId,
    },
    TransportError {
        conn_id: ConnectionId,
        error: FramingError,
    },
}

struct Connection {
    session: Session,
    writer: OwnedWriteHalf,
    reader_task: JoinHandle<()>,
}

/// Authoritative server: owns the registry and every session
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    snapshot: Arc<Frame>,
    registry: ConnectionRegistry,
    connections: HashMap<ConnectionId, Connection>,
    next_conn_id: ConnectionId,

    // Reader tasks -> dispatch loop
    server_tx: mpsc::Sender<ServerMessage>,
    server_rx: mpsc::Receiver<ServerMessage>,
}

impl Server {
    /// Binds the listener and encodes the world snapshot sent to every newcomer
    pub async fn bind(
        config: ServerConfig,
        world: &World,
        codec: &WorldCodec,
    ) -> Result<Self, ServerError> {
        let payload = codec.encode(world)?;
        let snapshot = Frame::encode(&payload, &config.outbound)?;
        info!(
            "World snapshot ready: {} bytes ({} on the wire{})",
            payload.len(),
            snapshot.wire_len(),
            if snapshot.is_compressed() { ", compressed" } else { "" }
        );

        let listener = TcpListener::bind(&config.bind_addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::channel(READER_QUEUE_CAPACITY);

        Ok(Server {
            listener,
            config,
            snapshot: Arc::new(snapshot),
            registry: ConnectionRegistry::new(),
            connections: HashMap::new(),
            next_conn_id: 1,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Number of open connections, including those still awaiting a handshake
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Main server loop; returns once `shutdown` resolves
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Server started successfully");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                }

                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, origin)) => self.accept_connection(stream, origin).await,
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                }

                Some(message) = self.server_rx.recv() => {
                    self.handle_message(message).await;
                }
            }
        }

        // Sockets close; the registry keeps its last state for inspection
        for (_, connection) in self.connections.drain() {
            connection.reader_task.abort();
        }
        info!("Server stopped with {} players registered", self.registry.len());
        Ok(())
    }

    /// Sends the snapshot and starts reading the handshake
    async fn accept_connection(&mut self, stream: TcpStream, origin: SocketAddr) {
        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;
        info!("Connection {} accepted from {}", conn_id, origin);

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", origin, e);
        }
        let (reader, mut writer) = stream.into_split();
        let mut session = Session::new(conn_id, origin);

        if let Err(e) = self.snapshot.write_to(&mut writer).await {
            warn!("Failed to send world snapshot to {}: {}", origin, e);
            return;
        }
        session.snapshot_sent();

        let reader_task = self.spawn_connection_reader(conn_id, reader);
        self.connections.insert(
            conn_id,
            Connection {
                session,
                writer,
                reader_task,
            },
        );
    }

    /// Spawns task that forwards every frame of one connection to the loop.
    /// The task stops reading while the loop's queue is full.
    fn spawn_connection_reader(
        &self,
        conn_id: ConnectionId,
        mut reader: OwnedReadHalf,
    ) -> JoinHandle<()> {
        let server_tx = self.server_tx.clone();
        let frame_config = self.config.inbound.clone();

        tokio::spawn(async move {
            loop {
                let message = match receive_frame(&mut reader, &frame_config).await {
                    Ok(Some(payload)) => ServerMessage::FrameReceived { conn_id, payload },
                    Ok(None) => ServerMessage::PeerDisconnected { conn_id },
                    Err(error) => ServerMessage::TransportError { conn_id, error },
                };
                let last = !matches!(message, ServerMessage::FrameReceived { .. });

                if server_tx.send(message).await.is_err() || last {
                    break;
                }
            }
        })
    }

    async fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::FrameReceived { conn_id, payload } => {
                self.handle_frame(conn_id, &payload).await;
            }
            ServerMessage::PeerDisconnected { conn_id } => {
                debug!("Connection {} reached end of stream", conn_id);
                self.close_connection(conn_id);
            }
            ServerMessage::TransportError { conn_id, error } => {
                warn!("Transport error on connection {}: {}", conn_id, error);
                self.close_connection(conn_id);
            }
        }
    }

    /// Drives one frame through the owning session and writes any reply
    async fn handle_frame(&mut self, conn_id: ConnectionId, payload: &[u8]) {
        let Some(connection) = self.connections.get_mut(&conn_id) else {
            // Late frame from a connection that was already closed
            return;
        };
        let origin = connection.session.origin();

        let outcome =
            connection
                .session
                .handle_frame(&mut self.registry, payload, self.config.duplicate_origin);

        match outcome {
            Ok(SessionOutcome::Registered { evicted }) => {
                if let Some(user) = evicted {
                    self.close_connection(user.conn_id);
                }
            }
            Ok(SessionOutcome::Reply(bytes)) => {
                let sent = send_frame(&mut connection.writer, &bytes, &self.config.outbound).await;
                if let Err(e) = sent {
                    warn!("Failed to reply to {}: {}", origin, e);
                    self.close_connection(conn_id);
                }
            }
            Err(e) => {
                warn!("Dropping connection {} from {}: {}", conn_id, origin, e);
                self.close_connection(conn_id);
            }
        }
    }

    /// Closes one connection and removes whatever it registered
    fn close_connection(&mut self, conn_id: ConnectionId) {
        let Some(mut connection) = self.connections.remove(&conn_id) else {
            return;
        };
        connection.reader_task.abort();
        connection.session.disconnect(&mut self.registry);
        info!(
            "Connection {} from {} closed ({} players online)",
            conn_id,
            connection.session.origin(),
            self.registry.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::{decode_peers, encode_player_state};
    use shared::{BlockKind, PlayerState};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::oneshot;

    fn small_world() -> World {
        World::from_fn((2, 2), 4, |_| BlockKind::Terrain { height: 10 }).unwrap()
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_server_message_creation() {
        let msg = ServerMessage::FrameReceived {
            conn_id: 3,
            payload: vec![1, 2, 3],
        };

        match msg {
            ServerMessage::FrameReceived { conn_id, payload } => {
                assert_eq!(conn_id, 3);
                assert_eq!(payload, vec![1, 2, 3]);
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.duplicate_origin, DuplicateOriginPolicy::Reject);
        assert_eq!(config.outbound.compression_threshold, 1_048_576);
        assert_eq!(config.outbound.max_frame_len, shared::framing::DEFAULT_MAX_FRAME_LEN);
        assert_eq!(config.inbound.max_frame_len, 64 * 1024);
    }

    #[tokio::test]
    async fn test_bind_on_ephemeral_port() {
        let server = Server::bind(test_config(), &small_world(), &WorldCodec::new())
            .await
            .unwrap();

        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert!(server.registry().is_empty());
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_handshake_and_reply() {
        let codec = WorldCodec::new();
        let world = small_world();
        let mut server = Server::bind(test_config(), &world, &codec).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server_task = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = stop_rx.await;
                })
                .await
                .unwrap();
            server
        });

        let config = FrameConfig::default();
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let snapshot = receive_frame(&mut stream, &config).await.unwrap().unwrap();
        assert_eq!(codec.decode(&snapshot).unwrap(), world);

        let me = encode_player_state(&PlayerState::new("solo", (1.0, 1.0))).unwrap();
        send_frame(&mut stream, &me, &config).await.unwrap();
        send_frame(&mut stream, &me, &config).await.unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(5), receive_frame(&mut stream, &config))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(decode_peers(&reply).unwrap().is_empty());

        stop_tx.send(()).unwrap();
        let server = server_task.await.unwrap();
        assert!(server.registry().contains_name("solo"));
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_garbage_handshake_closes_connection() {
        let mut server = Server::bind(test_config(), &small_world(), &WorldCodec::new())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server_task = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = stop_rx.await;
                })
                .await
                .unwrap();
            server
        });

        let config = FrameConfig::default();
        let mut stream = TcpStream::connect(addr).await.unwrap();
        receive_frame(&mut stream, &config).await.unwrap().unwrap();
        send_frame(&mut stream, &[0xFF], &config).await.unwrap();

        let closed = tokio::time::timeout(Duration::from_secs(5), receive_frame(&mut stream, &config))
            .await
            .unwrap()
            .unwrap();
        assert!(closed.is_none());

        stop_tx.send(()).unwrap();
        let server = server_task.await.unwrap();
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_client_frame_closes_connection() {
        let config = ServerConfig {
            inbound: FrameConfig {
                max_frame_len: 1024,
                ..FrameConfig::default()
            },
            ..test_config()
        };
        let mut server = Server::bind(config, &small_world(), &WorldCodec::new())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server_task = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = stop_rx.await;
                })
                .await
                .unwrap();
            server
        });

        let config = FrameConfig::default();
        let mut stream = TcpStream::connect(addr).await.unwrap();
        receive_frame(&mut stream, &config).await.unwrap().unwrap();
        // Only the header matters; the server must not wait for the body
        stream.write_all(&[0, 0, 0x10, 0, 0]).await.unwrap();

        let closed = tokio::time::timeout(Duration::from_secs(5), receive_frame(&mut stream, &config))
            .await
            .unwrap();
        assert!(matches!(closed, Ok(None)) || closed.is_err());

        stop_tx.send(()).unwrap();
        let server = server_task.await.unwrap();
        assert!(server.registry().is_empty());
    }
}
