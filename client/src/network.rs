//! Client side of the session: world download, handshake and the periodic
//! state/peer-list exchange

use log::{debug, error, info};
use shared::framing::{receive_frame, send_frame, FrameConfig, FramingError};
use shared::protocol::{decode_peers, encode_player_state, ProtocolError};
use shared::{PlayerState, World, WorldCodec, WorldCodecError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error("failed to decode world: {0}")]
    World(#[from] WorldCodecError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("world decode task did not finish: {0}")]
    DecodeTask(#[from] tokio::task::JoinError),

    #[error("server closed the connection")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    HandshakeSent,
    Syncing,
    Closed,
}

/// Peer list as last reported by the server, replaced wholesale on each reply
pub type PeerSnapshot = Arc<Vec<PlayerState>>;

/// The local player, shared between the render loop and the network task
#[derive(Debug, Clone)]
pub struct SharedPlayer(Arc<Mutex<PlayerState>>);

impl SharedPlayer {
    pub fn new(player: PlayerState) -> Self {
        Self(Arc::new(Mutex::new(player)))
    }

    /// Copy of the current state, taken under the lock
    pub fn snapshot(&self) -> PlayerState {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Runs `f` with the state locked; keep it short
    pub fn update<R>(&self, f: impl FnOnce(&mut PlayerState) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

pub struct ClientSession {
    stream: TcpStream,
    state: ClientState,
    player: SharedPlayer,
    frame: FrameConfig,
    peers_tx: watch::Sender<PeerSnapshot>,
    rounds: u64,
}

impl ClientSession {
    /// Connects, installs the world snapshot and sends the handshake
    ///
    /// The world is decoded on a blocking thread so the runtime keeps serving
    /// other tasks while the chunk fan-out runs.
    pub async fn connect(
        addr: &str,
        player: SharedPlayer,
        codec: &WorldCodec,
        frame: FrameConfig,
    ) -> Result<(Self, World), ClientError> {
        info!("Connecting to {}...", addr);
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        let (peers_tx, _) = watch::channel(PeerSnapshot::default());
        let mut session = ClientSession {
            stream,
            state: ClientState::Connecting,
            player,
            frame,
            peers_tx,
            rounds: 0,
        };

        let started = Instant::now();
        let snapshot = receive_frame(&mut session.stream, &session.frame)
            .await?
            .ok_or(ClientError::Closed)?;
        debug!("Received {} byte world snapshot", snapshot.len());

        let codec = codec.clone();
        let world = tokio::task::spawn_blocking(move || codec.decode(&snapshot)).await??;
        info!(
            "World installed: {}x{} chunks in {:?}",
            world.chunks_count().0,
            world.chunks_count().1,
            started.elapsed()
        );

        let handshake = encode_player_state(&session.player.snapshot())?;
        send_frame(&mut session.stream, &handshake, &session.frame).await?;
        session.state = ClientState::HandshakeSent;

        Ok((session, world))
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn subscribe(&self) -> watch::Receiver<PeerSnapshot> {
        self.peers_tx.subscribe()
    }

    /// One round trip: send the local state, store the returned peer list.
    /// Any failure leaves the session `Closed`.
    pub async fn sync_once(&mut self) -> Result<PeerSnapshot, ClientError> {
        match self.round_trip().await {
            Ok(peers) => {
                self.peers_tx.send_replace(Arc::clone(&peers));
                self.state = ClientState::Syncing;
                self.rounds += 1;
                Ok(peers)
            }
            Err(e) => {
                self.state = ClientState::Closed;
                Err(e)
            }
        }
    }

    async fn round_trip(&mut self) -> Result<PeerSnapshot, ClientError> {
        let local = self.player.snapshot();
        let payload = encode_player_state(&local)?;
        send_frame(&mut self.stream, &payload, &self.frame).await?;

        let Some(reply) = receive_frame(&mut self.stream, &self.frame).await? else {
            return Err(ClientError::Closed);
        };
        Ok(Arc::new(decode_peers(&reply)?))
    }

    /// Moves the session onto its own task, syncing every `sync_interval`
    pub fn spawn(mut self, sync_interval: Duration) -> NetworkHandle {
        let peers = self.subscribe();

        let task = tokio::spawn(async move {
            let mut sync_ticker = interval(sync_interval);
            sync_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                sync_ticker.tick().await;
                match self.sync_once().await {
                    Ok(_) => {}
                    Err(ClientError::Closed) => {
                        info!("Server closed the connection after {} rounds", self.rounds);
                        break;
                    }
                    Err(e) => {
                        error!("Sync failed: {}", e);
                        break;
                    }
                }
            }
        });

        NetworkHandle { peers, task }
    }
}

/// Render-side view of the network task
pub struct NetworkHandle {
    peers: watch::Receiver<PeerSnapshot>,
    task: JoinHandle<()>,
}

impl NetworkHandle {
    /// Latest peer snapshot; never blocks on the network task
    pub fn peers(&self) -> PeerSnapshot {
        Arc::clone(&self.peers.borrow())
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops syncing; dropping the task closes the socket
    pub fn shutdown(self) {
        self.task.abort();
    }
}
