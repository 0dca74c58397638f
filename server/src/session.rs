//! Per-connection session state machine
//!
//! `Connecting → AwaitingHandshake → Active → Disconnected`. The session only
//! decides what a frame means and what to send back; the dispatch loop owns
//! the sockets.

use crate::registry::{
    ConnectedUser, ConnectionId, ConnectionRegistry, DuplicateOriginPolicy, RegistryError,
};
use log::debug;
use shared::protocol::{decode_player_state, encode_peers, ProtocolError};
use std::fmt;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingHandshake,
    Active,
    Disconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::AwaitingHandshake => "awaiting handshake",
            SessionState::Active => "active",
            SessionState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("unexpected frame while {0}")]
    UnexpectedFrame(SessionState),
}

/// What the dispatch loop should do after a frame was handled.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Handshake accepted. `evicted` holds a registration this one replaced.
    Registered { evicted: Option<ConnectedUser> },
    /// Send these bytes back on the same connection.
    Reply(Vec<u8>),
}

#[derive(Debug)]
pub struct Session {
    conn_id: ConnectionId,
    origin: SocketAddr,
    state: SessionState,
}

impl Session {
    pub fn new(conn_id: ConnectionId, origin: SocketAddr) -> Self {
        Self {
            conn_id,
            origin,
            state: SessionState::Connecting,
        }
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    pub fn origin(&self) -> SocketAddr {
        self.origin
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The world snapshot went out; the next frame must be the handshake.
    pub fn snapshot_sent(&mut self) {
        if self.state == SessionState::Connecting {
            self.state = SessionState::AwaitingHandshake;
        }
    }

    pub fn handle_frame(
        &mut self,
        registry: &mut ConnectionRegistry,
        payload: &[u8],
        policy: DuplicateOriginPolicy,
    ) -> Result<SessionOutcome, SessionError> {
        match self.state {
            SessionState::AwaitingHandshake => {
                let player = decode_player_state(payload)?;
                let evicted = registry.register(self.origin, self.conn_id, player, policy)?;
                self.state = SessionState::Active;
                Ok(SessionOutcome::Registered { evicted })
            }
            SessionState::Active => {
                let player = decode_player_state(payload)?;
                debug!(
                    "Connection {} reports {:?} at ({:.1}, {:.1})",
                    self.conn_id, player.name, player.position.0, player.position.1
                );
                registry.update(self.origin, self.conn_id, player)?;
                let peers = registry.peers_of(self.conn_id);
                Ok(SessionOutcome::Reply(encode_peers(&peers)?))
            }
            state => Err(SessionError::UnexpectedFrame(state)),
        }
    }

    /// Tears the session down, removing the registration this connection owns.
    pub fn disconnect(&mut self, registry: &mut ConnectionRegistry) -> Option<ConnectedUser> {
        self.state = SessionState::Disconnected;
        registry.remove_connection(self.conn_id)
    }
}
