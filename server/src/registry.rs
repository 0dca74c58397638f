//! Registry of connected players for the tile-world server
//!
//! This module tracks every connection that completed its handshake:
//! - Registration keyed by network origin, with a configurable duplicate policy
//! - Player name uniqueness across all origins
//! - In-place state updates matched by connection identity
//! - Peer snapshots for the steady-state reply
//!
//! The registry is owned by the dispatch loop and mutated only from there, so
//! it carries no internal locking.

use clap::ValueEnum;
use log::info;
use shared::PlayerState;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

/// Server-assigned identity of one accepted TCP connection
pub type ConnectionId = u64;

/// What to do when a handshake arrives from an origin that is already registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DuplicateOriginPolicy {
    /// Refuse the newcomer and keep the existing registration
    #[default]
    Reject,
    /// Evict the existing registration in favour of the newcomer
    Replace,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("origin {0} is already registered")]
    DuplicateOrigin(SocketAddr),

    #[error("player name {0:?} is already in use")]
    DuplicateName(String),

    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    #[error("connection registered as {registered:?} sent state for {received:?}")]
    NameMismatch { registered: String, received: String },
}

/// A player that completed its handshake
#[derive(Debug, Clone)]
pub struct ConnectedUser {
    /// Remote address the connection was accepted from
    pub origin: SocketAddr,
    /// Connection that owns this registration
    pub conn_id: ConnectionId,
    /// Most recent state reported by the player
    pub player: PlayerState,
    /// When the handshake completed
    pub connected_at: Instant,
}

/// Live users indexed by network origin
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    users: HashMap<SocketAddr, ConnectedUser>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly handshaken connection
    ///
    /// Returns the user that was evicted under [`DuplicateOriginPolicy::Replace`],
    /// so the caller can close its connection. Names must be unique across
    /// origins regardless of policy.
    pub fn register(
        &mut self,
        origin: SocketAddr,
        conn_id: ConnectionId,
        player: PlayerState,
        policy: DuplicateOriginPolicy,
    ) -> Result<Option<ConnectedUser>, RegistryError> {
        if self.users.contains_key(&origin) && policy == DuplicateOriginPolicy::Reject {
            return Err(RegistryError::DuplicateOrigin(origin));
        }

        let name_taken = self
            .users
            .values()
            .any(|user| user.origin != origin && user.player.name == player.name);
        if name_taken {
            return Err(RegistryError::DuplicateName(player.name));
        }

        info!(
            "Player {:?} joined from {} (connection {})",
            player.name, origin, conn_id
        );
        let evicted = self.users.insert(
            origin,
            ConnectedUser {
                origin,
                conn_id,
                player,
                connected_at: Instant::now(),
            },
        );
        if let Some(old) = &evicted {
            info!(
                "Replaced connection {} from {} (player {:?})",
                old.conn_id, origin, old.player.name
            );
        }
        Ok(evicted)
    }

    /// Replaces the stored state of the user owned by `conn_id`
    ///
    /// The update is matched by connection identity; a state carrying a
    /// different name than the one registered is refused.
    pub fn update(
        &mut self,
        origin: SocketAddr,
        conn_id: ConnectionId,
        player: PlayerState,
    ) -> Result<(), RegistryError> {
        let user = self
            .users
            .get_mut(&origin)
            .filter(|user| user.conn_id == conn_id)
            .ok_or(RegistryError::UnknownConnection(conn_id))?;

        if user.player.name != player.name {
            return Err(RegistryError::NameMismatch {
                registered: user.player.name.clone(),
                received: player.name,
            });
        }

        user.player = player;
        Ok(())
    }

    /// Every registered player except the one owned by `conn_id`
    ///
    /// Order follows registry iteration order and is not stable across calls.
    pub fn peers_of(&self, conn_id: ConnectionId) -> Vec<PlayerState> {
        self.users
            .values()
            .filter(|user| user.conn_id != conn_id)
            .map(|user| user.player.clone())
            .collect()
    }

    /// Removes the registration owned by `conn_id`, if any
    ///
    /// A connection that was replaced or never registered removes nothing,
    /// so a late disconnect never evicts someone else.
    pub fn remove_connection(&mut self, conn_id: ConnectionId) -> Option<ConnectedUser> {
        let origin = self
            .users
            .values()
            .find(|user| user.conn_id == conn_id)
            .map(|user| user.origin)?;
        let removed = self.users.remove(&origin);
        if let Some(user) = &removed {
            info!(
                "Player {:?} left (connection {}, {:.1}s online)",
                user.player.name,
                conn_id,
                user.connected_at.elapsed().as_secs_f32()
            );
        }
        removed
    }

    pub fn get(&self, origin: &SocketAddr) -> Option<&ConnectedUser> {
        self.users.get(origin)
    }

    pub fn contains_origin(&self, origin: &SocketAddr) -> bool {
        self.users.contains_key(origin)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.users.values().any(|user| user.player.name == name)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerState> + '_ {
        self.users.values().map(|user| &user.player)
    }

    /// Returns the number of registered players
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns true if no players are registered
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
