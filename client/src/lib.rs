//! # Tile-World Client Library
//!
//! This library provides the client side of the shared tile world. It
//! downloads the world once, then walks a local player around it while a
//! background task keeps the server and the local peer list in sync.
//!
//! ## Architecture Overview
//!
//! Two scheduling domains share as little as possible:
//!
//! ### Render Loop
//! Runs at a fixed target rate. Each frame polls an [`input::InputSource`],
//! moves the local player over the read-only world mirror and hands the result
//! to a [`rendering::Renderer`].
//!
//! ### Network Task
//! Owns the socket. Every sync interval it copies the local player state,
//! sends it, waits for the peer list and publishes it as a fresh immutable
//! snapshot. The render loop reads the latest snapshot without locking.
//!
//! ### Shared State
//! The local player sits behind a mutex held only for short copy-or-mutate
//! sections ([`network::SharedPlayer`]). The peer list travels through a watch
//! channel and is always replaced whole.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! - Connection, world download and handshake
//! - The `Connecting → HandshakeSent → Syncing` session
//! - The background sync task and its handle
//!
//! ### Game Module (`game`)
//! - Movement with per-block speed multipliers
//! - Frame pacing
//!
//! ### Input Module (`input`)
//! - Per-frame movement intent and the sources producing it
//!
//! ### Rendering Module (`rendering`)
//! - Viewport culling through `World::blocks_in_rect`
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::ClientGameState;
//! use client::network::{ClientSession, SharedPlayer};
//! use shared::{FrameConfig, PlayerState, WorldCodec};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let player = SharedPlayer::new(PlayerState::new("alice", (0.0, 0.0)));
//!     let (session, world) =
//!         ClientSession::connect("127.0.0.1:8080", player.clone(), &WorldCodec::new(), FrameConfig::default())
//!             .await?;
//!
//!     let _game = ClientGameState::new(world, player);
//!     let network = session.spawn(Duration::from_millis(50));
//!
//!     // ... render frames, reading network.peers() each time
//!     network.shutdown();
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
