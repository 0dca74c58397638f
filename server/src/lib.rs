//! # Tile-World Server Library
//!
//! This library provides the authoritative server for the shared tile world.
//! It owns the world grid, hands a snapshot of it to every newcomer and then
//! keeps the connected players informed about each other.
//!
//! ## Core Responsibilities
//!
//! ### World Distribution
//! The world is encoded and framed once at startup. Every accepted connection
//! receives that cached frame before anything else happens on it.
//!
//! ### Session Handling
//! Each connection walks through `Connecting → AwaitingHandshake → Active →
//! Disconnected`:
//! - The first frame after the snapshot is the player's handshake
//! - Every later frame is a state update answered with the peer list
//! - End of stream or any protocol error tears the session down
//!
//! ### Player Registry
//! Registered players are keyed by network origin. Names are unique, updates
//! are matched by connection identity, and a second handshake from a known
//! origin is either rejected or replaces the old registration, depending on
//! [`registry::DuplicateOriginPolicy`].
//!
//! ## Architecture Design
//!
//! ### Single Dispatch Loop
//! One task owns the registry and all sessions. Per-connection reader tasks
//! decode frames and forward them over a bounded channel, so registry mutation
//! never needs a lock. A reader stops reading its socket while the channel is
//! full. Client frames are capped far below the snapshot size. Replies are
//! written from the loop itself, one frame at a time.
//!
//! ### Background Ticker
//! [`game::WorldTicker`] runs beside the loop as an extension point for world
//! simulation. It does not touch the registry.
//!
//! ## Module Organization
//!
//! - `registry`: connected players and duplicate handling
//! - `session`: per-connection state machine
//! - `network`: listener, reader tasks and the dispatch loop
//! - `game`: background world tick
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//! use shared::generation::{NoiseGenerator, WorldGenerator};
//! use shared::WorldCodec;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let world = NoiseGenerator::new(42).generate((32, 32), 32)?;
//!     let mut server = Server::bind(ServerConfig::default(), &world, &WorldCodec::new()).await?;
//!
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;
pub mod registry;
pub mod session;
