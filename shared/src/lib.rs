//! Types and codecs shared by the tile-world server and client: the wire
//! framing, the chunked world grid, its binary snapshot codec and the player
//! state payloads exchanged every tick.

use serde::{Deserialize, Serialize};

pub mod codec;
pub mod framing;
pub mod generation;
pub mod protocol;
pub mod world;

pub use codec::{BlockRegistry, WorldCodec, WorldCodecError};
pub use framing::{receive_frame, send_frame, Frame, FrameConfig, FramingError};
pub use world::{Block, BlockKind, BlockPos, CorruptWorldError, Rect, World, BLOCK_SIZE_UNITS};

/// Walking speed on solid ground, in world units per second.
pub const PLAYER_SPEED: f32 = 300.0;

/// A player's identity and position. The name doubles as the unique player id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerState {
    pub name: String,
    pub position: (f32, f32),
}

impl PlayerState {
    pub fn new(name: impl Into<String>, position: (f32, f32)) -> Self {
        Self {
            name: name.into(),
            position,
        }
    }
}
