//! Chunked tile-grid world model.
//!
//! The world is a rectangle of `chunks_count.0 × chunks_count.1` chunks, each a
//! square of `chunk_size × chunk_size` blocks. Chunks are stored chunk_x-major,
//! blocks inside a chunk local_x-major, which is also the order the codec
//! writes them in.

use serde::{Deserialize, Serialize};

/// Edge length of one block in world units.
pub const BLOCK_SIZE_UNITS: f32 = 64.0;

pub const DEFAULT_CHUNK_SIZE: u32 = 32;

pub const WATER_SPEED_MULTIPLIER: f32 = 0.5;
pub const SAND_SPEED_MULTIPLIER: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub chunk_x: u32,
    pub chunk_y: u32,
    pub local_x: u32,
    pub local_y: u32,
}

impl BlockPos {
    pub fn new(chunk_x: u32, chunk_y: u32, local_x: u32, local_y: u32) -> Self {
        Self {
            chunk_x,
            chunk_y,
            local_x,
            local_y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Every kind of block the world can hold, tagged with a stable wire id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Void,
    Plain { color: Rgb },
    Water { deepness: u8 },
    Sand { deepness: u8 },
    Terrain { height: u8 },
    Shining { glow: Rgb },
}

impl BlockKind {
    pub const VOID: u8 = 0;
    pub const PLAIN: u8 = 1;
    pub const WATER: u8 = 2;
    pub const SAND: u8 = 3;
    pub const TERRAIN: u8 = 4;
    pub const SHINING: u8 = 5;

    pub fn type_id(&self) -> u8 {
        match self {
            BlockKind::Void => Self::VOID,
            BlockKind::Plain { .. } => Self::PLAIN,
            BlockKind::Water { .. } => Self::WATER,
            BlockKind::Sand { .. } => Self::SAND,
            BlockKind::Terrain { .. } => Self::TERRAIN,
            BlockKind::Shining { .. } => Self::SHINING,
        }
    }

    /// Kind-specific payload bytes as carried in the world blob.
    pub fn payload(&self) -> Vec<u8> {
        match *self {
            BlockKind::Void => Vec::new(),
            BlockKind::Plain { color: Rgb(r, g, b) } | BlockKind::Shining { glow: Rgb(r, g, b) } => {
                vec![r, g, b]
            }
            BlockKind::Water { deepness } | BlockKind::Sand { deepness } => vec![deepness],
            BlockKind::Terrain { height } => vec![height],
        }
    }

    /// Fraction of normal walking speed on this block, in `[0, 1]`.
    pub fn speed_multiplier(&self) -> f32 {
        match self {
            BlockKind::Water { .. } => WATER_SPEED_MULTIPLIER,
            BlockKind::Sand { .. } => SAND_SPEED_MULTIPLIER,
            _ => 1.0,
        }
    }

    pub fn decode_void(payload: &[u8]) -> Option<Self> {
        payload.is_empty().then_some(BlockKind::Void)
    }

    pub fn decode_plain(payload: &[u8]) -> Option<Self> {
        match *payload {
            [r, g, b] => Some(BlockKind::Plain { color: Rgb(r, g, b) }),
            _ => None,
        }
    }

    pub fn decode_water(payload: &[u8]) -> Option<Self> {
        match *payload {
            [deepness] => Some(BlockKind::Water { deepness }),
            _ => None,
        }
    }

    pub fn decode_sand(payload: &[u8]) -> Option<Self> {
        match *payload {
            [deepness] => Some(BlockKind::Sand { deepness }),
            _ => None,
        }
    }

    pub fn decode_terrain(payload: &[u8]) -> Option<Self> {
        match *payload {
            [height] => Some(BlockKind::Terrain { height }),
            _ => None,
        }
    }

    pub fn decode_shining(payload: &[u8]) -> Option<Self> {
        match *payload {
            [r, g, b] => Some(BlockKind::Shining { glow: Rgb(r, g, b) }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub position: BlockPos,
    pub kind: BlockKind,
}

impl Block {
    pub fn new(position: BlockPos, kind: BlockKind) -> Self {
        Self { position, kind }
    }

    pub fn type_id(&self) -> u8 {
        self.kind.type_id()
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.kind.speed_multiplier()
    }

    /// Top-left corner of the block in world units.
    pub fn world_origin(&self, chunk_size: u32) -> (f32, f32) {
        let size = chunk_size as f32;
        let x = self.position.chunk_x as f32 * size + self.position.local_x as f32;
        let y = self.position.chunk_y as f32 * size + self.position.local_y as f32;
        (x * BLOCK_SIZE_UNITS, y * BLOCK_SIZE_UNITS)
    }

    /// Area the block covers in world units.
    pub fn bounds(&self, chunk_size: u32) -> Rect {
        let (x, y) = self.world_origin(chunk_size);
        Rect::new(x, y, x + BLOCK_SIZE_UNITS, y + BLOCK_SIZE_UNITS)
    }
}

/// Axis-aligned rectangle in world units, `min` inclusive and `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Rect {
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Rectangle of the given size centred on `(x, y)`.
    pub fn centered(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x - width / 2.0, y - height / 2.0, x + width / 2.0, y + height / 2.0)
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.min_x && x < self.max_x && y >= self.min_y && y < self.max_y
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        !(self.min_x >= other.max_x
            || self.max_x <= other.min_x
            || self.max_y <= other.min_y
            || self.min_y >= other.max_y)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CorruptWorldError {
    #[error("invalid world dimensions: {chunks_x}x{chunks_y} chunks of size {chunk_size}")]
    InvalidDimensions {
        chunks_x: u32,
        chunks_y: u32,
        chunk_size: u32,
    },

    #[error("unsupported world format version {0}")]
    UnsupportedVersion(u16),

    #[error("block count mismatch: expected {expected}, found {found}")]
    BlockCountMismatch { expected: usize, found: usize },

    #[error("unknown block type {type_id} at {position:?}")]
    UnknownBlockType { type_id: u8, position: BlockPos },

    #[error("malformed payload for block type {type_id} at {position:?}")]
    InvalidPayload { type_id: u8, position: BlockPos },

    #[error("block stored at {expected:?} claims position {found:?}")]
    PositionMismatch { expected: BlockPos, found: BlockPos },

    #[error("malformed world blob: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    size: u32,
    blocks: Vec<Block>,
}

impl Chunk {
    /// Assembles a chunk, checking that every block sits in its own slot.
    pub fn from_blocks(
        chunk_x: u32,
        chunk_y: u32,
        size: u32,
        blocks: Vec<Block>,
    ) -> Result<Self, CorruptWorldError> {
        let expected = (size as usize) * (size as usize);
        if blocks.len() != expected {
            return Err(CorruptWorldError::BlockCountMismatch {
                expected,
                found: blocks.len(),
            });
        }
        for (index, block) in blocks.iter().enumerate() {
            let slot = slot_position(chunk_x, chunk_y, size, index);
            if block.position != slot {
                return Err(CorruptWorldError::PositionMismatch {
                    expected: slot,
                    found: block.position,
                });
            }
        }
        Ok(Self { size, blocks })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn block(&self, local_x: u32, local_y: u32) -> Option<&Block> {
        if local_x >= self.size || local_y >= self.size {
            return None;
        }
        self.blocks.get((local_x * self.size + local_y) as usize)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.blocks.iter()
    }
}

/// Position of the `index`-th block (local_x-major) inside chunk `(chunk_x, chunk_y)`.
pub fn slot_position(chunk_x: u32, chunk_y: u32, size: u32, index: usize) -> BlockPos {
    let index = index as u32;
    BlockPos::new(chunk_x, chunk_y, index / size, index % size)
}

#[derive(Debug, Clone, PartialEq)]
pub struct World {
    chunks_count: (u32, u32),
    chunk_size: u32,
    chunks: Vec<Chunk>,
}

impl World {
    /// Builds a world where every block kind is produced by `kind_at`.
    pub fn from_fn<F>(
        chunks_count: (u32, u32),
        chunk_size: u32,
        mut kind_at: F,
    ) -> Result<Self, CorruptWorldError>
    where
        F: FnMut(BlockPos) -> BlockKind,
    {
        Self::check_dimensions(chunks_count, chunk_size)?;
        let per_chunk = (chunk_size * chunk_size) as usize;
        let mut chunks = Vec::with_capacity((chunks_count.0 * chunks_count.1) as usize);
        for chunk_x in 0..chunks_count.0 {
            for chunk_y in 0..chunks_count.1 {
                let blocks = (0..per_chunk)
                    .map(|index| {
                        let position = slot_position(chunk_x, chunk_y, chunk_size, index);
                        Block::new(position, kind_at(position))
                    })
                    .collect();
                chunks.push(Chunk {
                    size: chunk_size,
                    blocks,
                });
            }
        }
        Ok(Self {
            chunks_count,
            chunk_size,
            chunks,
        })
    }

    /// A world filled with [`BlockKind::Void`].
    pub fn new(chunks_count: (u32, u32), chunk_size: u32) -> Result<Self, CorruptWorldError> {
        Self::from_fn(chunks_count, chunk_size, |_| BlockKind::Void)
    }

    /// Assembles a world from chunks given in chunk_x-major order.
    pub fn from_chunks(
        chunks_count: (u32, u32),
        chunk_size: u32,
        chunks: Vec<Chunk>,
    ) -> Result<Self, CorruptWorldError> {
        let expected = Self::check_dimensions(chunks_count, chunk_size)?;
        let found: usize = chunks.iter().map(|chunk| chunk.blocks.len()).sum();
        if chunks.len() != (chunks_count.0 as usize) * (chunks_count.1 as usize) || found != expected {
            return Err(CorruptWorldError::BlockCountMismatch { expected, found });
        }
        for (index, chunk) in chunks.iter().enumerate() {
            let chunk_x = index as u32 / chunks_count.1;
            let chunk_y = index as u32 % chunks_count.1;
            if chunk.size != chunk_size {
                return Err(CorruptWorldError::BlockCountMismatch {
                    expected: (chunk_size * chunk_size) as usize,
                    found: chunk.blocks.len(),
                });
            }
            if let Some(first) = chunk.blocks.first() {
                if first.position.chunk_x != chunk_x || first.position.chunk_y != chunk_y {
                    return Err(CorruptWorldError::PositionMismatch {
                        expected: BlockPos::new(chunk_x, chunk_y, 0, 0),
                        found: first.position,
                    });
                }
            }
        }
        Ok(Self {
            chunks_count,
            chunk_size,
            chunks,
        })
    }

    /// Validates dimensions and returns the total block count.
    pub fn check_dimensions(chunks_count: (u32, u32), chunk_size: u32) -> Result<usize, CorruptWorldError> {
        let invalid = || CorruptWorldError::InvalidDimensions {
            chunks_x: chunks_count.0,
            chunks_y: chunks_count.1,
            chunk_size,
        };
        if chunk_size == 0 {
            return Err(invalid());
        }
        let per_chunk = chunk_size.checked_mul(chunk_size).ok_or_else(invalid)?;
        let chunk_total = chunks_count.0.checked_mul(chunks_count.1).ok_or_else(invalid)?;
        (chunk_total as usize)
            .checked_mul(per_chunk as usize)
            .ok_or_else(invalid)
    }

    pub fn chunks_count(&self) -> (u32, u32) {
        self.chunks_count
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn block_count(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.blocks.len()).sum()
    }

    /// World size in world units along each axis.
    pub fn extent(&self) -> (f32, f32) {
        let span = self.chunk_size as f32 * BLOCK_SIZE_UNITS;
        (self.chunks_count.0 as f32 * span, self.chunks_count.1 as f32 * span)
    }

    pub fn chunk(&self, chunk_x: u32, chunk_y: u32) -> Option<&Chunk> {
        if chunk_x >= self.chunks_count.0 || chunk_y >= self.chunks_count.1 {
            return None;
        }
        self.chunks.get((chunk_x * self.chunks_count.1 + chunk_y) as usize)
    }

    pub fn block(&self, position: BlockPos) -> Option<&Block> {
        self.chunk(position.chunk_x, position.chunk_y)?
            .block(position.local_x, position.local_y)
    }

    /// Replaces the contents of one block. Topology never changes.
    pub fn set_kind(&mut self, position: BlockPos, kind: BlockKind) -> bool {
        if position.chunk_x >= self.chunks_count.0
            || position.chunk_y >= self.chunks_count.1
            || position.local_x >= self.chunk_size
            || position.local_y >= self.chunk_size
        {
            return false;
        }
        let chunk = &mut self.chunks[(position.chunk_x * self.chunks_count.1 + position.chunk_y) as usize];
        chunk.blocks[(position.local_x * self.chunk_size + position.local_y) as usize].kind = kind;
        true
    }

    /// All blocks in codec order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.chunks.iter().flat_map(|chunk| chunk.blocks.iter())
    }

    /// Resolves the block covering world position `(x, y)` in O(1).
    pub fn get_block_at(&self, x: f32, y: f32) -> Option<&Block> {
        let (width, height) = self.extent();
        if !(x >= 0.0 && y >= 0.0 && x < width && y < height) {
            return None;
        }
        let span = self.chunk_size as f32 * BLOCK_SIZE_UNITS;
        let chunk_x = (x / span).floor() as u32;
        let chunk_y = (y / span).floor() as u32;
        let local_x = ((x % span) / BLOCK_SIZE_UNITS).floor() as u32;
        let local_y = ((y % span) / BLOCK_SIZE_UNITS).floor() as u32;
        self.block(BlockPos::new(chunk_x, chunk_y, local_x, local_y))
    }

    /// Movement multiplier at `(x, y)`, `None` outside the world.
    pub fn speed_multiplier_at(&self, x: f32, y: f32) -> Option<f32> {
        self.get_block_at(x, y).map(Block::speed_multiplier)
    }

    /// Blocks of every chunk whose bounds overlap `rect`; other chunks are skipped whole.
    pub fn blocks_in_rect(&self, rect: Rect) -> impl Iterator<Item = &Block> + '_ {
        let span = self.chunk_size as f32 * BLOCK_SIZE_UNITS;
        let count_y = self.chunks_count.1;
        self.chunks
            .iter()
            .enumerate()
            .filter(move |(index, _)| {
                let chunk_x = (*index as u32 / count_y) as f32;
                let chunk_y = (*index as u32 % count_y) as f32;
                let bounds = Rect::new(
                    chunk_x * span,
                    chunk_y * span,
                    (chunk_x + 1.0) * span,
                    (chunk_y + 1.0) * span,
                );
                bounds.overlaps(&rect)
            })
            .flat_map(|(_, chunk)| chunk.blocks.iter())
    }
}
