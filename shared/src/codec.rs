//! Binary world snapshot codec.
//!
//! A snapshot is a bincode envelope holding the world dimensions and one
//! `(type_id, position, payload)` record per block, in chunk_x, chunk_y,
//! local_x, local_y order. Decoding rebuilds every chunk as an independent
//! task on a bounded rayon pool and only hands the world out once all tasks
//! have joined; the first failing chunk aborts the whole decode.

use crate::world::{slot_position, Block, BlockKind, BlockPos, Chunk, CorruptWorldError, World};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

pub const FORMAT_VERSION: u16 = 1;

/// One encoded block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub type_id: u8,
    pub position: BlockPos,
    pub payload: Vec<u8>,
}

impl From<&Block> for BlockRecord {
    fn from(block: &Block) -> Self {
        Self {
            type_id: block.type_id(),
            position: block.position,
            payload: block.kind.payload(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WorldBlob {
    version: u16,
    chunks_count: (u32, u32),
    chunk_size: u32,
    blocks: Vec<BlockRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum WorldCodecError {
    #[error("corrupt world: {0}")]
    Corrupt(#[from] CorruptWorldError),

    #[error("reconstruction of chunk ({chunk_x}, {chunk_y}) failed")]
    DecodeTaskFailure { chunk_x: u32, chunk_y: u32 },

    #[error("failed to encode world: {0}")]
    Encode(#[from] bincode::Error),

    #[error("failed to start decode workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Rebuilds a block kind from its payload; `None` marks a malformed payload.
pub type BlockDecoder = fn(&[u8]) -> Option<BlockKind>;

/// Tag → decoder table consulted for every record during decode.
#[derive(Debug, Clone)]
pub struct BlockRegistry {
    decoders: HashMap<u8, BlockDecoder>,
}

impl BlockRegistry {
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Installs `decoder` for `type_id`, returning the decoder it replaced.
    pub fn register(&mut self, type_id: u8, decoder: BlockDecoder) -> Option<BlockDecoder> {
        self.decoders.insert(type_id, decoder)
    }

    pub fn contains(&self, type_id: u8) -> bool {
        self.decoders.contains_key(&type_id)
    }

    /// Decodes `record`, which must belong in slot `expected`.
    pub fn decode(&self, record: &BlockRecord, expected: BlockPos) -> Result<Block, CorruptWorldError> {
        if record.position != expected {
            return Err(CorruptWorldError::PositionMismatch {
                expected,
                found: record.position,
            });
        }
        let decoder = self
            .decoders
            .get(&record.type_id)
            .ok_or(CorruptWorldError::UnknownBlockType {
                type_id: record.type_id,
                position: expected,
            })?;
        let kind = decoder(&record.payload).ok_or(CorruptWorldError::InvalidPayload {
            type_id: record.type_id,
            position: expected,
        })?;
        Ok(Block::new(expected, kind))
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(BlockKind::VOID, BlockKind::decode_void);
        registry.register(BlockKind::PLAIN, BlockKind::decode_plain);
        registry.register(BlockKind::WATER, BlockKind::decode_water);
        registry.register(BlockKind::SAND, BlockKind::decode_sand);
        registry.register(BlockKind::TERRAIN, BlockKind::decode_terrain);
        registry.register(BlockKind::SHINING, BlockKind::decode_shining);
        registry
    }
}

#[derive(Debug, Clone)]
pub struct WorldCodec {
    registry: BlockRegistry,
    workers: NonZeroUsize,
}

impl WorldCodec {
    /// Codec with the default registry and one worker per available core.
    pub fn new() -> Self {
        let workers = std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
        Self::with_registry(BlockRegistry::default(), workers)
    }

    pub fn with_registry(registry: BlockRegistry, workers: NonZeroUsize) -> Self {
        Self { registry, workers }
    }

    pub fn workers(&self) -> usize {
        self.workers.get()
    }

    pub fn encode(&self, world: &World) -> Result<Vec<u8>, WorldCodecError> {
        let blob = WorldBlob {
            version: FORMAT_VERSION,
            chunks_count: world.chunks_count(),
            chunk_size: world.chunk_size(),
            blocks: world.blocks().map(BlockRecord::from).collect(),
        };
        let bytes = bincode::serialize(&blob)?;
        debug!("Encoded {} blocks into {} bytes", blob.blocks.len(), bytes.len());
        Ok(bytes)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<World, WorldCodecError> {
        let started = Instant::now();
        let blob: WorldBlob = bincode::deserialize(bytes)
            .map_err(|e| CorruptWorldError::Malformed(e.to_string()))?;

        if blob.version != FORMAT_VERSION {
            return Err(CorruptWorldError::UnsupportedVersion(blob.version).into());
        }
        let (chunks_x, chunks_y) = blob.chunks_count;
        let expected = World::check_dimensions(blob.chunks_count, blob.chunk_size)?;
        if blob.blocks.len() != expected {
            return Err(CorruptWorldError::BlockCountMismatch {
                expected,
                found: blob.blocks.len(),
            }
            .into());
        }

        let per_chunk = (blob.chunk_size * blob.chunk_size) as usize;
        let chunk_total = (chunks_x as usize) * (chunks_y as usize);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.get())
            .thread_name(|i| format!("world-decode-{i}"))
            .build()?;

        let chunks = pool.install(|| {
            (0..chunk_total)
                .into_par_iter()
                .map(|index| {
                    let chunk_x = (index / chunks_y as usize) as u32;
                    let chunk_y = (index % chunks_y as usize) as u32;
                    let records = &blob.blocks[index * per_chunk..(index + 1) * per_chunk];
                    panic::catch_unwind(AssertUnwindSafe(|| {
                        self.rebuild_chunk(chunk_x, chunk_y, blob.chunk_size, records)
                    }))
                    .map_err(|_| WorldCodecError::DecodeTaskFailure { chunk_x, chunk_y })?
                    .map_err(WorldCodecError::from)
                })
                .collect::<Result<Vec<Chunk>, WorldCodecError>>()
        })?;

        let world = World::from_chunks(blob.chunks_count, blob.chunk_size, chunks)?;
        info!(
            "Decoded {}x{} chunk world ({} blocks) on {} workers in {:?}",
            chunks_x,
            chunks_y,
            world.block_count(),
            self.workers,
            started.elapsed()
        );
        Ok(world)
    }

    fn rebuild_chunk(
        &self,
        chunk_x: u32,
        chunk_y: u32,
        size: u32,
        records: &[BlockRecord],
    ) -> Result<Chunk, CorruptWorldError> {
        let blocks = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                self.registry
                    .decode(record, slot_position(chunk_x, chunk_y, size, index))
            })
            .collect::<Result<Vec<Block>, _>>()?;
        Chunk::from_blocks(chunk_x, chunk_y, size, blocks)
    }
}

impl Default for WorldCodec {
    fn default() -> Self {
        Self::new()
    }
}
