//! World generators that populate a fresh grid with typed blocks.

use crate::world::{BlockKind, BlockPos, CorruptWorldError, Rgb, World};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

pub trait WorldGenerator {
    fn generate(&self, chunks_count: (u32, u32), chunk_size: u32) -> Result<World, CorruptWorldError>;
}

/// Every block is a [`BlockKind::Plain`] of a random colour.
#[derive(Debug, Clone)]
pub struct RandomColorGenerator {
    pub seed: u64,
}

impl WorldGenerator for RandomColorGenerator {
    fn generate(&self, chunks_count: (u32, u32), chunk_size: u32) -> Result<World, CorruptWorldError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        World::from_fn(chunks_count, chunk_size, |_| BlockKind::Plain {
            color: Rgb(rng.gen(), rng.gen(), rng.gen()),
        })
    }
}

/// Smoothed value-noise height field mapped onto block kinds by threshold.
#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    pub seed: u64,
    /// Lattice spacing of the noise, in blocks.
    pub scale: u32,
}

const WATER_LEVEL: f32 = 0.30;
const SAND_LEVEL: f32 = 0.36;
const PEAK_LEVEL: f32 = 0.85;
const SHINING_CHANCE: f64 = 0.002;

impl NoiseGenerator {
    pub fn new(seed: u64) -> Self {
        Self { seed, scale: 16 }
    }

    fn classify(height: f32, rng: &mut StdRng) -> BlockKind {
        if height < WATER_LEVEL {
            let depth = (WATER_LEVEL - height) / WATER_LEVEL;
            BlockKind::Water {
                deepness: (depth * 4.0).min(3.0) as u8,
            }
        } else if height < SAND_LEVEL {
            BlockKind::Sand {
                deepness: ((SAND_LEVEL - height) * 100.0) as u8,
            }
        } else if height < PEAK_LEVEL {
            if rng.gen_bool(SHINING_CHANCE) {
                BlockKind::Shining {
                    glow: Rgb(255, 230, 120),
                }
            } else {
                BlockKind::Terrain {
                    height: (height * 255.0) as u8,
                }
            }
        } else {
            let shade = (160.0 + (height - PEAK_LEVEL) * 600.0).min(255.0) as u8;
            BlockKind::Plain {
                color: Rgb(shade, shade, shade),
            }
        }
    }
}

impl WorldGenerator for NoiseGenerator {
    fn generate(&self, chunks_count: (u32, u32), chunk_size: u32) -> Result<World, CorruptWorldError> {
        let started = Instant::now();
        World::check_dimensions(chunks_count, chunk_size)?;

        let invalid = || CorruptWorldError::InvalidDimensions {
            chunks_x: chunks_count.0,
            chunks_y: chunks_count.1,
            chunk_size,
        };
        let scale = self.scale.max(1);
        let width = chunks_count.0.checked_mul(chunk_size).ok_or_else(invalid)?;
        let height = chunks_count.1.checked_mul(chunk_size).ok_or_else(invalid)?;
        let lattice_width = (width / scale).checked_add(2).ok_or_else(invalid)?;
        let lattice_height = (height / scale).checked_add(2).ok_or_else(invalid)?;
        let lattice = ValueLattice::new(self.seed, lattice_width, lattice_height).ok_or_else(invalid)?;
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(1));

        let world = World::from_fn(chunks_count, chunk_size, |pos: BlockPos| {
            let x = pos.chunk_x * chunk_size + pos.local_x;
            let y = pos.chunk_y * chunk_size + pos.local_y;
            let h = lattice.sample(x as f32 / scale as f32, y as f32 / scale as f32);
            Self::classify(h, &mut rng)
        })?;

        info!(
            "Generated {}x{} chunk world from seed {} in {:?}",
            chunks_count.0,
            chunks_count.1,
            self.seed,
            started.elapsed()
        );
        Ok(world)
    }
}

struct ValueLattice {
    width: u32,
    values: Vec<f32>,
}

impl ValueLattice {
    /// `None` when the lattice has more points than a `u32` can index
    fn new(seed: u64, width: u32, height: u32) -> Option<Self> {
        let points = width.checked_mul(height)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let values = (0..points).map(|_| rng.gen::<f32>()).collect();
        Some(Self { width, values })
    }

    fn at(&self, x: u32, y: u32) -> f32 {
        self.values[(y * self.width + x) as usize]
    }

    fn sample(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let tx = smoothstep(x - x0 as f32);
        let ty = smoothstep(y - y0 as f32);

        let top = lerp(self.at(x0, y0), self.at(x0 + 1, y0), tx);
        let bottom = lerp(self.at(x0, y0 + 1), self.at(x0 + 1, y0 + 1), tx);
        lerp(top, bottom, ty)
    }
}

fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
