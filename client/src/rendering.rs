use log::info;
use shared::{BlockKind, PlayerState, Rect, World};

/// Consumer of one frame's worth of world and player state
pub trait Renderer {
    fn render(&mut self, world: &World, local: &PlayerState, peers: &[PlayerState]);
}

/// What the last rendered frame contained
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    /// Blocks of every chunk touching the viewport
    pub visible_blocks: usize,
    /// Blocks whose own tile intersects the viewport
    pub drawn_blocks: usize,
    pub visible_water: usize,
    pub visible_peers: usize,
    pub speed_multiplier: f32,
}

/// Headless renderer: culls the viewport like a real one and logs a summary
pub struct LogRenderer {
    width: f32,
    height: f32,
    log_every: u64,
    frames: u64,
    last: FrameStats,
}

impl LogRenderer {
    pub fn new(width: f32, height: f32, log_every: u64) -> Self {
        Self {
            width,
            height,
            log_every: log_every.max(1),
            frames: 0,
            last: FrameStats::default(),
        }
    }

    /// Camera rectangle centred on the local player
    pub fn viewport(&self, local: &PlayerState) -> Rect {
        Rect::centered(local.position.0, local.position.1, self.width, self.height)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_stats(&self) -> FrameStats {
        self.last
    }
}

impl Renderer for LogRenderer {
    fn render(&mut self, world: &World, local: &PlayerState, peers: &[PlayerState]) {
        let view = self.viewport(local);

        let mut stats = FrameStats {
            speed_multiplier: world
                .speed_multiplier_at(local.position.0, local.position.1)
                .unwrap_or(1.0),
            ..FrameStats::default()
        };
        let chunk_size = world.chunk_size();
        for block in world.blocks_in_rect(view) {
            stats.visible_blocks += 1;
            if !block.bounds(chunk_size).overlaps(&view) {
                continue;
            }
            stats.drawn_blocks += 1;
            if matches!(block.kind, BlockKind::Water { .. }) {
                stats.visible_water += 1;
            }
        }
        stats.visible_peers = peers
            .iter()
            .filter(|peer| view.contains(peer.position.0, peer.position.1))
            .count();

        self.frames += 1;
        self.last = stats;

        if self.frames % self.log_every == 0 {
            info!(
                "Frame {}: {} at ({:.0}, {:.0}) x{:.2}, {}/{} blocks drawn ({} water), {}/{} peers on screen",
                self.frames,
                local.name,
                local.position.0,
                local.position.1,
                stats.speed_multiplier,
                stats.drawn_blocks,
                stats.visible_blocks,
                stats.visible_water,
                stats.visible_peers,
                peers.len()
            );
        }
    }
}
