use crate::input::InputState;
use crate::network::SharedPlayer;
use log::debug;
use shared::{World, PLAYER_SPEED};
use std::time::{Duration, Instant};

/// Local simulation over the installed world mirror
pub struct ClientGameState {
    world: World,
    player: SharedPlayer,
    pub frame: u64,
}

impl ClientGameState {
    pub fn new(world: World, player: SharedPlayer) -> Self {
        Self {
            world,
            player,
            frame: 0,
        }
    }

    /// Centre of the world, where new players start
    pub fn spawn_position(world: &World) -> (f32, f32) {
        let (width, height) = world.extent();
        (width / 2.0, height / 2.0)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn player(&self) -> &SharedPlayer {
        &self.player
    }

    /// Moves the local player for one frame
    ///
    /// Distance is `PLAYER_SPEED * dt` scaled by the block under the player.
    /// A step that would leave the world is dropped. Returns whether the
    /// player moved.
    pub fn apply_input(&mut self, input: InputState, dt: f32) -> bool {
        self.frame += 1;
        let Some((dir_x, dir_y)) = input.direction() else {
            return false;
        };

        let world = &self.world;
        self.player.update(|player| {
            let (x, y) = player.position;
            let multiplier = world.speed_multiplier_at(x, y).unwrap_or(1.0);
            let step = PLAYER_SPEED * dt * multiplier;
            let next = (x + dir_x * step, y + dir_y * step);

            if world.get_block_at(next.0, next.1).is_none() {
                debug!("Blocked move to ({:.1}, {:.1})", next.0, next.1);
                return false;
            }
            player.position = next;
            true
        })
    }
}

/// Fixed-rate frame timing
pub struct FramePacer {
    budget: Duration,
    frame_started: Instant,
}

impl FramePacer {
    pub fn new(target_fps: u32) -> Self {
        Self {
            budget: Duration::from_nanos(1_000_000_000 / u64::from(target_fps.max(1))),
            frame_started: Instant::now(),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Remaining time in the frame budget; zero once the frame overran
    pub fn delay_after(&self, elapsed: Duration) -> Duration {
        self.budget.saturating_sub(elapsed)
    }

    /// Sleeps out the rest of the frame and returns the full frame time in seconds
    pub async fn wait(&mut self) -> f32 {
        let delay = self.delay_after(self.frame_started.elapsed());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let now = Instant::now();
        let dt = now.duration_since(self.frame_started);
        self.frame_started = now;
        dt.as_secs_f32()
    }
}
