//! Movement input: the per-frame intent and the sources that produce it

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Desired movement direction for one frame; `(0, 0)` means standing still
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub dx: f32,
    pub dy: f32,
}

impl InputState {
    pub fn new(dx: f32, dy: f32) -> Self {
        Self { dx, dy }
    }

    /// Unit-length direction, or `None` when idle
    pub fn direction(&self) -> Option<(f32, f32)> {
        let len = (self.dx * self.dx + self.dy * self.dy).sqrt();
        if len == 0.0 || !len.is_finite() {
            return None;
        }
        Some((self.dx / len, self.dy / len))
    }
}

/// Anything that can be polled once per frame for movement input
pub trait InputSource {
    fn poll(&mut self) -> InputState;
}

const DIRECTIONS: [(f32, f32); 9] = [
    (0.0, 0.0),
    (1.0, 0.0),
    (-1.0, 0.0),
    (0.0, 1.0),
    (0.0, -1.0),
    (1.0, 1.0),
    (1.0, -1.0),
    (-1.0, 1.0),
    (-1.0, -1.0),
];

/// Headless input that wanders in a random direction for a random number of frames
pub struct WanderInput {
    rng: StdRng,
    current: InputState,
    frames_left: u32,
}

impl WanderInput {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            current: InputState::default(),
            frames_left: 0,
        }
    }
}

impl InputSource for WanderInput {
    fn poll(&mut self) -> InputState {
        if self.frames_left == 0 {
            let (dx, dy) = DIRECTIONS[self.rng.gen_range(0..DIRECTIONS.len())];
            self.current = InputState::new(dx, dy);
            self.frames_left = self.rng.gen_range(15..90);
        }
        self.frames_left -= 1;
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_idle_input() {
        let input = InputState::default();
        assert!(input.direction().is_none());
        assert!(InputState::new(f32::NAN, 0.0).direction().is_none());
    }

    #[test]
    fn test_diagonal_direction_is_normalised() {
        let (x, y) = InputState::new(1.0, -1.0).direction().unwrap();
        assert_approx_eq!(x, std::f32::consts::FRAC_1_SQRT_2);
        assert_approx_eq!(y, -std::f32::consts::FRAC_1_SQRT_2);
    }

    #[test]
    fn test_wander_is_deterministic_per_seed() {
        let mut a = WanderInput::new(9);
        let mut b = WanderInput::new(9);
        for _ in 0..200 {
            assert_eq!(a.poll(), b.poll());
        }
    }

    #[test]
    fn test_wander_holds_direction_for_a_while() {
        let mut input = WanderInput::new(1);
        let first = input.poll();
        for _ in 0..13 {
            assert_eq!(input.poll(), first);
        }
    }
}
