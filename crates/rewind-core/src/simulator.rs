//! Motion of the tracked entity.
//!
//! The entity travels at constant speed along the arena's x axis and turns
//! around at either boundary. Each turn picks a new z lane at random within
//! the arena; y stays at the configured height.
//!
//! Movement is driven by the real elapsed time handed to
//! [`MotionSimulator::tick`], not the nominal tick period, so scheduler
//! jitter changes how far the entity moves per tick but not its speed.
//! Overshoot past a boundary is clamped onto the boundary before the turn,
//! so no emitted position is ever outside the arena.

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rewind_types::{Coordinates, Position};
use tracing::trace;

use crate::clock::{ServerClock, wall_clock_ms};
use crate::config::{ArenaConfig, SimulationConfig};

/// Travel direction along the primary axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heading {
    /// Toward `max_x`.
    Forward,
    /// Toward `min_x`.
    Backward,
}

impl Heading {
    const fn sign(self) -> f64 {
        match self {
            Self::Forward => 1.0,
            Self::Backward => -1.0,
        }
    }

    const fn reversed(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }
}

/// Single-entity motion simulator.
#[derive(Debug)]
pub struct MotionSimulator {
    coordinates: Coordinates,
    heading: Heading,
    speed: f64,
    arena: ArenaConfig,
    rng: SmallRng,
    clock: ServerClock,
    reversals: u64,
}

impl MotionSimulator {
    /// Create a simulator at the arena's x midpoint on a random lane.
    ///
    /// Seeds from `config.seed` when set, otherwise from OS entropy.
    pub fn new(config: &SimulationConfig, clock: ServerClock) -> Self {
        let rng = config
            .seed
            .map_or_else(SmallRng::from_os_rng, SmallRng::seed_from_u64);
        Self::with_rng(config, clock, rng)
    }

    /// Create a simulator with an explicit random source.
    pub fn with_rng(config: &SimulationConfig, clock: ServerClock, mut rng: SmallRng) -> Self {
        let arena = config.arena.clone();
        let start_x = arena.min_x + (arena.max_x - arena.min_x) / 2.0;
        let start_z = random_lane(&arena, &mut rng);
        Self {
            coordinates: Coordinates::new(start_x, arena.height, start_z),
            heading: Heading::Forward,
            speed: config.speed,
            arena,
            rng,
            clock,
            reversals: 0,
        }
    }

    /// Advance by the real elapsed time and stamp the result.
    ///
    /// `server_time` comes from the shared [`ServerClock`]; `timestamp` is
    /// the server's wall clock.
    pub fn tick(&mut self, elapsed: Duration) -> Position {
        let coordinates = self.advance(elapsed);
        Position::new(coordinates, wall_clock_ms(), self.clock.now_ms())
    }

    /// Move the entity by `elapsed` worth of travel and return where it is.
    pub fn advance(&mut self, elapsed: Duration) -> Coordinates {
        let step = self.speed * elapsed.as_secs_f64();
        let next_x = self.heading.sign().mul_add(step, self.coordinates.x);

        if next_x >= self.arena.max_x {
            self.turn(self.arena.max_x);
        } else if next_x <= self.arena.min_x {
            self.turn(self.arena.min_x);
        } else {
            self.coordinates.x = next_x;
        }
        self.coordinates
    }

    fn turn(&mut self, boundary_x: f64) {
        self.coordinates.x = boundary_x;
        self.coordinates.z = random_lane(&self.arena, &mut self.rng);
        self.heading = self.heading.reversed();
        self.reversals = self.reversals.saturating_add(1);
        trace!(
            x = boundary_x,
            z = self.coordinates.z,
            heading = ?self.heading,
            "Target reversed"
        );
    }

    /// Current coordinates without advancing.
    pub const fn coordinates(&self) -> Coordinates {
        self.coordinates
    }

    /// Current heading.
    pub const fn heading(&self) -> Heading {
        self.heading
    }

    /// Number of boundary turns so far.
    pub const fn reversals(&self) -> u64 {
        self.reversals
    }
}

fn random_lane(arena: &ArenaConfig, rng: &mut SmallRng) -> f64 {
    if arena.min_z < arena.max_z {
        rng.random_range(arena.min_z..=arena.max_z)
    } else {
        arena.min_z
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn config(speed: f64) -> SimulationConfig {
        SimulationConfig {
            tick_interval_ms: 25,
            speed,
            seed: Some(42),
            arena: ArenaConfig {
                min_x: -10.0,
                max_x: 10.0,
                min_z: -5.0,
                max_z: 5.0,
                height: 1.0,
            },
        }
    }

    fn in_arena(c: Coordinates, arena: &ArenaConfig) -> bool {
        (arena.min_x..=arena.max_x).contains(&c.x)
            && (arena.min_z..=arena.max_z).contains(&c.z)
            && c.y == arena.height
    }

    #[test]
    fn starts_centered_on_a_valid_lane() {
        let cfg = config(8.0);
        let sim = MotionSimulator::new(&cfg, ServerClock::start());
        assert_eq!(sim.coordinates().x, 0.0);
        assert!(in_arena(sim.coordinates(), &cfg.arena));
        assert_eq!(sim.heading(), Heading::Forward);
    }

    #[test]
    fn moves_by_speed_times_real_elapsed() {
        let mut sim = MotionSimulator::new(&config(8.0), ServerClock::start());
        let lane = sim.coordinates().z;
        let c = sim.advance(Duration::from_millis(250));
        assert!((c.x - 2.0).abs() < 1e-9);
        // A late tick moves further, not the nominal distance.
        let c = sim.advance(Duration::from_millis(500));
        assert!((c.x - 6.0).abs() < 1e-9);
        assert_eq!(c.z, lane);
    }

    #[test]
    fn overshoot_is_clamped_then_reversed() {
        let cfg = config(8.0);
        let mut sim = MotionSimulator::new(&cfg, ServerClock::start());
        // 0 + 8 * 5s = 40, far past max_x = 10.
        let c = sim.advance(Duration::from_secs(5));
        assert_eq!(c.x, cfg.arena.max_x);
        assert_eq!(sim.heading(), Heading::Backward);
        assert_eq!(sim.reversals(), 1);
        assert!(in_arena(c, &cfg.arena));

        let c = sim.advance(Duration::from_millis(125));
        assert!((c.x - 9.0).abs() < 1e-9);
    }

    #[test]
    fn never_leaves_the_arena_under_jitter() {
        let cfg = config(37.0);
        let mut sim = MotionSimulator::new(&cfg, ServerClock::start());
        let mut jitter = SmallRng::seed_from_u64(9);
        for _ in 0..5_000 {
            let elapsed = Duration::from_millis(jitter.random_range(0..=400));
            let c = sim.advance(elapsed);
            assert!(in_arena(c, &cfg.arena), "escaped arena at {c:?}");
        }
        assert!(sim.reversals() > 0);
    }

    #[test]
    fn same_seed_same_path() {
        let cfg = config(15.0);
        let mut a = MotionSimulator::new(&cfg, ServerClock::start());
        let mut b = MotionSimulator::new(&cfg, ServerClock::start());
        for _ in 0..200 {
            let step = Duration::from_millis(25);
            assert_eq!(a.advance(step), b.advance(step));
        }
    }

    #[test]
    fn zero_speed_holds_position() {
        let mut sim = MotionSimulator::new(&config(0.0), ServerClock::start());
        let start = sim.coordinates();
        for _ in 0..10 {
            assert_eq!(sim.advance(Duration::from_millis(25)), start);
        }
    }

    #[test]
    fn degenerate_lane_range_is_fixed() {
        let mut cfg = config(100.0);
        cfg.arena.min_z = 3.0;
        cfg.arena.max_z = 3.0;
        let mut sim = MotionSimulator::new(&cfg, ServerClock::start());
        for _ in 0..20 {
            assert_eq!(sim.advance(Duration::from_millis(100)).z, 3.0);
        }
    }

    #[test]
    fn ticks_carry_non_decreasing_server_time() {
        let mut sim = MotionSimulator::new(&config(8.0), ServerClock::start());
        let mut last = i64::MIN;
        for _ in 0..50 {
            let pos = sim.tick(Duration::from_millis(25));
            assert!(pos.server_time >= last);
            assert!(pos.timestamp > 0);
            last = pos.server_time;
        }
    }
}
