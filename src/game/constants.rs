/// Arena geometry. The client draws in pixels; the simulation runs in metres.
pub mod arena {
    /// Pixels per world unit
    pub const WORLD_SCALE: f32 = 30.0;
    /// Arena width in pixels
    pub const WIDTH_PX: f32 = 1024.0;
    /// Arena height in pixels
    pub const HEIGHT_PX: f32 = 768.0;
    /// Arena width in world units
    pub const WIDTH: f32 = WIDTH_PX / WORLD_SCALE;
    /// Arena height in world units
    pub const HEIGHT: f32 = HEIGHT_PX / WORLD_SCALE;
    /// Number of player slots
    pub const MAX_PLAYERS: usize = 4;
}

/// Simulation timing
pub mod tick {
    /// Server tick rate in Hz
    pub const TICK_RATE: u32 = 60;
    /// Fixed physics timestep in seconds
    pub const DT: f32 = 1.0 / 60.0;
    /// Constraint solver iterations handed to the physics step
    pub const VELOCITY_ITERATIONS: u32 = 10;
    pub const POSITION_ITERATIONS: u32 = 10;
    /// Every Nth tick drains health from each fish
    pub const DRAIN_INTERVAL_TICKS: u64 = 60;
}

/// Player-controlled fish
pub mod fish {
    pub const MAX_HEALTH: i32 = 1000;
    pub const MIN_HEALTH: i32 = 0;
    pub const START_HEALTH: i32 = MAX_HEALTH;
    pub const MIN_SPEED: i32 = 1;
    pub const MAX_SPEED: i32 = 100;
    pub const START_SPEED: i32 = 10;
    /// 60 px sprite
    pub const RADIUS: f32 = 60.0 / super::arena::WORLD_SCALE / 2.0;
    pub const DENSITY: f32 = 1.0;
    pub const RESTITUTION: f32 = 0.5;
    pub const LINEAR_DAMPING: f32 = 1.0;
    /// Spawn margin from each edge
    pub const SPAWN_MARGIN: f32 = 60.0 / super::arena::WORLD_SCALE;
    /// Rotation applied per tick while A or D is held (radians)
    pub const TURN_STEP: f32 = 0.05;
    /// Health lost every drain interval
    pub const PASSIVE_DRAIN: i32 = 5;
}

/// Frog NPC
pub mod frog {
    pub const RADIUS: f32 = 38.0 / super::arena::WORLD_SCALE / 2.0;
    pub const DENSITY: f32 = 1.0;
    pub const LINEAR_DAMPING: f32 = 1.0;
    pub const SPAWN_MARGIN: f32 = 40.0 / super::arena::WORLD_SCALE;
    /// Forward thrust in the body frame
    pub const THRUST: f32 = 300.0;
    /// Minimum gap between random turns while roaming
    pub const ROAM_TURN_INTERVAL_MS: u64 = 200;
    pub const LOOKING_TIMEOUT_MS: u64 = 10_000;
    pub const SUNNING_TIMEOUT_MS: u64 = 3_000;
    pub const STUNNED_TIMEOUT_MS: u64 = 2_000;
    /// A Sunning/Looking episode blocks a new rock search for this long
    pub const ROCK_COOLDOWN_MS: u64 = 5_000;
    /// Probability of fleeing a sensed fish
    pub const AVOID_FISH_CHANCE: f32 = 0.75;
    /// Probability of fleeing a sensed turtle
    pub const AVOID_TURTLE_CHANCE: f32 = 0.5;
}

/// Turtle NPC
pub mod turtle {
    pub const RADIUS: f32 = 92.0 / super::arena::WORLD_SCALE / 2.0;
    pub const DENSITY: f32 = 1.0;
    pub const LINEAR_DAMPING: f32 = 1.0;
    pub const SPAWN_MARGIN: f32 = 92.0 / super::arena::WORLD_SCALE;
    pub const THRUST: f32 = 300.0;
    pub const ROAM_TURN_INTERVAL_MS: u64 = 3_000;
    pub const SLEEPING_TIMEOUT_MS: u64 = 3_000;
    pub const PLAYING_TIMEOUT_MS: u64 = 10_000;
    pub const HUNGRY_TIMEOUT_MS: u64 = 10_000;
    pub const EATING_TIMEOUT_MS: u64 = 1_000;
    pub const STUNNED_TIMEOUT_MS: u64 = 2_000;
}

/// Shared NPC steering
pub mod npc {
    /// Half-extent of the square sensing region around an NPC
    pub const DETECTION_RADIUS: f32 = 160.0 / super::arena::WORLD_SCALE;
    /// After a state change, steering re-aims for this long
    pub const STEER_WINDOW_MS: u64 = 500;
    /// Maximum random jitter added to an aimed heading (degrees)
    pub const STEER_JITTER_DEG: f32 = 10.0;
    /// Maximum random turn while roaming (radians)
    pub const ROAM_TURN_MAX: f32 = std::f32::consts::FRAC_PI_4;
    /// Extra random spread on a turn-around (radians)
    pub const TURN_AROUND_SPREAD: f32 = std::f32::consts::PI / 8.0;
}

/// Static obstacles
pub mod rock {
    /// Sprite diameter at scale 1.0, in pixels
    pub const BASE_SIZE_PX: f32 = 135.0;
    pub const MIN_SCALE: f32 = 0.25;
    pub const MAX_SCALE: f32 = 1.25;
    pub const BASE_COUNT: usize = 5;
    /// Random extra rocks, drawn as ceil(random * N)
    pub const EXTRA_COUNT: f32 = 10.0;
    pub const MIN_COUNT: usize = BASE_COUNT + 1;
    pub const MAX_COUNT: usize = BASE_COUNT + EXTRA_COUNT as usize;
    pub const SPAWN_MARGIN: f32 = 140.0 / super::arena::WORLD_SCALE;
}

/// Projectiles
pub mod bubble {
    pub const RADIUS: f32 = 15.0 / super::arena::WORLD_SCALE / 2.0;
    pub const DENSITY: f32 = 1.0;
    /// Spawn distance ahead of the fish, in pixels
    pub const SPAWN_OFFSET_PX: f32 = 40.0;
    /// Launch force magnitude
    pub const LAUNCH_FORCE: f32 = 100.0;
    /// Ticks between shots while SPACE is held
    pub const SHOT_INTERVAL_TICKS: u8 = 2;
}

/// Collision outcomes
pub mod collision {
    pub const FISH_BUMP_DAMAGE: i32 = 10;
    pub const ROCK_DAMAGE: i32 = 10;
    pub const BUBBLE_DAMAGE: i32 = 10;
    pub const BUBBLE_REWARD: i32 = 10;
    pub const FROG_HEAL: i32 = 20;
    pub const FROG_SPEED_BONUS: i32 = 1;
    pub const TURTLE_BITE: i32 = 20;
    pub const TURTLE_SPEED_PENALTY: i32 = 1;
}

/// Network limits
pub mod net {
    /// Maximum framed record size (bytes)
    pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
    /// Session command queue depth
    pub const COMMAND_QUEUE_DEPTH: usize = 1024;
    /// Per-connection outbound queue depth, about two seconds of updates
    pub const OUTBOUND_QUEUE_DEPTH: usize = 128;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_dimensions() {
        assert!((arena::WIDTH - 34.133).abs() < 0.01);
        assert!((arena::HEIGHT - 25.6).abs() < 0.01);
    }

    #[test]
    fn test_rock_count_range() {
        assert_eq!(rock::MIN_COUNT, 6);
        assert_eq!(rock::MAX_COUNT, 15);
    }

    #[test]
    fn test_fish_ranges() {
        assert!(fish::START_HEALTH <= fish::MAX_HEALTH);
        assert!((fish::MIN_SPEED..=fish::MAX_SPEED).contains(&fish::START_SPEED));
    }
}
