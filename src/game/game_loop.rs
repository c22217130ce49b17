//! One fixed simulation step.

use smallvec::SmallVec;
use tracing::{debug, info};

use crate::game::constants::{fish, tick};
use crate::game::physics::PhysicsWorld;
use crate::game::state::{SlotIndex, WorldState};
use crate::game::systems::{ai, arena, collision, input};
use crate::game::systems::collision::ResolveSummary;
use crate::net::protocol::WorldSnapshot;
use crate::util::clock::Millis;
use crate::util::rng::RandomSource;

/// What happened during one tick
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub tick: u64,
    /// World as it stood when the tick began; broadcast as `UPD`
    pub snapshot: WorldSnapshot,
    /// Slots whose fish ran out of health this tick
    pub dead_slots: SmallVec<[SlotIndex; 4]>,
    pub bodies_destroyed: usize,
    pub bubbles_fired: usize,
    pub bubbles_strayed: usize,
    /// False when no fish is alive and the pond was left paused
    pub simulated: bool,
    pub collisions: ResolveSummary,
}

/// Tick counter plus the fixed step order
#[derive(Debug, Default)]
pub struct TickLoop {
    tick_count: u64,
}

impl TickLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Run one step at session time `now`
    pub fn run<P: PhysicsWorld>(
        &mut self,
        world: &mut WorldState<P>,
        now: Millis,
        rng: &mut dyn RandomSource,
    ) -> TickOutcome {
        let snapshot = WorldSnapshot::from_world(world);

        let bodies_destroyed = world.flush_destroyed();
        let bubbles_strayed = arena::enforce_borders(world);

        self.tick_count += 1;
        let drain = self.tick_count % tick::DRAIN_INTERVAL_TICKS == 0;

        let mut dead_slots = SmallVec::new();
        let mut bubbles_fired = 0;
        let slots: SmallVec<[SlotIndex; 4]> = world.fish_slots().collect();
        for slot in slots {
            let Some(current) = world.fish_mut(slot) else {
                continue;
            };
            if drain {
                current.adjust_health(-fish::PASSIVE_DRAIN);
            }
            if current.is_dead() {
                world.remove_fish(slot);
                dead_slots.push(slot);
                info!("Fish in slot {} died", slot);
                continue;
            }
            current.play_time = now.saturating_sub(current.joined_at);
            if input::apply_controls(world, slot).is_some() {
                bubbles_fired += 1;
            }
        }

        let mut collisions = ResolveSummary::default();
        let simulated = world.fish_count() > 0;
        if simulated {
            ai::update_npcs(world, now, rng);
            let events = world.physics.step(
                tick::DT,
                tick::VELOCITY_ITERATIONS,
                tick::POSITION_ITERATIONS,
            );
            collisions = collision::resolve(world, &events, now, rng);
            world.physics.clear_forces();
        }

        if collisions.bubbles_popped > 0 {
            debug!(
                "Tick {}: {} bubbles popped",
                self.tick_count, collisions.bubbles_popped
            );
        }

        TickOutcome {
            tick: self.tick_count,
            snapshot,
            dead_slots,
            bodies_destroyed,
            bubbles_fired,
            bubbles_strayed,
            simulated,
            collisions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{EntityRef, Key, KeyState};
    use crate::game::systems::physics::RapierWorld;
    use crate::util::rng::ScriptedRandom;
    use crate::util::vec2::Vec2;

    fn pond() -> WorldState {
        let mut rng = ScriptedRandom::constant(0.0);
        let mut world = WorldState::bootstrap(RapierWorld::new(), &mut rng, 0);
        let frog = world.frog.body;
        let turtle = world.turtle.body;
        world.physics.set_position(frog, Vec2::new(30.0, 4.0));
        world.physics.set_position(turtle, Vec2::new(28.0, 20.0));
        world
    }

    fn add_fish(world: &mut WorldState, slot: SlotIndex, at: Vec2) {
        world.spawn_fish(slot, &mut ScriptedRandom::constant(0.5), 0);
        let body = world.fish(slot).unwrap().body;
        world.physics.set_position(body, at);
    }

    #[test]
    fn test_paused_without_fish() {
        let mut world = pond();
        let frog = world.position_of(world.frog.body);
        let mut tick_loop = TickLoop::new();

        let outcome = tick_loop.run(&mut world, 16, &mut ScriptedRandom::constant(0.0));
        assert!(!outcome.simulated);
        assert_eq!(outcome.tick, 1);
        assert_eq!(world.position_of(world.frog.body), frog);
    }

    #[test]
    fn test_passive_drain_every_sixty_ticks() {
        let mut world = pond();
        add_fish(&mut world, 0, Vec2::new(12.0, 12.0));
        let mut tick_loop = TickLoop::new();
        let mut rng = ScriptedRandom::constant(0.9);

        for tick in 1..=59 {
            tick_loop.run(&mut world, tick * 16, &mut rng);
        }
        assert_eq!(world.fish(0).unwrap().health(), 1000);

        tick_loop.run(&mut world, 60 * 16, &mut rng);
        assert_eq!(world.fish(0).unwrap().health(), 995);
        assert_eq!(world.fish(0).unwrap().play_time, 960);
    }

    #[test]
    fn test_dead_fish_removed_and_vacant_next_tick() {
        let mut world = pond();
        add_fish(&mut world, 2, Vec2::new(12.0, 12.0));
        world.fish_mut(2).unwrap().adjust_health(-1000);
        let mut tick_loop = TickLoop::new();
        let mut rng = ScriptedRandom::constant(0.9);

        let outcome = tick_loop.run(&mut world, 16, &mut rng);
        assert_eq!(outcome.dead_slots.as_slice(), &[2]);
        assert!(world.fish(2).is_none());
        // Snapshot taken before removal still shows the fish
        assert!(!outcome.snapshot.players[2].is_vacant());

        let next = tick_loop.run(&mut world, 32, &mut rng);
        assert!(next.snapshot.players[2].is_vacant());
        assert_eq!(next.snapshot.players[2], crate::net::protocol::PlayerSnapshot::VACANT);
        assert_eq!(next.bodies_destroyed, 1);
    }

    #[test]
    fn test_fish_bump_through_loop() {
        let mut world = pond();
        add_fish(&mut world, 0, Vec2::new(12.0, 12.0));
        add_fish(&mut world, 1, Vec2::new(13.5, 12.0));
        let mut tick_loop = TickLoop::new();

        let outcome = tick_loop.run(&mut world, 16, &mut ScriptedRandom::constant(0.9));
        assert!(outcome.simulated);
        assert_eq!(outcome.collisions.begun, 1);
        assert_eq!(world.fish(0).unwrap().health(), 990);
        assert_eq!(world.fish(1).unwrap().health(), 990);
    }

    #[test]
    fn test_bubble_hit_scenario() {
        let mut world = pond();
        add_fish(&mut world, 0, Vec2::new(12.0, 12.0));
        add_fish(&mut world, 1, Vec2::new(12.0, 9.5));
        world.fish_mut(0).unwrap().adjust_health(-200);
        let mut tick_loop = TickLoop::new();
        let mut rng = ScriptedRandom::constant(0.9);

        // Fish 0 faces up at angle 0, straight at fish 1
        input::handle_key(&mut world, 0, Key::Space, KeyState::Down);
        let mut hit_at = None;
        for tick in 1..=30 {
            let outcome = tick_loop.run(&mut world, tick * 16, &mut rng);
            if outcome.collisions.bubbles_popped > 0 {
                hit_at = Some(tick);
                break;
            }
        }
        assert!(hit_at.is_some());
        input::handle_key(&mut world, 0, Key::Space, KeyState::Up);

        assert_eq!(world.fish(1).unwrap().health(), 990);
        assert_eq!(world.fish(0).unwrap().health(), 810);

        let popped: Vec<_> = world
            .bubbles()
            .filter(|b| b.pending_destroy)
            .map(|b| b.id)
            .collect();
        assert_eq!(popped.len(), 1);

        let next = tick_loop.run(&mut world, 1_000, &mut rng);
        assert!(next.snapshot.bubbles.iter().all(|b| b.id != popped[0]));
        assert!(world.bubble(popped[0]).is_none());
    }

    #[test]
    fn test_stray_bubble_removed() {
        let mut world = pond();
        add_fish(&mut world, 3, Vec2::new(12.0, 12.0));
        let id = world.spawn_bubble(3).unwrap();
        let body = world.body_of(EntityRef::Bubble(id)).unwrap();
        world.physics.set_position(body, Vec2::new(-5.0, 3.0));
        let mut tick_loop = TickLoop::new();
        let mut rng = ScriptedRandom::constant(0.9);

        let first = tick_loop.run(&mut world, 16, &mut rng);
        assert_eq!(first.bubbles_strayed, 1);
        let second = tick_loop.run(&mut world, 32, &mut rng);
        assert!(second.snapshot.bubbles.is_empty());
        assert_eq!(world.bubble_count(), 0);
    }

    #[test]
    fn test_turtle_wakes_once_during_play() {
        let mut world = pond();
        add_fish(&mut world, 0, Vec2::new(5.0, 20.0));
        let mut tick_loop = TickLoop::new();
        let mut rng = ScriptedRandom::constant(0.9);

        let mut wakes = 0;
        let mut sleeping = true;
        for tick in 1..=240u64 {
            let outcome = tick_loop.run(&mut world, tick * 16, &mut rng);
            let now_sleeping = outcome.snapshot.turtle.state == crate::game::state::TurtleState::Sleeping;
            if sleeping && !now_sleeping {
                wakes += 1;
            }
            sleeping = now_sleeping;
        }
        assert_eq!(wakes, 1);
    }
}
