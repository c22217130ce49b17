//! Frog and turtle behavior.
//!
//! Each tick runs in three phases: `sense` builds one shared `Nearby`
//! result, `react_*` applies the proximity-driven transitions, and
//! `drive_*` applies per-state motion and the timed transitions.
//! NPC bodies have their velocity reset every tick, so motion comes
//! purely from the thrust applied during that tick.

use crate::game::constants::{frog as frog_k, npc, turtle as turtle_k};
use crate::game::physics::{Aabb, BodyHandle, PhysicsWorld};
use crate::game::state::{
    EntityRef, Frog, FrogState, NpcTarget, SlotIndex, TurtleState, WorldState,
};
use crate::util::clock::Millis;
use crate::util::rng::RandomSource;
use crate::util::vec2::{wrap_angle, Vec2};

/// Shared result of the per-tick proximity query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Nearby {
    /// Closest fish inside the frog's sensing region
    pub frog_sees_fish: Option<SlotIndex>,
    pub frog_sees_turtle: bool,
    /// Position of the closest rock inside the frog's sensing region
    pub frog_sees_rock: Option<Vec2>,
    /// Closest fish inside the turtle's sensing region
    pub turtle_sees_fish: Option<SlotIndex>,
    pub turtle_sees_frog: bool,
}

/// Run the region query around both NPCs
pub fn sense<P: PhysicsWorld>(world: &WorldState<P>) -> Nearby {
    let mut nearby = Nearby::default();

    let frog_pos = world.position_of(world.frog.body);
    let mut closest_fish: Option<(f32, SlotIndex)> = None;
    let mut closest_rock: Option<(f32, Vec2)> = None;
    for body in world
        .physics
        .query_region(Aabb::around(frog_pos, npc::DETECTION_RADIUS))
    {
        let distance = frog_pos.distance_sq_to(world.position_of(body));
        match world.entity_of(body) {
            Some(EntityRef::Fish(slot)) => keep_closest(&mut closest_fish, distance, slot),
            Some(EntityRef::Turtle) => nearby.frog_sees_turtle = true,
            Some(EntityRef::Rock(index)) => {
                if let Some(rock) = world.rocks().get(index) {
                    keep_closest(&mut closest_rock, distance, rock.position);
                }
            }
            _ => {}
        }
    }
    nearby.frog_sees_fish = closest_fish.map(|(_, slot)| slot);
    nearby.frog_sees_rock = closest_rock.map(|(_, pos)| pos);

    let turtle_pos = world.position_of(world.turtle.body);
    let mut closest_fish: Option<(f32, SlotIndex)> = None;
    for body in world
        .physics
        .query_region(Aabb::around(turtle_pos, npc::DETECTION_RADIUS))
    {
        let distance = turtle_pos.distance_sq_to(world.position_of(body));
        match world.entity_of(body) {
            Some(EntityRef::Fish(slot)) => keep_closest(&mut closest_fish, distance, slot),
            Some(EntityRef::Frog) => nearby.turtle_sees_frog = true,
            _ => {}
        }
    }
    nearby.turtle_sees_fish = closest_fish.map(|(_, slot)| slot);

    nearby
}

fn keep_closest<T>(best: &mut Option<(f32, T)>, distance: f32, candidate: T) {
    if best.as_ref().map_or(true, |(d, _)| distance < *d) {
        *best = Some((distance, candidate));
    }
}

/// Whether a rock may start a new shallow-water search or sunbathe.
///
/// Blocked for a while after a Sunning or Looking episode.
pub fn frog_may_seek_rock(frog: &Frog, now: Millis) -> bool {
    let recent = matches!(
        frog.previous_state(),
        FrogState::Sunning | FrogState::LookingForShallowWater
    );
    !recent || frog.time_in_state(now) > frog_k::ROCK_COOLDOWN_MS
}

/// Proximity transitions for the frog
pub fn react_frog<P: PhysicsWorld>(
    world: &mut WorldState<P>,
    nearby: &Nearby,
    now: Millis,
    rng: &mut dyn RandomSource,
) {
    let frog = &mut world.frog;

    if let Some(slot) = nearby.frog_sees_fish {
        let can_flee = matches!(
            frog.state(),
            FrogState::Roaming | FrogState::LookingForShallowWater | FrogState::AvoidingTurtle
        );
        if can_flee && rng.next_f32() < frog_k::AVOID_FISH_CHANCE {
            frog.transition(FrogState::AvoidingFish, now);
            frog.target = NpcTarget::Fish(slot);
        }
    }

    if nearby.frog_sees_turtle {
        let can_flee = matches!(
            frog.state(),
            FrogState::Roaming | FrogState::LookingForShallowWater
        );
        if can_flee && rng.next_f32() < frog_k::AVOID_TURTLE_CHANCE {
            frog.transition(FrogState::AvoidingTurtle, now);
            frog.target = NpcTarget::None;
        }
    }

    if let Some(rock) = nearby.frog_sees_rock {
        if frog.state() == FrogState::Roaming && frog_may_seek_rock(frog, now) {
            frog.transition(FrogState::LookingForShallowWater, now);
            frog.target = NpcTarget::Point(rock);
        }
    }
}

/// Proximity transitions for the turtle
pub fn react_turtle<P: PhysicsWorld>(world: &mut WorldState<P>, nearby: &Nearby, now: Millis) {
    let turtle = &mut world.turtle;

    if let Some(slot) = nearby.turtle_sees_fish {
        if matches!(turtle.state(), TurtleState::Roaming | TurtleState::Playing) {
            turtle.transition(TurtleState::Hungry, now);
            turtle.target = NpcTarget::Fish(slot);
        }
    }

    if nearby.turtle_sees_frog && turtle.state() == TurtleState::Roaming {
        turtle.transition(TurtleState::Playing, now);
        turtle.target = NpcTarget::None;
    }
}

/// Angle at which a body's local +y axis points along `direction`
fn facing_angle(direction: Vec2) -> f32 {
    (-direction.x).atan2(direction.y)
}

fn jitter(rng: &mut dyn RandomSource) -> f32 {
    (rng.next_f32() * npc::STEER_JITTER_DEG).to_radians()
}

fn turn_by<P: PhysicsWorld>(physics: &mut P, body: BodyHandle, delta: f32) {
    let angle = physics.angle(body).unwrap_or(0.0);
    physics.set_angle(body, wrap_angle(angle + delta));
}

/// Random turn of up to 45° either way
fn random_turn(rng: &mut dyn RandomSource) -> f32 {
    let magnitude = rng.next_f32() * npc::ROAM_TURN_MAX;
    if rng.next_f32() < 0.5 {
        -magnitude
    } else {
        magnitude
    }
}

/// Turn around with a little random spread
pub fn turn_around_angle(rng: &mut dyn RandomSource) -> f32 {
    std::f32::consts::PI + rng.next_f32() * npc::TURN_AROUND_SPREAD
}

fn steer<P: PhysicsWorld>(
    physics: &mut P,
    body: BodyHandle,
    direction: Vec2,
    rng: &mut dyn RandomSource,
) {
    if direction.length_sq() > f32::EPSILON {
        physics.set_angle(body, wrap_angle(facing_angle(direction) + jitter(rng)));
    }
}

fn thrust<P: PhysicsWorld>(physics: &mut P, body: BodyHandle, amount: f32) {
    if let Some(force) = physics.world_vector(body, Vec2::new(0.0, amount)) {
        physics.apply_force(body, force);
    }
}

/// Per-state frog motion and timed transitions
pub fn drive_frog<P: PhysicsWorld>(world: &mut WorldState<P>, now: Millis, rng: &mut dyn RandomSource) {
    let body = world.frog.body;
    let position = world.position_of(body);
    world.physics.set_linear_velocity(body, Vec2::ZERO);

    let steering = world.frog.time_in_state(now) <= npc::STEER_WINDOW_MS;

    match world.frog.state() {
        FrogState::Roaming => {
            if now.saturating_sub(world.frog.last_turn_at) > frog_k::ROAM_TURN_INTERVAL_MS {
                let delta = random_turn(rng);
                turn_by(&mut world.physics, body, delta);
                world.frog.last_turn_at = now;
            }
            thrust(&mut world.physics, body, frog_k::THRUST);
        }
        FrogState::AvoidingFish => {
            let threat = match world.frog.target {
                NpcTarget::Fish(slot) => world.fish_position(slot),
                _ => None,
            };
            match threat {
                Some(fish_pos) if fish_pos.distance_to(position) <= npc::DETECTION_RADIUS => {
                    if steering {
                        steer(&mut world.physics, body, position - fish_pos, rng);
                    }
                    thrust(&mut world.physics, body, frog_k::THRUST);
                }
                _ => {
                    world.frog.transition(FrogState::Roaming, now);
                    world.frog.target = NpcTarget::None;
                }
            }
        }
        FrogState::AvoidingTurtle => {
            let turtle_pos = world.position_of(world.turtle.body);
            if turtle_pos.distance_to(position) > npc::DETECTION_RADIUS {
                world.frog.transition(FrogState::Roaming, now);
            } else {
                if steering {
                    steer(&mut world.physics, body, position - turtle_pos, rng);
                }
                thrust(&mut world.physics, body, frog_k::THRUST);
            }
        }
        FrogState::LookingForShallowWater => {
            if world.frog.time_in_state(now) > frog_k::LOOKING_TIMEOUT_MS {
                world.frog.transition(FrogState::Roaming, now);
                world.frog.target = NpcTarget::None;
            } else {
                if let (true, NpcTarget::Point(rock)) = (steering, world.frog.target) {
                    steer(&mut world.physics, body, rock - position, rng);
                }
                thrust(&mut world.physics, body, frog_k::THRUST);
            }
        }
        FrogState::Sunning => {
            if world.frog.time_in_state(now) > frog_k::SUNNING_TIMEOUT_MS {
                let delta = turn_around_angle(rng);
                turn_by(&mut world.physics, body, delta);
                world.frog.last_turn_at = now;
                world.frog.transition(FrogState::Roaming, now);
            }
        }
        FrogState::Stunned => {
            if world.frog.time_in_state(now) > frog_k::STUNNED_TIMEOUT_MS {
                world.frog.transition(FrogState::Roaming, now);
            }
        }
    }
}

/// Per-state turtle motion and timed transitions
pub fn drive_turtle<P: PhysicsWorld>(
    world: &mut WorldState<P>,
    nearby: &Nearby,
    now: Millis,
    rng: &mut dyn RandomSource,
) {
    let body = world.turtle.body;
    let position = world.position_of(body);
    world.physics.set_linear_velocity(body, Vec2::ZERO);

    let steering = world.turtle.time_in_state(now) <= npc::STEER_WINDOW_MS;
    let elapsed = world.turtle.time_in_state(now);

    match world.turtle.state() {
        TurtleState::Sleeping => {
            if elapsed > turtle_k::SLEEPING_TIMEOUT_MS {
                turn_by(&mut world.physics, body, std::f32::consts::PI);
                world.turtle.last_turn_at = now;
                world.turtle.transition(TurtleState::Roaming, now);
            }
        }
        TurtleState::Roaming => {
            if now.saturating_sub(world.turtle.last_turn_at) > turtle_k::ROAM_TURN_INTERVAL_MS {
                let delta = random_turn(rng);
                turn_by(&mut world.physics, body, delta);
                world.turtle.last_turn_at = now;
            }
            thrust(&mut world.physics, body, turtle_k::THRUST);
        }
        TurtleState::Playing => {
            if elapsed > turtle_k::PLAYING_TIMEOUT_MS {
                world.turtle.transition(TurtleState::Roaming, now);
            } else {
                if steering {
                    let frog_pos = world.position_of(world.frog.body);
                    steer(&mut world.physics, body, frog_pos - position, rng);
                }
                thrust(&mut world.physics, body, turtle_k::THRUST);
            }
        }
        TurtleState::Hungry => {
            let prey = nearby
                .turtle_sees_fish
                .and_then(|slot| world.fish_position(slot).map(|pos| (slot, pos)));
            match prey {
                Some((slot, fish_pos)) if elapsed <= turtle_k::HUNGRY_TIMEOUT_MS => {
                    world.turtle.target = NpcTarget::Fish(slot);
                    if steering {
                        steer(&mut world.physics, body, fish_pos - position, rng);
                    }
                    thrust(&mut world.physics, body, turtle_k::THRUST);
                }
                _ => {
                    world.turtle.transition(TurtleState::Roaming, now);
                    world.turtle.target = NpcTarget::None;
                }
            }
        }
        TurtleState::Eating => {
            if elapsed > turtle_k::EATING_TIMEOUT_MS {
                world.turtle.transition(TurtleState::Sleeping, now);
            }
        }
        TurtleState::Stunned => {
            if elapsed > turtle_k::STUNNED_TIMEOUT_MS {
                world.turtle.transition(TurtleState::Roaming, now);
            }
        }
    }
}

/// Full NPC pass for one tick: sense once, then both machines.
pub fn update_npcs<P: PhysicsWorld>(world: &mut WorldState<P>, now: Millis, rng: &mut dyn RandomSource) {
    let nearby = sense(world);
    react_frog(world, &nearby, now, rng);
    react_turtle(world, &nearby, now);
    drive_turtle(world, &nearby, now, rng);
    drive_frog(world, now, rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::rock;
    use crate::game::systems::physics::RapierWorld;
    use crate::util::rng::ScriptedRandom;

    /// Pond with the rock field pushed to a corner and NPCs far apart
    fn pond() -> WorldState {
        let mut rng = ScriptedRandom::constant(0.0);
        let mut world = WorldState::bootstrap(RapierWorld::new(), &mut rng, 0);
        let frog = world.frog.body;
        let turtle = world.turtle.body;
        world.physics.set_position(frog, Vec2::new(10.0, 15.0));
        world.physics.set_position(turtle, Vec2::new(28.0, 15.0));
        world
    }

    fn place_fish(world: &mut WorldState, slot: SlotIndex, at: Vec2) {
        let mut rng = ScriptedRandom::constant(0.5);
        world.spawn_fish(slot, &mut rng, 0);
        let body = world.fish(slot).unwrap().body;
        world.physics.set_position(body, at);
    }

    #[test]
    fn test_sense_empty() {
        let world = pond();
        assert_eq!(sense(&world), Nearby::default());
    }

    #[test]
    fn test_sense_picks_closest_fish() {
        let mut world = pond();
        place_fish(&mut world, 0, Vec2::new(13.0, 15.0));
        place_fish(&mut world, 1, Vec2::new(11.0, 15.0));
        place_fish(&mut world, 2, Vec2::new(25.0, 15.0));

        let nearby = sense(&world);
        assert_eq!(nearby.frog_sees_fish, Some(1));
        assert_eq!(nearby.turtle_sees_fish, Some(2));
        assert!(!nearby.frog_sees_turtle);
    }

    #[test]
    fn test_sense_npcs_see_each_other() {
        let mut world = pond();
        let turtle = world.turtle.body;
        world.physics.set_position(turtle, Vec2::new(12.0, 15.0));

        let nearby = sense(&world);
        assert!(nearby.frog_sees_turtle);
        assert!(nearby.turtle_sees_frog);
    }

    #[test]
    fn test_sense_rock() {
        let mut world = pond();
        let rock = world.rocks()[0].position;
        let frog = world.frog.body;
        world.physics.set_position(frog, rock + Vec2::new(2.0, 0.0));

        assert_eq!(sense(&world).frog_sees_rock, Some(rock));
    }

    #[test]
    fn test_frog_flees_fish_on_low_roll() {
        let mut world = pond();
        place_fish(&mut world, 0, Vec2::new(12.0, 15.0));
        let nearby = sense(&world);

        let mut rng = ScriptedRandom::constant(0.5);
        react_frog(&mut world, &nearby, 1_000, &mut rng);
        assert_eq!(world.frog.state(), FrogState::AvoidingFish);
        assert_eq!(world.frog.target, NpcTarget::Fish(0));
    }

    #[test]
    fn test_frog_ignores_fish_on_high_roll() {
        let mut world = pond();
        place_fish(&mut world, 0, Vec2::new(12.0, 15.0));
        let nearby = sense(&world);

        let mut rng = ScriptedRandom::constant(0.9);
        react_frog(&mut world, &nearby, 1_000, &mut rng);
        assert_eq!(world.frog.state(), FrogState::Roaming);
    }

    #[test]
    fn test_frog_flees_turtle_half_the_time() {
        let nearby = Nearby {
            frog_sees_turtle: true,
            ..Nearby::default()
        };

        let mut world = pond();
        react_frog(&mut world, &nearby, 10, &mut ScriptedRandom::constant(0.4));
        assert_eq!(world.frog.state(), FrogState::AvoidingTurtle);

        let mut world = pond();
        react_frog(&mut world, &nearby, 10, &mut ScriptedRandom::constant(0.6));
        assert_eq!(world.frog.state(), FrogState::Roaming);
    }

    #[test]
    fn test_frog_seeks_rock_unless_recently_sunned() {
        let nearby = Nearby {
            frog_sees_rock: Some(Vec2::new(5.0, 5.0)),
            ..Nearby::default()
        };
        let mut rng = ScriptedRandom::constant(0.9);

        let mut world = pond();
        react_frog(&mut world, &nearby, 10, &mut rng);
        assert_eq!(world.frog.state(), FrogState::LookingForShallowWater);
        assert_eq!(world.frog.target, NpcTarget::Point(Vec2::new(5.0, 5.0)));

        // Just finished sunning: rock ignored for 5s
        let mut world = pond();
        world.frog.transition(FrogState::Sunning, 0);
        world.frog.transition(FrogState::Roaming, 1_000);
        react_frog(&mut world, &nearby, 2_000, &mut rng);
        assert_eq!(world.frog.state(), FrogState::Roaming);
        react_frog(&mut world, &nearby, 6_001, &mut rng);
        assert_eq!(world.frog.state(), FrogState::LookingForShallowWater);
    }

    #[test]
    fn test_frog_roaming_turn_cadence() {
        let mut world = pond();
        let body = world.frog.body;
        let mut rng = ScriptedRandom::new([0.5, 0.9]);

        drive_frog(&mut world, 150, &mut rng);
        assert_eq!(world.angle_of(body), 0.0);

        drive_frog(&mut world, 201, &mut rng);
        let turned = world.angle_of(body);
        assert!((turned - 0.5 * npc::ROAM_TURN_MAX).abs() < 1e-5);
        assert_eq!(world.frog.last_turn_at, 201);

        drive_frog(&mut world, 300, &mut rng);
        assert_eq!(world.angle_of(body), turned);
    }

    #[test]
    fn test_frog_roaming_thrusts_forward() {
        let mut world = pond();
        let body = world.frog.body;
        let start = world.position_of(body);

        drive_frog(&mut world, 10, &mut ScriptedRandom::constant(0.5));
        world.physics.step(1.0 / 60.0, 10, 10);

        // Local +y at angle 0 is screen-down
        assert!(world.position_of(body).y > start.y);
    }

    #[test]
    fn test_frog_avoid_fish_ends_when_far() {
        let mut world = pond();
        place_fish(&mut world, 0, Vec2::new(12.0, 15.0));
        world.frog.transition(FrogState::AvoidingFish, 0);
        world.frog.target = NpcTarget::Fish(0);

        let mut rng = ScriptedRandom::constant(0.0);
        drive_frog(&mut world, 100, &mut rng);
        assert_eq!(world.frog.state(), FrogState::AvoidingFish);

        // Steers directly away from the fish (fish is +x, so face -x)
        let away = Vec2::new(0.0, 1.0).rotate(world.angle_of(world.frog.body));
        assert!(away.approx_eq(Vec2::new(-1.0, 0.0), 1e-4));

        let fish = world.fish(0).unwrap().body;
        world.physics.set_position(fish, Vec2::new(30.0, 3.0));
        drive_frog(&mut world, 200, &mut rng);
        assert_eq!(world.frog.state(), FrogState::Roaming);
    }

    #[test]
    fn test_frog_avoid_fish_ends_when_fish_gone() {
        let mut world = pond();
        place_fish(&mut world, 0, Vec2::new(12.0, 15.0));
        world.frog.transition(FrogState::AvoidingFish, 0);
        world.frog.target = NpcTarget::Fish(0);
        world.remove_fish(0);

        drive_frog(&mut world, 100, &mut ScriptedRandom::constant(0.0));
        assert_eq!(world.frog.state(), FrogState::Roaming);
    }

    #[test]
    fn test_frog_avoid_turtle_ends_when_far() {
        let mut world = pond();
        world.frog.transition(FrogState::AvoidingTurtle, 0);
        drive_frog(&mut world, 100, &mut ScriptedRandom::constant(0.0));
        assert_eq!(world.frog.state(), FrogState::Roaming);
    }

    #[test]
    fn test_frog_timeouts() {
        let mut rng = ScriptedRandom::constant(0.0);

        let mut world = pond();
        world.frog.transition(FrogState::LookingForShallowWater, 0);
        drive_frog(&mut world, 10_000, &mut rng);
        assert_eq!(world.frog.state(), FrogState::LookingForShallowWater);
        drive_frog(&mut world, 10_001, &mut rng);
        assert_eq!(world.frog.state(), FrogState::Roaming);

        let mut world = pond();
        world.frog.transition(FrogState::Stunned, 0);
        drive_frog(&mut world, 2_000, &mut rng);
        assert_eq!(world.frog.state(), FrogState::Stunned);
        drive_frog(&mut world, 2_001, &mut rng);
        assert_eq!(world.frog.state(), FrogState::Roaming);
    }

    #[test]
    fn test_frog_sunning_turns_around() {
        let mut world = pond();
        let body = world.frog.body;
        world.frog.transition(FrogState::Sunning, 0);
        let mut rng = ScriptedRandom::constant(0.0);

        drive_frog(&mut world, 3_000, &mut rng);
        assert_eq!(world.frog.state(), FrogState::Sunning);
        assert_eq!(world.physics.linear_velocity(body), Some(Vec2::ZERO));

        drive_frog(&mut world, 3_001, &mut rng);
        assert_eq!(world.frog.state(), FrogState::Roaming);
        assert!((world.angle_of(body) - std::f32::consts::PI).abs() < 1e-5);
    }

    #[test]
    fn test_turtle_sleeping_wakes_exactly_once() {
        let mut world = pond();
        let body = world.turtle.body;
        let nearby = Nearby::default();
        let mut rng = ScriptedRandom::constant(0.99);

        let mut transitions = 0;
        let mut last = world.turtle.state();
        for now in (0..=9_000).step_by(16) {
            drive_turtle(&mut world, &nearby, now, &mut rng);
            if world.turtle.state() != last {
                transitions += 1;
                last = world.turtle.state();
            }
        }

        assert_eq!(transitions, 1);
        assert_eq!(world.turtle.state(), TurtleState::Roaming);
        assert!(world.turtle.state_changed_at() > 3_000);
        assert!(world.turtle.state_changed_at() <= 3_016);
        // Woke up and turned around before roaming
        assert!(world.angle_of(body) != 0.0);
    }

    #[test]
    fn test_turtle_hungry_then_roams_without_fish() {
        let mut world = pond();
        place_fish(&mut world, 0, Vec2::new(26.0, 15.0));
        world.turtle.transition(TurtleState::Roaming, 0);

        let nearby = sense(&world);
        react_turtle(&mut world, &nearby, 100);
        assert_eq!(world.turtle.state(), TurtleState::Hungry);

        let mut rng = ScriptedRandom::constant(0.0);
        drive_turtle(&mut world, &nearby, 150, &mut rng);
        assert_eq!(world.turtle.state(), TurtleState::Hungry);

        drive_turtle(&mut world, &Nearby::default(), 200, &mut rng);
        assert_eq!(world.turtle.state(), TurtleState::Roaming);
    }

    #[test]
    fn test_turtle_hungry_times_out() {
        let mut world = pond();
        place_fish(&mut world, 0, Vec2::new(26.0, 15.0));
        world.turtle.transition(TurtleState::Hungry, 0);
        let nearby = Nearby {
            turtle_sees_fish: Some(0),
            ..Nearby::default()
        };

        drive_turtle(&mut world, &nearby, 10_001, &mut ScriptedRandom::constant(0.0));
        assert_eq!(world.turtle.state(), TurtleState::Roaming);
    }

    #[test]
    fn test_turtle_plays_with_frog() {
        let mut world = pond();
        world.turtle.transition(TurtleState::Roaming, 0);
        let nearby = Nearby {
            turtle_sees_frog: true,
            ..Nearby::default()
        };

        react_turtle(&mut world, &nearby, 50);
        assert_eq!(world.turtle.state(), TurtleState::Playing);

        let mut rng = ScriptedRandom::constant(0.0);
        drive_turtle(&mut world, &nearby, 10_050, &mut rng);
        assert_eq!(world.turtle.state(), TurtleState::Playing);
        drive_turtle(&mut world, &nearby, 10_051, &mut rng);
        assert_eq!(world.turtle.state(), TurtleState::Roaming);
    }

    #[test]
    fn test_turtle_prefers_fish_over_frog() {
        let mut world = pond();
        world.turtle.transition(TurtleState::Roaming, 0);
        place_fish(&mut world, 1, Vec2::new(26.0, 15.0));
        let nearby = Nearby {
            turtle_sees_fish: Some(1),
            turtle_sees_frog: true,
            ..Nearby::default()
        };

        react_turtle(&mut world, &nearby, 10);
        assert_eq!(world.turtle.state(), TurtleState::Hungry);
    }

    #[test]
    fn test_turtle_eating_then_sleeps() {
        let mut world = pond();
        world.turtle.transition(TurtleState::Eating, 0);
        let mut rng = ScriptedRandom::constant(0.0);

        drive_turtle(&mut world, &Nearby::default(), 1_000, &mut rng);
        assert_eq!(world.turtle.state(), TurtleState::Eating);
        drive_turtle(&mut world, &Nearby::default(), 1_001, &mut rng);
        assert_eq!(world.turtle.state(), TurtleState::Sleeping);
    }

    #[test]
    fn test_turtle_stunned_recovers() {
        let mut world = pond();
        world.turtle.transition(TurtleState::Stunned, 0);
        drive_turtle(&mut world, &Nearby::default(), 2_001, &mut ScriptedRandom::constant(0.0));
        assert_eq!(world.turtle.state(), TurtleState::Roaming);
    }

    #[test]
    fn test_update_npcs_runs_both_machines() {
        let mut world = pond();
        world.turtle.transition(TurtleState::Sleeping, 0);
        update_npcs(&mut world, 3_500, &mut ScriptedRandom::constant(0.9));
        assert_eq!(world.turtle.state(), TurtleState::Roaming);
        assert_eq!(world.frog.state(), FrogState::Roaming);
    }

    #[test]
    fn test_facing_angle_points_local_y() {
        for dir in [
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, -1.0),
            Vec2::new(-3.0, 4.0),
        ] {
            let facing = Vec2::new(0.0, 1.0).rotate(facing_angle(dir));
            assert!(facing.approx_eq(dir.normalize(), 1e-5));
        }
    }

    #[test]
    fn test_pond_fixture_is_quiet() {
        // Rocks sit at the margin corner, far from both NPCs
        let world = pond();
        let corner = Vec2::new(rock::SPAWN_MARGIN, rock::SPAWN_MARGIN);
        assert!(world.rocks().iter().all(|r| r.position == corner));
        assert_eq!(world.frog.tag, crate::game::state::CollisionTag::None);
    }
}
