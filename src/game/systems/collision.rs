//! Gameplay consequences of physics contacts.
//!
//! Runs after each physics step over the events it returned, so the
//! physics world is never mutated from inside its own contact pass.
//! Bodies are only queued for destruction here.

use tracing::debug;

use crate::game::constants::collision::*;
use crate::game::physics::{BodyHandle, ContactEvent, PhysicsWorld};
use crate::game::state::{
    BubbleId, CollisionTag, EntityRef, FrogState, PlayerColor, SlotIndex, TurtleState, WorldState,
};
use crate::game::systems::ai::{frog_may_seek_rock, turn_around_angle};
use crate::util::clock::Millis;
use crate::util::rng::RandomSource;
use crate::util::vec2::wrap_angle;

/// Counts from one resolution pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    pub begun: usize,
    pub ended: usize,
    pub skipped: usize,
    pub bubbles_popped: usize,
}

/// Apply every contact event in order
pub fn resolve<P: PhysicsWorld>(
    world: &mut WorldState<P>,
    events: &[ContactEvent],
    now: Millis,
    rng: &mut dyn RandomSource,
) -> ResolveSummary {
    let mut summary = ResolveSummary::default();

    for event in events {
        match *event {
            ContactEvent::Begin(a, b) => {
                if begin_contact(world, a, b, now, rng, &mut summary) {
                    summary.begun += 1;
                } else {
                    summary.skipped += 1;
                }
            }
            ContactEvent::End(a, b) => {
                end_contact(world, a);
                end_contact(world, b);
                summary.ended += 1;
            }
        }
    }

    summary
}

/// Entity for a body that still takes part in gameplay
fn live_entity<P: PhysicsWorld>(world: &WorldState<P>, body: BodyHandle) -> Option<EntityRef> {
    let entity = world.entity_of(body)?;
    if let EntityRef::Bubble(id) = entity {
        if world.bubble(id)?.pending_destroy {
            return None;
        }
    }
    Some(entity)
}

fn is_creature(entity: EntityRef) -> bool {
    matches!(
        entity,
        EntityRef::Fish(_) | EntityRef::Frog | EntityRef::Turtle
    )
}

fn begin_contact<P: PhysicsWorld>(
    world: &mut WorldState<P>,
    a: BodyHandle,
    b: BodyHandle,
    now: Millis,
    rng: &mut dyn RandomSource,
    summary: &mut ResolveSummary,
) -> bool {
    let (Some(first), Some(second)) = (live_entity(world, a), live_entity(world, b)) else {
        return false;
    };

    for entity in [first, second] {
        if is_creature(entity) {
            world.set_tag(entity, CollisionTag::Negative);
        }
    }

    use EntityRef::*;
    match (first, second) {
        (Fish(x), Fish(y)) => {
            adjust_health(world, x, -FISH_BUMP_DAMAGE);
            adjust_health(world, y, -FISH_BUMP_DAMAGE);
        }
        (Bubble(id), other) | (other, Bubble(id)) => {
            summary.bubbles_popped += bubble_hit(world, id, other, now);
        }
        (Fish(slot), Frog) | (Frog, Fish(slot)) => {
            if let Some(fish) = world.fish_mut(slot) {
                fish.adjust_health(FROG_HEAL);
                fish.adjust_speed(FROG_SPEED_BONUS);
            }
        }
        (Fish(slot), Turtle) | (Turtle, Fish(slot)) => {
            match world.turtle.state() {
                TurtleState::Roaming | TurtleState::Playing | TurtleState::Hungry => {
                    world.turtle.transition(TurtleState::Eating, now);
                }
                // Another bite keeps it chewing for a fresh interval
                TurtleState::Eating => world.turtle.restart(now),
                _ => {}
            }
            if world.turtle.state() != TurtleState::Stunned {
                if let Some(fish) = world.fish_mut(slot) {
                    fish.adjust_health(-TURTLE_BITE);
                    fish.adjust_speed(-TURTLE_SPEED_PENALTY);
                }
            }
        }
        (Fish(slot), Rock(_)) | (Rock(_), Fish(slot)) => {
            adjust_health(world, slot, -ROCK_DAMAGE);
        }
        (Frog, Rock(_)) | (Rock(_), Frog) => frog_hits_rock(world, now, rng),
        (Turtle, Rock(_)) | (Rock(_), Turtle) => {
            if world.turtle.state() == TurtleState::Roaming {
                world.turtle.transition(TurtleState::Sleeping, now);
            }
        }
        _ => {}
    }

    true
}

fn end_contact<P: PhysicsWorld>(world: &mut WorldState<P>, body: BodyHandle) {
    let Some(entity) = world.entity_of(body) else {
        return;
    };
    if is_creature(entity) && world.physics.contact_count(body) == 0 {
        world.set_tag(entity, CollisionTag::None);
    }
}

fn adjust_health<P: PhysicsWorld>(world: &mut WorldState<P>, slot: SlotIndex, delta: i32) {
    if let Some(fish) = world.fish_mut(slot) {
        fish.adjust_health(delta);
    }
}

fn reward_owner<P: PhysicsWorld>(world: &mut WorldState<P>, owner: PlayerColor) {
    if let Some(fish) = world.fish_by_color_mut(owner) {
        fish.adjust_health(BUBBLE_REWARD);
    }
}

/// Returns the number of bubbles this contact popped
fn bubble_hit<P: PhysicsWorld>(
    world: &mut WorldState<P>,
    id: BubbleId,
    other: EntityRef,
    now: Millis,
) -> usize {
    let Some(owner) = world.bubble(id).map(|b| b.owner) else {
        return 0;
    };
    if other == EntityRef::Fish(owner.slot()) {
        return 0;
    }

    let mut popped = usize::from(world.mark_bubble(id));

    match other {
        EntityRef::Frog => {
            world.frog.transition(FrogState::Stunned, now);
            reward_owner(world, owner);
            debug!("{:?} bubble {} stunned the frog", owner, id);
        }
        EntityRef::Turtle => {
            world.turtle.transition(TurtleState::Stunned, now);
            reward_owner(world, owner);
            debug!("{:?} bubble {} stunned the turtle", owner, id);
        }
        EntityRef::Fish(victim) => {
            adjust_health(world, victim, -BUBBLE_DAMAGE);
            reward_owner(world, owner);
            debug!("{:?} bubble {} hit fish in slot {}", owner, id, victim);
        }
        EntityRef::Bubble(other_id) => {
            popped += usize::from(world.mark_bubble(other_id));
        }
        EntityRef::Rock(_) => {}
    }

    popped
}

fn frog_hits_rock<P: PhysicsWorld>(world: &mut WorldState<P>, now: Millis, rng: &mut dyn RandomSource) {
    let wants_sun = match world.frog.state() {
        FrogState::LookingForShallowWater => true,
        FrogState::Roaming => frog_may_seek_rock(&world.frog, now),
        _ => false,
    };

    if wants_sun {
        world.frog.transition(FrogState::Sunning, now);
        world.frog.target = Default::default();
    } else {
        let body = world.frog.body;
        let angle = world.angle_of(body) + turn_around_angle(rng);
        world.physics.set_angle(body, wrap_angle(angle));
        world.frog.last_turn_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::systems::physics::RapierWorld;
    use crate::util::rng::ScriptedRandom;
    use crate::util::vec2::Vec2;

    fn pond() -> WorldState {
        let mut rng = ScriptedRandom::constant(0.5);
        let mut world = WorldState::bootstrap(RapierWorld::new(), &mut rng, 0);
        for slot in 0..3 {
            world.spawn_fish(slot, &mut rng, 0);
        }
        world
    }

    fn body(world: &WorldState, entity: EntityRef) -> BodyHandle {
        world.body_of(entity).unwrap()
    }

    fn begin(world: &mut WorldState, a: EntityRef, b: EntityRef) -> ResolveSummary {
        let event = ContactEvent::Begin(body(world, a), body(world, b));
        resolve(world, &[event], 1_000, &mut ScriptedRandom::constant(0.0))
    }

    fn health(world: &WorldState, slot: SlotIndex) -> i32 {
        world.fish(slot).unwrap().health()
    }

    #[test]
    fn test_fish_bump_costs_both() {
        let mut world = pond();
        world.fish_mut(0).unwrap().adjust_health(-500);

        let summary = begin(&mut world, EntityRef::Fish(0), EntityRef::Fish(1));
        assert_eq!(summary.begun, 1);
        assert_eq!(health(&world, 0), 490);
        assert_eq!(health(&world, 1), 990);
        assert_eq!(world.fish(0).unwrap().tag, CollisionTag::Negative);
        assert_eq!(world.fish(1).unwrap().tag, CollisionTag::Negative);
    }

    #[test]
    fn test_bubble_hits_opponent() {
        let mut world = pond();
        world.fish_mut(0).unwrap().adjust_health(-100);
        let id = world.spawn_bubble(0).unwrap();

        let summary = begin(&mut world, EntityRef::Bubble(id), EntityRef::Fish(1));
        assert_eq!(summary.bubbles_popped, 1);
        assert_eq!(health(&world, 1), 990);
        assert_eq!(health(&world, 0), 910);
        assert!(world.bubble(id).unwrap().pending_destroy);
        assert_eq!(world.fish(1).unwrap().tag, CollisionTag::Negative);
    }

    #[test]
    fn test_pending_bubble_ignored() {
        let mut world = pond();
        let id = world.spawn_bubble(0).unwrap();
        world.mark_bubble(id);

        let summary = begin(&mut world, EntityRef::Fish(1), EntityRef::Bubble(id));
        assert_eq!(summary.skipped, 1);
        assert_eq!(health(&world, 1), 1000);
        assert_eq!(world.fish(1).unwrap().tag, CollisionTag::None);
    }

    #[test]
    fn test_bubble_only_counts_once_per_step() {
        let mut world = pond();
        world.fish_mut(0).unwrap().adjust_health(-100);
        let id = world.spawn_bubble(0).unwrap();
        let bubble = body(&world, EntityRef::Bubble(id));
        let events = [
            ContactEvent::Begin(bubble, body(&world, EntityRef::Fish(1))),
            ContactEvent::Begin(body(&world, EntityRef::Fish(2)), bubble),
        ];

        let summary = resolve(&mut world, &events, 0, &mut ScriptedRandom::constant(0.0));
        assert_eq!(summary.bubbles_popped, 1);
        assert_eq!(health(&world, 1), 990);
        assert_eq!(health(&world, 2), 1000);
        assert_eq!(health(&world, 0), 910);
    }

    #[test]
    fn test_bubble_ignores_owner() {
        let mut world = pond();
        let id = world.spawn_bubble(2).unwrap();

        let summary = begin(&mut world, EntityRef::Fish(2), EntityRef::Bubble(id));
        assert_eq!(summary.bubbles_popped, 0);
        assert_eq!(health(&world, 2), 1000);
        assert!(!world.bubble(id).unwrap().pending_destroy);
    }

    #[test]
    fn test_bubble_stuns_npcs() {
        let mut world = pond();
        world.fish_mut(1).unwrap().adjust_health(-50);
        let first = world.spawn_bubble(1).unwrap();
        let second = world.spawn_bubble(1).unwrap();

        begin(&mut world, EntityRef::Bubble(first), EntityRef::Frog);
        begin(&mut world, EntityRef::Turtle, EntityRef::Bubble(second));

        assert_eq!(world.frog.state(), FrogState::Stunned);
        assert_eq!(world.turtle.state(), TurtleState::Stunned);
        assert_eq!(world.frog.state_changed_at(), 1_000);
        assert_eq!(health(&world, 1), 970);
    }

    #[test]
    fn test_bubbles_pop_each_other() {
        let mut world = pond();
        let a = world.spawn_bubble(0).unwrap();
        let b = world.spawn_bubble(1).unwrap();

        let summary = begin(&mut world, EntityRef::Bubble(a), EntityRef::Bubble(b));
        assert_eq!(summary.bubbles_popped, 2);
        assert_eq!(world.pending_destroy_count(), 2);
    }

    #[test]
    fn test_bubble_on_rock_just_pops() {
        let mut world = pond();
        let id = world.spawn_bubble(0).unwrap();

        begin(&mut world, EntityRef::Rock(0), EntityRef::Bubble(id));
        assert!(world.bubble(id).unwrap().pending_destroy);
        assert_eq!(health(&world, 0), 1000);
    }

    #[test]
    fn test_frog_feeds_fish() {
        let mut world = pond();
        world.fish_mut(0).unwrap().adjust_health(-100);

        begin(&mut world, EntityRef::Frog, EntityRef::Fish(0));
        let fish = world.fish(0).unwrap();
        assert_eq!(fish.health(), 920);
        assert_eq!(fish.speed(), 11);
        assert_eq!(world.frog.tag, CollisionTag::Negative);
    }

    #[test]
    fn test_turtle_bites_fish() {
        let mut world = pond();
        world.turtle.transition(TurtleState::Hungry, 0);

        begin(&mut world, EntityRef::Fish(1), EntityRef::Turtle);
        let fish = world.fish(1).unwrap();
        assert_eq!(fish.health(), 980);
        assert_eq!(fish.speed(), 9);
        assert_eq!(world.turtle.state(), TurtleState::Eating);
    }

    #[test]
    fn test_bite_while_eating_restarts_meal() {
        let mut world = pond();
        world.turtle.transition(TurtleState::Hungry, 0);
        world.turtle.transition(TurtleState::Eating, 200);

        begin(&mut world, EntityRef::Turtle, EntityRef::Fish(2));
        assert_eq!(world.turtle.state(), TurtleState::Eating);
        assert_eq!(world.turtle.previous_state(), TurtleState::Hungry);
        assert_eq!(world.turtle.state_changed_at(), 1_000);
        assert_eq!(health(&world, 2), 980);
    }

    #[test]
    fn test_sleeping_turtle_still_bites() {
        let mut world = pond();
        begin(&mut world, EntityRef::Turtle, EntityRef::Fish(0));
        assert_eq!(world.turtle.state(), TurtleState::Sleeping);
        assert_eq!(health(&world, 0), 980);
    }

    #[test]
    fn test_stunned_turtle_is_harmless() {
        let mut world = pond();
        world.turtle.transition(TurtleState::Stunned, 0);

        begin(&mut world, EntityRef::Turtle, EntityRef::Fish(0));
        assert_eq!(health(&world, 0), 1000);
        assert_eq!(world.fish(0).unwrap().speed(), 10);
        assert_eq!(world.turtle.state(), TurtleState::Stunned);
    }

    #[test]
    fn test_rock_scrapes_fish() {
        let mut world = pond();
        begin(&mut world, EntityRef::Fish(2), EntityRef::Rock(1));
        assert_eq!(health(&world, 2), 990);
    }

    #[test]
    fn test_frog_suns_on_rock() {
        let mut world = pond();
        begin(&mut world, EntityRef::Rock(0), EntityRef::Frog);
        assert_eq!(world.frog.state(), FrogState::Sunning);
    }

    #[test]
    fn test_frog_turns_from_rock_after_sunning() {
        let mut world = pond();
        world.frog.transition(FrogState::Sunning, 0);
        world.frog.transition(FrogState::Roaming, 500);
        let frog = world.frog.body;
        world.physics.set_angle(frog, 1.0);

        begin(&mut world, EntityRef::Frog, EntityRef::Rock(0));
        assert_eq!(world.frog.state(), FrogState::Roaming);
        assert!((world.angle_of(frog) - wrap_angle(1.0 + std::f32::consts::PI)).abs() < 1e-5);
        assert_eq!(world.frog.last_turn_at, 1_000);
    }

    #[test]
    fn test_fleeing_frog_turns_from_rock() {
        let mut world = pond();
        world.frog.transition(FrogState::AvoidingFish, 900);

        begin(&mut world, EntityRef::Frog, EntityRef::Rock(0));
        assert_eq!(world.frog.state(), FrogState::AvoidingFish);
    }

    #[test]
    fn test_roaming_turtle_naps_on_rock() {
        let mut world = pond();
        world.turtle.transition(TurtleState::Roaming, 0);
        begin(&mut world, EntityRef::Rock(2), EntityRef::Turtle);
        assert_eq!(world.turtle.state(), TurtleState::Sleeping);

        world.turtle.transition(TurtleState::Playing, 0);
        begin(&mut world, EntityRef::Rock(2), EntityRef::Turtle);
        assert_eq!(world.turtle.state(), TurtleState::Playing);
    }

    #[test]
    fn test_end_clears_tag_when_free() {
        let mut world = pond();
        let a = body(&world, EntityRef::Fish(0));
        let b = body(&world, EntityRef::Fish(1));
        world.physics.set_position(a, Vec2::new(5.0, 5.0));
        world.physics.set_position(b, Vec2::new(20.0, 20.0));
        world.fish_mut(0).unwrap().tag = CollisionTag::Negative;
        world.fish_mut(1).unwrap().tag = CollisionTag::Negative;

        let summary = resolve(&mut world, &[ContactEvent::End(a, b)], 0, &mut ScriptedRandom::constant(0.0));
        assert_eq!(summary.ended, 1);
        assert_eq!(world.fish(0).unwrap().tag, CollisionTag::None);
        assert_eq!(world.fish(1).unwrap().tag, CollisionTag::None);
    }

    #[test]
    fn test_end_for_destroyed_body_clears_survivor() {
        let mut world = pond();
        let victim = body(&world, EntityRef::Fish(1));
        world.physics.set_position(victim, Vec2::new(20.0, 20.0));
        let id = world.spawn_bubble(0).unwrap();
        let bubble = body(&world, EntityRef::Bubble(id));

        begin(&mut world, EntityRef::Bubble(id), EntityRef::Fish(1));
        world.flush_destroyed();

        resolve(
            &mut world,
            &[ContactEvent::End(bubble, victim)],
            0,
            &mut ScriptedRandom::constant(0.0),
        );
        assert_eq!(world.fish(1).unwrap().tag, CollisionTag::None);
    }

    #[test]
    fn test_real_step_contact() {
        let mut world = pond();
        let a = body(&world, EntityRef::Fish(0));
        let b = body(&world, EntityRef::Fish(2));
        world.physics.set_position(a, Vec2::new(20.0, 20.0));
        world.physics.set_position(b, Vec2::new(21.5, 20.0));

        let events = world.physics.step(1.0 / 60.0, 10, 10);
        assert!(events.contains(&ContactEvent::Begin(a, b)) || events.contains(&ContactEvent::Begin(b, a)));
        resolve(&mut world, &events, 0, &mut ScriptedRandom::constant(0.0));

        assert_eq!(health(&world, 0), 990);
        assert_eq!(health(&world, 2), 990);
    }
}
