use smallvec::SmallVec;

use crate::game::constants::arena::{HEIGHT, WIDTH};
use crate::game::physics::PhysicsWorld;
use crate::game::state::{BubbleId, WorldState};
use crate::util::vec2::Vec2;

/// Is the position at or past any arena edge
pub fn is_outside(position: Vec2) -> bool {
    position.x < 0.0 || position.x >= WIDTH || position.y < 0.0 || position.y >= HEIGHT
}

/// Toroidal wrap: leaving one edge re-enters at the opposite one
pub fn wrap_position(position: Vec2) -> Vec2 {
    Vec2::new(wrap_axis(position.x, WIDTH), wrap_axis(position.y, HEIGHT))
}

fn wrap_axis(value: f32, extent: f32) -> f32 {
    let wrapped = value.rem_euclid(extent);
    // rem_euclid can round up to `extent` for tiny negative inputs
    if wrapped >= extent {
        0.0
    } else {
        wrapped
    }
}

/// Wrap creatures that crossed an edge and flag stray bubbles.
///
/// Returns the number of bubbles flagged for removal.
pub fn enforce_borders<P: PhysicsWorld>(world: &mut WorldState<P>) -> usize {
    let mut creatures: SmallVec<[_; 6]> = world
        .fish_slots()
        .filter_map(|slot| world.fish(slot).map(|f| f.body))
        .collect();
    creatures.push(world.frog.body);
    creatures.push(world.turtle.body);

    for body in creatures {
        let Some(position) = world.physics.position(body) else {
            continue;
        };
        if is_outside(position) {
            world.physics.set_position(body, wrap_position(position));
        }
    }

    let strays: Vec<BubbleId> = world
        .bubbles()
        .filter(|b| !b.pending_destroy)
        .filter(|b| is_outside(world.position_of(b.body)))
        .map(|b| b.id)
        .collect();

    strays.into_iter().filter(|id| world.mark_bubble(*id)).count()
}
