//! Keyboard state per fish.
//!
//! KEY records only update which key a fish is holding. The held key is
//! turned into force, rotation or shots once per tick.

use crate::game::constants::{bubble, fish};
use crate::game::physics::PhysicsWorld;
use crate::game::state::{BubbleId, Key, KeyState, SlotIndex, WorldState};
use crate::util::vec2::{wrap_angle, Vec2};

/// Effect of a KEY record on the held-key state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyChange {
    /// Now holding this key
    Pressed(Key),
    /// Held key released
    Released(Key),
    /// Repeat of the held key, or release of a key not held
    Ignored,
    /// No fish in this slot
    NoFish,
}

/// Record a key transition for the fish in `slot`
pub fn handle_key<P: PhysicsWorld>(
    world: &mut WorldState<P>,
    slot: SlotIndex,
    key: Key,
    state: KeyState,
) -> KeyChange {
    let Some(fish) = world.fish_mut(slot) else {
        return KeyChange::NoFish;
    };

    match state {
        KeyState::Down if fish.key == Some(key) => KeyChange::Ignored,
        KeyState::Down => {
            fish.key = Some(key);
            if key == Key::Space {
                // First tick of a fresh press fires immediately
                fish.shot_charge = bubble::SHOT_INTERVAL_TICKS;
            }
            KeyChange::Pressed(key)
        }
        KeyState::Up if fish.key == Some(key) => {
            fish.key = None;
            fish.shot_charge = bubble::SHOT_INTERVAL_TICKS;
            KeyChange::Released(key)
        }
        KeyState::Up => KeyChange::Ignored,
    }
}

/// Apply the held key for one tick. Returns the id of a bubble fired.
pub fn apply_controls<P: PhysicsWorld>(world: &mut WorldState<P>, slot: SlotIndex) -> Option<BubbleId> {
    let current = world.fish_mut(slot)?;
    let key = current.key?;
    let body = current.body;
    let speed = current.speed() as f32;

    match key {
        Key::W | Key::S => {
            let local = if key == Key::W {
                Vec2::new(0.0, -speed)
            } else {
                Vec2::new(0.0, speed)
            };
            if let Some(force) = world.physics.world_vector(body, local) {
                world.physics.apply_force(body, force);
            }
            None
        }
        Key::A | Key::D => {
            let step = if key == Key::A {
                -fish::TURN_STEP
            } else {
                fish::TURN_STEP
            };
            let angle = world.angle_of(body);
            world.physics.set_angle(body, wrap_angle(angle + step));
            None
        }
        Key::Space => {
            if current.shot_charge >= bubble::SHOT_INTERVAL_TICKS {
                current.shot_charge = 1;
                world.spawn_bubble(slot)
            } else {
                current.shot_charge += 1;
                None
            }
        }
    }
}
