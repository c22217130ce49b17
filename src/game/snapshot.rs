//! Wire snapshots built from the live world.

use crate::game::constants::arena::{MAX_PLAYERS, WORLD_SCALE};
use crate::game::physics::{BodyHandle, PhysicsWorld};
use crate::game::state::{Bubble, Fish, Npc, Rock, WorldState};
use crate::net::protocol::{
    BubbleSnapshot, NpcSnapshot, PlayerSnapshot, RockSnapshot, WorldSnapshot,
};
use crate::util::vec2::client_rotation;

/// Position in pixels plus client-space rotation
fn placement<P: PhysicsWorld>(world: &WorldState<P>, body: BodyHandle) -> (f32, f32, f32) {
    let position = world.position_of(body) * WORLD_SCALE;
    (position.x, position.y, client_rotation(world.angle_of(body)))
}

impl RockSnapshot {
    pub fn from_rock(rock: &Rock) -> Self {
        Self {
            x: rock.position.x * WORLD_SCALE,
            y: rock.position.y * WORLD_SCALE,
            scale: rock.scale,
        }
    }
}

impl PlayerSnapshot {
    pub fn from_fish<P: PhysicsWorld>(world: &WorldState<P>, fish: &Fish) -> Self {
        let (x, y, rotation) = placement(world, fish.body);
        Self {
            x,
            y,
            rotation,
            tag: fish.tag,
            health: fish.health(),
            time: fish.play_time,
        }
    }
}

impl<S: Copy + PartialEq> NpcSnapshot<S> {
    pub fn from_npc<P: PhysicsWorld>(world: &WorldState<P>, npc: &Npc<S>) -> Self {
        let (x, y, rotation) = placement(world, npc.body);
        Self {
            x,
            y,
            rotation,
            tag: npc.tag,
            state: npc.state(),
        }
    }
}

impl BubbleSnapshot {
    pub fn from_bubble<P: PhysicsWorld>(world: &WorldState<P>, bubble: &Bubble) -> Self {
        let position = world.position_of(bubble.body) * WORLD_SCALE;
        Self {
            id: bubble.id,
            x: position.x,
            y: position.y,
            color: bubble.owner,
        }
    }
}

impl WorldSnapshot {
    /// Current world as clients see it. Bubbles already flagged for
    /// removal are left out.
    pub fn from_world<P: PhysicsWorld>(world: &WorldState<P>) -> Self {
        let mut players = [PlayerSnapshot::VACANT; MAX_PLAYERS];
        for (slot, player) in players.iter_mut().enumerate() {
            if let Some(fish) = world.fish(slot) {
                *player = PlayerSnapshot::from_fish(world, fish);
            }
        }

        Self {
            players,
            frog: NpcSnapshot::from_npc(world, &world.frog),
            turtle: NpcSnapshot::from_npc(world, &world.turtle),
            bubbles: world
                .bubbles()
                .filter(|b| !b.pending_destroy)
                .map(|b| BubbleSnapshot::from_bubble(world, b))
                .collect(),
        }
    }
}

/// Rock field sent once with the join reply
pub fn rock_snapshots<P: PhysicsWorld>(world: &WorldState<P>) -> Vec<RockSnapshot> {
    world.rocks().iter().map(RockSnapshot::from_rock).collect()
}
