//! Authoritative pond state.
//!
//! Every entity pairs game attributes with a body handle owned by the
//! physics world. Bodies are never destroyed in the middle of a tick:
//! retiring an entity drops its game record and queues the body, and
//! `flush_destroyed` removes the queue at the start of the next tick.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::constants::{arena, bubble, fish, frog, rock, turtle};
use crate::game::physics::{BodyDef, BodyHandle, PhysicsWorld};
use crate::game::systems::physics::RapierWorld;
use crate::util::clock::Millis;
use crate::util::rng::RandomSource;
use crate::util::vec2::Vec2;

/// Player slot index, 0..4
pub type SlotIndex = usize;

/// Per-session bubble identifier
pub type BubbleId = u64;

/// Fixed color of each player slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerColor {
    Purple,
    Green,
    Red,
    Orange,
}

impl PlayerColor {
    pub const ALL: [PlayerColor; arena::MAX_PLAYERS] = [
        PlayerColor::Purple,
        PlayerColor::Green,
        PlayerColor::Red,
        PlayerColor::Orange,
    ];

    pub fn for_slot(slot: SlotIndex) -> Option<Self> {
        Self::ALL.get(slot).copied()
    }

    pub fn slot(self) -> SlotIndex {
        match self {
            PlayerColor::Purple => 0,
            PlayerColor::Green => 1,
            PlayerColor::Red => 2,
            PlayerColor::Orange => 3,
        }
    }

    /// Single-letter wire code
    pub fn code(self) -> char {
        match self {
            PlayerColor::Purple => 'p',
            PlayerColor::Green => 'g',
            PlayerColor::Red => 'r',
            PlayerColor::Orange => 'o',
        }
    }

    /// Case-insensitive inverse of `code`
    pub fn from_code(code: char) -> Option<Self> {
        match code.to_ascii_lowercase() {
            'p' => Some(PlayerColor::Purple),
            'g' => Some(PlayerColor::Green),
            'r' => Some(PlayerColor::Red),
            'o' => Some(PlayerColor::Orange),
            _ => None,
        }
    }
}

/// Visual hint sent with each creature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CollisionTag {
    #[default]
    None,
    /// Currently bumping into something
    Negative,
}

impl CollisionTag {
    pub fn as_str(self) -> &'static str {
        match self {
            CollisionTag::None => "",
            CollisionTag::Negative => "NEG",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            Some(CollisionTag::None)
        } else if s.eq_ignore_ascii_case("NEG") {
            Some(CollisionTag::Negative)
        } else {
            None
        }
    }
}

/// Keys a client may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    W,
    A,
    S,
    D,
    Space,
}

impl Key {
    pub fn as_str(self) -> &'static str {
        match self {
            Key::W => "W",
            Key::A => "A",
            Key::S => "S",
            Key::D => "D",
            Key::Space => "SPACE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "W" => Some(Key::W),
            "A" => Some(Key::A),
            "S" => Some(Key::S),
            "D" => Some(Key::D),
            "SPACE" => Some(Key::Space),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyState {
    Down,
    Up,
}

impl KeyState {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyState::Down => "DOWN",
            KeyState::Up => "UP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DOWN" => Some(KeyState::Down),
            "UP" => Some(KeyState::Up),
            _ => None,
        }
    }
}

/// Error returned when a state display name is unknown
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown NPC state '{0}'")]
pub struct UnknownState(pub String);

macro_rules! npc_states {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Display name shared with the client
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownState;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => Err(UnknownState(other.to_string())),
                }
            }
        }
    };
}

npc_states!(
    /// Frog behavior states
    FrogState {
        Roaming => "Roaming",
        AvoidingFish => "Avoiding Fish",
        AvoidingTurtle => "Avoiding Turtle",
        Stunned => "Stunned",
        LookingForShallowWater => "Looking for Shallow Water",
        Sunning => "Sunning",
    }
);

npc_states!(
    /// Turtle behavior states
    TurtleState {
        Sleeping => "Sleeping",
        Roaming => "Roaming",
        Stunned => "Stunned",
        Playing => "Playing",
        Hungry => "Hungry",
        Eating => "Eating",
    }
);

/// What a body belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Fish(SlotIndex),
    Frog,
    Turtle,
    Rock(usize),
    Bubble(BubbleId),
}

/// A player's fish
#[derive(Debug, Clone)]
pub struct Fish {
    pub body: BodyHandle,
    pub color: PlayerColor,
    pub tag: CollisionTag,
    health: i32,
    speed: i32,
    pub joined_at: Millis,
    pub play_time: Millis,
    /// Key currently held, if any
    pub key: Option<Key>,
    /// Shot cadence counter; a shot fires when it reaches the interval
    pub shot_charge: u8,
}

impl Fish {
    fn new(body: BodyHandle, color: PlayerColor, now: Millis) -> Self {
        Self {
            body,
            color,
            tag: CollisionTag::None,
            health: fish::START_HEALTH,
            speed: fish::START_SPEED,
            joined_at: now,
            play_time: 0,
            key: None,
            shot_charge: bubble::SHOT_INTERVAL_TICKS,
        }
    }

    pub fn health(&self) -> i32 {
        self.health
    }

    pub fn speed(&self) -> i32 {
        self.speed
    }

    /// Apply a health delta, clamped to [0, 1000]
    pub fn adjust_health(&mut self, delta: i32) -> i32 {
        self.health = self
            .health
            .saturating_add(delta)
            .clamp(fish::MIN_HEALTH, fish::MAX_HEALTH);
        self.health
    }

    /// Apply a speed delta, clamped to [1, 100]
    pub fn adjust_speed(&mut self, delta: i32) -> i32 {
        self.speed = self
            .speed
            .saturating_add(delta)
            .clamp(fish::MIN_SPEED, fish::MAX_SPEED);
        self.speed
    }

    pub fn is_dead(&self) -> bool {
        self.health <= fish::MIN_HEALTH
    }
}

/// What an NPC is steering relative to
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum NpcTarget {
    #[default]
    None,
    Fish(SlotIndex),
    Point(Vec2),
}

/// Frog or turtle: a body driven by a state machine
#[derive(Debug, Clone)]
pub struct Npc<S> {
    pub body: BodyHandle,
    pub tag: CollisionTag,
    state: S,
    previous: S,
    state_changed_at: Millis,
    pub last_turn_at: Millis,
    pub target: NpcTarget,
}

impl<S: Copy + PartialEq> Npc<S> {
    fn new(body: BodyHandle, initial: S, now: Millis) -> Self {
        Self {
            body,
            tag: CollisionTag::None,
            state: initial,
            previous: initial,
            state_changed_at: now,
            last_turn_at: now,
            target: NpcTarget::None,
        }
    }

    pub fn state(&self) -> S {
        self.state
    }

    pub fn previous_state(&self) -> S {
        self.previous
    }

    pub fn state_changed_at(&self) -> Millis {
        self.state_changed_at
    }

    /// Milliseconds spent in the current state
    pub fn time_in_state(&self, now: Millis) -> Millis {
        now.saturating_sub(self.state_changed_at)
    }

    /// Enter `next`, remembering the state being left
    pub fn transition(&mut self, next: S, now: Millis) {
        self.previous = self.state;
        self.state = next;
        self.state_changed_at = now;
    }

    /// Restart the current state's timer without touching `previous`
    pub fn restart(&mut self, now: Millis) {
        self.state_changed_at = now;
    }

    /// Move both timers to `now`, used when the tick loop starts
    pub fn reanchor(&mut self, now: Millis) {
        self.state_changed_at = now;
        self.last_turn_at = now;
    }
}

pub type Frog = Npc<FrogState>;
pub type Turtle = Npc<TurtleState>;

/// Static obstacle
#[derive(Debug, Clone, PartialEq)]
pub struct Rock {
    pub body: BodyHandle,
    pub position: Vec2,
    pub scale: f32,
}

impl Rock {
    pub fn radius(&self) -> f32 {
        rock_radius(self.scale)
    }
}

fn rock_radius(scale: f32) -> f32 {
    scale * rock::BASE_SIZE_PX / arena::WORLD_SCALE / 2.0
}

/// Short-lived projectile
#[derive(Debug, Clone, PartialEq)]
pub struct Bubble {
    pub id: BubbleId,
    pub body: BodyHandle,
    pub owner: PlayerColor,
    pub pending_destroy: bool,
}

/// Uniform point inside the arena, `margin` away from every edge
fn random_position(rng: &mut dyn RandomSource, margin: f32) -> Vec2 {
    let x = rng.next_f32() * (arena::WIDTH - 2.0 * margin) + margin;
    let y = rng.next_f32() * (arena::HEIGHT - 2.0 * margin) + margin;
    Vec2::new(x, y)
}

/// Number of rocks for a new session: 5 + ceil(random * 10), at least 6
fn rock_count(rng: &mut dyn RandomSource) -> usize {
    let extra = (rng.next_f32() * rock::EXTRA_COUNT).ceil() as usize;
    rock::BASE_COUNT + extra.clamp(1, rock::EXTRA_COUNT as usize)
}

/// Everything simulated in one session
pub struct WorldState<P: PhysicsWorld = RapierWorld> {
    pub physics: P,
    fish: [Option<Fish>; arena::MAX_PLAYERS],
    pub frog: Frog,
    pub turtle: Turtle,
    rocks: Vec<Rock>,
    bubbles: BTreeMap<BubbleId, Bubble>,
    next_bubble_id: BubbleId,
    owners: HashMap<BodyHandle, EntityRef>,
    pending_destroy: Vec<BodyHandle>,
}

impl<P: PhysicsWorld> WorldState<P> {
    /// Build a fresh pond: rock field, frog and turtle
    pub fn bootstrap(mut physics: P, rng: &mut dyn RandomSource, now: Millis) -> Self {
        let mut owners = HashMap::new();

        let count = rock_count(rng);
        let mut rocks = Vec::with_capacity(count);
        for index in 0..count {
            let scale = rng.next_f32() + rock::MIN_SCALE;
            let position = random_position(rng, rock::SPAWN_MARGIN);
            let body = physics.create_body(BodyDef::fixed(rock_radius(scale), position));
            owners.insert(body, EntityRef::Rock(index));
            rocks.push(Rock {
                body,
                position,
                scale,
            });
        }

        let frog_pos = random_position(rng, frog::SPAWN_MARGIN);
        let frog_body = physics.create_body(
            BodyDef::dynamic(frog::RADIUS, frog_pos)
                .with_density(frog::DENSITY)
                .with_damping(frog::LINEAR_DAMPING),
        );
        owners.insert(frog_body, EntityRef::Frog);

        let turtle_pos = random_position(rng, turtle::SPAWN_MARGIN);
        let turtle_body = physics.create_body(
            BodyDef::dynamic(turtle::RADIUS, turtle_pos)
                .with_density(turtle::DENSITY)
                .with_damping(turtle::LINEAR_DAMPING),
        );
        owners.insert(turtle_body, EntityRef::Turtle);

        debug!("Pond bootstrapped with {} rocks", rocks.len());

        Self {
            physics,
            fish: Default::default(),
            frog: Npc::new(frog_body, FrogState::Roaming, now),
            turtle: Npc::new(turtle_body, TurtleState::Sleeping, now),
            rocks,
            bubbles: BTreeMap::new(),
            next_bubble_id: 0,
            owners,
            pending_destroy: Vec::new(),
        }
    }

    /// Place a fish for `slot`. Returns false if the slot already has one.
    pub fn spawn_fish(&mut self, slot: SlotIndex, rng: &mut dyn RandomSource, now: Millis) -> bool {
        let Some(color) = PlayerColor::for_slot(slot) else {
            return false;
        };
        if self.fish[slot].is_some() {
            return false;
        }

        let position = random_position(rng, fish::SPAWN_MARGIN);
        let body = self.physics.create_body(
            BodyDef::dynamic(fish::RADIUS, position)
                .with_density(fish::DENSITY)
                .with_restitution(fish::RESTITUTION)
                .with_damping(fish::LINEAR_DAMPING),
        );
        self.owners.insert(body, EntityRef::Fish(slot));
        self.fish[slot] = Some(Fish::new(body, color, now));
        true
    }

    /// Drop the fish record and queue its body for destruction
    pub fn remove_fish(&mut self, slot: SlotIndex) -> Option<Fish> {
        let fish = self.fish.get_mut(slot)?.take()?;
        self.retire_body(fish.body);
        Some(fish)
    }

    /// Launch a bubble from the fish in `slot`
    pub fn spawn_bubble(&mut self, slot: SlotIndex) -> Option<BubbleId> {
        let fish = self.fish(slot)?;
        let (owner, body) = (fish.color, fish.body);
        let origin = self.physics.position(body)?;
        let heading = bubble_heading(self.physics.angle(body)?);

        let spawn_at = origin + heading * (bubble::SPAWN_OFFSET_PX / arena::WORLD_SCALE);
        let handle = self.physics.create_body(
            BodyDef::dynamic(bubble::RADIUS, spawn_at).with_density(bubble::DENSITY),
        );
        self.physics.apply_force(handle, heading * bubble::LAUNCH_FORCE);

        let id = self.next_bubble_id;
        self.next_bubble_id += 1;
        self.owners.insert(handle, EntityRef::Bubble(id));
        self.bubbles.insert(
            id,
            Bubble {
                id,
                body: handle,
                owner,
                pending_destroy: false,
            },
        );
        Some(id)
    }

    /// Flag a bubble for removal. Returns false if it was already flagged.
    pub fn mark_bubble(&mut self, id: BubbleId) -> bool {
        let Some(bubble) = self.bubbles.get_mut(&id) else {
            return false;
        };
        if bubble.pending_destroy {
            return false;
        }
        bubble.pending_destroy = true;
        let body = bubble.body;
        self.pending_destroy.push(body);
        true
    }

    fn retire_body(&mut self, body: BodyHandle) {
        self.owners.remove(&body);
        self.pending_destroy.push(body);
    }

    /// Physically remove every queued body
    pub fn flush_destroyed(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending_destroy);
        let mut removed = 0;
        for body in pending {
            if let Some(EntityRef::Bubble(id)) = self.owners.remove(&body) {
                self.bubbles.remove(&id);
            }
            if self.physics.destroy_body(body) {
                removed += 1;
            }
        }
        removed
    }

    pub fn pending_destroy_count(&self) -> usize {
        self.pending_destroy.len()
    }

    pub fn entity_of(&self, body: BodyHandle) -> Option<EntityRef> {
        self.owners.get(&body).copied()
    }

    pub fn fish(&self, slot: SlotIndex) -> Option<&Fish> {
        self.fish.get(slot)?.as_ref()
    }

    pub fn fish_mut(&mut self, slot: SlotIndex) -> Option<&mut Fish> {
        self.fish.get_mut(slot)?.as_mut()
    }

    /// Occupied fish slots in index order
    pub fn fish_slots(&self) -> impl Iterator<Item = SlotIndex> + '_ {
        self.fish
            .iter()
            .enumerate()
            .filter_map(|(slot, fish)| fish.as_ref().map(|_| slot))
    }

    pub fn fish_count(&self) -> usize {
        self.fish.iter().filter(|f| f.is_some()).count()
    }

    /// Fish in the slot owned by `color`
    pub fn fish_by_color_mut(&mut self, color: PlayerColor) -> Option<&mut Fish> {
        self.fish_mut(color.slot())
    }

    pub fn rocks(&self) -> &[Rock] {
        &self.rocks
    }

    pub fn bubble(&self, id: BubbleId) -> Option<&Bubble> {
        self.bubbles.get(&id)
    }

    /// Bubbles in id order
    pub fn bubbles(&self) -> impl Iterator<Item = &Bubble> {
        self.bubbles.values()
    }

    pub fn bubble_count(&self) -> usize {
        self.bubbles.len()
    }

    /// Body position, or the origin for a body the world no longer knows
    pub fn position_of(&self, body: BodyHandle) -> Vec2 {
        self.physics.position(body).unwrap_or(Vec2::ZERO)
    }

    pub fn angle_of(&self, body: BodyHandle) -> f32 {
        self.physics.angle(body).unwrap_or(0.0)
    }

    pub fn fish_position(&self, slot: SlotIndex) -> Option<Vec2> {
        self.fish(slot).map(|f| self.position_of(f.body))
    }

    /// Set the visual tag of a creature. Rocks and bubbles carry none.
    pub fn set_tag(&mut self, entity: EntityRef, tag: CollisionTag) -> bool {
        match entity {
            EntityRef::Fish(slot) => match self.fish_mut(slot) {
                Some(fish) => {
                    fish.tag = tag;
                    true
                }
                None => false,
            },
            EntityRef::Frog => {
                self.frog.tag = tag;
                true
            }
            EntityRef::Turtle => {
                self.turtle.tag = tag;
                true
            }
            EntityRef::Rock(_) | EntityRef::Bubble(_) => false,
        }
    }

    /// Body of a live entity
    pub fn body_of(&self, entity: EntityRef) -> Option<BodyHandle> {
        match entity {
            EntityRef::Fish(slot) => self.fish(slot).map(|f| f.body),
            EntityRef::Frog => Some(self.frog.body),
            EntityRef::Turtle => Some(self.turtle.body),
            EntityRef::Rock(index) => self.rocks.get(index).map(|r| r.body),
            EntityRef::Bubble(id) => self.bubble(id).map(|b| b.body),
        }
    }
}

/// Unit vector a fish fires along, derived from its body angle.
///
/// The sprite's nose sits 90° off the body's x axis, so the heading is
/// computed in client degrees.
pub fn bubble_heading(angle: f32) -> Vec2 {
    use crate::util::vec2::wrap_degrees;

    let facing = wrap_degrees(360.0 - wrap_degrees(angle.to_degrees() + 90.0));
    let (sin, cos) = facing.to_radians().sin_cos();

    // Bubbles leave from the front, opposite the facing vector
    Vec2::new(-cos, sin)
}
