//! Physics engine seam.
//!
//! The simulation core only talks to bodies through `PhysicsWorld`: it
//! creates and destroys bodies, pushes forces, reads poses back and asks
//! for region queries. Contacts come back from `step` as a plain list so
//! game rules run after the engine is done iterating its own bodies.

use serde::{Deserialize, Serialize};

use crate::util::vec2::Vec2;

/// Opaque body identifier issued by a `PhysicsWorld`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Never moves, infinite mass
    Static,
    /// Integrated every step
    Dynamic,
}

/// Circle body parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyDef {
    pub kind: BodyKind,
    pub position: Vec2,
    pub angle: f32,
    pub radius: f32,
    pub density: f32,
    pub restitution: f32,
    pub linear_damping: f32,
}

impl BodyDef {
    pub fn dynamic(radius: f32, position: Vec2) -> Self {
        Self {
            kind: BodyKind::Dynamic,
            position,
            angle: 0.0,
            radius,
            density: 1.0,
            restitution: 0.0,
            linear_damping: 0.0,
        }
    }

    pub fn fixed(radius: f32, position: Vec2) -> Self {
        Self {
            kind: BodyKind::Static,
            ..Self::dynamic(radius, position)
        }
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_damping(mut self, linear_damping: f32) -> Self {
        self.linear_damping = linear_damping;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }
}

/// Axis-aligned query bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn around(center: Vec2, half_extent: f32) -> Self {
        Self {
            min: center - Vec2::splat(half_extent),
            max: center + Vec2::splat(half_extent),
        }
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

/// Touch notifications produced by a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactEvent {
    Begin(BodyHandle, BodyHandle),
    End(BodyHandle, BodyHandle),
}

impl ContactEvent {
    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        match *self {
            ContactEvent::Begin(a, b) | ContactEvent::End(a, b) => (a, b),
        }
    }
}

/// Rigid-body world consumed by the simulation core
pub trait PhysicsWorld: Send {
    fn create_body(&mut self, def: BodyDef) -> BodyHandle;

    /// Remove a body. Contacts it was part of end on the next step.
    fn destroy_body(&mut self, handle: BodyHandle) -> bool;

    /// Accumulate a world-frame force until `clear_forces`
    fn apply_force(&mut self, handle: BodyHandle, force: Vec2);

    fn position(&self, handle: BodyHandle) -> Option<Vec2>;
    fn set_position(&mut self, handle: BodyHandle, position: Vec2);

    fn angle(&self, handle: BodyHandle) -> Option<f32>;
    fn set_angle(&mut self, handle: BodyHandle, angle: f32);

    fn linear_velocity(&self, handle: BodyHandle) -> Option<Vec2>;
    fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec2);

    /// Bodies whose bounds overlap `bounds`
    fn query_region(&self, bounds: Aabb) -> Vec<BodyHandle>;

    /// Advance the world and report contacts that began or ended
    fn step(&mut self, dt: f32, velocity_iterations: u32, position_iterations: u32) -> Vec<ContactEvent>;

    fn clear_forces(&mut self);

    /// Number of bodies currently touching `handle`
    fn contact_count(&self, handle: BodyHandle) -> usize;

    fn body_count(&self) -> usize;

    /// Rotate a body-frame vector into the world frame
    fn world_vector(&self, handle: BodyHandle, local: Vec2) -> Option<Vec2> {
        self.angle(handle).map(|angle| local.rotate(angle))
    }
}
