//! Rapier2D-backed `PhysicsWorld`.
//!
//! Every pond body is one rigid body carrying a single ball collider.
//! Gravity is zero since the pond is seen from above. Colliders carry the
//! owning `BodyHandle` in `user_data`, so rapier collision events map
//! straight back to game handles.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;

use hashbrown::HashSet;
use parking_lot::Mutex;
use rapier2d::parry::bounding_volume::Aabb as ParryAabb;
use rapier2d::prelude::*;

use crate::game::physics::{Aabb, BodyDef, BodyHandle, BodyKind, ContactEvent, PhysicsWorld};
use crate::util::vec2::Vec2;

/// Largest distance a body may travel in one step
const MAX_TRANSLATION: f32 = 2.0;
/// Broad-phase boxes are computed before integration, so candidates are
/// gathered with room for one step of travel
const QUERY_MARGIN: f32 = 2.0 * MAX_TRANSLATION;

/// Unordered body pair, stored low handle first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct ContactKey(BodyHandle, BodyHandle);

impl ContactKey {
    fn new(a: BodyHandle, b: BodyHandle) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    fn involves(&self, handle: BodyHandle) -> bool {
        self.0 == handle || self.1 == handle
    }
}

#[derive(Debug, Clone, Copy)]
struct BodyEntry {
    body: RigidBodyHandle,
    radius: f32,
}

/// Collects rapier collision events raised during a step
#[derive(Default)]
struct CollisionCollector {
    events: Mutex<Vec<CollisionEvent>>,
}

impl CollisionCollector {
    fn drain(&self) -> Vec<CollisionEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventHandler for CollisionCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        self.events.lock().push(event);
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

fn encode_user_data(handle: BodyHandle) -> u128 {
    u128::from(handle.0)
}

fn decode_user_data(user_data: u128) -> BodyHandle {
    BodyHandle(user_data as u32)
}

fn to_vector(v: Vec2) -> Vector {
    Vector::new(v.x, v.y)
}

/// Rapier rigid-body world for the pond
pub struct RapierWorld {
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    gravity: Vector,
    collector: CollisionCollector,
    bodies: BTreeMap<BodyHandle, BodyEntry>,
    next_handle: u32,
    contacts: HashSet<ContactKey>,
    /// Created or teleported since the broad phase last ran
    moved: BTreeSet<BodyHandle>,
    /// End events for contacts broken by `destroy_body`
    pending_events: Vec<ContactEvent>,
}

impl Default for RapierWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RapierWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RapierWorld")
            .field("bodies", &self.bodies.len())
            .field("contacts", &self.contacts.len())
            .finish_non_exhaustive()
    }
}

impl RapierWorld {
    pub fn new() -> Self {
        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            gravity: Vector::new(0.0, 0.0),
            collector: CollisionCollector::default(),
            bodies: BTreeMap::new(),
            next_handle: 0,
            contacts: HashSet::new(),
            moved: BTreeSet::new(),
            pending_events: Vec::new(),
        }
    }

    fn rigid_body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        let entry = self.bodies.get(&handle)?;
        self.rigid_body_set.get(entry.body)
    }

    fn rigid_body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        let entry = self.bodies.get(&handle)?;
        self.rigid_body_set.get_mut(entry.body)
    }

    fn bounds_of(&self, handle: BodyHandle) -> Option<Aabb> {
        let radius = self.bodies.get(&handle)?.radius;
        self.position(handle).map(|center| Aabb::around(center, radius))
    }

    /// Scale down velocities that would carry a body past the per-step cap
    fn cap_velocities(&mut self, dt: f32) {
        let max_speed = MAX_TRANSLATION / dt;
        for (_, body) in self.rigid_body_set.iter_mut() {
            if !body.is_dynamic() {
                continue;
            }
            let v = body.linvel();
            let velocity = Vec2::new(v.x, v.y);
            let speed = velocity.length();
            if speed > max_speed {
                body.set_linvel(to_vector(velocity * (max_speed / speed)), true);
            }
        }
    }

    fn translate_event(&mut self, event: CollisionEvent) -> Option<ContactEvent> {
        let (h1, h2, started) = match event {
            CollisionEvent::Started(h1, h2, _flags) => (h1, h2, true),
            CollisionEvent::Stopped(h1, h2, _flags) => (h1, h2, false),
        };
        // Removed colliders are gone from the set; destroy_body already reported them
        let a = decode_user_data(self.collider_set.get(h1)?.user_data);
        let b = decode_user_data(self.collider_set.get(h2)?.user_data);
        let key = ContactKey::new(a, b);

        if started {
            self.contacts.insert(key).then_some(ContactEvent::Begin(key.0, key.1))
        } else {
            self.contacts.remove(&key).then_some(ContactEvent::End(key.0, key.1))
        }
    }
}

impl PhysicsWorld for RapierWorld {
    fn create_body(&mut self, def: BodyDef) -> BodyHandle {
        let handle = BodyHandle(self.next_handle);
        self.next_handle += 1;

        let builder = match def.kind {
            BodyKind::Static => RigidBodyBuilder::fixed(),
            BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
        };
        let rigid_body = builder
            .translation(to_vector(def.position))
            .rotation(def.angle)
            .linear_damping(def.linear_damping)
            .lock_rotations()
            .user_data(encode_user_data(handle))
            .build();
        let collider = ColliderBuilder::ball(def.radius)
            .density(def.density)
            .restitution(def.restitution)
            .restitution_combine_rule(CoefficientCombineRule::Max)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .user_data(encode_user_data(handle))
            .build();

        let body = self.rigid_body_set.insert(rigid_body);
        self.collider_set
            .insert_with_parent(collider, body, &mut self.rigid_body_set);

        self.bodies.insert(
            handle,
            BodyEntry {
                body,
                radius: def.radius,
            },
        );
        self.moved.insert(handle);
        handle
    }

    fn destroy_body(&mut self, handle: BodyHandle) -> bool {
        let Some(entry) = self.bodies.remove(&handle) else {
            return false;
        };
        self.rigid_body_set.remove(
            entry.body,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        self.moved.remove(&handle);

        let mut broken: Vec<ContactKey> = self
            .contacts
            .iter()
            .filter(|key| key.involves(handle))
            .copied()
            .collect();
        broken.sort_unstable();

        for key in broken {
            self.contacts.remove(&key);
            self.pending_events.push(ContactEvent::End(key.0, key.1));
        }
        true
    }

    fn apply_force(&mut self, handle: BodyHandle, force: Vec2) {
        if let Some(body) = self.rigid_body_mut(handle) {
            if body.is_dynamic() {
                body.add_force(to_vector(force), true);
            }
        }
    }

    fn position(&self, handle: BodyHandle) -> Option<Vec2> {
        self.rigid_body(handle).map(|body| {
            let t = body.translation();
            Vec2::new(t.x, t.y)
        })
    }

    fn set_position(&mut self, handle: BodyHandle, position: Vec2) {
        if let Some(body) = self.rigid_body_mut(handle) {
            body.set_translation(to_vector(position), true);
            self.moved.insert(handle);
        }
    }

    fn angle(&self, handle: BodyHandle) -> Option<f32> {
        self.rigid_body(handle).map(|body| body.rotation().angle())
    }

    fn set_angle(&mut self, handle: BodyHandle, angle: f32) {
        if let Some(body) = self.rigid_body_mut(handle) {
            body.set_rotation(Rotation::from_angle(angle), true);
        }
    }

    fn linear_velocity(&self, handle: BodyHandle) -> Option<Vec2> {
        self.rigid_body(handle).map(|body| {
            let v = body.linvel();
            Vec2::new(v.x, v.y)
        })
    }

    fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec2) {
        if let Some(body) = self.rigid_body_mut(handle) {
            if body.is_dynamic() {
                body.set_linvel(to_vector(velocity), true);
            }
        }
    }

    fn query_region(&self, bounds: Aabb) -> Vec<BodyHandle> {
        let margin = Vec2::splat(QUERY_MARGIN);
        let region = ParryAabb::new(
            to_vector(bounds.min - margin).into(),
            to_vector(bounds.max + margin).into(),
        );
        let query = self.broad_phase.as_query_pipeline(
            self.narrow_phase.query_dispatcher(),
            &self.rigid_body_set,
            &self.collider_set,
            QueryFilter::default(),
        );

        // The broad phase only sees poses from the last step
        let mut candidates: BTreeSet<BodyHandle> = query
            .intersect_aabb_conservative(region)
            .map(|(_, collider)| decode_user_data(collider.user_data))
            .collect();
        candidates.extend(self.moved.iter().copied());

        candidates
            .into_iter()
            .filter(|handle| {
                self.bounds_of(*handle)
                    .is_some_and(|body_bounds| body_bounds.overlaps(&bounds))
            })
            .collect()
    }

    fn step(&mut self, dt: f32, velocity_iterations: u32, position_iterations: u32) -> Vec<ContactEvent> {
        self.integration_parameters.dt = dt;
        self.integration_parameters.num_solver_iterations =
            NonZeroUsize::new(velocity_iterations as usize).unwrap_or(NonZeroUsize::MIN).get();
        self.integration_parameters.num_internal_stabilization_iterations = position_iterations as usize;

        self.cap_velocities(dt);

        self.physics_pipeline.step(
            self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            &(),
            &self.collector,
        );
        self.moved.clear();

        let mut events = std::mem::take(&mut self.pending_events);
        for raw in self.collector.drain() {
            if let Some(event) = self.translate_event(raw) {
                events.push(event);
            }
        }
        events
    }

    fn clear_forces(&mut self) {
        for (_, body) in self.rigid_body_set.iter_mut() {
            body.reset_forces(false);
        }
    }

    fn contact_count(&self, handle: BodyHandle) -> usize {
        self.contacts.iter().filter(|key| key.involves(handle)).count()
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }
}
