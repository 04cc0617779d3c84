//! The scene: the explicit context object owning the simulation.
//!
//! A [`Scene`] owns the world handler, the actor table, the collision
//! listener registries, and the pending-joint queue. Every operation flows
//! through it; there is no ambient global state. Handler operations dispatch
//! on the actor's [`PhysicsHandler`] variant:
//!
//! - `Detached` operates on the numeric record,
//! - `Live` operates on the rapier body,
//! - `Group` fans out to member actors (removed members are skipped, matching
//!   the stale-reference policy for contacts).
//!
//! # Frame protocol
//!
//! The intended per-frame call sequence is `step(dt)` followed by
//! `dispatch_contacts(&notices)`. Listeners run strictly between steps, so
//! anything they mutate (forces, vetoes, new listeners, unmounts) takes
//! effect in the *next* step, never the one that produced the contact.

use std::collections::HashMap;
use std::mem;

use rapier2d::prelude::*;
use tracing::{debug, warn};

use crate::actor::{ActorAllocator, ActorId};
use crate::category::BodyCategory;
use crate::handler::{LiveBody, PhysicsHandler};
use crate::joint::{JointId, JointSpec, PendingJoint};
use crate::listener::{CollisionRegistry, ContactEvent, ContactNotice, ContactPair};
use crate::record::PhysicsRecord;
use crate::world::WorldHandler;
use crate::PhysicsError;

/// Depth of the thin probe rectangle under an actor's bounding box used by
/// the grounded heuristic.
const GROUND_PROBE_DEPTH: f64 = 0.1;

/// The simulation context. See the module docs.
pub struct Scene {
    world: WorldHandler,
    actors: HashMap<ActorId, PhysicsHandler>,
    allocator: ActorAllocator,
    registry: CollisionRegistry,
    /// Bodies unmounted while the registry was detached for dispatch; their
    /// entries are purged from the detached registry before it is restored.
    retired_bodies: Vec<RigidBodyHandle>,
    pending_joints: Vec<PendingJoint>,
}

impl Scene {
    /// Create a scene with the given gravity vector.
    pub fn new(gravity_x: f64, gravity_y: f64) -> Self {
        Self {
            world: WorldHandler::new(gravity_x, gravity_y),
            actors: HashMap::new(),
            allocator: ActorAllocator::new(),
            registry: CollisionRegistry::default(),
            retired_bodies: Vec::new(),
            pending_joints: Vec::new(),
        }
    }

    // -- lifecycle ----------------------------------------------------------

    /// Create a detached actor from a record. The actor participates in the
    /// simulation only after [`Scene::mount`].
    pub fn create_actor(&mut self, record: PhysicsRecord) -> ActorId {
        let actor = self.allocator.allocate();
        self.actors.insert(actor, PhysicsHandler::Detached(record));
        actor
    }

    /// Create a group actor fanning operations out to the given members.
    pub fn create_group(&mut self, members: Vec<ActorId>) -> ActorId {
        let actor = self.allocator.allocate();
        self.actors.insert(actor, PhysicsHandler::Group(members));
        actor
    }

    /// Transfer a detached actor's state into a live simulation body.
    ///
    /// For a group, mounts every member that is not already live. Mounting
    /// also materializes any joints that were waiting for this actor.
    pub fn mount(&mut self, actor: ActorId) -> Result<(), PhysicsError> {
        let record = match self.handler_ref(actor)? {
            PhysicsHandler::Live(_) => return Err(PhysicsError::AlreadyMounted { actor }),
            PhysicsHandler::Group(members) => {
                let members = members.clone();
                for member in members {
                    if !self.allocator.is_alive(member) {
                        debug!(%member, "skipping removed group member");
                        continue;
                    }
                    if !self.is_mounted(member) {
                        self.mount(member)?;
                    }
                }
                return Ok(());
            }
            PhysicsHandler::Detached(record) => {
                if record.fixtures.is_empty() {
                    return Err(PhysicsError::NoFixtures { actor });
                }
                record.clone()
            }
        };
        let live = self.world.mount_record(actor, &record)?;
        self.actors.insert(actor, PhysicsHandler::Live(live));
        self.resolve_pending_joints();
        Ok(())
    }

    /// Snapshot a live actor's state back into a detached record. Joints
    /// attached to the body are destroyed with it; listener registrations die
    /// with the body too.
    ///
    /// Unmounting an already-detached actor logs a warning and is a no-op.
    pub fn unmount(&mut self, actor: ActorId) -> Result<(), PhysicsError> {
        let live = match self.handler_ref(actor)? {
            PhysicsHandler::Detached(_) => {
                warn!(%actor, "unmount called on an actor that is not mounted");
                return Ok(());
            }
            PhysicsHandler::Group(members) => {
                let members = members.clone();
                for member in members {
                    if self.allocator.is_alive(member) && self.is_mounted(member) {
                        self.unmount(member)?;
                    }
                }
                return Ok(());
            }
            PhysicsHandler::Live(live) => live.clone(),
        };
        let record = self.snapshot(&live);
        self.world.remove_live(&live);
        self.registry.remove_body(live.body);
        // During dispatch the real registry is detached; remember the body so
        // its entries get purged there too.
        self.retired_bodies.push(live.body);
        self.actors.insert(actor, PhysicsHandler::Detached(record));
        Ok(())
    }

    /// Remove an actor entirely: unmount if live, drop pending joints that
    /// reference it, and retire the id (outstanding handles become stale).
    ///
    /// Removing a group removes only the group actor, not its members.
    pub fn remove_actor(&mut self, actor: ActorId) -> Result<(), PhysicsError> {
        if !self.allocator.is_alive(actor) {
            return Err(PhysicsError::UnknownActor { actor });
        }
        if self.is_mounted(actor) {
            self.unmount(actor)?;
        }
        self.pending_joints
            .retain(|pj| pj.first != actor && pj.second != actor);
        self.actors.remove(&actor);
        self.allocator.deallocate(actor);
        Ok(())
    }

    /// Whether the actor is currently backed by a simulation body.
    pub fn is_mounted(&self, actor: ActorId) -> bool {
        matches!(self.actors.get(&actor), Some(PhysicsHandler::Live(_)))
    }

    /// Number of alive actors (including groups).
    pub fn actor_count(&self) -> usize {
        self.allocator.alive_count()
    }

    // -- stepping and dispatch ------------------------------------------------

    /// Advance the simulation by a wall-clock frame delta. Returns the
    /// contacts that began or ended; pass them to
    /// [`Scene::dispatch_contacts`] to run listeners.
    pub fn step(&mut self, frame_dt: f64) -> Vec<ContactNotice> {
        self.world.step(frame_dt)
    }

    /// Run collision listeners for a batch of contact notices.
    ///
    /// For each notice, matching specific-pair listeners run first, then
    /// general listeners of either body run symmetrically. Notices whose
    /// actors were removed since the step are skipped. Listeners receive
    /// `&mut Scene` and may register further listeners, apply forces, veto
    /// contacts, or unmount actors; such registrations are folded back into
    /// the registry afterwards.
    pub fn dispatch_contacts(&mut self, notices: &[ContactNotice]) {
        // The registry is detached for the duration of dispatch so listeners
        // can take &mut Scene.
        let mut registry = mem::take(&mut self.registry);
        for notice in notices {
            if !self.allocator.is_alive(notice.actor_lower)
                || !self.allocator.is_alive(notice.actor_higher)
            {
                debug!(
                    actor_lower = %notice.actor_lower,
                    actor_higher = %notice.actor_higher,
                    "contact notice references a removed actor, skipping"
                );
                continue;
            }

            if let Some(entries) = registry.specific.get_mut(&notice.body_lower) {
                for entry in entries.iter_mut() {
                    if entry.other == notice.body_higher {
                        let event = ContactEvent::new(notice.phase, entry.partner, notice.pair);
                        (entry.listener)(self, &event);
                    }
                }
            }

            for (body, partner) in [
                (notice.body_lower, notice.actor_higher),
                (notice.body_higher, notice.actor_lower),
            ] {
                if let Some(listeners) = registry.general.get_mut(&body) {
                    let event = ContactEvent::new(notice.phase, partner, notice.pair);
                    for listener in listeners.iter_mut() {
                        listener(self, &event);
                    }
                }
            }
        }
        // Listeners may have unmounted actors; those removals only reached
        // the (empty) live registry, so replay them against the detached one.
        for body in self.retired_bodies.drain(..) {
            registry.remove_body(body);
        }
        registry.merge(mem::take(&mut self.registry));
        self.registry = registry;
    }

    // -- listener registration ------------------------------------------------

    /// Register a pairwise listener for contacts between `actor` and `other`.
    ///
    /// The listener fires once per begin and once per end of each contact,
    /// regardless of which body rapier reports first; the event wraps
    /// `other`. Both actors must be mounted.
    pub fn on_collision_with<F>(
        &mut self,
        actor: ActorId,
        other: ActorId,
        listener: F,
    ) -> Result<(), PhysicsError>
    where
        F: FnMut(&mut Scene, &ContactEvent) + Send + 'static,
    {
        let body_a = self.live_body(actor, "on_collision_with")?;
        let body_b = self.live_body(other, "on_collision_with")?;
        let (lower, higher) = if body_a.into_raw_parts() <= body_b.into_raw_parts() {
            (body_a, body_b)
        } else {
            (body_b, body_a)
        };
        self.registry
            .register_pair(lower, higher, other, Box::new(listener));
        Ok(())
    }

    /// Register a broadcast listener firing for every contact `actor`
    /// participates in. The event wraps the actor on the other side. The
    /// actor must be mounted.
    pub fn on_collision<F>(&mut self, actor: ActorId, listener: F) -> Result<(), PhysicsError>
    where
        F: FnMut(&mut Scene, &ContactEvent) + Send + 'static,
    {
        let body = self.live_body(actor, "on_collision")?;
        self.registry.register_general(body, Box::new(listener));
        Ok(())
    }

    /// Total number of registered collision listeners.
    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    // -- contact veto ---------------------------------------------------------

    /// Suppress the physical resolution of a contact until the fixtures
    /// separate. Typically called from a listener with the event's pair.
    pub fn ignore_contact(&self, pair: ContactPair) {
        self.world.ignore_contact(pair);
    }

    /// Whether a contact is currently vetoed.
    pub fn is_contact_ignored(&self, pair: ContactPair) -> bool {
        self.world.is_contact_ignored(pair)
    }

    // -- transforms -----------------------------------------------------------

    /// Translate the actor by a delta.
    pub fn move_by(&mut self, actor: ActorId, dx: f64, dy: f64) -> Result<(), PhysicsError> {
        let body = match self.handler_mut(actor)? {
            PhysicsHandler::Detached(record) => {
                record.x += dx;
                record.y += dy;
                return Ok(());
            }
            PhysicsHandler::Group(members) => {
                let members = members.clone();
                for member in members {
                    if !self.allocator.is_alive(member) {
                        debug!(%member, "skipping removed group member");
                        continue;
                    }
                    self.move_by(member, dx, dy)?;
                }
                return Ok(());
            }
            PhysicsHandler::Live(live) => live.body,
        };
        self.world.translate_body(body, dx, dy);
        Ok(())
    }

    /// Rotate the actor by a delta in radians.
    pub fn rotate_by(&mut self, actor: ActorId, delta: f64) -> Result<(), PhysicsError> {
        let body = match self.handler_mut(actor)? {
            PhysicsHandler::Detached(record) => {
                record.rotation += delta;
                return Ok(());
            }
            PhysicsHandler::Group(members) => {
                let members = members.clone();
                for member in members {
                    if !self.allocator.is_alive(member) {
                        continue;
                    }
                    self.rotate_by(member, delta)?;
                }
                return Ok(());
            }
            PhysicsHandler::Live(live) => live.body,
        };
        self.world.rotate_body(body, delta);
        Ok(())
    }

    /// Current position. For a group, the first alive member's position.
    pub fn position(&self, actor: ActorId) -> Result<(f64, f64), PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Detached(record) => Ok((record.x, record.y)),
            PhysicsHandler::Live(live) => {
                let rb = self
                    .world
                    .bodies
                    .get(live.body)
                    .ok_or(PhysicsError::UnknownActor { actor })?;
                let t = rb.translation();
                Ok((t.x as f64, t.y as f64))
            }
            PhysicsHandler::Group(members) => {
                let member = self.first_member(actor, members)?;
                self.position(member)
            }
        }
    }

    /// Current rotation in radians.
    pub fn rotation(&self, actor: ActorId) -> Result<f64, PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Detached(record) => Ok(record.rotation),
            PhysicsHandler::Live(live) => {
                let rb = self
                    .world
                    .bodies
                    .get(live.body)
                    .ok_or(PhysicsError::UnknownActor { actor })?;
                Ok(rb.rotation().angle() as f64)
            }
            PhysicsHandler::Group(members) => {
                let member = self.first_member(actor, members)?;
                self.rotation(member)
            }
        }
    }

    /// Center of mass for a live actor, the record position when detached,
    /// the average of member centers for a group.
    pub fn center(&self, actor: ActorId) -> Result<(f64, f64), PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Detached(record) => Ok((record.x, record.y)),
            PhysicsHandler::Live(live) => {
                let rb = self
                    .world
                    .bodies
                    .get(live.body)
                    .ok_or(PhysicsError::UnknownActor { actor })?;
                let c = rb.center_of_mass();
                Ok((c.x as f64, c.y as f64))
            }
            PhysicsHandler::Group(members) => {
                let mut sum = (0.0, 0.0);
                let mut count = 0usize;
                for &member in members {
                    if !self.allocator.is_alive(member) {
                        continue;
                    }
                    let (x, y) = self.center(member)?;
                    sum.0 += x;
                    sum.1 += y;
                    count += 1;
                }
                if count == 0 {
                    return Err(PhysicsError::EmptyGroup { actor });
                }
                Ok((sum.0 / count as f64, sum.1 / count as f64))
            }
        }
    }

    /// Point containment against the actor's fixtures.
    pub fn contains(&self, actor: ActorId, x: f64, y: f64) -> Result<bool, PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Detached(record) => Ok(record.contains(x, y)),
            PhysicsHandler::Live(live) => Ok(self.world.body_contains_point(&live.colliders, x, y)),
            PhysicsHandler::Group(members) => {
                for &member in members {
                    if self.allocator.is_alive(member) && self.contains(member, x, y)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// The bounding half-extents of the actor's fixtures. For a group, the
    /// maximum over members.
    pub fn bounding_half_extents(&self, actor: ActorId) -> Result<(f64, f64), PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Detached(record) => Ok(record.bounding_half_extents()),
            PhysicsHandler::Live(live) => match self.world.body_aabb(&live.colliders) {
                Some(aabb) => Ok((
                    ((aabb.maxs.x - aabb.mins.x) / 2.0) as f64,
                    ((aabb.maxs.y - aabb.mins.y) / 2.0) as f64,
                )),
                None => Ok((0.0, 0.0)),
            },
            PhysicsHandler::Group(members) => {
                let mut hx = 0.0f64;
                let mut hy = 0.0f64;
                for &member in members {
                    if !self.allocator.is_alive(member) {
                        continue;
                    }
                    let (mx, my) = self.bounding_half_extents(member)?;
                    hx = hx.max(mx);
                    hy = hy.max(my);
                }
                Ok((hx, hy))
            }
        }
    }

    // -- material properties ----------------------------------------------------

    /// Global density.
    pub fn density(&self, actor: ActorId) -> Result<f64, PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Detached(record) => Ok(record.density),
            PhysicsHandler::Live(live) => Ok(live.density),
            PhysicsHandler::Group(members) => {
                let member = self.first_member(actor, members)?;
                self.density(member)
            }
        }
    }

    /// Set the global density. Fixtures carrying their own density override
    /// are left untouched.
    ///
    /// # Panics
    ///
    /// A non-positive density is a programming-contract violation and panics.
    pub fn set_density(&mut self, actor: ActorId, density: f64) -> Result<(), PhysicsError> {
        let targets = match self.handler_mut(actor)? {
            PhysicsHandler::Detached(record) => {
                record.set_density(density);
                return Ok(());
            }
            PhysicsHandler::Group(members) => {
                let members = members.clone();
                for member in members {
                    if !self.allocator.is_alive(member) {
                        continue;
                    }
                    self.set_density(member, density)?;
                }
                return Ok(());
            }
            PhysicsHandler::Live(live) => {
                assert!(
                    density > 0.0 && density.is_finite(),
                    "density must be strictly positive and finite, got {density}"
                );
                live.density = density;
                live.fixtures
                    .iter()
                    .zip(live.colliders.clone())
                    .filter(|(fixture, _)| fixture.density.is_none())
                    .map(|(_, handle)| handle)
                    .collect::<Vec<_>>()
            }
        };
        for handle in targets {
            if let Some(collider) = self.world.colliders.get_mut(handle) {
                collider.set_density(density as Real);
            }
        }
        Ok(())
    }

    /// Global friction coefficient.
    pub fn friction(&self, actor: ActorId) -> Result<f64, PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Detached(record) => Ok(record.friction),
            PhysicsHandler::Live(live) => Ok(live.friction),
            PhysicsHandler::Group(members) => {
                let member = self.first_member(actor, members)?;
                self.friction(member)
            }
        }
    }

    /// Set the global friction. Per-fixture overrides are left untouched.
    pub fn set_friction(&mut self, actor: ActorId, friction: f64) -> Result<(), PhysicsError> {
        let targets = match self.handler_mut(actor)? {
            PhysicsHandler::Detached(record) => {
                record.friction = friction;
                return Ok(());
            }
            PhysicsHandler::Group(members) => {
                let members = members.clone();
                for member in members {
                    if !self.allocator.is_alive(member) {
                        continue;
                    }
                    self.set_friction(member, friction)?;
                }
                return Ok(());
            }
            PhysicsHandler::Live(live) => {
                live.friction = friction;
                live.fixtures
                    .iter()
                    .zip(live.colliders.clone())
                    .filter(|(fixture, _)| fixture.friction.is_none())
                    .map(|(_, handle)| handle)
                    .collect::<Vec<_>>()
            }
        };
        for handle in targets {
            if let Some(collider) = self.world.colliders.get_mut(handle) {
                collider.set_friction(friction as Real);
            }
        }
        Ok(())
    }

    /// Global restitution.
    pub fn restitution(&self, actor: ActorId) -> Result<f64, PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Detached(record) => Ok(record.restitution),
            PhysicsHandler::Live(live) => Ok(live.restitution),
            PhysicsHandler::Group(members) => {
                let member = self.first_member(actor, members)?;
                self.restitution(member)
            }
        }
    }

    /// Set the global restitution. Per-fixture overrides are left untouched.
    pub fn set_restitution(&mut self, actor: ActorId, restitution: f64) -> Result<(), PhysicsError> {
        let targets = match self.handler_mut(actor)? {
            PhysicsHandler::Detached(record) => {
                record.restitution = restitution;
                return Ok(());
            }
            PhysicsHandler::Group(members) => {
                let members = members.clone();
                for member in members {
                    if !self.allocator.is_alive(member) {
                        continue;
                    }
                    self.set_restitution(member, restitution)?;
                }
                return Ok(());
            }
            PhysicsHandler::Live(live) => {
                live.restitution = restitution;
                live.fixtures
                    .iter()
                    .zip(live.colliders.clone())
                    .filter(|(fixture, _)| fixture.restitution.is_none())
                    .map(|(_, handle)| handle)
                    .collect::<Vec<_>>()
            }
        };
        for handle in targets {
            if let Some(collider) = self.world.colliders.get_mut(handle) {
                collider.set_restitution(restitution as Real);
            }
        }
        Ok(())
    }

    /// Solver-derived mass. Requires a mounted actor; for a group, the sum of
    /// member masses.
    pub fn mass(&self, actor: ActorId) -> Result<f64, PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Detached(_) => Err(PhysicsError::Detached { actor, op: "mass" }),
            PhysicsHandler::Live(live) => {
                let rb = self
                    .world
                    .bodies
                    .get(live.body)
                    .ok_or(PhysicsError::UnknownActor { actor })?;
                Ok(rb.mass() as f64)
            }
            PhysicsHandler::Group(members) => {
                let mut total = 0.0;
                for &member in members {
                    if !self.allocator.is_alive(member) {
                        continue;
                    }
                    total += self.mass(member)?;
                }
                Ok(total)
            }
        }
    }

    // -- velocities -------------------------------------------------------------

    /// Linear velocity. Requires a mounted actor; the detached record's
    /// stored velocity only takes effect at mount time.
    pub fn velocity(&self, actor: ActorId) -> Result<(f64, f64), PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Detached(_) => Err(PhysicsError::Detached {
                actor,
                op: "velocity",
            }),
            PhysicsHandler::Live(live) => {
                let rb = self
                    .world
                    .bodies
                    .get(live.body)
                    .ok_or(PhysicsError::UnknownActor { actor })?;
                let v = rb.linvel();
                Ok((v.x as f64, v.y as f64))
            }
            PhysicsHandler::Group(members) => {
                let member = self.first_member(actor, members)?;
                self.velocity(member)
            }
        }
    }

    /// Set the linear velocity (or the detached record's initial velocity).
    pub fn set_velocity(&mut self, actor: ActorId, vx: f64, vy: f64) -> Result<(), PhysicsError> {
        let body = match self.handler_mut(actor)? {
            PhysicsHandler::Detached(record) => {
                record.vx = vx;
                record.vy = vy;
                return Ok(());
            }
            PhysicsHandler::Group(members) => {
                let members = members.clone();
                for member in members {
                    if !self.allocator.is_alive(member) {
                        continue;
                    }
                    self.set_velocity(member, vx, vy)?;
                }
                return Ok(());
            }
            PhysicsHandler::Live(live) => live.body,
        };
        if let Some(rb) = self.world.bodies.get_mut(body) {
            rb.set_linvel(vector![vx as Real, vy as Real], true);
        }
        Ok(())
    }

    /// Angular velocity in radians per second. Requires a mounted actor.
    pub fn angular_velocity(&self, actor: ActorId) -> Result<f64, PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Detached(_) => Err(PhysicsError::Detached {
                actor,
                op: "angular_velocity",
            }),
            PhysicsHandler::Live(live) => {
                let rb = self
                    .world
                    .bodies
                    .get(live.body)
                    .ok_or(PhysicsError::UnknownActor { actor })?;
                Ok(rb.angvel() as f64)
            }
            PhysicsHandler::Group(members) => {
                let member = self.first_member(actor, members)?;
                self.angular_velocity(member)
            }
        }
    }

    /// Set the angular velocity (or the detached record's initial spin).
    pub fn set_angular_velocity(&mut self, actor: ActorId, omega: f64) -> Result<(), PhysicsError> {
        let body = match self.handler_mut(actor)? {
            PhysicsHandler::Detached(record) => {
                record.angular_velocity = omega;
                return Ok(());
            }
            PhysicsHandler::Group(members) => {
                let members = members.clone();
                for member in members {
                    if !self.allocator.is_alive(member) {
                        continue;
                    }
                    self.set_angular_velocity(member, omega)?;
                }
                return Ok(());
            }
            PhysicsHandler::Live(live) => live.body,
        };
        if let Some(rb) = self.world.bodies.get_mut(body) {
            rb.set_angvel(omega as Real, true);
        }
        Ok(())
    }

    /// Zero the linear and angular velocity.
    pub fn reset_movement(&mut self, actor: ActorId) -> Result<(), PhysicsError> {
        let body = match self.handler_mut(actor)? {
            PhysicsHandler::Detached(record) => {
                record.vx = 0.0;
                record.vy = 0.0;
                record.angular_velocity = 0.0;
                return Ok(());
            }
            PhysicsHandler::Group(members) => {
                let members = members.clone();
                for member in members {
                    if !self.allocator.is_alive(member) {
                        continue;
                    }
                    self.reset_movement(member)?;
                }
                return Ok(());
            }
            PhysicsHandler::Live(live) => live.body,
        };
        if let Some(rb) = self.world.bodies.get_mut(body) {
            rb.set_linvel(vector![0.0, 0.0], true);
            rb.set_angvel(0.0, true);
        }
        Ok(())
    }

    // -- forces and impulses --------------------------------------------------

    /// Apply a continuous force at the center of mass. Requires a mounted
    /// actor.
    pub fn apply_force(&mut self, actor: ActorId, fx: f64, fy: f64) -> Result<(), PhysicsError> {
        let body = self.live_or_fan_out(actor, "apply_force", |scene, member| {
            scene.apply_force(member, fx, fy)
        })?;
        if let Some(body) = body {
            if let Some(rb) = self.world.bodies.get_mut(body) {
                rb.add_force(vector![fx as Real, fy as Real], true);
            }
        }
        Ok(())
    }

    /// Apply a continuous force at a world-space point.
    pub fn apply_force_at_point(
        &mut self,
        actor: ActorId,
        fx: f64,
        fy: f64,
        px: f64,
        py: f64,
    ) -> Result<(), PhysicsError> {
        let body = self.live_or_fan_out(actor, "apply_force_at_point", |scene, member| {
            scene.apply_force_at_point(member, fx, fy, px, py)
        })?;
        if let Some(body) = body {
            if let Some(rb) = self.world.bodies.get_mut(body) {
                rb.add_force_at_point(
                    vector![fx as Real, fy as Real],
                    point![px as Real, py as Real],
                    true,
                );
            }
        }
        Ok(())
    }

    /// Apply a torque. On a detached actor this accumulates into the record's
    /// torque accumulator and takes effect once at mount time.
    pub fn apply_torque(&mut self, actor: ActorId, torque: f64) -> Result<(), PhysicsError> {
        let body = match self.handler_mut(actor)? {
            PhysicsHandler::Detached(record) => {
                record.torque += torque;
                return Ok(());
            }
            PhysicsHandler::Group(members) => {
                let members = members.clone();
                for member in members {
                    if !self.allocator.is_alive(member) {
                        continue;
                    }
                    self.apply_torque(member, torque)?;
                }
                return Ok(());
            }
            PhysicsHandler::Live(live) => live.body,
        };
        if let Some(rb) = self.world.bodies.get_mut(body) {
            rb.add_torque(torque as Real, true);
        }
        Ok(())
    }

    /// Apply an instantaneous impulse at the center of mass. Requires a
    /// mounted actor.
    pub fn apply_impulse(&mut self, actor: ActorId, ix: f64, iy: f64) -> Result<(), PhysicsError> {
        let body = self.live_or_fan_out(actor, "apply_impulse", |scene, member| {
            scene.apply_impulse(member, ix, iy)
        })?;
        if let Some(body) = body {
            if let Some(rb) = self.world.bodies.get_mut(body) {
                rb.apply_impulse(vector![ix as Real, iy as Real], true);
            }
        }
        Ok(())
    }

    /// Apply an instantaneous impulse at a world-space point.
    pub fn apply_impulse_at_point(
        &mut self,
        actor: ActorId,
        ix: f64,
        iy: f64,
        px: f64,
        py: f64,
    ) -> Result<(), PhysicsError> {
        let body = self.live_or_fan_out(actor, "apply_impulse_at_point", |scene, member| {
            scene.apply_impulse_at_point(member, ix, iy, px, py)
        })?;
        if let Some(body) = body {
            if let Some(rb) = self.world.bodies.get_mut(body) {
                rb.apply_impulse_at_point(
                    vector![ix as Real, iy as Real],
                    point![px as Real, py as Real],
                    true,
                );
            }
        }
        Ok(())
    }

    // -- category, locks, gravity ------------------------------------------------

    /// Current body category. For a group, the first alive member's category.
    pub fn category(&self, actor: ActorId) -> Result<BodyCategory, PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Detached(record) => Ok(record.category),
            PhysicsHandler::Live(live) => Ok(live.category),
            PhysicsHandler::Group(members) => {
                let member = self.first_member(actor, members)?;
                self.category(member)
            }
        }
    }

    /// Switch category, re-deriving body type, gravity scale, filter bits,
    /// and sensor flags. On a live actor this is forbidden mid-step.
    pub fn set_category(
        &mut self,
        actor: ActorId,
        category: BodyCategory,
    ) -> Result<(), PhysicsError> {
        let (body, colliders) = match self.handler_mut(actor)? {
            PhysicsHandler::Detached(record) => {
                record.set_category(category);
                return Ok(());
            }
            PhysicsHandler::Group(members) => {
                let members = members.clone();
                for member in members {
                    if !self.allocator.is_alive(member) {
                        continue;
                    }
                    self.set_category(member, category)?;
                }
                return Ok(());
            }
            PhysicsHandler::Live(live) => {
                live.category = category;
                (live.body, live.colliders.clone())
            }
        };
        self.world.set_body_category(body, &colliders, category);
        Ok(())
    }

    /// Whether rotation is locked.
    pub fn rotation_locked(&self, actor: ActorId) -> Result<bool, PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Detached(record) => Ok(record.rotation_locked),
            PhysicsHandler::Live(live) => Ok(live.rotation_locked),
            PhysicsHandler::Group(members) => {
                let member = self.first_member(actor, members)?;
                self.rotation_locked(member)
            }
        }
    }

    /// Lock or unlock rotation.
    pub fn set_rotation_locked(&mut self, actor: ActorId, locked: bool) -> Result<(), PhysicsError> {
        let body = match self.handler_mut(actor)? {
            PhysicsHandler::Detached(record) => {
                record.rotation_locked = locked;
                return Ok(());
            }
            PhysicsHandler::Group(members) => {
                let members = members.clone();
                for member in members {
                    if !self.allocator.is_alive(member) {
                        continue;
                    }
                    self.set_rotation_locked(member, locked)?;
                }
                return Ok(());
            }
            PhysicsHandler::Live(live) => {
                live.rotation_locked = locked;
                live.body
            }
        };
        if let Some(rb) = self.world.bodies.get_mut(body) {
            let axes = if locked {
                LockedAxes::ROTATION_LOCKED
            } else {
                LockedAxes::empty()
            };
            rb.set_locked_axes(axes, true);
        }
        Ok(())
    }

    /// Gravity scale.
    pub fn gravity_scale(&self, actor: ActorId) -> Result<f64, PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Detached(record) => Ok(record.gravity_scale),
            PhysicsHandler::Live(live) => {
                let rb = self
                    .world
                    .bodies
                    .get(live.body)
                    .ok_or(PhysicsError::UnknownActor { actor })?;
                Ok(rb.gravity_scale() as f64)
            }
            PhysicsHandler::Group(members) => {
                let member = self.first_member(actor, members)?;
                self.gravity_scale(member)
            }
        }
    }

    /// Override the gravity scale (the category default applies otherwise).
    pub fn set_gravity_scale(&mut self, actor: ActorId, scale: f64) -> Result<(), PhysicsError> {
        let body = match self.handler_mut(actor)? {
            PhysicsHandler::Detached(record) => {
                record.gravity_scale = scale;
                return Ok(());
            }
            PhysicsHandler::Group(members) => {
                let members = members.clone();
                for member in members {
                    if !self.allocator.is_alive(member) {
                        continue;
                    }
                    self.set_gravity_scale(member, scale)?;
                }
                return Ok(());
            }
            PhysicsHandler::Live(live) => live.body,
        };
        if let Some(rb) = self.world.bodies.get_mut(body) {
            rb.set_gravity_scale(scale as Real, true);
        }
        Ok(())
    }

    // -- queries --------------------------------------------------------------

    /// Grounded heuristic: true only for a mounted `Dynamic` actor with a
    /// `Static` actor immediately beneath its bounding box, tested via a thin
    /// probe rectangle spanning the bottom edge. A group is grounded if any
    /// member is.
    pub fn is_grounded(&self, actor: ActorId) -> Result<bool, PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Detached(_) => Err(PhysicsError::Detached {
                actor,
                op: "is_grounded",
            }),
            PhysicsHandler::Group(members) => {
                for &member in members {
                    if self.allocator.is_alive(member)
                        && self.is_mounted(member)
                        && self.is_grounded(member)?
                    {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            PhysicsHandler::Live(live) => {
                if live.category != BodyCategory::Dynamic {
                    return Ok(false);
                }
                let aabb = match self.world.body_aabb(&live.colliders) {
                    Some(aabb) => aabb,
                    None => return Ok(false),
                };
                let candidates = self.world.actors_in_region(
                    aabb.mins.x as f64,
                    aabb.mins.y as f64 - GROUND_PROBE_DEPTH,
                    aabb.maxs.x as f64,
                    aabb.mins.y as f64,
                );
                Ok(candidates.into_iter().any(|other| {
                    other != actor && self.category_of(other) == Some(BodyCategory::Static)
                }))
            }
        }
    }

    /// Actors whose fixtures intersect the axis-aligned region.
    pub fn actors_in_region(
        &self,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    ) -> Vec<ActorId> {
        self.world.actors_in_region(min_x, min_y, max_x, max_y)
    }

    /// Snapshot the actor's physical state as a detached record. Not defined
    /// for groups.
    pub fn export_state(&self, actor: ActorId) -> Result<PhysicsRecord, PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Detached(record) => Ok(record.clone()),
            PhysicsHandler::Live(live) => Ok(self.snapshot(live)),
            PhysicsHandler::Group(_) => Err(PhysicsError::GroupUnsupported {
                actor,
                op: "export_state",
            }),
        }
    }

    /// Borrow the world handler (diagnostics, sub-step counts).
    pub fn world(&self) -> &WorldHandler {
        &self.world
    }

    // -- joints -----------------------------------------------------------------

    /// Create a joint between two actors.
    ///
    /// Returns `Ok(Some(id))` when both actors are mounted and the joint was
    /// materialized. If either actor is still detached the request parks in
    /// the pending queue and materializes when the second actor mounts;
    /// returns `Ok(None)`. An unknown or group actor is a recoverable
    /// scripting mistake: a diagnostic is logged and `Ok(None)` is returned.
    pub fn joint(
        &mut self,
        first: ActorId,
        second: ActorId,
        spec: JointSpec,
    ) -> Result<Option<JointId>, PhysicsError> {
        for actor in [first, second] {
            if !self.allocator.is_alive(actor) {
                warn!(%actor, "joint refused: actor does not exist in this scene");
                return Ok(None);
            }
            if matches!(self.actors.get(&actor), Some(PhysicsHandler::Group(_))) {
                warn!(%actor, "joint refused: group actors cannot be jointed");
                return Ok(None);
            }
        }
        match (self.body_of(first), self.body_of(second)) {
            (Some(b1), Some(b2)) => {
                let handle = self.world.impulse_joints.insert(b1, b2, spec.build(), true);
                Ok(Some(JointId(handle)))
            }
            _ => {
                debug!(%first, %second, "joint deferred until both actors are mounted");
                self.pending_joints.push(PendingJoint {
                    first,
                    second,
                    spec,
                });
                Ok(None)
            }
        }
    }

    /// Create a damped-spring distance joint anchored at both centers.
    pub fn distance_joint(
        &mut self,
        first: ActorId,
        second: ActorId,
        rest_length: f64,
        stiffness: f64,
        damping: f64,
    ) -> Result<Option<JointId>, PhysicsError> {
        self.joint(
            first,
            second,
            JointSpec::Distance {
                local_anchor1: (0.0, 0.0),
                local_anchor2: (0.0, 0.0),
                rest_length,
                stiffness,
                damping,
            },
        )
    }

    /// Create a revolute (pin) joint with the given local anchors.
    pub fn revolute_joint(
        &mut self,
        first: ActorId,
        second: ActorId,
        local_anchor1: (f64, f64),
        local_anchor2: (f64, f64),
    ) -> Result<Option<JointId>, PhysicsError> {
        self.joint(
            first,
            second,
            JointSpec::Revolute {
                local_anchor1,
                local_anchor2,
            },
        )
    }

    /// Create a rope joint anchored at both centers.
    pub fn rope_joint(
        &mut self,
        first: ActorId,
        second: ActorId,
        max_length: f64,
    ) -> Result<Option<JointId>, PhysicsError> {
        self.joint(
            first,
            second,
            JointSpec::Rope {
                local_anchor1: (0.0, 0.0),
                local_anchor2: (0.0, 0.0),
                max_length,
            },
        )
    }

    /// Destroy a joint. Returns `false` if the joint no longer exists (e.g.
    /// it died with an unmounted actor).
    pub fn remove_joint(&mut self, joint: JointId) -> bool {
        self.world.impulse_joints.remove(joint.0, true).is_some()
    }

    /// Number of joint requests waiting for both actors to mount.
    pub fn pending_joint_count(&self) -> usize {
        self.pending_joints.len()
    }

    // -- internals --------------------------------------------------------------

    fn handler_ref(&self, actor: ActorId) -> Result<&PhysicsHandler, PhysicsError> {
        if !self.allocator.is_alive(actor) {
            return Err(PhysicsError::UnknownActor { actor });
        }
        self.actors
            .get(&actor)
            .ok_or(PhysicsError::UnknownActor { actor })
    }

    fn handler_mut(&mut self, actor: ActorId) -> Result<&mut PhysicsHandler, PhysicsError> {
        if !self.allocator.is_alive(actor) {
            return Err(PhysicsError::UnknownActor { actor });
        }
        self.actors
            .get_mut(&actor)
            .ok_or(PhysicsError::UnknownActor { actor })
    }

    fn live_body(&self, actor: ActorId, op: &'static str) -> Result<RigidBodyHandle, PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Live(live) => Ok(live.body),
            _ => Err(PhysicsError::Detached { actor, op }),
        }
    }

    /// Shared skeleton for live-only mutations with group fan-out: returns
    /// the body handle for a live actor, `None` after fanning out to a group,
    /// and the detached error otherwise.
    fn live_or_fan_out(
        &mut self,
        actor: ActorId,
        op: &'static str,
        mut fan: impl FnMut(&mut Scene, ActorId) -> Result<(), PhysicsError>,
    ) -> Result<Option<RigidBodyHandle>, PhysicsError> {
        match self.handler_ref(actor)? {
            PhysicsHandler::Detached(_) => Err(PhysicsError::Detached { actor, op }),
            PhysicsHandler::Live(live) => Ok(Some(live.body)),
            PhysicsHandler::Group(members) => {
                let members = members.clone();
                for member in members {
                    if !self.allocator.is_alive(member) {
                        debug!(%member, "skipping removed group member");
                        continue;
                    }
                    fan(self, member)?;
                }
                Ok(None)
            }
        }
    }

    fn first_member(&self, group: ActorId, members: &[ActorId]) -> Result<ActorId, PhysicsError> {
        members
            .iter()
            .copied()
            .find(|&m| self.allocator.is_alive(m))
            .ok_or(PhysicsError::EmptyGroup { actor: group })
    }

    fn body_of(&self, actor: ActorId) -> Option<RigidBodyHandle> {
        match self.actors.get(&actor) {
            Some(PhysicsHandler::Live(live)) => Some(live.body),
            _ => None,
        }
    }

    fn category_of(&self, actor: ActorId) -> Option<BodyCategory> {
        match self.actors.get(&actor) {
            Some(PhysicsHandler::Detached(record)) => Some(record.category),
            Some(PhysicsHandler::Live(live)) => Some(live.category),
            _ => None,
        }
    }

    fn snapshot(&self, live: &LiveBody) -> PhysicsRecord {
        let mut record = PhysicsRecord::new(live.category);
        record.fixtures = live.fixtures.clone();
        record.rotation_locked = live.rotation_locked;
        record.density = live.density;
        record.friction = live.friction;
        record.restitution = live.restitution;
        if let Some(rb) = self.world.bodies.get(live.body) {
            let t = rb.translation();
            record.x = t.x as f64;
            record.y = t.y as f64;
            record.rotation = rb.rotation().angle() as f64;
            let v = rb.linvel();
            record.vx = v.x as f64;
            record.vy = v.y as f64;
            record.angular_velocity = rb.angvel() as f64;
            record.gravity_scale = rb.gravity_scale() as f64;
        }
        record
    }

    /// Materialize pending joints whose actors are now both mounted. Requests
    /// referencing a removed actor are dropped; the rest stay parked.
    fn resolve_pending_joints(&mut self) {
        let pending = mem::take(&mut self.pending_joints);
        for pj in pending {
            match (self.body_of(pj.first), self.body_of(pj.second)) {
                (Some(b1), Some(b2)) => {
                    self.world
                        .impulse_joints
                        .insert(b1, b2, pj.spec.build(), true);
                }
                _ => {
                    if self.allocator.is_alive(pj.first) && self.allocator.is_alive(pj.second) {
                        self.pending_joints.push(pj);
                    } else {
                        debug!(
                            first = %pj.first,
                            second = %pj.second,
                            "dropping pending joint referencing a removed actor"
                        );
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
