//! The world handler: one rapier2d simulation instance plus the bookkeeping
//! that binds it to actor identities.
//!
//! Responsibilities:
//!
//! - body/collider creation from a [`PhysicsRecord`] at mount time and
//!   destruction at unmount, maintaining the bidirectional body<->actor maps,
//! - fixed-timestep stepping: wall-clock frame deltas are fed into an
//!   accumulator and the pipeline advances in [`SUB_STEP`]-sized increments,
//!   so the solver sees identical sub-step sequences regardless of frame-rate
//!   jitter,
//! - contact collection: rapier's begin/end collision events are resolved to
//!   actors and returned as [`ContactNotice`]s in canonical, deterministic
//!   order (rapier's channel delivery order may vary across runs),
//! - the contact-ignore blacklist, consulted by a rapier
//!   [`PhysicsHooks`] impl that clears the solver contacts of blacklisted
//!   pairs before the solver runs -- the pre-solve veto. Because the contact
//!   itself stays "touching", the entry is retired only when the fixtures
//!   actually separate,
//! - bounded-region queries over collider bounding boxes.
//!
//! # Mid-step guard
//!
//! Mutating body transforms, categories, or fixtures while a step is in
//! progress is a fatal contract violation: the guarded mutators panic if the
//! `mid_step` flag is raised. Callers must defer such mutations to the
//! inter-step window (the frame pipeline's dispatch phase).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use rapier2d::parry::bounding_volume::{Aabb, BoundingVolume};
use rapier2d::prelude::*;
use tracing::debug;

use crate::actor::ActorId;
use crate::category::BodyCategory;
use crate::handler::LiveBody;
use crate::listener::{ContactNotice, ContactPair, ContactPhase};
use crate::record::PhysicsRecord;
use crate::PhysicsError;

/// Fixed sub-step duration in seconds. 120 Hz: a 60 Hz frame advances the
/// solver exactly twice.
pub const SUB_STEP: f64 = 1.0 / 120.0;

/// Slack for the accumulator comparison so that frame deltas which are exact
/// multiples of [`SUB_STEP`] in real arithmetic also are in floating point.
const ACCUMULATOR_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Ignore blacklist hook
// ---------------------------------------------------------------------------

/// Shared contact-ignore set. Writers are listeners scheduling a veto (rare);
/// the reader is the solver hook, once per touching pair per sub-step.
type IgnoreSet = Arc<RwLock<HashSet<ContactPair>>>;

/// Pre-solve hook that suppresses the physical resolution of blacklisted
/// contacts. Clearing the solver contacts (instead of filtering the pair out
/// entirely) keeps the contact "touching", so begin/end events are unaffected
/// and the blacklist entry retires exactly when the fixtures separate.
struct IgnoreHooks {
    ignored: IgnoreSet,
}

impl PhysicsHooks for IgnoreHooks {
    fn modify_solver_contacts(&self, context: &mut ContactModificationContext) {
        let pair = ContactPair::new(context.collider1, context.collider2);
        let ignored = self
            .ignored
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if ignored.contains(&pair) {
            context.solver_contacts.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// WorldHandler
// ---------------------------------------------------------------------------

/// Owns one rapier2d world and maps its bodies to actor identities.
pub struct WorldHandler {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_params: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    pub(crate) bodies: RigidBodySet,
    pub(crate) colliders: ColliderSet,
    pub(crate) impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    /// rapier body -> actor.
    body_to_actor: HashMap<RigidBodyHandle, ActorId>,
    /// actor -> rapier body.
    actor_to_body: HashMap<ActorId, RigidBodyHandle>,
    /// collider -> actor, for contact resolution.
    collider_to_actor: HashMap<ColliderHandle, ActorId>,
    /// Contacts whose resolution is suppressed until separation.
    ignored: IgnoreSet,
    /// Unconsumed fraction of wall-clock time, in seconds.
    accumulator: f64,
    /// Total sub-steps executed, for determinism checks and diagnostics.
    substeps: u64,
    /// Raised while the pipeline is stepping. Guarded mutators panic on it.
    mid_step: bool,
}

impl WorldHandler {
    /// Create a world with the given gravity vector.
    pub fn new(gravity_x: f64, gravity_y: f64) -> Self {
        let mut integration_params = IntegrationParameters::default();
        integration_params.dt = SUB_STEP as Real;
        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: vector![gravity_x as Real, gravity_y as Real],
            integration_params,
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            body_to_actor: HashMap::new(),
            actor_to_body: HashMap::new(),
            collider_to_actor: HashMap::new(),
            ignored: Arc::new(RwLock::new(HashSet::new())),
            accumulator: 0.0,
            substeps: 0,
            mid_step: false,
        }
    }

    // -- mount / unmount ------------------------------------------------------

    /// Build a rapier body and colliders from a record and register the
    /// body<->actor mapping. The record is not consumed; the caller keeps the
    /// fixture descriptors inside the returned [`LiveBody`].
    pub(crate) fn mount_record(
        &mut self,
        actor: ActorId,
        record: &PhysicsRecord,
    ) -> Result<LiveBody, PhysicsError> {
        self.assert_inter_step("mount");

        // Build all shapes up front so a degenerate fixture fails before
        // anything is inserted.
        let mut shapes = Vec::with_capacity(record.fixtures.len());
        for fixture in &record.fixtures {
            shapes.push(fixture.shape.build()?);
        }

        let locked_axes = if record.rotation_locked {
            LockedAxes::ROTATION_LOCKED
        } else {
            LockedAxes::empty()
        };
        let rb = RigidBodyBuilder::new(record.category.body_type())
            .translation(vector![record.x as Real, record.y as Real])
            .rotation(record.rotation as Real)
            .linvel(vector![record.vx as Real, record.vy as Real])
            .angvel(record.angular_velocity as Real)
            .gravity_scale(record.gravity_scale as Real)
            .locked_axes(locked_axes)
            .build();
        let body = self.bodies.insert(rb);

        // The torque accumulator is applied once and consumed.
        if record.torque != 0.0 {
            if let Some(rb) = self.bodies.get_mut(body) {
                rb.add_torque(record.torque as Real, true);
            }
        }

        let groups = record.category.interaction_groups();
        let mut colliders = Vec::with_capacity(shapes.len());
        for (fixture, shape) in record.fixtures.iter().zip(shapes) {
            let collider = ColliderBuilder::new(shape)
                .density(fixture.resolved_density(record) as Real)
                .friction(fixture.resolved_friction(record) as Real)
                .restitution(fixture.resolved_restitution(record) as Real)
                .sensor(fixture.resolved_sensor(record.category))
                .collision_groups(groups)
                .active_events(ActiveEvents::COLLISION_EVENTS)
                .active_hooks(ActiveHooks::MODIFY_SOLVER_CONTACTS)
                .build();
            let handle = self
                .colliders
                .insert_with_parent(collider, body, &mut self.bodies);
            self.collider_to_actor.insert(handle, actor);
            colliders.push(handle);
        }

        self.body_to_actor.insert(body, actor);
        self.actor_to_body.insert(actor, body);

        Ok(LiveBody {
            body,
            colliders,
            category: record.category,
            fixtures: record.fixtures.clone(),
            rotation_locked: record.rotation_locked,
            density: record.density,
            friction: record.friction,
            restitution: record.restitution,
        })
    }

    /// Remove a live body: erase the mappings, drop the body with its
    /// colliders and attached joints, and purge blacklist entries that
    /// reference its fixtures.
    pub(crate) fn remove_live(&mut self, live: &LiveBody) {
        self.assert_inter_step("unmount");
        if let Some(actor) = self.body_to_actor.remove(&live.body) {
            self.actor_to_body.remove(&actor);
        }
        for handle in &live.colliders {
            self.collider_to_actor.remove(handle);
        }
        self.bodies.remove(
            live.body,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true, // remove attached colliders
        );
        self.ignored
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|pair| !live.colliders.iter().any(|c| pair.involves(*c)));
    }

    // -- stepping ---------------------------------------------------------

    /// Advance the simulation by a wall-clock frame delta.
    ///
    /// The delta is added to the accumulator and the pipeline steps in fixed
    /// [`SUB_STEP`] increments while a full sub-step is available; the
    /// remainder carries over to the next frame. Returns the contacts that
    /// began or ended, resolved to actors, in deterministic order.
    ///
    /// # Panics
    ///
    /// Panics if `frame_dt` is negative or not finite.
    pub fn step(&mut self, frame_dt: f64) -> Vec<ContactNotice> {
        assert!(
            frame_dt.is_finite() && frame_dt >= 0.0,
            "frame delta must be finite and non-negative, got {frame_dt}"
        );
        self.accumulator += frame_dt;
        let mut notices = Vec::new();
        while self.accumulator + ACCUMULATOR_EPSILON >= SUB_STEP {
            self.accumulator -= SUB_STEP;
            self.sub_step(&mut notices);
        }
        if self.accumulator < 0.0 {
            self.accumulator = 0.0;
        }
        notices
    }

    fn sub_step(&mut self, notices: &mut Vec<ContactNotice>) {
        let (collision_send, collision_recv) =
            rapier2d::crossbeam::channel::unbounded::<CollisionEvent>();
        let (force_send, _force_recv) =
            rapier2d::crossbeam::channel::unbounded::<ContactForceEvent>();
        let event_handler = ChannelEventCollector::new(collision_send, force_send);
        let hooks = IgnoreHooks {
            ignored: Arc::clone(&self.ignored),
        };

        self.mid_step = true;
        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None, // query pipeline (region queries scan collider AABBs directly)
            &hooks,
            &event_handler,
        );
        self.mid_step = false;
        self.substeps += 1;

        let mut fresh = Vec::new();
        while let Ok(event) = collision_recv.try_recv() {
            let (c1, c2, phase) = match event {
                CollisionEvent::Started(c1, c2, _) => (c1, c2, ContactPhase::Begin),
                CollisionEvent::Stopped(c1, c2, _) => (c1, c2, ContactPhase::End),
            };
            let pair = ContactPair::new(c1, c2);

            // Separated fixtures retire their veto automatically.
            if phase == ContactPhase::End {
                self.ignored
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&pair);
            }

            if let Some(notice) = self.resolve_notice(phase, pair, c1, c2) {
                fresh.push(notice);
            }
        }

        // rapier's channel delivery order may vary across runs; sorting the
        // sub-step's batch keeps contact sequences identical given the same
        // simulation state.
        fresh.sort_by_key(|n| {
            (
                n.pair.first.into_raw_parts(),
                n.pair.second.into_raw_parts(),
                n.phase == ContactPhase::End,
            )
        });
        notices.extend(fresh);
    }

    /// Resolve a collider pair to actors and canonical body order. A missing
    /// mapping means the actor was removed asynchronously -- an expected race
    /// under deferred removal, skipped silently.
    fn resolve_notice(
        &self,
        phase: ContactPhase,
        pair: ContactPair,
        c1: ColliderHandle,
        c2: ColliderHandle,
    ) -> Option<ContactNotice> {
        let (actor1, actor2) = match (
            self.collider_to_actor.get(&c1),
            self.collider_to_actor.get(&c2),
        ) {
            (Some(a), Some(b)) => (*a, *b),
            _ => {
                debug!(phase = ?phase, "contact references a removed actor, skipping");
                return None;
            }
        };
        let body1 = self.colliders.get(c1)?.parent()?;
        let body2 = self.colliders.get(c2)?.parent()?;

        let (body_lower, body_higher, actor_lower, actor_higher) =
            if body1.into_raw_parts() <= body2.into_raw_parts() {
                (body1, body2, actor1, actor2)
            } else {
                (body2, body1, actor2, actor1)
            };

        Some(ContactNotice {
            phase,
            pair,
            body_lower,
            body_higher,
            actor_lower,
            actor_higher,
        })
    }

    // -- guarded mutators ---------------------------------------------------

    fn assert_inter_step(&self, op: &str) {
        assert!(
            !self.mid_step,
            "'{op}' must not run while the simulation world is mid-step; \
             defer the mutation to the inter-step window"
        );
    }

    /// Translate a body by a delta. Fatal if the world is mid-step.
    pub(crate) fn translate_body(&mut self, handle: RigidBodyHandle, dx: f64, dy: f64) {
        self.assert_inter_step("move_by");
        if let Some(rb) = self.bodies.get_mut(handle) {
            let t = *rb.translation();
            rb.set_translation(vector![t.x + dx as Real, t.y + dy as Real], true);
        }
    }

    /// Rotate a body by a delta in radians. Fatal if the world is mid-step.
    pub(crate) fn rotate_body(&mut self, handle: RigidBodyHandle, delta: f64) {
        self.assert_inter_step("rotate_by");
        if let Some(rb) = self.bodies.get_mut(handle) {
            let angle = rb.rotation().angle() + delta as Real;
            rb.set_rotation(Rotation::new(angle), true);
        }
    }

    /// Re-derive body type, gravity scale, filter bits, and sensor flags for
    /// a category change. Fatal if the world is mid-step.
    pub(crate) fn set_body_category(
        &mut self,
        handle: RigidBodyHandle,
        colliders: &[ColliderHandle],
        category: BodyCategory,
    ) {
        self.assert_inter_step("set_category");
        if let Some(rb) = self.bodies.get_mut(handle) {
            rb.set_body_type(category.body_type(), true);
            rb.set_gravity_scale(category.default_gravity_scale() as Real, true);
        }
        let groups = category.interaction_groups();
        for &handle in colliders {
            if let Some(collider) = self.colliders.get_mut(handle) {
                collider.set_collision_groups(groups);
                collider.set_sensor(category.is_sensor());
            }
        }
    }

    // -- contact veto -------------------------------------------------------

    /// Suppress the physical resolution of a contact until the fixtures
    /// separate. Safe to call at any time, including from listeners.
    pub fn ignore_contact(&self, pair: ContactPair) {
        self.ignored
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pair);
    }

    /// Whether a contact is currently blacklisted.
    pub fn is_contact_ignored(&self, pair: ContactPair) -> bool {
        self.ignored
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&pair)
    }

    // -- lookups and queries --------------------------------------------------

    /// The actor owning a body, if any.
    pub fn actor_of_body(&self, handle: RigidBodyHandle) -> Option<ActorId> {
        self.body_to_actor.get(&handle).copied()
    }

    /// The live body of an actor, if mounted.
    pub fn body_of_actor(&self, actor: ActorId) -> Option<RigidBodyHandle> {
        self.actor_to_body.get(&actor).copied()
    }

    /// Actors whose colliders intersect the axis-aligned region.
    pub fn actors_in_region(
        &self,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    ) -> Vec<ActorId> {
        let region = Aabb::new(
            point![min_x as Real, min_y as Real],
            point![max_x as Real, max_y as Real],
        );
        let mut found: Vec<ActorId> = Vec::new();
        for (handle, collider) in self.colliders.iter() {
            if collider.compute_aabb().intersects(&region) {
                if let Some(&actor) = self.collider_to_actor.get(&handle) {
                    if !found.contains(&actor) {
                        found.push(actor);
                    }
                }
            }
        }
        found.sort();
        found
    }

    /// The world-space bounding box of a body's colliders.
    pub(crate) fn body_aabb(&self, colliders: &[ColliderHandle]) -> Option<Aabb> {
        let mut result: Option<Aabb> = None;
        for handle in colliders {
            let aabb = self.colliders.get(*handle)?.compute_aabb();
            match result.as_mut() {
                Some(total) => total.merge(&aabb),
                None => result = Some(aabb),
            }
        }
        result
    }

    /// Point containment against a body's collider shapes.
    pub(crate) fn body_contains_point(&self, colliders: &[ColliderHandle], x: f64, y: f64) -> bool {
        let point = point![x as Real, y as Real];
        colliders.iter().any(|handle| {
            self.colliders
                .get(*handle)
                .map(|c| c.shape().contains_point(c.position(), &point))
                .unwrap_or(false)
        })
    }

    // -- accessors ----------------------------------------------------------

    /// Number of live bodies.
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of joints.
    pub fn joint_count(&self) -> usize {
        self.impulse_joints.len()
    }

    /// Total sub-steps executed so far.
    pub fn substeps(&self) -> u64 {
        self.substeps
    }

    /// Whether the world is currently inside a pipeline step.
    pub fn is_mid_step(&self) -> bool {
        self.mid_step
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
