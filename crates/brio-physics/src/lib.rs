//! Brio physics -- the actor/physics binding at the core of the engine.
//!
//! This crate binds game-visible actors to an embedded rapier2d simulation:
//!
//! - a [`PhysicsRecord`](record::PhysicsRecord) holds numeric physical state
//!   for actors that are not part of a running world,
//! - a [`PhysicsHandler`](handler::PhysicsHandler) sum type selects between
//!   the detached record, a live rapier body, and a group that fans out to
//!   member actors,
//! - a [`WorldHandler`](world::WorldHandler) owns the rapier world, maps
//!   bodies to actor identities, steps the simulation with a fixed-timestep
//!   accumulator, and reports contacts,
//! - a [`Scene`](scene::Scene) is the explicit context object that owns all
//!   of the above plus the collision listener registries and joint factories.
//!   There is no ambient global state; everything flows through the scene.
//!
//! # Quick Start
//!
//! ```
//! use brio_physics::prelude::*;
//!
//! let mut scene = Scene::new(0.0, -9.81);
//! let ball = scene.create_actor(
//!     PhysicsRecord::new(BodyCategory::Dynamic)
//!         .at(0.0, 10.0)
//!         .with_shape(ShapeRecord::Circle { radius: 0.5 }),
//! );
//! scene.mount(ball).unwrap();
//!
//! let notices = scene.step(1.0 / 60.0);
//! scene.dispatch_contacts(&notices);
//! let (_, y) = scene.position(ball).unwrap();
//! assert!(y < 10.0, "ball should fall");
//! ```

#![deny(unsafe_code)]

pub mod actor;
pub mod category;
pub mod handler;
pub mod joint;
pub mod listener;
pub mod record;
pub mod scene;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by physics operations.
///
/// These are the *recoverable* outcomes: scripting mistakes that a running
/// game survives. Programming-contract violations (mutating a body while the
/// world is mid-step, non-positive density, non-finite deltas) panic instead;
/// they indicate a bug, not a runtime condition.
#[derive(Debug, thiserror::Error)]
pub enum PhysicsError {
    /// The operation requires a live simulation body, but the actor is
    /// detached (not mounted into a world).
    #[error("operation '{op}' requires a mounted actor, but {actor} is detached")]
    Detached {
        /// The detached actor.
        actor: actor::ActorId,
        /// The operation that was attempted.
        op: &'static str,
    },

    /// The actor id is stale or belongs to another scene.
    #[error("actor {actor} does not exist in this scene (stale or foreign id)")]
    UnknownActor {
        /// The unknown actor.
        actor: actor::ActorId,
    },

    /// The actor is already mounted; the detached -> live transfer happens
    /// exactly once.
    #[error("actor {actor} is already mounted")]
    AlreadyMounted {
        /// The offending actor.
        actor: actor::ActorId,
    },

    /// Mounting requires at least one fixture descriptor.
    #[error("actor {actor} has no fixtures and cannot be mounted")]
    NoFixtures {
        /// The offending actor.
        actor: actor::ActorId,
    },

    /// A read operation on a group with no members has no defined value.
    #[error("group {actor} has no members")]
    EmptyGroup {
        /// The empty group.
        actor: actor::ActorId,
    },

    /// The operation has no meaningful fan-out for a group actor.
    #[error("operation '{op}' cannot be applied to group {actor}")]
    GroupUnsupported {
        /// The group actor.
        actor: actor::ActorId,
        /// The operation that was attempted.
        op: &'static str,
    },

    /// A polygon fixture could not produce a convex shape.
    #[error("polygon fixture with {vertices} vertices has no convex hull")]
    DegenerateShape {
        /// Number of vertices supplied.
        vertices: usize,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::actor::ActorId;
    pub use crate::category::BodyCategory;
    pub use crate::joint::{JointId, JointSpec};
    pub use crate::listener::{ContactEvent, ContactNotice, ContactPair, ContactPhase};
    pub use crate::record::{FixtureRecord, PhysicsRecord, ShapeRecord};
    pub use crate::scene::Scene;
    pub use crate::world::{WorldHandler, SUB_STEP};
    pub use crate::PhysicsError;
}
