//! The physics handler contract.
//!
//! Every actor owns exactly one [`PhysicsHandler`] at any time. The handler is
//! a sum type rather than a trait hierarchy: "this operation is not supported
//! in this variant" is an explicit, checked outcome
//! ([`PhysicsError::Detached`](crate::PhysicsError::Detached)) produced by
//! pattern matching, not a runtime surprise from a silent no-op override.
//!
//! Variant selection is the mount/unmount lifecycle decision:
//!
//! - `Detached` -- the actor is not part of a running world; all state lives
//!   in the numeric [`PhysicsRecord`]. Operations that require a live
//!   simulation (forces, impulses, velocity reads, the grounded test) are
//!   refused.
//! - `Live` -- the actor is backed by a rapier body. Ownership of the state
//!   transferred into the simulation at mount time; unmounting snapshots it
//!   back out via `export_state`.
//! - `Group` -- the actor fans operations out to member actors.
//!
//! The operations themselves are methods on [`Scene`](crate::scene::Scene),
//! because the `Live` variant needs the world and the `Group` variant needs
//! sibling actors.

use rapier2d::prelude::{ColliderHandle, RigidBodyHandle};

use crate::actor::ActorId;
use crate::category::BodyCategory;
use crate::record::{FixtureRecord, PhysicsRecord};

// ---------------------------------------------------------------------------
// LiveBody
// ---------------------------------------------------------------------------

/// The live variant's payload: handles into the rapier world plus the few
/// pieces of state rapier does not expose back (the fixture descriptors the
/// body was built from, and flags cached for `export_state`).
#[derive(Debug, Clone)]
pub struct LiveBody {
    /// The rapier rigid body.
    pub(crate) body: RigidBodyHandle,
    /// All colliders attached to the body, one per fixture descriptor.
    pub(crate) colliders: Vec<ColliderHandle>,
    /// Current category. Kept here because rapier only stores the derived
    /// body type and filter bits.
    pub(crate) category: BodyCategory,
    /// The fixture descriptors the colliders were built from, replayed into
    /// the record on unmount.
    pub(crate) fixtures: Vec<FixtureRecord>,
    /// Whether rotation is locked (rapier exposes no getter for this).
    pub(crate) rotation_locked: bool,
    /// Global density. Colliders only store the override-resolved values, so
    /// the global is cached here for snapshots.
    pub(crate) density: f64,
    /// Global friction, cached like `density`.
    pub(crate) friction: f64,
    /// Global restitution, cached like `density`.
    pub(crate) restitution: f64,
}

// ---------------------------------------------------------------------------
// PhysicsHandler
// ---------------------------------------------------------------------------

/// The per-actor handler variant. See the module docs for the contract.
pub enum PhysicsHandler {
    /// Not mounted: state lives in the record.
    Detached(PhysicsRecord),
    /// Mounted: state lives in the rapier body.
    Live(LiveBody),
    /// Fan-out to member actors.
    Group(Vec<ActorId>),
}

impl PhysicsHandler {
    /// A short name for diagnostics.
    pub fn variant_name(&self) -> &'static str {
        match self {
            PhysicsHandler::Detached(_) => "detached",
            PhysicsHandler::Live(_) => "live",
            PhysicsHandler::Group(_) => "group",
        }
    }

    /// Whether the actor is currently backed by a simulation body.
    pub fn is_live(&self) -> bool {
        matches!(self, PhysicsHandler::Live(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_names() {
        let d = PhysicsHandler::Detached(PhysicsRecord::new(BodyCategory::Dynamic));
        assert_eq!(d.variant_name(), "detached");
        assert!(!d.is_live());
        let g = PhysicsHandler::Group(Vec::new());
        assert_eq!(g.variant_name(), "group");
    }
}
