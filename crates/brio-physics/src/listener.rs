//! Collision listener registries and contact event types.
//!
//! Two registries exist, mirroring the two registration surfaces:
//!
//! - the **specific-pair registry**, keyed by the *lower* body handle of an
//!   unordered pair (canonical order over the handle's raw `(index,
//!   generation)` parts -- a total order, so each pair is registered and
//!   looked up exactly once regardless of callback or argument order),
//! - the **general registry**, keyed by body, holding broadcast listeners
//!   that fire for every contact the body participates in.
//!
//! Dispatch order is a hard guarantee: for each begin/end contact, matching
//! specific listeners run first, then general listeners of either body run
//! symmetrically. Broadcast listeners may rely on specific listeners having
//! already vetoed the contact for this frame.
//!
//! Registration is rare (mount time); iteration happens on every contact.

use std::collections::HashMap;

use rapier2d::prelude::{ColliderHandle, RigidBodyHandle};

use crate::actor::ActorId;
use crate::scene::Scene;

// ---------------------------------------------------------------------------
// Contact event types
// ---------------------------------------------------------------------------

/// Which side of a contact's lifetime an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactPhase {
    /// The fixtures started touching.
    Begin,
    /// The fixtures separated.
    End,
}

/// An unordered pair of fixtures, stored in canonical order so that the same
/// physical contact always produces the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContactPair {
    pub(crate) first: ColliderHandle,
    pub(crate) second: ColliderHandle,
}

impl ContactPair {
    /// Build the canonical pair: the collider with the smaller raw
    /// `(index, generation)` comes first.
    pub(crate) fn new(a: ColliderHandle, b: ColliderHandle) -> Self {
        if a.into_raw_parts() <= b.into_raw_parts() {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    /// Whether either side of the pair is the given collider.
    pub(crate) fn involves(&self, collider: ColliderHandle) -> bool {
        self.first == collider || self.second == collider
    }
}

/// A contact resolved to actor identities, produced by the world handler
/// during a step and consumed by [`Scene::dispatch_contacts`].
///
/// The two actors are ordered by the canonical body order, not by which side
/// rapier happened to report first.
#[derive(Debug, Clone, Copy)]
pub struct ContactNotice {
    /// Begin or end.
    pub phase: ContactPhase,
    /// The fixture pair, for the ignore blacklist.
    pub pair: ContactPair,
    /// Body with the lower canonical order.
    pub(crate) body_lower: RigidBodyHandle,
    /// Body with the higher canonical order.
    pub(crate) body_higher: RigidBodyHandle,
    /// Actor owning `body_lower`.
    pub actor_lower: ActorId,
    /// Actor owning `body_higher`.
    pub actor_higher: ActorId,
}

/// The event handed to a collision listener. Wraps the *other* actor of the
/// contact from the listener's point of view.
#[derive(Debug, Clone, Copy)]
pub struct ContactEvent {
    /// Begin or end.
    pub phase: ContactPhase,
    /// The actor on the other side of the contact.
    pub partner: ActorId,
    pair: ContactPair,
}

impl ContactEvent {
    pub(crate) fn new(phase: ContactPhase, partner: ActorId, pair: ContactPair) -> Self {
        Self { phase, partner, pair }
    }

    /// The fixture pair of this contact. Pass to
    /// [`Scene::ignore_contact`] to veto the physical resolution.
    pub fn pair(&self) -> ContactPair {
        self.pair
    }
}

// ---------------------------------------------------------------------------
// Listener storage
// ---------------------------------------------------------------------------

/// A collision callback. Receives the scene (listeners routinely apply
/// forces, schedule vetoes, or mutate other actors) and the contact event.
pub type CollisionListener = Box<dyn FnMut(&mut Scene, &ContactEvent) + Send>;

/// One entry in the specific-pair registry, stored under the lower body.
pub(crate) struct PairEntry {
    /// The higher body of the pair.
    pub(crate) other: RigidBodyHandle,
    /// The actor the event wraps when this entry fires (the `other` argument
    /// given at registration time).
    pub(crate) partner: ActorId,
    /// The callback.
    pub(crate) listener: CollisionListener,
}

/// Specific-pair and general listener registries.
#[derive(Default)]
pub(crate) struct CollisionRegistry {
    /// Pairwise listeners keyed by the lower body of the pair.
    pub(crate) specific: HashMap<RigidBodyHandle, Vec<PairEntry>>,
    /// Broadcast listeners keyed by body.
    pub(crate) general: HashMap<RigidBodyHandle, Vec<CollisionListener>>,
}

impl CollisionRegistry {
    /// Register a pairwise listener under the canonical key.
    pub(crate) fn register_pair(
        &mut self,
        lower: RigidBodyHandle,
        higher: RigidBodyHandle,
        partner: ActorId,
        listener: CollisionListener,
    ) {
        self.specific.entry(lower).or_default().push(PairEntry {
            other: higher,
            partner,
            listener,
        });
    }

    /// Register a broadcast listener for a body.
    pub(crate) fn register_general(&mut self, body: RigidBodyHandle, listener: CollisionListener) {
        self.general.entry(body).or_default().push(listener);
    }

    /// Drop every entry keyed by or referencing `body`. Called on unmount so
    /// listener registrations die with their body.
    pub(crate) fn remove_body(&mut self, body: RigidBodyHandle) {
        self.specific.remove(&body);
        self.general.remove(&body);
        for entries in self.specific.values_mut() {
            entries.retain(|e| e.other != body);
        }
        self.specific.retain(|_, entries| !entries.is_empty());
    }

    /// Absorb registrations made while this registry was detached for
    /// dispatch (listeners may register further listeners).
    pub(crate) fn merge(&mut self, other: CollisionRegistry) {
        for (body, entries) in other.specific {
            self.specific.entry(body).or_default().extend(entries);
        }
        for (body, listeners) in other.general {
            self.general.entry(body).or_default().extend(listeners);
        }
    }

    /// Total number of registered listeners (both registries).
    pub(crate) fn len(&self) -> usize {
        self.specific.values().map(Vec::len).sum::<usize>()
            + self.general.values().map(Vec::len).sum::<usize>()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
