//! Joint descriptors and handles.
//!
//! A [`JointSpec`] is the numeric description of a constraint between two
//! actors. Joints can be requested while either actor is still detached: the
//! scene parks the request as a [`PendingJoint`] and materializes it when the
//! second actor mounts, so construction order does not matter.

use rapier2d::prelude::{
    GenericJoint, ImpulseJointHandle, Real, RevoluteJointBuilder, RopeJointBuilder,
    SpringJointBuilder,
};
use rapier2d::math::Point;
use serde::{Deserialize, Serialize};

use crate::actor::ActorId;

/// Handle of a materialized joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JointId(pub(crate) ImpulseJointHandle);

/// Numeric description of a two-body constraint. Anchors are in each body's
/// local space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JointSpec {
    /// A damped spring holding the anchors at a rest distance.
    Distance {
        /// Anchor on the first body, local space.
        local_anchor1: (f64, f64),
        /// Anchor on the second body, local space.
        local_anchor2: (f64, f64),
        /// Target distance between the anchors.
        rest_length: f64,
        /// Spring stiffness.
        stiffness: f64,
        /// Spring damping.
        damping: f64,
    },
    /// A pin: the anchors coincide, relative rotation stays free.
    Revolute {
        /// Anchor on the first body, local space.
        local_anchor1: (f64, f64),
        /// Anchor on the second body, local space.
        local_anchor2: (f64, f64),
    },
    /// An inextensible tether: the anchors may come closer but never drift
    /// further apart than the maximum length.
    Rope {
        /// Anchor on the first body, local space.
        local_anchor1: (f64, f64),
        /// Anchor on the second body, local space.
        local_anchor2: (f64, f64),
        /// Maximum distance between the anchors.
        max_length: f64,
    },
}

impl JointSpec {
    /// Build the rapier joint data for this spec.
    pub(crate) fn build(&self) -> GenericJoint {
        match *self {
            JointSpec::Distance {
                local_anchor1,
                local_anchor2,
                rest_length,
                stiffness,
                damping,
            } => SpringJointBuilder::new(
                rest_length as Real,
                stiffness as Real,
                damping as Real,
            )
            .local_anchor1(anchor(local_anchor1))
            .local_anchor2(anchor(local_anchor2))
            .build()
            .into(),
            JointSpec::Revolute {
                local_anchor1,
                local_anchor2,
            } => RevoluteJointBuilder::new()
                .local_anchor1(anchor(local_anchor1))
                .local_anchor2(anchor(local_anchor2))
                .build()
                .into(),
            JointSpec::Rope {
                local_anchor1,
                local_anchor2,
                max_length,
            } => RopeJointBuilder::new(max_length as Real)
                .local_anchor1(anchor(local_anchor1))
                .local_anchor2(anchor(local_anchor2))
                .build()
                .into(),
        }
    }
}

fn anchor((x, y): (f64, f64)) -> Point<Real> {
    Point::new(x as Real, y as Real)
}

/// A joint request waiting for both actors to be mounted.
#[derive(Debug, Clone)]
pub(crate) struct PendingJoint {
    pub(crate) first: ActorId,
    pub(crate) second: ActorId,
    pub(crate) spec: JointSpec,
}
