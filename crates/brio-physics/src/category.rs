//! Body categories and the collision filter table.
//!
//! Every actor belongs to exactly one [`BodyCategory`]. The category is a pure
//! function over three physical properties:
//!
//! 1. the rapier body type (fixed / dynamic / kinematic),
//! 2. the default gravity scale (0 for [`Passive`](BodyCategory::Passive) and
//!    [`Particle`](BodyCategory::Particle), 1 otherwise),
//! 3. the collision filter pair (membership bit, accepted mask) that decides
//!    which other categories a fixture may physically interact with.
//!
//! The filter policy for particles: a `Particle` collides only with `Static`
//! and `Kinematic` bodies -- never with `Dynamic` bodies, `Passive` sensors,
//! or other particles. This keeps large particle showers cheap: the broad
//! phase discards all particle-particle pairs before any narrow-phase work.

use rapier2d::prelude::{Group, InteractionGroups, RigidBodyType};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Filter bits
// ---------------------------------------------------------------------------

const BIT_STATIC: u32 = 1 << 0;
const BIT_DYNAMIC: u32 = 1 << 1;
const BIT_KINEMATIC: u32 = 1 << 2;
const BIT_PASSIVE: u32 = 1 << 3;
const BIT_PARTICLE: u32 = 1 << 4;

const MASK_ALL: u32 = BIT_STATIC | BIT_DYNAMIC | BIT_KINEMATIC | BIT_PASSIVE | BIT_PARTICLE;
const MASK_NO_PARTICLE: u32 = BIT_STATIC | BIT_DYNAMIC | BIT_KINEMATIC | BIT_PASSIVE;
const MASK_PARTICLE: u32 = BIT_STATIC | BIT_KINEMATIC;

// ---------------------------------------------------------------------------
// BodyCategory
// ---------------------------------------------------------------------------

/// How an actor participates in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyCategory {
    /// Immovable (walls, floors, platforms).
    Static,
    /// Fully simulated by the physics solver.
    Dynamic,
    /// Moved by game logic, ignored by the solver (moving platforms, paddles).
    Kinematic,
    /// Detects overlap but is excluded from force resolution (triggers).
    Passive,
    /// Cheap dynamic body that only collides with Static and Kinematic.
    Particle,
}

impl BodyCategory {
    /// The default gravity scale for freshly created actors of this category.
    pub fn default_gravity_scale(self) -> f64 {
        match self {
            BodyCategory::Passive | BodyCategory::Particle => 0.0,
            _ => 1.0,
        }
    }

    /// Whether fixtures of this category are sensors (overlap detection only).
    pub fn is_sensor(self) -> bool {
        matches!(self, BodyCategory::Passive)
    }

    /// The collision filter pair `(membership bit, accepted mask)`.
    ///
    /// Pure in the category: calling this any number of times yields the same
    /// pair, and the pair depends on nothing but `self`. The table is
    /// symmetric -- if A accepts B then B accepts A -- so rapier's two-sided
    /// group test never produces one-way contacts.
    pub fn filter(self) -> (u32, u32) {
        match self {
            BodyCategory::Static => (BIT_STATIC, MASK_ALL),
            BodyCategory::Dynamic => (BIT_DYNAMIC, MASK_NO_PARTICLE),
            BodyCategory::Kinematic => (BIT_KINEMATIC, MASK_ALL),
            BodyCategory::Passive => (BIT_PASSIVE, MASK_NO_PARTICLE),
            BodyCategory::Particle => (BIT_PARTICLE, MASK_PARTICLE),
        }
    }

    /// The filter pair as rapier [`InteractionGroups`].
    pub fn interaction_groups(self) -> InteractionGroups {
        let (membership, mask) = self.filter();
        InteractionGroups::new(
            Group::from_bits_truncate(membership),
            Group::from_bits_truncate(mask),
        )
    }

    /// The rapier body type backing this category.
    ///
    /// `Passive` and `Particle` are dynamic bodies with gravity scale 0 and
    /// restricted filters, not distinct rapier types.
    pub fn body_type(self) -> RigidBodyType {
        match self {
            BodyCategory::Static => RigidBodyType::Fixed,
            BodyCategory::Kinematic => RigidBodyType::KinematicVelocityBased,
            BodyCategory::Dynamic | BodyCategory::Passive | BodyCategory::Particle => {
                RigidBodyType::Dynamic
            }
        }
    }

    /// All categories, for exhaustive table tests.
    pub const ALL: [BodyCategory; 5] = [
        BodyCategory::Static,
        BodyCategory::Dynamic,
        BodyCategory::Kinematic,
        BodyCategory::Passive,
        BodyCategory::Particle,
    ];
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn accepts(a: BodyCategory, b: BodyCategory) -> bool {
        let (mem_a, mask_a) = a.filter();
        let (mem_b, mask_b) = b.filter();
        // rapier's two-sided test.
        (mem_a & mask_b) != 0 && (mem_b & mask_a) != 0
    }

    #[test]
    fn filter_table_is_symmetric() {
        for a in BodyCategory::ALL {
            for b in BodyCategory::ALL {
                assert_eq!(
                    accepts(a, b),
                    accepts(b, a),
                    "filter table must be symmetric for {a:?}/{b:?}"
                );
            }
        }
    }

    #[test]
    fn particles_collide_only_with_static_and_kinematic() {
        let p = BodyCategory::Particle;
        assert!(accepts(p, BodyCategory::Static));
        assert!(accepts(p, BodyCategory::Kinematic));
        assert!(!accepts(p, BodyCategory::Dynamic));
        assert!(!accepts(p, BodyCategory::Passive));
        assert!(!accepts(p, BodyCategory::Particle));
    }

    #[test]
    fn dynamic_collides_with_everything_but_particles() {
        let d = BodyCategory::Dynamic;
        assert!(accepts(d, BodyCategory::Static));
        assert!(accepts(d, BodyCategory::Dynamic));
        assert!(accepts(d, BodyCategory::Kinematic));
        assert!(accepts(d, BodyCategory::Passive));
        assert!(!accepts(d, BodyCategory::Particle));
    }

    #[test]
    fn gravity_scale_defaults() {
        assert_eq!(BodyCategory::Static.default_gravity_scale(), 1.0);
        assert_eq!(BodyCategory::Dynamic.default_gravity_scale(), 1.0);
        assert_eq!(BodyCategory::Kinematic.default_gravity_scale(), 1.0);
        assert_eq!(BodyCategory::Passive.default_gravity_scale(), 0.0);
        assert_eq!(BodyCategory::Particle.default_gravity_scale(), 0.0);
    }

    #[test]
    fn only_passive_is_sensor() {
        for cat in BodyCategory::ALL {
            assert_eq!(cat.is_sensor(), cat == BodyCategory::Passive);
        }
    }

    #[test]
    fn membership_bits_are_distinct() {
        let mut seen = 0u32;
        for cat in BodyCategory::ALL {
            let (membership, _) = cat.filter();
            assert_eq!(membership.count_ones(), 1, "{cat:?} must own one bit");
            assert_eq!(seen & membership, 0, "{cat:?} bit already taken");
            seen |= membership;
        }
    }
}
