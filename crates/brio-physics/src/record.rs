//! The detached physical state record.
//!
//! A [`PhysicsRecord`] is a plain, value-like bundle of physical state that is
//! meaningful without any live simulation: position, rotation, velocities,
//! material properties, category, and the fixture descriptors from which
//! colliders are built at mount time. Actors carry a record while detached;
//! unmounting a live actor snapshots the body back into a record, so a
//! mount/unmount round trip preserves the observable state.

use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};

use crate::category::BodyCategory;
use crate::PhysicsError;

// ---------------------------------------------------------------------------
// ShapeRecord
// ---------------------------------------------------------------------------

/// The geometry of one fixture, centered on the actor origin unless offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeRecord {
    /// Axis-aligned box with half-extents.
    Box {
        /// Half-width along the local x-axis.
        half_width: f64,
        /// Half-height along the local y-axis.
        half_height: f64,
    },
    /// Circle with radius.
    Circle {
        /// Radius of the circle.
        radius: f64,
    },
    /// Convex polygon given as a vertex list in local coordinates.
    ///
    /// The vertices are run through a convex-hull pass at mount time; a
    /// degenerate list (fewer than three distinct points) is a checked error.
    Polygon {
        /// Vertices in local coordinates.
        vertices: Vec<(f64, f64)>,
    },
}

impl ShapeRecord {
    /// Build the rapier shape for this record.
    pub(crate) fn build(&self) -> Result<SharedShape, PhysicsError> {
        match self {
            ShapeRecord::Box {
                half_width,
                half_height,
            } => Ok(SharedShape::cuboid(
                *half_width as Real,
                *half_height as Real,
            )),
            ShapeRecord::Circle { radius } => Ok(SharedShape::ball(*radius as Real)),
            ShapeRecord::Polygon { vertices } => {
                let points: Vec<Point<Real>> = vertices
                    .iter()
                    .map(|(x, y)| point![*x as Real, *y as Real])
                    .collect();
                SharedShape::convex_hull(&points).ok_or_else(|| PhysicsError::DegenerateShape {
                    vertices: vertices.len(),
                })
            }
        }
    }

    /// Point containment in local (shape) coordinates.
    ///
    /// Used by the detached handler, which has no collider to query.
    pub(crate) fn contains_local(&self, x: f64, y: f64) -> bool {
        match self {
            ShapeRecord::Box {
                half_width,
                half_height,
            } => x.abs() <= *half_width && y.abs() <= *half_height,
            ShapeRecord::Circle { radius } => x * x + y * y <= radius * radius,
            ShapeRecord::Polygon { vertices } => {
                if vertices.len() < 3 {
                    return false;
                }
                // Convex containment: the point must be on the same side of
                // every edge. Works for either winding.
                let mut sign = 0.0f64;
                for i in 0..vertices.len() {
                    let (ax, ay) = vertices[i];
                    let (bx, by) = vertices[(i + 1) % vertices.len()];
                    let cross = (bx - ax) * (y - ay) - (by - ay) * (x - ax);
                    if cross.abs() < 1e-12 {
                        continue;
                    }
                    if sign == 0.0 {
                        sign = cross.signum();
                    } else if cross.signum() != sign {
                        return false;
                    }
                }
                true
            }
        }
    }

    /// The local-space half-extents of the shape's bounding box.
    pub(crate) fn half_extents(&self) -> (f64, f64) {
        match self {
            ShapeRecord::Box {
                half_width,
                half_height,
            } => (*half_width, *half_height),
            ShapeRecord::Circle { radius } => (*radius, *radius),
            ShapeRecord::Polygon { vertices } => {
                let mut hx = 0.0f64;
                let mut hy = 0.0f64;
                for (x, y) in vertices {
                    hx = hx.max(x.abs());
                    hy = hy.max(y.abs());
                }
                (hx, hy)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FixtureRecord
// ---------------------------------------------------------------------------

/// One fixture descriptor: a shape plus optional per-fixture material
/// overrides. Unset overrides fall back to the parent record's global values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureRecord {
    /// The fixture geometry.
    pub shape: ShapeRecord,
    /// Per-fixture density override.
    pub density: Option<f64>,
    /// Per-fixture friction override.
    pub friction: Option<f64>,
    /// Per-fixture restitution override.
    pub restitution: Option<f64>,
    /// Per-fixture sensor override (defaults to the category's sensor flag).
    pub sensor: Option<bool>,
}

impl FixtureRecord {
    /// A fixture with no overrides.
    pub fn new(shape: ShapeRecord) -> Self {
        Self {
            shape,
            density: None,
            friction: None,
            restitution: None,
            sensor: None,
        }
    }

    /// Density, falling back to the record's global value.
    pub fn resolved_density(&self, record: &PhysicsRecord) -> f64 {
        self.density.unwrap_or(record.density)
    }

    /// Friction, falling back to the record's global value.
    pub fn resolved_friction(&self, record: &PhysicsRecord) -> f64 {
        self.friction.unwrap_or(record.friction)
    }

    /// Restitution, falling back to the record's global value.
    pub fn resolved_restitution(&self, record: &PhysicsRecord) -> f64 {
        self.restitution.unwrap_or(record.restitution)
    }

    /// Sensor flag, falling back to the category default.
    pub fn resolved_sensor(&self, category: BodyCategory) -> bool {
        self.sensor.unwrap_or_else(|| category.is_sensor())
    }
}

// ---------------------------------------------------------------------------
// PhysicsRecord
// ---------------------------------------------------------------------------

/// Numeric physical state for an actor that is not (or not yet) part of a
/// running simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsRecord {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
    /// Rotation in radians.
    pub rotation: f64,
    /// Horizontal linear velocity.
    pub vx: f64,
    /// Vertical linear velocity.
    pub vy: f64,
    /// Angular velocity in radians per second.
    pub angular_velocity: f64,
    /// Torque accumulator, applied once at mount time and then consumed.
    pub torque: f64,
    /// Global density (per-fixture overrides win). Strictly positive.
    pub density: f64,
    /// Global friction coefficient.
    pub friction: f64,
    /// Global restitution (bounciness).
    pub restitution: f64,
    /// Whether rotation is locked.
    pub rotation_locked: bool,
    /// Gravity scale. Defaults to the category's fixed default.
    pub gravity_scale: f64,
    /// The body category.
    pub category: BodyCategory,
    /// Fixture descriptors. Mounting with an empty list is a checked error.
    pub fixtures: Vec<FixtureRecord>,
}

impl PhysicsRecord {
    /// A fresh record at the origin with no motion and no fixtures.
    pub fn new(category: BodyCategory) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            vx: 0.0,
            vy: 0.0,
            angular_velocity: 0.0,
            torque: 0.0,
            density: 10.0,
            friction: 0.5,
            restitution: 0.5,
            rotation_locked: false,
            gravity_scale: category.default_gravity_scale(),
            category,
            fixtures: Vec::new(),
        }
    }

    /// Builder-style position.
    pub fn at(mut self, x: f64, y: f64) -> Self {
        assert!(
            x.is_finite() && y.is_finite(),
            "actor position must be finite, got ({x}, {y})"
        );
        self.x = x;
        self.y = y;
        self
    }

    /// Builder-style fixture append.
    pub fn with_fixture(mut self, fixture: FixtureRecord) -> Self {
        self.fixtures.push(fixture);
        self
    }

    /// Builder-style shape append with no material overrides.
    pub fn with_shape(self, shape: ShapeRecord) -> Self {
        self.with_fixture(FixtureRecord::new(shape))
    }

    /// Set the global density.
    ///
    /// # Panics
    ///
    /// A non-positive density is a programming-contract violation and panics.
    pub fn set_density(&mut self, density: f64) {
        assert!(
            density > 0.0 && density.is_finite(),
            "density must be strictly positive and finite, got {density}"
        );
        self.density = density;
    }

    /// Switch category, re-deriving the gravity scale to the new category's
    /// fixed default. Filter bits and sensor flags are derived from the
    /// category at mount time (or immediately, for a live body).
    pub fn set_category(&mut self, category: BodyCategory) {
        self.category = category;
        self.gravity_scale = category.default_gravity_scale();
    }

    /// Point containment against the record's fixtures at the record's
    /// position and rotation.
    pub fn contains(&self, px: f64, py: f64) -> bool {
        // World -> local: translate, then rotate by -rotation.
        let dx = px - self.x;
        let dy = py - self.y;
        let (sin, cos) = (-self.rotation).sin_cos();
        let lx = dx * cos - dy * sin;
        let ly = dx * sin + dy * cos;
        self.fixtures.iter().any(|f| f.shape.contains_local(lx, ly))
    }

    /// The world-space bounding half-extents of all fixtures (rotation
    /// ignored; used for detached introspection only).
    pub fn bounding_half_extents(&self) -> (f64, f64) {
        let mut hx = 0.0f64;
        let mut hy = 0.0f64;
        for f in &self.fixtures {
            let (fx, fy) = f.shape.half_extents();
            hx = hx.max(fx);
            hy = hy.max(fy);
        }
        (hx, hy)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_uses_category_gravity_default() {
        assert_eq!(PhysicsRecord::new(BodyCategory::Dynamic).gravity_scale, 1.0);
        assert_eq!(PhysicsRecord::new(BodyCategory::Passive).gravity_scale, 0.0);
        assert_eq!(
            PhysicsRecord::new(BodyCategory::Particle).gravity_scale,
            0.0
        );
    }

    #[test]
    #[should_panic(expected = "density must be strictly positive")]
    fn zero_density_panics() {
        PhysicsRecord::new(BodyCategory::Dynamic).set_density(0.0);
    }

    #[test]
    #[should_panic(expected = "density must be strictly positive")]
    fn negative_density_panics() {
        PhysicsRecord::new(BodyCategory::Dynamic).set_density(-3.0);
    }

    #[test]
    fn set_category_rederives_gravity_scale() {
        let mut rec = PhysicsRecord::new(BodyCategory::Dynamic);
        rec.set_category(BodyCategory::Particle);
        assert_eq!(rec.gravity_scale, 0.0);
        rec.set_category(BodyCategory::Static);
        assert_eq!(rec.gravity_scale, 1.0);
    }

    #[test]
    fn fixture_overrides_fall_back_to_record() {
        let rec = PhysicsRecord::new(BodyCategory::Dynamic);
        let plain = FixtureRecord::new(ShapeRecord::Circle { radius: 1.0 });
        assert_eq!(plain.resolved_density(&rec), rec.density);
        assert_eq!(plain.resolved_friction(&rec), rec.friction);
        assert!(!plain.resolved_sensor(rec.category));

        let mut heavy = plain.clone();
        heavy.density = Some(99.0);
        heavy.sensor = Some(true);
        assert_eq!(heavy.resolved_density(&rec), 99.0);
        assert!(heavy.resolved_sensor(rec.category));
    }

    #[test]
    fn box_containment_respects_position_and_rotation() {
        let mut rec = PhysicsRecord::new(BodyCategory::Static).with_shape(ShapeRecord::Box {
            half_width: 2.0,
            half_height: 1.0,
        });
        rec.x = 10.0;
        rec.y = 5.0;
        assert!(rec.contains(11.5, 5.5));
        assert!(!rec.contains(10.0, 6.5));

        // Rotate 90 degrees: the long axis now points along y.
        rec.rotation = std::f64::consts::FRAC_PI_2;
        assert!(rec.contains(10.0, 6.5));
        assert!(!rec.contains(11.5, 5.5));
    }

    #[test]
    fn circle_containment() {
        let rec =
            PhysicsRecord::new(BodyCategory::Dynamic).with_shape(ShapeRecord::Circle { radius: 1.0 });
        assert!(rec.contains(0.5, 0.5));
        assert!(!rec.contains(1.0, 1.0));
    }

    #[test]
    fn polygon_containment() {
        let rec = PhysicsRecord::new(BodyCategory::Static).with_shape(ShapeRecord::Polygon {
            vertices: vec![(-1.0, -1.0), (1.0, -1.0), (0.0, 1.0)],
        });
        assert!(rec.contains(0.0, 0.0));
        assert!(!rec.contains(0.9, 0.9));
    }

    #[test]
    fn degenerate_polygon_is_checked_error() {
        let shape = ShapeRecord::Polygon {
            vertices: vec![(0.0, 0.0), (1.0, 0.0)],
        };
        assert!(shape.build().is_err());
    }

    #[test]
    fn record_round_trips_through_serde() {
        let rec = PhysicsRecord::new(BodyCategory::Particle)
            .at(3.0, 4.0)
            .with_shape(ShapeRecord::Circle { radius: 0.25 });
        let json = serde_json::to_string(&rec).unwrap();
        let back: PhysicsRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, back);
    }
}
