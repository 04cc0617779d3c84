//! Integration tests for the mount/unmount lifecycle, fixed-timestep
//! determinism, the grounded heuristic, particle filtering, and joints.

use brio_physics::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ball(x: f64, y: f64) -> PhysicsRecord {
    PhysicsRecord::new(BodyCategory::Dynamic)
        .at(x, y)
        .with_shape(ShapeRecord::Circle { radius: 0.5 })
}

fn static_box(x: f64, y: f64, hw: f64, hh: f64) -> PhysicsRecord {
    PhysicsRecord::new(BodyCategory::Static)
        .at(x, y)
        .with_shape(ShapeRecord::Box {
            half_width: hw,
            half_height: hh,
        })
}

// ---------------------------------------------------------------------------
// Mount / unmount round trip
// ---------------------------------------------------------------------------

#[test]
fn unmount_then_remount_preserves_observable_state() {
    init_tracing();
    let mut scene = Scene::new(0.0, 0.0);
    let actor = scene.create_actor(ball(1.0, 2.0));
    scene.mount(actor).unwrap();

    scene.move_by(actor, 3.0, -1.0).unwrap();
    scene.set_velocity(actor, 0.5, 0.25).unwrap();
    scene.set_angular_velocity(actor, 1.5).unwrap();
    let before = scene.export_state(actor).unwrap();

    scene.unmount(actor).unwrap();
    assert!(!scene.is_mounted(actor));
    scene.mount(actor).unwrap();

    let after = scene.export_state(actor).unwrap();
    assert!((after.x - before.x).abs() < 1e-6);
    assert!((after.y - before.y).abs() < 1e-6);
    assert!((after.vx - before.vx).abs() < 1e-6);
    assert!((after.vy - before.vy).abs() < 1e-6);
    assert!((after.angular_velocity - before.angular_velocity).abs() < 1e-6);
    assert_eq!(after.category, before.category);
}

#[test]
fn unmount_destroys_joints_and_listener_registrations() {
    init_tracing();
    let mut scene = Scene::new(0.0, 0.0);
    let a = scene.create_actor(ball(0.0, 0.0));
    let b = scene.create_actor(ball(2.0, 0.0));
    scene.mount(a).unwrap();
    scene.mount(b).unwrap();

    let joint = scene.distance_joint(a, b, 2.0, 100.0, 0.5).unwrap();
    assert!(joint.is_some());
    scene.on_collision_with(a, b, |_, _| {}).unwrap();
    scene.on_collision(a, |_, _| {}).unwrap();
    assert_eq!(scene.world().joint_count(), 1);
    assert_eq!(scene.listener_count(), 2);

    scene.unmount(a).unwrap();
    assert_eq!(scene.world().joint_count(), 0, "joints die with the body");
    assert_eq!(
        scene.listener_count(),
        0,
        "registrations die with the body"
    );
}

// ---------------------------------------------------------------------------
// Step determinism
// ---------------------------------------------------------------------------

/// The same total elapsed time split into different frame-delta sequences
/// yields the same sub-step count and the same final transforms.
#[test]
fn varying_frame_deltas_do_not_change_the_outcome() {
    init_tracing();
    let build = || {
        let mut scene = Scene::new(0.0, -9.81);
        let floor = scene.create_actor(static_box(0.0, 0.0, 20.0, 0.5));
        let bouncer = scene.create_actor(ball(0.0, 5.0));
        scene.mount(floor).unwrap();
        scene.mount(bouncer).unwrap();
        (scene, bouncer)
    };

    let (mut coarse, ball_a) = build();
    for _ in 0..60 {
        coarse.step(1.0 / 60.0);
    }

    let (mut fine, ball_b) = build();
    for _ in 0..120 {
        fine.step(1.0 / 120.0);
    }

    assert_eq!(coarse.world().substeps(), fine.world().substeps());
    let (xa, ya) = coarse.position(ball_a).unwrap();
    let (xb, yb) = fine.position(ball_b).unwrap();
    assert!(
        (xa - xb).abs() < 1e-6 && (ya - yb).abs() < 1e-6,
        "final transforms must match: ({xa}, {ya}) vs ({xb}, {yb})"
    );
}

// ---------------------------------------------------------------------------
// Grounded heuristic
// ---------------------------------------------------------------------------

#[test]
fn box_resting_on_static_ground_is_grounded() {
    init_tracing();
    let mut scene = Scene::new(0.0, -9.81);
    let ground = scene.create_actor(static_box(0.0, 0.0, 5.0, 0.5));
    // Bottom edge exactly on the ground's top edge: zero gap.
    let crate_box = scene.create_actor(
        PhysicsRecord::new(BodyCategory::Dynamic)
            .at(0.0, 1.0)
            .with_shape(ShapeRecord::Box {
                half_width: 0.5,
                half_height: 0.5,
            }),
    );
    scene.mount(ground).unwrap();
    scene.mount(crate_box).unwrap();
    assert!(scene.is_grounded(crate_box).unwrap());
}

#[test]
fn box_one_unit_above_ground_is_not_grounded() {
    init_tracing();
    let mut scene = Scene::new(0.0, 0.0);
    let ground = scene.create_actor(static_box(0.0, 0.0, 5.0, 0.5));
    let crate_box = scene.create_actor(
        PhysicsRecord::new(BodyCategory::Dynamic)
            .at(0.0, 2.0)
            .with_shape(ShapeRecord::Box {
                half_width: 0.5,
                half_height: 0.5,
            }),
    );
    scene.mount(ground).unwrap();
    scene.mount(crate_box).unwrap();
    assert!(!scene.is_grounded(crate_box).unwrap());
}

#[test]
fn grounded_requires_a_mounted_dynamic_actor() {
    init_tracing();
    let mut scene = Scene::new(0.0, 0.0);
    let detached = scene.create_actor(ball(0.0, 0.0));
    assert!(matches!(
        scene.is_grounded(detached),
        Err(PhysicsError::Detached { .. })
    ));

    let ground = scene.create_actor(static_box(0.0, 0.0, 5.0, 0.5));
    let marker = scene.create_actor(
        PhysicsRecord::new(BodyCategory::Kinematic)
            .at(0.0, 1.0)
            .with_shape(ShapeRecord::Box {
                half_width: 0.5,
                half_height: 0.5,
            }),
    );
    scene.mount(ground).unwrap();
    scene.mount(marker).unwrap();
    assert!(
        !scene.is_grounded(marker).unwrap(),
        "only Dynamic actors can be grounded"
    );
}

// ---------------------------------------------------------------------------
// Particle filtering
// ---------------------------------------------------------------------------

/// A particle passes through dynamic bodies without any contact, but still
/// collides with static geometry.
#[test]
fn particles_ignore_dynamic_bodies_but_hit_static_ones() {
    init_tracing();
    let mut scene = Scene::new(0.0, 0.0);

    let floor = scene.create_actor(static_box(0.0, -3.0, 10.0, 0.5));
    let blocker = scene.create_actor(
        PhysicsRecord::new(BodyCategory::Dynamic)
            .at(0.0, 0.0)
            .with_shape(ShapeRecord::Box {
                half_width: 2.0,
                half_height: 0.25,
            }),
    );
    let particle = {
        let mut record = PhysicsRecord::new(BodyCategory::Particle)
            .at(0.0, 3.0)
            .with_shape(ShapeRecord::Circle { radius: 0.25 });
        record.vy = -5.0;
        scene.create_actor(record)
    };
    scene.mount(floor).unwrap();
    scene.mount(blocker).unwrap();
    scene.mount(particle).unwrap();

    let partners = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let partners = std::sync::Arc::clone(&partners);
        scene
            .on_collision(particle, move |_, event| {
                if event.phase == ContactPhase::Begin {
                    partners.lock().unwrap().push(event.partner);
                }
            })
            .unwrap();
    }

    for _ in 0..180 {
        let notices = scene.step(1.0 / 60.0);
        scene.dispatch_contacts(&notices);
    }

    let partners = partners.lock().unwrap();
    assert!(
        partners.contains(&floor),
        "the particle must contact the static floor"
    );
    assert!(
        !partners.contains(&blocker),
        "the particle must pass through the dynamic blocker"
    );
}

// ---------------------------------------------------------------------------
// Region queries
// ---------------------------------------------------------------------------

#[test]
fn region_query_reports_overlapping_actors_once() {
    init_tracing();
    let mut scene = Scene::new(0.0, 0.0);
    let near = scene.create_actor(ball(1.0, 1.0));
    let far = scene.create_actor(ball(50.0, 50.0));
    // Two fixtures on one body must still report the actor once.
    let multi = scene.create_actor(
        PhysicsRecord::new(BodyCategory::Static)
            .at(2.0, 2.0)
            .with_shape(ShapeRecord::Circle { radius: 0.5 })
            .with_shape(ShapeRecord::Box {
                half_width: 0.5,
                half_height: 0.5,
            }),
    );
    scene.mount(near).unwrap();
    scene.mount(far).unwrap();
    scene.mount(multi).unwrap();

    let mut hits = scene.actors_in_region(0.0, 0.0, 3.0, 3.0);
    hits.sort();
    let mut expected = vec![near, multi];
    expected.sort();
    assert_eq!(hits, expected);
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

#[test]
fn mounting_a_group_mounts_every_member() {
    init_tracing();
    let mut scene = Scene::new(0.0, 0.0);
    let a = scene.create_actor(ball(0.0, 0.0));
    let b = scene.create_actor(ball(3.0, 0.0));
    let group = scene.create_group(vec![a, b]);

    scene.mount(group).unwrap();
    assert!(scene.is_mounted(a));
    assert!(scene.is_mounted(b));
    assert!(!scene.is_mounted(group), "the group itself owns no body");

    scene.unmount(group).unwrap();
    assert!(!scene.is_mounted(a));
    assert!(!scene.is_mounted(b));
}
