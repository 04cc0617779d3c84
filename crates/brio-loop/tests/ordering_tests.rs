//! Integration tests for the pipeline's ordering guarantee: no gameplay
//! callback runs concurrently with a physics step, and no step begins before
//! the previous frame's queue has drained.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use brio_loop::prelude::*;
use brio_physics::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Ordering guarantees
// ---------------------------------------------------------------------------

#[test]
fn callbacks_never_overlap_a_physics_step() {
    init_tracing();
    let in_step = Arc::new(AtomicBool::new(false));
    let violated = Arc::new(AtomicBool::new(false));

    let mut pipeline = FrameLoop::builder()
        .physics({
            let in_step = Arc::clone(&in_step);
            move |_| {
                in_step.store(true, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
                in_step.store(false, Ordering::SeqCst);
            }
        })
        .producer({
            let in_step = Arc::clone(&in_step);
            let violated = Arc::clone(&violated);
            move |ctx| {
                for _ in 0..4 {
                    let in_step = Arc::clone(&in_step);
                    let violated = Arc::clone(&violated);
                    ctx.queue
                        .push(Box::new(move || {
                            if in_step.load(Ordering::SeqCst) {
                                violated.store(true, Ordering::SeqCst);
                            }
                        }))
                        .unwrap();
                }
            }
        })
        .start()
        .unwrap();

    pipeline.run_frames(20).unwrap();
    pipeline.shutdown();
    assert!(
        !violated.load(Ordering::SeqCst),
        "a callback observed an in-flight physics step"
    );
}

/// The current frame's producer runs concurrently with the physics step, so
/// the invariant is per frame: by the time frame N steps, everything pushed
/// in frames < N has executed.
#[test]
fn queue_fully_drains_before_the_next_step_begins() {
    init_tracing();
    const FRAMES: u64 = 15;
    // One (pushed, executed) pair per frame.
    let ledger = Arc::new(Mutex::new(vec![(0usize, 0usize); FRAMES as usize]));
    let violated = Arc::new(AtomicBool::new(false));

    let mut pipeline = FrameLoop::builder()
        .physics({
            let ledger = Arc::clone(&ledger);
            let violated = Arc::clone(&violated);
            move |ctx| {
                let ledger = ledger.lock().unwrap();
                if ledger[..ctx.frame as usize]
                    .iter()
                    .any(|(pushed, executed)| pushed != executed)
                {
                    violated.store(true, Ordering::SeqCst);
                }
            }
        })
        .producer({
            let ledger = Arc::clone(&ledger);
            move |ctx| {
                let frame = ctx.frame as usize;
                for _ in 0..3 {
                    ledger.lock().unwrap()[frame].0 += 1;
                    let ledger = Arc::clone(&ledger);
                    ctx.queue
                        .push(Box::new(move || {
                            ledger.lock().unwrap()[frame].1 += 1;
                        }))
                        .unwrap();
                }
            }
        })
        .start()
        .unwrap();

    pipeline.run_frames(FRAMES).unwrap();
    pipeline.shutdown();

    assert!(
        !violated.load(Ordering::SeqCst),
        "a physics step began before an earlier frame's queue drained"
    );
    let ledger = ledger.lock().unwrap();
    assert!(
        ledger.iter().all(|(pushed, executed)| pushed == executed),
        "every frame's events must have executed by shutdown"
    );
}

// ---------------------------------------------------------------------------
// End-to-end with the physics crate
// ---------------------------------------------------------------------------

/// Drives a scene through the pipeline: the physics role steps and enqueues
/// the contact dispatch; a collision listener schedules a force. The force
/// must land in a frame after the one whose step produced the contact.
#[test]
fn listener_force_lands_in_a_later_frame_than_the_contact() {
    init_tracing();
    let scene = Arc::new(Mutex::new(Scene::new(0.0, 0.0)));
    let (ball, _wall) = {
        let mut scene = scene.lock().unwrap();
        let wall = scene.create_actor(
            PhysicsRecord::new(BodyCategory::Static)
                .at(2.5, 0.0)
                .with_shape(ShapeRecord::Box {
                    half_width: 0.5,
                    half_height: 5.0,
                }),
        );
        let mut record = PhysicsRecord::new(BodyCategory::Dynamic)
            .at(-2.0, 0.0)
            .with_shape(ShapeRecord::Circle { radius: 0.5 });
        record.vx = 4.0;
        let ball = scene.create_actor(record);
        scene.mount(wall).unwrap();
        scene.mount(ball).unwrap();
        scene
            .on_collision(ball, move |scene, event| {
                if event.phase == ContactPhase::Begin {
                    scene.apply_force(ball, 0.0, 500.0).unwrap();
                }
            })
            .unwrap();
        (ball, wall)
    };

    // Frame indices of interest, u64::MAX = not yet observed.
    let contact_frame = Arc::new(AtomicU64::new(u64::MAX));
    let lift_frame = Arc::new(AtomicU64::new(u64::MAX));

    let mut pipeline = FrameLoop::builder()
        .physics({
            let scene = Arc::clone(&scene);
            let contact_frame = Arc::clone(&contact_frame);
            let lift_frame = Arc::clone(&lift_frame);
            move |ctx| {
                let mut guard = scene.lock().unwrap();
                let notices = guard.step(1.0 / 60.0);

                let (_, vy) = guard.velocity(ball).unwrap();
                if vy > 1e-3 {
                    lift_frame.fetch_min(ctx.frame, Ordering::SeqCst);
                }
                if notices.iter().any(|n| n.phase == ContactPhase::Begin) {
                    contact_frame.fetch_min(ctx.frame, Ordering::SeqCst);
                }

                if !notices.is_empty() {
                    let scene = Arc::clone(&scene);
                    ctx.queue
                        .push(Box::new(move || {
                            scene.lock().unwrap().dispatch_contacts(&notices);
                        }))
                        .unwrap();
                }
            }
        })
        .producer(|_| {})
        .start()
        .unwrap();

    pipeline.run_frames(240).unwrap();
    pipeline.shutdown();

    let contact = contact_frame.load(Ordering::SeqCst);
    let lift = lift_frame.load(Ordering::SeqCst);
    assert_ne!(contact, u64::MAX, "the ball must reach the wall");
    assert_ne!(lift, u64::MAX, "the scheduled force must eventually land");
    assert!(
        lift > contact,
        "the force fired in frame {lift}, which must be after the contact frame {contact}"
    );
}
