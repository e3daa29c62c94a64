//! Integration tests for landmesh-pipeline
//!
//! These tests drive the mesher module from producer threads, the way the
//! frontend and backend feed it at runtime.

use crossbeam_channel::unbounded;
use landmesh_core::{KeypointObservation, Pixel, Point3d, PointsWithIdMap, Pose3};
use landmesh_mesher::{Mesher, MesherParams};
use landmesh_pipeline::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Three landmarks seen at pixels that form a well shaped triangle
fn create_test_packets(timestamp: i64) -> (Arc<FrontendOutput>, Arc<BackendOutput>) {
    let points = PointsWithIdMap::from([
        (1, Point3d::new(-0.1, -0.05, 2.0)),
        (2, Point3d::new(0.1, -0.05, 2.0)),
        (3, Point3d::new(0.0, 0.12, 2.0)),
    ]);
    let keypoints = vec![
        KeypointObservation::new(Pixel::new(356.0, 230.0), 1),
        KeypointObservation::new(Pixel::new(396.0, 230.0), 2),
        KeypointObservation::new(Pixel::new(376.0, 264.0), 3),
    ];
    (
        Arc::new(FrontendOutput::new(timestamp, keypoints)),
        Arc::new(BackendOutput::new(timestamp, Pose3::identity(), points)),
    )
}

fn create_module(parallel_run: bool) -> MesherModule {
    MesherModule::new(parallel_run, Mesher::new(MesherParams::default()).unwrap())
}

#[test]
fn test_parallel_module_processes_and_shuts_down() {
    let mut module = create_module(true);
    let (sender, receiver) = unbounded();
    module.register_output_callback(move |output| {
        let _ = sender.send(output);
    });

    let frontend_queue = module.frontend_queue();
    let backend_queue = module.backend_queue();
    let handle = module.shutdown_handle();
    let worker = thread::spawn(move || module.spin());

    for t in 1..=3 {
        let (frontend, backend) = create_test_packets(t);
        assert!(frontend_queue.push(frontend));
        assert!(backend_queue.push(backend));
    }

    let mut timestamps = Vec::new();
    for _ in 0..3 {
        let output = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(output.mesh_3d.polygon_count(), 1);
        timestamps.push(output.timestamp);
    }
    assert_eq!(timestamps, vec![1, 2, 3]);

    handle.shutdown();
    assert!(!worker.join().unwrap());
    assert!(handle.is_shutdown());
    assert!(!handle.is_working());
}

#[test]
fn test_shutdown_unblocks_idle_module() {
    let mut module = create_module(true);
    let handle = module.shutdown_handle();
    let worker = thread::spawn(move || module.spin());

    // Blocked on an empty backend queue
    thread::sleep(Duration::from_millis(50));
    handle.shutdown();
    assert!(!worker.join().unwrap());
}

#[test]
fn test_queue_shutdown_stops_parallel_module() {
    let mut module = create_module(true);
    let frontend_queue = module.frontend_queue();
    let backend_queue = module.backend_queue();
    let handle = module.shutdown_handle();
    let (done_tx, done_rx) = unbounded();
    let worker = thread::spawn(move || {
        let _ = done_tx.send(module.spin());
    });

    thread::sleep(Duration::from_millis(50));
    // Only the queues are stopped, the module flag is left alone
    frontend_queue.shutdown();
    backend_queue.shutdown();

    assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)), Ok(false));
    worker.join().unwrap();
    assert!(handle.is_shutdown());
    assert!(!handle.is_working());
}

#[test]
fn test_stale_frontend_packets_discarded_across_ticks() {
    let mut module = create_module(false);
    let (sender, receiver) = unbounded();
    module.register_output_callback(move |output| {
        let _ = sender.send(output.timestamp);
    });

    for t in [3, 4, 5, 6] {
        let (frontend, _) = create_test_packets(t);
        module.fill_frontend_queue(frontend);
    }
    let (_, backend_5) = create_test_packets(5);
    let (_, backend_6) = create_test_packets(6);
    module.fill_backend_queue(backend_5);
    module.fill_backend_queue(backend_6);

    assert!(module.has_work());
    assert!(module.spin());
    assert!(module.has_work());
    assert!(module.spin());
    assert!(!module.has_work());

    assert_eq!(receiver.try_iter().collect::<Vec<_>>(), vec![5, 6]);
    assert!(module.frontend_queue().is_empty());
    assert_eq!(module.mesher().mesh_3d().polygon_count(), 1);
}

#[test]
fn test_unmatched_backend_packet_produces_nothing() {
    let mut module = create_module(false);
    let (sender, receiver) = unbounded::<Arc<MesherOutput>>();
    module.register_output_callback(move |output| {
        let _ = sender.send(output);
    });

    let (frontend_3, _) = create_test_packets(3);
    let (frontend_4, _) = create_test_packets(4);
    let (_, backend_5) = create_test_packets(5);
    module.fill_frontend_queue(frontend_3);
    module.fill_frontend_queue(frontend_4);
    module.fill_backend_queue(backend_5);

    assert!(module.spin());
    assert!(receiver.try_recv().is_err());
    assert!(module.frontend_queue().is_empty());
}
