//! Synthetic room demo
//!
//! A camera walks along a room with a floor and a wall. A frontend thread
//! reports keypoints for every frame, a backend thread publishes the
//! optimized landmarks for every keyframe, and the mesher module meshes them
//! and segments planes on its own thread.

use anyhow::{anyhow, Result};
use clap::Parser;
use crossbeam_channel::{bounded, unbounded};
use landmesh_core::{
    pose_from_translation_rotation, transform_to, ImageSize, KeypointObservation, LandmarkId, Pixel,
    PlaneOrientation, Point3d, PointsWithIdMap, Pose3, Vector3d,
};
use landmesh_mesher::{HeightColorizer, MesherFactory, MesherParams, MesherType, PlaneSegmentationParams};
use landmesh_pipeline::{BackendOutput, FrontendOutput, MesherModule, PipelineModule};
use nalgebra::{Matrix3, Rotation3, UnitQuaternion};
use rand::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const FOCAL: f64 = 420.0;
const CAMERA_HEIGHT: f64 = 1.4;
const WALL_X: f64 = 3.0;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of frames to simulate
    #[arg(short, long, default_value_t = 40)]
    frames: usize,

    /// Every n-th frame is a keyframe optimized by the backend
    #[arg(short, long, default_value_t = 2)]
    keyframe_every: usize,

    /// Skip plane segmentation
    #[arg(long)]
    no_planes: bool,

    /// Run the mesher in step mode on the main thread
    #[arg(long)]
    sequential: bool,

    /// Landmark noise standard deviation in meters
    #[arg(long, default_value_t = 0.005)]
    noise: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Static landmarks on the floor and on the wall
struct Room {
    landmarks: Vec<(LandmarkId, Point3d)>,
}

impl Room {
    fn new(rng: &mut StdRng) -> Self {
        let mut landmarks = Vec::new();
        let mut next_id: LandmarkId = 0;
        let jitter = |rng: &mut StdRng| rng.gen_range(-0.04..0.04);

        // Floor
        for i in 0..12 {
            for j in 0..36 {
                let x = 0.6 + i as f64 * 0.2 + jitter(rng);
                let y = -2.0 + j as f64 * 0.2 + jitter(rng);
                landmarks.push((next_id, Point3d::new(x, y, 0.0)));
                next_id += 1;
            }
        }
        // Wall
        for j in 0..36 {
            for k in 0..13 {
                let y = -2.0 + j as f64 * 0.2 + jitter(rng);
                let z = 0.1 + k as f64 * 0.2 + jitter(rng);
                landmarks.push((next_id, Point3d::new(WALL_X, y, z)));
                next_id += 1;
            }
        }
        Self { landmarks }
    }
}

/// Camera walking along +y, looking at the wall and tilted towards the floor
fn camera_pose(frame: usize) -> Pose3 {
    let tilt = 25f64.to_radians();
    let forward = Vector3d::new(tilt.cos(), 0.0, -tilt.sin());
    let right = Vector3d::new(0.0, -1.0, 0.0);
    let down = forward.cross(&right);
    let rotation = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[right, down, forward]));
    pose_from_translation_rotation(
        Vector3d::new(0.0, frame as f64 * 0.05, CAMERA_HEIGHT),
        UnitQuaternion::from_rotation_matrix(&rotation),
    )
}

fn project(point_cam: &Point3d, img_size: &ImageSize) -> Option<Pixel> {
    if point_cam.z < 0.3 {
        return None;
    }
    let pixel = Pixel::new(
        FOCAL * point_cam.x / point_cam.z + img_size.width as f64 / 2.0,
        FOCAL * point_cam.y / point_cam.z + img_size.height as f64 / 2.0,
    );
    img_size.contains(&pixel).then_some(pixel)
}

/// Keypoints of every landmark in view, with a stereo estimate for each
fn observe(room: &Room, w_pose_cam: &Pose3, img_size: &ImageSize, noise: f64, rng: &mut StdRng) -> Vec<KeypointObservation> {
    room.landmarks
        .iter()
        .filter_map(|(id, point)| {
            let point_cam = transform_to(w_pose_cam, point);
            let pixel = project(&point_cam, img_size)?;
            let stereo = point_cam + Vector3d::new(0.0, 0.0, rng.gen_range(-noise..=noise) * 2.0);
            Some(KeypointObservation::new(pixel, *id).with_point_cam(stereo))
        })
        .collect()
}

/// Optimized landmarks of a keyframe. Every fifth landmark is left out of the
/// optimization and only known from stereo.
fn optimize(room: &Room, keypoints: &[KeypointObservation], noise: f64, rng: &mut StdRng) -> PointsWithIdMap {
    keypoints
        .iter()
        .filter_map(|keypoint| keypoint.lmk_id)
        .filter(|id| id % 5 != 0)
        .filter_map(|id| {
            let (_, point) = room.landmarks.get(id as usize)?;
            let offset = Vector3d::new(
                rng.gen_range(-noise..=noise),
                rng.gen_range(-noise..=noise),
                rng.gen_range(-noise..=noise),
            );
            Some((id, point + offset))
        })
        .collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("synthetic_room=info".parse()?))
        .init();

    let args = Args::parse();
    let keyframe_every = args.keyframe_every.max(1);
    let img_size = ImageSize::new(752, 480);
    let mut rng = StdRng::seed_from_u64(args.seed);
    let room = Arc::new(Room::new(&mut rng));
    info!(landmarks = room.landmarks.len(), frames = args.frames, "Built synthetic room");

    let mut params = MesherParams::new(Pose3::identity(), img_size);
    if !args.no_planes {
        params = params.with_plane_segmentation(PlaneSegmentationParams::default());
    }
    let mut mesher = MesherFactory::create_mesher(MesherType::Projective, params)?;
    mesher.set_viz_properties_provider(Box::new(HeightColorizer::default()));

    let mut module = MesherModule::new(!args.sequential, mesher);
    let (output_tx, output_rx) = unbounded();
    module.register_output_callback(move |output| {
        let _ = output_tx.send(output);
    });

    let frontend_queue = module.frontend_queue();
    let backend_queue = module.backend_queue();
    let handle = module.shutdown_handle();

    // The backend only optimizes keyframes the frontend already reported
    let (keyframe_tx, keyframe_rx) = bounded::<(usize, Vec<KeypointObservation>)>(4);

    let frontend_room = Arc::clone(&room);
    let noise = args.noise;
    let frames = args.frames;
    let seed = args.seed;
    let frontend = thread::spawn(move || {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
        for frame in 0..frames {
            let keypoints = observe(&frontend_room, &camera_pose(frame), &img_size, noise, &mut rng);
            let packet = FrontendOutput::new(frame as i64, keypoints.clone());
            if !frontend_queue.push(Arc::new(packet)) {
                break;
            }
            if frame % keyframe_every == 0 && keyframe_tx.send((frame, keypoints)).is_err() {
                break;
            }
        }
    });

    let backend_room = Arc::clone(&room);
    let backend = thread::spawn(move || {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(2));
        let mut published: usize = 0;
        for (frame, keypoints) in keyframe_rx {
            let points = optimize(&backend_room, &keypoints, noise, &mut rng);
            let packet = BackendOutput::new(frame as i64, camera_pose(frame), points);
            if !backend_queue.push(Arc::new(packet)) {
                break;
            }
            published += 1;
        }
        published
    });

    let join_producers = || -> Result<usize> {
        frontend.join().map_err(|_| anyhow!("frontend thread panicked"))?;
        let published = backend.join().map_err(|_| anyhow!("backend thread panicked"))?;
        info!(keyframes = published, "Producers done");
        Ok(published)
    };

    let mut received = 0;
    let published = if args.sequential {
        let published = join_producers()?;
        while module.has_work() {
            module.spin();
        }
        for output in output_rx.try_iter() {
            report(&output);
            received += 1;
        }
        module.shutdown();
        published
    } else {
        let worker = thread::spawn(move || module.spin());
        let published = join_producers()?;
        while received < published {
            match output_rx.recv_timeout(Duration::from_secs(5)) {
                Ok(output) => {
                    report(&output);
                    received += 1;
                }
                Err(e) => {
                    warn!(error = %e, received, "Stopped waiting for mesher output");
                    break;
                }
            }
        }
        handle.shutdown();
        worker.join().map_err(|_| anyhow!("mesher thread panicked"))?;
        published
    };

    info!(received, published, "Done");
    Ok(())
}

fn report(output: &landmesh_pipeline::MesherOutput) {
    let (horizontal, vertical) = output.planes.as_deref().map_or((0, 0), |planes| {
        let horizontal = planes
            .iter()
            .filter(|p| p.orientation == PlaneOrientation::Horizontal)
            .count();
        (horizontal, planes.len() - horizontal)
    });
    info!(
        timestamp = output.timestamp,
        triangles_2d = output.mesh_2d_for_viz.len(),
        kept_2d = output.mesh_2d_filtered_for_viz.len(),
        polygons = output.mesh_3d.polygon_count(),
        vertices = output.mesh_3d.vertex_count(),
        horizontal_planes = horizontal,
        vertical_planes = vertical,
        "Mesher output"
    );
}
