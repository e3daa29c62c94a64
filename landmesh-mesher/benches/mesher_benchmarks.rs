//! Benchmarks for a full mesher cycle on a synthetic fronto-parallel wall

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use landmesh_core::{KeypointObservation, Pixel, Point3d, PointsWithIdMap, Pose3};
use landmesh_mesher::{BackendOutput, FrontendOutput, Mesher, MesherInput, MesherParams, PlaneSegmentationParams};
use rand::prelude::*;
use std::sync::Arc;

fn generate_wall_input(size: usize, seed: u64) -> MesherInput {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = PointsWithIdMap::with_capacity(size * size);
    let mut keypoints = Vec::with_capacity(size * size);
    let half = (size - 1) as f64 * 0.1;

    for y in 0..size {
        for x in 0..size {
            let id = (y * size + x) as i64;
            let point = Point3d::new(
                x as f64 * 0.2 - half + rng.gen_range(-0.01..0.01),
                y as f64 * 0.2 - half + rng.gen_range(-0.01..0.01),
                4.0 + rng.gen_range(-0.01..0.01),
            );
            let pixel = Pixel::new(200.0 * point.x / point.z + 376.0, 200.0 * point.y / point.z + 240.0);
            points.insert(id, point);
            keypoints.push(KeypointObservation::new(pixel, id));
        }
    }

    let frontend = Arc::new(FrontendOutput::new(0, keypoints));
    let backend = Arc::new(BackendOutput::new(0, Pose3::identity(), points));
    MesherInput::new(0, frontend, backend).expect("matching timestamps")
}

fn bench_spin_once(c: &mut Criterion) {
    let sizes = [10, 20, 40];

    let mut group = c.benchmark_group("mesher_spin_once");

    for &size in &sizes {
        let input = generate_wall_input(size, 42);

        group.bench_with_input(BenchmarkId::new("mesh_only", size * size), &input, |b, input| {
            let mut mesher = Mesher::new(MesherParams::default()).expect("valid params");
            b.iter(|| {
                let output = mesher.spin_once(black_box(input));
                black_box(output);
            });
        });

        group.bench_with_input(BenchmarkId::new("with_planes", size * size), &input, |b, input| {
            let params = MesherParams::default().with_plane_segmentation(PlaneSegmentationParams::default());
            let mut mesher = Mesher::new(params).expect("valid params");
            b.iter(|| {
                let output = mesher.spin_once(black_box(input));
                black_box(output);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_spin_once);
criterion_main!(benches);
