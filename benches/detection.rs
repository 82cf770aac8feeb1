use criterion::*;
use ndarray::{s, Array2};

use hotspot::{
    detect::{detect, ThresholdMode},
    validate::validate,
    DetectorParams, Frame,
};

/// 640x512 frame with a gradient background and a handful of
/// warm squares, placed by a seeded generator.
fn synthetic_frame(seed: &mut u64) -> Frame {
    let mut next = move || {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (*seed >> 33) as usize
    };
    let mut gray = Array2::from_shape_fn((512, 640), |(r, c)| 40. + 0.05 * (r + c) as f64);
    for _ in 0..6 {
        let (row, col) = (next() % 500, next() % 628);
        let side = 4 + next() % 8;
        let (r1, c1) = ((row + side).min(512), (col + side).min(640));
        gray.slice_mut(s![row..r1, col..c1]).fill(220.);
    }
    Frame::from_gray(gray)
}

fn detection(c: &mut Criterion) {
    let mut seed = 7;
    let frames: Vec<Frame> = (0..8).map(|_| synthetic_frame(&mut seed)).collect();

    c.bench_function("validate", |b| {
        let mut frames = frames.iter().cycle();
        b.iter(|| validate(frames.next().unwrap(), &Default::default()))
    });

    c.bench_function("detect_percentile", |b| {
        let mut frames = frames.iter().cycle();
        let params = DetectorParams::default();
        b.iter(|| detect(frames.next().unwrap(), &params))
    });

    c.bench_function("detect_sweep", |b| {
        let mut frames = frames.iter().cycle();
        let params = DetectorParams {
            mode: ThresholdMode::Sweep {
                max_percentile: 99.9,
                step: 0.2,
            },
            ..Default::default()
        };
        b.iter(|| detect(frames.next().unwrap(), &params))
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = detection
}

criterion_main!(benches);
