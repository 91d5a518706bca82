use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rtc_video_frame::frame::scale_plane_box;
use rtc_video_frame::I420Buffer;

/// Benchmark: CPU crop/scale of a 720p frame
///
/// Crops without scaling are views and should cost next to nothing; the
/// scaled paths run the box filter over every plane.

fn bench_scale_plane(c: &mut Criterion) {
    let mut group = c.benchmark_group("scale_plane_box");
    let src: Vec<u8> = (0..1280 * 720).map(|i| (i % 251) as u8).collect();

    group.bench_function("720p_to_360p", |b| {
        let mut dst = vec![0u8; 640 * 360];
        b.iter(|| {
            scale_plane_box(black_box(&src), 1280, 1280, 720, &mut dst, 640, 640, 360);
        });
    });

    group.bench_function("720p_to_1080p", |b| {
        let mut dst = vec![0u8; 1920 * 1080];
        b.iter(|| {
            scale_plane_box(black_box(&src), 1280, 1280, 720, &mut dst, 1920, 1920, 1080);
        });
    });

    group.finish();
}

fn bench_crop_and_scale(c: &mut Criterion) {
    let mut group = c.benchmark_group("i420_crop_and_scale");
    let buffer = I420Buffer::black(1280, 720).unwrap();

    group.bench_function("crop_view", |b| {
        b.iter(|| {
            let view = buffer.crop_and_scale(160, 90, 960, 540, 960, 540).unwrap();
            view.release().unwrap();
        });
    });

    group.bench_function("crop_and_downscale", |b| {
        b.iter(|| {
            let scaled = buffer.crop_and_scale(160, 90, 960, 540, 480, 270).unwrap();
            black_box(scaled.data_y().unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_scale_plane, bench_crop_and_scale);
criterion_main!(benches);
