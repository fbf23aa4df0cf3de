use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use lasertag_image::{Image, ImageSize};
use lasertag_tracking::{NativeBackend, PointTracker, TrackerConfig};

fn frame_with_dot(size: ImageSize, cx: usize, cy: usize) -> Image<u8, 3> {
    let mut frame = Image::<u8, 3>::from_size_val(size, 0).unwrap();
    for y in cy - 8..=cy + 8 {
        for x in cx - 8..=cx + 8 {
            let (dx, dy) = (x as i32 - cx as i32, y as i32 - cy as i32);
            if dx * dx + dy * dy <= 64 {
                frame.set_pixel(x, y, 1, 255).unwrap();
            }
        }
    }
    frame
}

fn bench_process_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("ProcessFrame");

    for (width, height) in [(320, 240), (640, 480)].iter() {
        group.throughput(criterion::Throughput::Elements((*width * *height) as u64));

        let parameter_string = format!("{}x{}", width, height);
        let size = ImageSize {
            width: *width,
            height: *height,
        };

        // alternate two positions so the estimator keeps updating
        let frames = [
            frame_with_dot(size, width / 2, height / 2),
            frame_with_dot(size, width / 2 + 4, height / 2),
        ];

        for (name, config) in [
            ("color", TrackerConfig::default()),
            (
                "color_camshift",
                TrackerConfig {
                    use_camshift: true,
                    ..Default::default()
                },
            ),
        ] {
            let mut tracker = PointTracker::new(NativeBackend, config);
            tracker.init(*width, *height).unwrap();

            group.bench_with_input(
                BenchmarkId::new(name, &parameter_string),
                &frames,
                |b, frames| {
                    let mut i = 0;
                    b.iter(|| {
                        i += 1;
                        black_box(tracker.process_frame(&frames[i % 2])).unwrap();
                    })
                },
            );
        }

        // alternating dropouts run the optical flow path every other frame
        let blank = Image::<u8, 3>::from_size_val(size, 0).unwrap();
        let mut tracker = PointTracker::new(NativeBackend, TrackerConfig::default());
        tracker.init(*width, *height).unwrap();
        tracker.process_frame(&frames[0]).unwrap();

        group.bench_with_input(
            BenchmarkId::new("dropout", &parameter_string),
            &(&frames[0], &blank),
            |b, (dot, blank)| {
                b.iter(|| {
                    black_box(tracker.process_frame(dot)).unwrap();
                    black_box(tracker.process_frame(blank)).unwrap();
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_process_frame);
criterion_main!(benches);
