use criterion::{black_box, criterion_group, criterion_main, Criterion};
use form_alignment::algorithms::{AlignmentMarkDetector, CorrespondenceMatcher, RotationSearch};
use form_alignment::config::RotationSearchConfig;
use form_alignment::pipeline::Point2;
use image::{GrayImage, Luma};

fn synthetic_form() -> GrayImage {
    let mut image = GrayImage::from_pixel(800, 1000, Luma([255]));
    for x in [40u32, 720] {
        for row in 0..8u32 {
            let y = 60 + row * 120;
            for yy in y..y + 40 {
                for xx in x..x + 40 {
                    image.put_pixel(xx, yy, Luma([0]));
                }
            }
        }
    }
    image
}

fn bench_mark_detection(c: &mut Criterion) {
    let form = synthetic_form();
    let detector = AlignmentMarkDetector::new();
    c.bench_function("detect_marks_800x1000", |b| {
        b.iter(|| detector.detect(black_box(&form)))
    });
}

fn bench_rotation_search(c: &mut Criterion) {
    let form = synthetic_form();
    let search = RotationSearch::new(AlignmentMarkDetector::new(), &RotationSearchConfig::default());
    c.bench_function("rotation_search_17_candidates", |b| {
        b.iter(|| search.search(black_box(&form), |_, _| {}))
    });
}

fn bench_correspondence(c: &mut Criterion) {
    let source: Vec<Point2> = (0..20)
        .map(|i| Point2::new((i % 2) as f64 * 680.0 + 60.0, (i / 2) as f64 * 90.0 + 80.0))
        .collect();
    let target: Vec<Point2> = source.iter().map(|p| Point2::new(p.x * 1.1 + 5.0, p.y * 0.95)).collect();
    let matcher = CorrespondenceMatcher::default();
    c.bench_function("greedy_match_20_marks", |b| {
        b.iter(|| matcher.match_points(black_box(&source), black_box(&target)))
    });
}

criterion_group!(benches, bench_mark_detection, bench_rotation_search, bench_correspondence);
criterion_main!(benches);
