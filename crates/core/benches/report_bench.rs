#[path = "../tests/common/mod.rs"]
mod common;

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use ibextract_core::document::{DocConfig, Document};
use ibextract_core::forms::Report;
use ibextract_core::raster::Raster;
use ibextract_core::geometry::BBox;
use ibextract_core::rotation::{Rotation, RotationDetector, RotationParams};

use common::{EDGES, bill_rows, doc_of, page, with_vlines};

/// A ruled bill with `n` rows.
fn bill(n: usize) -> Document {
    let rows: Vec<[&str; 4]> = (0..n)
        .map(|i| match i % 3 {
            0 => ["01/02/2021", "PHARMACY", "1", "$10.00"],
            1 => ["01/03/2021", "LABORATORY", "2", "$22.50"],
            _ => ["01/04/2021", "RADIOLOGY", "1", "$310.00"],
        })
        .collect();
    let yrb = 110.0 + 20.0 * n as f64;
    doc_of(
        with_vlines(page(&bill_rows(&rows)), &EDGES, 100.0, yrb),
        DocConfig::new(),
    )
}

fn bench_report_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("report_run");
    for n in [10usize, 35] {
        let doc = Arc::new(bill(n));
        group.bench_with_input(BenchmarkId::from_parameter(n), &doc, |b, doc| {
            b.iter(|| {
                let mut r = Report::for_page(Arc::clone(doc), 0, None).expect("page");
                r.run();
                black_box(r.size())
            })
        });
    }
    group.finish();
}

fn bench_rotation(c: &mut Criterion) {
    let mut img = Raster::blank(1240, 1754);
    for i in 0..40 {
        let top = 80.0 + i as f64 * 40.0;
        let len = 400.0 + (i % 5) as f64 * 150.0;
        img.fill_rect(BBox::new(100.0, top, 100.0 + len, top + 14.0), 0);
    }
    let flipped = img.rotated(Rotation::Deg180);
    let detector = RotationDetector::with_defaults(&RotationParams::default(), None, None);
    c.bench_function("rotation_detect_a4", |b| {
        b.iter(|| black_box(detector.detect(black_box(&flipped))))
    });
}

criterion_group!(benches, bench_report_run, bench_rotation);
criterion_main!(benches);
