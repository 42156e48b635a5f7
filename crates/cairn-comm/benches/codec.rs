//! Pack/unpack throughput for boundary-strip-shaped sub-ranges.
//!
//! Packing throughput dominates boundary-exchange latency at scale, so
//! the inner loop must stay a contiguous slice copy. These benchmarks
//! cover the two shapes that matter: the contiguous-row case (x2/x3
//! faces) and the strided worst case (an x1 face, one element per row).

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use cairn_comm::codec::{pack_vars, range_len, unpack_vars};
use cairn_mesh::{CellRange, VarArray4};

fn numbered(nvar: usize, n: usize) -> VarArray4 {
    let mut a = VarArray4::new(nvar, n, n, n);
    for (pos, v) in a.as_mut_slice().iter_mut().enumerate() {
        *v = pos as f64;
    }
    a
}

fn bench_pack_face_strips(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack_face_strip");

    for &n in &[16usize, 32, 64] {
        let src = numbered(4, n);
        let vr = CellRange::new(0, 3);
        let full = CellRange::new(0, n - 1);
        let ghost = CellRange::new(0, 1);

        // x3 face: inner x1 rows fully contiguous.
        group.bench_with_input(BenchmarkId::new("x3_face", n), &n, |b, _| {
            let mut buf = vec![0.0; range_len(vr, ghost, full, full)];
            b.iter(|| {
                let mut off = 0;
                pack_vars(&src, &mut buf, vr, ghost, full, full, &mut off);
                black_box(off);
            });
        });

        // x1 face: two elements per row, worst-case stride.
        group.bench_with_input(BenchmarkId::new("x1_face", n), &n, |b, _| {
            let mut buf = vec![0.0; range_len(vr, full, full, ghost)];
            b.iter(|| {
                let mut off = 0;
                pack_vars(&src, &mut buf, vr, full, full, ghost, &mut off);
                black_box(off);
            });
        });
    }

    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack_unpack_round_trip");

    for &n in &[16usize, 32, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let src = numbered(4, n);
            let vr = CellRange::new(0, 3);
            let full = CellRange::new(0, n - 1);
            let ghost = CellRange::new(0, 1);
            let mut dst = VarArray4::new(4, n, n, n);
            let mut buf = vec![0.0; range_len(vr, ghost, full, full)];

            b.iter(|| {
                let mut off = 0;
                pack_vars(&src, &mut buf, vr, ghost, full, full, &mut off);
                let mut off = 0;
                unpack_vars(&buf, &mut dst, vr, ghost, full, full, &mut off);
                black_box(off);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pack_face_strips, bench_round_trip);
criterion_main!(benches);
