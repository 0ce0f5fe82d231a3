use core_text::GapBuffer;
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_cursor_local_inserts(c: &mut Criterion) {
    c.bench_function("insert_1k_at_cursor", |b| {
        b.iter(|| {
            let mut gb = GapBuffer::new();
            for i in 0..1024 {
                gb.insert(i, black_box(b"x")).unwrap();
            }
            gb.len()
        })
    });
}

fn bench_scattered_edits(c: &mut Criterion) {
    let base = "lorem ipsum dolor sit amet\n".repeat(2000);
    c.bench_function("scattered_insert_delete", |b| {
        b.iter(|| {
            let mut gb = GapBuffer::from_str(&base);
            for i in 0..200 {
                let pos = (i * 271) % gb.len();
                gb.insert(pos, b"@@").unwrap();
                gb.delete(pos, 2).unwrap();
            }
            gb.len()
        })
    });
}

fn bench_line_index_rebuild(c: &mut Criterion) {
    let base = "line\n".repeat(50_000);
    c.bench_function("line_index_rebuild_50k", |b| {
        b.iter(|| {
            let mut gb = GapBuffer::from_str(&base);
            gb.insert(7, b"!").unwrap();
            black_box(gb.line_count())
        })
    });
}

criterion_group!(
    benches,
    bench_cursor_local_inserts,
    bench_scattered_edits,
    bench_line_index_rebuild
);
criterion_main!(benches);
