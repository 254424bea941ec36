use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use nbindex::services::TextChunker;

fn sample_text(paragraphs: usize) -> String {
    let paragraph = "Transcripts and notes arrive as long runs of prose. Sentences end with \
periods, lines wrap at arbitrary widths,\nand paragraphs are separated by blank lines. \
Some passages mention ünïcödé characters or 日本語 text to keep offsets honest.";
    (0..paragraphs)
        .map(|i| format!("{i}. {paragraph}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn benchmark_chunking(c: &mut Criterion) {
    let chunker = TextChunker::new(1500, 200, 200_000).unwrap();
    let mut group = c.benchmark_group("chunker");

    for paragraphs in [10, 100, 600] {
        let text = sample_text(paragraphs);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(paragraphs), &text, |b, text| {
            b.iter(|| chunker.chunk(black_box("src-bench"), black_box(text)));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_chunking);
criterion_main!(benches);
