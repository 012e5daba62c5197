use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use netexp_core::Pattern;

/// Build a transcript of `lines` statistics lines ending in a prompt.
fn transcript(lines: usize) -> String {
    let mut text = String::new();
    for i in 0..lines {
        text.push_str(&format!(
            "  Port {:>2} | pkts/s {:>12} | mbits/s {:>8} | errors 0\r\n",
            i % 4,
            i * 1_000,
            i * 3
        ));
    }
    text.push_str("Pktgen:/> ");
    text
}

fn bench_prompt_match(c: &mut Criterion) {
    let prompt = Pattern::new("\r\nPktgen:/> ").unwrap();
    let window = Some(prompt.char_len());
    let mut group = c.benchmark_group("prompt_match");

    for lines in [10usize, 1_000, 50_000] {
        let text = transcript(lines);

        group.bench_with_input(BenchmarkId::new("window", lines), &text, |b, text| {
            b.iter(|| prompt.is_match_in_tail(black_box(text), window))
        });

        group.bench_with_input(BenchmarkId::new("whole", lines), &text, |b, text| {
            b.iter(|| prompt.is_match_in_tail(black_box(text), None))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_prompt_match);
criterion_main!(benches);
