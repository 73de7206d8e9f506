// Criterion benchmarks for Lume Intake

use criterion::{black_box, criterion_group, criterion_main, Criterion, BenchmarkId};
use lume_intake::core::{cosine_similarity, merge, Matcher, MergePolicy};
use lume_intake::models::{ContactId, ProfileFields, SimilarProfile};

const DIMENSIONS: usize = 384;

fn create_vector(seed: usize) -> Vec<f32> {
    (0..DIMENSIONS)
        .map(|i| (((i * 31 + seed * 17) % 97) as f32 / 97.0) - 0.5)
        .collect()
}

fn create_neighbours(count: usize) -> Vec<SimilarProfile> {
    (0..count)
        .map(|i| SimilarProfile {
            contact_id: ContactId::parse(&format!("+1555{:07}", i)).unwrap(),
            similarity: 0.5 + (i % 50) as f64 / 100.0,
        })
        .collect()
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let a = create_vector(1);
    let b = create_vector(2);

    c.bench_function("cosine_similarity_384", |bench| {
        bench.iter(|| cosine_similarity(black_box(&a), black_box(&b)));
    });
}

fn bench_select_candidate(c: &mut Criterion) {
    let matcher = Matcher::new(100, 0.7);
    let trigger = ContactId::parse("+15550000000").unwrap();

    let mut group = c.benchmark_group("select_candidate");

    for count in [2, 10, 100, 1000].iter() {
        let neighbours = create_neighbours(*count);

        group.bench_with_input(BenchmarkId::new("neighbours", count), count, |b, _| {
            b.iter(|| matcher.select_candidate(black_box(&trigger), black_box(neighbours.clone())));
        });
    }

    group.finish();
}

fn bench_brute_force_search(c: &mut Criterion) {
    let query = create_vector(0);
    let stored: Vec<Vec<f32>> = (1..1000).map(create_vector).collect();

    c.bench_function("brute_force_top_k_1000", |b| {
        b.iter(|| {
            let mut scored: Vec<f64> = stored
                .iter()
                .filter_map(|v| cosine_similarity(&query, v))
                .filter(|s| *s >= 0.7)
                .collect();
            scored.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(2);
            black_box(scored)
        });
    });
}

fn bench_merge(c: &mut Criterion) {
    let stored = ProfileFields {
        first_name: Some("Ana".to_string()),
        job_or_education: Some("engineer".to_string()),
        ..Default::default()
    };
    let candidate = ProfileFields {
        year_of_birth: Some(1994),
        greenflags: Some(vec!["honest".to_string(), "funny".to_string()]),
        ..Default::default()
    };

    c.bench_function("merge_fill_missing", |b| {
        b.iter(|| merge(black_box(&stored), black_box(&candidate), MergePolicy::FillMissing));
    });
}

criterion_group!(
    benches,
    bench_cosine_similarity,
    bench_select_candidate,
    bench_brute_force_search,
    bench_merge
);

criterion_main!(benches);
