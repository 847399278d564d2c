use criterion::{black_box, criterion_group, criterion_main, Criterion};
use histree::{GrowerConfig, Matrix, TreeGrower};
use rand::prelude::*;

pub fn grow_benchmark(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let n_samples = 10_000;
    let n_features = 20;
    let n_bins = 256;

    let binned: Vec<u8> = (0..n_samples * n_features).map(|_| rng.gen::<u8>()).collect();
    let gradients: Vec<f32> = (0..n_samples)
        .map(|i| binned[i] as f32 / n_bins as f32 - 0.5 + rng.gen::<f32>() * 0.1)
        .collect();
    let hessians = vec![1.0_f32];

    let mut group = c.benchmark_group("grow_benchmark");
    group.sample_size(10); // Reduce sample size as growing might be slow

    group.bench_function("grow_synthetic_10k_x20", |b| {
        b.iter(|| {
            let data = Matrix::new(&binned, n_samples, n_features);
            let config = GrowerConfig {
                max_leaf_nodes: Some(31),
                ..GrowerConfig::default()
            };
            let mut grower =
                TreeGrower::new(black_box(data), black_box(&gradients), black_box(&hessians), config).unwrap();
            grower.grow();
            black_box(grower.make_predictor());
        })
    });
    group.finish();
}

criterion_group!(benches, grow_benchmark);
criterion_main!(benches);
