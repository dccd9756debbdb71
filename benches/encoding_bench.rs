use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::time::Duration;

use lux_imitation::dataset::provider::SampleProvider;
use lux_imitation::dataset::{ObservationCache, ObservationKey, Rotation, Sample, NO_LABEL};
use lux_imitation::nn::encoding::encode_observation;
use lux_imitation::replay::{Observation, GRID_SIZE};
use ndarray::Array2;

/// A mid-game 24x24 board: two teams of workers, a few cities, and resources.
fn midgame_observation() -> Observation {
    let mut updates = vec!["rp 0 57".to_string(), "rp 1 31".to_string()];
    for i in 0..24 {
        updates.push(format!("r wood {} {} {}", i, (i * 5) % 24, 300 + i * 10));
        if i % 3 == 0 {
            updates.push(format!("r coal {} {} 350", (i * 7) % 24, i));
        }
    }
    for i in 0..12 {
        let team = i % 2;
        updates.push(format!(
            "u 0 {} u_{} {} {} {} {} 0 0",
            team,
            i,
            (i * 3) % 24,
            (i * 11) % 24,
            i % 3,
            i * 8
        ));
    }
    for c in 0..4 {
        let team = c % 2;
        updates.push(format!("c {} c_{} {} 23", team, c, 100 + c * 60));
        for t in 0..3 {
            updates.push(format!("ct {} c_{} {} {} 0", team, c, c * 5 + t, 20 - c));
        }
    }
    updates.push("ccd 4 4 6".to_string());
    Observation {
        step: 97,
        updates,
        player: 0,
        width: 24,
        height: 24,
    }
}

fn bench_encode(c: &mut Criterion) {
    let obs = midgame_observation();
    c.bench_function("encode_observation_24x24", |b| {
        b.iter(|| encode_observation(black_box(&obs)))
    });
}

fn bench_provider(c: &mut Criterion) {
    let key = ObservationKey::new("bench", 97);
    let mut cache = ObservationCache::new();
    cache.insert(key.clone(), midgame_observation());
    let mut labels = Array2::from_elem((GRID_SIZE, GRID_SIZE), NO_LABEL);
    labels[[10, 12]] = 0;
    labels[[15, 7]] = 1;
    let samples = (0..4)
        .filter_map(Rotation::new)
        .map(|rotation| Sample {
            key: key.clone(),
            labels: labels.clone(),
            rotation,
        })
        .collect();
    let provider = SampleProvider::new(Arc::new(cache), samples);

    let mut group = c.benchmark_group("provider");
    group.measurement_time(Duration::from_secs(5));
    group.bench_function("get_all_rotations", |b| {
        b.iter(|| {
            for i in 0..provider.len() {
                black_box(provider.get(i).unwrap());
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_provider);
criterion_main!(benches);
