//! Benchmark for yield resolution and tick throughput.
//!
//! TARGET: 1,000 spawners ticked well under one 50ms server tick
//!
//! Run with: cargo bench --package spawnvault_core --bench loot_benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use spawnvault_core::{
    CreatureType, LogicalSpawner, LootRegistry, Position, SpawnerLimits,
};

fn benchmark_single_resolve(c: &mut Criterion) {
    let loot = LootRegistry::builtin();
    let zombie = CreatureType::new("zombie");
    let mut rng = ChaCha8Rng::seed_from_u64(1);

    c.bench_function("resolve_zombie_stack_1", |b| {
        b.iter(|| black_box(loot.resolve(black_box(&zombie), 1, &mut rng)));
    });

    c.bench_function("resolve_zombie_stack_1000", |b| {
        b.iter(|| black_box(loot.resolve(black_box(&zombie), 1_000, &mut rng)));
    });
}

fn benchmark_tick_thousand(c: &mut Criterion) {
    let loot = LootRegistry::builtin();
    let limits = SpawnerLimits {
        spawn_interval_ms: 1,
        ..SpawnerLimits::default()
    };
    let kinds = ["zombie", "skeleton", "spider", "creeper", "blaze"];
    let mut spawners: Vec<LogicalSpawner> = (0..1_000)
        .map(|i| {
            LogicalSpawner::new(
                CreatureType::new(kinds[i % kinds.len()]),
                Position::new("world", i as i32, 64, 0),
                limits,
                0,
            )
        })
        .collect();
    let mut rng = ChaCha8Rng::seed_from_u64(2);

    let mut group = c.benchmark_group("tick");
    group.throughput(Throughput::Elements(1_000));
    group.bench_function("thousand_spawners", |b| {
        let mut now = 1u64;
        b.iter(|| {
            now += 1;
            for spawner in &mut spawners {
                // Keep them below capacity so every tick does real work.
                if spawner.total_items() > spawner.capacity() / 2 {
                    spawner.stored_items.clear();
                    spawner.refresh_status();
                }
                black_box(spawner.on_tick(now, &loot, &mut rng));
            }
        });
    });
    group.finish();
}

criterion_group!(benches, benchmark_single_resolve, benchmark_tick_thousand);
criterion_main!(benches);
