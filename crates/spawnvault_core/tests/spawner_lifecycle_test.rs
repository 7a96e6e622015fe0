//! Integration test for the spawner lifecycle with built-in loot tables.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use spawnvault_core::{
    CreatureType, HookRegistry, LogicalSpawner, LootRegistry, PlayerId, Position, Settings,
    SpawnerLimits, SpawnerStatus, StackManager, TickOutcome,
};

const PLAYER: PlayerId = PlayerId(42);

fn limits() -> SpawnerLimits {
    SpawnerLimits {
        base_capacity: 64,
        base_max_experience: 100,
        max_stack_size: 10,
        spawn_interval_ms: 1_000,
    }
}

#[test]
fn test_fill_collect_resume() {
    let loot = LootRegistry::builtin();
    let hooks = HookRegistry::new();
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let mut spawner = LogicalSpawner::new(
        CreatureType::new("blaze"),
        Position::new("nether", 0, 70, 0),
        limits(),
        0,
    );

    // Experience fills after 10 cycles; the spawner pauses once rods fill too.
    let mut now = 1_000;
    let mut cycles = 0;
    while spawner.status == SpawnerStatus::Active && cycles < 1_000 {
        spawner.on_tick(now, &loot, &mut rng);
        now += 1_000;
        cycles += 1;
    }
    assert!(cycles < 1_000, "spawner never filled");
    assert!(spawner.total_items() <= spawner.capacity());
    assert_eq!(spawner.stored_experience, 100);
    assert_eq!(spawner.on_tick(now, &loot, &mut rng), TickOutcome::Skipped);

    let collected = spawner.collect(PLAYER, &hooks).unwrap();
    assert_eq!(collected.experience, 100);
    assert_eq!(spawner.status, SpawnerStatus::Active);
    assert!(matches!(
        spawner.on_tick(now, &loot, &mut rng),
        TickOutcome::Accumulated { .. }
    ));
}

#[test]
fn test_stacked_spawner_scales_yield() {
    let loot = LootRegistry::builtin();
    let manager = StackManager::new(limits());
    let mut rng = ChaCha8Rng::seed_from_u64(5);

    let base = LogicalSpawner::new(
        CreatureType::new("blaze"),
        Position::new("nether", 0, 70, 0),
        limits(),
        0,
    );
    let mut merged = base.clone();
    for position in [
        Position::new("nether", 1, 70, 0),
        Position::new("nether", 0, 71, 0),
        Position::new("nether", -1, 70, 0),
    ] {
        let incoming = LogicalSpawner::new(CreatureType::new("blaze"), position, limits(), 0);
        merged = manager.merge(&merged, &incoming, 0).unwrap();
    }
    assert_eq!(merged.stack_size, 4);
    assert_eq!(merged.capacity(), 256);

    merged.on_tick(merged.next_eligible_tick_ms, &loot, &mut rng);
    assert_eq!(merged.stored_experience, 40);
}

#[test]
fn test_settings_drive_limits() {
    let settings = Settings::from_toml_str(
        r#"
        [spawner]
        base_capacity = 9
        spawn_interval_ms = 500

        [[creature]]
        kind = "slime"
        experience_min = 1
        experience_max = 4

        [[creature.drops]]
        item = "slime_ball"
        min = 3
        max = 3
        "#,
    )
    .unwrap();
    let loot = settings.loot_registry();
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut spawner = LogicalSpawner::new(
        CreatureType::new("slime"),
        Position::new("world", 0, 0, 0),
        settings.limits(),
        0,
    );

    for i in 1..=5 {
        spawner.on_tick(i * 500, &loot, &mut rng);
    }
    assert_eq!(spawner.total_items(), 9);
    assert!((5..=20).contains(&spawner.stored_experience));
}
