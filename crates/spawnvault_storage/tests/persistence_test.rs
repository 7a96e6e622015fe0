//! End-to-end persistence tests against real backends.
//!
//! SQLite runs everywhere. MySQL and PostgreSQL run only when
//! `SPAWNVAULT_MYSQL_URL` / `SPAWNVAULT_POSTGRES_URL` point at a scratch database.

use spawnvault_core::{
    BackendKind, CreatureType, ItemKind, LogicalSpawner, PlayerId, Position, SpawnerLimits,
    SpawnerStatus, StorageSettings,
};
use spawnvault_storage::{
    migrate, open_store, MemoryStore, Persistence, PersistedRecord, SpawnerStore, StorageError,
};
use std::path::PathBuf;
use std::sync::Arc;

fn temp_db_path(tag: &str) -> PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("test_spawnvault_{tag}_{id}.db"))
}

fn cleanup(path: &PathBuf) {
    for suffix in ["", "-wal", "-shm"] {
        let mut p = path.as_os_str().to_owned();
        p.push(suffix);
        std::fs::remove_file(p).ok();
    }
}

fn sqlite_settings(path: &PathBuf) -> StorageSettings {
    StorageSettings {
        backend: BackendKind::Sqlite,
        path: path.display().to_string(),
        flush_interval_ms: 3_600_000,
        retry_base_delay_ms: 1,
        ..StorageSettings::default()
    }
}

/// Stack of three skeletons holding arrows and bones.
fn create_stocked_spawner(x: i32) -> LogicalSpawner {
    let mut spawner = LogicalSpawner::new(
        CreatureType::new("skeleton"),
        Position::new("world", x, 64, -20),
        SpawnerLimits::default(),
        5_000,
    );
    spawner.stack_size = 3;
    spawner.stored_experience = 450;
    spawner.stored_items.insert(ItemKind::new("arrow"), 64);
    spawner.stored_items.insert(ItemKind::new("bone"), 12);
    spawner.owner = Some(PlayerId(42));
    spawner
}

fn assert_round_trip(settings: &StorageSettings) {
    let spawner = create_stocked_spawner(7);
    {
        let persistence = Persistence::open(settings, SpawnerLimits::default()).unwrap();
        persistence.save(&spawner).unwrap();
        persistence.flush().unwrap();
    }

    let persistence = Persistence::open(settings, SpawnerLimits::default()).unwrap();
    let loaded = persistence.load(&spawner.id).unwrap();
    assert_eq!(loaded.stack_size, 3);
    assert_eq!(loaded.stored_experience, 450);
    assert_eq!(loaded.stored_items.get(&ItemKind::new("arrow")), Some(&64));
    assert_eq!(loaded.stored_items.get(&ItemKind::new("bone")), Some(&12));
    assert_eq!(loaded, spawner);

    persistence.delete(&spawner.id).unwrap();
    persistence.flush().unwrap();
}

#[test]
fn test_sqlite_round_trip_across_reopen() {
    let path = temp_db_path("round_trip");
    assert_round_trip(&sqlite_settings(&path));
    cleanup(&path);
}

#[test]
fn test_sqlite_status_survives_reload() {
    let path = temp_db_path("status");
    let settings = sqlite_settings(&path);
    let mut disabled = create_stocked_spawner(1);
    disabled.set_enabled(false);
    let mut away = create_stocked_spawner(2);
    away.set_player_in_range(false);

    {
        let persistence = Persistence::open(&settings, SpawnerLimits::default()).unwrap();
        persistence.save(&disabled).unwrap();
        persistence.save(&away).unwrap();
        persistence.flush().unwrap();
    }

    let persistence = Persistence::open(&settings, SpawnerLimits::default()).unwrap();
    let report = persistence.load_all().unwrap();
    assert_eq!(report.spawners.len(), 2);
    for spawner in report.spawners {
        if spawner.id == disabled.id {
            assert_eq!(spawner.status, SpawnerStatus::Disabled);
        } else {
            assert_eq!(spawner.status, SpawnerStatus::Inactive);
            assert!(!spawner.player_in_range);
        }
    }
    drop(persistence);
    cleanup(&path);
}

#[test]
fn test_sqlite_corrupt_row_is_skipped() {
    let path = temp_db_path("corrupt");
    let settings = sqlite_settings(&path);
    let store = open_store(&settings).unwrap();

    let good = PersistedRecord::from_spawner(&create_stocked_spawner(1)).unwrap();
    let mut bad = PersistedRecord::from_spawner(&create_stocked_spawner(2)).unwrap();
    bad.stored_items = r#"{"arrow": "many"}"#.into();
    store.upsert(&[good.clone(), bad]).unwrap();

    let persistence = Persistence::new(store, (&settings).into(), SpawnerLimits::default()).unwrap();
    let report = persistence.load_all().unwrap();
    assert_eq!(report.spawners.len(), 1);
    assert_eq!(report.spawners[0].id.as_str(), good.id);
    assert_eq!(report.skipped.len(), 1);
    assert!(matches!(report.skipped[0], StorageError::Corrupt { .. }));

    drop(persistence);
    cleanup(&path);
}

#[test]
fn test_migrate_sqlite_to_memory() {
    let path = temp_db_path("migrate");
    let source = open_store(&sqlite_settings(&path)).unwrap();
    let records: Vec<_> = (0..25)
        .map(|x| PersistedRecord::from_spawner(&create_stocked_spawner(x)).unwrap())
        .collect();
    source.upsert(&records).unwrap();

    let target = Arc::new(MemoryStore::new());
    let report = migrate(&*source, &*target, 10).unwrap();
    assert_eq!(report.copied, 25);
    assert!(report.skipped.is_empty());
    assert_eq!(target.count().unwrap(), 25);
    assert_eq!(target.fetch(&records[3].id).unwrap(), Some(records[3].clone()));

    drop(source);
    cleanup(&path);
}

#[test]
fn test_mysql_round_trip() {
    let Ok(url) = std::env::var("SPAWNVAULT_MYSQL_URL") else {
        return;
    };
    assert_round_trip(&StorageSettings {
        backend: BackendKind::Mysql,
        url: Some(url),
        ..StorageSettings::default()
    });
}

#[test]
fn test_postgres_round_trip() {
    let Ok(url) = std::env::var("SPAWNVAULT_POSTGRES_URL") else {
        return;
    };
    assert_round_trip(&StorageSettings {
        backend: BackendKind::Postgres,
        url: Some(url),
        ..StorageSettings::default()
    });
}
