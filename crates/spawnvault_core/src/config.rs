//! # Configuration
//!
//! TOML settings loaded once at startup. A reload parses a fresh
//! [`Settings`] and the caller swaps it in whole.
//!
//! ```toml
//! [spawner]
//! max_stack_size = 64
//!
//! [storage]
//! backend = "sqlite"
//! path = "spawners.db"
//!
//! [[creature]]
//! kind = "skeleton"
//! experience_min = 5
//! experience_max = 5
//!
//! [[creature.drops]]
//! item = "bone"
//! min = 0
//! max = 2
//! sell_price = "0.25"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{SpawnerError, SpawnerResult};
use crate::loot::{CreatureLoot, DropEntry, LootRegistry, CERTAIN_BP};
use crate::money::Money;
use crate::spawner::SpawnerLimits;

/// Top-level settings file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Spawner sizing and pacing.
    pub spawner: SpawnerSettings,
    /// Persistence backend.
    pub storage: StorageSettings,
    /// Economy collaborator behaviour.
    pub economy: EconomySettings,
    /// Custom loot tables. Empty means built-in tables.
    #[serde(rename = "creature")]
    pub creatures: Vec<CreatureConfig>,
}

/// `[spawner]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpawnerSettings {
    /// Item capacity per stack unit.
    pub base_capacity: u64,
    /// Experience capacity per stack unit.
    pub base_max_experience: u64,
    /// Largest allowed stack.
    pub max_stack_size: u32,
    /// Milliseconds between spawn cycles.
    pub spawn_interval_ms: u64,
    /// Blocks within which a player keeps a spawner active.
    pub activation_range: u32,
    /// Fixed RNG seed, for reproducible runs.
    pub rng_seed: Option<u64>,
}

impl Default for SpawnerSettings {
    fn default() -> Self {
        let limits = SpawnerLimits::default();
        Self {
            base_capacity: limits.base_capacity,
            base_max_experience: limits.base_max_experience,
            max_stack_size: limits.max_stack_size,
            spawn_interval_ms: limits.spawn_interval_ms,
            activation_range: 16,
            rng_seed: None,
        }
    }
}

/// Storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded file database.
    Sqlite,
    /// Networked MySQL / MariaDB.
    Mysql,
    /// Networked PostgreSQL.
    Postgres,
    /// Process memory, for tests.
    Memory,
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Backend to open.
    pub backend: BackendKind,
    /// Database file for SQLite.
    pub path: String,
    /// Connection URL for networked backends.
    pub url: Option<String>,
    /// Pooled connections.
    pub pool_size: u32,
    /// Flush window for coalesced tick writes.
    pub flush_interval_ms: u64,
    /// Records per write transaction.
    pub max_batch_size: usize,
    /// Pending records before saves are refused.
    pub queue_capacity: usize,
    /// Attempts per flush cycle before a batch is parked as dirty.
    pub max_retries: u32,
    /// First retry delay, doubled per attempt.
    pub retry_base_delay_ms: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sqlite,
            path: "spawnvault.db".into(),
            url: None,
            pool_size: 4,
            flush_interval_ms: 5_000,
            max_batch_size: 200,
            queue_capacity: 10_000,
            max_retries: 3,
            retry_base_delay_ms: 50,
        }
    }
}

impl StorageSettings {
    /// In-memory settings with a short flush window.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            backend: BackendKind::Memory,
            flush_interval_ms: 50,
            retry_base_delay_ms: 1,
            ..Self::default()
        }
    }

    /// Flush window.
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// First retry delay.
    #[must_use]
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// `[economy]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EconomySettings {
    /// Upper bound on any single shop or deposit call.
    pub call_timeout_ms: u64,
}

impl Default for EconomySettings {
    fn default() -> Self {
        Self {
            call_timeout_ms: 2_000,
        }
    }
}

impl EconomySettings {
    /// Call timeout.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// `[[creature]]` table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreatureConfig {
    /// Creature tag.
    pub kind: String,
    /// Minimum experience per unit.
    #[serde(default)]
    pub experience_min: u32,
    /// Maximum experience per unit.
    #[serde(default)]
    pub experience_max: u32,
    /// Drop entries in roll order.
    #[serde(default)]
    pub drops: Vec<DropConfig>,
}

/// `[[creature.drops]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DropConfig {
    /// Item kind.
    pub item: String,
    /// Minimum quantity per unit.
    #[serde(default)]
    pub min: u32,
    /// Maximum quantity per unit.
    #[serde(default = "default_max")]
    pub max: u32,
    /// Drop chance in percent.
    #[serde(default = "default_chance")]
    pub chance: f64,
    /// Sale price per item.
    #[serde(default)]
    pub sell_price: Option<Money>,
}

fn default_max() -> u32 {
    1
}

fn default_chance() -> f64 {
    100.0
}

impl DropConfig {
    /// Chance converted to basis points.
    #[allow(clippy::cast_sign_loss)]
    fn chance_bp(&self) -> u32 {
        let bp = (self.chance.clamp(0.0, 100.0) * 100.0).round() as u32;
        bp.min(CERTAIN_BP)
    }
}

impl Settings {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` on syntax errors or out-of-range values.
    pub fn from_toml_str(contents: &str) -> SpawnerResult<Self> {
        let settings: Self =
            toml::from_str(contents).map_err(|e| SpawnerError::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads, parses and validates a settings file.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the file cannot be read or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> SpawnerResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            SpawnerError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        let settings = Self::from_toml_str(&contents)?;
        tracing::info!(
            path = %path.display(),
            creatures = settings.creatures.len(),
            backend = ?settings.storage.backend,
            "settings loaded"
        );
        Ok(settings)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` naming the first offending value.
    pub fn validate(&self) -> SpawnerResult<()> {
        let invalid = |msg: String| Err(SpawnerError::InvalidConfig(msg));
        let s = &self.spawner;
        if s.max_stack_size == 0 {
            return invalid("spawner.max_stack_size must be at least 1".into());
        }
        if s.base_capacity == 0 {
            return invalid("spawner.base_capacity must be at least 1".into());
        }
        if s.spawn_interval_ms == 0 {
            return invalid("spawner.spawn_interval_ms must be positive".into());
        }
        if self.storage.pool_size == 0 {
            return invalid("storage.pool_size must be at least 1".into());
        }
        if self.storage.max_batch_size == 0 || self.storage.queue_capacity == 0 {
            return invalid("storage batch and queue sizes must be positive".into());
        }
        for creature in &self.creatures {
            if creature.kind.trim().is_empty() {
                return invalid("creature.kind must not be empty".into());
            }
            if creature.experience_min > creature.experience_max {
                return invalid(format!("{}: experience_min > experience_max", creature.kind));
            }
            for drop in &creature.drops {
                if drop.min > drop.max {
                    return invalid(format!("{}/{}: min > max", creature.kind, drop.item));
                }
                if !(0.0..=100.0).contains(&drop.chance) {
                    return invalid(format!(
                        "{}/{}: chance must be within 0..=100",
                        creature.kind, drop.item
                    ));
                }
            }
        }
        Ok(())
    }

    /// Spawner limits derived from `[spawner]`.
    #[must_use]
    pub fn limits(&self) -> SpawnerLimits {
        SpawnerLimits {
            base_capacity: self.spawner.base_capacity,
            base_max_experience: self.spawner.base_max_experience,
            max_stack_size: self.spawner.max_stack_size,
            spawn_interval_ms: self.spawner.spawn_interval_ms,
        }
    }

    /// Builds the loot registry: configured tables, else built-in ones.
    #[must_use]
    pub fn loot_registry(&self) -> LootRegistry {
        if self.creatures.is_empty() {
            return LootRegistry::builtin();
        }
        let mut registry = LootRegistry::new();
        for creature in &self.creatures {
            let drops = creature
                .drops
                .iter()
                .map(|d| DropEntry {
                    sell_price: d.sell_price,
                    ..DropEntry::with_chance(&d.item, d.min, d.max, d.chance_bp())
                })
                .collect();
            registry.register(CreatureLoot::new(
                &creature.kind,
                creature.experience_min,
                creature.experience_max,
                drops,
            ));
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CreatureType, ItemKind};

    const SAMPLE: &str = r#"
        [spawner]
        max_stack_size = 64
        spawn_interval_ms = 10000

        [storage]
        backend = "memory"

        [economy]
        call_timeout_ms = 500

        [[creature]]
        kind = "minecraft:skeleton"
        experience_min = 5
        experience_max = 5

        [[creature.drops]]
        item = "bone"
        min = 0
        max = 2
        sell_price = "0.25"

        [[creature.drops]]
        item = "bow"
        chance = 8.5
    "#;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.limits(), SpawnerLimits::default());
        assert_eq!(settings.storage.backend, BackendKind::Sqlite);
        assert_eq!(settings.economy.call_timeout(), Duration::from_secs(2));
        assert!(settings.loot_registry().contains(&CreatureType::new("zombie")));
    }

    #[test]
    fn test_parse_sample() {
        let settings = Settings::from_toml_str(SAMPLE).unwrap();
        assert_eq!(settings.spawner.max_stack_size, 64);
        assert_eq!(settings.storage.backend, BackendKind::Memory);
        assert_eq!(settings.economy.call_timeout_ms, 500);

        let loot = settings.loot_registry();
        assert_eq!(loot.len(), 1);
        let table = loot.get(&CreatureType::new("skeleton")).unwrap();
        assert_eq!(table.drops[0].chance_bp, CERTAIN_BP);
        assert_eq!(table.drops[1].chance_bp, 850);
        assert_eq!(table.drops[1].min_quantity, 0);
        assert_eq!(table.drops[1].max_quantity, 1);
        assert_eq!(
            loot.configured_price(&ItemKind::new("bone")),
            Some(Money::from_parts(0, 250_000))
        );
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Settings::from_toml_str("[spawner]\nmax_stack_size = 0").is_err());
        assert!(Settings::from_toml_str("[storage]\nbackend = \"floppy\"").is_err());
        let bad_chance = r#"
            [[creature]]
            kind = "zombie"
            [[creature.drops]]
            item = "carrot"
            chance = 150.0
        "#;
        assert!(Settings::from_toml_str(bad_chance).is_err());
        let bad_price = r#"
            [[creature]]
            kind = "zombie"
            [[creature.drops]]
            item = "carrot"
            sell_price = "1.2345678"
        "#;
        assert!(Settings::from_toml_str(bad_price).is_err());
    }

    #[test]
    fn test_from_missing_file() {
        let path = std::env::temp_dir().join("spawnvault_missing_settings.toml");
        let _ = std::fs::remove_file(&path);
        assert!(matches!(
            Settings::from_file(&path),
            Err(SpawnerError::InvalidConfig(_))
        ));
    }
}
