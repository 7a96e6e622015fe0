//! # Persisted Record
//!
//! Backend-agnostic row projection of a [`LogicalSpawner`].
//!
//! ## Layout
//!
//! | Column | Type | Notes |
//! |---|---|---|
//! | `id` | text, unique | position-derived |
//! | `creature` | text | creature tag |
//! | `stack_size` | int | >= 1 |
//! | `status` | text | `active` / `inactive` / `disabled` |
//! | `inactive_reason` | text, nullable | why Inactive |
//! | `stored_items` | text | JSON object `{item: qty}` |
//! | `stored_experience` | int | |
//! | `world`, `x`, `y`, `z` | text, int | anchor block |
//! | `filtered_items` | text | JSON array |
//! | `owner` | text, nullable | 32 hex digits |
//! | `last_tick_ms`, `next_eligible_ms` | int | timer phase |
//! | `checksum` | int | CRC32 over every other column |
//!
//! The checksum catches rows damaged or hand-edited outside the engine;
//! such rows fail to load and are skipped.

use spawnvault_core::{
    CreatureType, InactiveReason, ItemKind, ItemMap, LogicalSpawner, PlayerId, Position,
    SpawnerId, SpawnerLimits, SpawnerStatus,
};
use std::collections::BTreeSet;

use crate::error::{StorageError, StorageResult};

/// Column names in canonical order.
pub(crate) const COLUMNS: [&str; 16] = [
    "id",
    "creature",
    "stack_size",
    "status",
    "inactive_reason",
    "stored_items",
    "stored_experience",
    "world",
    "x",
    "y",
    "z",
    "filtered_items",
    "owner",
    "last_tick_ms",
    "next_eligible_ms",
    "checksum",
];

/// Field separator for the checksum input.
const SEPARATOR: u8 = 0x1f;

/// One stored spawner row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistedRecord {
    /// Spawner id.
    pub id: String,
    /// Creature tag.
    pub creature: String,
    /// Stack size.
    pub stack_size: u32,
    /// Status tag.
    pub status: String,
    /// Inactive reason tag.
    pub inactive_reason: Option<String>,
    /// JSON item map.
    pub stored_items: String,
    /// Stored experience.
    pub stored_experience: u64,
    /// World name.
    pub world: String,
    /// Block X.
    pub x: i32,
    /// Block Y.
    pub y: i32,
    /// Block Z.
    pub z: i32,
    /// JSON array of filtered item kinds.
    pub filtered_items: String,
    /// Owner id in hex.
    pub owner: Option<String>,
    /// Last productive tick.
    pub last_tick_ms: u64,
    /// Next eligible tick.
    pub next_eligible_ms: u64,
    /// CRC32 of the other fields.
    pub checksum: u32,
}

impl PersistedRecord {
    /// Projects a spawner into a row.
    ///
    /// # Errors
    ///
    /// `Corrupt` if a payload cannot be serialized.
    pub fn from_spawner(spawner: &LogicalSpawner) -> StorageResult<Self> {
        let id = spawner.id.as_str();
        let stored_items = serde_json::to_string(&spawner.stored_items)
            .map_err(|e| StorageError::corrupt(id, format!("stored_items: {e}")))?;
        let filtered_items = serde_json::to_string(&spawner.filtered_items)
            .map_err(|e| StorageError::corrupt(id, format!("filtered_items: {e}")))?;

        let mut record = Self {
            id: id.to_string(),
            creature: spawner.creature.as_str().to_string(),
            stack_size: spawner.stack_size,
            status: spawner.status.as_str().to_string(),
            inactive_reason: spawner.inactive_reason.map(|r| r.as_str().to_string()),
            stored_items,
            stored_experience: spawner.stored_experience,
            world: spawner.position.world.clone(),
            x: spawner.position.x,
            y: spawner.position.y,
            z: spawner.position.z,
            filtered_items,
            owner: spawner.owner.map(|p| p.to_string()),
            last_tick_ms: spawner.last_tick_ms,
            next_eligible_ms: spawner.next_eligible_tick_ms,
            checksum: 0,
        };
        record.checksum = record.compute_checksum();
        Ok(record)
    }

    /// CRC32 over every field except the checksum.
    #[must_use]
    pub fn compute_checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        let mut feed = |field: &str| {
            hasher.update(field.as_bytes());
            hasher.update(&[SEPARATOR]);
        };
        feed(&self.id);
        feed(&self.creature);
        feed(&self.stack_size.to_string());
        feed(&self.status);
        feed(self.inactive_reason.as_deref().unwrap_or(""));
        feed(&self.stored_items);
        feed(&self.stored_experience.to_string());
        feed(&self.world);
        feed(&self.x.to_string());
        feed(&self.y.to_string());
        feed(&self.z.to_string());
        feed(&self.filtered_items);
        feed(self.owner.as_deref().unwrap_or(""));
        feed(&self.last_tick_ms.to_string());
        feed(&self.next_eligible_ms.to_string());
        hasher.finalize()
    }

    /// Checks the stored checksum.
    ///
    /// # Errors
    ///
    /// `Corrupt` on mismatch.
    pub fn verify(&self) -> StorageResult<()> {
        let expected = self.compute_checksum();
        if expected == self.checksum {
            Ok(())
        } else {
            Err(StorageError::corrupt(
                &self.id,
                format!("checksum mismatch: stored {:08x}, computed {expected:08x}", self.checksum),
            ))
        }
    }

    /// Rebuilds the spawner, applying the current `limits`.
    ///
    /// # Errors
    ///
    /// `Corrupt` if any field fails validation.
    pub fn into_spawner(&self, limits: SpawnerLimits) -> StorageResult<LogicalSpawner> {
        self.verify()?;
        let corrupt = |reason: String| StorageError::corrupt(&self.id, reason);

        if self.stack_size == 0 {
            return Err(corrupt("stack_size is zero".into()));
        }
        let status = SpawnerStatus::parse(&self.status)
            .ok_or_else(|| corrupt(format!("unknown status {:?}", self.status)))?;
        let inactive_reason = match &self.inactive_reason {
            Some(tag) => Some(
                InactiveReason::parse(tag)
                    .ok_or_else(|| corrupt(format!("unknown inactive reason {tag:?}")))?,
            ),
            None => None,
        };
        let stored_items: ItemMap = serde_json::from_str(&self.stored_items)
            .map_err(|e| corrupt(format!("stored_items: {e}")))?;
        let filtered_items: BTreeSet<ItemKind> = serde_json::from_str(&self.filtered_items)
            .map_err(|e| corrupt(format!("filtered_items: {e}")))?;
        let owner = match &self.owner {
            Some(hex) => Some(PlayerId(
                u128::from_str_radix(hex, 16).map_err(|e| corrupt(format!("owner: {e}")))?,
            )),
            None => None,
        };

        Ok(LogicalSpawner {
            id: SpawnerId::from_raw(self.id.clone()),
            creature: CreatureType::new(&self.creature),
            position: Position::new(self.world.clone(), self.x, self.y, self.z),
            stack_size: self.stack_size,
            status,
            inactive_reason,
            stored_items,
            stored_experience: self.stored_experience,
            last_tick_ms: self.last_tick_ms,
            next_eligible_tick_ms: self.next_eligible_ms,
            limits,
            filtered_items,
            owner,
            player_in_range: inactive_reason != Some(InactiveReason::OutOfRange),
        })
    }
}

/// Converts an unsigned field to a signed SQL integer.
pub(crate) fn to_sql_int(value: u64, id: &str, field: &str) -> StorageResult<i64> {
    i64::try_from(value).map_err(|_| StorageError::corrupt(id, format!("{field} out of range")))
}

/// Converts a signed SQL integer back to the field type.
pub(crate) fn from_sql_int<T: TryFrom<i64>>(value: i64, id: &str, field: &str) -> StorageResult<T> {
    T::try_from(value).map_err(|_| StorageError::corrupt(id, format!("{field} out of range: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_spawner() -> LogicalSpawner {
        let mut spawner = LogicalSpawner::new(
            CreatureType::new("skeleton"),
            Position::new("world", 12, 64, -7),
            SpawnerLimits::default(),
            1_000,
        );
        spawner.stack_size = 3;
        spawner.stored_experience = 450;
        spawner.stored_items.insert(ItemKind::new("arrow"), 64);
        spawner.stored_items.insert(ItemKind::new("bone"), 12);
        spawner.filtered_items.insert(ItemKind::new("bow"));
        spawner.owner = Some(PlayerId(0xdead_beef));
        spawner
    }

    #[test]
    fn test_round_trip() {
        let spawner = create_test_spawner();
        let record = PersistedRecord::from_spawner(&spawner).unwrap();
        assert_eq!(record.stored_items, r#"{"arrow":64,"bone":12}"#);
        let restored = record.into_spawner(SpawnerLimits::default()).unwrap();
        assert_eq!(restored, spawner);
    }

    #[test]
    fn test_inactive_out_of_range_restores_range_flag() {
        let mut spawner = create_test_spawner();
        spawner.set_player_in_range(false);
        let restored = PersistedRecord::from_spawner(&spawner)
            .unwrap()
            .into_spawner(SpawnerLimits::default())
            .unwrap();
        assert_eq!(restored.status, SpawnerStatus::Inactive);
        assert!(!restored.player_in_range);
        assert_eq!(restored, spawner);
    }

    #[test]
    fn test_checksum_detects_tampering() {
        let mut record = PersistedRecord::from_spawner(&create_test_spawner()).unwrap();
        record.stored_experience += 1;
        assert!(matches!(
            record.into_spawner(SpawnerLimits::default()),
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_bad_payload_is_corrupt() {
        let mut record = PersistedRecord::from_spawner(&create_test_spawner()).unwrap();
        record.stored_items = "not json".into();
        record.checksum = record.compute_checksum();
        let err = record.into_spawner(SpawnerLimits::default()).unwrap_err();
        assert!(err.to_string().contains("stored_items"));
    }

    #[test]
    fn test_sql_int_conversions() {
        assert_eq!(to_sql_int(5, "a", "f").unwrap(), 5);
        assert!(to_sql_int(u64::MAX, "a", "f").is_err());
        assert!(from_sql_int::<u32>(-1, "a", "f").is_err());
        assert_eq!(from_sql_int::<u64>(7, "a", "f").unwrap(), 7);
    }
}
