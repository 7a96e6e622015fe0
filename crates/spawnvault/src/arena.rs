//! # Spawner Arena
//!
//! Live spawners keyed by id, each behind its own mutex.
//!
//! The map lock is held only long enough to clone a handle, so unrelated
//! spawners never contend. A slot holding `None` was retired (merged away
//! or broken) while someone was waiting on it; treat it as missing.

use parking_lot::{Mutex, RwLock};
use spawnvault_core::{LogicalSpawner, SpawnerId};
use std::collections::HashMap;
use std::sync::Arc;

/// One spawner's exclusive section.
pub type SpawnerSlot = Arc<Mutex<Option<LogicalSpawner>>>;

/// Arena of live spawners.
#[derive(Default)]
pub struct SpawnerArena {
    slots: RwLock<HashMap<SpawnerId, SpawnerSlot>>,
}

impl SpawnerArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a spawner. Returns false, leaving the arena unchanged, if the id is taken.
    pub fn insert(&self, spawner: LogicalSpawner) -> bool {
        let mut slots = self.slots.write();
        if slots.contains_key(&spawner.id) {
            return false;
        }
        slots.insert(spawner.id.clone(), Arc::new(Mutex::new(Some(spawner))));
        true
    }

    /// Handle to one spawner.
    #[must_use]
    pub fn get(&self, id: &SpawnerId) -> Option<SpawnerSlot> {
        self.slots.read().get(id).cloned()
    }

    /// Unlinks a spawner. The caller empties the slot under its lock.
    pub fn remove(&self, id: &SpawnerId) -> Option<SpawnerSlot> {
        self.slots.write().remove(id)
    }

    /// Returns true if the id is live.
    #[must_use]
    pub fn contains(&self, id: &SpawnerId) -> bool {
        self.slots.read().contains_key(id)
    }

    /// Handles to every spawner, for one pass of the scheduler.
    #[must_use]
    pub fn handles(&self) -> Vec<(SpawnerId, SpawnerSlot)> {
        self.slots
            .read()
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect()
    }

    /// Number of live spawners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Returns true if no spawner is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Runs `f` inside the spawner's exclusive section, waiting for it.
    ///
    /// Returns `None` if the id is unknown or was retired meanwhile.
    pub fn with<T>(&self, id: &SpawnerId, f: impl FnOnce(&mut LogicalSpawner) -> T) -> Option<T> {
        let slot = self.get(id)?;
        let mut guard = slot.lock();
        guard.as_mut().map(f)
    }
}
