//! # Spawner Engine
//!
//! Owns every live spawner and runs the operations on them.
//!
//! ## Data Flow
//!
//! ```text
//! host tick ──> tick() ──> on_tick (per spawner, try_lock) ──> deferred save
//!                                                          └─> events
//! player ────> collect / sell / ... (per spawner, lock) ──> prompt save
//!                                                        └─> events
//! ```
//!
//! ## Locking
//!
//! - Each spawner has its own mutex; the tick path uses `try_lock` and skips
//!   spawners a player is using instead of waiting
//! - Operations that create or destroy identities (place, break, merge,
//!   split) also hold one structural lock so id ownership changes atomically
//! - Saves are queued while the spawner lock is held, so the queue sees a
//!   spawner's states in the order they happened

use parking_lot::{Mutex, MutexGuard, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spawnvault_core::{
    Capability, CapabilityProvider, ConfiguredPrices, CreatureType, HookRegistry, InactiveReason,
    ItemKind, ItemMap, LogicalSpawner, LootRegistry, Money, PlayerId, Position, SaleReceipt,
    Settings, SpawnerError, SpawnerId, SpawnerLimits, SpawnerResult, SpawnerStatus, StackManager,
    TickOutcome, YieldSnapshot,
};
use spawnvault_storage::{Persistence, WritePriority, WriterStats};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::arena::{SpawnerArena, SpawnerSlot};
use crate::error::{EngineError, EngineResult};
use crate::events::{EventSender, SpawnerEvent};

/// Summary of one scheduler pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Spawners examined.
    pub visited: usize,
    /// Spawners that generated yield.
    pub accumulated: usize,
    /// Spawners skipped because a player held them.
    pub busy: usize,
    /// Spawners that filled up this pass.
    pub became_full: usize,
    /// Spawners disabled by a resolver failure.
    pub disabled: usize,
    /// Items stored this pass.
    pub items_added: u64,
    /// Experience stored this pass.
    pub experience_added: u64,
}

/// Outcome of startup rehydration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RehydrateReport {
    /// Spawners now live.
    pub loaded: usize,
    /// Rows skipped as unreadable.
    pub skipped: usize,
}

/// What the spawner menu shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpawnerView {
    /// Spawner.
    pub id: SpawnerId,
    /// Creature tag.
    pub creature: CreatureType,
    /// Status.
    pub status: SpawnerStatus,
    /// Why Inactive, if it is.
    pub inactive_reason: Option<InactiveReason>,
    /// Stack size.
    pub stack_size: u32,
    /// Stored yield.
    pub stored: YieldSnapshot,
    /// Item capacity.
    pub capacity: u64,
    /// Experience capacity.
    pub max_experience: u64,
    /// Filtered item kinds.
    pub filtered_items: BTreeSet<ItemKind>,
    /// Value of stored items at current prices.
    pub estimated_value: Money,
    /// Whether a sell button should be offered.
    pub selling_available: bool,
}

/// Engine counters.
#[derive(Clone, Debug, Default)]
pub struct EngineStats {
    /// Live spawners.
    pub spawners: usize,
    /// Persistence writer counters.
    pub writer: WriterStats,
}

/// The virtual spawner engine.
pub struct SpawnerEngine {
    limits: SpawnerLimits,
    activation_range: u32,
    call_timeout: Duration,
    pub(crate) arena: SpawnerArena,
    pub(crate) stacks: StackManager,
    loot: RwLock<Arc<LootRegistry>>,
    pub(crate) hooks: Arc<HookRegistry>,
    owns_prices: AtomicBool,
    persistence: Persistence,
    events: EventSender,
    rng: Mutex<StdRng>,
    disabled_logged: Mutex<HashSet<SpawnerId>>,
    structure: Mutex<()>,
}

impl SpawnerEngine {
    /// Validates `settings`, opens the configured backend and builds the engine.
    ///
    /// `hooks` should already hold the detected collaborators.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` or any storage error raised while opening.
    pub fn open(
        settings: &Settings,
        hooks: Arc<HookRegistry>,
        events: EventSender,
    ) -> EngineResult<Self> {
        settings.validate()?;
        let persistence = Persistence::open(&settings.storage, settings.limits())?;
        Ok(Self::new(settings, persistence, hooks, events))
    }

    /// Builds the engine over an already opened persistence layer.
    ///
    /// Configured sale prices are registered as a price lookup unless a
    /// detected collaborator already provides one.
    #[must_use]
    pub fn new(
        settings: &Settings,
        persistence: Persistence,
        hooks: Arc<HookRegistry>,
        events: EventSender,
    ) -> Self {
        let loot = settings.loot_registry();
        let prices = ConfiguredPrices::new(loot.price_list());
        let owns_prices =
            !prices.is_empty() && hooks.register(CapabilityProvider::PriceLookup(Arc::new(prices)));
        let rng = match settings.spawner.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let limits = settings.limits();

        tracing::info!(
            creatures = loot.len(),
            backend = persistence.backend(),
            hooks = ?hooks,
            "spawner engine ready"
        );

        Self {
            limits,
            activation_range: settings.spawner.activation_range,
            call_timeout: settings.economy.call_timeout(),
            arena: SpawnerArena::new(),
            stacks: StackManager::new(limits),
            loot: RwLock::new(Arc::new(loot)),
            hooks,
            owns_prices: AtomicBool::new(owns_prices),
            persistence,
            events,
            rng: Mutex::new(rng),
            disabled_logged: Mutex::new(HashSet::new()),
            structure: Mutex::new(()),
        }
    }

    /// Loads every stored spawner into the arena.
    ///
    /// Unreadable rows are skipped; spawners already live keep their state.
    ///
    /// # Errors
    ///
    /// Only if the backend cannot be read at all.
    pub fn rehydrate(&self) -> EngineResult<RehydrateReport> {
        let report = self.persistence.load_all()?;
        let skipped = report.skipped.len();
        let mut loaded = 0;
        for spawner in report.spawners {
            let id = spawner.id.clone();
            if self.arena.insert(spawner) {
                loaded += 1;
            } else {
                tracing::warn!(%id, "spawner already live, stored copy ignored");
            }
        }
        tracing::info!(loaded, skipped, "spawners rehydrated");
        Ok(RehydrateReport { loaded, skipped })
    }

    // =========================================================================
    // Scheduler entry point
    // =========================================================================

    /// Runs one scheduler pass. Never blocks on a spawner and never waits
    /// for the database.
    pub fn tick(&self, now_ms: u64) -> TickReport {
        let loot = Arc::clone(&*self.loot.read());
        let mut rng = StdRng::seed_from_u64(self.rng.lock().gen());
        let mut report = TickReport::default();

        for (id, slot) in self.arena.handles() {
            let Some(mut guard) = slot.try_lock() else {
                report.busy += 1;
                continue;
            };
            let Some(spawner) = guard.as_mut() else {
                continue;
            };
            report.visited += 1;

            match spawner.on_tick(now_ms, &loot, &mut rng) {
                TickOutcome::Skipped => {}
                TickOutcome::Accumulated {
                    added,
                    overflow,
                    became_full,
                } => {
                    report.accumulated += 1;
                    report.items_added += added.total_items();
                    report.experience_added += added.experience;
                    self.persist(spawner, WritePriority::Deferred);

                    if !added.is_empty() {
                        self.emit(SpawnerEvent::YieldAccumulated {
                            id: id.clone(),
                            added,
                        });
                    }
                    if !overflow.is_empty() {
                        self.emit(SpawnerEvent::Overflow {
                            id: id.clone(),
                            dropped_items: overflow.total_items(),
                            dropped_experience: overflow.experience,
                        });
                    }
                    if became_full {
                        report.became_full += 1;
                        self.emit(SpawnerEvent::StatusChanged {
                            id: id.clone(),
                            status: spawner.status,
                            reason: spawner.inactive_reason,
                        });
                    }
                }
                TickOutcome::Disabled(error) => {
                    report.disabled += 1;
                    if self.disabled_logged.lock().insert(id.clone()) {
                        tracing::warn!(%id, %error, "spawner disabled");
                    }
                    self.persist(spawner, WritePriority::Deferred);
                    self.emit(SpawnerEvent::Disabled {
                        id: id.clone(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        tracing::trace!(?report, "tick pass complete");
        report
    }

    // =========================================================================
    // Player operations
    // =========================================================================

    /// Takes everything stored.
    ///
    /// # Errors
    ///
    /// `NotFound` or `AccessDenied`.
    pub fn collect(&self, id: &SpawnerId, player: PlayerId) -> EngineResult<YieldSnapshot> {
        let taken = self.mutate(id, WritePriority::Prompt, |s| s.collect(player, &self.hooks))?;
        self.emit(SpawnerEvent::Collected {
            id: id.clone(),
            player,
            taken: taken.clone(),
        });
        Ok(taken)
    }

    /// Takes up to `quantity` of one item kind. Returns the amount taken.
    ///
    /// # Errors
    ///
    /// `NotFound` or `AccessDenied`.
    pub fn take(
        &self,
        id: &SpawnerId,
        player: PlayerId,
        item: &ItemKind,
        quantity: u64,
    ) -> EngineResult<u64> {
        let taken = self.mutate(id, WritePriority::Prompt, |s| {
            s.take(player, &self.hooks, item, quantity)
        })?;
        if taken > 0 {
            let mut items = ItemMap::new();
            items.insert(item.clone(), taken);
            self.emit(SpawnerEvent::Collected {
                id: id.clone(),
                player,
                taken: YieldSnapshot {
                    items,
                    experience: 0,
                },
            });
        }
        Ok(taken)
    }

    /// Takes only the stored experience.
    ///
    /// # Errors
    ///
    /// `NotFound` or `AccessDenied`.
    pub fn collect_experience(&self, id: &SpawnerId, player: PlayerId) -> EngineResult<u64> {
        let experience = self.mutate(id, WritePriority::Prompt, |s| {
            s.collect_experience(player, &self.hooks)
        })?;
        if experience > 0 {
            self.emit(SpawnerEvent::Collected {
                id: id.clone(),
                player,
                taken: YieldSnapshot {
                    items: ItemMap::new(),
                    experience,
                },
            });
        }
        Ok(experience)
    }

    /// Sells stored items and deposits the proceeds.
    ///
    /// Collaborator calls are bounded by the configured timeout; on any
    /// failure storage is left exactly as it was.
    ///
    /// # Errors
    ///
    /// `NotFound`, `AccessDenied`, `NoItems` or `EconomyUnavailable`.
    pub fn sell_all(&self, id: &SpawnerId, player: PlayerId) -> EngineResult<SaleReceipt> {
        let timeout = self.call_timeout;
        let result = self.mutate(id, WritePriority::Prompt, |s| {
            s.sell_all(player, &self.hooks, timeout)
        });
        match &result {
            Ok(receipt) => {
                tracing::debug!(%id, %player, amount = %receipt.amount, "items sold");
                self.emit(SpawnerEvent::Sold {
                    id: id.clone(),
                    player,
                    amount: receipt.amount,
                    items_sold: receipt.items_sold.values().sum(),
                });
            }
            Err(error) => tracing::warn!(%id, %player, %error, "sale failed, storage unchanged"),
        }
        result
    }

    /// Value of stored items at current prices.
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub fn estimated_value(&self, id: &SpawnerId) -> EngineResult<Money> {
        self.arena
            .with(id, |s| s.estimated_value(&self.hooks))
            .ok_or_else(|| EngineError::not_found(id))
    }

    /// Menu contents for `player`.
    ///
    /// # Errors
    ///
    /// `NotFound` or `AccessDenied`.
    pub fn view(&self, id: &SpawnerId, player: PlayerId) -> EngineResult<SpawnerView> {
        let view = self
            .arena
            .with(id, |s| {
                if !self.hooks.can_build_here(player, &s.position) {
                    return Err(SpawnerError::AccessDenied(s.id.clone()));
                }
                Ok(SpawnerView {
                    id: s.id.clone(),
                    creature: s.creature.clone(),
                    status: s.status,
                    inactive_reason: s.inactive_reason,
                    stack_size: s.stack_size,
                    stored: s.snapshot(),
                    capacity: s.capacity(),
                    max_experience: s.max_experience(),
                    filtered_items: s.filtered_items.clone(),
                    estimated_value: s.estimated_value(&self.hooks),
                    selling_available: self.hooks.selling_available(),
                })
            })
            .ok_or_else(|| EngineError::not_found(id))??;
        Ok(view)
    }

    /// Copy of a spawner's current state.
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub fn snapshot(&self, id: &SpawnerId) -> EngineResult<LogicalSpawner> {
        self.arena
            .with(id, |s| s.clone())
            .ok_or_else(|| EngineError::not_found(id))
    }

    /// Flips whether `item` is excluded from yield. Returns the new state.
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub fn toggle_filter(&self, id: &SpawnerId, item: ItemKind) -> EngineResult<bool> {
        self.mutate(id, WritePriority::Prompt, |s| Ok(s.toggle_filter(item)))
    }

    /// Powers a spawner on or off. Returns the resulting status.
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub fn set_enabled(&self, id: &SpawnerId, enabled: bool) -> EngineResult<SpawnerStatus> {
        let status = self.mutate(id, WritePriority::Prompt, |s| {
            s.set_enabled(enabled);
            Ok(s.status)
        })?;
        if enabled {
            self.disabled_logged.lock().remove(id);
        }
        Ok(status)
    }

    /// Records whether a player is near. Returns true if the status changed.
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub fn set_player_in_range(&self, id: &SpawnerId, in_range: bool) -> EngineResult<bool> {
        self.mutate(id, WritePriority::Deferred, |s| Ok(s.set_player_in_range(in_range)))
    }

    // =========================================================================
    // Stacking
    // =========================================================================

    /// Folds `source` into `target`. `source` ceases to exist.
    ///
    /// # Errors
    ///
    /// `NotFound`, `IncompatibleMerge`, `StackLimitExceeded`, or a storage
    /// error if the source's deletion cannot be queued. Both spawners are
    /// unchanged on error.
    pub fn merge(
        &self,
        target: &SpawnerId,
        source: &SpawnerId,
        now_ms: u64,
    ) -> EngineResult<LogicalSpawner> {
        if target == source {
            return Err(SpawnerError::IncompatibleMerge {
                reason: "cannot merge a spawner with itself".into(),
            }
            .into());
        }
        let _structure = self.structure.lock();
        let target_slot = self.slot(target)?;
        let source_slot = self.slot(source)?;
        let (mut target_guard, mut source_guard) =
            lock_pair(&target_slot, target, &source_slot, source);

        let Some(existing) = target_guard.as_mut() else {
            return Err(EngineError::not_found(target));
        };
        let Some(incoming) = source_guard.as_ref() else {
            return Err(EngineError::not_found(source));
        };
        let before = (existing.status, existing.inactive_reason);
        let merged = self.stacks.merge(existing, incoming, now_ms)?;
        self.forget(source)?;
        *existing = merged;

        self.arena.remove(source);
        source_guard.take();

        self.persist(existing, WritePriority::Prompt);
        self.emit(SpawnerEvent::Merged {
            id: target.clone(),
            absorbed: source.clone(),
            stack_size: existing.stack_size,
        });
        self.emit_status_change(existing, before);
        Ok(existing.clone())
    }

    /// Moves `amount` units into a new spawner at `target`.
    ///
    /// Returns `(remainder, extracted)`.
    ///
    /// # Errors
    ///
    /// `NotFound`, `InvalidSplit`, or `PositionOccupied` if `target` holds a spawner.
    pub fn split(
        &self,
        id: &SpawnerId,
        amount: u32,
        target: Position,
        now_ms: u64,
    ) -> EngineResult<(LogicalSpawner, LogicalSpawner)> {
        let _structure = self.structure.lock();
        let target_id = SpawnerId::at(&target);
        if self.arena.contains(&target_id) {
            return Err(EngineError::PositionOccupied(target_id));
        }

        let slot = self.slot(id)?;
        let mut guard = slot.lock();
        let spawner = guard.as_mut().ok_or_else(|| EngineError::not_found(id))?;
        let before = (spawner.status, spawner.inactive_reason);
        let (remainder, extracted) = self.stacks.split(spawner, amount, target, now_ms)?;
        *spawner = remainder.clone();
        self.persist(spawner, WritePriority::Prompt);
        self.emit_status_change(spawner, before);
        drop(guard);

        // Queued before it becomes reachable so no later save can precede it.
        self.persist(&extracted, WritePriority::Prompt);
        self.arena.insert(extracted.clone());

        self.emit(SpawnerEvent::Split {
            id: id.clone(),
            extracted: extracted.id.clone(),
            amount,
        });
        Ok((remainder, extracted))
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Replaces the loot tables atomically. Running ticks finish on the old ones.
    pub fn reload_loot(&self, registry: LootRegistry) {
        let owned = self.owns_prices.load(Ordering::Acquire);
        if owned || !self.hooks.has(Capability::PriceLookup) {
            let prices = ConfiguredPrices::new(registry.price_list());
            if prices.is_empty() {
                if owned {
                    self.hooks.unregister(Capability::PriceLookup);
                }
                self.owns_prices.store(false, Ordering::Release);
            } else {
                self.hooks
                    .register_override(CapabilityProvider::PriceLookup(Arc::new(prices)));
                self.owns_prices.store(true, Ordering::Release);
            }
        }
        tracing::info!(creatures = registry.len(), "loot tables reloaded");
        *self.loot.write() = Arc::new(registry);
    }

    /// Current loot tables.
    #[must_use]
    pub fn loot(&self) -> Arc<LootRegistry> {
        Arc::clone(&*self.loot.read())
    }

    /// Collaborator registry.
    #[must_use]
    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    /// Limits applied to new spawners.
    #[must_use]
    pub fn limits(&self) -> SpawnerLimits {
        self.limits
    }

    /// Blocks within which a player keeps spawners active.
    #[must_use]
    pub fn activation_range(&self) -> u32 {
        self.activation_range
    }

    /// Ids of every live spawner.
    #[must_use]
    pub fn ids(&self) -> Vec<SpawnerId> {
        let mut ids: Vec<_> = self.arena.handles().into_iter().map(|(id, _)| id).collect();
        ids.sort();
        ids
    }

    /// Number of live spawners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Returns true if no spawner is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Blocks until every queued save has been written.
    ///
    /// # Errors
    ///
    /// `PersistenceTransientFailure` if some records stay dirty.
    pub fn flush(&self) -> EngineResult<()> {
        self.persistence.flush()?;
        Ok(())
    }

    /// Persistence layer.
    #[must_use]
    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    /// Counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            spawners: self.arena.len(),
            writer: self.persistence.stats(),
        }
    }

    // =========================================================================
    // Internals shared with the host adapter
    // =========================================================================

    /// Runs `f` in the spawner's exclusive section and queues a save on success.
    pub(crate) fn mutate<T>(
        &self,
        id: &SpawnerId,
        priority: WritePriority,
        f: impl FnOnce(&mut LogicalSpawner) -> SpawnerResult<T>,
    ) -> EngineResult<T> {
        self.arena
            .with(id, |spawner| {
                let before = (spawner.status, spawner.inactive_reason);
                let value = f(spawner)?;
                self.persist(spawner, priority);
                self.emit_status_change(spawner, before);
                Ok(value)
            })
            .ok_or_else(|| EngineError::not_found(id))?
    }

    pub(crate) fn slot(&self, id: &SpawnerId) -> EngineResult<SpawnerSlot> {
        self.arena.get(id).ok_or_else(|| EngineError::not_found(id))
    }

    pub(crate) fn structure_lock(&self) -> MutexGuard<'_, ()> {
        self.structure.lock()
    }

    /// Queues a save. Failures are logged; memory stays authoritative.
    pub(crate) fn persist(&self, spawner: &LogicalSpawner, priority: WritePriority) {
        let queued = match priority {
            WritePriority::Deferred => self.persistence.save(spawner),
            WritePriority::Prompt => self.persistence.save_prompt(spawner),
        };
        if let Err(error) = queued {
            tracing::warn!(id = %spawner.id, %error, "spawner save not queued");
        }
    }

    /// Queues the record's deletion and drops per-spawner bookkeeping.
    ///
    /// Runs before the identity leaves the arena so a refused delete
    /// leaves everything as it was.
    pub(crate) fn forget(&self, id: &SpawnerId) -> EngineResult<()> {
        if let Err(error) = self.persistence.delete(id) {
            tracing::warn!(%id, %error, "spawner delete not queued");
            return Err(error.into());
        }
        self.disabled_logged.lock().remove(id);
        Ok(())
    }

    pub(crate) fn emit(&self, event: SpawnerEvent) {
        self.events.send(event);
    }

    pub(crate) fn emit_status_change(
        &self,
        spawner: &LogicalSpawner,
        before: (SpawnerStatus, Option<InactiveReason>),
    ) {
        if (spawner.status, spawner.inactive_reason) != before {
            self.emit(SpawnerEvent::StatusChanged {
                id: spawner.id.clone(),
                status: spawner.status,
                reason: spawner.inactive_reason,
            });
        }
    }
}

/// Locks two distinct slots in id order.
fn lock_pair<'a>(
    a: &'a SpawnerSlot,
    a_id: &SpawnerId,
    b: &'a SpawnerSlot,
    b_id: &SpawnerId,
) -> (
    MutexGuard<'a, Option<LogicalSpawner>>,
    MutexGuard<'a, Option<LogicalSpawner>>,
) {
    if a_id < b_id {
        let first = a.lock();
        (first, b.lock())
    } else {
        let first = b.lock();
        (a.lock(), first)
    }
}
