//! # Host Adapter
//!
//! Entry points the host game calls for block and player events.

use spawnvault_core::{
    CreatureType, ItemKind, LogicalSpawner, PlayerId, Position, SaleReceipt, SpawnerError,
    SpawnerId, SpawnerStatus, YieldSnapshot,
};
use spawnvault_storage::WritePriority;

use crate::engine::{SpawnerEngine, SpawnerView};
use crate::error::{EngineError, EngineResult};
use crate::events::SpawnerEvent;

/// Result of placing a spawner block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaceOutcome {
    /// A new spawner now exists at the position.
    Created(SpawnerId),
    /// The block was absorbed by an adjacent spawner; the host should not
    /// leave a block at the placed position.
    Stacked {
        /// Spawner that grew.
        into: SpawnerId,
        /// Its stack size afterwards.
        stack_size: u32,
    },
}

/// What a broken spawner hands back to the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreakOutcome {
    /// Former spawner.
    pub id: SpawnerId,
    /// Creature tag, for the dropped spawner items.
    pub creature: CreatureType,
    /// Spawner items to drop.
    pub units: u32,
    /// Stored yield to drop.
    pub stored: YieldSnapshot,
}

/// A click in the spawner menu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Interaction {
    /// Open the menu.
    Open,
    /// Take everything.
    Collect,
    /// Take only experience.
    CollectExperience,
    /// Take some of one item.
    Take {
        /// Item kind.
        item: ItemKind,
        /// Most to take.
        quantity: u64,
    },
    /// Sell stored items.
    SellAll,
    /// Include or exclude an item from yield.
    ToggleFilter(ItemKind),
    /// Power on or off.
    SetEnabled(bool),
    /// Fold the spawner at another position into this one.
    StackFrom(Position),
    /// Move units into a new spawner.
    Split {
        /// Units to move.
        amount: u32,
        /// Where the new spawner goes.
        target: Position,
    },
}

/// Result of an [`Interaction`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractionOutcome {
    /// Menu contents.
    Opened(SpawnerView),
    /// Yield handed to the player.
    Collected(YieldSnapshot),
    /// Experience handed to the player.
    Experience(u64),
    /// Items handed to the player.
    Taken(u64),
    /// Sale result.
    Sold(SaleReceipt),
    /// Filter state after the toggle.
    FilterToggled {
        /// Item kind.
        item: ItemKind,
        /// True if now excluded.
        filtered: bool,
    },
    /// Status after the change.
    Status(SpawnerStatus),
    /// Stack size after stacking.
    Stacked(u32),
    /// Ids after a split.
    Split {
        /// Remainder spawner.
        remainder: SpawnerId,
        /// Newly created spawner.
        extracted: SpawnerId,
    },
}

impl SpawnerEngine {
    /// A player placed a spawner block.
    ///
    /// If an adjacent spawner of the same creature can take another unit
    /// the block stacks onto it; otherwise a new spawner is created. A
    /// player without build rights gets an Unclaimed spawner that never
    /// stacks.
    ///
    /// # Errors
    ///
    /// `PositionOccupied` if a spawner already sits there.
    pub fn on_block_place(
        &self,
        player: PlayerId,
        creature: CreatureType,
        position: Position,
        now_ms: u64,
    ) -> EngineResult<PlaceOutcome> {
        let _structure = self.structure_lock();
        let id = SpawnerId::at(&position);
        if self.arena.contains(&id) {
            return Err(EngineError::PositionOccupied(id));
        }

        let permitted = self.hooks.can_build_here(player, &position);
        if !self.loot().contains(&creature) {
            tracing::warn!(%id, %creature, "placed spawner has no loot table");
        }
        let incoming =
            LogicalSpawner::placed(creature, position, self.limits(), player, permitted, now_ms);

        if permitted {
            if let Some(outcome) = self.stack_onto_neighbour(&incoming, now_ms) {
                return Ok(outcome);
            }
        }

        self.persist(&incoming, WritePriority::Prompt);
        let status = incoming.status;
        self.arena.insert(incoming);
        tracing::debug!(%id, ?status, "spawner placed");
        self.emit(SpawnerEvent::Placed {
            id: id.clone(),
            status,
        });
        Ok(PlaceOutcome::Created(id))
    }

    fn stack_onto_neighbour(
        &self,
        incoming: &LogicalSpawner,
        now_ms: u64,
    ) -> Option<PlaceOutcome> {
        for neighbour in incoming.position.neighbours(1) {
            let Some(slot) = self.arena.get(&SpawnerId::at(&neighbour)) else {
                continue;
            };
            let mut guard = slot.lock();
            let Some(existing) = guard.as_mut() else {
                continue;
            };
            if existing.creature != incoming.creature {
                continue;
            }
            match self.stacks.merge(existing, incoming, now_ms) {
                Ok(merged) => {
                    *existing = merged;
                    self.persist(existing, WritePriority::Prompt);
                    self.emit(SpawnerEvent::Merged {
                        id: existing.id.clone(),
                        absorbed: incoming.id.clone(),
                        stack_size: existing.stack_size,
                    });
                    return Some(PlaceOutcome::Stacked {
                        into: existing.id.clone(),
                        stack_size: existing.stack_size,
                    });
                }
                Err(error) => {
                    tracing::debug!(into = %existing.id, %error, "not stacking onto neighbour");
                }
            }
        }
        None
    }

    /// A player broke a spawner block.
    ///
    /// The whole stack is removed and its units and stored yield are handed
    /// back for the host to drop.
    ///
    /// # Errors
    ///
    /// `NotFound`, `AccessDenied`, or a storage error if the deletion cannot
    /// be queued; the spawner then stays in place.
    pub fn on_block_break(&self, player: PlayerId, position: &Position) -> EngineResult<BreakOutcome> {
        let _structure = self.structure_lock();
        let id = SpawnerId::at(position);
        let slot = self.slot(&id)?;
        let mut guard = slot.lock();
        match guard.as_ref() {
            None => return Err(EngineError::not_found(&id)),
            Some(spawner) if !self.hooks.can_build_here(player, &spawner.position) => {
                return Err(SpawnerError::AccessDenied(id).into());
            }
            Some(_) => {}
        }

        self.forget(&id)?;
        self.arena.remove(&id);
        let spawner = guard.take().ok_or_else(|| EngineError::not_found(&id))?;
        drop(guard);

        tracing::debug!(%id, units = spawner.stack_size, "spawner broken");
        self.emit(SpawnerEvent::Removed { id: id.clone() });
        Ok(BreakOutcome {
            id,
            stored: spawner.snapshot(),
            creature: spawner.creature,
            units: spawner.stack_size,
        })
    }

    /// A player clicked in the spawner menu.
    ///
    /// # Errors
    ///
    /// Whatever the underlying operation returns; `AccessDenied` for any
    /// change by a player without build rights.
    pub fn on_player_interact(
        &self,
        player: PlayerId,
        position: &Position,
        interaction: Interaction,
        now_ms: u64,
    ) -> EngineResult<InteractionOutcome> {
        let id = SpawnerId::at(position);
        let outcome = match interaction {
            Interaction::Open => InteractionOutcome::Opened(self.view(&id, player)?),
            Interaction::Collect => InteractionOutcome::Collected(self.collect(&id, player)?),
            Interaction::CollectExperience => {
                InteractionOutcome::Experience(self.collect_experience(&id, player)?)
            }
            Interaction::Take { item, quantity } => {
                InteractionOutcome::Taken(self.take(&id, player, &item, quantity)?)
            }
            Interaction::SellAll => InteractionOutcome::Sold(self.sell_all(&id, player)?),
            Interaction::ToggleFilter(item) => {
                self.check_access(&id, player, position)?;
                let filtered = self.toggle_filter(&id, item.clone())?;
                InteractionOutcome::FilterToggled { item, filtered }
            }
            Interaction::SetEnabled(enabled) => {
                self.check_access(&id, player, position)?;
                InteractionOutcome::Status(self.set_enabled(&id, enabled)?)
            }
            Interaction::StackFrom(source) => {
                self.check_access(&id, player, position)?;
                self.check_access(&SpawnerId::at(&source), player, &source)?;
                let merged = self.merge(&id, &SpawnerId::at(&source), now_ms)?;
                InteractionOutcome::Stacked(merged.stack_size)
            }
            Interaction::Split { amount, target } => {
                self.check_access(&id, player, position)?;
                if !self.hooks.can_build_here(player, &target) {
                    return Err(SpawnerError::AccessDenied(SpawnerId::at(&target)).into());
                }
                let (remainder, extracted) = self.split(&id, amount, target, now_ms)?;
                InteractionOutcome::Split {
                    remainder: remainder.id,
                    extracted: extracted.id,
                }
            }
        };
        Ok(outcome)
    }

    /// Marks spawners in or out of range of the given player positions.
    ///
    /// Returns how many spawners changed status.
    pub fn update_player_positions(&self, players: &[Position]) -> usize {
        let range = self.activation_range();
        let mut changed = 0;
        for (_, slot) in self.arena.handles() {
            let mut guard = slot.lock();
            let Some(spawner) = guard.as_mut() else {
                continue;
            };
            let in_range = players
                .iter()
                .any(|p| p.distance(&spawner.position).is_some_and(|d| d <= range));
            if spawner.player_in_range == in_range {
                continue;
            }
            let before = (spawner.status, spawner.inactive_reason);
            if spawner.set_player_in_range(in_range) {
                changed += 1;
            }
            self.persist(spawner, WritePriority::Deferred);
            self.emit_status_change(spawner, before);
        }
        changed
    }

    fn check_access(&self, id: &SpawnerId, player: PlayerId, position: &Position) -> EngineResult<()> {
        if !self.arena.contains(id) {
            return Err(EngineError::not_found(id));
        }
        if self.hooks.can_build_here(player, position) {
            Ok(())
        } else {
            Err(SpawnerError::AccessDenied(id.clone()).into())
        }
    }
}
