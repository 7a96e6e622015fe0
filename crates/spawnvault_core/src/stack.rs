//! # Stack Manager
//!
//! Merges adjacent same-creature spawners into one logical spawner and
//! splits them back apart. The only place spawner identities are created
//! from or folded into other spawners.
//!
//! ## Conservation
//!
//! Merge sums stored yield. Split hands the smaller stack
//! `floor(q * small / total)` of every quantity and the larger stack the
//! rest, so the two halves always add back up to the original exactly.

use crate::error::{SpawnerError, SpawnerResult};
use crate::spawner::{LogicalSpawner, SpawnerLimits};
use crate::types::{add_item, total_quantity, ItemMap, Position, SpawnerId};

/// Creates and folds spawner identities.
#[derive(Clone, Copy, Debug, Default)]
pub struct StackManager {
    limits: SpawnerLimits,
}

impl StackManager {
    /// Creates a manager applying `limits` to every result.
    #[must_use]
    pub const fn new(limits: SpawnerLimits) -> Self {
        Self { limits }
    }

    /// Limits applied to results.
    #[must_use]
    pub const fn limits(&self) -> SpawnerLimits {
        self.limits
    }

    /// Folds `incoming` into `existing`. Inputs are left untouched.
    ///
    /// The result keeps `existing`'s identity; `incoming`'s identity ceases
    /// to exist and must be deleted by the caller.
    ///
    /// # Errors
    ///
    /// - `IncompatibleMerge` on different creature types or non-adjacent positions
    /// - `StackLimitExceeded` if the summed stack is too large
    pub fn merge(
        &self,
        existing: &LogicalSpawner,
        incoming: &LogicalSpawner,
        now_ms: u64,
    ) -> SpawnerResult<LogicalSpawner> {
        if existing.creature != incoming.creature {
            return Err(SpawnerError::IncompatibleMerge {
                reason: format!(
                    "creature types differ: {} vs {}",
                    existing.creature, incoming.creature
                ),
            });
        }
        if existing.id == incoming.id {
            return Err(SpawnerError::IncompatibleMerge {
                reason: "cannot merge a spawner with itself".into(),
            });
        }
        if !existing.position.is_adjacent(&incoming.position) {
            return Err(SpawnerError::IncompatibleMerge {
                reason: format!(
                    "{} is not adjacent to {}",
                    incoming.position, existing.position
                ),
            });
        }

        let requested = existing.stack_size.saturating_add(incoming.stack_size);
        if requested > self.limits.max_stack_size {
            return Err(SpawnerError::StackLimitExceeded {
                requested,
                limit: self.limits.max_stack_size,
            });
        }

        let mut merged = existing.clone();
        merged.limits = self.limits;
        merged.stack_size = requested;
        for (item, quantity) in &incoming.stored_items {
            add_item(&mut merged.stored_items, item, *quantity);
        }
        merged.stored_experience = merged
            .stored_experience
            .saturating_add(incoming.stored_experience);
        merged.filtered_items.extend(incoming.filtered_items.iter().cloned());
        merged.player_in_range |= incoming.player_in_range;

        let capacity = merged.capacity();
        clamp_items(&mut merged.stored_items, capacity);
        merged.stored_experience = merged.stored_experience.min(merged.max_experience());

        merged.set_stack_size(requested, now_ms);

        tracing::debug!(
            id = %merged.id,
            absorbed = %incoming.id,
            stack = merged.stack_size,
            "spawners merged"
        );
        Ok(merged)
    }

    /// Splits `amount` units off `spawner` into a new spawner at `target`.
    ///
    /// Returns `(remainder, extracted)`. The remainder keeps the original
    /// identity.
    ///
    /// # Errors
    ///
    /// `InvalidSplit` unless `0 < amount < spawner.stack_size`.
    pub fn split(
        &self,
        spawner: &LogicalSpawner,
        amount: u32,
        target: Position,
        now_ms: u64,
    ) -> SpawnerResult<(LogicalSpawner, LogicalSpawner)> {
        if amount == 0 || amount >= spawner.stack_size {
            return Err(SpawnerError::InvalidSplit {
                amount,
                stack_size: spawner.stack_size,
            });
        }

        let total = spawner.stack_size;
        let remainder_size = total - amount;

        let mut remainder = spawner.clone();
        remainder.limits = self.limits;
        remainder.stored_items.clear();
        remainder.stored_experience = 0;

        let mut extracted = remainder.clone();
        extracted.id = SpawnerId::at(&target);
        extracted.position = target;

        // Ties go to the remainder as the larger side.
        let extracted_is_smaller = amount <= remainder_size;
        let (small, large) = if extracted_is_smaller {
            (&mut extracted, &mut remainder)
        } else {
            (&mut remainder, &mut extracted)
        };
        let small_units = amount.min(remainder_size);
        small.stack_size = small_units;
        large.stack_size = total - small_units;

        for (item, quantity) in &spawner.stored_items {
            let share = floor_share(*quantity, small_units, total);
            add_item(&mut small.stored_items, item, share);
            add_item(&mut large.stored_items, item, quantity - share);
        }
        let exp_share = floor_share(spawner.stored_experience, small_units, total);
        small.stored_experience = exp_share;
        large.stored_experience = spawner.stored_experience - exp_share;

        // Rounding can leave the larger side a few items over its capacity.
        let excess = total_quantity(&large.stored_items).saturating_sub(large.capacity());
        move_items(&mut large.stored_items, &mut small.stored_items, excess);
        let exp_excess = large.stored_experience.saturating_sub(large.max_experience());
        large.stored_experience -= exp_excess;
        small.stored_experience += exp_excess;

        let (small_size, large_size) = (small.stack_size, large.stack_size);
        small.set_stack_size(small_size, now_ms);
        large.set_stack_size(large_size, now_ms);

        tracing::debug!(
            id = %remainder.id,
            extracted = %extracted.id,
            remainder_stack = remainder.stack_size,
            extracted_stack = extracted.stack_size,
            "spawner split"
        );
        Ok((remainder, extracted))
    }
}

/// `floor(quantity * part / whole)` without intermediate overflow.
#[inline]
fn floor_share(quantity: u64, part: u32, whole: u32) -> u64 {
    (u128::from(quantity) * u128::from(part) / u128::from(whole.max(1))) as u64
}

/// Drops quantities beyond `capacity`, largest keys last.
fn clamp_items(items: &mut ItemMap, capacity: u64) {
    let mut room = capacity;
    items.retain(|_, quantity| {
        *quantity = (*quantity).min(room);
        room -= *quantity;
        *quantity > 0
    });
}

/// Moves `amount` items from `from` to `to` in key order.
fn move_items(from: &mut ItemMap, to: &mut ItemMap, mut amount: u64) {
    if amount == 0 {
        return;
    }
    let mut moved = Vec::new();
    for (item, quantity) in from.iter_mut() {
        if amount == 0 {
            break;
        }
        let step = (*quantity).min(amount);
        *quantity -= step;
        amount -= step;
        moved.push((item.clone(), step));
    }
    from.retain(|_, q| *q > 0);
    for (item, quantity) in moved {
        add_item(to, &item, quantity);
    }
}
