//! # Spawner State Machine
//!
//! One logical spawner: stored yield, status, stack size and spawn timer.
//!
//! ```text
//!            tick, room left
//!          +----------------+
//!          v                |
//!       Active -------------+
//!        |  ^
//!   full |  | space freed / player back in range
//!        v  |
//!      Inactive
//!
//!   any --toggle off--> Disabled --toggle on--> Active (then re-evaluated)
//! ```
//!
//! The struct holds no lock. Callers wrap each spawner in its own mutex and
//! call these methods inside that exclusive section.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::{SpawnerError, SpawnerResult};
use crate::hooks::{call_with_timeout, deposit_with_timeout, HookRegistry};
use crate::loot::LootRegistry;
use crate::money::Money;
use crate::types::{
    add_item, total_quantity, CreatureType, ItemKind, ItemMap, PlayerId, Position, SpawnerId,
    YieldSnapshot,
};

/// Lifecycle status of a logical spawner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpawnerStatus {
    /// Ticking and accumulating.
    Active,
    /// Paused: out of range, full, or placed without permission.
    Inactive,
    /// Explicitly powered off, or its creature type is unknown.
    Disabled,
}

impl SpawnerStatus {
    /// Stable tag used in persisted records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Disabled => "disabled",
        }
    }

    /// Parses a persisted tag.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// Why an Inactive spawner is paused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InactiveReason {
    /// Items and experience are both full.
    AtCapacity,
    /// No player within activation range.
    OutOfRange,
    /// Placed where the placer could not build.
    Unclaimed,
}

impl InactiveReason {
    /// Stable tag used in persisted records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AtCapacity => "at_capacity",
            Self::OutOfRange => "out_of_range",
            Self::Unclaimed => "unclaimed",
        }
    }

    /// Parses a persisted tag.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "at_capacity" => Some(Self::AtCapacity),
            "out_of_range" => Some(Self::OutOfRange),
            "unclaimed" => Some(Self::Unclaimed),
            _ => None,
        }
    }
}

/// Per-unit sizing and pacing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnerLimits {
    /// Item capacity per stack unit.
    pub base_capacity: u64,
    /// Experience capacity per stack unit.
    pub base_max_experience: u64,
    /// Largest allowed stack.
    pub max_stack_size: u32,
    /// Milliseconds between spawn cycles.
    pub spawn_interval_ms: u64,
}

impl Default for SpawnerLimits {
    fn default() -> Self {
        Self {
            base_capacity: 45 * 64,
            base_max_experience: 1_000,
            max_stack_size: 1_000,
            spawn_interval_ms: 26_000,
        }
    }
}

/// What a tick did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not eligible (timer, status).
    Skipped,
    /// Yield was generated.
    Accumulated {
        /// Stored this cycle.
        added: YieldSnapshot,
        /// Generated but clamped away.
        overflow: YieldSnapshot,
        /// The spawner just hit capacity and paused.
        became_full: bool,
    },
    /// The resolver failed and the spawner was disabled.
    Disabled(SpawnerError),
}

/// Result of a successful sale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleReceipt {
    /// Amount deposited.
    pub amount: Money,
    /// Items removed from storage.
    pub items_sold: ItemMap,
}

/// The unit of simulation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogicalSpawner {
    /// Stable identity.
    pub id: SpawnerId,
    /// Loot table selector.
    pub creature: CreatureType,
    /// Anchor block.
    pub position: Position,
    /// Number of merged units, at least 1.
    pub stack_size: u32,
    /// Lifecycle status.
    pub status: SpawnerStatus,
    /// Why the spawner is Inactive, if it is.
    pub inactive_reason: Option<InactiveReason>,
    /// Accumulated items.
    pub stored_items: ItemMap,
    /// Accumulated experience.
    pub stored_experience: u64,
    /// Last cycle that generated yield.
    pub last_tick_ms: u64,
    /// Earliest time the next cycle may run.
    pub next_eligible_tick_ms: u64,
    /// Sizing and pacing.
    pub limits: SpawnerLimits,
    /// Item kinds excluded from generated yield.
    pub filtered_items: BTreeSet<ItemKind>,
    /// Placing player, for claim checks.
    pub owner: Option<PlayerId>,
    /// Whether a player is within activation range.
    pub player_in_range: bool,
}

impl LogicalSpawner {
    /// A freshly placed single-unit spawner.
    #[must_use]
    pub fn new(creature: CreatureType, position: Position, limits: SpawnerLimits, now_ms: u64) -> Self {
        Self {
            id: SpawnerId::at(&position),
            creature,
            position,
            stack_size: 1,
            status: SpawnerStatus::Active,
            inactive_reason: None,
            stored_items: ItemMap::new(),
            stored_experience: 0,
            last_tick_ms: now_ms,
            next_eligible_tick_ms: now_ms.saturating_add(limits.spawn_interval_ms),
            limits,
            filtered_items: BTreeSet::new(),
            owner: None,
            player_in_range: true,
        }
    }

    /// A spawner placed by `owner`; Inactive when the land check refused.
    #[must_use]
    pub fn placed(
        creature: CreatureType,
        position: Position,
        limits: SpawnerLimits,
        owner: PlayerId,
        permitted: bool,
        now_ms: u64,
    ) -> Self {
        let mut spawner = Self::new(creature, position, limits, now_ms);
        spawner.owner = Some(owner);
        if !permitted {
            spawner.status = SpawnerStatus::Inactive;
            spawner.inactive_reason = Some(InactiveReason::Unclaimed);
        }
        spawner
    }

    /// Item capacity for the current stack.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.limits
            .base_capacity
            .saturating_mul(u64::from(self.stack_size))
    }

    /// Experience capacity for the current stack.
    #[inline]
    #[must_use]
    pub fn max_experience(&self) -> u64 {
        self.limits
            .base_max_experience
            .saturating_mul(u64::from(self.stack_size))
    }

    /// Sum of stored item quantities.
    #[inline]
    #[must_use]
    pub fn total_items(&self) -> u64 {
        total_quantity(&self.stored_items)
    }

    /// Items and experience are both full.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total_items() >= self.capacity() && self.stored_experience >= self.max_experience()
    }

    /// Copy of what is stored.
    #[must_use]
    pub fn snapshot(&self) -> YieldSnapshot {
        YieldSnapshot {
            items: self.stored_items.clone(),
            experience: self.stored_experience,
        }
    }

    /// Runs one spawn cycle if eligible.
    pub fn on_tick<R: Rng>(&mut self, now_ms: u64, loot: &LootRegistry, rng: &mut R) -> TickOutcome {
        if self.status != SpawnerStatus::Active || now_ms < self.next_eligible_tick_ms {
            return TickOutcome::Skipped;
        }

        let generated = match loot.resolve_filtered(
            &self.creature,
            self.stack_size,
            &self.filtered_items,
            rng,
        ) {
            Ok(generated) => generated,
            Err(e) => {
                self.status = SpawnerStatus::Disabled;
                self.inactive_reason = None;
                return TickOutcome::Disabled(e);
            }
        };

        let (added, overflow) = self.absorb(generated);
        self.last_tick_ms = now_ms;
        self.next_eligible_tick_ms = now_ms.saturating_add(self.limits.spawn_interval_ms);

        let became_full = self.is_at_capacity();
        if became_full {
            self.status = SpawnerStatus::Inactive;
            self.inactive_reason = Some(InactiveReason::AtCapacity);
        }

        TickOutcome::Accumulated {
            added,
            overflow,
            became_full,
        }
    }

    /// Stores as much of `incoming` as fits. Returns (stored, clamped away).
    pub fn absorb(&mut self, incoming: YieldSnapshot) -> (YieldSnapshot, YieldSnapshot) {
        let mut added = YieldSnapshot::default();
        let mut overflow = YieldSnapshot::default();

        let mut room = self.capacity().saturating_sub(self.total_items());
        for (item, quantity) in incoming.items {
            let accepted = quantity.min(room);
            room -= accepted;
            add_item(&mut self.stored_items, &item, accepted);
            add_item(&mut added.items, &item, accepted);
            add_item(&mut overflow.items, &item, quantity - accepted);
        }

        let exp_room = self.max_experience().saturating_sub(self.stored_experience);
        added.experience = incoming.experience.min(exp_room);
        overflow.experience = incoming.experience - added.experience;
        self.stored_experience += added.experience;

        (added, overflow)
    }

    /// Takes everything stored.
    ///
    /// # Errors
    ///
    /// `AccessDenied` if the land check refuses `player`; state is unchanged.
    pub fn collect(&mut self, player: PlayerId, hooks: &HookRegistry) -> SpawnerResult<YieldSnapshot> {
        self.check_access(player, hooks)?;
        let snapshot = YieldSnapshot {
            items: std::mem::take(&mut self.stored_items),
            experience: std::mem::take(&mut self.stored_experience),
        };
        self.refresh_status();
        Ok(snapshot)
    }

    /// Takes up to `quantity` of one item kind. Returns the amount taken.
    ///
    /// # Errors
    ///
    /// `AccessDenied` if the land check refuses `player`.
    pub fn take(
        &mut self,
        player: PlayerId,
        hooks: &HookRegistry,
        item: &ItemKind,
        quantity: u64,
    ) -> SpawnerResult<u64> {
        self.check_access(player, hooks)?;
        let Some(stored) = self.stored_items.get_mut(item) else {
            return Ok(0);
        };
        let taken = quantity.min(*stored);
        *stored -= taken;
        if *stored == 0 {
            self.stored_items.remove(item);
        }
        self.refresh_status();
        Ok(taken)
    }

    /// Takes only the stored experience.
    ///
    /// # Errors
    ///
    /// `AccessDenied` if the land check refuses `player`.
    pub fn collect_experience(&mut self, player: PlayerId, hooks: &HookRegistry) -> SpawnerResult<u64> {
        self.check_access(player, hooks)?;
        let experience = std::mem::take(&mut self.stored_experience);
        self.refresh_status();
        Ok(experience)
    }

    /// Sells stored items and deposits the proceeds.
    ///
    /// Either the deposit succeeds and the sold items leave storage, or
    /// storage is left exactly as it was. Experience is never sold.
    ///
    /// # Errors
    ///
    /// - `AccessDenied` if the land check refuses `player`
    /// - `NoItems` if nothing sellable is stored
    /// - `EconomyUnavailable` on missing providers, rejection or timeout
    pub fn sell_all(
        &mut self,
        player: PlayerId,
        hooks: &HookRegistry,
        timeout: Duration,
    ) -> SpawnerResult<SaleReceipt> {
        self.check_access(player, hooks)?;
        if self.stored_items.is_empty() {
            return Err(SpawnerError::NoItems);
        }
        let Some(currency) = hooks.currency() else {
            return Err(economy_unavailable("no currency provider"));
        };

        let (items_sold, amount) = self.quote(hooks, timeout)?;
        if items_sold.is_empty() {
            return Err(SpawnerError::NoItems);
        }

        match deposit_with_timeout(currency, player, amount, timeout) {
            Some(true) => {}
            Some(false) => return Err(economy_unavailable("deposit refused")),
            None => return Err(economy_unavailable("deposit timed out")),
        }

        for (item, quantity) in &items_sold {
            if let Some(stored) = self.stored_items.get_mut(item) {
                *stored = stored.saturating_sub(*quantity);
                if *stored == 0 {
                    self.stored_items.remove(item);
                }
            }
        }
        self.refresh_status();

        Ok(SaleReceipt { amount, items_sold })
    }

    /// Current value of stored items by price lookup, zero when unpriced.
    #[must_use]
    pub fn estimated_value(&self, hooks: &HookRegistry) -> Money {
        let Some(prices) = hooks.price_lookup() else {
            return Money::ZERO;
        };
        self.stored_items
            .iter()
            .filter_map(|(item, qty)| prices.price_of(item).map(|p| p.checked_mul_int(*qty)))
            .fold(Money::ZERO, |acc, v| acc + v.unwrap_or(Money::MAX))
    }

    /// Values the stored items. Returns the items covered and their total.
    fn quote(&self, hooks: &HookRegistry, timeout: Duration) -> SpawnerResult<(ItemMap, Money)> {
        if let Some(seller) = hooks.seller() {
            let items = self.stored_items.clone();
            let quote = call_with_timeout(timeout, move || seller.sell(&items))
                .ok_or_else(|| economy_unavailable("shop timed out"))?;
            if !quote.success {
                return Err(economy_unavailable("shop rejected the items"));
            }
            return Ok((self.stored_items.clone(), quote.total));
        }

        let Some(prices) = hooks.price_lookup() else {
            return Err(economy_unavailable("no selling provider"));
        };
        let mut priced = ItemMap::new();
        let mut total = Money::ZERO;
        for (item, quantity) in &self.stored_items {
            if let Some(price) = prices.price_of(item) {
                total = total.safe_add(price.times(*quantity)?)?;
                priced.insert(item.clone(), *quantity);
            }
        }
        Ok((priced, total))
    }

    /// Flips whether `item` is excluded from yield. Returns the new state.
    pub fn toggle_filter(&mut self, item: ItemKind) -> bool {
        if self.filtered_items.remove(&item) {
            false
        } else {
            self.filtered_items.insert(item);
            true
        }
    }

    /// Powers the spawner on or off. Returns true if the status changed.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        let before = self.status;
        if enabled {
            if self.status == SpawnerStatus::Disabled
                || self.inactive_reason == Some(InactiveReason::Unclaimed)
            {
                self.status = SpawnerStatus::Active;
                self.inactive_reason = None;
                self.refresh_status();
            }
        } else {
            self.status = SpawnerStatus::Disabled;
            self.inactive_reason = None;
        }
        before != self.status
    }

    /// Records player proximity. Returns true if the status changed.
    pub fn set_player_in_range(&mut self, in_range: bool) -> bool {
        let before = self.status;
        self.player_in_range = in_range;
        self.refresh_status();
        before != self.status
    }

    /// Changes the stack size and restarts the spawn timer.
    pub fn set_stack_size(&mut self, stack_size: u32, now_ms: u64) {
        self.stack_size = stack_size.max(1);
        self.next_eligible_tick_ms = now_ms.saturating_add(self.limits.spawn_interval_ms);
        self.refresh_status();
    }

    /// Re-derives Active/Inactive from range and capacity.
    ///
    /// Disabled and unclaimed spawners are left alone.
    pub fn refresh_status(&mut self) {
        if self.status == SpawnerStatus::Disabled
            || self.inactive_reason == Some(InactiveReason::Unclaimed)
        {
            return;
        }
        let reason = if !self.player_in_range {
            Some(InactiveReason::OutOfRange)
        } else if self.is_at_capacity() {
            Some(InactiveReason::AtCapacity)
        } else {
            None
        };
        self.inactive_reason = reason;
        self.status = if reason.is_some() {
            SpawnerStatus::Inactive
        } else {
            SpawnerStatus::Active
        };
    }

    fn check_access(&self, player: PlayerId, hooks: &HookRegistry) -> SpawnerResult<()> {
        if hooks.can_build_here(player, &self.position) {
            Ok(())
        } else {
            Err(SpawnerError::AccessDenied(self.id.clone()))
        }
    }
}

fn economy_unavailable(reason: &str) -> SpawnerError {
    SpawnerError::EconomyUnavailable {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{CapabilityProvider, CurrencyDeposit, LandProtection, PriceLookup, SaleQuote, ShopSeller};
    use crate::loot::{CreatureLoot, DropEntry};
    use parking_lot::Mutex;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    const PLAYER: PlayerId = PlayerId(0xabc);

    fn small_limits() -> SpawnerLimits {
        SpawnerLimits {
            base_capacity: 10,
            base_max_experience: 20,
            max_stack_size: 8,
            spawn_interval_ms: 1_000,
        }
    }

    fn skeleton_loot() -> LootRegistry {
        let mut loot = LootRegistry::new();
        loot.register(CreatureLoot::new(
            "skeleton",
            5,
            5,
            vec![DropEntry::always("bone", 2, 2), DropEntry::always("arrow", 1, 1)],
        ));
        loot
    }

    fn create_test_spawner() -> LogicalSpawner {
        LogicalSpawner::new(
            CreatureType::new("skeleton"),
            Position::new("world", 0, 64, 0),
            small_limits(),
            0,
        )
    }

    struct Wallet {
        balance: Mutex<Money>,
        delay: Duration,
    }

    impl CurrencyDeposit for Wallet {
        fn name(&self) -> &str {
            "wallet"
        }

        fn deposit(&self, _player: PlayerId, amount: Money) -> bool {
            std::thread::sleep(self.delay);
            *self.balance.lock() += amount;
            true
        }

        fn withdraw(&self, _player: PlayerId, amount: Money) -> bool {
            let mut balance = self.balance.lock();
            match balance.checked_sub(amount) {
                Some(left) => {
                    *balance = left;
                    true
                }
                None => false,
            }
        }
    }

    struct FixedPrices;

    impl PriceLookup for FixedPrices {
        fn name(&self) -> &str {
            "fixed"
        }

        fn price_of(&self, item: &ItemKind) -> Option<Money> {
            (item.as_str() == "bone").then_some(Money::from_parts(0, 500_000))
        }
    }

    struct RejectingShop;

    impl ShopSeller for RejectingShop {
        fn name(&self) -> &str {
            "closed-shop"
        }

        fn sell(&self, _items: &ItemMap) -> SaleQuote {
            SaleQuote::REJECTED
        }
    }

    struct NoBuild;

    impl LandProtection for NoBuild {
        fn name(&self) -> &str {
            "no-build"
        }

        fn can_build_here(&self, _player: PlayerId, _position: &Position) -> bool {
            false
        }
    }

    fn economy(delay: Duration) -> (HookRegistry, Arc<Wallet>) {
        let wallet = Arc::new(Wallet {
            balance: Mutex::new(Money::ZERO),
            delay,
        });
        let hooks = HookRegistry::new();
        hooks.register(CapabilityProvider::CurrencyDeposit(wallet.clone()));
        hooks.register(CapabilityProvider::PriceLookup(Arc::new(FixedPrices)));
        (hooks, wallet)
    }

    #[test]
    fn test_tick_waits_for_interval() {
        let mut spawner = create_test_spawner();
        let loot = skeleton_loot();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        assert_eq!(spawner.on_tick(999, &loot, &mut rng), TickOutcome::Skipped);
        assert!(matches!(
            spawner.on_tick(1_000, &loot, &mut rng),
            TickOutcome::Accumulated { .. }
        ));
        assert_eq!(spawner.next_eligible_tick_ms, 2_000);
        assert_eq!(spawner.stored_items[&ItemKind::new("bone")], 2);
        assert_eq!(spawner.stored_experience, 5);
    }

    #[test]
    fn test_tick_clamps_and_pauses_when_full() {
        let mut spawner = create_test_spawner();
        let loot = skeleton_loot();
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let mut previous = 0;
        let mut now = 1_000;
        let mut full = false;
        for _ in 0..10 {
            if let TickOutcome::Accumulated { became_full, .. } = spawner.on_tick(now, &loot, &mut rng) {
                full |= became_full;
            }
            let total = spawner.total_items() + spawner.stored_experience;
            assert!(total >= previous);
            assert!(spawner.total_items() <= spawner.capacity());
            assert!(spawner.stored_experience <= spawner.max_experience());
            previous = total;
            now += 1_000;
        }
        assert!(full);
        assert_eq!(spawner.status, SpawnerStatus::Inactive);
        assert_eq!(spawner.inactive_reason, Some(InactiveReason::AtCapacity));
        assert_eq!(spawner.on_tick(now, &loot, &mut rng), TickOutcome::Skipped);
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut spawner = create_test_spawner();
        spawner.stored_items.insert(ItemKind::new("arrow"), 9);
        let (added, overflow) = spawner.absorb(YieldSnapshot {
            items: [(ItemKind::new("bone"), 4)].into_iter().collect(),
            experience: 25,
        });
        assert_eq!(added.items[&ItemKind::new("bone")], 1);
        assert_eq!(overflow.items[&ItemKind::new("bone")], 3);
        assert_eq!(added.experience, 20);
        assert_eq!(overflow.experience, 5);
    }

    #[test]
    fn test_unknown_creature_disables() {
        let mut spawner = create_test_spawner();
        let loot = LootRegistry::new();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let outcome = spawner.on_tick(1_000, &loot, &mut rng);
        assert!(matches!(
            outcome,
            TickOutcome::Disabled(SpawnerError::UnknownCreatureType(_))
        ));
        assert_eq!(spawner.status, SpawnerStatus::Disabled);
    }

    #[test]
    fn test_collect_twice_returns_empty() {
        let mut spawner = create_test_spawner();
        let hooks = HookRegistry::new();
        spawner.stored_items.insert(ItemKind::new("bone"), 4);
        spawner.stored_experience = 7;

        let first = spawner.collect(PLAYER, &hooks).unwrap();
        assert_eq!(first.total_items(), 4);
        assert_eq!(first.experience, 7);
        let second = spawner.collect(PLAYER, &hooks).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_collect_denied_leaves_state() {
        let mut spawner = create_test_spawner();
        spawner.stored_items.insert(ItemKind::new("bone"), 4);
        let before = spawner.clone();
        let hooks = HookRegistry::new();
        hooks.register(CapabilityProvider::LandProtection(Arc::new(NoBuild)));

        let err = spawner.collect(PLAYER, &hooks).unwrap_err();
        assert_eq!(err, SpawnerError::AccessDenied(spawner.id.clone()));
        assert_eq!(spawner, before);
    }

    #[test]
    fn test_collect_reactivates_full_spawner() {
        let mut spawner = create_test_spawner();
        spawner.stored_items.insert(ItemKind::new("bone"), 10);
        spawner.stored_experience = 20;
        spawner.refresh_status();
        assert_eq!(spawner.status, SpawnerStatus::Inactive);

        spawner.collect(PLAYER, &HookRegistry::new()).unwrap();
        assert_eq!(spawner.status, SpawnerStatus::Active);
        assert_eq!(spawner.inactive_reason, None);
    }

    #[test]
    fn test_take_partial() {
        let mut spawner = create_test_spawner();
        let hooks = HookRegistry::new();
        spawner.stored_items.insert(ItemKind::new("bone"), 5);
        assert_eq!(spawner.take(PLAYER, &hooks, &ItemKind::new("bone"), 3).unwrap(), 3);
        assert_eq!(spawner.take(PLAYER, &hooks, &ItemKind::new("bone"), 9).unwrap(), 2);
        assert!(spawner.stored_items.is_empty());
        assert_eq!(spawner.take(PLAYER, &hooks, &ItemKind::new("arrow"), 1).unwrap(), 0);
    }

    #[test]
    fn test_sell_prices_known_items_only() {
        let mut spawner = create_test_spawner();
        spawner.stored_items.insert(ItemKind::new("bone"), 4);
        spawner.stored_items.insert(ItemKind::new("arrow"), 3);
        spawner.stored_experience = 9;
        let (hooks, wallet) = economy(Duration::ZERO);

        let receipt = spawner
            .sell_all(PLAYER, &hooks, Duration::from_secs(2))
            .unwrap();
        assert_eq!(receipt.amount, Money::from_whole(2));
        assert_eq!(*wallet.balance.lock(), Money::from_whole(2));
        assert_eq!(spawner.stored_items.len(), 1);
        assert_eq!(spawner.stored_items[&ItemKind::new("arrow")], 3);
        assert_eq!(spawner.stored_experience, 9);
    }

    #[test]
    fn test_sell_timeout_rolls_back() {
        let mut spawner = create_test_spawner();
        spawner.stored_items.insert(ItemKind::new("bone"), 10);
        let (hooks, wallet) = economy(Duration::from_millis(300));

        let err = spawner
            .sell_all(PLAYER, &hooks, Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, SpawnerError::EconomyUnavailable { .. }));
        assert_eq!(spawner.stored_items[&ItemKind::new("bone")], 10);
        assert_eq!(spawner.stored_items.len(), 1);

        // The slow deposit lands after the caller gave up and is reversed.
        std::thread::sleep(Duration::from_millis(700));
        assert_eq!(*wallet.balance.lock(), Money::ZERO);
    }

    #[test]
    fn test_sell_rejected_by_shop() {
        let mut spawner = create_test_spawner();
        spawner.stored_items.insert(ItemKind::new("bone"), 10);
        let (hooks, _wallet) = economy(Duration::ZERO);
        hooks.register(CapabilityProvider::Selling(Arc::new(RejectingShop)));

        let err = spawner
            .sell_all(PLAYER, &hooks, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, SpawnerError::EconomyUnavailable { .. }));
        assert_eq!(spawner.stored_items[&ItemKind::new("bone")], 10);
    }

    #[test]
    fn test_sell_without_economy() {
        let mut spawner = create_test_spawner();
        spawner.stored_items.insert(ItemKind::new("bone"), 1);
        let err = spawner
            .sell_all(PLAYER, &HookRegistry::new(), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, SpawnerError::EconomyUnavailable { .. }));
    }

    #[test]
    fn test_estimated_value() {
        let mut spawner = create_test_spawner();
        spawner.stored_items.insert(ItemKind::new("bone"), 3);
        let (hooks, _) = economy(Duration::ZERO);
        assert_eq!(spawner.estimated_value(&hooks), Money::from_parts(1, 500_000));
        assert_eq!(spawner.estimated_value(&HookRegistry::new()), Money::ZERO);
    }

    #[test]
    fn test_filter_toggle_excludes_yield() {
        let mut spawner = create_test_spawner();
        let loot = skeleton_loot();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        assert!(spawner.toggle_filter(ItemKind::new("bone")));
        spawner.on_tick(1_000, &loot, &mut rng);
        assert!(!spawner.stored_items.contains_key(&ItemKind::new("bone")));
        assert!(!spawner.toggle_filter(ItemKind::new("bone")));
    }

    #[test]
    fn test_enable_disable_and_range() {
        let mut spawner = create_test_spawner();
        assert!(spawner.set_enabled(false));
        assert_eq!(spawner.status, SpawnerStatus::Disabled);
        assert!(!spawner.set_player_in_range(false));
        assert_eq!(spawner.status, SpawnerStatus::Disabled);

        assert!(spawner.set_enabled(true));
        assert_eq!(spawner.status, SpawnerStatus::Inactive);
        assert_eq!(spawner.inactive_reason, Some(InactiveReason::OutOfRange));

        assert!(spawner.set_player_in_range(true));
        assert_eq!(spawner.status, SpawnerStatus::Active);
    }

    #[test]
    fn test_unclaimed_placement_is_inactive() {
        let mut spawner = LogicalSpawner::placed(
            CreatureType::new("skeleton"),
            Position::new("world", 5, 64, 5),
            small_limits(),
            PLAYER,
            false,
            0,
        );
        assert_eq!(spawner.status, SpawnerStatus::Inactive);
        assert!(!spawner.set_player_in_range(true));
        assert!(spawner.set_enabled(true));
        assert_eq!(spawner.status, SpawnerStatus::Active);
    }

    #[test]
    fn test_status_tags() {
        for status in [SpawnerStatus::Active, SpawnerStatus::Inactive, SpawnerStatus::Disabled] {
            assert_eq!(SpawnerStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SpawnerStatus::parse("exploded"), None);
    }
}
