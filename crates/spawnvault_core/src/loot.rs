//! # Loot / Yield Resolver
//!
//! Turns one simulated spawn cycle into items and experience without ever
//! materializing a creature.
//!
//! ## Algorithm
//!
//! For each drop entry of the creature's table, in table order:
//!
//! 1. Bernoulli trial against `chance_bp` (basis points, 10000 = 100%)
//! 2. On success, quantity uniform in `[min * stack, max * stack]`
//!
//! Experience is uniform in `[experience_min * stack, experience_max * stack]`.
//!
//! The registry is immutable once built. A config reload builds a new
//! registry and swaps it in whole.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{SpawnerError, SpawnerResult};
use crate::money::Money;
use crate::types::{add_item, CreatureType, ItemKind, ItemMap, YieldSnapshot};

/// Basis points representing certainty.
pub const CERTAIN_BP: u32 = 10_000;

/// Result of one resolved spawn cycle.
pub type YieldResult = YieldSnapshot;

/// A single entry in a creature's drop table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropEntry {
    /// Item that may drop.
    pub item: ItemKind,
    /// Minimum quantity per unit of stack.
    pub min_quantity: u32,
    /// Maximum quantity per unit of stack.
    pub max_quantity: u32,
    /// Drop probability in basis points.
    pub chance_bp: u32,
    /// Configured sale price per item, if any.
    pub sell_price: Option<Money>,
}

impl DropEntry {
    /// Creates an entry that always drops.
    #[must_use]
    pub fn always(item: &str, min_quantity: u32, max_quantity: u32) -> Self {
        Self::with_chance(item, min_quantity, max_quantity, CERTAIN_BP)
    }

    /// Creates an entry with a drop probability in basis points.
    #[must_use]
    pub fn with_chance(item: &str, min_quantity: u32, max_quantity: u32, chance_bp: u32) -> Self {
        Self {
            item: ItemKind::new(item),
            min_quantity: min_quantity.min(max_quantity),
            max_quantity: max_quantity.max(min_quantity),
            chance_bp: chance_bp.min(CERTAIN_BP),
            sell_price: None,
        }
    }

    /// Attaches a sale price.
    #[must_use]
    pub fn priced(mut self, price: Money) -> Self {
        self.sell_price = Some(price);
        self
    }
}

/// Complete drop table for one creature type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatureLoot {
    /// Creature this table is for.
    pub creature: CreatureType,
    /// Minimum experience per unit of stack.
    pub experience_min: u32,
    /// Maximum experience per unit of stack.
    pub experience_max: u32,
    /// Ordered drop entries.
    pub drops: Vec<DropEntry>,
}

impl CreatureLoot {
    /// Creates a table with a fixed experience range.
    #[must_use]
    pub fn new(creature: &str, experience_min: u32, experience_max: u32, drops: Vec<DropEntry>) -> Self {
        Self {
            creature: CreatureType::new(creature),
            experience_min: experience_min.min(experience_max),
            experience_max: experience_max.max(experience_min),
            drops,
        }
    }

    /// True when the table can never produce anything.
    #[must_use]
    pub fn is_barren(&self) -> bool {
        self.experience_max == 0
            && self
                .drops
                .iter()
                .all(|d| d.chance_bp == 0 || d.max_quantity == 0)
    }
}

/// Immutable lookup from creature type to drop table.
#[derive(Clone, Debug, Default)]
pub struct LootRegistry {
    tables: HashMap<CreatureType, CreatureLoot>,
}

impl LootRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in tables for common creatures.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for table in builtin_tables() {
            registry.register(table);
        }
        registry
    }

    /// Registers (or replaces) a table.
    pub fn register(&mut self, table: CreatureLoot) {
        self.tables.insert(table.creature.clone(), table);
    }

    /// Returns the table for a creature.
    #[must_use]
    pub fn get(&self, creature: &CreatureType) -> Option<&CreatureLoot> {
        self.tables.get(creature)
    }

    /// Returns true if the creature type is known.
    #[must_use]
    pub fn contains(&self, creature: &CreatureType) -> bool {
        self.tables.contains_key(creature)
    }

    /// Number of registered tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true when no table is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Configured sale price of an item, from the first table listing it.
    #[must_use]
    pub fn configured_price(&self, item: &ItemKind) -> Option<Money> {
        self.price_list().get(item).copied()
    }

    /// Every configured sale price, first table wins per item.
    #[must_use]
    pub fn price_list(&self) -> BTreeMap<ItemKind, Money> {
        let mut creatures: Vec<&CreatureType> = self.tables.keys().collect();
        creatures.sort();
        let mut prices = BTreeMap::new();
        for creature in creatures {
            for drop in &self.tables[creature].drops {
                if let Some(price) = drop.sell_price {
                    prices.entry(drop.item.clone()).or_insert(price);
                }
            }
        }
        prices
    }

    /// Resolves one spawn cycle.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCreatureType` if no table is registered.
    pub fn resolve<R: Rng>(
        &self,
        creature: &CreatureType,
        stack_multiplier: u32,
        rng: &mut R,
    ) -> SpawnerResult<YieldResult> {
        self.resolve_filtered(creature, stack_multiplier, &BTreeSet::new(), rng)
    }

    /// Resolves one spawn cycle, skipping filtered item kinds.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCreatureType` if no table is registered.
    pub fn resolve_filtered<R: Rng>(
        &self,
        creature: &CreatureType,
        stack_multiplier: u32,
        filter: &BTreeSet<ItemKind>,
        rng: &mut R,
    ) -> SpawnerResult<YieldResult> {
        let table = self
            .tables
            .get(creature)
            .ok_or_else(|| SpawnerError::UnknownCreatureType(creature.clone()))?;
        let stack = u64::from(stack_multiplier.max(1));

        let mut items = ItemMap::new();
        for entry in &table.drops {
            if filter.contains(&entry.item) {
                continue;
            }
            if !roll_chance(entry.chance_bp, rng) {
                continue;
            }
            let quantity = uniform(
                u64::from(entry.min_quantity) * stack,
                u64::from(entry.max_quantity) * stack,
                rng,
            );
            add_item(&mut items, &entry.item, quantity);
        }

        let experience = uniform(
            u64::from(table.experience_min) * stack,
            u64::from(table.experience_max) * stack,
            rng,
        );

        Ok(YieldSnapshot { items, experience })
    }
}

/// Bernoulli trial in basis points.
#[inline]
fn roll_chance<R: Rng>(chance_bp: u32, rng: &mut R) -> bool {
    if chance_bp >= CERTAIN_BP {
        return true;
    }
    if chance_bp == 0 {
        return false;
    }
    rng.gen_range(0..CERTAIN_BP) < chance_bp
}

/// Uniform draw in `[lo, hi]`.
#[inline]
fn uniform<R: Rng>(lo: u64, hi: u64, rng: &mut R) -> u64 {
    if hi <= lo {
        lo
    } else {
        rng.gen_range(lo..=hi)
    }
}

/// Vanilla-like drop tables used when the config defines none.
fn builtin_tables() -> Vec<CreatureLoot> {
    vec![
        CreatureLoot::new(
            "zombie",
            5,
            5,
            vec![
                DropEntry::always("rotten_flesh", 0, 2),
                DropEntry::with_chance("iron_ingot", 1, 1, 250),
                DropEntry::with_chance("carrot", 1, 1, 250),
                DropEntry::with_chance("potato", 1, 1, 250),
            ],
        ),
        CreatureLoot::new(
            "skeleton",
            5,
            5,
            vec![DropEntry::always("bone", 0, 2), DropEntry::always("arrow", 0, 2)],
        ),
        CreatureLoot::new("creeper", 5, 5, vec![DropEntry::always("gunpowder", 0, 2)]),
        CreatureLoot::new(
            "spider",
            5,
            5,
            vec![
                DropEntry::always("string", 0, 2),
                DropEntry::with_chance("spider_eye", 1, 1, 3_333),
            ],
        ),
        CreatureLoot::new(
            "cave_spider",
            5,
            5,
            vec![
                DropEntry::always("string", 0, 2),
                DropEntry::with_chance("spider_eye", 1, 1, 3_333),
            ],
        ),
        CreatureLoot::new("blaze", 10, 10, vec![DropEntry::always("blaze_rod", 0, 1)]),
        CreatureLoot::new("enderman", 5, 5, vec![DropEntry::always("ender_pearl", 0, 1)]),
        CreatureLoot::new(
            "iron_golem",
            0,
            0,
            vec![DropEntry::always("iron_ingot", 3, 5), DropEntry::always("poppy", 0, 2)],
        ),
        CreatureLoot::new(
            "cow",
            1,
            3,
            vec![DropEntry::always("beef", 1, 3), DropEntry::always("leather", 0, 2)],
        ),
        CreatureLoot::new("pig", 1, 3, vec![DropEntry::always("porkchop", 1, 3)]),
        CreatureLoot::new(
            "chicken",
            1,
            3,
            vec![DropEntry::always("chicken", 1, 1), DropEntry::always("feather", 0, 2)],
        ),
        CreatureLoot::new(
            "witch",
            5,
            5,
            vec![
                DropEntry::with_chance("glass_bottle", 0, 2, 1_250),
                DropEntry::with_chance("glowstone_dust", 0, 2, 1_250),
                DropEntry::with_chance("gunpowder", 0, 2, 1_250),
                DropEntry::with_chance("redstone", 0, 2, 1_250),
                DropEntry::with_chance("spider_eye", 0, 2, 1_250),
                DropEntry::with_chance("sugar", 0, 2, 1_250),
                DropEntry::with_chance("stick", 0, 2, 2_500),
            ],
        ),
        CreatureLoot::new("allay", 0, 0, Vec::new()),
    ]
}
