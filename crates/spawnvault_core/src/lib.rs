//! # SpawnVault Core
//!
//! Virtual spawner simulation: instead of spawning creatures, each spawner
//! rolls its creature's drop table on a timer and stores the yield.
//!
//! ## Design Principles
//!
//! 1. **Zero floating point in currency** - sale values are fixed-point [`Money`]
//! 2. **No I/O** - persistence and scheduling live in the outer crates
//! 3. **Injected randomness** - every roll takes an explicit `Rng`
//! 4. **Immutable loot tables** - reloads replace the whole [`LootRegistry`]
//!
//! ## Thread Safety
//!
//! [`LogicalSpawner`] holds no lock of its own. The owner wraps each one in
//! its own mutex so unrelated spawners never contend.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spawnvault_core::{LogicalSpawner, LootRegistry, Position, CreatureType};
//!
//! let loot = LootRegistry::builtin();
//! let mut spawner = LogicalSpawner::new(
//!     CreatureType::new("skeleton"),
//!     Position::new("world", 10, 64, -3),
//!     SpawnerLimits::default(),
//!     now_ms,
//! );
//! spawner.on_tick(now_ms + 26_000, &loot, &mut rng);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod hooks;
pub mod loot;
pub mod money;
pub mod spawner;
pub mod stack;
pub mod types;

pub use config::{BackendKind, EconomySettings, Settings, SpawnerSettings, StorageSettings};
pub use error::{SpawnerError, SpawnerResult};
pub use hooks::{
    call_with_timeout, deposit_with_timeout, Capability, CapabilityProvider, ConfiguredPrices,
    CurrencyDeposit, HookRegistry, LandProtection, PriceLookup, SaleQuote, ShopSeller,
};
pub use loot::{CreatureLoot, DropEntry, LootRegistry, YieldResult};
pub use money::Money;
pub use spawner::{
    InactiveReason, LogicalSpawner, SaleReceipt, SpawnerLimits, SpawnerStatus, TickOutcome,
};
pub use stack::StackManager;
pub use types::{CreatureType, ItemKind, ItemMap, PlayerId, Position, SpawnerId, YieldSnapshot};
