//! # SpawnVault
//!
//! Virtual spawner engine: the simulation core, durable storage and the
//! host-facing adapter wired together.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HOST GAME SERVER                        │
//! │   block place/break · menu clicks · player positions · tick  │
//! └───────────────────────────┬─────────────────────────────────┘
//!                             │
//!                 ┌───────────▼───────────┐     ┌──────────────┐
//!                 │     SpawnerEngine     │────>│  Event bus   │
//!                 │ arena · stacks · loot │     └──────────────┘
//!                 └───────┬───────┬───────┘
//!                         │       │
//!           ┌─────────────▼─┐   ┌─▼──────────────────────┐
//!           │ HookRegistry  │   │ Persistence            │
//!           │ land · money  │   │ batched writer thread  │
//!           │ shop · prices │   │ sqlite/mysql/postgres  │
//!           └───────────────┘   └────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use spawnvault::{EventBus, SpawnerEngine, Interaction};
//!
//! let (events, ui) = EventBus::create_pair(1024);
//! let engine = SpawnerEngine::open(&settings, hooks, events)?;
//! engine.rehydrate()?;
//!
//! engine.on_block_place(player, "skeleton".into(), position.clone(), now)?;
//! engine.tick(now + 26_000);
//! engine.on_player_interact(player, &position, Interaction::Collect, now)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod arena;
pub mod engine;
pub mod error;
pub mod events;
pub mod host;
pub mod scheduler;

pub use engine::{EngineStats, RehydrateReport, SpawnerEngine, SpawnerView, TickReport};
pub use error::{EngineError, EngineResult};
pub use events::{EventBus, EventReceiver, EventSender, SpawnerEvent};
pub use host::{BreakOutcome, Interaction, InteractionOutcome, PlaceOutcome};
pub use scheduler::{unix_millis, SchedulerStats, TickScheduler, DEFAULT_TICK_PERIOD};

pub use spawnvault_core as core;
pub use spawnvault_storage as storage;
