//! # Golden Path Driver
//!
//! Place → Tick → Collect → Sell → Stack → Split → Flush
//!
//! Runs the whole engine headless against the in-memory store with a
//! wallet and a price list standing in for the host economy, and prints
//! what happened at each step with its latency.

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use spawnvault::core::{
    CapabilityProvider, ConfiguredPrices, CurrencyDeposit, HookRegistry, ItemKind, Money,
    PlayerId, Position, Settings, StorageSettings,
};
use spawnvault::{EventBus, Interaction, InteractionOutcome, PlaceOutcome, SpawnerEngine};

/// Wallet that records every deposit.
#[derive(Default)]
struct Wallet {
    balance: Mutex<Money>,
}

impl CurrencyDeposit for Wallet {
    fn name(&self) -> &str {
        "golden-path-wallet"
    }

    fn deposit(&self, _player: PlayerId, amount: Money) -> bool {
        let mut balance = self.balance.lock();
        *balance += amount;
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

fn micros(start: Instant) -> u128 {
    start.elapsed().as_micros()
}

fn main() -> Result<(), Box<dyn Error>> {
    println!("=== SpawnVault golden path ===");

    let mut settings = Settings::default();
    settings.storage = StorageSettings::memory();
    settings.spawner.rng_seed = Some(42);
    let interval = settings.spawner.spawn_interval_ms;

    let wallet = Arc::new(Wallet::default());
    let hooks = Arc::new(HookRegistry::new());
    hooks.register(CapabilityProvider::CurrencyDeposit(wallet.clone()));
    let mut prices = BTreeMap::new();
    prices.insert(ItemKind::new("bone"), Money::from_parts(0, 500_000));
    prices.insert(ItemKind::new("arrow"), Money::from_parts(0, 250_000));
    hooks.register(CapabilityProvider::PriceLookup(Arc::new(ConfiguredPrices::new(prices))));

    let (events, ui) = EventBus::create_pair(4_096);
    let engine = SpawnerEngine::open(&settings, hooks, events)?;
    let rehydrated = engine.rehydrate()?;
    println!("rehydrated: {rehydrated:?}");

    let player = PlayerId(7);
    let position = Position::new("world", 10, 64, -3);
    let mut now = 1_000_000;

    // Place
    let start = Instant::now();
    let placed = engine.on_block_place(player, "skeleton".into(), position.clone(), now)?;
    println!("place:   {placed:?} ({}us)", micros(start));
    let PlaceOutcome::Created(id) = placed else {
        return Err("expected a new spawner".into());
    };

    // Stack two more units from the side
    for x in [11, 9] {
        let outcome =
            engine.on_block_place(player, "skeleton".into(), Position::new("world", x, 64, -3), now)?;
        println!("stack:   {outcome:?}");
    }

    // Tick
    let start = Instant::now();
    let mut passes = 0;
    for _ in 0..10 {
        now += interval;
        let report = engine.tick(now);
        passes += 1;
        if report.became_full > 0 {
            break;
        }
    }
    println!("tick:    {passes} passes ({}us)", micros(start));
    let view = engine.view(&id, player)?;
    println!(
        "stored:  {} items / {} capacity, {} exp, worth {}",
        view.stored.total_items(),
        view.capacity,
        view.stored.experience,
        view.estimated_value
    );

    // Collect experience, then sell items
    let start = Instant::now();
    let outcome = engine.on_player_interact(player, &position, Interaction::CollectExperience, now)?;
    println!("collect: {outcome:?} ({}us)", micros(start));

    let start = Instant::now();
    let outcome = engine.on_player_interact(player, &position, Interaction::SellAll, now)?;
    if let InteractionOutcome::Sold(receipt) = &outcome {
        println!("sell:    {} for {} ({}us)", receipt.items_sold.values().sum::<u64>(), receipt.amount, micros(start));
    }
    println!("wallet:  {}", *wallet.balance.lock());

    // Split one unit off
    let start = Instant::now();
    let outcome = engine.on_player_interact(
        player,
        &position,
        Interaction::Split {
            amount: 1,
            target: Position::new("world", 10, 65, -3),
        },
        now,
    )?;
    println!("split:   {outcome:?} ({}us)", micros(start));

    // Flush
    let start = Instant::now();
    engine.flush()?;
    println!("flush:   ({}us)", micros(start));
    println!("stats:   {:?}", engine.stats());
    println!("events:  {} delivered", ui.drain().len());

    println!("=== done ===");
    Ok(())
}
