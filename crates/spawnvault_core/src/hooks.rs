//! # Integration Hook Registry
//!
//! Capability-based adapter between the simulation and third-party
//! collaborators (land claims, economy, shops).
//!
//! ## Capabilities
//!
//! The set is closed. Each capability has at most one active provider:
//!
//! | Capability | Interface | Fallback when absent |
//! |---|---|---|
//! | `LandProtection` | [`LandProtection`] | everyone may build |
//! | `CurrencyDeposit` | [`CurrencyDeposit`] | selling disabled |
//! | `Selling` | [`ShopSeller`] | price lookup, else selling disabled |
//! | `PriceLookup` | [`PriceLookup`] | no valuation |
//!
//! Detection order decides the winner: the first available candidate for a
//! capability is kept, later ones are ignored unless registered with
//! [`HookRegistry::register_override`].

use crossbeam_channel::bounded;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::money::Money;
use crate::types::{ItemKind, ItemMap, PlayerId, Position};

/// Closed set of collaborator capabilities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// `can_build_here(player, position)`.
    LandProtection,
    /// `deposit(player, amount)`.
    CurrencyDeposit,
    /// `sell(items)`.
    Selling,
    /// `price_of(item)`.
    PriceLookup,
}

impl Capability {
    /// All capabilities.
    pub const ALL: [Self; 4] = [
        Self::LandProtection,
        Self::CurrencyDeposit,
        Self::Selling,
        Self::PriceLookup,
    ];
}

/// Land-claim collaborator.
pub trait LandProtection: Send + Sync {
    /// Provider name for diagnostics.
    fn name(&self) -> &str;

    /// Whether the collaborator is usable right now.
    fn is_available(&self) -> bool {
        true
    }

    /// Whether `player` may build (and so interact) at `position`.
    fn can_build_here(&self, player: PlayerId, position: &Position) -> bool;
}

/// Economy collaborator that credits players.
pub trait CurrencyDeposit: Send + Sync {
    /// Provider name for diagnostics.
    fn name(&self) -> &str;

    /// Whether the collaborator is usable right now.
    fn is_available(&self) -> bool {
        true
    }

    /// Credits `amount` to `player`. Returns false on failure.
    fn deposit(&self, player: PlayerId, amount: Money) -> bool;

    /// Debits `amount` from `player`. Returns false on failure.
    ///
    /// Reverses a deposit that completed after its caller stopped waiting.
    fn withdraw(&self, player: PlayerId, amount: Money) -> bool;
}

/// Result of asking a shop to value a batch of items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaleQuote {
    /// Whether the shop accepted the items.
    pub success: bool,
    /// Total value of the accepted items.
    pub total: Money,
}

impl SaleQuote {
    /// A rejected sale.
    pub const REJECTED: Self = Self {
        success: false,
        total: Money::ZERO,
    };
}

/// Shop collaborator that values whole batches.
pub trait ShopSeller: Send + Sync {
    /// Provider name for diagnostics.
    fn name(&self) -> &str;

    /// Whether the collaborator is usable right now.
    fn is_available(&self) -> bool {
        true
    }

    /// Values `items`.
    fn sell(&self, items: &ItemMap) -> SaleQuote;
}

/// Per-item price source.
pub trait PriceLookup: Send + Sync {
    /// Provider name for diagnostics.
    fn name(&self) -> &str;

    /// Whether the collaborator is usable right now.
    fn is_available(&self) -> bool {
        true
    }

    /// Unit price of `item`, `None` when unknown.
    fn price_of(&self, item: &ItemKind) -> Option<Money>;
}

/// A provider bound to the capability it implements.
#[derive(Clone)]
pub enum CapabilityProvider {
    /// Land-claim provider.
    LandProtection(Arc<dyn LandProtection>),
    /// Deposit provider.
    CurrencyDeposit(Arc<dyn CurrencyDeposit>),
    /// Shop provider.
    Selling(Arc<dyn ShopSeller>),
    /// Price provider.
    PriceLookup(Arc<dyn PriceLookup>),
}

impl CapabilityProvider {
    /// The capability this provider implements.
    #[must_use]
    pub fn capability(&self) -> Capability {
        match self {
            Self::LandProtection(_) => Capability::LandProtection,
            Self::CurrencyDeposit(_) => Capability::CurrencyDeposit,
            Self::Selling(_) => Capability::Selling,
            Self::PriceLookup(_) => Capability::PriceLookup,
        }
    }

    /// Provider name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::LandProtection(p) => p.name(),
            Self::CurrencyDeposit(p) => p.name(),
            Self::Selling(p) => p.name(),
            Self::PriceLookup(p) => p.name(),
        }
    }

    /// Whether the provider reports itself usable.
    #[must_use]
    pub fn is_available(&self) -> bool {
        match self {
            Self::LandProtection(p) => p.is_available(),
            Self::CurrencyDeposit(p) => p.is_available(),
            Self::Selling(p) => p.is_available(),
            Self::PriceLookup(p) => p.is_available(),
        }
    }
}

impl fmt::Debug for CapabilityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.capability(), self.name())
    }
}

/// One active provider per capability.
#[derive(Default)]
pub struct HookRegistry {
    providers: RwLock<HashMap<Capability, CapabilityProvider>>,
}

impl HookRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider unless one is already active for its capability.
    ///
    /// Returns true if the provider became active.
    pub fn register(&self, provider: CapabilityProvider) -> bool {
        if !provider.is_available() {
            tracing::debug!(provider = provider.name(), "skipping unavailable provider");
            return false;
        }
        let mut providers = self.providers.write();
        let capability = provider.capability();
        if let Some(active) = providers.get(&capability) {
            tracing::debug!(
                ?capability,
                active = active.name(),
                ignored = provider.name(),
                "capability already provided"
            );
            return false;
        }
        tracing::info!(?capability, provider = provider.name(), "capability registered");
        providers.insert(capability, provider);
        true
    }

    /// Registers a provider, replacing any active one.
    pub fn register_override(&self, provider: CapabilityProvider) {
        let capability = provider.capability();
        tracing::info!(?capability, provider = provider.name(), "capability overridden");
        self.providers.write().insert(capability, provider);
    }

    /// Registers candidates in detection order. Returns how many became active.
    pub fn detect(&self, candidates: impl IntoIterator<Item = CapabilityProvider>) -> usize {
        candidates
            .into_iter()
            .filter(|c| self.register(c.clone()))
            .count()
    }

    /// Removes the provider for a capability.
    pub fn unregister(&self, capability: Capability) -> Option<CapabilityProvider> {
        self.providers.write().remove(&capability)
    }

    /// Returns the active provider for a capability.
    #[must_use]
    pub fn query(&self, capability: Capability) -> Option<CapabilityProvider> {
        self.providers.read().get(&capability).cloned()
    }

    /// Returns true if the capability has a provider.
    #[must_use]
    pub fn has(&self, capability: Capability) -> bool {
        self.providers.read().contains_key(&capability)
    }

    /// Active land-claim provider.
    #[must_use]
    pub fn land_protection(&self) -> Option<Arc<dyn LandProtection>> {
        match self.query(Capability::LandProtection) {
            Some(CapabilityProvider::LandProtection(p)) => Some(p),
            _ => None,
        }
    }

    /// Active deposit provider.
    #[must_use]
    pub fn currency(&self) -> Option<Arc<dyn CurrencyDeposit>> {
        match self.query(Capability::CurrencyDeposit) {
            Some(CapabilityProvider::CurrencyDeposit(p)) => Some(p),
            _ => None,
        }
    }

    /// Active shop provider.
    #[must_use]
    pub fn seller(&self) -> Option<Arc<dyn ShopSeller>> {
        match self.query(Capability::Selling) {
            Some(CapabilityProvider::Selling(p)) => Some(p),
            _ => None,
        }
    }

    /// Active price provider.
    #[must_use]
    pub fn price_lookup(&self) -> Option<Arc<dyn PriceLookup>> {
        match self.query(Capability::PriceLookup) {
            Some(CapabilityProvider::PriceLookup(p)) => Some(p),
            _ => None,
        }
    }

    /// Land check with the "no restriction" fallback.
    #[must_use]
    pub fn can_build_here(&self, player: PlayerId, position: &Position) -> bool {
        self.land_protection()
            .map_or(true, |p| p.can_build_here(player, position))
    }

    /// Whether selling can be offered at all.
    #[must_use]
    pub fn selling_available(&self) -> bool {
        self.has(Capability::CurrencyDeposit)
            && (self.has(Capability::Selling) || self.has(Capability::PriceLookup))
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers = self.providers.read();
        let mut list = f.debug_map();
        for capability in Capability::ALL {
            if let Some(p) = providers.get(&capability) {
                list.entry(&capability, &p.name());
            }
        }
        list.finish()
    }
}

/// Sale prices taken from configured loot tables.
#[derive(Clone, Debug, Default)]
pub struct ConfiguredPrices {
    prices: BTreeMap<ItemKind, Money>,
}

impl ConfiguredPrices {
    /// Wraps a price list.
    #[must_use]
    pub fn new(prices: BTreeMap<ItemKind, Money>) -> Self {
        Self { prices }
    }

    /// Returns true if no price is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl PriceLookup for ConfiguredPrices {
    fn name(&self) -> &str {
        "configured-prices"
    }

    fn price_of(&self, item: &ItemKind) -> Option<Money> {
        self.prices.get(item).copied()
    }
}

/// Runs `f` on a helper thread and waits at most `timeout` for it.
///
/// Returns `None` on timeout or if the helper could not start. A timed-out
/// call keeps running detached; its result is discarded.
pub fn call_with_timeout<T, F>(timeout: Duration, f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = bounded(1);
    let spawned = thread::Builder::new()
        .name("spawnvault-collab".into())
        .spawn(move || {
            let _ = tx.send(f());
        });
    if let Err(e) = spawned {
        tracing::error!(error = %e, "failed to start collaborator call");
        return None;
    }
    rx.recv_timeout(timeout).ok()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DepositState {
    Pending,
    Done(bool),
    Abandoned,
}

struct DepositHandoff {
    state: Mutex<DepositState>,
    done: Condvar,
}

/// Credits `amount` to `player`, waiting at most `timeout`.
///
/// Returns `None` on timeout or if the helper could not start. A timed-out
/// deposit never pays out: one that has not started is skipped, and one
/// that lands late is reversed through [`CurrencyDeposit::withdraw`].
pub fn deposit_with_timeout(
    currency: Arc<dyn CurrencyDeposit>,
    player: PlayerId,
    amount: Money,
    timeout: Duration,
) -> Option<bool> {
    let deadline = Instant::now() + timeout;
    let handoff = Arc::new(DepositHandoff {
        state: Mutex::new(DepositState::Pending),
        done: Condvar::new(),
    });
    let remote = Arc::clone(&handoff);
    let spawned = thread::Builder::new()
        .name("spawnvault-deposit".into())
        .spawn(move || {
            if *remote.state.lock() == DepositState::Abandoned {
                return;
            }
            let paid = currency.deposit(player, amount);
            let mut state = remote.state.lock();
            if *state == DepositState::Abandoned {
                drop(state);
                if paid {
                    reverse_late_deposit(currency.as_ref(), player, amount);
                }
                return;
            }
            *state = DepositState::Done(paid);
            remote.done.notify_one();
        });
    if let Err(e) = spawned {
        tracing::error!(error = %e, "failed to start deposit");
        return None;
    }

    let mut state = handoff.state.lock();
    while *state == DepositState::Pending {
        if handoff.done.wait_until(&mut state, deadline).timed_out() {
            break;
        }
    }
    if let DepositState::Done(paid) = *state {
        return Some(paid);
    }
    *state = DepositState::Abandoned;
    None
}

fn reverse_late_deposit(currency: &dyn CurrencyDeposit, player: PlayerId, amount: Money) {
    if currency.withdraw(player, amount) {
        tracing::warn!(provider = currency.name(), ?player, %amount, "late deposit reversed");
    } else {
        tracing::error!(
            provider = currency.name(),
            ?player,
            %amount,
            "late deposit could not be reversed"
        );
    }
}
