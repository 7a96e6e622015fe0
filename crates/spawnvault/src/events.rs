//! # Spawner Events
//!
//! Non-blocking notifications for the UI layer.
//!
//! ```text
//! ┌─────────────┐      ┌─────────────┐      ┌─────────────┐
//! │   Engine    │─────>│   Bounded   │─────>│  UI / menu  │
//! │ tick, click │      │   channel   │      │  renderer   │
//! └─────────────┘      └─────────────┘      └─────────────┘
//! ```
//!
//! Producers never wait. When the channel is full the event is dropped;
//! events are feedback, the spawner state itself is authoritative.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use spawnvault_core::{InactiveReason, Money, PlayerId, SpawnerId, SpawnerStatus, YieldSnapshot};

/// Something the UI may want to show.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpawnerEvent {
    /// A new spawner was placed.
    Placed {
        /// New spawner.
        id: SpawnerId,
        /// Initial status.
        status: SpawnerStatus,
    },
    /// A tick stored yield.
    YieldAccumulated {
        /// Spawner that ticked.
        id: SpawnerId,
        /// What was stored.
        added: YieldSnapshot,
    },
    /// A tick generated more than fit.
    Overflow {
        /// Spawner that ticked.
        id: SpawnerId,
        /// Items clamped away.
        dropped_items: u64,
        /// Experience clamped away.
        dropped_experience: u64,
    },
    /// Status moved between Active, Inactive and Disabled.
    StatusChanged {
        /// Spawner.
        id: SpawnerId,
        /// New status.
        status: SpawnerStatus,
        /// Why it is Inactive, if it is.
        reason: Option<InactiveReason>,
    },
    /// A player took yield out.
    Collected {
        /// Spawner.
        id: SpawnerId,
        /// Collecting player.
        player: PlayerId,
        /// What left storage.
        taken: YieldSnapshot,
    },
    /// A sale went through.
    Sold {
        /// Spawner.
        id: SpawnerId,
        /// Selling player.
        player: PlayerId,
        /// Amount deposited.
        amount: Money,
        /// Number of items sold.
        items_sold: u64,
    },
    /// Two spawners became one.
    Merged {
        /// Surviving spawner.
        id: SpawnerId,
        /// Spawner that ceased to exist.
        absorbed: SpawnerId,
        /// Resulting stack.
        stack_size: u32,
    },
    /// A stack was divided.
    Split {
        /// Original spawner, now the remainder.
        id: SpawnerId,
        /// Newly created spawner.
        extracted: SpawnerId,
        /// Units moved.
        amount: u32,
    },
    /// A spawner was broken or otherwise removed.
    Removed {
        /// Former spawner.
        id: SpawnerId,
    },
    /// A spawner was powered off by a fault.
    Disabled {
        /// Spawner.
        id: SpawnerId,
        /// Diagnostic.
        reason: String,
    },
}

/// Bounded event channel.
pub struct EventBus {
    sender: Sender<SpawnerEvent>,
    receiver: Receiver<SpawnerEvent>,
}

impl EventBus {
    /// Creates a bus holding at most `capacity` undelivered events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self { sender, receiver }
    }

    /// Producer handle.
    #[must_use]
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    /// Consumer handle.
    #[must_use]
    pub fn receiver(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.receiver.clone(),
        }
    }

    /// Creates a bus and returns both ends.
    #[must_use]
    pub fn create_pair(capacity: usize) -> (EventSender, EventReceiver) {
        let bus = Self::new(capacity);
        (bus.sender(), bus.receiver())
    }
}

/// Handle for sending events.
#[derive(Clone)]
pub struct EventSender {
    sender: Sender<SpawnerEvent>,
}

impl EventSender {
    /// Sends without blocking. Returns false if the event was dropped.
    #[inline]
    pub fn send(&self, event: SpawnerEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::trace!(?event, "event channel full, dropping");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Handle for receiving events.
#[derive(Clone)]
pub struct EventReceiver {
    receiver: Receiver<SpawnerEvent>,
}

impl EventReceiver {
    /// Takes every pending event without blocking.
    pub fn drain(&self) -> Vec<SpawnerEvent> {
        self.receiver.try_iter().collect()
    }

    /// Takes one event, if any.
    #[inline]
    pub fn try_recv(&self) -> Option<SpawnerEvent> {
        self.receiver.try_recv().ok()
    }

    /// Number of pending events.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }
}
