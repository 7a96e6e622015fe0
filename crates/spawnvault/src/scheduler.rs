//! # Tick Scheduler
//!
//! Drives [`SpawnerEngine::tick`] on a fixed period from a dedicated thread,
//! for hosts that do not own a scheduler of their own.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::engine::SpawnerEngine;
use crate::error::EngineResult;

/// Default period between passes.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(1_000);

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Scheduler statistics.
#[derive(Clone, Debug, Default)]
pub struct SchedulerStats {
    /// Passes run.
    pub passes: u64,
    /// Spawner ticks that stored yield.
    pub accumulated: u64,
    /// Spawners skipped because a player held them.
    pub busy_skips: u64,
    /// Duration of the last pass (microseconds).
    pub last_pass_us: u64,
    /// Longest pass (microseconds).
    pub max_pass_us: u64,
}

struct Control {
    stop: Mutex<bool>,
    wake: Condvar,
    stats: Mutex<SchedulerStats>,
}

/// Background tick thread. Stops when dropped.
pub struct TickScheduler {
    control: Arc<Control>,
    handle: Option<JoinHandle<()>>,
}

impl TickScheduler {
    /// Starts ticking `engine` every `period`.
    ///
    /// # Errors
    ///
    /// `Thread` if the thread cannot be spawned.
    pub fn start(engine: Arc<SpawnerEngine>, period: Duration) -> EngineResult<Self> {
        let control = Arc::new(Control {
            stop: Mutex::new(false),
            wake: Condvar::new(),
            stats: Mutex::new(SchedulerStats::default()),
        });
        let thread_control = Arc::clone(&control);
        let handle = std::thread::Builder::new()
            .name("spawnvault-tick".into())
            .spawn(move || run(&engine, &thread_control, period))?;
        tracing::info!(?period, "tick scheduler started");
        Ok(Self {
            control,
            handle: Some(handle),
        })
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.control.stats.lock().clone()
    }

    /// Stops the thread and waits for the running pass to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        *self.control.stop.lock() = true;
        self.control.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("tick scheduler thread panicked");
            }
        }
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(engine: &SpawnerEngine, control: &Control, period: Duration) {
    let mut next = Instant::now();
    loop {
        {
            let mut stop = control.stop.lock();
            while !*stop && Instant::now() < next {
                if control.wake.wait_until(&mut stop, next).timed_out() {
                    break;
                }
            }
            if *stop {
                break;
            }
        }

        let started = Instant::now();
        let report = engine.tick(unix_millis());
        let elapsed = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

        let mut stats = control.stats.lock();
        stats.passes += 1;
        stats.accumulated += report.accumulated as u64;
        stats.busy_skips += report.busy as u64;
        stats.last_pass_us = elapsed;
        stats.max_pass_us = stats.max_pass_us.max(elapsed);
        drop(stats);

        next += period;
        if next < Instant::now() {
            tracing::debug!(elapsed_us = elapsed, "tick pass overran its period");
            next = Instant::now() + period;
        }
    }
    tracing::info!("tick scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use spawnvault_core::{HookRegistry, Settings, StorageSettings};

    #[test]
    fn test_scheduler_runs_and_stops() {
        let mut settings = Settings::default();
        settings.storage = StorageSettings::memory();
        let (events, _) = EventBus::create_pair(16);
        let engine =
            Arc::new(SpawnerEngine::open(&settings, Arc::new(HookRegistry::new()), events).unwrap());

        let scheduler = TickScheduler::start(Arc::clone(&engine), Duration::from_millis(5)).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        let stats = scheduler.stats();
        scheduler.stop();

        assert!(stats.passes > 0);
        assert_eq!(stats.busy_skips, 0);
    }

    #[test]
    fn test_unix_millis_advances() {
        let first = unix_millis();
        std::thread::sleep(Duration::from_millis(2));
        assert!(unix_millis() > first);
    }
}
