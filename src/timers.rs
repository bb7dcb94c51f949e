//! Request timeout bookkeeping.
//!
//! One slot per (address, command) pair, re-armed on every send and
//! disarmed when the matching response arrives. The pool owns no tasks:
//! the worker's event loop sleeps until [`RequestTimerPool::next_deadline`]
//! and collects expirations with [`RequestTimerPool::take_expired`], so a
//! single timer future serves every outstanding request.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::protocol::DaemonCmd;

/// Fixed, process-wide response timeout. Not configurable per command.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Slots that stay idle across this many consecutive disconnections are
/// evicted, keeping the pool bounded across daemon address changes.
pub(crate) const EVICT_IDLE_CONNECTIONS: u64 = 3;

/// Identity of one in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct TimerKey {
    pub(crate) address: String,
    pub(crate) cmd: DaemonCmd,
}

#[derive(Debug)]
struct TimerSlot {
    /// Armed deadline; `None` while the slot is idle.
    deadline: Option<Instant>,
    /// Connection generation this slot was last armed in.
    last_armed: u64,
}

/// Reusable pool of request timers, keyed by (address, command).
#[derive(Debug, Default)]
pub(crate) struct RequestTimerPool {
    slots: HashMap<TimerKey, TimerSlot>,
    /// Bumped on every `stop_all`, i.e. on every transition to Disconnected.
    generation: u64,
}

impl RequestTimerPool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arms the timer for (address, cmd), reusing the slot if one exists.
    ///
    /// Re-arming an already-active key resets its deadline; there is never
    /// more than one active timer per key.
    pub(crate) fn start(&mut self, address: &str, cmd: DaemonCmd) {
        let key = TimerKey {
            address: address.to_owned(),
            cmd,
        };
        let deadline = Instant::now() + REQUEST_TIMEOUT;
        let generation = self.generation;
        let slot = self.slots.entry(key).or_insert(TimerSlot {
            deadline: None,
            last_armed: generation,
        });
        slot.deadline = Some(deadline);
        slot.last_armed = generation;
    }

    /// Disarms the timer matching (address, cmd) exactly; no-op otherwise.
    pub(crate) fn stop_for(&mut self, address: &str, cmd: DaemonCmd) {
        let key = TimerKey {
            address: address.to_owned(),
            cmd,
        };
        if let Some(slot) = self.slots.get_mut(&key) {
            slot.deadline = None;
        }
    }

    /// Disarms every timer and ages the pool by one connection generation,
    /// evicting slots that have sat idle for too many generations.
    pub(crate) fn stop_all(&mut self) {
        for slot in self.slots.values_mut() {
            slot.deadline = None;
        }
        self.generation += 1;
        let generation = self.generation;
        self.slots
            .retain(|_, slot| generation - slot.last_armed <= EVICT_IDLE_CONNECTIONS);
    }

    /// Earliest armed deadline, `None` when nothing is in flight.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.slots.values().filter_map(|slot| slot.deadline).min()
    }

    /// Collects every key whose deadline has passed, disarming each slot.
    /// Expired slots stay in the pool and are reusable.
    pub(crate) fn take_expired(&mut self, now: Instant) -> Vec<TimerKey> {
        let mut expired = Vec::new();
        for (key, slot) in &mut self.slots {
            if slot.deadline.is_some_and(|deadline| deadline <= now) {
                slot.deadline = None;
                expired.push(key.clone());
            }
        }
        expired
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self, address: &str, cmd: DaemonCmd) -> bool {
        let key = TimerKey {
            address: address.to_owned(),
            cmd,
        };
        self.slots
            .get(&key)
            .is_some_and(|slot| slot.deadline.is_some())
    }

    #[cfg(test)]
    fn active_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.deadline.is_some())
            .count()
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
