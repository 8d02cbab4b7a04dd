//! Tick-driven timer engine.
//!
//! The engine owns one [`Scheduler`] and advances it from its own `tick()`.
//! Fired entries are reported to a [`SchedulerDelegate`]; the scheduler never
//! calls back into the engine directly.
//!
//! ```text
//!   ┌──────────────┐   ┌──────────────┐
//!   │  Periodic    │   │  One-Shot    │
//!   │  (WiFi scan) │   │  (reboot)    │
//!   └──────┬───────┘   └──────┬───────┘
//!          ▼                  ▼
//!   ┌─────────────────────────────────┐
//!   │        SchedulerDelegate        │
//!   └────────────────┬────────────────┘
//!                    ▼
//!              BlinkUp::tick()
//! ```
//!
//! Every entry is addressed by a [`ScheduleHandle`] carrying a generation
//! counter, so a stale handle can never remove a later entry that happens to
//! reuse the same slot.

use crate::app::ports::{ScheduleFiredKind, SchedulerDelegate};
use log::{debug, info};

// ═══════════════════════════════════════════════════════════════
//  Schedule types
// ═══════════════════════════════════════════════════════════════

/// A single schedule entry.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    /// Label reported to the delegate when the entry fires.
    pub label: &'static str,
    pub kind: ScheduleKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduleKind {
    /// Fire every `interval_secs` seconds until removed.
    Periodic { interval_secs: u32 },
    /// Fire once after `delay_secs`, then free the slot.  A zero delay
    /// fires on the next tick.
    OneShot { delay_secs: u32 },
}

/// Opaque reference to a live schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleHandle {
    slot: usize,
    generation: u32,
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

/// Maximum number of concurrent schedules (stack-allocated).
const MAX_SCHEDULES: usize = 4;

pub struct Scheduler {
    schedules: [Option<ScheduleEntry>; MAX_SCHEDULES],
    next_generation: u32,
}

#[derive(Debug, Clone, Copy)]
struct ScheduleEntry {
    schedule: Schedule,
    generation: u32,
    /// Seconds accumulated since the last fire (or since `add`).
    elapsed_secs: f32,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            schedules: [None; MAX_SCHEDULES],
            next_generation: 0,
        }
    }

    /// Add a schedule.  Returns its handle, or `None` if all slots are full.
    pub fn add(&mut self, schedule: Schedule) -> Option<ScheduleHandle> {
        let slot = self.schedules.iter().position(Option::is_none)?;
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        info!("Scheduler: added '{}' at slot {}", schedule.label, slot);
        self.schedules[slot] = Some(ScheduleEntry {
            schedule,
            generation,
            elapsed_secs: 0.0,
        });
        Some(ScheduleHandle { slot, generation })
    }

    /// Remove a schedule.  Returns `false` if the handle is stale.
    pub fn remove(&mut self, handle: ScheduleHandle) -> bool {
        if !self.contains(handle) {
            debug!("Scheduler: stale handle for slot {}", handle.slot);
            return false;
        }
        if let Some(entry) = self.schedules[handle.slot].take() {
            info!("Scheduler: removed '{}' from slot {}", entry.schedule.label, handle.slot);
        }
        true
    }

    pub fn contains(&self, handle: ScheduleHandle) -> bool {
        matches!(
            self.schedules.get(handle.slot),
            Some(Some(e)) if e.generation == handle.generation
        )
    }

    /// Advance every entry by `tick_secs` and report what fired.
    pub fn tick(&mut self, tick_secs: f32, delegate: &mut dyn SchedulerDelegate) {
        for slot in &mut self.schedules {
            let Some(entry) = slot.as_mut() else { continue };
            entry.elapsed_secs += tick_secs;

            match entry.schedule.kind {
                ScheduleKind::Periodic { interval_secs } => {
                    if entry.elapsed_secs >= interval_secs as f32 {
                        info!(
                            "Scheduler: '{}' periodic fire (every {}s)",
                            entry.schedule.label, interval_secs
                        );
                        entry.elapsed_secs = 0.0;
                        delegate.on_schedule_fired(entry.schedule.label, ScheduleFiredKind::Periodic);
                    }
                }
                ScheduleKind::OneShot { delay_secs } => {
                    if entry.elapsed_secs >= delay_secs as f32 {
                        info!(
                            "Scheduler: '{}' one-shot fired (after {}s)",
                            entry.schedule.label, delay_secs
                        );
                        let label = entry.schedule.label;
                        *slot = None;
                        delegate.on_schedule_fired(label, ScheduleFiredKind::OneShot);
                    }
                }
            }
        }
    }

    /// Number of live schedules.
    pub fn active_count(&self) -> usize {
        self.schedules.iter().filter(|s| s.is_some()).count()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
