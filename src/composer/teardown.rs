//! Leveled PWM chain teardown.
//!
//! A chain is a singly linked list of level slots. Walking it is iterative, so
//! neither teardown nor disarm recurses, and both are safe to run from inside
//! an event the scheduler is currently delivering.

use super::Composer;
use crate::hardware::RelayDriver;
use crate::scheduler::EventScheduler;
use crate::types::PwmStatus;

impl<S, D, const SLOTS: usize, const WAVES: usize> Composer<S, D, SLOTS, WAVES>
where
    S: EventScheduler,
    D: RelayDriver,
{
    /// Cancels, opens and frees every level from `root` down.
    ///
    /// Levels that are waiting to be armed by their parent have no events and
    /// are freed without a cancel call.
    pub(super) fn teardown_level_chain(&mut self, root: usize) {
        let mut next = Some(root);
        while let Some(index) = next {
            let Some(record) = self.levels.get(index).copied() else {
                break;
            };
            if let Some(pair) = record.events {
                self.scheduler.cancel_pair(pair);
            }
            self.hardware.open(record.relay);
            self.set_level_status(record.relay, record.level, PwmStatus::Stopped);
            next = record.child;
            self.levels.remove(index);
            debug!("level slot {} released", index);
        }
    }

    /// Frees every level from `root` down without touching hardware.
    ///
    /// Used to roll back a chain whose root could not be scheduled.
    pub(super) fn discard_level_chain(&mut self, root: usize) {
        let mut next = Some(root);
        while let Some(index) = next {
            next = self.levels.remove(index).and_then(|record| record.child);
        }
    }

    /// Cancels and opens every level from `first` down, keeping their slots.
    ///
    /// Runs when a parent level enters its off-phase; the next on-phase arms
    /// `first` again.
    pub(super) fn disarm_level_chain(&mut self, first: usize) {
        let mut next = Some(first);
        while let Some(index) = next {
            let Some(record) = self.levels.get_mut(index) else {
                break;
            };
            let events = record.events.take();
            let (relay, level, child) = (record.relay, record.level, record.child);

            if let Some(pair) = events {
                self.scheduler.cancel_pair(pair);
            }
            self.hardware.open(relay);
            self.set_level_status(relay, level, PwmStatus::Stopped);
            next = child;
        }
    }
}
