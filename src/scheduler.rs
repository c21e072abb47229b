//! Event scheduler abstraction.
//!
//! The composer never keeps time itself. It hands typed [`Event`]s to an
//! [`EventScheduler`] implementation and gets them back, at the right moment,
//! through [`Composer::handle_event`](crate::Composer::handle_event).

use crate::types::{RepeatCount, Ticks};
use crate::waveform::PwmTiming;

/// What the composer should do when an event fires.
///
/// Each variant is dispatched against the slot named by [`Event::slot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    /// Switch a channel slot's channels on.
    ChannelsOn,
    /// Switch a channel slot's channels off.
    ChannelsOff,
    /// Free a channel slot whose waveform has run out.
    ReleaseChannels,
    /// A leveled PWM stage enters its on-phase.
    LevelStart,
    /// A leveled PWM stage enters its off-phase.
    LevelStop,
    /// A pattern's outer envelope enters its on-phase.
    PatternStart,
    /// A pattern's outer envelope enters its off-phase.
    PatternStop,
    /// A pattern's inner PWM enters its on-phase.
    PatternPulseOn,
    /// A pattern's inner PWM enters its off-phase.
    PatternPulseOff,
    /// Free a pattern slot whose outer envelope has run out.
    ReleasePattern,
}

/// An action bound to the slot it operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Event {
    /// What to do.
    pub action: Action,
    /// Pool index of the record the action applies to.
    pub slot: usize,
}

impl Event {
    /// Creates an event for `slot`.
    #[inline]
    pub const fn new(action: Action, slot: usize) -> Self {
        Self { action, slot }
    }
}

/// Opaque scheduler-issued reference to one scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventHandle(pub u32);

/// Handles of the on and off halves of a periodic train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventPair {
    /// Handle of the on events.
    pub on: EventHandle,
    /// Handle of the off events.
    pub off: EventHandle,
}

/// A periodic on/off train request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseTrain {
    /// Delivered at the start of every period.
    pub on: Event,
    /// Delivered `on_duration` ticks into every period.
    pub off: Event,
    /// Ticks from one on event to the next.
    pub period: Ticks,
    /// Ticks from an on event to its off event.
    pub on_duration: Ticks,
    /// Number of periods.
    pub repeat: RepeatCount,
    /// Delivered once after the last off event of a finite train.
    pub on_exhaust: Option<Event>,
}

impl PulseTrain {
    /// Creates a train from a derived timing.
    pub fn new(on: Event, off: Event, timing: PwmTiming) -> Self {
        Self {
            on,
            off,
            period: timing.period,
            on_duration: timing.on_duration,
            repeat: timing.repeat,
            on_exhaust: None,
        }
    }

    /// Sets the event delivered after the last period.
    pub fn on_exhaust(mut self, event: Event) -> Self {
        self.on_exhaust = Some(event);
        self
    }
}

/// Error returned when a scheduler cannot accept another event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScheduleError;

impl core::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "event scheduler is full")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ScheduleError {}

/// Trait for abstracting the timed event facility.
///
/// Implement this on top of your timer queue. Fired events are handed back to
/// [`Composer::handle_event`](crate::Composer::handle_event) one at a time, from
/// the same thread that issues the scheduling calls.
///
/// # Contract
/// - Delays and offsets are measured in [`Ticks`]; a zero delay fires on the
///   next dispatch pass, never synchronously inside the scheduling call.
/// - An offset event fires at the first fire time of `base` plus `offset`,
///   whether or not `base` has already fired.
/// - A `Finite(0)` train delivers only its exhaust event, at its start time.
/// - Cancelling an event that has not fired yet removes it from every future
///   dispatch, including a dispatch pass already in progress. Cancelling an
///   unknown or spent handle is a no-op.
pub trait EventScheduler {
    /// Delivers `event` once after `delay` ticks.
    fn schedule_once(&mut self, event: Event, delay: Ticks) -> Result<EventHandle, ScheduleError>;

    /// Delivers `event` once, `offset` ticks after `base` first fires, then
    /// `on_exhaust` if given.
    fn schedule_offset(
        &mut self,
        event: Event,
        base: EventHandle,
        offset: Ticks,
        on_exhaust: Option<Event>,
    ) -> Result<EventHandle, ScheduleError>;

    /// Starts a periodic train after `delay` ticks.
    fn schedule_periodic(
        &mut self,
        train: PulseTrain,
        delay: Ticks,
    ) -> Result<EventPair, ScheduleError>;

    /// Starts a periodic train `offset` ticks after `base` first fires.
    fn schedule_periodic_offset(
        &mut self,
        train: PulseTrain,
        base: EventHandle,
        offset: Ticks,
    ) -> Result<EventPair, ScheduleError>;

    /// Cancels a single event.
    fn cancel(&mut self, handle: EventHandle);

    /// Cancels both halves of a periodic train.
    fn cancel_pair(&mut self, pair: EventPair) {
        self.cancel(pair.on);
        self.cancel(pair.off);
    }

    /// Cancels every pending event.
    fn cancel_all(&mut self);
}
