//! Waveform arithmetic.
//!
//! Pure conversions from declarative waveform parameters into the
//! period / on-duration / repeat-count triple the scheduler understands.
//! Every conversion keeps both the on-phase and the off-phase at least one
//! tick long, so a train never degenerates into a constant level.

use crate::types::{RepeatCount, Ticks};
use num_traits::Float;

/// Shortest period that still has a distinct on-phase and off-phase.
pub const MIN_PERIOD: Ticks = 2;

/// Ticks per second.
const TICKS_PER_SECOND: f32 = 1000.0;

/// Timing of one periodic on/off train.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmTiming {
    /// Ticks from one on-edge to the next.
    pub period: Ticks,

    /// Ticks the output stays on within each period.
    pub on_duration: Ticks,

    /// Number of periods.
    pub repeat: RepeatCount,
}

impl PwmTiming {
    /// Builds a timing from caller-supplied period and on-duration.
    ///
    /// The period is raised to [`MIN_PERIOD`] and the on-duration clamped into
    /// `1..=period - 1`.
    pub fn from_period(period: Ticks, on_duration: Ticks, repeat: RepeatCount) -> Self {
        let period = period.max(MIN_PERIOD);
        Self {
            period,
            on_duration: on_duration.clamp(1, period - 1),
            repeat,
        }
    }

    /// Ticks the output stays off within each period.
    #[inline]
    pub fn off_duration(&self) -> Ticks {
        self.period - self.on_duration
    }

    /// Ticks from the first on-edge to the end of the last period.
    ///
    /// Returns `None` for infinite trains.
    pub fn total_duration(&self) -> Option<Ticks> {
        match self.repeat {
            RepeatCount::Finite(count) => Some(self.period.saturating_mul(count)),
            RepeatCount::Infinite => None,
        }
    }

    /// Returns true if the train never fires.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.repeat == RepeatCount::Finite(0)
    }
}

/// Derives a PWM train from a frequency, a duty cycle and a total duration.
///
/// `period = max(round(1000 / frequency), 2)`,
/// `on = clamp(round(period * duty / 100), 1, period - 1)` and
/// `count = floor(total_duration / period)`.
pub fn from_frequency(frequency_hz: f32, duty_cycle: u8, total_duration: Ticks) -> PwmTiming {
    let period = period_from_frequency(frequency_hz);
    let count = total_duration / period;
    PwmTiming {
        period,
        on_duration: on_duration_for(period, duty_cycle),
        repeat: RepeatCount::Finite(count),
    }
}

/// Derives an unbounded PWM train from a frequency and a duty cycle.
pub fn from_frequency_infinite(frequency_hz: f32, duty_cycle: u8) -> PwmTiming {
    let period = period_from_frequency(frequency_hz);
    PwmTiming {
        period,
        on_duration: on_duration_for(period, duty_cycle),
        repeat: RepeatCount::Infinite,
    }
}

fn period_from_frequency(frequency_hz: f32) -> Ticks {
    // Float-to-int casts saturate and map NaN to zero.
    let period = Float::round(TICKS_PER_SECOND / frequency_hz) as Ticks;
    period.max(MIN_PERIOD)
}

fn on_duration_for(period: Ticks, duty_cycle: u8) -> Ticks {
    let scaled = (u64::from(period) * u64::from(duty_cycle) + 50) / 100;
    let on = Ticks::try_from(scaled).unwrap_or(Ticks::MAX);
    on.clamp(1, period - 1)
}

/// Timing of the spike phase of a spike-and-hold waveform.
///
/// The minority phase (on below 50 %, off above) is pinned to one tick and
/// the period is clamped into `[2, duration]`.
pub fn spike_phase(duty_cycle: u8, duration: Ticks) -> PwmTiming {
    let (period, on_duration) = minority_tick_period(duty_cycle, Some(duration));
    PwmTiming {
        period,
        on_duration,
        repeat: RepeatCount::Finite(duration / period),
    }
}

/// Timing of the hold phase of a spike-and-hold waveform.
///
/// A `duration` of zero or less holds forever, in which case the period has
/// no upper clamp.
pub fn hold_phase(duty_cycle: u8, duration: i64) -> PwmTiming {
    if duration <= 0 {
        let (period, on_duration) = minority_tick_period(duty_cycle, None);
        return PwmTiming {
            period,
            on_duration,
            repeat: RepeatCount::Infinite,
        };
    }
    let duration = Ticks::try_from(duration).unwrap_or(Ticks::MAX);
    spike_phase(duty_cycle, duration)
}

fn minority_tick_period(duty_cycle: u8, phase: Option<Ticks>) -> (Ticks, Ticks) {
    let duty = Ticks::from(duty_cycle.clamp(1, 99));
    let minority = if duty <= 50 { duty } else { 100 - duty };
    let mut period = (100 + minority / 2) / minority;
    if let Some(phase) = phase {
        period = period.min(phase);
    }
    let period = period.max(MIN_PERIOD);

    let on_duration = if duty <= 50 { 1 } else { period - 1 };
    (period, on_duration)
}
