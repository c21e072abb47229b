//! Core types shared by the composer, the scheduler seam and the hardware adapter.

/// Scheduler time unit. One tick is one millisecond on the shipped boards.
pub type Ticks = u32;

/// Power level written to a relay driver; `u8::MAX` is fully on.
pub type PowerLevel = u8;

/// Largest number of channels a [`ChannelSet`] can address.
pub const MAX_CHANNELS: usize = 32;

/// Deepest leveled PWM chain a relay can carry.
pub const MAX_LEVELS: usize = 4;

/// An identifier for a single relay (channel) on the board.
///
/// Relay `n` is the same output as bit `n` of a [`ChannelSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RelayId(pub u8);

impl RelayId {
    /// Position of this relay inside per-relay tables.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u8> for RelayId {
    fn from(id: u8) -> Self {
        RelayId(id)
    }
}

impl From<RelayId> for u8 {
    fn from(id: RelayId) -> Self {
        id.0
    }
}

/// Bitmask selecting a subset of channels for a simultaneous operation.
///
/// Bit `i` set means channel `i` participates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelSet(u32);

impl ChannelSet {
    /// No channels.
    pub const EMPTY: Self = ChannelSet(0);

    /// Creates a set from a raw bitmask.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        ChannelSet(bits)
    }

    /// Creates a set holding a single channel.
    ///
    /// Relays past [`MAX_CHANNELS`] produce an empty set.
    #[inline]
    pub const fn single(relay: RelayId) -> Self {
        if relay.index() < MAX_CHANNELS {
            ChannelSet(1 << relay.0)
        } else {
            ChannelSet::EMPTY
        }
    }

    /// Creates a set holding channels `0..count`.
    #[inline]
    pub const fn all(count: u8) -> Self {
        if count as usize >= MAX_CHANNELS {
            ChannelSet(u32::MAX)
        } else {
            ChannelSet((1u32 << count) - 1)
        }
    }

    /// Returns the raw bitmask.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if no channel is selected.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of channels in the set.
    #[inline]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Returns true if `relay` is in the set.
    #[inline]
    pub const fn contains(self, relay: RelayId) -> bool {
        relay.index() < MAX_CHANNELS && self.0 & (1 << relay.0) != 0
    }

    /// Channels in either set.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        ChannelSet(self.0 | other.0)
    }

    /// Channels in both sets.
    #[inline]
    pub const fn intersection(self, other: Self) -> Self {
        ChannelSet(self.0 & other.0)
    }

    /// Channels in this set but not in `other`.
    #[inline]
    pub const fn difference(self, other: Self) -> Self {
        ChannelSet(self.0 & !other.0)
    }

    /// Returns true if the sets share a channel.
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Channels from `0..count` that are not in this set.
    #[inline]
    pub const fn complement(self, count: u8) -> Self {
        ChannelSet::all(count).difference(self)
    }

    /// Iterates the relays in the set in ascending order.
    pub fn iter(self) -> impl Iterator<Item = RelayId> {
        (0..MAX_CHANNELS as u8)
            .map(RelayId)
            .filter(move |relay| self.contains(*relay))
    }
}

impl From<RelayId> for ChannelSet {
    fn from(relay: RelayId) -> Self {
        ChannelSet::single(relay)
    }
}

/// How many times a periodic on/off train repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RepeatCount {
    /// Repeat a specific number of periods.
    Finite(u32),

    /// Repeat until cancelled.
    Infinite,
}

impl RepeatCount {
    /// Returns true if the train repeats until cancelled.
    #[inline]
    pub const fn is_infinite(self) -> bool {
        matches!(self, RepeatCount::Infinite)
    }
}

impl Default for RepeatCount {
    fn default() -> Self {
        RepeatCount::Finite(1)
    }
}

/// Whether a leveled PWM stage is currently inside its running window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmStatus {
    #[default]
    Stopped,
    Running,
}

/// Period and on-duration of one stage of a leveled PWM chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LevelSpec {
    /// Ticks from one on-phase to the next.
    pub period: Ticks,
    /// Ticks the level stays on in each period.
    pub on_duration: Ticks,
}

impl LevelSpec {
    /// Creates a level from its period and on-duration.
    #[inline]
    pub const fn new(period: Ticks, on_duration: Ticks) -> Self {
        Self {
            period,
            on_duration,
        }
    }
}

/// Caller-visible handle to an independently stoppable pulse wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseWaveId(pub usize);

/// Handle to the root slot of a leveled PWM chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LevelChainId(pub usize);

/// Handle to a patterned PWM slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PatternId(pub usize);

/// Reasons a waveform request was refused.
///
/// A refused request never changes hardware state and never holds on to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ComposeError {
    /// A slot pool had no room for the request.
    ResourceExhausted,

    /// A power level below full scale was requested on a relay without
    /// high-frequency drive.
    InvalidChannelCapability(RelayId),

    /// Relay id or channel mask lies outside the configured channels.
    InvalidChannel,

    /// A live waveform already owns one of the requested channels.
    ChannelBusy(ChannelSet),

    /// The derived timing repeats zero times.
    EmptyWaveform,

    /// The event scheduler refused an event.
    SchedulerFull,

    /// A stop request named a handle that is not live.
    UnknownHandle,

    /// A saved state index past the state table.
    InvalidStateIndex(usize),
}

impl core::fmt::Display for ComposeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ComposeError::ResourceExhausted => {
                write!(f, "no free waveform slot")
            }
            ComposeError::InvalidChannelCapability(relay) => {
                write!(f, "relay {} cannot be driven at partial power", relay.0)
            }
            ComposeError::InvalidChannel => {
                write!(f, "channel outside the configured channel range")
            }
            ComposeError::ChannelBusy(channels) => {
                write!(
                    f,
                    "channels {:#x} are owned by a running waveform",
                    channels.bits()
                )
            }
            ComposeError::EmptyWaveform => {
                write!(f, "waveform repeats zero times")
            }
            ComposeError::SchedulerFull => {
                write!(f, "event scheduler refused the event")
            }
            ComposeError::UnknownHandle => {
                write!(f, "handle does not refer to a running waveform")
            }
            ComposeError::InvalidStateIndex(index) => {
                write!(f, "saved state index {} out of range", index)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ComposeError {}
