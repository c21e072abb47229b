//! Board profile and parameter bounds.
//!
//! A [`ComposerConfig`] is built once at start-up through [`ConfigBuilder`]
//! and never changes afterwards. Requests whose parameters fall outside the
//! configured bounds are clamped into them, not rejected.

use crate::types::{ChannelSet, MAX_CHANNELS, MAX_LEVELS, PowerLevel, Ticks};

/// Inclusive range a request parameter is clamped into.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Bounds<T> {
    /// Lowest accepted value.
    pub min: T,
    /// Highest accepted value.
    pub max: T,
}

impl<T: PartialOrd + Copy> Bounds<T> {
    /// Creates bounds from `min` and `max`; [`ConfigBuilder::build`] checks the order.
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    /// Clamps `value` into the range.
    #[inline]
    pub fn clamp(&self, value: T) -> T {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }

    fn is_ordered(&self) -> bool {
        self.min <= self.max
    }
}

/// Validated board profile.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ComposerConfig {
    /// Number of relay channels on the board.
    pub channel_count: u8,

    /// Relays wired for analog / high-frequency drive.
    pub high_frequency: ChannelSet,

    /// Bounds for delays, durations, periods and on-durations.
    pub duration: Bounds<Ticks>,

    /// Bounds for PWM frequencies, in hertz.
    pub frequency: Bounds<f32>,

    /// Bounds for duty cycles, in percent.
    pub duty_cycle: Bounds<u8>,

    /// Bounds for analog power levels.
    pub power: Bounds<PowerLevel>,

    /// Deepest leveled PWM chain accepted, including the base level.
    pub level_count_max: u8,
}

impl ComposerConfig {
    /// Creates a new configuration builder seeded with the default profile.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

impl Default for ComposerConfig {
    /// Eight relays; relays 1, 3, 4 and 7 sit on timer pins.
    fn default() -> Self {
        Self {
            channel_count: 8,
            high_frequency: ChannelSet::from_bits(0b1001_1010),
            duration: Bounds::new(0, 0x7fff_ffff),
            frequency: Bounds::new(0.01, 500.0),
            duty_cycle: Bounds::new(1, 99),
            power: Bounds::new(0, PowerLevel::MAX),
            level_count_max: MAX_LEVELS as u8,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Channel count is zero or above [`MAX_CHANNELS`].
    InvalidChannelCount(u8),

    /// Level count is zero or above [`MAX_LEVELS`].
    InvalidLevelCount(u8),

    /// A bound has `min > max`.
    InvertedBounds(&'static str),

    /// Frequency bounds are not strictly positive.
    NonPositiveFrequency,

    /// Duty cycle bounds leave `1..=99`.
    DutyCycleOutOfRange,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::InvalidChannelCount(count) => {
                write!(
                    f,
                    "channel count {} must be between 1 and {}",
                    count, MAX_CHANNELS
                )
            }
            ConfigError::InvalidLevelCount(count) => {
                write!(
                    f,
                    "level count {} must be between 1 and {}",
                    count, MAX_LEVELS
                )
            }
            ConfigError::InvertedBounds(name) => {
                write!(f, "{} bounds have min greater than max", name)
            }
            ConfigError::NonPositiveFrequency => {
                write!(f, "frequency bounds must be positive")
            }
            ConfigError::DutyCycleOutOfRange => {
                write!(f, "duty cycle bounds must lie within 1..=99")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

/// Builder for constructing validated configurations.
#[derive(Debug)]
pub struct ConfigBuilder {
    config: ComposerConfig,
}

impl ConfigBuilder {
    /// Creates a builder seeded with [`ComposerConfig::default`].
    pub fn new() -> Self {
        Self {
            config: ComposerConfig::default(),
        }
    }

    /// Sets the number of relay channels.
    pub fn channel_count(mut self, count: u8) -> Self {
        self.config.channel_count = count;
        self
    }

    /// Sets the relays wired for analog drive.
    pub fn high_frequency(mut self, relays: ChannelSet) -> Self {
        self.config.high_frequency = relays;
        self
    }

    /// Sets the bounds for delays, durations, periods and on-durations.
    pub fn duration_bounds(mut self, min: Ticks, max: Ticks) -> Self {
        self.config.duration = Bounds::new(min, max);
        self
    }

    /// Sets the PWM frequency bounds, in hertz.
    pub fn frequency_bounds(mut self, min: f32, max: f32) -> Self {
        self.config.frequency = Bounds::new(min, max);
        self
    }

    /// Sets the duty cycle bounds, in percent.
    pub fn duty_cycle_bounds(mut self, min: u8, max: u8) -> Self {
        self.config.duty_cycle = Bounds::new(min, max);
        self
    }

    /// Sets the analog power bounds.
    pub fn power_bounds(mut self, min: PowerLevel, max: PowerLevel) -> Self {
        self.config.power = Bounds::new(min, max);
        self
    }

    /// Sets the deepest leveled PWM chain, including the base level.
    pub fn level_count_max(mut self, count: u8) -> Self {
        self.config.level_count_max = count;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// High-frequency relays outside the channel range are dropped.
    ///
    /// # Errors
    /// See [`ConfigError`].
    pub fn build(self) -> Result<ComposerConfig, ConfigError> {
        let mut config = self.config;

        if config.channel_count == 0 || usize::from(config.channel_count) > MAX_CHANNELS {
            return Err(ConfigError::InvalidChannelCount(config.channel_count));
        }
        if config.level_count_max == 0 || usize::from(config.level_count_max) > MAX_LEVELS {
            return Err(ConfigError::InvalidLevelCount(config.level_count_max));
        }
        if !config.duration.is_ordered() {
            return Err(ConfigError::InvertedBounds("duration"));
        }
        if !config.frequency.is_ordered() {
            return Err(ConfigError::InvertedBounds("frequency"));
        }
        if !config.duty_cycle.is_ordered() {
            return Err(ConfigError::InvertedBounds("duty cycle"));
        }
        if !config.power.is_ordered() {
            return Err(ConfigError::InvertedBounds("power"));
        }
        if !(config.frequency.min > 0.0) {
            return Err(ConfigError::NonPositiveFrequency);
        }
        if config.duty_cycle.min < 1 || config.duty_cycle.max > 99 {
            return Err(ConfigError::DutyCycleOutOfRange);
        }

        config.high_frequency = config
            .high_frequency
            .intersection(ChannelSet::all(config.channel_count));
        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
