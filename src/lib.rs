#![cfg_attr(not(feature = "std"), no_std)]
#![doc = include_str!("../README.md")]

//! # Core Concepts
//!
//! - **`Composer`**: Turns waveform requests into scheduled relay transitions and tracks every in-flight waveform
//! - **`EventScheduler`**: Trait to implement for your timer queue
//! - **`RelayDriver`**: Trait to implement for your relay hardware
//! - **`Event`** / **`Action`**: What the scheduler hands back to the composer when time is up
//! - **`ChannelSet`**: Bitmask of relays switched together
//! - **`SlotPool`**: Fixed-capacity storage behind every waveform
//! - **`PwmTiming`**: Period, on-duration and repeat count derived by the `waveform` functions
//! - **`ComposerConfig`**: Board profile and parameter bounds
//! - **`WaveformCommand`**: Typed commands for transport layers
//!
//! All times are scheduler ticks (milliseconds on the reference boards).

#[macro_use]
mod fmt;

pub mod types;
pub mod pool;
pub mod waveform;
pub mod scheduler;
pub mod hardware;
pub mod config;
pub mod composer;
pub mod command;

pub use types::{
    ChannelSet, ComposeError, LevelChainId, LevelSpec, MAX_CHANNELS, MAX_LEVELS, PatternId,
    PowerLevel, PulseWaveId, PwmStatus, RelayId, RepeatCount, Ticks,
};
pub use pool::{PoolFull, SlotPool};
pub use waveform::PwmTiming;
pub use scheduler::{Action, Event, EventHandle, EventPair, EventScheduler, PulseTrain, ScheduleError};
pub use hardware::{HardwareAdapter, POWER_FULL, RelayDriver, STATE_COUNT};
pub use config::{Bounds, ComposerConfig, ConfigBuilder, ConfigError};
pub use composer::{Composer, PatternSpec};
pub use command::{CommandOutcome, WaveformCommand};
