//! Relay hardware abstraction.
//!
//! Defines the [`RelayDriver`] trait implemented by board support code, and the
//! [`HardwareAdapter`] that wraps it with channel bookkeeping: which channels
//! are on, the last power level driven per relay, and a small table of saved
//! channel states.

use crate::types::{ChannelSet, ComposeError, MAX_CHANNELS, PowerLevel, RelayId};

/// Number of channel states that can be saved and recalled.
pub const STATE_COUNT: usize = 16;

/// Power level that drives a relay fully closed.
pub const POWER_FULL: PowerLevel = PowerLevel::MAX;

/// Trait for abstracting solid-state relay hardware.
///
/// Implement this for your output stage (GPIO, timer PWM, shift register, etc.).
/// Handle any hardware errors internally - these methods cannot fail.
pub trait RelayDriver {
    /// Opens a relay (output off).
    fn open(&mut self, relay: RelayId);

    /// Closes a relay (output fully on).
    fn close(&mut self, relay: RelayId);

    /// Drives a relay at an analog power level.
    ///
    /// Only called for relays the configuration marks as high-frequency capable.
    fn set_power(&mut self, relay: RelayId, level: PowerLevel);

    /// Closes every relay in `channels`.
    fn channels_on(&mut self, channels: ChannelSet);

    /// Opens every relay in `channels`.
    fn channels_off(&mut self, channels: ChannelSet);
}

/// Wraps a [`RelayDriver`] and tracks the state it was last driven into.
///
/// All hardware writes made by the composer go through this adapter.
pub struct HardwareAdapter<D: RelayDriver> {
    driver: D,
    channel_count: u8,
    high_frequency: ChannelSet,
    on: ChannelSet,
    power: [PowerLevel; MAX_CHANNELS],
    saved_states: [ChannelSet; STATE_COUNT],
}

impl<D: RelayDriver> HardwareAdapter<D> {
    /// Creates an adapter and opens every configured channel.
    pub fn new(mut driver: D, channel_count: u8, high_frequency: ChannelSet) -> Self {
        let all = ChannelSet::all(channel_count);
        driver.channels_off(all);

        Self {
            driver,
            channel_count,
            high_frequency: high_frequency.intersection(all),
            on: ChannelSet::EMPTY,
            power: [0; MAX_CHANNELS],
            saved_states: [ChannelSet::EMPTY; STATE_COUNT],
        }
    }

    /// Returns a reference to the wrapped driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Returns a mutable reference to the wrapped driver.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Number of configured channels.
    pub fn channel_count(&self) -> u8 {
        self.channel_count
    }

    /// Every configured channel.
    pub fn all_channels(&self) -> ChannelSet {
        ChannelSet::all(self.channel_count)
    }

    /// Returns true if `relay` is one of the configured channels.
    pub fn is_valid(&self, relay: RelayId) -> bool {
        relay.0 < self.channel_count
    }

    /// Returns true if `relay` is wired for analog / high-frequency drive.
    pub fn supports_power(&self, relay: RelayId) -> bool {
        self.high_frequency.contains(relay)
    }

    /// Rejects partial power on relays that can only switch.
    ///
    /// # Errors
    /// `InvalidChannelCapability` if `level` is below full scale and `relay`
    /// lacks high-frequency drive.
    pub fn check_power(&self, relay: RelayId, level: PowerLevel) -> Result<(), ComposeError> {
        if level < POWER_FULL && !self.supports_power(relay) {
            return Err(ComposeError::InvalidChannelCapability(relay));
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Single relay
    // ---------------------------------------------------------------------

    /// Opens a relay.
    pub fn open(&mut self, relay: RelayId) {
        self.driver.open(relay);
        self.on = self.on.difference(relay.into());
        self.record_power(relay, 0);
    }

    /// Closes a relay.
    pub fn close(&mut self, relay: RelayId) {
        self.driver.close(relay);
        self.on = self.on.union(relay.into());
        self.record_power(relay, POWER_FULL);
    }

    /// Drives a relay at `level`, switching it when the level is full scale.
    ///
    /// Callers validate the level with [`check_power`](Self::check_power) first.
    pub fn drive(&mut self, relay: RelayId, level: PowerLevel) {
        if level == POWER_FULL {
            self.close(relay);
            return;
        }
        self.driver.set_power(relay, level);
        if level == 0 {
            self.on = self.on.difference(relay.into());
        } else {
            self.on = self.on.union(relay.into());
        }
        self.record_power(relay, level);
    }

    /// Last power level driven into `relay`.
    pub fn power(&self, relay: RelayId) -> PowerLevel {
        self.power.get(relay.index()).copied().unwrap_or(0)
    }

    fn record_power(&mut self, relay: RelayId, level: PowerLevel) {
        if let Some(slot) = self.power.get_mut(relay.index()) {
            *slot = level;
        }
    }

    // ---------------------------------------------------------------------
    // Channel sets
    // ---------------------------------------------------------------------

    /// Closes every relay in `channels`.
    pub fn channels_on(&mut self, channels: ChannelSet) {
        let channels = channels.intersection(self.all_channels());
        self.driver.channels_on(channels);
        self.on = self.on.union(channels);
        for relay in channels.iter() {
            self.record_power(relay, POWER_FULL);
        }
    }

    /// Opens every relay in `channels`.
    pub fn channels_off(&mut self, channels: ChannelSet) {
        let channels = channels.intersection(self.all_channels());
        self.driver.channels_off(channels);
        self.on = self.on.difference(channels);
        for relay in channels.iter() {
            self.record_power(relay, 0);
        }
    }

    /// Flips every relay in `channels`.
    pub fn toggle(&mut self, channels: ChannelSet) {
        let channels = channels.intersection(self.all_channels());
        let turning_off = channels.intersection(self.on);
        let turning_on = channels.difference(self.on);
        if !turning_off.is_empty() {
            self.channels_off(turning_off);
        }
        if !turning_on.is_empty() {
            self.channels_on(turning_on);
        }
    }

    /// Closes `channels` and opens every other channel.
    pub fn exclusive_on(&mut self, channels: ChannelSet) {
        self.channels_off(channels.complement(self.channel_count));
        self.channels_on(channels);
    }

    /// Opens `channels` and closes every other channel.
    pub fn exclusive_off(&mut self, channels: ChannelSet) {
        self.channels_off(channels);
        self.channels_on(channels.complement(self.channel_count));
    }

    /// Opens every relay individually, clearing any analog drive.
    pub fn open_all(&mut self) {
        for relay in self.all_channels().iter() {
            self.open(relay);
        }
    }

    /// Channels currently on.
    pub fn channels_on_state(&self) -> ChannelSet {
        self.on
    }

    /// Channels currently off.
    pub fn channels_off_state(&self) -> ChannelSet {
        self.on.complement(self.channel_count)
    }

    // ---------------------------------------------------------------------
    // Saved states
    // ---------------------------------------------------------------------

    /// Stores the current on-channels in the state table.
    ///
    /// # Errors
    /// `InvalidStateIndex` if `index` is past [`STATE_COUNT`].
    pub fn save_state(&mut self, index: usize) -> Result<(), ComposeError> {
        let slot = self
            .saved_states
            .get_mut(index)
            .ok_or(ComposeError::InvalidStateIndex(index))?;
        *slot = self.on;
        Ok(())
    }

    /// Drives the channels to a previously saved state.
    ///
    /// # Errors
    /// `InvalidStateIndex` if `index` is past [`STATE_COUNT`].
    pub fn recall_state(&mut self, index: usize) -> Result<(), ComposeError> {
        let state = *self
            .saved_states
            .get(index)
            .ok_or(ComposeError::InvalidStateIndex(index))?;
        self.exclusive_on(state);
        Ok(())
    }

    /// The saved state table.
    pub fn saved_states(&self) -> &[ChannelSet; STATE_COUNT] {
        &self.saved_states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Open(u8),
        Close(u8),
        Power(u8, u8),
        On(u32),
        Off(u32),
    }

    struct RecordingDriver {
        calls: heapless::Vec<Call, 64>,
    }

    impl RecordingDriver {
        fn new() -> Self {
            Self {
                calls: heapless::Vec::new(),
            }
        }
    }

    impl RelayDriver for RecordingDriver {
        fn open(&mut self, relay: RelayId) {
            let _ = self.calls.push(Call::Open(relay.0));
        }

        fn close(&mut self, relay: RelayId) {
            let _ = self.calls.push(Call::Close(relay.0));
        }

        fn set_power(&mut self, relay: RelayId, level: PowerLevel) {
            let _ = self.calls.push(Call::Power(relay.0, level));
        }

        fn channels_on(&mut self, channels: ChannelSet) {
            let _ = self.calls.push(Call::On(channels.bits()));
        }

        fn channels_off(&mut self, channels: ChannelSet) {
            let _ = self.calls.push(Call::Off(channels.bits()));
        }
    }

    fn adapter() -> HardwareAdapter<RecordingDriver> {
        HardwareAdapter::new(RecordingDriver::new(), 4, ChannelSet::from_bits(0b0010))
    }

    #[test]
    fn new_opens_every_channel() {
        let adapter = adapter();
        assert_eq!(adapter.driver().calls.as_slice(), &[Call::Off(0b1111)]);
        assert!(adapter.channels_on_state().is_empty());
    }

    #[test]
    fn partial_power_rejected_on_switch_only_relay() {
        let adapter = adapter();
        assert_eq!(
            adapter.check_power(RelayId(0), 100),
            Err(ComposeError::InvalidChannelCapability(RelayId(0)))
        );
        assert_eq!(adapter.check_power(RelayId(0), POWER_FULL), Ok(()));
        assert_eq!(adapter.check_power(RelayId(1), 100), Ok(()));
    }

    #[test]
    fn full_power_drive_closes_relay() {
        let mut adapter = adapter();
        adapter.drive(RelayId(1), POWER_FULL);
        adapter.drive(RelayId(1), 40);
        assert_eq!(
            &adapter.driver().calls[1..],
            &[Call::Close(1), Call::Power(1, 40)]
        );
        assert_eq!(adapter.power(RelayId(1)), 40);
    }

    #[test]
    fn toggle_flips_only_requested_channels() {
        let mut adapter = adapter();
        adapter.channels_on(ChannelSet::from_bits(0b0011));
        adapter.toggle(ChannelSet::from_bits(0b0110));
        assert_eq!(adapter.channels_on_state().bits(), 0b0101);
    }

    #[test]
    fn channel_writes_are_masked_to_configured_range() {
        let mut adapter = adapter();
        adapter.channels_on(ChannelSet::from_bits(0xff));
        assert_eq!(adapter.channels_on_state().bits(), 0b1111);
        assert_eq!(adapter.driver().calls.last(), Some(&Call::On(0b1111)));
    }

    #[test]
    fn exclusive_on_turns_others_off() {
        let mut adapter = adapter();
        adapter.channels_on(ChannelSet::from_bits(0b1100));
        adapter.exclusive_on(ChannelSet::from_bits(0b0001));
        assert_eq!(adapter.channels_on_state().bits(), 0b0001);
        assert_eq!(adapter.channels_off_state().bits(), 0b1110);
    }

    #[test]
    fn saved_state_round_trips_through_recall() {
        let mut adapter = adapter();
        adapter.channels_on(ChannelSet::from_bits(0b1010));
        adapter.save_state(3).unwrap();
        adapter.channels_off(ChannelSet::all(4));

        adapter.recall_state(3).unwrap();
        assert_eq!(adapter.channels_on_state().bits(), 0b1010);
        assert_eq!(adapter.saved_states()[3].bits(), 0b1010);
    }

    #[test]
    fn state_index_past_table_is_rejected() {
        let mut adapter = adapter();
        assert_eq!(
            adapter.save_state(STATE_COUNT),
            Err(ComposeError::InvalidStateIndex(STATE_COUNT))
        );
        assert_eq!(
            adapter.recall_state(99),
            Err(ComposeError::InvalidStateIndex(99))
        );
    }
}
