//! Command-based control for the composer.
//!
//! Command transports decode their frames into a [`WaveformCommand`] and hand it
//! to [`Composer::handle_command`](crate::Composer::handle_command).

use crate::composer::{Composer, PatternSpec};
use crate::hardware::RelayDriver;
use crate::scheduler::EventScheduler;
use crate::types::{
    ChannelSet, ComposeError, LevelChainId, LevelSpec, MAX_LEVELS, PatternId, PowerLevel,
    PulseWaveId, RelayId, Ticks,
};
use heapless::Vec;

/// Typed requests, one per composer entry point.
#[derive(Debug, Clone, PartialEq)]
pub enum WaveformCommand {
    /// Centered single pulse.
    AddPulseCentered {
        channels: ChannelSet,
        delay: Ticks,
        on_duration: Ticks,
    },
    /// Finite PWM from period and on-duration.
    AddPwmPeriodOnDuration {
        channels: ChannelSet,
        delay: Ticks,
        period: Ticks,
        on_duration: Ticks,
        count: u32,
    },
    /// Finite PWM from frequency and duty cycle.
    AddPwmFrequencyDutyCycle {
        channels: ChannelSet,
        delay: Ticks,
        frequency: f32,
        duty_cycle: u8,
        pwm_duration: Ticks,
    },
    /// Spike followed by a hold; `hold_duration <= 0` holds forever.
    AddSpikeAndHold {
        channels: ChannelSet,
        delay: Ticks,
        spike_duty_cycle: u8,
        spike_duration: Ticks,
        hold_duty_cycle: u8,
        hold_duration: i64,
    },
    /// Unbounded PWM from period and on-duration.
    StartPwmPeriodOnDuration {
        channels: ChannelSet,
        delay: Ticks,
        period: Ticks,
        on_duration: Ticks,
    },
    /// Unbounded PWM from frequency and duty cycle.
    StartPwmFrequencyDutyCycle {
        channels: ChannelSet,
        delay: Ticks,
        frequency: f32,
        duty_cycle: u8,
    },
    /// Spike followed by an unbounded hold.
    StartSpikeAndHold {
        channels: ChannelSet,
        delay: Ticks,
        spike_duty_cycle: u8,
        spike_duration: Ticks,
        hold_duty_cycle: u8,
    },
    /// Stop one pulse wave.
    StopPulseWave(PulseWaveId),
    /// Leveled PWM chain.
    StartLeveledPwm {
        relay: RelayId,
        power: PowerLevel,
        delay: Ticks,
        base: LevelSpec,
        extra: Vec<LevelSpec, { MAX_LEVELS - 1 }>,
    },
    /// Stop one leveled PWM chain.
    StopLeveledPwm(LevelChainId),
    /// Envelope gating an inner PWM.
    StartPwmPattern { relay: RelayId, pattern: PatternSpec },
    /// Stop one pattern.
    StopPwmPattern(PatternId),
    /// Stop everything and open every relay.
    StopAll,
    SetChannelsOn(ChannelSet),
    SetChannelsOff(ChannelSet),
    ToggleChannels(ChannelSet),
    ToggleAllChannels,
    SetAllChannelsOn,
    SetAllChannelsOff,
    SetChannelsOnAllOthersOff(ChannelSet),
    SetChannelsOffAllOthersOn(ChannelSet),
    SaveState(usize),
    RecallState(usize),
}

/// What a successfully handled command produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandOutcome {
    /// Command completed; nothing to hand back.
    Done,
    /// A pulse wave was started.
    PulseWave(PulseWaveId),
    /// A leveled PWM chain was started.
    LevelChain(LevelChainId),
    /// A pattern was started.
    Pattern(PatternId),
}

impl<S, D, const SLOTS: usize, const WAVES: usize> Composer<S, D, SLOTS, WAVES>
where
    S: EventScheduler,
    D: RelayDriver,
{
    /// Handles a command by dispatching to the matching entry point.
    ///
    /// # Returns
    /// * `Ok(CommandOutcome)` - The handle for commands that start a stoppable waveform
    /// * `Err` - The request was refused; nothing changed
    pub fn handle_command(&mut self, command: WaveformCommand) -> Result<CommandOutcome, ComposeError> {
        match command {
            WaveformCommand::AddPulseCentered {
                channels,
                delay,
                on_duration,
            } => self
                .add_pulse_centered(channels, delay, on_duration)
                .map(|()| CommandOutcome::Done),
            WaveformCommand::AddPwmPeriodOnDuration {
                channels,
                delay,
                period,
                on_duration,
                count,
            } => self
                .add_pwm_period_on_duration(channels, delay, period, on_duration, count)
                .map(|()| CommandOutcome::Done),
            WaveformCommand::AddPwmFrequencyDutyCycle {
                channels,
                delay,
                frequency,
                duty_cycle,
                pwm_duration,
            } => self
                .add_pwm_frequency_duty_cycle(channels, delay, frequency, duty_cycle, pwm_duration)
                .map(|()| CommandOutcome::Done),
            WaveformCommand::AddSpikeAndHold {
                channels,
                delay,
                spike_duty_cycle,
                spike_duration,
                hold_duty_cycle,
                hold_duration,
            } => self
                .add_spike_and_hold(
                    channels,
                    delay,
                    spike_duty_cycle,
                    spike_duration,
                    hold_duty_cycle,
                    hold_duration,
                )
                .map(|()| CommandOutcome::Done),
            WaveformCommand::StartPwmPeriodOnDuration {
                channels,
                delay,
                period,
                on_duration,
            } => self
                .start_pwm_period_on_duration(channels, delay, period, on_duration)
                .map(CommandOutcome::PulseWave),
            WaveformCommand::StartPwmFrequencyDutyCycle {
                channels,
                delay,
                frequency,
                duty_cycle,
            } => self
                .start_pwm_frequency_duty_cycle(channels, delay, frequency, duty_cycle)
                .map(CommandOutcome::PulseWave),
            WaveformCommand::StartSpikeAndHold {
                channels,
                delay,
                spike_duty_cycle,
                spike_duration,
                hold_duty_cycle,
            } => self
                .start_spike_and_hold(
                    channels,
                    delay,
                    spike_duty_cycle,
                    spike_duration,
                    hold_duty_cycle,
                )
                .map(CommandOutcome::PulseWave),
            WaveformCommand::StopPulseWave(id) => {
                self.stop_pulse_wave(id).map(|()| CommandOutcome::Done)
            }
            WaveformCommand::StartLeveledPwm {
                relay,
                power,
                delay,
                base,
                extra,
            } => self
                .start_leveled_pwm(relay, power, delay, base, &extra)
                .map(CommandOutcome::LevelChain),
            WaveformCommand::StopLeveledPwm(id) => {
                self.stop_leveled_pwm(id).map(|()| CommandOutcome::Done)
            }
            WaveformCommand::StartPwmPattern { relay, pattern } => self
                .start_pwm_pattern(relay, pattern)
                .map(CommandOutcome::Pattern),
            WaveformCommand::StopPwmPattern(id) => {
                self.stop_pwm_pattern(id).map(|()| CommandOutcome::Done)
            }
            WaveformCommand::StopAll => {
                self.stop_all();
                Ok(CommandOutcome::Done)
            }
            WaveformCommand::SetChannelsOn(channels) => {
                self.set_channels_on(channels);
                Ok(CommandOutcome::Done)
            }
            WaveformCommand::SetChannelsOff(channels) => {
                self.set_channels_off(channels);
                Ok(CommandOutcome::Done)
            }
            WaveformCommand::ToggleChannels(channels) => {
                self.toggle_channels(channels);
                Ok(CommandOutcome::Done)
            }
            WaveformCommand::ToggleAllChannels => {
                self.toggle_all_channels();
                Ok(CommandOutcome::Done)
            }
            WaveformCommand::SetAllChannelsOn => {
                self.set_all_channels_on();
                Ok(CommandOutcome::Done)
            }
            WaveformCommand::SetAllChannelsOff => {
                self.set_all_channels_off();
                Ok(CommandOutcome::Done)
            }
            WaveformCommand::SetChannelsOnAllOthersOff(channels) => {
                self.set_channels_on_all_others_off(channels);
                Ok(CommandOutcome::Done)
            }
            WaveformCommand::SetChannelsOffAllOthersOn(channels) => {
                self.set_channels_off_all_others_on(channels);
                Ok(CommandOutcome::Done)
            }
            WaveformCommand::SaveState(index) => {
                self.save_state(index).map(|()| CommandOutcome::Done)
            }
            WaveformCommand::RecallState(index) => {
                self.recall_state(index).map(|()| CommandOutcome::Done)
            }
        }
    }
}
