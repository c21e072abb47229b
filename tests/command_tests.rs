//! Integration tests for command dispatch and direct channel control

mod common;
use common::*;

use heapless::Vec as HVec;
use ssr_sequencer::{
    CommandOutcome, ComposeError, LevelChainId, LevelSpec, PatternId, PulseWaveId, RelayId,
    STATE_COUNT, WaveformCommand,
};

#[test]
fn start_and_stop_pulse_wave_by_command() {
    let (mut composer, clock) = composer();

    let outcome = composer
        .handle_command(WaveformCommand::StartPwmFrequencyDutyCycle {
            channels: channels(0b1),
            delay: 0,
            frequency: 10.0,
            duty_cycle: 50,
        })
        .unwrap();
    assert_eq!(outcome, CommandOutcome::PulseWave(PulseWaveId(0)));

    run_until(&mut composer, &clock, 250);
    assert_eq!(composer.driver().times_of(HwCall::On(0b1)), vec![0, 100, 200]);

    let outcome = composer
        .handle_command(WaveformCommand::StopPulseWave(PulseWaveId(0)))
        .unwrap();
    assert_eq!(outcome, CommandOutcome::Done);
    assert!(composer.is_idle());
}

#[test]
fn leveled_command_returns_chain_handle() {
    let (mut composer, _clock) = composer();
    let mut extra = HVec::new();
    extra.push(LevelSpec::new(10, 5)).unwrap();

    let outcome = composer
        .handle_command(WaveformCommand::StartLeveledPwm {
            relay: RelayId(7),
            power: 50,
            delay: 0,
            base: LevelSpec::new(100, 50),
            extra,
        })
        .unwrap();

    assert_eq!(outcome, CommandOutcome::LevelChain(LevelChainId(1)));
    assert_eq!(
        composer.handle_command(WaveformCommand::StopLeveledPwm(LevelChainId(1))),
        Ok(CommandOutcome::Done)
    );
}

#[test]
fn refused_command_reports_error() {
    let (mut composer, _clock) = composer();

    let result = composer.handle_command(WaveformCommand::AddPwmPeriodOnDuration {
        channels: channels(0b1),
        delay: 0,
        period: 10,
        on_duration: 5,
        count: 0,
    });
    assert_eq!(result, Err(ComposeError::EmptyWaveform));

    let result = composer.handle_command(WaveformCommand::StopPwmPattern(PatternId(0)));
    assert_eq!(result, Err(ComposeError::UnknownHandle));
}

#[test]
fn stop_all_command_clears_everything() {
    let (mut composer, _clock) = composer();

    composer
        .handle_command(WaveformCommand::AddSpikeAndHold {
            channels: channels(0b11),
            delay: 0,
            spike_duty_cycle: 80,
            spike_duration: 100,
            hold_duty_cycle: 10,
            hold_duration: 0,
        })
        .unwrap();
    composer
        .handle_command(WaveformCommand::AddPulseCentered {
            channels: channels(0b100),
            delay: 10,
            on_duration: 4,
        })
        .unwrap();
    assert_eq!(composer.channel_slot_count(), 2);

    composer.handle_command(WaveformCommand::StopAll).unwrap();
    assert!(composer.is_idle());
    assert_eq!(composer.scheduler().pending(), 0);
}

// ============================================================================
// Direct channel control
// ============================================================================

#[test]
fn direct_channel_writes_update_readback() {
    let (mut composer, _clock) = composer();

    composer.set_channels_on(channels(0b101));
    assert_eq!(composer.channels_on(), channels(0b101));

    composer.toggle_channels(channels(0b11));
    assert_eq!(composer.channels_on(), channels(0b110));

    composer.set_channel_off(RelayId(2));
    composer.set_channel_on(RelayId(5));
    assert_eq!(composer.channels_on(), channels(0b10_0010));

    composer.toggle_channel(RelayId(5));
    assert_eq!(composer.channels_on(), channels(0b10));
    assert_eq!(composer.channels_off(), channels(0b1111_1101));
}

#[test]
fn exclusive_writes_switch_every_channel() {
    let (mut composer, _clock) = composer();

    composer.set_channel_on_all_others_off(RelayId(7));
    assert_eq!(composer.channels_on(), channels(0b1000_0000));

    composer.set_channel_off_all_others_on(RelayId(0));
    assert_eq!(composer.channels_on(), channels(0b1111_1110));

    composer.set_channels_on_all_others_off(channels(0b11));
    assert_eq!(composer.channels_on(), channels(0b11));

    composer.set_channels_off_all_others_on(channels(0b11));
    assert_eq!(composer.channels_on(), channels(0b1111_1100));

    composer.toggle_all_channels();
    assert_eq!(composer.channels_on(), channels(0b11));

    composer.set_all_channels_on();
    assert_eq!(composer.channels_on(), channels(0xff));
    assert_eq!(composer.power(RelayId(6)), 255);

    composer.set_all_channels_off();
    assert!(composer.channels_on().is_empty());
    assert!(composer.driver().energized().is_empty());
}

#[test]
fn direct_writes_ignore_channels_past_count() {
    let (mut composer, _clock) = composer();

    composer.set_channels_on(channels(0xffff));

    assert_eq!(composer.channels_on(), channels(0xff));
    assert_eq!(composer.driver().levels[8], 0);
}

#[test]
fn saved_states_recall_channel_pattern() {
    let (mut composer, _clock) = composer();

    composer
        .handle_command(WaveformCommand::SetChannelsOn(channels(0b1010)))
        .unwrap();
    composer.handle_command(WaveformCommand::SaveState(3)).unwrap();
    composer
        .handle_command(WaveformCommand::SetAllChannelsOn)
        .unwrap();

    composer.handle_command(WaveformCommand::RecallState(3)).unwrap();

    assert_eq!(composer.channels_on(), channels(0b1010));
    assert_eq!(composer.saved_states()[3], channels(0b1010));
    assert!(composer.driver().energized().contains(RelayId(1)));
    assert!(!composer.driver().energized().contains(RelayId(0)));
}

#[test]
fn state_index_past_table_is_rejected() {
    let (mut composer, _clock) = composer();

    assert_eq!(
        composer.save_state(STATE_COUNT),
        Err(ComposeError::InvalidStateIndex(STATE_COUNT))
    );
    assert_eq!(
        composer.handle_command(WaveformCommand::RecallState(STATE_COUNT)),
        Err(ComposeError::InvalidStateIndex(STATE_COUNT))
    );
}
