//! Pulse and pattern composition engine.
//!
//! Provides [`Composer`], which turns declarative waveform requests into
//! scheduled on/off events, keeps the bookkeeping for every in-flight waveform
//! in fixed-capacity slot pools, and reacts to fired events by driving relays.
//!
//! Every request either starts completely or fails without touching hardware
//! and without keeping a slot.

use crate::config::ComposerConfig;
use crate::hardware::{HardwareAdapter, POWER_FULL, RelayDriver, STATE_COUNT};
use crate::pool::{PoolFull, SlotPool};
use crate::scheduler::{Action, Event, EventPair, EventScheduler, PulseTrain, ScheduleError};
use crate::types::{
    ChannelSet, ComposeError, LevelChainId, LevelSpec, MAX_CHANNELS, PatternId, PowerLevel,
    PulseWaveId, PwmStatus, RelayId, RepeatCount, Ticks,
};
use crate::waveform::{self, PwmTiming};

mod teardown;

impl From<PoolFull> for ComposeError {
    fn from(_: PoolFull) -> Self {
        ComposeError::ResourceExhausted
    }
}

impl From<ScheduleError> for ComposeError {
    fn from(_: ScheduleError) -> Self {
        ComposeError::SchedulerFull
    }
}

/// Parameters of a patterned PWM: an outer on/off envelope gating an inner PWM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PatternSpec {
    /// Ticks before the first envelope period starts.
    pub delay: Ticks,
    /// Envelope period.
    pub period: Ticks,
    /// Envelope on-duration.
    pub on_duration: Ticks,
    /// Number of envelope periods.
    pub count: RepeatCount,
    /// Inner PWM period.
    pub pulse_period: Ticks,
    /// Inner PWM on-duration.
    pub pulse_on_duration: Ticks,
    /// Analog power of the inner on-phase; `None` switches the relay fully.
    pub power: Option<PowerLevel>,
}

/// Channels driven by a pulse, PWM or spike-and-hold waveform.
#[derive(Debug, Clone, Copy)]
struct ChannelSlot {
    channels: ChannelSet,
    /// First (or only) schedule; for a centered pulse, the on and off events.
    lead: Option<EventPair>,
    /// Hold phase of a spike-and-hold.
    follow: Option<EventPair>,
}

/// Caller-visible pulse wave; owns one channel slot.
#[derive(Debug, Clone, Copy)]
struct PulseWaveSlot {
    channel_slot: usize,
}

/// One stage of a leveled PWM chain.
#[derive(Debug, Clone, Copy)]
struct LevelSlot {
    relay: RelayId,
    power: PowerLevel,
    level: u8,
    child: Option<usize>,
    timing: PwmTiming,
    events: Option<EventPair>,
}

/// Envelope plus inner PWM on a single relay.
#[derive(Debug, Clone, Copy)]
struct PatternSlot {
    relay: RelayId,
    pulse: PwmTiming,
    power: Option<PowerLevel>,
    envelope: Option<EventPair>,
    pulse_events: Option<EventPair>,
}

/// Composes timed waveforms on a bank of solid-state relays.
///
/// The composer owns its slot pools, the scheduler it issues events to and the
/// relay hardware. The host loop hands every fired event back through
/// [`handle_event`](Self::handle_event).
///
/// # Type Parameters
/// * `S` - Event scheduler implementation
/// * `D` - Relay driver implementation
/// * `SLOTS` - Capacity of each waveform pool (channel, level and pattern slots)
/// * `WAVES` - Capacity of the pulse wave handle pool
pub struct Composer<S: EventScheduler, D: RelayDriver, const SLOTS: usize, const WAVES: usize> {
    config: ComposerConfig,
    scheduler: S,
    hardware: HardwareAdapter<D>,
    channel_slots: SlotPool<ChannelSlot, SLOTS>,
    pulse_waves: SlotPool<PulseWaveSlot, WAVES>,
    levels: SlotPool<LevelSlot, SLOTS>,
    patterns: SlotPool<PatternSlot, SLOTS>,
    level_status: [u8; MAX_CHANNELS],
}

impl<S, D, const SLOTS: usize, const WAVES: usize> Composer<S, D, SLOTS, WAVES>
where
    S: EventScheduler,
    D: RelayDriver,
{
    /// Creates an idle composer and opens every relay.
    pub fn new(config: ComposerConfig, scheduler: S, driver: D) -> Self {
        let hardware = HardwareAdapter::new(driver, config.channel_count, config.high_frequency);
        Self {
            config,
            scheduler,
            hardware,
            channel_slots: SlotPool::new(),
            pulse_waves: SlotPool::new(),
            levels: SlotPool::new(),
            patterns: SlotPool::new(),
            level_status: [0; MAX_CHANNELS],
        }
    }

    // ---------------------------------------------------------------------
    // Channel waveforms
    // ---------------------------------------------------------------------

    /// Switches `channels` on for `on_duration` ticks, centered on `delay`.
    ///
    /// The on-edge is scheduled at `max(delay - on_duration / 2, 0)` and the
    /// off-edge as an offset from it, so the pulse width does not depend on
    /// dispatch jitter.
    pub fn add_pulse_centered(
        &mut self,
        channels: ChannelSet,
        delay: Ticks,
        on_duration: Ticks,
    ) -> Result<(), ComposeError> {
        let delay = self.config.duration.clamp(delay);
        let on_duration = self.config.duration.clamp(on_duration).max(1);
        let start = delay.saturating_sub(on_duration / 2);

        let slot = self.compose_channels(channels, |composer, slot| {
            let on = composer
                .scheduler
                .schedule_once(Event::new(Action::ChannelsOn, slot), start)?;
            let off = composer.scheduler.schedule_offset(
                Event::new(Action::ChannelsOff, slot),
                on,
                on_duration,
                Some(Event::new(Action::ReleaseChannels, slot)),
            );
            match off {
                Ok(off) => {
                    composer.record_lead(slot, EventPair { on, off });
                    Ok(())
                }
                Err(err) => {
                    composer.scheduler.cancel(on);
                    Err(err.into())
                }
            }
        })?;
        info!("pulse slot {} at {} for {}", slot, start, on_duration);
        Ok(())
    }

    /// Runs a finite PWM train from an explicit period and on-duration.
    pub fn add_pwm_period_on_duration(
        &mut self,
        channels: ChannelSet,
        delay: Ticks,
        period: Ticks,
        on_duration: Ticks,
        count: u32,
    ) -> Result<(), ComposeError> {
        let timing = PwmTiming::from_period(
            self.config.duration.clamp(period),
            self.config.duration.clamp(on_duration),
            RepeatCount::Finite(count),
        );
        self.add_pwm(channels, delay, timing)
    }

    /// Runs a finite PWM train derived from a frequency and duty cycle.
    ///
    /// The train repeats `floor(pwm_duration / period)` times.
    pub fn add_pwm_frequency_duty_cycle(
        &mut self,
        channels: ChannelSet,
        delay: Ticks,
        frequency: f32,
        duty_cycle: u8,
        pwm_duration: Ticks,
    ) -> Result<(), ComposeError> {
        let timing = waveform::from_frequency(
            self.config.frequency.clamp(frequency),
            self.config.duty_cycle.clamp(duty_cycle),
            self.config.duration.clamp(pwm_duration),
        );
        self.add_pwm(channels, delay, timing)
    }

    fn add_pwm(
        &mut self,
        channels: ChannelSet,
        delay: Ticks,
        timing: PwmTiming,
    ) -> Result<(), ComposeError> {
        if timing.is_empty() {
            warn!("pwm rejected: zero periods");
            return Err(ComposeError::EmptyWaveform);
        }
        let delay = self.config.duration.clamp(delay);
        let slot = self.compose_channels(channels, |composer, slot| {
            composer.arm_channel_train(slot, delay, timing)
        })?;
        info!(
            "pwm slot {} period {} on {}",
            slot, timing.period, timing.on_duration
        );
        Ok(())
    }

    /// Runs a high-duty spike followed by a low-duty hold.
    ///
    /// The hold starts `spike_duration` ticks after the spike's first event.
    /// A `hold_duration` of zero or less holds until stopped.
    pub fn add_spike_and_hold(
        &mut self,
        channels: ChannelSet,
        delay: Ticks,
        spike_duty_cycle: u8,
        spike_duration: Ticks,
        hold_duty_cycle: u8,
        hold_duration: i64,
    ) -> Result<(), ComposeError> {
        let (spike, spike_duration, hold) =
            self.spike_and_hold_timing(spike_duty_cycle, spike_duration, hold_duty_cycle, hold_duration);
        if spike.is_empty() && hold.is_empty() {
            warn!("spike and hold rejected: zero periods");
            return Err(ComposeError::EmptyWaveform);
        }
        let delay = self.config.duration.clamp(delay);
        let slot = self.compose_channels(channels, |composer, slot| {
            composer.arm_spike_and_hold(slot, delay, spike, spike_duration, hold)
        })?;
        info!("spike and hold slot {}", slot);
        Ok(())
    }

    /// Starts an unbounded PWM train and returns a handle for stopping it.
    pub fn start_pwm_period_on_duration(
        &mut self,
        channels: ChannelSet,
        delay: Ticks,
        period: Ticks,
        on_duration: Ticks,
    ) -> Result<PulseWaveId, ComposeError> {
        let timing = PwmTiming::from_period(
            self.config.duration.clamp(period),
            self.config.duration.clamp(on_duration),
            RepeatCount::Infinite,
        );
        let delay = self.config.duration.clamp(delay);
        self.start_pulse_wave(channels, |composer, slot| {
            composer.arm_channel_train(slot, delay, timing)
        })
    }

    /// Starts an unbounded PWM train from a frequency and duty cycle.
    pub fn start_pwm_frequency_duty_cycle(
        &mut self,
        channels: ChannelSet,
        delay: Ticks,
        frequency: f32,
        duty_cycle: u8,
    ) -> Result<PulseWaveId, ComposeError> {
        let timing = waveform::from_frequency_infinite(
            self.config.frequency.clamp(frequency),
            self.config.duty_cycle.clamp(duty_cycle),
        );
        let delay = self.config.duration.clamp(delay);
        self.start_pulse_wave(channels, |composer, slot| {
            composer.arm_channel_train(slot, delay, timing)
        })
    }

    /// Starts a spike followed by a hold that runs until stopped.
    pub fn start_spike_and_hold(
        &mut self,
        channels: ChannelSet,
        delay: Ticks,
        spike_duty_cycle: u8,
        spike_duration: Ticks,
        hold_duty_cycle: u8,
    ) -> Result<PulseWaveId, ComposeError> {
        let (spike, spike_duration, hold) =
            self.spike_and_hold_timing(spike_duty_cycle, spike_duration, hold_duty_cycle, 0);
        let delay = self.config.duration.clamp(delay);
        self.start_pulse_wave(channels, |composer, slot| {
            composer.arm_spike_and_hold(slot, delay, spike, spike_duration, hold)
        })
    }

    /// Stops one pulse wave, opens its channels and frees its slots.
    ///
    /// # Errors
    /// `UnknownHandle` if `id` is not a live pulse wave.
    pub fn stop_pulse_wave(&mut self, id: PulseWaveId) -> Result<(), ComposeError> {
        let wave = self.pulse_waves.remove(id.0).ok_or_else(|| {
            warn!("stop rejected: pulse wave {} not live", id.0);
            ComposeError::UnknownHandle
        })?;
        self.release_channel_slot(wave.channel_slot);
        info!("pulse wave {} stopped", id.0);
        Ok(())
    }

    fn spike_and_hold_timing(
        &self,
        spike_duty_cycle: u8,
        spike_duration: Ticks,
        hold_duty_cycle: u8,
        hold_duration: i64,
    ) -> (PwmTiming, Ticks, PwmTiming) {
        let spike_duration = self.config.duration.clamp(spike_duration);
        let spike = waveform::spike_phase(
            self.config.duty_cycle.clamp(spike_duty_cycle),
            spike_duration,
        );
        let hold_duration = if hold_duration > 0 {
            let clamped = self
                .config
                .duration
                .clamp(Ticks::try_from(hold_duration).unwrap_or(Ticks::MAX));
            i64::from(clamped)
        } else {
            hold_duration
        };
        let hold = waveform::hold_phase(self.config.duty_cycle.clamp(hold_duty_cycle), hold_duration);
        (spike, spike_duration, hold)
    }

    /// Claims `channels`, allocates a channel slot and lets `arm` schedule it.
    ///
    /// The slot is discarded again if `arm` fails.
    fn compose_channels<F>(&mut self, channels: ChannelSet, arm: F) -> Result<usize, ComposeError>
    where
        F: FnOnce(&mut Self, usize) -> Result<(), ComposeError>,
    {
        let channels = self.claim_channels(channels)?;
        let slot = self.channel_slots.add(ChannelSlot {
            channels,
            lead: None,
            follow: None,
        });
        let slot = match slot {
            Ok(slot) => slot,
            Err(err) => {
                warn!("waveform rejected: channel slots full");
                return Err(err.into());
            }
        };
        if let Err(err) = arm(self, slot) {
            warn!("waveform rejected: scheduling failed for slot {}", slot);
            self.discard_channel_slot(slot);
            return Err(err);
        }
        Ok(slot)
    }

    fn start_pulse_wave<F>(&mut self, channels: ChannelSet, arm: F) -> Result<PulseWaveId, ComposeError>
    where
        F: FnOnce(&mut Self, usize) -> Result<(), ComposeError>,
    {
        if self.pulse_waves.is_full() {
            warn!("pulse wave rejected: handle slots full");
            return Err(ComposeError::ResourceExhausted);
        }
        let channel_slot = self.compose_channels(channels, arm)?;
        match self.pulse_waves.add(PulseWaveSlot { channel_slot }) {
            Ok(index) => {
                info!("pulse wave {} started on slot {}", index, channel_slot);
                Ok(PulseWaveId(index))
            }
            Err(err) => {
                self.discard_channel_slot(channel_slot);
                Err(err.into())
            }
        }
    }

    fn arm_channel_train(
        &mut self,
        slot: usize,
        delay: Ticks,
        timing: PwmTiming,
    ) -> Result<(), ComposeError> {
        let mut train = PulseTrain::new(
            Event::new(Action::ChannelsOn, slot),
            Event::new(Action::ChannelsOff, slot),
            timing,
        );
        if !timing.repeat.is_infinite() {
            train = train.on_exhaust(Event::new(Action::ReleaseChannels, slot));
        }
        let pair = self.scheduler.schedule_periodic(train, delay)?;
        self.record_lead(slot, pair);
        Ok(())
    }

    fn arm_spike_and_hold(
        &mut self,
        slot: usize,
        delay: Ticks,
        spike: PwmTiming,
        spike_duration: Ticks,
        hold: PwmTiming,
    ) -> Result<(), ComposeError> {
        let on = Event::new(Action::ChannelsOn, slot);
        let off = Event::new(Action::ChannelsOff, slot);

        let spike_pair = self
            .scheduler
            .schedule_periodic(PulseTrain::new(on, off, spike), delay)?;
        self.record_lead(slot, spike_pair);

        let mut hold_train = PulseTrain::new(on, off, hold);
        if !hold.repeat.is_infinite() {
            hold_train = hold_train.on_exhaust(Event::new(Action::ReleaseChannels, slot));
        }
        let hold_pair =
            self.scheduler
                .schedule_periodic_offset(hold_train, spike_pair.on, spike_duration)?;
        if let Some(record) = self.channel_slots.get_mut(slot) {
            record.follow = Some(hold_pair);
        }
        Ok(())
    }

    fn record_lead(&mut self, slot: usize, pair: EventPair) {
        if let Some(record) = self.channel_slots.get_mut(slot) {
            record.lead = Some(pair);
        }
    }

    /// Cancels a channel slot's events, opens its channels and frees it.
    fn release_channel_slot(&mut self, slot: usize) {
        if let Some(record) = self.discard_channel_slot(slot) {
            self.hardware.channels_off(record.channels);
            debug!("channel slot {} released", slot);
        }
    }

    /// Cancels a channel slot's events and frees it without touching hardware.
    fn discard_channel_slot(&mut self, slot: usize) -> Option<ChannelSlot> {
        let record = self.channel_slots.remove(slot)?;
        for pair in [record.lead, record.follow].into_iter().flatten() {
            self.scheduler.cancel_pair(pair);
        }
        Some(record)
    }

    // ---------------------------------------------------------------------
    // Leveled PWM
    // ---------------------------------------------------------------------

    /// Starts a leveled PWM chain on one relay.
    ///
    /// `base` is level 0 and starts after `delay`. Each entry of `extra` is one
    /// level deeper; a level is armed every time its parent enters the on-phase
    /// and disarmed when the parent enters the off-phase. The deepest level
    /// drives the relay at `power`. Levels past the configured maximum are
    /// dropped.
    ///
    /// # Errors
    /// * `InvalidChannelCapability` - partial `power` on a switch-only relay
    /// * `ResourceExhausted` - not enough free level slots for the whole chain
    pub fn start_leveled_pwm(
        &mut self,
        relay: RelayId,
        power: PowerLevel,
        delay: Ticks,
        base: LevelSpec,
        extra: &[LevelSpec],
    ) -> Result<LevelChainId, ComposeError> {
        let relay = self.claim_relay(relay)?;
        let power = self.config.power.clamp(power);
        self.hardware.check_power(relay, power).inspect_err(|_| {
            warn!("leveled pwm rejected: relay {} has no analog drive", relay.0);
        })?;

        let max_extra = usize::from(self.config.level_count_max).saturating_sub(1);
        if extra.len() > max_extra {
            warn!("leveled pwm: dropping {} levels", extra.len() - max_extra);
        }
        let extra = &extra[..extra.len().min(max_extra)];
        if self.levels.free_count() < extra.len() + 1 {
            warn!("leveled pwm rejected: level slots full");
            return Err(ComposeError::ResourceExhausted);
        }

        let mut child = None;
        for (offset, spec) in extra.iter().enumerate().rev() {
            let record = self.level_slot(relay, power, offset + 1, child, *spec);
            child = Some(self.levels.add(record)?);
        }
        let record = self.level_slot(relay, power, 0, child, base);
        let timing = record.timing;
        let root = self.levels.add(record)?;

        let delay = self.config.duration.clamp(delay);
        let train = PulseTrain::new(
            Event::new(Action::LevelStart, root),
            Event::new(Action::LevelStop, root),
            timing,
        );
        match self.scheduler.schedule_periodic(train, delay) {
            Ok(pair) => {
                if let Some(record) = self.levels.get_mut(root) {
                    record.events = Some(pair);
                }
                info!("leveled pwm {} on relay {}", root, relay.0);
                Ok(LevelChainId(root))
            }
            Err(err) => {
                warn!("leveled pwm rejected: scheduling failed");
                self.discard_level_chain(root);
                Err(err.into())
            }
        }
    }

    fn level_slot(
        &self,
        relay: RelayId,
        power: PowerLevel,
        level: usize,
        child: Option<usize>,
        spec: LevelSpec,
    ) -> LevelSlot {
        LevelSlot {
            relay,
            power,
            level: level as u8,
            child,
            timing: PwmTiming::from_period(
                self.config.duration.clamp(spec.period),
                self.config.duration.clamp(spec.on_duration),
                RepeatCount::Infinite,
            ),
            events: None,
        }
    }

    /// Stops a leveled PWM chain, opens its relay and frees every level.
    ///
    /// # Errors
    /// `UnknownHandle` if `id` is not the root of a live chain.
    pub fn stop_leveled_pwm(&mut self, id: LevelChainId) -> Result<(), ComposeError> {
        match self.levels.get(id.0) {
            Some(record) if record.level == 0 => {
                self.teardown_level_chain(id.0);
                info!("leveled pwm {} stopped", id.0);
                Ok(())
            }
            _ => {
                warn!("stop rejected: level chain {} not live", id.0);
                Err(ComposeError::UnknownHandle)
            }
        }
    }

    fn level_start(&mut self, slot: usize) {
        let Some(record) = self.levels.get(slot).copied() else {
            debug!("stale level start for slot {}", slot);
            return;
        };
        self.set_level_status(record.relay, record.level, PwmStatus::Running);

        let Some(child) = record.child else {
            self.hardware.drive(record.relay, record.power);
            return;
        };
        let Some(child_record) = self.levels.get(child).copied() else {
            return;
        };
        if child_record.events.is_some() {
            return;
        }
        let train = PulseTrain::new(
            Event::new(Action::LevelStart, child),
            Event::new(Action::LevelStop, child),
            child_record.timing,
        );
        match self.scheduler.schedule_periodic(train, 0) {
            Ok(pair) => {
                if let Some(record) = self.levels.get_mut(child) {
                    record.events = Some(pair);
                }
            }
            Err(_) => warn!("level {} could not arm its child", record.level),
        }
    }

    fn level_stop(&mut self, slot: usize) {
        let Some(record) = self.levels.get(slot).copied() else {
            debug!("stale level stop for slot {}", slot);
            return;
        };
        self.hardware.open(record.relay);
        self.set_level_status(record.relay, record.level, PwmStatus::Stopped);
        if let Some(child) = record.child {
            self.disarm_level_chain(child);
        }
    }

    /// Status of `level` of the leveled PWM on `relay`.
    pub fn pwm_status(&self, relay: RelayId, level: u8) -> PwmStatus {
        let running = self
            .level_status
            .get(relay.index())
            .is_some_and(|bits| level < 8 && *bits & (1u8 << level) != 0);
        if running {
            PwmStatus::Running
        } else {
            PwmStatus::Stopped
        }
    }

    fn set_level_status(&mut self, relay: RelayId, level: u8, status: PwmStatus) {
        let Some(bits) = self.level_status.get_mut(relay.index()) else {
            return;
        };
        let mask = 1u8.checked_shl(u32::from(level)).unwrap_or(0);
        match status {
            PwmStatus::Running => *bits |= mask,
            PwmStatus::Stopped => *bits &= !mask,
        }
    }

    // ---------------------------------------------------------------------
    // Patterned PWM
    // ---------------------------------------------------------------------

    /// Starts an envelope that gates an inner PWM on one relay.
    ///
    /// Each envelope on-phase arms the inner PWM; each off-phase cancels it and
    /// opens the relay. A finite envelope frees its slot after the last period.
    pub fn start_pwm_pattern(
        &mut self,
        relay: RelayId,
        spec: PatternSpec,
    ) -> Result<PatternId, ComposeError> {
        let relay = self.claim_relay(relay)?;
        let power = spec.power.map(|power| self.config.power.clamp(power));
        if let Some(power) = power {
            self.hardware.check_power(relay, power).inspect_err(|_| {
                warn!("pattern rejected: relay {} has no analog drive", relay.0);
            })?;
        }

        let envelope = PwmTiming::from_period(
            self.config.duration.clamp(spec.period),
            self.config.duration.clamp(spec.on_duration),
            spec.count,
        );
        if envelope.is_empty() {
            warn!("pattern rejected: zero periods");
            return Err(ComposeError::EmptyWaveform);
        }
        let pulse = PwmTiming::from_period(
            self.config.duration.clamp(spec.pulse_period),
            self.config.duration.clamp(spec.pulse_on_duration),
            RepeatCount::Infinite,
        );

        let slot = self
            .patterns
            .add(PatternSlot {
                relay,
                pulse,
                power,
                envelope: None,
                pulse_events: None,
            })
            .inspect_err(|_| warn!("pattern rejected: pattern slots full"))?;

        let mut train = PulseTrain::new(
            Event::new(Action::PatternStart, slot),
            Event::new(Action::PatternStop, slot),
            envelope,
        );
        if !envelope.repeat.is_infinite() {
            train = train.on_exhaust(Event::new(Action::ReleasePattern, slot));
        }
        let delay = self.config.duration.clamp(spec.delay);
        match self.scheduler.schedule_periodic(train, delay) {
            Ok(pair) => {
                if let Some(record) = self.patterns.get_mut(slot) {
                    record.envelope = Some(pair);
                }
                info!("pattern {} on relay {}", slot, relay.0);
                Ok(PatternId(slot))
            }
            Err(err) => {
                warn!("pattern rejected: scheduling failed");
                self.patterns.remove(slot);
                Err(err.into())
            }
        }
    }

    /// Stops a pattern, opens its relay and frees its slot.
    ///
    /// # Errors
    /// `UnknownHandle` if `id` is not a live pattern.
    pub fn stop_pwm_pattern(&mut self, id: PatternId) -> Result<(), ComposeError> {
        if !self.patterns.contains(id.0) {
            warn!("stop rejected: pattern {} not live", id.0);
            return Err(ComposeError::UnknownHandle);
        }
        self.release_pattern(id.0);
        info!("pattern {} stopped", id.0);
        Ok(())
    }

    fn pattern_start(&mut self, slot: usize) {
        let Some(record) = self.patterns.get(slot).copied() else {
            debug!("stale pattern start for slot {}", slot);
            return;
        };
        if record.pulse_events.is_some() {
            return;
        }
        let train = PulseTrain::new(
            Event::new(Action::PatternPulseOn, slot),
            Event::new(Action::PatternPulseOff, slot),
            record.pulse,
        );
        match self.scheduler.schedule_periodic(train, 0) {
            Ok(pair) => {
                if let Some(record) = self.patterns.get_mut(slot) {
                    record.pulse_events = Some(pair);
                }
            }
            Err(_) => warn!("pattern {} could not arm its pulse train", slot),
        }
    }

    fn pattern_stop(&mut self, slot: usize) {
        let Some(record) = self.patterns.get_mut(slot) else {
            debug!("stale pattern stop for slot {}", slot);
            return;
        };
        let relay = record.relay;
        if let Some(pair) = record.pulse_events.take() {
            self.scheduler.cancel_pair(pair);
        }
        self.hardware.open(relay);
    }

    fn pattern_pulse(&mut self, slot: usize, on: bool) {
        let Some(record) = self.patterns.get(slot).copied() else {
            debug!("stale pattern pulse for slot {}", slot);
            return;
        };
        if on {
            self.hardware
                .drive(record.relay, record.power.unwrap_or(POWER_FULL));
        } else {
            self.hardware.open(record.relay);
        }
    }

    fn release_pattern(&mut self, slot: usize) {
        let Some(record) = self.patterns.remove(slot) else {
            return;
        };
        for pair in [record.envelope, record.pulse_events].into_iter().flatten() {
            self.scheduler.cancel_pair(pair);
        }
        self.hardware.open(record.relay);
        debug!("pattern slot {} released", slot);
    }

    // ---------------------------------------------------------------------
    // Dispatch
    // ---------------------------------------------------------------------

    /// Performs the hardware transition for a fired event.
    ///
    /// Call this from the host loop for every event the scheduler delivers.
    /// Events naming a slot that is no longer live are ignored.
    pub fn handle_event(&mut self, event: Event) {
        trace!("event {} slot {}", event.action, event.slot);
        match event.action {
            Action::ChannelsOn => match self.channel_slots.get(event.slot) {
                Some(record) => self.hardware.channels_on(record.channels),
                None => debug!("stale channels on for slot {}", event.slot),
            },
            Action::ChannelsOff => match self.channel_slots.get(event.slot) {
                Some(record) => self.hardware.channels_off(record.channels),
                None => debug!("stale channels off for slot {}", event.slot),
            },
            Action::ReleaseChannels => self.release_channel_slot(event.slot),
            Action::LevelStart => self.level_start(event.slot),
            Action::LevelStop => self.level_stop(event.slot),
            Action::PatternStart => self.pattern_start(event.slot),
            Action::PatternStop => self.pattern_stop(event.slot),
            Action::PatternPulseOn => self.pattern_pulse(event.slot, true),
            Action::PatternPulseOff => self.pattern_pulse(event.slot, false),
            Action::ReleasePattern => self.release_pattern(event.slot),
        }
    }

    /// Cancels every event, opens every relay and frees every slot.
    pub fn stop_all(&mut self) {
        self.scheduler.cancel_all();
        self.hardware.open_all();
        self.channel_slots.clear();
        self.pulse_waves.clear();
        self.levels.clear();
        self.patterns.clear();
        self.level_status = [0; MAX_CHANNELS];
        info!("all waveforms stopped");
    }

    // ---------------------------------------------------------------------
    // Channel ownership
    // ---------------------------------------------------------------------

    /// Channels and relays owned by a live waveform.
    pub fn owned_channels(&self) -> ChannelSet {
        let channels = self
            .channel_slots
            .iter()
            .fold(ChannelSet::EMPTY, |acc, (_, record)| acc.union(record.channels));
        let channels = self
            .levels
            .iter()
            .fold(channels, |acc, (_, record)| acc.union(record.relay.into()));
        self.patterns
            .iter()
            .fold(channels, |acc, (_, record)| acc.union(record.relay.into()))
    }

    fn claim_channels(&self, channels: ChannelSet) -> Result<ChannelSet, ComposeError> {
        let all = self.hardware.all_channels();
        if !channels.difference(all).is_empty() {
            debug!("ignoring channels {} past the channel count", channels.difference(all).bits());
        }
        let channels = channels.intersection(all);
        if channels.is_empty() {
            warn!("waveform rejected: no configured channels selected");
            return Err(ComposeError::InvalidChannel);
        }
        let busy = channels.intersection(self.owned_channels());
        if !busy.is_empty() {
            warn!("waveform rejected: channels {} busy", busy.bits());
            return Err(ComposeError::ChannelBusy(busy));
        }
        Ok(channels)
    }

    fn claim_relay(&self, relay: RelayId) -> Result<RelayId, ComposeError> {
        if !self.hardware.is_valid(relay) {
            warn!("waveform rejected: relay {} out of range", relay.0);
            return Err(ComposeError::InvalidChannel);
        }
        self.claim_channels(relay.into())?;
        Ok(relay)
    }

    // ---------------------------------------------------------------------
    // Direct channel control
    // ---------------------------------------------------------------------

    /// Closes one relay.
    pub fn set_channel_on(&mut self, relay: RelayId) {
        self.hardware.channels_on(relay.into());
    }

    /// Opens one relay.
    pub fn set_channel_off(&mut self, relay: RelayId) {
        self.hardware.channels_off(relay.into());
    }

    /// Closes every relay in `channels`.
    pub fn set_channels_on(&mut self, channels: ChannelSet) {
        self.hardware.channels_on(channels);
    }

    /// Opens every relay in `channels`.
    pub fn set_channels_off(&mut self, channels: ChannelSet) {
        self.hardware.channels_off(channels);
    }

    /// Flips one relay.
    pub fn toggle_channel(&mut self, relay: RelayId) {
        self.hardware.toggle(relay.into());
    }

    /// Flips every relay in `channels`.
    pub fn toggle_channels(&mut self, channels: ChannelSet) {
        self.hardware.toggle(channels);
    }

    /// Flips every configured relay.
    pub fn toggle_all_channels(&mut self) {
        let all = self.hardware.all_channels();
        self.hardware.toggle(all);
    }

    /// Closes every configured relay.
    pub fn set_all_channels_on(&mut self) {
        let all = self.hardware.all_channels();
        self.hardware.channels_on(all);
    }

    /// Opens every configured relay.
    pub fn set_all_channels_off(&mut self) {
        let all = self.hardware.all_channels();
        self.hardware.channels_off(all);
    }

    /// Closes `relay` and opens every other relay.
    pub fn set_channel_on_all_others_off(&mut self, relay: RelayId) {
        self.hardware.exclusive_on(relay.into());
    }

    /// Opens `relay` and closes every other relay.
    pub fn set_channel_off_all_others_on(&mut self, relay: RelayId) {
        self.hardware.exclusive_off(relay.into());
    }

    /// Closes `channels` and opens every other relay.
    pub fn set_channels_on_all_others_off(&mut self, channels: ChannelSet) {
        self.hardware.exclusive_on(channels);
    }

    /// Opens `channels` and closes every other relay.
    pub fn set_channels_off_all_others_on(&mut self, channels: ChannelSet) {
        self.hardware.exclusive_off(channels);
    }

    /// Channels currently on.
    pub fn channels_on(&self) -> ChannelSet {
        self.hardware.channels_on_state()
    }

    /// Channels currently off.
    pub fn channels_off(&self) -> ChannelSet {
        self.hardware.channels_off_state()
    }

    /// Number of configured relays.
    pub fn channel_count(&self) -> u8 {
        self.hardware.channel_count()
    }

    /// Last power level driven into `relay`.
    pub fn power(&self, relay: RelayId) -> PowerLevel {
        self.hardware.power(relay)
    }

    /// Saves the current on-channels as state `index`.
    pub fn save_state(&mut self, index: usize) -> Result<(), ComposeError> {
        self.hardware.save_state(index)
    }

    /// Drives the channels to saved state `index`.
    pub fn recall_state(&mut self, index: usize) -> Result<(), ComposeError> {
        self.hardware.recall_state(index)
    }

    /// The saved state table.
    pub fn saved_states(&self) -> &[ChannelSet; STATE_COUNT] {
        self.hardware.saved_states()
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    /// Returns the active configuration.
    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Returns the scheduler.
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Mutable access to the scheduler, for host loops that poll it.
    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Returns the relay driver.
    pub fn driver(&self) -> &D {
        self.hardware.driver()
    }

    /// Returns the hardware adapter, for channel and power readback.
    pub fn hardware(&self) -> &HardwareAdapter<D> {
        &self.hardware
    }

    /// Number of live channel slots.
    pub fn channel_slot_count(&self) -> usize {
        self.channel_slots.len()
    }

    /// Number of live pulse wave handles.
    pub fn pulse_wave_count(&self) -> usize {
        self.pulse_waves.len()
    }

    /// Number of live leveled PWM stages, across all chains.
    pub fn level_slot_count(&self) -> usize {
        self.levels.len()
    }

    /// Number of live patterns.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Returns true if no waveform holds a slot.
    pub fn is_idle(&self) -> bool {
        self.channel_slots.is_empty()
            && self.pulse_waves.is_empty()
            && self.levels.is_empty()
            && self.patterns.is_empty()
    }
}
