//! Shared test infrastructure for ssr-sequencer integration tests

#![allow(dead_code)] // Items used across multiple test files; Rust analyzes per-file

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use ssr_sequencer::{
    ChannelSet, Composer, ComposerConfig, Event, EventHandle, EventPair, EventScheduler,
    PowerLevel, PulseTrain, RelayDriver, RelayId, RepeatCount, ScheduleError, Ticks,
};

// ============================================================================
// Shared clock
// ============================================================================

/// Simulated time shared by the mock scheduler and the mock driver
#[derive(Clone, Default)]
pub struct Clock(Rc<Cell<Ticks>>);

impl Clock {
    pub fn now(&self) -> Ticks {
        self.0.get()
    }

    fn set(&self, time: Ticks) {
        self.0.set(time);
    }
}

// ============================================================================
// Mock Scheduler
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    On,
    Off,
    Exhaust,
    Done,
}

/// One scheduled once-event or periodic train
#[derive(Debug, Clone)]
struct Timeline {
    seq: u64,
    on_handle: u32,
    off_handle: Option<u32>,
    start: Ticks,
    on: Event,
    off: Option<Event>,
    period: Ticks,
    on_duration: Ticks,
    repeat: RepeatCount,
    on_exhaust: Option<Event>,
    index: u32,
    phase: Phase,
}

impl Timeline {
    fn next_time(&self) -> Option<Ticks> {
        let period_start = self.start + self.index * self.period;
        match self.phase {
            Phase::On => Some(period_start),
            Phase::Off => Some(period_start + self.on_duration),
            Phase::Exhaust => match self.repeat {
                RepeatCount::Finite(0) => Some(self.start),
                RepeatCount::Finite(count) => {
                    Some(self.start + (count - 1) * self.period + self.on_duration)
                }
                RepeatCount::Infinite => None,
            },
            Phase::Done => None,
        }
    }

    fn next_event(&self) -> Option<Event> {
        match self.phase {
            Phase::On => Some(self.on),
            Phase::Off => self.off,
            Phase::Exhaust => self.on_exhaust,
            Phase::Done => None,
        }
    }

    fn advance(&mut self) {
        self.phase = match self.phase {
            Phase::On if self.off.is_some() => Phase::Off,
            Phase::On => Phase::Exhaust,
            Phase::Off => {
                self.index += 1;
                match self.repeat {
                    RepeatCount::Finite(count) if self.index >= count => Phase::Exhaust,
                    _ => Phase::On,
                }
            }
            Phase::Exhaust | Phase::Done => Phase::Done,
        };
        if self.phase == Phase::Exhaust && self.on_exhaust.is_none() {
            self.phase = Phase::Done;
        }
    }
}

/// Mock scheduler that simulates time and records every call
pub struct MockScheduler {
    clock: Clock,
    next_handle: u32,
    next_seq: u64,
    timelines: Vec<Timeline>,
    starts: HashMap<u32, Ticks>,
    capacity: Option<usize>,
    pub cancelled: Vec<EventHandle>,
    pub cancelled_pairs: Vec<EventPair>,
    pub cancel_all_calls: usize,
    pub fired: Vec<(Ticks, Event)>,
}

impl MockScheduler {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            next_handle: 1,
            next_seq: 0,
            timelines: Vec::new(),
            starts: HashMap::new(),
            capacity: None,
            cancelled: Vec::new(),
            cancelled_pairs: Vec::new(),
            cancel_all_calls: 0,
            fired: Vec::new(),
        }
    }

    /// Refuse new events once `capacity` timelines are pending
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Number of timelines that still have events to deliver
    pub fn pending(&self) -> usize {
        self.timelines.len()
    }

    /// Pops the earliest event due at or before `limit`
    pub fn pop_due(&mut self, limit: Ticks) -> Option<(Ticks, Event)> {
        let (position, time) = self
            .timelines
            .iter()
            .enumerate()
            .filter_map(|(position, timeline)| {
                timeline.next_time().map(|time| (position, time, timeline.seq))
            })
            .filter(|(_, time, _)| *time <= limit)
            .min_by_key(|(_, time, seq)| (*time, *seq))
            .map(|(position, time, _)| (position, time))?;

        let timeline = &mut self.timelines[position];
        let event = timeline.next_event();
        timeline.advance();
        if timeline.phase == Phase::Done {
            self.timelines.remove(position);
        }
        let event = event?;
        self.fired.push((time, event));
        Some((time, event))
    }

    fn allocate_handle(&mut self, start: Ticks) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.starts.insert(handle, start);
        handle
    }

    fn check_capacity(&self) -> Result<(), ScheduleError> {
        match self.capacity {
            Some(capacity) if self.timelines.len() >= capacity => Err(ScheduleError),
            _ => Ok(()),
        }
    }

    fn push(&mut self, mut timeline: Timeline) {
        timeline.seq = self.next_seq;
        self.next_seq += 1;
        if timeline.repeat == RepeatCount::Finite(0) {
            timeline.phase = Phase::Exhaust;
            if timeline.on_exhaust.is_none() {
                return;
            }
        }
        self.timelines.push(timeline);
    }

    fn base_start(&self, base: EventHandle) -> Ticks {
        self.starts.get(&base.0).copied().unwrap_or(self.clock.now())
    }

    fn train(&mut self, train: PulseTrain, start: Ticks) -> EventPair {
        let on = self.allocate_handle(start);
        let off = self.allocate_handle(start + train.on_duration);
        self.push(Timeline {
            seq: 0,
            on_handle: on,
            off_handle: Some(off),
            start,
            on: train.on,
            off: Some(train.off),
            period: train.period,
            on_duration: train.on_duration,
            repeat: train.repeat,
            on_exhaust: train.on_exhaust,
            index: 0,
            phase: Phase::On,
        });
        EventPair {
            on: EventHandle(on),
            off: EventHandle(off),
        }
    }

    fn once(&mut self, event: Event, start: Ticks, on_exhaust: Option<Event>) -> EventHandle {
        let handle = self.allocate_handle(start);
        self.push(Timeline {
            seq: 0,
            on_handle: handle,
            off_handle: None,
            start,
            on: event,
            off: None,
            period: 0,
            on_duration: 0,
            repeat: RepeatCount::Finite(1),
            on_exhaust,
            index: 0,
            phase: Phase::On,
        });
        EventHandle(handle)
    }
}

impl EventScheduler for MockScheduler {
    fn schedule_once(&mut self, event: Event, delay: Ticks) -> Result<EventHandle, ScheduleError> {
        self.check_capacity()?;
        let start = self.clock.now() + delay;
        Ok(self.once(event, start, None))
    }

    fn schedule_offset(
        &mut self,
        event: Event,
        base: EventHandle,
        offset: Ticks,
        on_exhaust: Option<Event>,
    ) -> Result<EventHandle, ScheduleError> {
        self.check_capacity()?;
        let start = self.base_start(base) + offset;
        Ok(self.once(event, start, on_exhaust))
    }

    fn schedule_periodic(
        &mut self,
        train: PulseTrain,
        delay: Ticks,
    ) -> Result<EventPair, ScheduleError> {
        self.check_capacity()?;
        let start = self.clock.now() + delay;
        Ok(self.train(train, start))
    }

    fn schedule_periodic_offset(
        &mut self,
        train: PulseTrain,
        base: EventHandle,
        offset: Ticks,
    ) -> Result<EventPair, ScheduleError> {
        self.check_capacity()?;
        let start = self.base_start(base) + offset;
        Ok(self.train(train, start))
    }

    fn cancel(&mut self, handle: EventHandle) {
        self.cancelled.push(handle);
        self.timelines
            .retain(|t| t.on_handle != handle.0 && t.off_handle != Some(handle.0));
    }

    fn cancel_pair(&mut self, pair: EventPair) {
        self.cancelled_pairs.push(pair);
        self.timelines.retain(|t| {
            t.on_handle != pair.on.0
                && t.on_handle != pair.off.0
                && t.off_handle != Some(pair.on.0)
                && t.off_handle != Some(pair.off.0)
        });
    }

    fn cancel_all(&mut self) {
        self.cancel_all_calls += 1;
        self.timelines.clear();
    }
}

// ============================================================================
// Mock Driver
// ============================================================================

/// A hardware call recorded by [`MockDriver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwCall {
    Open(u8),
    Close(u8),
    Power(u8, PowerLevel),
    On(u32),
    Off(u32),
}

/// Mock relay driver that records time-stamped calls and tracks relay levels
pub struct MockDriver {
    clock: Clock,
    pub calls: Vec<(Ticks, HwCall)>,
    pub levels: [PowerLevel; 32],
}

impl MockDriver {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            calls: Vec::new(),
            levels: [0; 32],
        }
    }

    /// Relays with a non-zero level
    pub fn energized(&self) -> ChannelSet {
        let bits = self
            .levels
            .iter()
            .enumerate()
            .filter(|(_, level)| **level > 0)
            .fold(0u32, |acc, (relay, _)| acc | (1 << relay));
        ChannelSet::from_bits(bits)
    }

    /// Times at which `call` was issued
    pub fn times_of(&self, call: HwCall) -> Vec<Ticks> {
        self.calls
            .iter()
            .filter(|(_, c)| *c == call)
            .map(|(time, _)| *time)
            .collect()
    }

    fn record(&mut self, call: HwCall) {
        self.calls.push((self.clock.now(), call));
    }
}

impl RelayDriver for MockDriver {
    fn open(&mut self, relay: RelayId) {
        self.levels[relay.index()] = 0;
        self.record(HwCall::Open(relay.0));
    }

    fn close(&mut self, relay: RelayId) {
        self.levels[relay.index()] = PowerLevel::MAX;
        self.record(HwCall::Close(relay.0));
    }

    fn set_power(&mut self, relay: RelayId, level: PowerLevel) {
        self.levels[relay.index()] = level;
        self.record(HwCall::Power(relay.0, level));
    }

    fn channels_on(&mut self, channels: ChannelSet) {
        for relay in channels.iter() {
            self.levels[relay.index()] = PowerLevel::MAX;
        }
        self.record(HwCall::On(channels.bits()));
    }

    fn channels_off(&mut self, channels: ChannelSet) {
        for relay in channels.iter() {
            self.levels[relay.index()] = 0;
        }
        self.record(HwCall::Off(channels.bits()));
    }
}

// ============================================================================
// Harness
// ============================================================================

pub type TestComposer = Composer<MockScheduler, MockDriver, 4, 4>;

/// Composer on the default 8-relay profile, plus its clock
pub fn composer() -> (TestComposer, Clock) {
    composer_with(ComposerConfig::default(), None)
}

pub fn composer_with(config: ComposerConfig, capacity: Option<usize>) -> (TestComposer, Clock) {
    let clock = Clock::default();
    let mut scheduler = MockScheduler::new(clock.clone());
    if let Some(capacity) = capacity {
        scheduler = scheduler.with_capacity(capacity);
    }
    let driver = MockDriver::new(clock.clone());
    (Composer::new(config, scheduler, driver), clock)
}

/// Delivers every event due up to and including `until`, then parks the clock there
pub fn run_until(composer: &mut TestComposer, clock: &Clock, until: Ticks) {
    while let Some((time, event)) = composer.scheduler_mut().pop_due(until) {
        clock.set(time);
        composer.handle_event(event);
    }
    clock.set(until);
}

/// Hardware calls issued after construction
pub fn hw_calls(composer: &TestComposer) -> Vec<(Ticks, HwCall)> {
    composer.driver().calls[1..].to_vec()
}

pub fn channels(bits: u32) -> ChannelSet {
    ChannelSet::from_bits(bits)
}
