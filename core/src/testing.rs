//! Host fakes for the hardware traits
//!
//! Every fake shares one simulated [`World`]: sleeping and delaying move its
//! clock forward, scripted interrupts fire during sleeps, and the uplink
//! records what it was asked to send.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::{
    Accelerometer, BatchMetadata, BatchTransmitter, LowPowerSleep, MotionClassifier, Sample,
    SensorError, StateEvent, TimeError, TimeSource, TransmitError, WallClock,
};

use crate::wake::WakeArbiter;

pub type SharedWorld = Rc<RefCell<World>>;

#[derive(Debug, Default)]
pub struct World {
    /// Simulated time in milliseconds
    pub now_ms: u64,
    /// RTC reads and writes fail while set
    pub clock_broken: bool,
    pub clock_sets: Vec<u32>,

    /// Classifier output
    pub state: u8,
    /// Pending `(unix_secs, new_state)` edges, in time order
    pub interrupts: VecDeque<(u32, u8)>,
    pub classifier_failures: u32,
    /// Edge to a new state that lands while the next read is in flight
    pub edge_during_read: Option<u8>,
    pub accel_failures: u32,

    /// Scripted network time results; falls back to the simulated time
    pub time_results: VecDeque<Result<u32, TimeError>>,
    pub time_requests: u32,

    pub sleeps: Vec<u32>,
    pub delays_ms: Vec<u32>,

    /// Fail the next N non-empty transmissions
    pub transmit_failures: u32,
    pub state_attempts: u32,
    pub sent_states: Vec<Vec<StateEvent>>,
    pub sent_batches: Vec<(usize, BatchMetadata)>,
}

impl World {
    pub fn new(now_secs: u32) -> SharedWorld {
        Rc::new(RefCell::new(Self {
            now_ms: u64::from(now_secs) * 1000,
            ..Self::default()
        }))
    }

    pub fn now_secs(&self) -> u32 {
        (self.now_ms / 1000) as u32
    }

    pub fn schedule_interrupt(&mut self, at_secs: u32, new_state: u8) {
        self.interrupts.push_back((at_secs, new_state));
    }

    fn take_transmit_failure(&mut self) -> bool {
        if self.transmit_failures > 0 {
            self.transmit_failures -= 1;
            true
        } else {
            false
        }
    }
}

pub struct FakeClock {
    world: SharedWorld,
}

impl FakeClock {
    pub fn new(world: &SharedWorld) -> Self {
        Self {
            world: world.clone(),
        }
    }
}

impl WallClock for FakeClock {
    fn now(&mut self) -> Result<u32, TimeError> {
        let world = self.world.borrow();
        if world.clock_broken {
            return Err(TimeError::NotSet);
        }
        Ok(world.now_secs())
    }

    fn set(&mut self, unix_secs: u32) -> Result<(), TimeError> {
        let mut world = self.world.borrow_mut();
        if world.clock_broken {
            return Err(TimeError::Hardware);
        }
        world.clock_sets.push(unix_secs);
        world.now_ms = u64::from(unix_secs) * 1000;
        Ok(())
    }
}

pub struct FakeTimeSource {
    world: SharedWorld,
}

impl FakeTimeSource {
    pub fn new(world: &SharedWorld) -> Self {
        Self {
            world: world.clone(),
        }
    }
}

impl TimeSource for FakeTimeSource {
    async fn fetch_network_time(&mut self) -> Result<u32, TimeError> {
        let mut world = self.world.borrow_mut();
        world.time_requests += 1;
        match world.time_results.pop_front() {
            Some(result) => result,
            None => Ok(world.now_secs()),
        }
    }
}

/// Sleeps on the simulated clock, waking early on the next scripted edge
pub struct FakeSleeper<'a> {
    world: SharedWorld,
    arbiter: &'a WakeArbiter,
}

impl<'a> FakeSleeper<'a> {
    pub fn new(world: &SharedWorld, arbiter: &'a WakeArbiter) -> Self {
        Self {
            world: world.clone(),
            arbiter,
        }
    }
}

impl LowPowerSleep for FakeSleeper<'_> {
    async fn sleep_secs(&mut self, secs: u32) {
        let mut world = self.world.borrow_mut();
        world.sleeps.push(secs);
        let target_ms = world.now_ms + u64::from(secs) * 1000;

        if let Some(&(at_secs, new_state)) = world.interrupts.front() {
            let at_ms = u64::from(at_secs) * 1000;
            if at_ms <= target_ms {
                world.interrupts.pop_front();
                world.now_ms = world.now_ms.max(at_ms);
                world.state = new_state;
                self.arbiter.signal();
                return;
            }
        }
        world.now_ms = target_ms;
    }
}

/// Reports the world state; may raise a scripted edge mid-read
pub struct FakeClassifier<'a> {
    world: SharedWorld,
    arbiter: &'a WakeArbiter,
}

impl<'a> FakeClassifier<'a> {
    pub fn new(world: &SharedWorld, arbiter: &'a WakeArbiter) -> Self {
        Self {
            world: world.clone(),
            arbiter,
        }
    }
}

impl MotionClassifier for FakeClassifier<'_> {
    async fn read_state(&mut self) -> Result<u8, SensorError> {
        let mut world = self.world.borrow_mut();
        if world.classifier_failures > 0 {
            world.classifier_failures -= 1;
            return Err(SensorError::Bus);
        }
        let state = world.state;
        if let Some(next) = world.edge_during_read.take() {
            world.state = next;
            self.arbiter.signal();
        }
        Ok(state)
    }
}

/// Reports a steady 1 g on Z
pub struct FakeAccel {
    world: SharedWorld,
    rate_hz: f32,
}

impl FakeAccel {
    pub fn new(world: &SharedWorld, rate_hz: f32) -> Self {
        Self {
            world: world.clone(),
            rate_hz,
        }
    }
}

impl Accelerometer for FakeAccel {
    async fn read_sample(&mut self) -> Result<Sample, SensorError> {
        let mut world = self.world.borrow_mut();
        if world.accel_failures > 0 {
            world.accel_failures -= 1;
            return Err(SensorError::Bus);
        }
        Ok(Sample::new(0.0, 0.0, 1000.0))
    }

    fn output_data_rate_hz(&self) -> f32 {
        self.rate_hz
    }
}

pub struct FakeDelay {
    world: SharedWorld,
}

impl FakeDelay {
    pub fn new(world: &SharedWorld) -> Self {
        Self {
            world: world.clone(),
        }
    }
}

impl DelayNs for FakeDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.world.borrow_mut().now_ms += u64::from(ns) / 1_000_000;
    }

    async fn delay_ms(&mut self, ms: u32) {
        let mut world = self.world.borrow_mut();
        world.delays_ms.push(ms);
        world.now_ms += u64::from(ms);
    }
}

pub struct FakeUplink {
    world: SharedWorld,
}

impl FakeUplink {
    pub fn new(world: &SharedWorld) -> Self {
        Self {
            world: world.clone(),
        }
    }
}

impl BatchTransmitter for FakeUplink {
    async fn send_sample_batch(
        &mut self,
        samples: &[Sample],
        metadata: &BatchMetadata,
    ) -> Result<(), TransmitError> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut world = self.world.borrow_mut();
        if world.take_transmit_failure() {
            return Err(TransmitError::Unavailable);
        }
        world.sent_batches.push((samples.len(), *metadata));
        Ok(())
    }

    async fn send_state_events(&mut self, events: &[StateEvent]) -> Result<(), TransmitError> {
        if events.is_empty() {
            return Ok(());
        }
        let mut world = self.world.borrow_mut();
        world.state_attempts += 1;
        if world.take_transmit_failure() {
            return Err(TransmitError::Timeout);
        }
        world.sent_states.push(events.to_vec());
        Ok(())
    }
}
