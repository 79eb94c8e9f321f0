//! Power-cycle scheduler
//!
//! One explicit state machine owns every piece of mutable tracker state.
//! Stages run in this order:
//!
//! ```text
//! Acquisition (once) -> TimeSync -> SleepWait <-> WakeInterruptHandling
//!                          ^            |
//!                          |            v
//!                          +------- CycleFlush
//! ```
//!
//! The only state shared with interrupt context is the [`WakeArbiter`] flag.

use embedded_hal_async::delay::DelayNs;

use hal_abstractions::{
    Accelerometer, BatchMetadata, BatchTransmitter, LowPowerSleep, MotionClassifier, TimeSource,
    WallClock,
};

use crate::acquisition::AcquisitionBuffer;
use crate::config::{ConfigError, TrackerConfig, STATE_LOG_CAPACITY};
use crate::error::TrackerError;
use crate::event_log::{LogError, StateEventLog};
use crate::logging::{debug, error, info, warn};
use crate::wake::{WakeArbiter, WakeCause};

/// Scheduler stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stage {
    /// One-shot accelerometer batch after power-on
    Acquisition,
    /// Fetch network time and anchor a new cycle
    TimeSync,
    /// Chunked low-power sleep towards the cycle target
    SleepWait,
    /// Record a motion-state transition after an interrupt wake
    WakeInterruptHandling,
    /// Close the cycle and transmit if anything happened
    CycleFlush,
}

/// How a stage finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transition {
    Completed,
    Woke(WakeCause),
}

impl Stage {
    /// Transition table
    pub const fn next(self, transition: Transition) -> Stage {
        match (self, transition) {
            (Stage::Acquisition, _) => Stage::TimeSync,
            (Stage::TimeSync, _) => Stage::SleepWait,
            (Stage::SleepWait, Transition::Woke(WakeCause::Interrupt)) => {
                Stage::WakeInterruptHandling
            }
            (Stage::SleepWait, _) => Stage::CycleFlush,
            (Stage::WakeInterruptHandling, _) => Stage::SleepWait,
            (Stage::CycleFlush, _) => Stage::TimeSync,
        }
    }
}

/// Mutable cycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleContext {
    /// Network time fetched at the start of this cycle
    pub cycle_start_time: u32,
    /// `cycle_start_time + cycle_period`
    pub target_wake_time: u32,
    /// Start of the interval currently in progress
    pub last_state_time: u32,
    /// Classifier output for that interval; `None` until first read
    pub last_state_code: Option<u8>,
    pub interrupt_occurred_this_cycle: bool,
    pub acquisition_done: bool,
}

/// Interval closed by a state change: `(start, end, code)`
type Closed = (u32, u32, u8);

impl CycleContext {
    /// Fold a classifier reading taken at `now` into the context
    ///
    /// Returns the interval that just ended when the state changed.
    fn observe_state(&mut self, code: u8, now: u32) -> Option<Closed> {
        match self.last_state_code {
            Some(previous) if previous == code => None,
            Some(previous) => {
                let start = self.last_state_time;
                self.last_state_time = now;
                self.last_state_code = Some(code);
                Some((start, now, previous))
            }
            None => {
                self.last_state_time = now;
                self.last_state_code = Some(code);
                None
            }
        }
    }
}

/// Counters since power-on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SchedulerStats {
    pub cycles_completed: u32,
    /// Confirmed transmissions, sample batch included
    pub transmissions: u32,
    pub failed_transmissions: u32,
    /// Cycle flushes gated off because no interrupt occurred
    pub skipped_flushes: u32,
    pub sync_failures: u32,
    pub sensor_failures: u32,
    /// Out-of-band flushes forced by a full log
    pub overflow_flushes: u32,
}

/// Hardware the scheduler drives
pub struct Devices<C, T, S, M, A, D, U> {
    pub clock: C,
    pub time_source: T,
    pub sleeper: S,
    pub classifier: M,
    pub accelerometer: A,
    pub delay: D,
    pub uplink: U,
}

/// The power-cycle state machine
///
/// `N` is the storage reserved for the state event log.
pub struct Scheduler<'a, C, T, S, M, A, D, U, const N: usize = STATE_LOG_CAPACITY> {
    arbiter: &'a WakeArbiter,
    devices: Devices<C, T, S, M, A, D, U>,
    config: TrackerConfig,
    context: CycleContext,
    log: StateEventLog<N>,
    samples: AcquisitionBuffer,
    stats: SchedulerStats,
    stage: Stage,
    /// Best known Unix time, carried across RTC failures
    now: u32,
    last_error: Option<TrackerError>,
}

impl<'a, C, T, S, M, A, D, U> Scheduler<'a, C, T, S, M, A, D, U>
where
    C: WallClock,
    T: TimeSource,
    S: LowPowerSleep,
    M: MotionClassifier,
    A: Accelerometer,
    D: DelayNs,
    U: BatchTransmitter,
{
    /// Build a scheduler starting at [`Stage::Acquisition`]
    ///
    /// The log storage holds exactly [`STATE_LOG_CAPACITY`] events; see
    /// [`Scheduler::with_log_storage`] for a larger log.
    pub fn new(
        config: TrackerConfig,
        arbiter: &'a WakeArbiter,
        devices: Devices<C, T, S, M, A, D, U>,
    ) -> Result<Self, TrackerError> {
        Self::with_log_storage(config, arbiter, devices)
    }
}

impl<'a, C, T, S, M, A, D, U, const N: usize> Scheduler<'a, C, T, S, M, A, D, U, N>
where
    C: WallClock,
    T: TimeSource,
    S: LowPowerSleep,
    M: MotionClassifier,
    A: Accelerometer,
    D: DelayNs,
    U: BatchTransmitter,
{
    /// Build a scheduler whose log storage holds `N` events
    ///
    /// `config.state_log_capacity` must fit in `N`.
    pub fn with_log_storage(
        config: TrackerConfig,
        arbiter: &'a WakeArbiter,
        devices: Devices<C, T, S, M, A, D, U>,
    ) -> Result<Self, TrackerError> {
        config.validate()?;
        if config.state_log_capacity > N {
            return Err(ConfigError::LogStorage {
                requested: config.state_log_capacity,
                storage: N,
            }
            .into());
        }
        Ok(Self {
            arbiter,
            devices,
            log: StateEventLog::new(config.state_log_capacity),
            samples: AcquisitionBuffer::new(config.max_samples_per_acquisition),
            config,
            context: CycleContext::default(),
            stats: SchedulerStats::default(),
            stage: Stage::Acquisition,
            now: 0,
            last_error: None,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn context(&self) -> &CycleContext {
        &self.context
    }

    pub fn log(&self) -> &StateEventLog<N> {
        &self.log
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Most recent non-fatal error
    pub fn last_error(&self) -> Option<TrackerError> {
        self.last_error
    }

    /// Run forever
    pub async fn run(&mut self) -> ! {
        info!("scheduler starting: {:?}", self.config);
        loop {
            self.step().await;
        }
    }

    /// Execute the current stage and move to the next one
    pub async fn step(&mut self) -> Stage {
        let transition = match self.stage {
            Stage::Acquisition => self.acquire().await,
            Stage::TimeSync => self.sync_time().await,
            Stage::SleepWait => self.sleep_wait().await,
            Stage::WakeInterruptHandling => self.handle_wake().await,
            Stage::CycleFlush => self.flush_cycle().await,
        };
        let next = self.stage.next(transition);
        debug!("stage {:?} -> {:?}", self.stage, next);
        self.stage = next;
        next
    }

    fn note(&mut self, err: TrackerError) {
        warn!("{:?}", err);
        self.last_error = Some(err);
    }

    async fn acquire(&mut self) -> Transition {
        let timestamp = self.devices.clock.now().unwrap_or(0);
        let duration_ms = self.config.acquisition_duration_ms;

        let summary = self
            .samples
            .collect(
                &mut self.devices.accelerometer,
                &mut self.devices.delay,
                duration_ms,
            )
            .await;
        info!(
            "acquired {} samples ({} failed reads)",
            summary.collected, summary.failed_reads
        );
        if summary.failed_reads > 0 {
            self.stats.sensor_failures = self
                .stats
                .sensor_failures
                .saturating_add(summary.failed_reads);
        }

        let metadata = BatchMetadata {
            rate_hz: self.devices.accelerometer.output_data_rate_hz(),
            duration_ms,
            timestamp,
        };
        match self
            .devices
            .uplink
            .send_sample_batch(self.samples.samples(), &metadata)
            .await
        {
            Ok(()) => {
                if !self.samples.is_empty() {
                    self.stats.transmissions += 1;
                }
            }
            Err(e) => {
                self.stats.failed_transmissions += 1;
                self.note(e.into());
            }
        }

        self.samples.clear();
        self.context.acquisition_done = true;
        Transition::Completed
    }

    async fn sync_time(&mut self) -> Transition {
        let fetched = loop {
            match self.devices.time_source.fetch_network_time().await {
                Ok(0) => warn!("network time reported 0, retrying"),
                Ok(t) => break t,
                Err(e) => self.note(e.into()),
            }
            self.stats.sync_failures += 1;
            self.devices
                .delay
                .delay_ms(self.config.sync_retry_backoff_ms)
                .await;
        };

        if let Err(e) = self.devices.clock.set(fetched) {
            warn!("RTC set failed: {:?}", e);
        }
        self.now = fetched;

        if self.context.last_state_code.is_none() {
            match self.devices.classifier.read_state().await {
                Ok(code) => {
                    self.context.last_state_code = Some(code);
                    self.context.last_state_time = fetched;
                    info!("initial motion state {}", code);
                }
                Err(e) => {
                    self.stats.sensor_failures += 1;
                    self.note(e.into());
                }
            }
        }

        self.context.cycle_start_time = fetched;
        self.context.target_wake_time = fetched.saturating_add(self.config.cycle_period_secs);
        self.context.interrupt_occurred_this_cycle = false;
        info!(
            "cycle anchored at {}, next flush at {}",
            fetched, self.context.target_wake_time
        );
        Transition::Completed
    }

    async fn sleep_wait(&mut self) -> Transition {
        let wake = self
            .arbiter
            .suspend_until(
                &mut self.devices.clock,
                &mut self.devices.sleeper,
                self.context.target_wake_time,
                self.config.max_sleep_chunk_secs,
                self.now,
            )
            .await;
        self.now = wake.now;
        debug!("wake {:?} at {}", wake.cause, wake.now);
        Transition::Woke(wake.cause)
    }

    async fn handle_wake(&mut self) -> Transition {
        let now = self.now;
        // Consume before reading: an edge during the read latches again
        if !self.arbiter.consume() {
            return Transition::Completed;
        }
        let reading = self.devices.classifier.read_state().await;

        let context = &mut self.context;
        let closed = critical_section::with(|_| {
            context.interrupt_occurred_this_cycle = true;
            match reading {
                Ok(code) => context.observe_state(code, now),
                Err(_) => None,
            }
        });

        if let Err(e) = reading {
            self.stats.sensor_failures += 1;
            self.note(e.into());
        }
        if let Some((start, end, code)) = closed {
            info!("state {} held {}..{}", code, start, end);
            self.log_event(start, end, code).await;
        }
        Transition::Completed
    }

    async fn flush_cycle(&mut self) -> Transition {
        self.stats.cycles_completed += 1;

        if !self.context.interrupt_occurred_this_cycle {
            self.stats.skipped_flushes += 1;
            info!("no motion this cycle, nothing sent");
            return Transition::Completed;
        }

        let now = self.now;
        if let Some(code) = self.context.last_state_code {
            let start = self.context.last_state_time;
            if start != now {
                self.log_event(start, now, code).await;
            }
            self.context.last_state_time = now;
        }

        if self.log.is_empty() {
            return Transition::Completed;
        }

        match self.devices.uplink.send_state_events(self.log.events()).await {
            Ok(()) => {
                let sent = self.log.drain_and_clear();
                self.stats.transmissions += 1;
                info!("sent {} state events", sent.len());
            }
            Err(e) => {
                self.stats.failed_transmissions += 1;
                self.note(e.into());
                warn!("keeping {} events for the next flush", self.log.size());
            }
        }
        Transition::Completed
    }

    /// Append an event, flushing out of band if the log is full
    async fn log_event(&mut self, start: u32, end: u32, code: u8) {
        match self.log.record(start, end, code) {
            Ok(()) => {}
            Err(LogError::Malformed(e)) => self.note(e.into()),
            Err(LogError::CapacityExceeded(event)) => {
                self.flush_overflow().await;
                if let Err(e) = self.log.append(event) {
                    error!("event lost after overflow flush: {:?}", e);
                }
            }
        }
    }

    async fn flush_overflow(&mut self) {
        self.stats.overflow_flushes += 1;
        warn!("state log full ({}), flushing early", self.log.size());

        match self.devices.uplink.send_state_events(self.log.events()).await {
            Ok(()) => {
                self.log.drain_and_clear();
                self.stats.transmissions += 1;
            }
            Err(e) => {
                self.stats.failed_transmissions += 1;
                self.note(e.into());
                let dropped = self.log.discard_all();
                let err = TrackerError::CapacityOverflow { dropped };
                error!("{:?}", err);
                self.last_error = Some(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        FakeAccel, FakeClassifier, FakeClock, FakeDelay, FakeSleeper, FakeTimeSource, FakeUplink,
        SharedWorld, World,
    };
    use embassy_futures::block_on;
    use hal_abstractions::{StateEvent, TimeError, TransmitError};

    type TestScheduler<'a> = Scheduler<
        'a,
        FakeClock,
        FakeTimeSource,
        FakeSleeper<'a>,
        FakeClassifier<'a>,
        FakeAccel,
        FakeDelay,
        FakeUplink,
    >;

    type WideScheduler<'a> = Scheduler<
        'a,
        FakeClock,
        FakeTimeSource,
        FakeSleeper<'a>,
        FakeClassifier<'a>,
        FakeAccel,
        FakeDelay,
        FakeUplink,
        64,
    >;

    fn devices<'a>(
        world: &SharedWorld,
        arbiter: &'a WakeArbiter,
    ) -> Devices<
        FakeClock,
        FakeTimeSource,
        FakeSleeper<'a>,
        FakeClassifier<'a>,
        FakeAccel,
        FakeDelay,
        FakeUplink,
    > {
        Devices {
            clock: FakeClock::new(world),
            time_source: FakeTimeSource::new(world),
            sleeper: FakeSleeper::new(world, arbiter),
            classifier: FakeClassifier::new(world, arbiter),
            accelerometer: FakeAccel::new(world, 10.0),
            delay: FakeDelay::new(world),
            uplink: FakeUplink::new(world),
        }
    }

    fn scheduler<'a>(
        world: &SharedWorld,
        arbiter: &'a WakeArbiter,
        config: TrackerConfig,
    ) -> TestScheduler<'a> {
        Scheduler::new(config, arbiter, devices(world, arbiter)).unwrap()
    }

    /// World at 990 s so the 10 s acquisition ends exactly at 1000 s
    fn world_with_state(state: u8) -> SharedWorld {
        let world = World::new(990);
        world.borrow_mut().state = state;
        world
    }

    fn event(start: u32, end: u32, code: u8) -> StateEvent {
        StateEvent::new(start, end, code).unwrap()
    }

    /// Step until `stage` is about to run again, returning the stages visited
    fn run_until(s: &mut TestScheduler<'_>, stage: Stage) -> Vec<Stage> {
        let mut visited = Vec::new();
        loop {
            let next = block_on(s.step());
            visited.push(next);
            if next == stage {
                return visited;
            }
        }
    }

    #[test]
    fn test_transition_table() {
        use Transition::*;
        assert_eq!(Stage::Acquisition.next(Completed), Stage::TimeSync);
        assert_eq!(Stage::TimeSync.next(Completed), Stage::SleepWait);
        assert_eq!(
            Stage::SleepWait.next(Woke(WakeCause::Interrupt)),
            Stage::WakeInterruptHandling
        );
        assert_eq!(Stage::SleepWait.next(Woke(WakeCause::Timer)), Stage::CycleFlush);
        assert_eq!(Stage::WakeInterruptHandling.next(Completed), Stage::SleepWait);
        assert_eq!(Stage::CycleFlush.next(Completed), Stage::TimeSync);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let world = World::new(0);
        let arbiter = WakeArbiter::new();
        let config = TrackerConfig {
            cycle_period_secs: 0,
            ..TrackerConfig::default()
        };
        let result = Scheduler::new(config, &arbiter, devices(&world, &arbiter));
        assert!(matches!(result, Err(TrackerError::Config(_))));
    }

    #[test]
    fn test_log_capacity_must_fit_storage() {
        let world = World::new(0);
        let arbiter = WakeArbiter::new();
        let config = TrackerConfig {
            state_log_capacity: 60,
            ..TrackerConfig::default()
        };

        let result = Scheduler::new(config, &arbiter, devices(&world, &arbiter));
        assert!(matches!(
            result,
            Err(TrackerError::Config(ConfigError::LogStorage {
                requested: 60,
                storage: 50
            }))
        ));

        let s = WideScheduler::with_log_storage(config, &arbiter, devices(&world, &arbiter))
            .unwrap();
        assert_eq!(s.log().capacity(), 60);
    }

    #[test]
    fn test_acquisition_sends_one_batch() {
        let world = world_with_state(1);
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());

        assert_eq!(block_on(s.step()), Stage::TimeSync);

        let world = world.borrow();
        assert_eq!(world.sent_batches.len(), 1);
        let (count, metadata) = world.sent_batches[0];
        assert_eq!(count, 100);
        assert_eq!(metadata.rate_hz, 10.0);
        assert_eq!(metadata.duration_ms, 10_000);
        assert_eq!(metadata.timestamp, 990);
        assert!(s.context().acquisition_done);
        assert_eq!(s.stats().transmissions, 1);
    }

    #[test]
    fn test_acquisition_failure_is_not_fatal() {
        let world = world_with_state(1);
        world.borrow_mut().transmit_failures = 1;
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());

        assert_eq!(block_on(s.step()), Stage::TimeSync);
        assert_eq!(s.stats().failed_transmissions, 1);
        assert_eq!(
            s.last_error(),
            Some(TrackerError::from(TransmitError::Unavailable))
        );
    }

    #[test]
    fn test_time_sync_anchors_cycle() {
        let world = world_with_state(3);
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());

        block_on(s.step());
        assert_eq!(block_on(s.step()), Stage::SleepWait);

        let ctx = s.context();
        assert_eq!(ctx.cycle_start_time, 1000);
        assert_eq!(ctx.target_wake_time, 2800);
        assert_eq!(ctx.last_state_time, 1000);
        assert_eq!(ctx.last_state_code, Some(3));
        assert!(!ctx.interrupt_occurred_this_cycle);
        assert_eq!(world.borrow().clock_sets, vec![1000]);
    }

    #[test]
    fn test_time_sync_retries_until_success() {
        let world = world_with_state(1);
        world.borrow_mut().time_results.extend([
            Err(TimeError::Timeout),
            Ok(0),
            Err(TimeError::MissingTime),
            Ok(5000),
        ]);
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());

        block_on(s.step());
        assert_eq!(block_on(s.step()), Stage::SleepWait);

        assert_eq!(world.borrow().time_requests, 4);
        assert_eq!(s.stats().sync_failures, 3);
        assert_eq!(s.context().cycle_start_time, 5000);
        let world = world.borrow();
        let delays = &world.delays_ms;
        assert_eq!(&delays[delays.len() - 3..], &[5000, 5000, 5000]);
    }

    #[test]
    fn test_clock_set_failure_still_anchors() {
        let world = world_with_state(1);
        world.borrow_mut().clock_broken = true;
        world.borrow_mut().time_results.push_back(Ok(1000));
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());

        block_on(s.step());
        block_on(s.step());
        assert_eq!(s.context().cycle_start_time, 1000);

        // the broken RTC still reaches the target through the estimate
        assert_eq!(block_on(s.step()), Stage::CycleFlush);
        assert_eq!(s.context().target_wake_time, 2800);
        assert!(world.borrow().sleeps.iter().sum::<u32>() >= 1800);
    }

    #[test]
    fn test_three_transition_scenario() {
        let world = world_with_state(1);
        world.borrow_mut().schedule_interrupt(1100, 2);
        world.borrow_mut().schedule_interrupt(1500, 5);
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());

        let visited = run_until(&mut s, Stage::CycleFlush);
        assert_eq!(
            visited,
            vec![
                Stage::TimeSync,
                Stage::SleepWait,
                Stage::WakeInterruptHandling,
                Stage::SleepWait,
                Stage::WakeInterruptHandling,
                Stage::SleepWait,
                Stage::CycleFlush,
            ]
        );
        assert_eq!(
            s.log().events(),
            &[event(1000, 1100, 1), event(1100, 1500, 2)]
        );

        assert_eq!(block_on(s.step()), Stage::TimeSync);

        let world = world.borrow();
        let sent = &world.sent_states;
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0],
            vec![
                event(1000, 1100, 1),
                event(1100, 1500, 2),
                event(1500, 2800, 5)
            ]
        );
        for pair in sent[0].windows(2) {
            assert_eq!(pair[0].end_time(), pair[1].start_time());
        }
        assert!(s.log().is_empty());
        assert_eq!(s.context().last_state_time, 2800);
        assert_eq!(s.context().last_state_code, Some(5));
    }

    #[test]
    fn test_quiet_cycle_transmits_nothing() {
        let world = world_with_state(1);
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());

        run_until(&mut s, Stage::CycleFlush);
        assert!(world.borrow().now_secs() >= 2800);
        assert_eq!(block_on(s.step()), Stage::TimeSync);

        assert_eq!(world.borrow().state_attempts, 0);
        assert!(s.log().is_empty());
        assert_eq!(s.stats().skipped_flushes, 1);
        assert_eq!(s.stats().cycles_completed, 1);
        assert_eq!(s.context().last_state_time, 1000);
    }

    #[test]
    fn test_quiet_cycle_leaves_retained_log_untouched() {
        let world = world_with_state(1);
        world.borrow_mut().schedule_interrupt(1100, 2);
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());
        // acquisition batch goes through, the state flush fails
        run_until(&mut s, Stage::CycleFlush);
        world.borrow_mut().transmit_failures = 1;
        block_on(s.step());
        assert_eq!(s.log().size(), 2);

        run_until(&mut s, Stage::CycleFlush);
        block_on(s.step());

        assert_eq!(world.borrow().state_attempts, 1);
        assert_eq!(s.log().size(), 2);
        assert_eq!(s.stats().skipped_flushes, 1);
    }

    #[test]
    fn test_interrupt_without_change_still_flushes() {
        let world = world_with_state(4);
        world.borrow_mut().schedule_interrupt(1200, 4);
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());

        run_until(&mut s, Stage::CycleFlush);
        assert!(s.log().is_empty());
        assert!(s.context().interrupt_occurred_this_cycle);
        block_on(s.step());

        assert_eq!(world.borrow().sent_states, vec![vec![event(1000, 2800, 4)]]);
    }

    #[test]
    fn test_next_anchor_is_fetched_time() {
        let world = world_with_state(1);
        world.borrow_mut().schedule_interrupt(1100, 2);
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());

        run_until(&mut s, Stage::CycleFlush);
        // network time for the next sync is slightly ahead of the RTC
        world.borrow_mut().time_results.push_back(Ok(2807));
        block_on(s.step());
        assert_eq!(block_on(s.step()), Stage::SleepWait);

        assert_eq!(s.context().cycle_start_time, 2807);
        assert_eq!(s.context().target_wake_time, 2807 + 1800);
        assert!(!s.context().interrupt_occurred_this_cycle);
        // continuity: the next interval starts where the flushed one ended
        assert_eq!(s.context().last_state_time, 2800);
        assert_eq!(s.context().last_state_code, Some(2));
    }

    #[test]
    fn test_failed_flush_keeps_log_for_next_cycle() {
        let world = world_with_state(1);
        world.borrow_mut().schedule_interrupt(1100, 2);
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());

        run_until(&mut s, Stage::CycleFlush);
        world.borrow_mut().transmit_failures = 1;
        assert_eq!(block_on(s.step()), Stage::TimeSync);

        assert_eq!(s.stats().failed_transmissions, 1);
        assert_eq!(
            s.log().events(),
            &[event(1000, 1100, 1), event(1100, 2800, 2)]
        );
        assert_eq!(s.context().last_state_time, 2800);

        world.borrow_mut().schedule_interrupt(3000, 3);
        run_until(&mut s, Stage::CycleFlush);
        block_on(s.step());

        let world = world.borrow();
        let sent = &world.sent_states;
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0],
            vec![
                event(1000, 1100, 1),
                event(1100, 2800, 2),
                event(2800, 3000, 2),
                event(3000, 4600, 3),
            ]
        );
        assert!(s.log().is_empty());
    }

    /// Alternate 1 <-> 2 every 10 s from 1010, one edge per logged event
    fn schedule_toggles(world: &SharedWorld, edges: u32) {
        let mut w = world.borrow_mut();
        for k in 1..=edges {
            w.schedule_interrupt(1000 + 10 * k, if k % 2 == 1 { 2 } else { 1 });
        }
    }

    #[test]
    fn test_overflow_flushes_once_before_insert() {
        let world = world_with_state(1);
        schedule_toggles(&world, 51);
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());

        run_until(&mut s, Stage::CycleFlush);

        assert_eq!(world.borrow().state_attempts, 1);
        {
            let world = world.borrow();
            let sent = &world.sent_states[0];
            assert_eq!(sent.len(), STATE_LOG_CAPACITY);
            assert_eq!(sent[0], event(1000, 1010, 1));
            assert_eq!(sent[49], event(1490, 1500, 2));
        }
        assert_eq!(s.log().events(), &[event(1500, 1510, 1)]);
        assert_eq!(s.stats().overflow_flushes, 1);
        assert_eq!(s.log().dropped_events(), 0);
    }

    #[test]
    fn test_failed_overflow_flush_drops_batch() {
        let world = world_with_state(1);
        schedule_toggles(&world, 51);
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());

        // let acquisition through before arming the failure
        block_on(s.step());
        world.borrow_mut().transmit_failures = 1;
        run_until(&mut s, Stage::CycleFlush);

        assert_eq!(world.borrow().state_attempts, 1);
        assert!(world.borrow().sent_states.is_empty());
        assert_eq!(s.log().events(), &[event(1500, 1510, 1)]);
        assert_eq!(s.log().dropped_events(), 50);
        assert_eq!(
            s.last_error(),
            Some(TrackerError::CapacityOverflow { dropped: 50 })
        );
    }

    #[test]
    fn test_wider_log_defers_overflow() {
        let world = world_with_state(1);
        schedule_toggles(&world, 51);
        let arbiter = WakeArbiter::new();
        let config = TrackerConfig {
            state_log_capacity: 64,
            ..TrackerConfig::default()
        };
        let mut s =
            WideScheduler::with_log_storage(config, &arbiter, devices(&world, &arbiter)).unwrap();

        let mut stage = block_on(s.step());
        while stage != Stage::CycleFlush {
            stage = block_on(s.step());
        }

        assert_eq!(s.stats().overflow_flushes, 0);
        assert_eq!(s.log().size(), 51);
        assert!(world.borrow().sent_states.is_empty());
    }

    #[test]
    fn test_sensor_failure_means_no_change() {
        let world = world_with_state(1);
        world.borrow_mut().schedule_interrupt(1100, 2);
        world.borrow_mut().schedule_interrupt(1500, 3);
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());

        // through TimeSync, then the first interrupt wake
        block_on(s.step());
        block_on(s.step());
        assert_eq!(block_on(s.step()), Stage::WakeInterruptHandling);
        world.borrow_mut().classifier_failures = 1;
        block_on(s.step());

        assert!(s.log().is_empty());
        assert!(s.context().interrupt_occurred_this_cycle);
        assert_eq!(s.context().last_state_code, Some(1));
        assert_eq!(s.stats().sensor_failures, 1);

        run_until(&mut s, Stage::CycleFlush);
        assert_eq!(s.log().events(), &[event(1000, 1500, 1)]);
    }

    #[test]
    fn test_unknown_initial_state_fabricates_nothing() {
        let world = world_with_state(7);
        world.borrow_mut().schedule_interrupt(1100, 2);
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());

        block_on(s.step());
        world.borrow_mut().classifier_failures = 1;
        block_on(s.step());
        assert_eq!(s.context().last_state_code, None);

        run_until(&mut s, Stage::CycleFlush);
        // first successful read only establishes the state
        assert!(s.log().is_empty());
        assert_eq!(s.context().last_state_code, Some(2));
        assert_eq!(s.context().last_state_time, 1100);

        block_on(s.step());
        assert_eq!(world.borrow().sent_states, vec![vec![event(1100, 2800, 2)]]);
    }

    #[test]
    fn test_repeated_signal_is_consumed_once() {
        let world = world_with_state(1);
        world.borrow_mut().schedule_interrupt(1100, 2);
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());

        block_on(s.step());
        block_on(s.step());
        assert_eq!(block_on(s.step()), Stage::WakeInterruptHandling);
        // a bounce of the same edge before the handler runs
        arbiter.signal();
        block_on(s.step());

        assert!(!arbiter.is_pending());
        assert_eq!(s.log().events(), &[event(1000, 1100, 1)]);
        assert_eq!(block_on(s.step()), Stage::CycleFlush);
    }

    #[test]
    fn test_edge_during_classifier_read_is_not_lost() {
        let world = world_with_state(1);
        world.borrow_mut().schedule_interrupt(1100, 2);
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());

        block_on(s.step());
        block_on(s.step());
        assert_eq!(block_on(s.step()), Stage::WakeInterruptHandling);
        // the classifier moves on to 3 while state 2 is being read
        world.borrow_mut().edge_during_read = Some(3);
        block_on(s.step());
        assert!(arbiter.is_pending());

        let visited = run_until(&mut s, Stage::CycleFlush);
        assert_eq!(
            visited,
            vec![
                Stage::WakeInterruptHandling,
                Stage::SleepWait,
                Stage::CycleFlush
            ]
        );
        block_on(s.step());

        assert_eq!(
            world.borrow().sent_states,
            vec![vec![
                event(1000, 1100, 1),
                event(1100, 1100, 2),
                event(1100, 2800, 3)
            ]]
        );
        assert_eq!(s.context().last_state_code, Some(3));
    }

    #[test]
    fn test_backwards_clock_is_rejected() {
        let world = world_with_state(1);
        world.borrow_mut().schedule_interrupt(1100, 2);
        let arbiter = WakeArbiter::new();
        let mut s = scheduler(&world, &arbiter, TrackerConfig::default());

        block_on(s.step());
        // network time jumps backwards relative to the seeded state
        world.borrow_mut().time_results.push_back(Ok(1000));
        block_on(s.step());
        run_until(&mut s, Stage::CycleFlush);
        block_on(s.step());

        world.borrow_mut().time_results.push_back(Ok(500));
        world.borrow_mut().schedule_interrupt(600, 3);
        run_until(&mut s, Stage::CycleFlush);

        assert_eq!(s.log().rejected_events(), 1);
        assert!(s.log().is_empty());
        assert_eq!(s.context().last_state_code, Some(3));
        assert_eq!(s.context().last_state_time, 600);
    }
}
