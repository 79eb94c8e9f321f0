//! Tracker configuration

/// Smallest allowed state log, and the storage reserved by default
pub const STATE_LOG_CAPACITY: usize = 50;

/// Storage reserved for one acquisition batch
pub const MAX_SAMPLES_PER_ACQUISITION: usize = 300;

/// Scheduler configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TrackerConfig {
    /// Length of one monitoring cycle, measured from the synced cycle start
    pub cycle_period_secs: u32,
    /// Acquisition window run once at power-on
    pub acquisition_duration_ms: u32,
    /// Sample limit for the acquisition window (at most [`MAX_SAMPLES_PER_ACQUISITION`])
    pub max_samples_per_acquisition: usize,
    /// Events held before an out-of-band flush (at least [`STATE_LOG_CAPACITY`])
    pub state_log_capacity: usize,
    /// Longest single low-power sleep before the arbiter re-checks the clock
    pub max_sleep_chunk_secs: u32,
    /// Wait between failed network time requests
    pub sync_retry_backoff_ms: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            cycle_period_secs: 1800,
            acquisition_duration_ms: 10_000,
            max_samples_per_acquisition: MAX_SAMPLES_PER_ACQUISITION,
            state_log_capacity: STATE_LOG_CAPACITY,
            max_sleep_chunk_secs: 120,
            sync_retry_backoff_ms: 5000,
        }
    }
}

/// Configuration rejected by [`TrackerConfig::validate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    ZeroCyclePeriod,
    ZeroSleepChunk,
    /// Log capacity below `STATE_LOG_CAPACITY`
    LogCapacity(usize),
    /// Log capacity above the storage compiled into the scheduler
    LogStorage { requested: usize, storage: usize },
    /// Sample limit outside `1..=MAX_SAMPLES_PER_ACQUISITION`
    SampleCapacity(usize),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ZeroCyclePeriod => write!(f, "cycle period must be non-zero"),
            Self::ZeroSleepChunk => write!(f, "sleep chunk must be non-zero"),
            Self::LogCapacity(n) => {
                write!(f, "state log capacity {} below {}", n, STATE_LOG_CAPACITY)
            }
            Self::LogStorage { requested, storage } => write!(
                f,
                "state log capacity {} exceeds storage for {}",
                requested, storage
            ),
            Self::SampleCapacity(n) => write!(
                f,
                "sample capacity {} outside 1..={}",
                n, MAX_SAMPLES_PER_ACQUISITION
            ),
        }
    }
}

impl core::error::Error for ConfigError {}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_period_secs == 0 {
            return Err(ConfigError::ZeroCyclePeriod);
        }
        if self.max_sleep_chunk_secs == 0 {
            return Err(ConfigError::ZeroSleepChunk);
        }
        if self.state_log_capacity < STATE_LOG_CAPACITY {
            return Err(ConfigError::LogCapacity(self.state_log_capacity));
        }
        if !(1..=MAX_SAMPLES_PER_ACQUISITION).contains(&self.max_samples_per_acquisition) {
            return Err(ConfigError::SampleCapacity(
                self.max_samples_per_acquisition,
            ));
        }
        Ok(())
    }
}
