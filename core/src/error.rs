//! Scheduler error taxonomy
//!
//! Every variant is recoverable: the scheduler logs it, updates its
//! counters and carries on with the next stage.

use hal_abstractions::{MalformedEvent, SensorError, TimeError, TransmitError};

use crate::config::ConfigError;

/// Which network operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetworkFailure {
    TimeSync(TimeError),
    Transmit(TransmitError),
}

/// Scheduler operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrackerError {
    /// Time sync or transmission failed; retried later
    TransientNetworkFailure(NetworkFailure),
    /// Event log full and the out-of-band flush failed; `dropped` events lost
    CapacityOverflow { dropped: usize },
    /// Interval rejected at insertion
    MalformedEvent(MalformedEvent),
    /// Classifier could not be read; state treated as unchanged
    SensorReadFailure(SensorError),
    /// Configuration rejected before start-up
    Config(ConfigError),
}

impl core::fmt::Display for TrackerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TransientNetworkFailure(NetworkFailure::TimeSync(e)) => {
                write!(f, "time sync failed: {}", e)
            }
            Self::TransientNetworkFailure(NetworkFailure::Transmit(e)) => {
                write!(f, "transmission failed: {}", e)
            }
            Self::CapacityOverflow { dropped } => {
                write!(f, "event log overflow, {} events dropped", dropped)
            }
            Self::MalformedEvent(e) => write!(f, "malformed event: {}", e),
            Self::SensorReadFailure(e) => write!(f, "sensor read failed: {}", e),
            Self::Config(e) => write!(f, "invalid configuration: {}", e),
        }
    }
}

impl core::error::Error for TrackerError {}

impl From<TimeError> for TrackerError {
    fn from(e: TimeError) -> Self {
        Self::TransientNetworkFailure(NetworkFailure::TimeSync(e))
    }
}

impl From<TransmitError> for TrackerError {
    fn from(e: TransmitError) -> Self {
        Self::TransientNetworkFailure(NetworkFailure::Transmit(e))
    }
}

impl From<MalformedEvent> for TrackerError {
    fn from(e: MalformedEvent) -> Self {
        Self::MalformedEvent(e)
    }
}

impl From<SensorError> for TrackerError {
    fn from(e: SensorError) -> Self {
        Self::SensorReadFailure(e)
    }
}

impl From<ConfigError> for TrackerError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
