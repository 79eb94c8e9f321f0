//! Network time source and wall-clock traits

use core::future::Future;

/// Time acquisition and RTC errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeError {
    /// Gateway or network unreachable
    Unavailable,
    /// Request did not complete in time
    Timeout,
    /// Response arrived but carried no usable time value
    MissingTime,
    /// Clock has not been set since power-on
    NotSet,
    /// RTC peripheral rejected the operation
    Hardware,
}

impl core::fmt::Display for TimeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "time source unavailable"),
            Self::Timeout => write!(f, "time request timeout"),
            Self::MissingTime => write!(f, "response carried no time"),
            Self::NotSet => write!(f, "clock not set"),
            Self::Hardware => write!(f, "RTC hardware error"),
        }
    }
}

impl core::error::Error for TimeError {}

/// Source of authoritative network time
///
/// Implementations must be side-effect free on failure and must never
/// report a missing time value as `Ok(0)`.
pub trait TimeSource {
    /// Fetch the current Unix time in seconds
    ///
    /// Bounded by the implementation's own timeout.
    fn fetch_network_time(&mut self) -> impl Future<Output = Result<u32, TimeError>>;
}

/// Local real-time clock
pub trait WallClock {
    /// Current Unix time in seconds
    fn now(&mut self) -> Result<u32, TimeError>;

    /// Set the clock to `unix_secs`
    fn set(&mut self, unix_secs: u32) -> Result<(), TimeError>;
}
