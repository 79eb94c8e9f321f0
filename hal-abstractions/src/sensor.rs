//! Motion sensor traits
//!
//! The classifier programming and register map live in the BSP; these
//! traits only expose what the scheduler consumes.

use core::future::Future;

use crate::record::Sample;

/// Sensor bus or device errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// Bus transaction failed
    Bus,
    /// Device answered with an unexpected identity or is not configured
    NotReady,
}

impl core::fmt::Display for SensorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bus => write!(f, "sensor bus error"),
            Self::NotReady => write!(f, "sensor not ready"),
        }
    }
}

impl core::error::Error for SensorError {}

/// On-sensor motion classifier
pub trait MotionClassifier {
    /// Read the current classifier output (0-255, meaning defined by the classifier program)
    fn read_state(&mut self) -> impl Future<Output = Result<u8, SensorError>>;
}

/// Raw 3-axis accelerometer
pub trait Accelerometer {
    /// Read one sample in milli-g
    fn read_sample(&mut self) -> impl Future<Output = Result<Sample, SensorError>>;

    /// Configured output data rate
    fn output_data_rate_hz(&self) -> f32;
}
