//! Hardware abstraction traits for the motion tracker firmware
//!
//! This crate defines the seams between the platform-agnostic scheduler in
//! `tracker-core` and a board support package. BSPs implement these traits;
//! host tests implement them with fakes.
//!
//! - **`record`**: records that cross the seams (`StateEvent`, `Sample`, `BatchMetadata`)
//! - **`time`**: network time source and wall-clock (RTC) access
//! - **`sensor`**: motion classifier and raw accelerometer reads
//! - **`power`**: scoped low-power sleep
//! - **`uplink`**: batch transmitter towards the gateway

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod power;
pub mod record;
pub mod sensor;
pub mod time;
pub mod uplink;

pub use power::LowPowerSleep;
pub use record::{BatchMetadata, MalformedEvent, Sample, StateEvent};
pub use sensor::{Accelerometer, MotionClassifier, SensorError};
pub use time::{TimeError, TimeSource, WallClock};
pub use uplink::{BatchTransmitter, TransmitError};
