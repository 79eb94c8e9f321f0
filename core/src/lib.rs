//! Platform-agnostic core logic for the motion tracker firmware
//!
//! This crate contains the power-cycle scheduler and everything it owns:
//! the bounded state event log, the wake arbiter, the one-shot acquisition
//! buffer and the outbound payload encoders. It has NO hardware
//! dependencies; boards plug in through the `hal-abstractions` traits.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

mod logging;

pub mod acquisition;
pub mod config;
pub mod error;
pub mod event_log;
pub mod scheduler;
pub mod wake;
pub mod wire;

#[cfg(test)]
mod testing;

pub use config::TrackerConfig;
pub use error::TrackerError;
pub use event_log::StateEventLog;
pub use scheduler::{CycleContext, Devices, Scheduler, SchedulerStats, Stage};
pub use wake::{Wake, WakeArbiter, WakeCause};
