//! Low-power sleep between scheduler chunks
//!
//! The core sleeps in WFI while the Mono timer or the motion interrupt is
//! pending. The motion ISR task raises `WAKE_EDGE` after signalling the
//! wake arbiter, so a chunk ends as soon as motion is seen.

use defmt::trace;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use hal_abstractions::LowPowerSleep;
use rtic_monotonics::stm32::prelude::*;

use crate::Mono;

/// Raised by the motion interrupt task
pub static WAKE_EDGE: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Sleep on the TIM2 monotonic, cut short by `WAKE_EDGE`
#[derive(Debug, Default)]
pub struct MonoSleep;

impl LowPowerSleep for MonoSleep {
    async fn sleep_secs(&mut self, secs: u32) {
        // A stale edge only ends this chunk early; the arbiter decides the cause
        match select(Mono::delay(u64::from(secs).secs()), WAKE_EDGE.wait()).await {
            Either::First(()) => trace!("Sleep chunk of {}s elapsed", secs),
            Either::Second(()) => trace!("Sleep chunk cut short by motion"),
        }
    }
}
