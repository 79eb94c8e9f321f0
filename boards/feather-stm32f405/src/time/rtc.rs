//! Internal RTC as the scheduler's wall clock
//!
//! The RTC peripheral sits in a global so the defmt timestamp hook can read
//! it too. It runs from the LSE and keeps counting between syncs.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};
use critical_section::Mutex;
use defmt::{error, info};
use embassy_stm32::rtc::Rtc;
use hal_abstractions::{TimeError, WallClock};

use super::calendar::{datetime_to_unix, unix_to_datetime};

/// Set after the first successful write; the RTC holds garbage before that
static TIME_SYNCED: AtomicBool = AtomicBool::new(false);

static RTC: Mutex<RefCell<Option<Rtc>>> = Mutex::new(RefCell::new(None));

/// Hand the RTC peripheral over to the time module
///
/// Must be called once from `init` before the scheduler starts.
pub fn initialize_rtc(rtc: Rtc) {
    critical_section::with(|cs| {
        RTC.borrow(cs).replace(Some(rtc));
    });
    info!("Internal RTC initialized");
}

fn is_time_synced() -> bool {
    TIME_SYNCED.load(Ordering::Acquire)
}

fn write_rtc(unix_secs: u32) -> Result<(), TimeError> {
    let datetime = unix_to_datetime(unix_secs).map_err(|_| TimeError::Hardware)?;
    critical_section::with(|cs| {
        let mut rtc = RTC.borrow(cs).borrow_mut();
        let rtc = rtc.as_mut().ok_or(TimeError::NotSet)?;
        rtc.set_datetime(datetime).map_err(|_| TimeError::Hardware)?;
        TIME_SYNCED.store(true, Ordering::Release);
        Ok(())
    })
}

fn read_rtc() -> Result<u32, TimeError> {
    if !is_time_synced() {
        return Err(TimeError::NotSet);
    }
    critical_section::with(|cs| {
        let mut rtc = RTC.borrow(cs).borrow_mut();
        let rtc = rtc.as_mut().ok_or(TimeError::NotSet)?;
        let datetime = rtc.now().map_err(|_| TimeError::Hardware)?;
        datetime_to_unix(&datetime).map_err(|_| TimeError::Hardware)
    })
}

/// Unix seconds for log timestamps, 0 until the first sync
pub fn get_timestamp() -> u32 {
    read_rtc().unwrap_or(0)
}

/// Handle to the global RTC
#[derive(Debug, Default, Clone, Copy)]
pub struct BoardRtc;

impl WallClock for BoardRtc {
    fn now(&mut self) -> Result<u32, TimeError> {
        read_rtc()
    }

    fn set(&mut self, unix_secs: u32) -> Result<(), TimeError> {
        write_rtc(unix_secs).inspect_err(|e| error!("RTC write failed: {:?}", e))
    }
}
