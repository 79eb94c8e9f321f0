//! Low-power sleep trait

use core::future::Future;

/// Scoped low-power sleep
///
/// `sleep_secs` suspends for at most `secs` seconds. It may return early
/// when an external wake source fires; the caller decides why it woke.
pub trait LowPowerSleep {
    fn sleep_secs(&mut self, secs: u32) -> impl Future<Output = ()>;
}
