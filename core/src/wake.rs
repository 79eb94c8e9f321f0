//! Wake arbiter
//!
//! The motion interrupt handler only calls [`WakeArbiter::signal`], which
//! latches a single flag. The scheduler polls and clears it after returning
//! from sleep; edges arriving before the flag is consumed coalesce.

use core::cell::Cell;

use critical_section::{CriticalSection, Mutex};
use hal_abstractions::{LowPowerSleep, WallClock};

use crate::logging::{debug, trace};

/// Why the suspend primitive returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeCause {
    /// Target time reached
    Timer,
    /// External interrupt is pending
    Interrupt,
}

/// Result of [`WakeArbiter::suspend_until`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Wake {
    pub cause: WakeCause,
    /// Best known time at the wake (Unix seconds)
    pub now: u32,
}

/// One-shot interrupt latch shared between ISR and scheduler
pub struct WakeArbiter {
    pending: Mutex<Cell<bool>>,
}

impl WakeArbiter {
    pub const fn new() -> Self {
        Self {
            pending: Mutex::new(Cell::new(false)),
        }
    }

    /// Latch a wake request. Safe to call from interrupt context.
    pub fn signal(&self) {
        critical_section::with(|cs| self.pending.borrow(cs).set(true));
    }

    /// Whether a signal is latched, without consuming it
    pub fn is_pending(&self) -> bool {
        critical_section::with(|cs| self.pending.borrow(cs).get())
    }

    /// Read-and-clear inside a caller-held critical section
    ///
    /// Lets the caller combine the flag consumption with its own state
    /// updates atomically with respect to the interrupt handler.
    pub fn take(&self, cs: CriticalSection<'_>) -> bool {
        self.pending.borrow(cs).replace(false)
    }

    /// Read-and-clear in its own critical section
    pub fn consume(&self) -> bool {
        critical_section::with(|cs| self.take(cs))
    }

    /// Sleep in chunks until `target` or until a signal is pending
    ///
    /// `last_known` is used as the time estimate whenever the clock cannot
    /// be read; it advances by each requested sleep so a dead RTC still
    /// reaches the target. The pending flag is left latched for the caller.
    pub async fn suspend_until<C, S>(
        &self,
        clock: &mut C,
        sleeper: &mut S,
        target: u32,
        max_chunk_secs: u32,
        last_known: u32,
    ) -> Wake
    where
        C: WallClock,
        S: LowPowerSleep,
    {
        let mut estimate = last_known;
        loop {
            let now = clock.now().unwrap_or(estimate);
            estimate = now;

            if self.is_pending() {
                return Wake {
                    cause: WakeCause::Interrupt,
                    now,
                };
            }
            if now >= target {
                return Wake {
                    cause: WakeCause::Timer,
                    now,
                };
            }

            let chunk = (target - now).min(max_chunk_secs.max(1));
            trace!("sleeping {} s, {} s to target", chunk, target - now);
            sleeper.sleep_secs(chunk).await;
            estimate = estimate.saturating_add(chunk);

            if !self.is_pending() {
                debug!("timer wake, re-checking target");
            }
        }
    }
}

impl Default for WakeArbiter {
    fn default() -> Self {
        Self::new()
    }
}
