//! Bounded, ordered state event log
//!
//! Storage `N` is fixed at compile time and defaults to the minimum of
//! [`STATE_LOG_CAPACITY`] events. The runtime `limit` caps how many events
//! are accepted before the caller has to flush.

use heapless::Vec;

use hal_abstractions::{MalformedEvent, StateEvent};

use crate::config::STATE_LOG_CAPACITY;

/// Append errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LogError {
    /// Log at its limit; the rejected event is handed back
    CapacityExceeded(StateEvent),
    /// Interval ends before it starts
    Malformed(MalformedEvent),
}

/// Insertion-ordered list of state events
#[derive(Debug)]
pub struct StateEventLog<const N: usize = STATE_LOG_CAPACITY> {
    events: Vec<StateEvent, N>,
    limit: usize,
    dropped: u32,
    rejected: u32,
}

impl<const N: usize> StateEventLog<N> {
    /// Create an empty log accepting at most `limit` events (clamped to `1..=N`)
    pub fn new(limit: usize) -> Self {
        Self {
            events: Vec::new(),
            limit: limit.clamp(1, N.max(1)),
            dropped: 0,
            rejected: 0,
        }
    }

    /// Append a validated event
    ///
    /// Never evicts: when the log is at its limit the event is returned in
    /// [`LogError::CapacityExceeded`] and the contents are left untouched.
    pub fn append(&mut self, event: StateEvent) -> Result<(), LogError> {
        if self.events.len() >= self.limit {
            return Err(LogError::CapacityExceeded(event));
        }
        self.events
            .push(event)
            .map_err(LogError::CapacityExceeded)
    }

    /// Build and append an event from raw times
    ///
    /// Malformed intervals are counted in [`Self::rejected_events`].
    pub fn record(&mut self, start_time: u32, end_time: u32, state_code: u8) -> Result<(), LogError> {
        match StateEvent::new(start_time, end_time, state_code) {
            Ok(event) => self.append(event),
            Err(e) => {
                self.rejected = self.rejected.saturating_add(1);
                Err(LogError::Malformed(e))
            }
        }
    }

    pub fn size(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= self.limit
    }

    /// Runtime limit
    pub fn capacity(&self) -> usize {
        self.limit
    }

    /// Events in insertion order
    pub fn events(&self) -> &[StateEvent] {
        &self.events
    }

    /// Take every event in order and leave the log empty
    pub fn drain_and_clear(&mut self) -> Vec<StateEvent, N> {
        core::mem::take(&mut self.events)
    }

    /// Throw away every event, counting them as dropped
    ///
    /// Returns how many events were discarded.
    pub fn discard_all(&mut self) -> usize {
        let n = self.events.len();
        self.events.clear();
        self.dropped = self.dropped.saturating_add(n as u32);
        n
    }

    /// Events lost to failed overflow flushes since power-on
    pub fn dropped_events(&self) -> u32 {
        self.dropped
    }

    /// Malformed intervals refused since power-on
    pub fn rejected_events(&self) -> u32 {
        self.rejected
    }
}

impl<const N: usize> Default for StateEventLog<N> {
    fn default() -> Self {
        Self::new(N)
    }
}
