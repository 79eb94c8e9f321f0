//! Batch transmitter trait

use core::future::Future;

use crate::record::{BatchMetadata, Sample, StateEvent};

/// Outbound transmission errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitError {
    /// Link or gateway unreachable
    Unavailable,
    /// Transmission did not complete in time
    Timeout,
    /// Gateway refused the message
    Rejected,
    /// Payload could not be encoded into the outbound buffer
    Encoding,
}

impl core::fmt::Display for TransmitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "uplink unavailable"),
            Self::Timeout => write!(f, "uplink timeout"),
            Self::Rejected => write!(f, "message rejected"),
            Self::Encoding => write!(f, "payload encoding failed"),
        }
    }
}

impl core::error::Error for TransmitError {}

/// Sends accumulated data as one outbound message per call
///
/// Both operations resolve only once the outcome is known. Implementations
/// must return `Ok(())` without touching the radio when given an empty slice.
pub trait BatchTransmitter {
    /// Send one acquisition batch
    fn send_sample_batch(
        &mut self,
        samples: &[Sample],
        metadata: &BatchMetadata,
    ) -> impl Future<Output = Result<(), TransmitError>>;

    /// Send the ordered state event log
    fn send_state_events(
        &mut self,
        events: &[StateEvent],
    ) -> impl Future<Output = Result<(), TransmitError>>;
}
