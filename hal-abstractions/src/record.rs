//! Records exchanged between the scheduler and the board
//!
//! All times are Unix seconds in `u32`.

/// Contiguous interval of constant classifier output
///
/// The only way to build one is [`StateEvent::new`], so `start_time <= end_time`
/// holds for every value of this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StateEvent {
    start_time: u32,
    end_time: u32,
    state_code: u8,
}

impl StateEvent {
    /// Build an event, rejecting intervals that end before they start
    pub const fn new(start_time: u32, end_time: u32, state_code: u8) -> Result<Self, MalformedEvent> {
        if end_time < start_time {
            return Err(MalformedEvent {
                start_time,
                end_time,
            });
        }
        Ok(Self {
            start_time,
            end_time,
            state_code,
        })
    }

    /// Interval start (Unix seconds)
    pub const fn start_time(&self) -> u32 {
        self.start_time
    }

    /// Interval end (Unix seconds)
    pub const fn end_time(&self) -> u32 {
        self.end_time
    }

    /// Classifier output held during the interval
    pub const fn state_code(&self) -> u8 {
        self.state_code
    }

    pub const fn duration_secs(&self) -> u32 {
        self.end_time - self.start_time
    }
}

/// Interval whose end lies before its start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MalformedEvent {
    pub start_time: u32,
    pub end_time: u32,
}

impl core::fmt::Display for MalformedEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "event ends at {} before it starts at {}",
            self.end_time, self.start_time
        )
    }
}

impl core::error::Error for MalformedEvent {}

/// One 3-axis accelerometer reading in milli-g
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Sample {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Packed little-endian `x, y, z` as sent on the wire
    pub fn to_le_bytes(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[0..4].copy_from_slice(&self.x.to_le_bytes());
        out[4..8].copy_from_slice(&self.y.to_le_bytes());
        out[8..12].copy_from_slice(&self.z.to_le_bytes());
        out
    }
}

/// Description of an acquisition batch
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatchMetadata {
    /// Sampling rate the batch was collected at
    pub rate_hz: f32,
    /// Configured acquisition window
    pub duration_ms: u32,
    /// Unix seconds at the start of acquisition, 0 when the clock was unset
    pub timestamp: u32,
}
