//! One-shot accelerometer acquisition buffer

use embedded_hal_async::delay::DelayNs;
use heapless::Vec;

use hal_abstractions::{Accelerometer, Sample};

use crate::config::MAX_SAMPLES_PER_ACQUISITION;
use crate::logging::{debug, warn};

/// Fallback sample spacing when the sensor reports no usable rate
const DEFAULT_INTERVAL_MS: u32 = 1000;

/// Outcome of [`AcquisitionBuffer::collect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AcquisitionSummary {
    pub collected: usize,
    pub failed_reads: u32,
    pub elapsed_ms: u32,
}

/// Fixed-capacity, ordered sample buffer
#[derive(Debug)]
pub struct AcquisitionBuffer<const N: usize = MAX_SAMPLES_PER_ACQUISITION> {
    samples: Vec<Sample, N>,
    limit: usize,
}

impl<const N: usize> AcquisitionBuffer<N> {
    /// Buffer holding at most `limit` samples (clamped to `1..=N`)
    pub fn new(limit: usize) -> Self {
        Self {
            samples: Vec::new(),
            limit: limit.clamp(1, N.max(1)),
        }
    }

    /// Add a sample; `false` when the buffer is full
    pub fn push(&mut self, sample: Sample) -> bool {
        if self.is_full() {
            return false;
        }
        self.samples.push(sample).is_ok()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.limit
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Sample `accel` at its output data rate for `duration_ms`
    ///
    /// Stops early once the buffer is full. Failed reads are skipped and
    /// counted; the buffer is cleared before collection starts.
    pub async fn collect<A, D>(
        &mut self,
        accel: &mut A,
        delay: &mut D,
        duration_ms: u32,
    ) -> AcquisitionSummary
    where
        A: Accelerometer,
        D: DelayNs,
    {
        self.clear();
        let interval_ms = sample_interval_ms(accel.output_data_rate_hz());
        let mut summary = AcquisitionSummary::default();

        debug!(
            "acquisition: {} ms window, {} ms spacing, limit {}",
            duration_ms, interval_ms, self.limit
        );

        while summary.elapsed_ms < duration_ms && !self.is_full() {
            match accel.read_sample().await {
                Ok(sample) => {
                    self.push(sample);
                }
                Err(e) => {
                    summary.failed_reads = summary.failed_reads.saturating_add(1);
                    warn!("accelerometer read failed: {:?}", e);
                }
            }
            delay.delay_ms(interval_ms).await;
            summary.elapsed_ms = summary.elapsed_ms.saturating_add(interval_ms);
        }

        summary.collected = self.samples.len();
        summary
    }
}

/// Milliseconds between samples at `rate_hz`, at least 1
fn sample_interval_ms(rate_hz: f32) -> u32 {
    if !rate_hz.is_finite() || rate_hz <= 0.0 {
        return DEFAULT_INTERVAL_MS;
    }
    ((1000.0 / rate_hz) as u32).max(1)
}
