//! Outbound payload encoders
//!
//! Both encoders write JSON straight into a `core::fmt::Write` sink so the
//! board can render into a fixed `heapless::String`.

use core::fmt::{self, Write};

use hal_abstractions::{BatchMetadata, Sample, StateEvent};

/// Sample-batch format version
pub const SAMPLE_FORMAT_VERSION: u8 = 1;

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Render `{"entries":[[code,start,end],...]}`
pub fn write_state_events<W: Write>(out: &mut W, events: &[StateEvent]) -> fmt::Result {
    out.write_str("{\"entries\":[")?;
    for (i, event) in events.iter().enumerate() {
        if i > 0 {
            out.write_char(',')?;
        }
        write!(
            out,
            "[{},{},{}]",
            event.state_code(),
            event.start_time(),
            event.end_time()
        )?;
    }
    out.write_str("]}")
}

/// Render a sample batch with its packed little-endian payload in base64
pub fn write_sample_batch<W: Write>(
    out: &mut W,
    samples: &[Sample],
    metadata: &BatchMetadata,
) -> fmt::Result {
    out.write_str("{\"data\":\"")?;
    let mut encoder = Base64Encoder::new(&mut *out);
    for sample in samples {
        encoder.write_bytes(&sample.to_le_bytes())?;
    }
    encoder.finish()?;
    write!(
        out,
        "\",\"samples\":{},\"format\":{},\"rate_hz\":{},\"duration_ms\":{},\"timestamp\":{}}}",
        samples.len(),
        SAMPLE_FORMAT_VERSION,
        metadata.rate_hz,
        metadata.duration_ms,
        metadata.timestamp
    )
}

/// Length of the encoded sample-batch `data` field
pub const fn base64_len(bytes: usize) -> usize {
    bytes.div_ceil(3) * 4
}

/// Streaming standard-alphabet base64 with `=` padding
struct Base64Encoder<'a, W: Write> {
    out: &'a mut W,
    pending: [u8; 3],
    len: usize,
}

impl<'a, W: Write> Base64Encoder<'a, W> {
    fn new(out: &'a mut W) -> Self {
        Self {
            out,
            pending: [0; 3],
            len: 0,
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> fmt::Result {
        for &b in bytes {
            self.pending[self.len] = b;
            self.len += 1;
            if self.len == 3 {
                self.emit(3)?;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> fmt::Result {
        match self.len {
            0 => Ok(()),
            n => {
                self.pending[n..].fill(0);
                self.emit(n)
            }
        }
    }

    /// Encode the pending group holding `n` real bytes
    fn emit(&mut self, n: usize) -> fmt::Result {
        let [a, b, c] = self.pending;
        let chars = [
            a >> 2,
            ((a & 0x03) << 4) | (b >> 4),
            ((b & 0x0f) << 2) | (c >> 6),
            c & 0x3f,
        ];
        for (i, &idx) in chars.iter().enumerate() {
            let ch = if i <= n {
                BASE64_ALPHABET[idx as usize] as char
            } else {
                '='
            };
            self.out.write_char(ch)?;
        }
        self.len = 0;
        Ok(())
    }
}
