use std::io::{self, Read};

use thiserror::Error;

use crate::common::io::{AlignedBuf, BUF_ALIGN, page_size, read_full};

use super::core::{LANE_BYTES, count_byte};

/// A streaming count failed. Partial totals are never surfaced: a count
/// must not understate the true value without signalling failure.
#[derive(Debug, Error)]
pub enum CountError {
    /// Aligned buffer allocation failed, before any read occurred.
    #[error("cannot allocate read buffer: {0}")]
    Alloc(#[source] io::Error),
    /// The stream reported a genuine error mid-count (end-of-stream is not
    /// an error). Assumed non-transient; no retry beyond EINTR.
    #[error("read error: {0}")]
    Read(#[source] io::Error),
}

/// Default driver buffer capacity: 32 pages, rounded down to whole SIMD
/// lanes. Size trades read-syscall frequency against cache residency; any
/// positive lane multiple is functionally correct.
pub fn default_capacity() -> usize {
    (32 * page_size()) & !(LANE_BYTES - 1)
}

/// Count bytes equal to `needle` in everything `reader` yields.
pub fn count_stream(reader: &mut impl Read, needle: u8) -> Result<u64, CountError> {
    count_stream_with_capacity(reader, needle, default_capacity())
}

/// As [`count_stream`], with an explicit buffer capacity (rounded up to a
/// positive multiple of the lane width).
///
/// One reusable aligned buffer is filled to capacity per iteration and the
/// filled chunk — full or partial — goes through the kernel. The total is
/// chunk-boundary independent, so any capacity yields the same count.
pub fn count_stream_with_capacity(
    reader: &mut impl Read,
    needle: u8,
    capacity: usize,
) -> Result<u64, CountError> {
    let cap = capacity.max(LANE_BYTES).next_multiple_of(LANE_BYTES);
    let mut buf = AlignedBuf::new(cap, BUF_ALIGN).map_err(CountError::Alloc)?;

    let mut total: u64 = 0;
    loop {
        let n = read_full(reader, &mut buf).map_err(CountError::Read)?;
        total += count_byte(&buf[..n], needle);
        if n < cap {
            // read_full only returns short at end of stream.
            return Ok(total);
        }
    }
}
