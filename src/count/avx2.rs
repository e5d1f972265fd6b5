use std::arch::x86_64::*;

use super::core::{LANE_BYTES, count_byte_scalar};

/// Independent byte-wide accumulators in the unrolled inner loop.
const UNROLL: usize = 4;

/// Lanes tallied per group between widening reductions: the largest
/// multiple of `UNROLL` not exceeding 255. A byte-wide tally holds at most
/// 255 matches before wrapping mod 256, and each of the `UNROLL` local
/// accumulators receives `GROUP_LANES / UNROLL` subtracts per group. The
/// same bound covers the post-group remainder: fewer than `GROUP_LANES`
/// whole lanes can remain, so one accumulator tallies them all without
/// wrapping. Re-derive this from the lane width and unroll depth if either
/// changes; never let a byte-wide tally wrap before it is flushed.
const GROUP_LANES: usize = (255 / UNROLL) * UNROLL;

/// Bytes consumed per group.
const GROUP_BYTES: usize = GROUP_LANES * LANE_BYTES;

/// Count bytes equal to `needle` with AVX2.
///
/// Comparison and tally share one instruction pair per lane:
/// `_mm256_cmpeq_epi8` yields 0xFF per matching byte and `_mm256_sub_epi8`
/// of that mask increments the accumulator lane by 1 in two's-complement
/// byte arithmetic. `_mm256_sad_epu8` against zero widens the byte tallies
/// into 64-bit partials once per group.
///
/// Loads are `vmovdqu`: penalty-free on the 32-byte-aligned chunks the
/// streaming driver hands over, and still fault-free for arbitrary slices
/// (mmap'd files, test inputs). Only the fast path wants alignment;
/// correctness never does.
///
/// # Safety
/// The caller must verify AVX2 support.
#[target_feature(enable = "avx2")]
pub unsafe fn count_byte_avx2(haystack: &[u8], needle: u8) -> u64 {
    unsafe {
        let n = haystack.len();
        let mut p = haystack.as_ptr();

        let nv = _mm256_set1_epi8(needle as i8);
        let zero = _mm256_setzero_si256();

        // Persistent 64-bit partial sums.
        let mut sum = zero;

        // Full groups.
        let group_end = p.add(n - n % GROUP_BYTES);
        while p != group_end {
            let mut x0 = zero;
            let mut x1 = zero;
            let mut x2 = zero;
            let mut x3 = zero;

            let lane_end = p.add(GROUP_BYTES);
            while p != lane_end {
                let m0 = _mm256_loadu_si256(p.add(0 * LANE_BYTES) as *const __m256i);
                let m1 = _mm256_loadu_si256(p.add(1 * LANE_BYTES) as *const __m256i);
                let m2 = _mm256_loadu_si256(p.add(2 * LANE_BYTES) as *const __m256i);
                let m3 = _mm256_loadu_si256(p.add(3 * LANE_BYTES) as *const __m256i);

                x0 = _mm256_sub_epi8(x0, _mm256_cmpeq_epi8(m0, nv));
                x1 = _mm256_sub_epi8(x1, _mm256_cmpeq_epi8(m1, nv));
                x2 = _mm256_sub_epi8(x2, _mm256_cmpeq_epi8(m2, nv));
                x3 = _mm256_sub_epi8(x3, _mm256_cmpeq_epi8(m3, nv));

                p = p.add(UNROLL * LANE_BYTES);
            }

            // Flush before any byte lane could wrap.
            sum = _mm256_add_epi64(sum, _mm256_sad_epu8(x0, zero));
            sum = _mm256_add_epi64(sum, _mm256_sad_epu8(x1, zero));
            sum = _mm256_add_epi64(sum, _mm256_sad_epu8(x2, zero));
            sum = _mm256_add_epi64(sum, _mm256_sad_epu8(x3, zero));
        }

        // Leftover whole lanes: fewer than GROUP_LANES of them, so a single
        // local accumulator is bounded and is widened exactly once.
        let lane_remain = n % GROUP_BYTES - n % LANE_BYTES;
        if lane_remain != 0 {
            let mut acc = zero;
            let lane_end = p.add(lane_remain);
            while p != lane_end {
                let m = _mm256_loadu_si256(p as *const __m256i);
                acc = _mm256_sub_epi8(acc, _mm256_cmpeq_epi8(m, nv));
                p = p.add(LANE_BYTES);
            }
            sum = _mm256_add_epi64(sum, _mm256_sad_epu8(acc, zero));
        }

        // Sub-lane tail: a partial vector load would read past the slice,
        // so the last few bytes always take the scalar loop.
        hsum_epu64(sum) + count_byte_scalar(&haystack[n - n % LANE_BYTES..], needle)
    }
}

/// Horizontal sum of the four 64-bit lanes.
#[target_feature(enable = "avx2")]
unsafe fn hsum_epu64(v: __m256i) -> u64 {
    unsafe {
        let lo = _mm256_castsi256_si128(v);
        let hi = _mm256_extracti128_si256::<1>(v);
        let pair = _mm_add_epi64(lo, hi);
        let folded = _mm_add_epi64(pair, _mm_unpackhi_epi64(pair, pair));
        _mm_cvtsi128_si64(folded) as u64
    }
}
