use memchr::memchr_iter;

/// The byte the CLI counts: newline, with no character-encoding
/// interpretation — a count of 0x0A bytes in the raw stream.
pub const NEWLINE: u8 = b'\n';

/// Bytes per SIMD lane of the widest kernel (one AVX2 register). Buffers
/// sized in whole lanes let the vector paths cover everything but a
/// sub-lane tail.
pub const LANE_BYTES: usize = 32;

/// Count bytes equal to `needle` in `haystack`.
///
/// Pure and total: no I/O, no allocation, no side effects, and defined for
/// every length including zero. Dispatches to the hand-vectorized AVX2
/// kernel when the CPU has it, otherwise to memchr's portable SIMD search.
/// Every tier agrees with [`count_byte_scalar`] on every input.
#[inline]
pub fn count_byte(haystack: &[u8], needle: u8) -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        if std::arch::is_x86_feature_detected!("avx2") {
            // SAFETY: AVX2 support verified at runtime.
            return unsafe { super::avx2::count_byte_avx2(haystack, needle) };
        }
    }
    memchr_iter(needle, haystack).count() as u64
}

/// Byte-by-byte reference count: the oracle the vectorized tiers are tested
/// against, and the tail loop they defer to for sub-lane leftovers.
#[inline]
pub fn count_byte_scalar(haystack: &[u8], needle: u8) -> u64 {
    let mut count = 0u64;
    for &b in haystack {
        count += (b == needle) as u64;
    }
    count
}
