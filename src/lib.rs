#![allow(clippy::identity_op)]

/// Use mimalloc as the global allocator.
/// 2-3x faster than glibc malloc for small allocations and keeps the
/// one large aligned buffer allocation cheap to acquire and release.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod common;
pub mod count;
