pub mod core;
pub mod stream;

#[cfg(target_arch = "x86_64")]
mod avx2;


pub use self::core::*;
pub use self::stream::*;
