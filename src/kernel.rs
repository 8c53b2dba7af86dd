/// Bitmaps over object slots
pub mod bitmap;
/// The serialized console
pub mod console;
/// The ticket gate
pub mod gate;
/// Main initialization sequences
#[cfg(target_arch = "aarch64")]
mod init;
/// The mutex trait and guard
mod mutex;
/// Things that should happen once
mod once;
/// Fixed-unit-size memory pools
pub mod pool;
/// Printing to serial output
pub mod print;
/// Bringing up the other cores
pub mod smp;

#[cfg(target_arch = "aarch64")]
pub use init::{pool, smp, try_smp};
pub use mutex::Guard as MutexGuard;
pub use mutex::Mutex;
pub use once::SetOnce;
