//! QEMU `virt` machine configuration. The allocatable region and the
//! device addresses are chosen here, by the boot configuration, not
//! computed by the core.

/// The PL011 UART
#[cfg(target_arch = "aarch64")]
mod uart;
#[cfg(target_arch = "aarch64")]
pub use uart::serial;

/// Cores this build coordinates; gate rings are sized from this, so it
/// must be a power of two
pub const MAX_CORES: usize = 8;

/// Coherency granule for control-block flushes
pub const CACHE_LINE_SIZE: usize = 64;

/// The control-block pool's raw region, above the loaded image
pub const POOL_BASE: usize = 0x4100_0000;
/// Pool span in bytes
pub const POOL_SIZE: usize = 0x0020_0000;
/// One allocation unit: a control block plus its core's stack
pub const POOL_UNIT: usize = 0x1000;

/// Wires up board devices. Must run before any other core is powered on
#[cfg(target_arch = "aarch64")]
pub fn init() {
    crate::call_once!();
    serial().init();
    crate::kernel::console::register(serial());
}
