#[cfg(target_arch = "aarch64")]
use aarch64_cpu::registers::{CurrentEL, MPIDR_EL1, SP, TPIDR_EL1};
#[cfg(target_arch = "aarch64")]
use tock_registers::interfaces::Readable;

/// This core's id (affinity level 0)
#[cfg(target_arch = "aarch64")]
pub fn core_id() -> u8 {
    (MPIDR_EL1.get() & 0xff).try_into().unwrap()
}

/// Off-target there is exactly one "core"
#[cfg(not(target_arch = "aarch64"))]
pub fn core_id() -> u8 {
    0
}

/// The current exception level
#[cfg(target_arch = "aarch64")]
pub fn exception_level() -> u64 {
    CurrentEL.read(CurrentEL::EL)
}

/// The current stack pointer
#[cfg(target_arch = "aarch64")]
pub fn stack_pointer() -> u64 {
    SP.get()
}

/// The control block this core was started with; the trampoline anchors
/// it in TPIDR_EL1 before any Rust runs on the core. Zero on the boot
/// core, which has no control block.
#[cfg(target_arch = "aarch64")]
pub fn core_block() -> u64 {
    TPIDR_EL1.get()
}
