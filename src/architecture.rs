// Architecture-specific (ARM) code. The machine and time modules keep
// host-buildable fallbacks so the core crate unit-tests anywhere.

/// The boot and secondary-core entry assembly
#[cfg(target_arch = "aarch64")]
pub mod boot;
/// Identifying the executing core
pub mod machine;
/// The firmware power interface
#[cfg(target_arch = "aarch64")]
pub mod psci;
/// Stopping the machine
#[cfg(target_arch = "aarch64")]
mod shutdown;
/// The counter-based clock
pub mod time;

#[cfg(target_arch = "aarch64")]
pub use shutdown::shutdown;
