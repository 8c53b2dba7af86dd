//! The PSCI (Power State Coordination Interface) conduit.
//!
//! QEMU's `virt` machine exposes PSCI 0.2 over `hvc`; `CPU_ON` is how a
//! named core is pointed at the secondary trampoline with its control
//! block as context.
//!
//! Reference: ARM DEN0022D

use crate::kernel::smp::{Platform, PowerError};
use core::arch::asm;

/// Get the PSCI version (major in the upper half, minor in the lower)
const PSCI_VERSION: u32 = 0x8400_0000;

/// CPU_ON, SMC64 calling convention
const CPU_ON_64: u32 = 0xC400_0003;

/// Issues a PSCI call via `hvc`, which traps to the QEMU-provided
/// firmware.
///
/// # Safety
/// The function id and arguments must form a valid PSCI request.
unsafe fn psci_call(function: u32, arg0: u64, arg1: u64, arg2: u64) -> i64 {
    let result: i64;
    // SAFETY: The caller guarantees this is a well-formed PSCI request
    unsafe {
        asm!(
            "hvc #0",
            inout("x0") u64::from(function) => result,
            inout("x1") arg0 => _,
            inout("x2") arg1 => _,
            inout("x3") arg2 => _,
            options(nomem, nostack)
        );
    }
    result
}

/// The firmware's PSCI version, as (major, minor)
pub fn version() -> (u16, u16) {
    // SAFETY: PSCI_VERSION takes no arguments and is always safe
    let version = unsafe { psci_call(PSCI_VERSION, 0, 0, 0) };
    (((version >> 16) & 0xffff) as u16, (version & 0xffff) as u16)
}

fn status_to_error(status: i64) -> PowerError {
    match status {
        -1 => PowerError::NotSupported,
        -2 => PowerError::InvalidParameters,
        -3 => PowerError::Denied,
        -4 => PowerError::AlreadyOn,
        -5 => PowerError::OnPending,
        -6 => PowerError::InternalFailure,
        -7 => PowerError::NotPresent,
        -9 => PowerError::InvalidAddress,
        _ => PowerError::Unknown,
    }
}

/// The real platform capability: PSCI power-on plus cache maintenance
pub struct Psci;

impl Platform for Psci {
    fn power_on(&self, core: usize, entry: usize, context: usize) -> Result<(), PowerError> {
        // SAFETY: The coordinator passes the trampoline's address and a
        // fully-written control block
        let status = unsafe { psci_call(CPU_ON_64, core as u64, entry as u64, context as u64) };
        if status == 0 {
            Ok(())
        } else {
            Err(status_to_error(status))
        }
    }

    fn flush_cache_line(&self, addr: usize) {
        // Clean to the point of coherency; the started core reads its
        // control block before its caches are on
        // SAFETY: dc cvac on a valid address has no other effect
        unsafe {
            asm!("dc cvac, {0}", "dsb sy", in(reg) addr, options(nostack));
        }
    }
}
