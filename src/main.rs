//! The kernel image: boots core 0, brings up the rest, and lets each
//! one talk through the gated console.

#![cfg_attr(target_arch = "aarch64", no_std)]
#![cfg_attr(target_arch = "aarch64", no_main)]

#[cfg(target_arch = "aarch64")]
use libkernel::{architecture, board, kernel, kernel::smp::CoreBlock, log};

/// What every started core runs: say hello and show the argument the
/// coordinator handed over
#[cfg(target_arch = "aarch64")]
fn announce(block: &mut CoreBlock) {
    log!(
        "core {}: arg({:#x}) block({:#x})",
        block.core,
        block.arg,
        architecture::machine::core_block(),
    );
}

/// The default main sequence
#[cfg(target_arch = "aarch64")]
#[no_mangle]
pub fn kernel_main() {
    let smp = kernel::smp();

    let online = smp.bring_up(board::MAX_CORES, announce, 0xa);
    // the power-on calls have returned, but give the latecomers time to
    // reach their announcement before dumping state
    while smp.online() < online {
        core::hint::spin_loop();
    }
    log!("smp bring-up complete: {} cores online", online);
    log!("{:?}", smp);
    log!("{:?}", kernel::pool());
    log!("{:?}", kernel::console::gate());

    // stay alive until someone presses a key
    while kernel::console::read_byte().is_none() {
        core::hint::spin_loop();
    }
}

/// Upon panics, print the location of the panic and any associated
/// message, then shut down
#[cfg(target_arch = "aarch64")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    if let Some(smp) = kernel::try_smp() {
        smp.mark_faulted(architecture::machine::core_id().into());
    }
    libkernel::println!("PANIC: {}", info);

    // Shutdown badly
    architecture::shutdown(1);
}

#[cfg(not(target_arch = "aarch64"))]
fn main() {}
