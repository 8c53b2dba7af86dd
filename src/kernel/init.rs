use crate::{
    architecture::{self, boot, psci::Psci},
    board, call_once,
    kernel::{pool::Pool, smp::Coordinator, SetOnce},
    log,
};

extern "Rust" {
    /// The image's main sequence, supplied by the kernel binary
    fn kernel_main();
}

/// The one control-block pool, built explicitly during init
static POOL: SetOnce<Pool<'static>> = SetOnce::new();
/// The one SMP coordinator, built explicitly during init
static SMP: SetOnce<Coordinator<'static, Psci>> = SetOnce::new();

/// Global initialization of the system. The boot assembly lands here on
/// the boot core only; secondary cores enter through the trampoline
/// once the coordinator powers them on.
#[no_mangle]
pub extern "C" fn kernel_init() -> ! {
    // This is the global initialization sequence; it should only run once
    call_once!();

    board::init();

    let (major, minor) = architecture::psci::version();
    log!(
        "virt-os el{} psci {}.{}",
        architecture::machine::exception_level(),
        major,
        minor
    );

    // SAFETY: The board constants name RAM that nothing else uses
    let region =
        unsafe { core::slice::from_raw_parts_mut(board::POOL_BASE as *mut u8, board::POOL_SIZE) };
    POOL.set(
        Pool::create("pool4k", region, board::POOL_UNIT, true)
            .expect("the static pool geometry must be valid"),
    );
    log!("{:?}", POOL.get());

    SMP.set(Coordinator::new(
        POOL.get(),
        Psci,
        board::MAX_CORES,
        boot::secondary_entry(),
    ));

    // SAFETY: This is the one call of the main sequence
    unsafe { kernel_main() };

    architecture::shutdown(0)
}

/// The system-wide control-block pool
pub fn pool() -> &'static Pool<'static> {
    POOL.get()
}

/// The system-wide SMP coordinator
pub fn smp() -> &'static Coordinator<'static, Psci> {
    SMP.get()
}

/// The coordinator, if initialization got far enough to build it;
/// fault paths use this to avoid panicking inside the panic path
pub fn try_smp() -> Option<&'static Coordinator<'static, Psci>> {
    SMP.try_get()
}
