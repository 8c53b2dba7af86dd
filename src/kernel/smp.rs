use crate::{
    board, log,
    kernel::pool::{Pool, PoolError},
};
use core::{
    fmt, mem,
    sync::atomic::{AtomicU8, AtomicUsize, Ordering},
};

/// The narrow platform-capability surface the coordinator needs, so the
/// bring-up logic stays hardware-agnostic: one call to power on a named
/// core, and one to push a dirty line to the point of coherency (a
/// freshly powered-on core reads its control block with caches off).
pub trait Platform {
    /// Powers on `core` at the fixed trampoline `entry`, handing it
    /// `context` as its opaque startup argument
    fn power_on(&self, core: usize, entry: usize, context: usize) -> Result<(), PowerError>;

    /// Cleans the cache line holding `addr` to the point of coherency
    fn flush_cache_line(&self, addr: usize);
}

/// Status codes from the platform power-on service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerError {
    /// The service is not implemented by the firmware
    NotSupported,
    /// Bad core id or entry address
    InvalidParameters,
    /// The firmware refused the request
    Denied,
    /// The target core is already powered on
    AlreadyOn,
    /// A previous power-on of this core is still pending
    OnPending,
    /// The firmware failed internally
    InternalFailure,
    /// No such core exists on this machine
    NotPresent,
    /// The entry address is not valid for the target core
    InvalidAddress,
    /// An unrecognized status code
    Unknown,
}

impl fmt::Display for PowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSupported => write!(f, "power-on not supported"),
            Self::InvalidParameters => write!(f, "invalid power-on parameters"),
            Self::Denied => write!(f, "power-on denied"),
            Self::AlreadyOn => write!(f, "core is already on"),
            Self::OnPending => write!(f, "power-on already pending"),
            Self::InternalFailure => write!(f, "firmware internal failure"),
            Self::NotPresent => write!(f, "core not present"),
            Self::InvalidAddress => write!(f, "invalid entry address"),
            Self::Unknown => write!(f, "unrecognized power-on status"),
        }
    }
}

/// Why a core could not be started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmpError {
    /// The requested id is outside the configured core count
    NoSuchCore,
    /// The requested core already left the unstarted state
    AlreadyStarted,
    /// No control block could be allocated
    Pool(PoolError),
    /// The platform power-on call failed
    Power(PowerError),
}

impl fmt::Display for SmpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchCore => write!(f, "no such core"),
            Self::AlreadyStarted => write!(f, "core already started"),
            Self::Pool(err) => write!(f, "control block allocation failed: {err}"),
            Self::Power(err) => write!(f, "power-on failed: {err}"),
        }
    }
}

/// Where a core is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoreState {
    /// Never started
    Unstarted = 0,
    /// Power-on issued, trampoline not yet reached
    PoweringOn = 1,
    /// Executing its assigned function (or parked after it returned)
    Running = 2,
    /// Marked dead by a fault path
    Faulted = 3,
}

impl CoreState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::PoweringOn,
            2 => Self::Running,
            3 => Self::Faulted,
            _ => Self::Unstarted,
        }
    }
}

/// A started core's control block, allocated from the pool as a single
/// unit: the block sits at the bottom of the unit and the core's stack
/// grows down from the unit's top. Once the core is powered on, the
/// block belongs to that core alone.
#[repr(C)]
pub struct CoreBlock {
    /// Initial stack pointer; the trampoline loads SP from the first
    /// field, so it must stay first
    pub stack_top: usize,
    /// Logical core id
    pub core: usize,
    /// The function this core runs
    pub entry: fn(&mut CoreBlock),
    /// Opaque argument for `entry`
    pub arg: usize,
    /// The coordinator's state word for this core
    state: *const AtomicU8,
}

/// Brings up secondary cores: allocates each a control block from the
/// pool, points the platform power-on service at the trampoline, and
/// tracks per-core lifecycle state.
///
/// Built explicitly (no implicit global); the kernel stores its one
/// instance in a `SetOnce` during initialization. The coordinator must
/// outlive every core it starts, since running cores hold pointers into
/// its state table.
pub struct Coordinator<'pool, P: Platform> {
    /// Control blocks come from here
    pool: &'pool Pool<'pool>,
    /// The power-on capability
    platform: P,
    /// Fixed trampoline entry address handed to `power_on`
    entry_point: usize,
    /// Cores beyond this id are refused
    max_cores: usize,
    /// Next id for auto-selected starts; 0 is the boot core
    next_core: AtomicUsize,
    /// Lifecycle state per core
    states: [AtomicU8; board::MAX_CORES],
}

impl<'pool, P: Platform> Coordinator<'pool, P> {
    /// Creates a coordinator with the boot core already running
    pub fn new(pool: &'pool Pool<'pool>, platform: P, max_cores: usize, entry_point: usize) -> Self {
        assert!(max_cores <= board::MAX_CORES);
        let states = [const { AtomicU8::new(CoreState::Unstarted as u8) }; board::MAX_CORES];
        states[0].store(CoreState::Running as u8, Ordering::Relaxed);
        Self {
            pool,
            platform,
            entry_point,
            max_cores,
            next_core: AtomicUsize::new(1),
            states,
        }
    }

    /// Powers on one core and hands it `entry` and `arg`.
    ///
    /// With `target == None` the next unused id is selected. The id is
    /// validated and claimed before any allocation, so a refused start
    /// never consumes a control block. On a power-on failure the block
    /// is returned to the pool and the core is left unstarted.
    pub fn start_core(
        &self,
        target: Option<usize>,
        entry: fn(&mut CoreBlock),
        arg: usize,
    ) -> Result<usize, SmpError> {
        let core = target.unwrap_or_else(|| self.next_core.fetch_add(1, Ordering::Relaxed));
        if core >= self.max_cores {
            return Err(SmpError::NoSuchCore);
        }
        self.states[core]
            .compare_exchange(
                CoreState::Unstarted as u8,
                CoreState::PoweringOn as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| SmpError::AlreadyStarted)?;

        let block = match self.pool.allocate(1) {
            Ok(block) => block,
            Err(err) => {
                self.states[core].store(CoreState::Unstarted as u8, Ordering::Release);
                return Err(SmpError::Pool(err));
            }
        };
        let context = self.pool.block_ptr(&block).cast::<CoreBlock>();
        // SAFETY: The block is a whole unit, exclusively ours until the
        // new core takes it over
        unsafe {
            context.write(CoreBlock {
                stack_top: context as usize + self.pool.unit_size(),
                core,
                entry,
                arg,
                state: &self.states[core],
            });
        }
        // The target core starts with its caches off and reads the
        // block through memory
        let mut line = context as usize;
        while line < context as usize + mem::size_of::<CoreBlock>() {
            self.platform.flush_cache_line(line);
            line += board::CACHE_LINE_SIZE;
        }

        match self.platform.power_on(core, self.entry_point, context as usize) {
            Ok(()) => Ok(core),
            Err(err) => {
                log!("core {} power-on failed: {}", core, err);
                let _ = self.pool.free(block, false);
                self.states[core].store(CoreState::Unstarted as u8, Ordering::Release);
                Err(SmpError::Power(err))
            }
        }
    }

    /// Starts auto-selected cores until `max` are online or a start
    /// fails. Returns the number of cores online, the boot core
    /// included.
    pub fn bring_up(&self, max: usize, entry: fn(&mut CoreBlock), arg: usize) -> usize {
        let mut online = 1;
        while online < max.min(self.max_cores) {
            if self.start_core(None, entry, arg).is_err() {
                break;
            }
            online += 1;
        }
        online
    }

    /// This core's lifecycle state
    pub fn state(&self, core: usize) -> CoreState {
        CoreState::from_u8(self.states[core].load(Ordering::Acquire))
    }

    /// Records that a core died in a fault path
    pub fn mark_faulted(&self, core: usize) {
        if core < self.max_cores {
            self.states[core].store(CoreState::Faulted as u8, Ordering::Release);
        }
    }

    /// Number of cores currently marked running
    pub fn online(&self) -> usize {
        (0..self.max_cores)
            .filter(|&core| self.state(core) == CoreState::Running)
            .count()
    }
}

impl<P: Platform> fmt::Debug for Coordinator<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Coordinator {{ cores: [")?;
        for core in 0..self.max_cores {
            if core > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:?}", self.state(core))?;
        }
        write!(f, "], pool: {} }}", self.pool.name())
    }
}

/// What a freshly powered-on core runs once the trampoline has given it
/// a stack and anchored its control block: announce, mark running, and
/// execute the assigned function. There is no scheduler to return to,
/// so afterwards the core parks in a low-power wait.
#[cfg(target_arch = "aarch64")]
#[no_mangle]
extern "C" fn smp_core_entry(block: *mut CoreBlock) -> ! {
    use crate::architecture::machine;

    // SAFETY: The coordinator handed this core exclusive ownership of
    // its control block before powering it on
    let block = unsafe { &mut *block };
    // SAFETY: The state word lives in the coordinator, which outlives
    // every started core
    unsafe {
        (*block.state).store(CoreState::Running as u8, Ordering::Release);
    }
    log!(
        "core {} up: el{} sp({:#x})",
        block.core,
        machine::exception_level(),
        machine::stack_pointer(),
    );
    (block.entry)(block);

    loop {
        aarch64_cpu::asm::wfi();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::pool::Pool;
    use std::{boxed::Box, sync::Mutex, vec::Vec};

    #[repr(align(4096))]
    struct Arena([u8; 0x20000]);

    fn pool() -> &'static Pool<'static> {
        let region = &mut Box::leak(Box::new(Arena([0_u8; 0x20000]))).0[..];
        Box::leak(Box::new(Pool::create("cores", region, 0x1000, true).unwrap()))
    }

    /// Records power-on requests instead of starting real cores
    struct MockPlatform {
        calls: Mutex<Vec<(usize, usize, usize)>>,
        fail_from: Option<usize>,
        flushes: AtomicUsize,
    }

    impl MockPlatform {
        fn new(fail_from: Option<usize>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_from,
                flushes: AtomicUsize::new(0),
            }
        }
    }

    impl Platform for &MockPlatform {
        fn power_on(&self, core: usize, entry: usize, context: usize) -> Result<(), PowerError> {
            if self.fail_from.is_some_and(|from| core >= from) {
                return Err(PowerError::Denied);
            }
            self.calls.lock().unwrap().push((core, entry, context));
            Ok(())
        }

        fn flush_cache_line(&self, _addr: usize) {
            self.flushes.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn noop(_: &mut CoreBlock) {}

    const ENTRY_POINT: usize = 0x8_0000;

    #[test]
    fn auto_ids_count_up_from_one() {
        let platform = MockPlatform::new(None);
        let smp = Coordinator::new(pool(), &platform, 8, ENTRY_POINT);
        assert_eq!(smp.start_core(None, noop, 0).unwrap(), 1);
        assert_eq!(smp.start_core(None, noop, 0).unwrap(), 2);
        assert_eq!(smp.state(1), CoreState::PoweringOn);
        let calls = platform.calls.lock().unwrap();
        assert_eq!(calls[0].0, 1);
        assert_eq!(calls[0].1, ENTRY_POINT);
    }

    #[test]
    fn control_block_is_populated() {
        let pool = pool();
        let platform = MockPlatform::new(None);
        let smp = Coordinator::new(pool, &platform, 8, ENTRY_POINT);
        smp.start_core(None, noop, 0xa5).unwrap();

        let (_, _, context) = platform.calls.lock().unwrap()[0];
        // SAFETY: the mock never powers a real core, so the block is
        // still ours to inspect
        let block = unsafe { &*(context as *const CoreBlock) };
        assert_eq!(block.stack_top, context + pool.unit_size());
        assert_eq!(block.core, 1);
        assert_eq!(block.arg, 0xa5);
        assert_eq!(block.entry as usize, noop as usize);
        assert!(core::ptr::eq(block.state, &smp.states[1]));
        assert!(platform.flushes.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn explicit_target_and_duplicate_start() {
        let platform = MockPlatform::new(None);
        let smp = Coordinator::new(pool(), &platform, 8, ENTRY_POINT);
        assert_eq!(smp.start_core(Some(5), noop, 0).unwrap(), 5);
        assert_eq!(
            smp.start_core(Some(5), noop, 0).unwrap_err(),
            SmpError::AlreadyStarted
        );
        // the boot core is running and may not be restarted
        assert_eq!(
            smp.start_core(Some(0), noop, 0).unwrap_err(),
            SmpError::AlreadyStarted
        );
    }

    #[test]
    fn refuses_one_past_the_last_core_without_allocating() {
        let pool = pool();
        let platform = MockPlatform::new(None);
        let smp = Coordinator::new(pool, &platform, 8, ENTRY_POINT);
        for _ in 1..8 {
            smp.start_core(None, noop, 0).unwrap();
        }
        let occupied = pool.occupied();
        assert_eq!(smp.start_core(None, noop, 0).unwrap_err(), SmpError::NoSuchCore);
        assert_eq!(pool.occupied(), occupied);
    }

    #[test]
    fn power_failure_rolls_back() {
        let pool = pool();
        let platform = MockPlatform::new(Some(2));
        let smp = Coordinator::new(pool, &platform, 8, ENTRY_POINT);
        smp.start_core(None, noop, 0).unwrap();
        let occupied = pool.occupied();
        assert!(matches!(
            smp.start_core(None, noop, 0).unwrap_err(),
            SmpError::Power(PowerError::Denied)
        ));
        assert_eq!(pool.occupied(), occupied);
        assert_eq!(smp.state(2), CoreState::Unstarted);
    }

    #[test]
    fn bring_up_stops_at_first_failure() {
        let platform = MockPlatform::new(Some(3));
        let smp = Coordinator::new(pool(), &platform, 8, ENTRY_POINT);
        // cores 1 and 2 start, core 3 is refused
        assert_eq!(smp.bring_up(8, noop, 0), 3);
    }

    #[test]
    fn bring_up_honors_the_requested_maximum() {
        let platform = MockPlatform::new(None);
        let smp = Coordinator::new(pool(), &platform, 8, ENTRY_POINT);
        assert_eq!(smp.bring_up(4, noop, 0), 4);
        assert_eq!(platform.calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn fault_marking() {
        let platform = MockPlatform::new(None);
        let smp = Coordinator::new(pool(), &platform, 8, ENTRY_POINT);
        smp.start_core(None, noop, 0).unwrap();
        smp.mark_faulted(1);
        assert_eq!(smp.state(1), CoreState::Faulted);
        assert_eq!(smp.online(), 1);
    }
}
