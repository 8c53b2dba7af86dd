use crate::kernel::{Mutex, MutexGuard};
use core::{
    cell::{Cell, UnsafeCell},
    fmt,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

/// A single-token mutual-exclusion queue based on the "take a ticket"
/// system found in stores and post offices: arrivals take the next
/// ticket and wait to be served in first-come first-served order.
///
/// Being served is signaled by a nonzero value in the ring at the
/// ticket's slot. Each waiter polls its own slot, so contending cores
/// poll addresses spread across the ring instead of hammering one
/// shared flag with cache-coherence traffic.
///
/// The ring starts holding a single token at slot 0; exactly one token
/// circulates in the steady state, which is what makes this a mutex.
/// The ring length must be a power of two and at least the number of
/// cores that can contend.
pub struct TicketGate<const N: usize> {
    /// One slot per outstanding ticket; nonzero means "now serving"
    ring: [AtomicU64; N],
    /// The next ticket to hand out; only ever increases
    next_ticket: AtomicUsize,
}

/// Proof of admission through a [`TicketGate`], needed to release it.
///
/// Holds the advanced ring index: releasing stores the token at
/// `ticket % N`, which is the slot the *next* arrival is polling.
#[must_use]
#[derive(Debug, PartialEq)]
pub struct Ticket(usize);

/// How long `acquire_spinning` is willing to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinPolicy {
    /// Spin until admitted, however long that takes
    Forever,
    /// Give up after this many polls
    Bounded(usize),
}

/// The gate did not open within the configured spin budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateTimeout;

impl fmt::Display for GateTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gate not acquired within spin budget")
    }
}

/// Waits for the gate's token to show up
fn relax() {
    core::hint::spin_loop();
    // The releaser follows its token store with an `sev`, so the event
    // register catches a token posted between the poll and the `wfe`
    #[cfg(target_arch = "aarch64")]
    aarch64_cpu::asm::wfe();
}

/// Notifies waiting cores that the token moved
fn wake() {
    #[cfg(target_arch = "aarch64")]
    aarch64_cpu::asm::sev();
}

impl<const N: usize> TicketGate<N> {
    /// Creates a gate with one token ready and no tickets issued
    pub const fn new() -> Self {
        assert!(N.is_power_of_two(), "ring length must be a power of two");
        let mut ring = [const { AtomicU64::new(0) }; N];
        ring[0] = AtomicU64::new(1);
        Self {
            ring,
            next_ticket: AtomicUsize::new(0),
        }
    }

    /// Takes the next ticket and spins until it is served.
    ///
    /// Admission is in strict arrival order. There is no timeout on this
    /// path: if the current holder never releases, this spins forever.
    pub fn acquire(&self) -> Ticket {
        let slot = self.next_ticket.fetch_add(1, Ordering::Relaxed) & (N - 1);
        while self.ring[slot].load(Ordering::Acquire) == 0 {
            relax();
        }
        self.ring[slot].store(0, Ordering::Relaxed);
        Ticket(slot + 1)
    }

    /// Claims the gate only if it would be admitted immediately.
    ///
    /// A ticket, once taken, cannot be handed back without deadlocking
    /// the queue behind it, so this only commits to a ticket (by
    /// compare-exchange) when that ticket's token is already present.
    pub fn try_acquire(&self) -> Option<Ticket> {
        let end = self.next_ticket.load(Ordering::Relaxed);
        let slot = end & (N - 1);
        if self.ring[slot].load(Ordering::Acquire) == 0 {
            return None;
        }
        if self
            .next_ticket
            .compare_exchange(end, end.wrapping_add(1), Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }
        self.ring[slot].store(0, Ordering::Relaxed);
        Some(Ticket(slot + 1))
    }

    /// Acquires under an explicit spin policy.
    ///
    /// The bounded path repeats [`TicketGate::try_acquire`], so it does
    /// not join the FIFO queue: it trades the arrival-order guarantee
    /// for a hard bound on polls, and reports failure instead of
    /// spinning forever.
    pub fn acquire_spinning(&self, policy: SpinPolicy) -> Result<Ticket, GateTimeout> {
        match policy {
            SpinPolicy::Forever => Ok(self.acquire()),
            SpinPolicy::Bounded(polls) => {
                for _ in 0..polls {
                    if let Some(ticket) = self.try_acquire() {
                        return Ok(ticket);
                    }
                    core::hint::spin_loop();
                }
                Err(GateTimeout)
            }
        }
    }

    /// Returns the token, serving the next ticket in line
    pub fn release(&self, ticket: Ticket) {
        self.ring[ticket.0 & (N - 1)].store(1, Ordering::Release);
        wake();
    }

    /// Runs `f` inside the gate
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        let ticket = self.acquire();
        let result = f();
        self.release(ticket);
        result
    }
}

impl<const N: usize> fmt::Debug for TicketGate<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TicketGate {{ next_ticket: {}, ring: [",
            self.next_ticket.load(Ordering::Relaxed)
        )?;
        for (i, slot) in self.ring.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", slot.load(Ordering::Relaxed))?;
        }
        write!(f, "] }}")
    }
}

/// Data guarded by its own [`TicketGate`].
///
/// This is the shape the pool wants: the bitmap lives inside, and every
/// mutation happens between acquire and release. The gate hands
/// admission over in ticket order, so pool mutations are totally
/// ordered across cores.
pub struct GateLock<T, const N: usize> {
    /// The gate serializing access to `data`
    gate: TicketGate<N>,
    /// The ticket of the current holder; only meaningful while held
    held: Cell<usize>,
    /// The protected data
    data: UnsafeCell<T>,
}

// SAFETY: `held` and `data` are only touched between acquire and
// release, and the gate admits one holder at a time
unsafe impl<T: Send, const N: usize> Send for GateLock<T, N> {}
unsafe impl<T: Send, const N: usize> Sync for GateLock<T, N> {}

impl<T, const N: usize> GateLock<T, N> {
    /// Creates a gate around the given data
    pub const fn new(data: T) -> Self {
        Self {
            gate: TicketGate::new(),
            held: Cell::new(0),
            data: UnsafeCell::new(data),
        }
    }

    /// The underlying gate, for diagnostics
    pub fn gate(&self) -> &TicketGate<N> {
        &self.gate
    }
}

impl<T, const N: usize> Mutex for GateLock<T, N> {
    type State = T;

    fn lock(&self) -> MutexGuard<Self> {
        let ticket = self.gate.acquire();
        self.held.set(ticket.0);
        // SAFETY: The gate is held, so nothing else can reach `data`
        unsafe { MutexGuard::new(self, &mut *self.data.get()) }
    }

    unsafe fn unlock(&self) {
        self.gate.release(Ticket(self.held.get()));
    }
}
