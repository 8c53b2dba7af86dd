use crate::{call_once, kernel};
use core::{
    cell::UnsafeCell,
    fmt::{self, Write},
    ops,
};
use tock_registers::{
    interfaces::{Readable, Writeable},
    register_bitfields, register_structs,
    registers::{ReadOnly, ReadWrite},
};

register_bitfields! {
    u32,

    /// Flag register
    FR [
        /// Transmit FIFO full
        TXFF OFFSET(5) NUMBITS(1) [],
        /// Receive FIFO empty
        RXFE OFFSET(4) NUMBITS(1) []
    ]
}

register_structs! {
    #[allow(non_snake_case)]
    pub RegisterBlock {
        (0x00 => DR: ReadWrite<u32>),
        (0x04 => _reserved1),
        (0x18 => FR: ReadOnly<u32, FR::Register>),
        (0x1c => @END),
    }
}

/// Memory mapped IO wrapper
struct Mmio<T> {
    /// Beginning address of the MMIO region
    start_addr: *mut T,
}

impl<T> Mmio<T> {
    /// Creates an MMIO wrapper at the given location
    /// # Safety
    /// `start_addr` must be correct, and should not be reused by anything else
    const unsafe fn new(start_addr: *mut T) -> Self {
        Self { start_addr }
    }
}

impl<T> ops::Deref for Mmio<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: By assumption, this dereference should be safe
        unsafe { &*self.start_addr }
    }
}

/// Abstraction for the associated MMIO registers.
type Registers = Mmio<RegisterBlock>;

/// The raw device. Single-threaded and non-reentrant; the console gate
/// is what makes it usable from several cores
struct UartInner {
    /// The UART registers, memory mapped
    registers: Registers,
}

/// Representation of the UART.
pub struct Uart {
    /// The raw device
    inner: UnsafeCell<UartInner>,
}

impl UartInner {
    /// Creates a raw UART instance
    /// # Safety
    /// The start address must be correct, and the range must not be used by anything else.
    const unsafe fn new(mmio_start_addr: *mut RegisterBlock) -> Self {
        Self {
            // SAFETY: Guaranteed by caller
            registers: unsafe { Registers::new(mmio_start_addr) },
        }
    }

    /// QEMU leaves the PL011 ready to use
    fn init(&mut self) {}

    /// Sends a byte across the UART
    fn write_byte(&mut self, c: u8) {
        while self.registers.FR.is_set(FR::TXFF) {
            core::hint::spin_loop();
        }
        self.registers.DR.set(c.into());
    }

    /// Reads a byte from the UART, if available
    fn read_byte(&mut self) -> Option<u8> {
        if self.registers.FR.is_set(FR::RXFE) {
            return None;
        }
        Some((self.registers.DR.get() & 0xff).try_into().unwrap())
    }
}

impl fmt::Write for UartInner {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.write_byte(byte);
        }

        Ok(())
    }
}

impl Uart {
    /// Creates a UART instance
    /// # Safety
    /// The start address must be correct, and the range must not be used by anything else.
    /// This includes not initializing the UART multiple times
    const unsafe fn new(start_address: *mut RegisterBlock) -> Self {
        Self {
            // SAFETY: Guaranteed by caller
            inner: UnsafeCell::new(unsafe { UartInner::new(start_address) }),
        }
    }

    /// Initializes the UART
    pub fn init(&self) {
        call_once!();
        // SAFETY: Nothing else touches the device during init
        unsafe { &mut *self.inner.get() }.init();
    }
}

// SAFETY: Every access goes through the console gate, one core at a time
unsafe impl Sync for Uart {}

impl kernel::console::Serial for Uart {
    fn write_fmt(&self, args: core::fmt::Arguments) {
        // SAFETY: The console gate admits one writer at a time
        let inner = unsafe { &mut *self.inner.get() };
        _ = inner.write_fmt(args);
    }

    fn read_byte(&self) -> Option<u8> {
        // SAFETY: Only the boot core polls for input
        unsafe { &mut *self.inner.get() }.read_byte()
    }
}

/// The system-wide UART
static UART: Uart = unsafe { Uart::new(0x0900_0000 as *mut RegisterBlock) };

/// Gets the system-wide serial connection
pub fn serial() -> &'static Uart {
    &UART
}
