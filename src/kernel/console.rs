use crate::{board, kernel::gate::TicketGate, kernel::SetOnce};

/// A serial output sink.
///
/// Implementations are plain, single-threaded character pushers; the
/// console gate below is what makes them callable from several cores at
/// once.
pub trait Serial {
    /// Writes a formatted string, non-reentrantly
    fn write_fmt(&self, args: core::fmt::Arguments);

    /// Reads a byte, if one is waiting
    fn read_byte(&self) -> Option<u8>;
}

/// The registered sink; unset until the board wires one up
static SINK: SetOnce<&'static (dyn Serial + Sync)> = SetOnce::new();

/// Serializes whole formatted writes, so lines from different cores
/// come out interleaved by line rather than by character
static WRITE_GATE: TicketGate<{ board::MAX_CORES }> = TicketGate::new();

/// Wires up the console output sink. Called once by board init, before
/// any other core is powered on.
pub fn register(serial: &'static (dyn Serial + Sync)) {
    SINK.set(serial);
}

/// The sink, if one has been registered yet
pub(crate) fn sink() -> Option<&'static (dyn Serial + Sync)> {
    SINK.try_get().copied()
}

/// The gate the printing macros write under
pub fn gate() -> &'static TicketGate<{ board::MAX_CORES }> {
    &WRITE_GATE
}

/// Reads a byte from the console, if a sink is registered and a byte is
/// waiting
pub fn read_byte() -> Option<u8> {
    sink().and_then(|serial| serial.read_byte())
}
