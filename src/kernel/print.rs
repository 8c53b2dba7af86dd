use crate::kernel::console;

/// Writes through the console gate. With no sink registered (early
/// boot, host tests) the output is dropped.
pub fn _print(args: core::fmt::Arguments) {
    if let Some(serial) = console::sink() {
        console::gate().with(|| serial.write_fmt(args));
    }
}

/// Print to serial output
// <https://doc.rust-lang.org/src/std/macros.rs.html>
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::kernel::print::_print(format_args!($($arg)*)));
}

/// Print, with a newline, to serial output
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ({
        $crate::kernel::print::_print(format_args!("{}\n", format_args!($($arg)*)));
    })
}

/// Prints info prefixed with the printing core's id and a boot-relative
/// timestamp
#[macro_export]
macro_rules! log {
    ($string:expr) => ({
        let timestamp: core::time::Duration = $crate::architecture::time::now();

        $crate::kernel::print::_print(format_args!(
            concat!("[core {}, {}.{:03}s] ", $string, "\n"),
            $crate::architecture::machine::core_id(),
            timestamp.as_secs(),
            timestamp.subsec_millis(),
        ));
    });
    ($format_string:expr, $($arg:tt)*) => ({
        let timestamp: core::time::Duration = $crate::architecture::time::now();

        $crate::kernel::print::_print(format_args!(
            concat!("[core {}, {}.{:03}s] ", $format_string, "\n"),
            $crate::architecture::machine::core_id(),
            timestamp.as_secs(),
            timestamp.subsec_millis(),
            $($arg)*
        ));
    })
}
