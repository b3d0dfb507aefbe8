//! Serial log sink
//!
//! On bare-metal x86_64 the driver log goes to COM1 (UART 16550 @ 0x3F8).
//! Hosted builds have no serial port; the embedding environment installs
//! its own [`LogSink`](crate::logger::LogSink) instead.

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod com1 {
    use crate::logger::{LogLevel, LogSink};
    use core::fmt::{self, Write};
    use lazy_static::lazy_static;
    use spin::Mutex;
    use uart_16550::SerialPort;

    lazy_static! {
        static ref COM1: Mutex<SerialPort> = {
            let mut port = unsafe { SerialPort::new(0x3F8) };
            port.init();
            Mutex::new(port)
        };
    }

    /// Log sink writing to COM1
    pub struct SerialSink;

    impl LogSink for SerialSink {
        fn write_line(&self, _level: LogLevel, line: fmt::Arguments) {
            // Disable interrupts to prevent deadlock with an IRQ-context logger
            crate::arch::without_interrupts(|| {
                let _ = COM1.lock().write_fmt(line);
            });
        }

        /// Raw TSC cycles
        fn timestamp(&self) -> Option<u64> {
            Some(unsafe { core::arch::x86_64::_rdtsc() })
        }
    }

    pub static SERIAL_SINK: SerialSink = SerialSink;
}

/// Route driver logging to COM1
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub fn init() {
    crate::logger::set_sink(&com1::SERIAL_SINK);
}

/// No serial port on hosted targets
#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
pub fn init() {}
