//! UART endpoint: settings parsing and the device handle a bridge owns.

mod port;
mod settings;

pub use port::NativeSerial;
pub use settings::{parse_uart_config, SerialSettings};

use std::io;
use std::os::fd::RawFd;

use crate::config::UartConfig;
use crate::errors::SerialError;

/// A UART as seen by a bridge.
///
/// Reads must never wait for data: the server only calls
/// [`read_available`](SerialLine::read_available) after `poll` reported
/// the descriptor readable.
pub trait SerialLine {
    /// Read whatever is available. `Ok(0)` means nothing was pending.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all bytes to the line.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Hold the line in the break condition for a short, fixed time.
    fn send_break(&mut self) -> io::Result<()>;

    /// Apply new line settings to the open device.
    fn reconfigure(&mut self, config: &UartConfig) -> Result<(), SerialError>;

    /// Descriptor to watch for readability.
    fn as_raw_fd(&self) -> RawFd;
}
