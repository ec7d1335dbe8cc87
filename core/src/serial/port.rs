use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::PollFlags;
use serialport::SerialPort;
use tracing::{debug, info};

use super::settings::{self, parse_uart_config};
use super::SerialLine;
use crate::config::{UartConfig, UartKind};
use crate::errors::SerialError;
use crate::net::wait_ready;

/// How long the line is held in the break condition.
const BREAK_DURATION: Duration = Duration::from_millis(250);

/// Longest a single write may wait for the output queue to drain.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// A tty-backed UART opened through the `serialport` crate.
///
/// Software UARTs are reached the same way: their kernel driver exposes a
/// tty at the configured path, and the pin numbers are only reported.
pub struct NativeSerial {
    port: serialport::TTYPort,
    name: String,
}

impl NativeSerial {
    /// Open the device described by `config`.
    pub fn open(config: &UartConfig) -> Result<Self, SerialError> {
        let parsed = parse_uart_config(config)?;
        match config.kind {
            UartKind::Hardware => info!("Using HW UART {}", parsed.port),
            UartKind::Soft => info!(
                "Using SoftUART {} (tx pin {:?}, rx pin {:?}, char timeout {:?} ms)",
                parsed.port, config.tx, config.rx, config.timeout_char
            ),
        }

        let port = serialport::new(&parsed.port, parsed.baud_rate)
            .data_bits(parsed.data_bits)
            .stop_bits(parsed.stop_bits)
            .parity(parsed.parity)
            .flow_control(serialport::FlowControl::None)
            .timeout(parsed.read_timeout)
            .open_native()
            .map_err(|e| SerialError::Open {
                port: parsed.port.clone(),
                message: e.to_string(),
            })?;

        info!(
            "UART opened {} at {} baud",
            parsed.port, parsed.baud_rate
        );
        Self::from_port(port, parsed.port)
    }

    /// Take over an open tty. The descriptor is switched to non-blocking
    /// so a full output queue surfaces as `WouldBlock` instead of stalling.
    fn from_port(port: serialport::TTYPort, name: String) -> Result<Self, SerialError> {
        set_nonblocking(port.as_raw_fd()).map_err(|e| SerialError::Open {
            port: name.clone(),
            message: e.to_string(),
        })?;
        Ok(Self { port, name })
    }
}

fn set_nonblocking(fd: RawFd) -> nix::Result<()> {
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

impl SerialLine for NativeSerial {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(ref e)
                if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, mut data: &[u8]) -> io::Result<()> {
        let deadline = Instant::now() + WRITE_TIMEOUT;
        while !data.is_empty() {
            match self.port.write(data) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => data = &data[n..],
                // The port's own poll uses the read timeout, which is
                // usually zero; wait for room against our deadline instead.
                Err(ref e)
                    if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    wait_ready(self.port.as_raw_fd(), PollFlags::POLLOUT, deadline)?;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn send_break(&mut self) -> io::Result<()> {
        debug!("Sending break on {}", self.name);
        self.port.set_break().map_err(io::Error::from)?;
        std::thread::sleep(BREAK_DURATION);
        self.port.clear_break().map_err(io::Error::from)
    }

    fn reconfigure(&mut self, config: &UartConfig) -> Result<(), SerialError> {
        let configure_err = |e: serialport::Error| SerialError::Configure {
            port: self.name.clone(),
            message: e.to_string(),
        };
        self.port
            .set_baud_rate(config.baudrate)
            .map_err(configure_err)?;
        self.port
            .set_data_bits(settings::data_bits(config.bits))
            .map_err(configure_err)?;
        self.port
            .set_parity(settings::parity(config.parity))
            .map_err(configure_err)?;
        self.port
            .set_stop_bits(settings::stop_bits(config.stop))
            .map_err(configure_err)?;
        info!(
            "UART {} reconfigured: {} baud, {} data bits, parity {}, {} stop bits",
            self.name, config.baudrate, config.bits, config.parity, config.stop
        );
        Ok(())
    }

    fn as_raw_fd(&self) -> RawFd {
        self.port.as_raw_fd()
    }
}
