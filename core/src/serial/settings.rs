use std::time::Duration;

use crate::config::{Parity, UartConfig};
use crate::errors::SerialError;

/// Pre-parsed UART configuration holding `serialport` enum values.
///
/// Constructed via [`parse_uart_config`].
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: serialport::DataBits,
    pub stop_bits: serialport::StopBits,
    pub parity: serialport::Parity,
    pub read_timeout: Duration,
}

/// Parse a [`UartConfig`] into [`SerialSettings`].
///
/// # Mapping rules
///
/// | Field     | Input                    | Output                    |
/// |-----------|--------------------------|---------------------------|
/// | `bits`    | 5, 6, 7, 8 (default 8)   | `DataBits::{Five..Eight}` |
/// | `stop`    | 1, 2 (default 1)         | `StopBits::{One,Two}`     |
/// | `parity`  | none, even, odd          | `Parity::{None,Even,Odd}` |
/// | `timeout` | milliseconds, default 0  | read timeout              |
///
/// Returns [`SerialError::Open`] if the device path is empty.
pub fn parse_uart_config(config: &UartConfig) -> Result<SerialSettings, SerialError> {
    let port = config.port.device_path();
    if port.trim().is_empty() {
        return Err(SerialError::Open {
            port,
            message: "serial port name must not be empty".into(),
        });
    }

    Ok(SerialSettings {
        port,
        baud_rate: config.baudrate,
        data_bits: data_bits(config.bits),
        stop_bits: stop_bits(config.stop),
        parity: parity(config.parity),
        read_timeout: Duration::from_millis(u64::from(config.timeout.unwrap_or(0))),
    })
}

pub(crate) fn data_bits(bits: u8) -> serialport::DataBits {
    match bits {
        5 => serialport::DataBits::Five,
        6 => serialport::DataBits::Six,
        7 => serialport::DataBits::Seven,
        _ => serialport::DataBits::Eight,
    }
}

pub(crate) fn stop_bits(stop: u8) -> serialport::StopBits {
    match stop {
        2 => serialport::StopBits::Two,
        _ => serialport::StopBits::One,
    }
}

pub(crate) fn parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Even => serialport::Parity::Even,
        Parity::Odd => serialport::Parity::Odd,
    }
}
