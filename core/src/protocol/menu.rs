//! The in-band UART configuration menu.
//!
//! Pure key interpretation and screen rendering. The bridge owns the
//! current [`MenuState`], applies the resulting [`MenuAction`] to its live
//! UART and sends the rendered screens.

use std::fmt::Write as _;

use crate::config::{Parity, UartConfig};

/// Erase display followed by cursor home.
pub const CLEAR_SCREEN: &[u8] = b"\x1b[2J\x1b[H";

/// Prompt that ends every screen.
pub const PROMPT: &str = "> ";

/// Key that returns from any submenu to the main screen.
pub const BACK_KEY: u8 = b'z';

/// Baud rates offered by the baud rate screen, keyed `a`, `b`, ...
pub const BAUD_RATES: [u32; 8] = [4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800];

const DATA_BITS: [u8; 2] = [7, 8];
const PARITIES: [Parity; 3] = [Parity::None, Parity::Even, Parity::Odd];
const STOP_BITS: [u8; 2] = [1, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MenuState {
    #[default]
    Main,
    DataBits,
    BaudRate,
    Parity,
    Stop,
    Close,
}

/// A single UART setting chosen from a submenu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartChange {
    DataBits(u8),
    BaudRate(u32),
    Parity(Parity),
    StopBits(u8),
}

impl UartChange {
    pub fn apply(&self, uart: &mut UartConfig) {
        match *self {
            UartChange::DataBits(bits) => uart.bits = bits,
            UartChange::BaudRate(rate) => uart.baudrate = rate,
            UartChange::Parity(parity) => uart.parity = parity,
            UartChange::StopBits(stop) => uart.stop = stop,
        }
    }
}

/// What a key press asks the bridge to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    /// Redraw the current screen; nothing changes.
    Redraw,
    /// Switch to a submenu.
    Open(MenuState),
    /// Change a setting and stay on the current screen.
    Set(UartChange),
    /// Return to the main screen.
    Back,
    /// Leave the menu.
    Close,
}

/// Map a key press on `state`'s screen to an action.
pub fn interpret(state: MenuState, key: u8) -> MenuAction {
    let index = key.wrapping_sub(b'a') as usize;
    match state {
        MenuState::Main => match key {
            b'a' => MenuAction::Open(MenuState::DataBits),
            b'b' => MenuAction::Open(MenuState::BaudRate),
            b'c' => MenuAction::Open(MenuState::Parity),
            b'd' => MenuAction::Open(MenuState::Stop),
            b'e' => MenuAction::Close,
            _ => MenuAction::Redraw,
        },
        _ if key == BACK_KEY && state != MenuState::Close => MenuAction::Back,
        MenuState::DataBits => DATA_BITS
            .get(index)
            .map_or(MenuAction::Redraw, |&b| MenuAction::Set(UartChange::DataBits(b))),
        MenuState::BaudRate => BAUD_RATES
            .get(index)
            .map_or(MenuAction::Redraw, |&r| MenuAction::Set(UartChange::BaudRate(r))),
        MenuState::Parity => PARITIES
            .get(index)
            .map_or(MenuAction::Redraw, |&p| MenuAction::Set(UartChange::Parity(p))),
        MenuState::Stop => STOP_BITS
            .get(index)
            .map_or(MenuAction::Redraw, |&s| MenuAction::Set(UartChange::StopBits(s))),
        MenuState::Close => MenuAction::Close,
    }
}

/// Extract the key presses from a received unit.
///
/// Line terminators and NUL padding from line-mode clients are dropped; an
/// empty result means "redraw".
pub fn keys(unit: &[u8]) -> Vec<u8> {
    unit.iter()
        .copied()
        .filter(|b| !matches!(b, b'\r' | b'\n' | 0))
        .collect()
}

/// Render a full screen: clear sequence, body, prompt.
pub fn render(state: MenuState, uart: &UartConfig, device_name: &str) -> Vec<u8> {
    let mut body = String::new();
    let marker = |current: bool| if current { " *" } else { "" };

    match state {
        MenuState::Main => {
            let _ = write!(
                body,
                "{device_name} - UART {}\r\n{} baud, {} data bits, parity {}, {} stop bits\r\n\r\n",
                uart.port, uart.baudrate, uart.bits, uart.parity, uart.stop
            );
            body.push_str("a) data bits\r\n");
            body.push_str("b) baud rate\r\n");
            body.push_str("c) parity\r\n");
            body.push_str("d) stop bits\r\n");
            body.push_str("e) exit menu\r\n");
        }
        MenuState::DataBits => {
            body.push_str("Data bits\r\n\r\n");
            for (i, bits) in DATA_BITS.iter().enumerate() {
                let _ = write!(body, "{}) {bits}{}\r\n", option_key(i), marker(*bits == uart.bits));
            }
        }
        MenuState::BaudRate => {
            body.push_str("Baud rate\r\n\r\n");
            for (i, rate) in BAUD_RATES.iter().enumerate() {
                let _ = write!(
                    body,
                    "{}) {rate}{}\r\n",
                    option_key(i),
                    marker(*rate == uart.baudrate)
                );
            }
        }
        MenuState::Parity => {
            body.push_str("Parity\r\n\r\n");
            for (i, parity) in PARITIES.iter().enumerate() {
                let _ = write!(
                    body,
                    "{}) {parity}{}\r\n",
                    option_key(i),
                    marker(*parity == uart.parity)
                );
            }
        }
        MenuState::Stop => {
            body.push_str("Stop bits\r\n\r\n");
            for (i, stop) in STOP_BITS.iter().enumerate() {
                let _ = write!(body, "{}) {stop}{}\r\n", option_key(i), marker(*stop == uart.stop));
            }
        }
        MenuState::Close => {
            body.push_str("Closing menu...\r\n");
        }
    }

    if !matches!(state, MenuState::Main | MenuState::Close) {
        let _ = write!(body, "{}) back\r\n", BACK_KEY as char);
    }

    let mut screen = Vec::with_capacity(CLEAR_SCREEN.len() + body.len() + PROMPT.len());
    screen.extend_from_slice(CLEAR_SCREEN);
    screen.extend_from_slice(body.as_bytes());
    screen.extend_from_slice(PROMPT.as_bytes());
    screen
}

fn option_key(index: usize) -> char {
    (b'a' + index as u8) as char
}
