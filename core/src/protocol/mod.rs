//! Client-facing wire protocol: in-band control sequences, the password
//! gate's fixed texts and the configuration menu.

pub mod control;
pub mod menu;

pub use control::ControlSequence;
pub use menu::{MenuAction, MenuState, UartChange};

/// Sent on connect when the bridge requires a password.
pub const PASSWORD_PROMPT: &[u8] = b"password: ";
pub const AUTH_SUCCEEDED: &[u8] = b"\r\nAuthentication succeeded\r\n";
pub const AUTH_FAILED: &[u8] = b"\r\nAuthentication failed\r\npassword: ";
pub const LEAVING_MENU: &[u8] = b"\r\nLeaving menu\r\n";
pub const RESTARTING: &[u8] = b"\r\nConfiguration changed, restarting\r\n";
