//! In-band control sequences on the client data stream.
//!
//! The markers reuse telnet's IAC command codes. A sequence is only
//! recognized when it is the entire received unit; the same bytes inside a
//! larger unit are ordinary payload.

/// Telnet "interpret as command" prefix.
pub const IAC: u8 = 255;
/// Telnet BRK.
pub const BRK: u8 = 243;
/// Telnet IP (interrupt process).
pub const IP: u8 = 244;
/// Telnet AYT (are you there).
pub const AYT: u8 = 246;

/// Reply sent for an are-you-there request.
pub const AYT_REPLY: &[u8] = b"\r\n[Yes]\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSequence {
    /// Send a line break on the UART.
    Break,
    /// Reply with [`AYT_REPLY`].
    AreYouThere,
    /// Open the configuration menu.
    Interrupt,
}

impl ControlSequence {
    /// Classify a received unit. `None` means the unit is payload.
    pub fn parse(unit: &[u8]) -> Option<Self> {
        match unit {
            [IAC, BRK] => Some(ControlSequence::Break),
            [IAC, AYT] => Some(ControlSequence::AreYouThere),
            [IAC, IP] => Some(ControlSequence::Interrupt),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_exact_units() {
        assert_eq!(ControlSequence::parse(&[0xFF, 0xF3]), Some(ControlSequence::Break));
        assert_eq!(
            ControlSequence::parse(&[0xFF, 0xF6]),
            Some(ControlSequence::AreYouThere)
        );
        assert_eq!(
            ControlSequence::parse(&[0xFF, 0xF4]),
            Some(ControlSequence::Interrupt)
        );
    }

    #[test]
    fn embedded_sequences_are_payload() {
        assert_eq!(ControlSequence::parse(&[b'a', 0xFF, 0xF3]), None);
        assert_eq!(ControlSequence::parse(&[0xFF, 0xF4, b'\n']), None);
        assert_eq!(ControlSequence::parse(&[0xFF, 0xF6, 0xFF, 0xF6]), None);
    }

    #[test]
    fn other_units_are_payload() {
        assert_eq!(ControlSequence::parse(b""), None);
        assert_eq!(ControlSequence::parse(&[0xFF]), None);
        assert_eq!(ControlSequence::parse(&[0xFF, 0xFF]), None);
        assert_eq!(ControlSequence::parse(b"ls\n"), None);
    }
}
