/// Phase of the connection currently occupying a bridge's client slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No client connected.
    #[default]
    Listening,
    /// Client connected, password not yet accepted.
    EnterPassword,
    /// Data is relayed in both directions.
    Authenticated,
    /// The configuration menu consumes client input.
    InMenu,
}

/// Result of feeding bytes to the password gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempt {
    /// All bytes consumed, no terminator seen yet.
    Pending,
    /// A line was entered and did not match.
    Failed,
    /// A line was entered and matched.
    Accepted,
}

/// Accumulates a password line byte by byte.
#[derive(Debug, Default)]
pub(crate) struct PasswordGate {
    entered: Vec<u8>,
    /// The last terminator was `\r`; a directly following `\n` belongs to it.
    after_cr: bool,
}

impl PasswordGate {
    /// Consume `data` up to and including the next line terminator.
    ///
    /// Returns the number of bytes consumed and what happened. Bytes after
    /// the terminator are left for the caller.
    pub(crate) fn feed(&mut self, data: &[u8], expected: &[u8]) -> (usize, Attempt) {
        for (i, &byte) in data.iter().enumerate() {
            if std::mem::take(&mut self.after_cr) && byte == b'\n' {
                continue;
            }
            if byte == b'\r' || byte == b'\n' {
                self.after_cr = byte == b'\r';
                let matched = self.entered == expected;
                self.entered.clear();
                let attempt = if matched {
                    Attempt::Accepted
                } else {
                    Attempt::Failed
                };
                return (i + 1, attempt);
            }
            self.entered.push(byte);
        }
        (data.len(), Attempt::Pending)
    }

    /// Whether a `\n` arriving next would only complete a CRLF pair.
    pub(crate) fn after_cr(&self) -> bool {
        self.after_cr
    }

    pub(crate) fn reset(&mut self) {
        self.entered.clear();
        self.after_cr = false;
    }
}
