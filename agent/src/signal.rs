//! SIGINT/SIGTERM handling.
//!
//! The handlers only raise a flag. They are installed without
//! `SA_RESTART`, so a blocked `poll` returns `EINTR` and the server loop
//! gets to look at the flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install the handlers and return the flag they raise.
pub fn install() -> nix::Result<&'static AtomicBool> {
    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only stores to an atomic.
        unsafe { sigaction(signal, &action) }?;
    }
    Ok(&INTERRUPTED)
}

/// Sleep for `duration` in short steps, returning early once `stop` is set.
///
/// Returns `false` if the sleep was cut short.
pub fn sleep_unless(stop: &AtomicBool, duration: Duration) -> bool {
    const STEP: Duration = Duration::from_millis(100);
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        std::thread::sleep(remaining.min(STEP));
    }
}
