//! Trusted wall clock for TLS.
//!
//! Certificate validity checks are meaningless on a board that booted with
//! its clock at the epoch, so TLS bridges are only bound once the clock
//! reads a plausible date.

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::bail;
use chrono::{DateTime, TimeZone, Utc};
use tracing::{info, warn};

use crate::signal::sleep_unless;

/// Delay between clock checks while waiting for time sync.
pub const SYNC_RETRY: Duration = Duration::from_secs(15);

pub trait TimeSource {
    fn now(&self) -> DateTime<Utc>;
}

/// The host clock, kept in sync by the operating system.
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Earliest instant accepted as a synchronized clock reading.
pub fn trusted_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn is_trusted(at: DateTime<Utc>) -> bool {
    at >= trusted_epoch()
}

/// Block until `clock` reads a trusted time, checking every `retry`.
pub fn wait_for_trusted_time(
    clock: &dyn TimeSource,
    stop: &AtomicBool,
    retry: Duration,
) -> anyhow::Result<()> {
    loop {
        let now = clock.now();
        if is_trusted(now) {
            info!("Clock synchronized: {}", now.format("%Y-%m-%d %H:%M:%S UTC"));
            return Ok(());
        }
        warn!(
            "Clock reads {}, waiting {}s for time sync",
            now.format("%Y-%m-%d %H:%M:%S"),
            retry.as_secs()
        );
        if !sleep_unless(stop, retry) {
            bail!("interrupted while waiting for time sync");
        }
    }
}
