//! The bridge server: one thread, one `poll` per iteration.
//!
//! Each iteration rebuilds the watch list from live bridge state, blocks in
//! `poll` until something is ready, then gives every ready descriptor one
//! bounded step on its bridge. The loop ends when a signal raises the stop
//! flag, when an operator's menu change has to be persisted and applied
//! through a restart, or on a multiplex fault.

mod watch;

use std::os::fd::{BorrowedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use serbridge_core::bridge::{Bridge, BridgeEvent, BridgeOptions};
use serbridge_core::buffer::DEFAULT_BUFFER_CAPACITY;
use serbridge_core::config::{ConfigStore, ServerConfig};
use serbridge_core::errors::ConfigError;
use serbridge_core::net::{Listener, PlainListener};
use serbridge_core::serial::NativeSerial;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::clock::{wait_for_trusted_time, TimeSource, SYNC_RETRY};
use crate::tls::TlsListener;
use watch::{client_readable, is_fault, Role};

/// Why a serving run ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// SIGINT or SIGTERM.
    Interrupted,
    /// The configuration was rewritten and must be reloaded.
    Reconfigure,
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("poll failed: {0}")]
    Poll(#[from] Errno),

    #[error("{role:?} descriptor {fd} of bridge {bridge} reported {revents:?}")]
    Descriptor {
        bridge: usize,
        role: Role,
        fd: RawFd,
        revents: PollFlags,
    },

    #[error("failed to persist configuration: {0}")]
    Persist(#[from] ConfigError),
}

pub struct BridgeServer {
    config: ServerConfig,
    bridges: Vec<Bridge>,
    store: Option<ConfigStore>,
    stop: &'static AtomicBool,
}

impl BridgeServer {
    /// Open every UART and bind every listener named in `config`.
    ///
    /// TLS bridges are bound only after the clock is trusted.
    pub fn bind(
        config: ServerConfig,
        store: Option<ConfigStore>,
        stop: &'static AtomicBool,
        clock: &dyn TimeSource,
    ) -> anyhow::Result<Self> {
        if config.bridges.iter().any(|b| b.ssl.is_some()) {
            wait_for_trusted_time(clock, stop, SYNC_RETRY)?;
        }

        let log = config.log_settings();
        let mut bridges = Vec::with_capacity(config.bridges.len());
        for entry in &config.bridges {
            let uart = NativeSerial::open(&entry.uart)?;
            let listener: Box<dyn Listener> = match &entry.ssl {
                Some(tls) => Box::new(
                    TlsListener::bind(&entry.tcp.bind, &tls.clone().expand())
                        .with_context(|| format!("TLS bridge for UART {}", entry.uart.port))?,
                ),
                None => Box::new(
                    PlainListener::bind(&entry.tcp.bind)
                        .with_context(|| format!("failed to bind TCP {}", entry.tcp.bind))?,
                ),
            };
            let options = BridgeOptions {
                device_name: config.name.clone(),
                log,
                store: store.clone(),
                buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            };
            bridges.push(Bridge::new(entry.clone(), Box::new(uart), listener, options));
        }
        Ok(Self::with_bridges(config, bridges, store, stop))
    }

    /// Serve already constructed bridges.
    pub fn with_bridges(
        config: ServerConfig,
        bridges: Vec<Bridge>,
        store: Option<ConfigStore>,
        stop: &'static AtomicBool,
    ) -> Self {
        Self {
            config,
            bridges,
            store,
            stop,
        }
    }

    /// Run until interrupted, reconfigured or broken. Every bridge is
    /// closed before this returns.
    pub fn serve(mut self) -> Result<ServeOutcome, ServeError> {
        info!("Serving {} bridge(s)", self.bridges.len());
        let result = self.run();
        match &result {
            Ok(outcome) => info!("Server loop finished: {:?}", outcome),
            Err(e) => error!("Server loop failed: {}", e),
        }
        for bridge in self.bridges.drain(..) {
            bridge.close();
        }
        result
    }

    fn run(&mut self) -> Result<ServeOutcome, ServeError> {
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return Ok(ServeOutcome::Interrupted);
            }

            let watches = watch::build(&self.bridges);
            let revents = {
                let mut fds: Vec<PollFd> = watches
                    .iter()
                    .map(|w| {
                        // SAFETY: every descriptor is owned by a bridge that
                        // outlives this poll call.
                        let fd = unsafe { BorrowedFd::borrow_raw(w.fd) };
                        PollFd::new(fd, w.events)
                    })
                    .collect();
                match poll(&mut fds, PollTimeout::NONE) {
                    Ok(_) => {}
                    Err(Errno::EINTR) => continue,
                    Err(e) => return Err(ServeError::Poll(e)),
                }
                fds.iter()
                    .map(|fd| fd.revents().unwrap_or(PollFlags::empty()))
                    .collect::<Vec<_>>()
            };

            for (w, revents) in watches.iter().zip(revents) {
                if revents.is_empty() {
                    continue;
                }
                if is_fault(w.role, revents) {
                    return Err(ServeError::Descriptor {
                        bridge: w.bridge,
                        role: w.role,
                        fd: w.fd,
                        revents,
                    });
                }
                if self.dispatch(w.bridge, w.role, revents) == BridgeEvent::ConfigDrift {
                    self.persist()?;
                    return Ok(ServeOutcome::Reconfigure);
                }
            }
        }
    }

    fn dispatch(&mut self, index: usize, role: Role, revents: PollFlags) -> BridgeEvent {
        let bridge = &mut self.bridges[index];
        match role {
            Role::Listener => bridge.accept(),
            Role::Uart => bridge.handle_uart(),
            Role::Client(id) => {
                let mut event = BridgeEvent::Idle;
                if client_readable(revents) {
                    event = bridge.handle_client(id);
                }
                let same_client = bridge.client_fd().map(|(current, _)| current) == Some(id);
                if event == BridgeEvent::Idle
                    && revents.contains(PollFlags::POLLOUT)
                    && same_client
                {
                    event = bridge.flush();
                }
                event
            }
        }
    }

    /// Write the running configuration, including every bridge's live
    /// UART settings, back to the store.
    fn persist(&self) -> Result<(), ServeError> {
        let Some(store) = &self.store else {
            debug!("No configuration store, nothing to persist");
            return Ok(());
        };
        let mut config = self.config.clone();
        config.bridges = self.bridges.iter().map(|b| b.config().clone()).collect();
        store.save(&config)?;
        info!("Persisted running configuration to {}", store.path().display());
        Ok(())
    }
}
