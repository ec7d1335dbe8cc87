//! Restart loop around serving runs.
//!
//! Every run starts from scratch: network bootstrap, UARTs opened, sockets
//! bound. Faults are logged (and shipped to the remote log sink when one
//! is configured), then the run is retried after a short pause. Only a
//! signal stops the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serbridge_core::config::{ConfigStore, ServerConfig};
use tracing::{error, info, warn};

use crate::clock::TimeSource;
use crate::network::LinkBootstrap;
use crate::remote_log::RemoteLog;
use crate::server::{BridgeServer, ServeOutcome};
use crate::signal::sleep_unless;

/// Pause between a failed run and the next attempt.
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

pub struct Supervisor {
    store: ConfigStore,
    stop: &'static AtomicBool,
    clock: Box<dyn TimeSource>,
    network: Box<dyn LinkBootstrap>,
    restart_delay: Duration,
}

impl Supervisor {
    pub fn new(
        store: ConfigStore,
        stop: &'static AtomicBool,
        clock: Box<dyn TimeSource>,
        network: Box<dyn LinkBootstrap>,
    ) -> Self {
        Self {
            store,
            stop,
            clock,
            network,
            restart_delay: RESTART_DELAY,
        }
    }

    #[cfg(test)]
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Serve `config` until a signal arrives, restarting after faults and
    /// reloading the store after a reconfiguration.
    pub fn run(&mut self, mut config: ServerConfig) -> anyhow::Result<()> {
        let mut runs: u64 = 0;
        loop {
            if self.stop.load(Ordering::SeqCst) {
                info!("Stop requested, exiting");
                return Ok(());
            }
            runs += 1;
            info!("Starting serving run {}", runs);

            match self.serve_once(&config) {
                Ok(ServeOutcome::Interrupted) => {
                    info!("Interrupted, exiting");
                    return Ok(());
                }
                Ok(ServeOutcome::Reconfigure) => {
                    info!("Configuration changed, restarting");
                }
                Err(e) => {
                    error!("Serving run failed: {:#}", e);
                    self.report(&config, &format!("{e:#}"));
                    if !sleep_unless(self.stop, self.restart_delay) {
                        continue;
                    }
                }
            }

            config = match self.store.load() {
                Ok(reloaded) => reloaded,
                Err(e) => {
                    warn!(
                        "Could not reload {}, keeping previous configuration: {}",
                        self.store.path().display(),
                        e
                    );
                    config
                }
            };
        }
    }

    fn serve_once(&mut self, config: &ServerConfig) -> anyhow::Result<ServeOutcome> {
        self.network.bring_up(config.wlan.as_ref(), &config.name)?;
        let server = BridgeServer::bind(
            config.clone(),
            Some(self.store.clone()),
            self.stop,
            self.clock.as_ref(),
        )?;
        Ok(server.serve()?)
    }

    fn report(&self, config: &ServerConfig, message: &str) {
        let Some(syslog) = &config.syslog else {
            return;
        };
        let sent = RemoteLog::new(syslog, &config.name).and_then(|log| log.send(message));
        if let Err(e) = sent {
            warn!("Could not send remote log to {}:{}: {}", syslog.host, syslog.port, e);
        }
    }
}
