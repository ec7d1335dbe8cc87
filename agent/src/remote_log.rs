//! Fault reports shipped to a remote syslog collector over UDP.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use chrono::{DateTime, Utc};
use serbridge_core::config::SyslogConfig;
use tracing::debug;

/// Severity used for every report (3 = error).
const SEVERITY_ERROR: u8 = 3;

/// Tag placed before the message.
const APP_NAME: &str = "serbridge";

pub struct RemoteLog {
    socket: UdpSocket,
    target: SocketAddr,
    hostname: String,
    priority: u8,
}

impl RemoteLog {
    /// Resolve the collector and bind a local socket of the same family.
    pub fn new(config: &SyslogConfig, hostname: &str) -> io::Result<Self> {
        let target = (config.host.as_str(), config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no address for syslog host {}", config.host),
                )
            })?;
        let local: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local)?;
        Ok(Self {
            socket,
            target,
            hostname: hostname.to_string(),
            priority: config.facility.saturating_mul(8).saturating_add(SEVERITY_ERROR),
        })
    }

    /// Render an RFC 3164 line: `<PRI>Mmm dd hh:mm:ss HOST TAG: MSG`.
    pub fn format(&self, at: DateTime<Utc>, message: &str) -> String {
        format!(
            "<{}>{} {} {}: {}",
            self.priority,
            at.format("%b %e %H:%M:%S"),
            self.hostname,
            APP_NAME,
            message
        )
    }

    pub fn send(&self, message: &str) -> io::Result<()> {
        let line = self.format(Utc::now(), message);
        debug!("Sending remote log to {}", self.target);
        self.socket.send_to(line.as_bytes(), self.target)?;
        Ok(())
    }
}
