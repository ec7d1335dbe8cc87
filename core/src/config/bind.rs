//! Listening address parsing.
//!
//! Accepted forms: `"host:port"`, `"port"`, a bare integer port, or a
//! two-element `[host, port]` array. A host of `"0"` (or an empty or
//! missing host) binds every interface.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindAddress {
    /// `None` binds all interfaces.
    pub host: Option<String>,
    pub port: u16,
}

impl BindAddress {
    pub fn all_interfaces(port: u16) -> Self {
        Self { host: None, port }
    }

    /// Parse the textual form (`"host:port"` or `"port"`).
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        let (host, port) = match text.rsplit_once(':') {
            Some((host, port)) => (Some(host), port),
            None => (None, text),
        };
        let port = port
            .parse::<u16>()
            .map_err(|_| format!("invalid port in bind address \"{text}\""))?;
        Ok(Self {
            host: host.and_then(normalize_host),
            port,
        })
    }

    /// Resolve to the first socket address for this host and port.
    pub fn resolve(&self) -> io::Result<SocketAddr> {
        match &self.host {
            None => Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))),
            Some(host) => (host.as_str(), self.port)
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::AddrNotAvailable,
                        format!("no address found for {host}"),
                    )
                }),
        }
    }
}

fn normalize_host(host: &str) -> Option<String> {
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() || host == "0" {
        None
    } else {
        Some(host.to_string())
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            None => write!(f, "0:{}", self.port),
            Some(host) if host.contains(':') => write!(f, "[{host}]:{}", self.port),
            Some(host) => write!(f, "{host}:{}", self.port),
        }
    }
}

impl Serialize for BindAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BindAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum PortRepr {
            Number(u16),
            Text(String),
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Port(u16),
            Text(String),
            Pair(Option<String>, PortRepr),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Port(port) => Ok(Self::all_interfaces(port)),
            Repr::Text(text) => Self::parse(&text).map_err(serde::de::Error::custom),
            Repr::Pair(host, port) => {
                let port = match port {
                    PortRepr::Number(n) => n,
                    PortRepr::Text(s) => s.trim().parse().map_err(|_| {
                        serde::de::Error::custom(format!("invalid port \"{s}\""))
                    })?,
                };
                Ok(Self {
                    host: host.as_deref().and_then(normalize_host),
                    port,
                })
            }
        }
    }
}
