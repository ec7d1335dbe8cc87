mod bind;
mod store;
pub mod validation;

pub use bind::BindAddress;
pub use store::ConfigStore;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Whole configuration file: global settings plus one entry per bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_verbose", deserialize_with = "deserialize_flag")]
    pub verbose: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wlan: Option<WlanConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syslog: Option<SyslogConfig>,
    #[serde(default)]
    pub bridges: Vec<BridgeConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            verbose: default_verbose(),
            wlan: None,
            syslog: None,
            bridges: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Resolve the logging settings handed to the server and its bridges.
    ///
    /// Verbose output is forced off when a bridge drives UART index 0,
    /// which doubles as the console on most boards.
    pub fn log_settings(&self) -> LogSettings {
        let console_bridged = self.bridges.iter().any(|b| b.uart.port.is_console());
        LogSettings {
            verbose: self.verbose && !console_bridged,
        }
    }
}

/// Explicit logging configuration, passed to constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    /// Emit per-transfer payload traces and info-level lifecycle logs.
    pub verbose: bool,
}

impl LogSettings {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub fn default_filter(&self) -> &'static str {
        if self.verbose {
            "info"
        } else {
            "warn"
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { verbose: true }
    }
}

/// Wireless link settings, consumed by the network bootstrap collaborator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WlanConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sta: Option<StationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ap: Option<AccessPointConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    pub essid: String,
    #[serde(default)]
    pub password: String,
    /// Association attempts before giving up; negative retries forever.
    #[serde(default = "default_connection_attempts")]
    pub connection_attempts: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPointConfig {
    /// Defaults to the device name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essid: Option<String>,
    #[serde(default = "default_channel")]
    pub channel: u8,
    #[serde(default = "default_authmode")]
    pub authmode: String,
    #[serde(default)]
    pub hidden: bool,
}

/// Remote syslog sink for fault reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyslogConfig {
    #[serde(alias = "ip")]
    pub host: String,
    #[serde(default = "default_syslog_port")]
    pub port: u16,
    /// Syslog facility code (1 = user-level).
    #[serde(default = "default_facility")]
    pub facility: u8,
}

/// One UART exposed on one listening socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub uart: UartConfig,
    pub tcp: TcpConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<TlsConfig>,
}

impl BridgeConfig {
    pub fn password(&self) -> Option<&str> {
        self.auth.as_ref().map(|a| a.password.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpConfig {
    pub bind: BindAddress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub password: String,
}

/// TLS material, each entry a file path read once when the bridge is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert: String,
    pub key: String,
    /// Trust anchor for optional client certificate verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cadata: Option<String>,
}

impl TlsConfig {
    /// Return a copy with `~` and `$VAR` expanded in every path.
    pub fn expand(mut self) -> Self {
        self.cert = expand_path(&self.cert);
        self.key = expand_path(&self.key);
        self.cadata = self.cadata.map(|s| expand_path(&s));
        self
    }
}

fn expand_path(path: &str) -> String {
    match shellexpand::full(path) {
        Ok(expanded) => expanded.into_owned(),
        Err(_) => shellexpand::tilde(path).into_owned(),
    }
}

/// UART parameters.
///
/// Field names follow the board firmware's `UART.init()` keywords so
/// existing configuration files load unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UartConfig {
    pub port: PortSelector,
    #[serde(rename = "type", default)]
    pub kind: UartKind,
    #[serde(default = "default_baud_rate")]
    pub baudrate: u32,
    #[serde(default = "default_data_bits")]
    pub bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_stop_bits")]
    pub stop: u8,
    /// Software UART transmit pin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx: Option<u8>,
    /// Software UART receive pin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rx: Option<u8>,
    /// Read timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    /// Inter-character timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_char: Option<u32>,
}

impl UartConfig {
    /// Hardware UART with default line settings.
    pub fn new(port: PortSelector) -> Self {
        Self {
            port,
            kind: UartKind::default(),
            baudrate: default_baud_rate(),
            bits: default_data_bits(),
            parity: Parity::default(),
            stop: default_stop_bits(),
            tx: None,
            rx: None,
            timeout: None,
            timeout_char: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UartKind {
    #[default]
    #[serde(rename = "hw")]
    Hardware,
    #[serde(rename = "SoftUART", alias = "soft")]
    Soft,
}

/// Which UART a bridge drives: a board-style index or a device path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortSelector {
    Index(u8),
    Path(String),
}

impl PortSelector {
    /// Device node for this selector; index `n` maps to `/dev/ttyS<n>`.
    pub fn device_path(&self) -> String {
        match self {
            PortSelector::Index(n) => format!("/dev/ttyS{n}"),
            PortSelector::Path(p) => p.clone(),
        }
    }

    pub fn is_console(&self) -> bool {
        matches!(self, PortSelector::Index(0))
    }
}

impl fmt::Display for PortSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSelector::Index(n) => write!(f, "{n}"),
            PortSelector::Path(p) => f.write_str(p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

impl Parity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Parity::None => "none",
            Parity::Even => "even",
            Parity::Odd => "odd",
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Parity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Accepted forms: `null`, `0` (even), `1` (odd), or a name.
impl<'de> Deserialize<'de> for Parity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Index(u64),
            Name(String),
        }

        match Option::<Repr>::deserialize(deserializer)? {
            None => Ok(Parity::None),
            Some(Repr::Index(0)) => Ok(Parity::Even),
            Some(Repr::Index(1)) => Ok(Parity::Odd),
            Some(Repr::Index(n)) => Err(serde::de::Error::custom(format!(
                "invalid parity index {n}, expected 0 (even) or 1 (odd)"
            ))),
            Some(Repr::Name(name)) => match name.to_ascii_lowercase().as_str() {
                "" | "none" => Ok(Parity::None),
                "even" => Ok(Parity::Even),
                "odd" => Ok(Parity::Odd),
                other => Err(serde::de::Error::custom(format!(
                    "invalid parity \"{other}\", expected none, even or odd"
                ))),
            },
        }
    }
}

fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(n) => n != 0,
    })
}

// --- Default value functions ---

fn default_name() -> String {
    "serbridge".to_string()
}

fn default_verbose() -> bool {
    true
}

fn default_connection_attempts() -> i32 {
    -1
}

fn default_channel() -> u8 {
    11
}

fn default_authmode() -> String {
    "open".to_string()
}

fn default_syslog_port() -> u16 {
    514
}

fn default_facility() -> u8 {
    1
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_missing_fields_use_defaults() {
        let cfg: ServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.name, "serbridge");
        assert!(cfg.verbose);
        assert!(cfg.wlan.is_none());
        assert!(cfg.syslog.is_none());
        assert!(cfg.bridges.is_empty());
    }

    #[test]
    fn uart_config_missing_fields_use_defaults() {
        let cfg: UartConfig = serde_json::from_str(r#"{"port": 1}"#).unwrap();
        assert_eq!(cfg, UartConfig::new(PortSelector::Index(1)));
        assert_eq!(cfg.baudrate, 115200);
        assert_eq!(cfg.bits, 8);
        assert_eq!(cfg.parity, Parity::None);
        assert_eq!(cfg.stop, 1);
        assert_eq!(cfg.kind, UartKind::Hardware);
    }

    #[test]
    fn full_bridge_config() {
        let json = r#"{
            "uart": {"port": "/dev/ttyUSB0", "baudrate": 9600, "bits": 7, "parity": 0, "stop": 2},
            "tcp": {"bind": "0:8001"},
            "auth": {"password": "pw"},
            "ssl": {"cert": "cert.der", "key": "key.der", "cadata": "ca.der"}
        }"#;
        let cfg: BridgeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.uart.port, PortSelector::Path("/dev/ttyUSB0".into()));
        assert_eq!(cfg.uart.baudrate, 9600);
        assert_eq!(cfg.uart.bits, 7);
        assert_eq!(cfg.uart.parity, Parity::Even);
        assert_eq!(cfg.uart.stop, 2);
        assert_eq!(cfg.tcp.bind.port, 8001);
        assert!(cfg.tcp.bind.host.is_none());
        assert_eq!(cfg.password(), Some("pw"));
        assert_eq!(cfg.ssl.unwrap().cadata.as_deref(), Some("ca.der"));
    }

    #[test]
    fn soft_uart_config() {
        let json = r#"{"port": "/dev/ttySOFT0", "type": "SoftUART", "tx": 4, "rx": 5,
                       "timeout": 100, "timeout_char": 10, "baudrate": 4800}"#;
        let cfg: UartConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.kind, UartKind::Soft);
        assert_eq!(cfg.tx, Some(4));
        assert_eq!(cfg.rx, Some(5));
        assert_eq!(cfg.timeout, Some(100));
        assert_eq!(cfg.timeout_char, Some(10));
    }

    #[test]
    fn parity_accepts_legacy_forms() {
        let parse = |v: &str| serde_json::from_str::<Parity>(v);
        assert_eq!(parse("null").unwrap(), Parity::None);
        assert_eq!(parse("0").unwrap(), Parity::Even);
        assert_eq!(parse("1").unwrap(), Parity::Odd);
        assert_eq!(parse("\"ODD\"").unwrap(), Parity::Odd);
        assert_eq!(parse("\"none\"").unwrap(), Parity::None);
        assert!(parse("2").is_err());
        assert!(parse("\"mark\"").is_err());
    }

    #[test]
    fn parity_serializes_as_name() {
        assert_eq!(serde_json::to_string(&Parity::Even).unwrap(), "\"even\"");
    }

    #[test]
    fn verbose_accepts_int_and_bool() {
        let cfg: ServerConfig = serde_json::from_str(r#"{"verbose": 0}"#).unwrap();
        assert!(!cfg.verbose);
        let cfg: ServerConfig = serde_json::from_str(r#"{"verbose": true}"#).unwrap();
        assert!(cfg.verbose);
    }

    #[test]
    fn console_port_silences_logging() {
        let json = r#"{"verbose": 1, "bridges": [
            {"uart": {"port": 0}, "tcp": {"bind": 8000}}
        ]}"#;
        let cfg: ServerConfig = serde_json::from_str(json).unwrap();
        assert!(!cfg.log_settings().verbose);
        assert_eq!(cfg.log_settings().default_filter(), "warn");
    }

    #[test]
    fn device_path_for_index() {
        assert_eq!(PortSelector::Index(2).device_path(), "/dev/ttyS2");
        assert_eq!(
            PortSelector::Path("/dev/ttyACM0".into()).device_path(),
            "/dev/ttyACM0"
        );
    }

    #[test]
    fn wlan_defaults() {
        let json = r#"{"sta": {"essid": "lab", "password": "x"}, "ap": {}}"#;
        let cfg: WlanConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.sta.unwrap().connection_attempts, -1);
        let ap = cfg.ap.unwrap();
        assert_eq!(ap.channel, 11);
        assert_eq!(ap.authmode, "open");
        assert!(!ap.hidden);
    }

    #[test]
    fn syslog_accepts_ip_alias() {
        let cfg: SyslogConfig = serde_json::from_str(r#"{"ip": "10.0.0.2"}"#).unwrap();
        assert_eq!(cfg.host, "10.0.0.2");
        assert_eq!(cfg.port, 514);
        assert_eq!(cfg.facility, 1);
    }

    #[test]
    fn tls_config_expand_replaces_placeholders() {
        std::env::set_var("SERBRIDGE_TEST_TLS_DIR", "/etc/serbridge");
        let cfg = TlsConfig {
            cert: "$SERBRIDGE_TEST_TLS_DIR/cert.pem".into(),
            key: "~/key.pem".into(),
            cadata: None,
        };
        let expanded = cfg.expand();
        assert_eq!(expanded.cert, "/etc/serbridge/cert.pem");
        assert!(!expanded.key.starts_with('~'));
        std::env::remove_var("SERBRIDGE_TEST_TLS_DIR");
    }

    #[test]
    fn server_config_roundtrip() {
        let json = r#"{"name": "bench", "bridges": [
            {"uart": {"port": 1, "parity": 1}, "tcp": {"bind": ["10.0.0.1", 9000]}, "auth": {"password": "x"}}
        ]}"#;
        let cfg: ServerConfig = serde_json::from_str(json).unwrap();
        let back: ServerConfig =
            serde_json::from_str(&serde_json::to_string(&cfg).unwrap()).unwrap();
        assert_eq!(back, cfg);
    }
}
