//! The per-UART bridge: session state machine and data plane.
//!
//! A [`Bridge`] pairs one UART with one listening socket and serves at
//! most one client at a time. It never waits: every entry point performs
//! one bounded step in response to a readiness event reported by the
//! server's `poll` loop and returns a [`BridgeEvent`].
//!
//! UART output always goes through the ring buffer, whether or not a
//! client is authenticated. When a client logs in with a password, the
//! buffer is rewound so the most recent window of output is replayed.

mod session;

pub use session::SessionState;

use std::net::SocketAddr;
use std::os::fd::RawFd;

use tracing::{debug, info, warn};

use crate::buffer::{RingBuffer, DEFAULT_BUFFER_CAPACITY};
use crate::config::{BridgeConfig, ConfigStore, LogSettings};
use crate::net::{Accepted, Listener, Received, Transport};
use crate::protocol::control::AYT_REPLY;
use crate::protocol::menu::{self, MenuAction, MenuState};
use crate::protocol::{
    ControlSequence, AUTH_FAILED, AUTH_SUCCEEDED, LEAVING_MENU, PASSWORD_PROMPT, RESTARTING,
};
use crate::serial::SerialLine;
use session::{Attempt, PasswordGate};

/// Largest unit moved in one step in either direction.
pub const CHUNK_SIZE: usize = 4096;

/// What a bridge step did, as far as the server loop cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
    /// Nothing the server needs to act on.
    Idle,
    /// A new client took the slot.
    Connected,
    /// The client slot was freed.
    Disconnected,
    /// The operator closed the menu and this bridge is missing from the
    /// persisted configuration; the server should persist and restart.
    ConfigDrift,
}

/// Construction-time settings that are not part of the bridge's own
/// configuration entry.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Device name shown in the menu header.
    pub device_name: String,
    pub log: LogSettings,
    /// Persisted configuration consulted when the menu closes.
    pub store: Option<ConfigStore>,
    pub buffer_capacity: usize,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            device_name: "serbridge".to_string(),
            log: LogSettings::default(),
            store: None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

struct Client {
    id: u64,
    peer: SocketAddr,
    transport: Box<dyn Transport>,
}

pub struct Bridge {
    config: BridgeConfig,
    options: BridgeOptions,
    bind_port: u16,
    state: SessionState,
    menu_state: MenuState,
    gate: PasswordGate,
    /// Drop a lone `\n` completing the CRLF that ended the password.
    swallow_lf: bool,
    buffer: RingBuffer,
    listener: Box<dyn Listener>,
    uart: Box<dyn SerialLine>,
    client: Option<Client>,
    next_client_id: u64,
}

impl Bridge {
    /// Assemble a bridge from an already opened UART and bound listener.
    pub fn new(
        config: BridgeConfig,
        uart: Box<dyn SerialLine>,
        listener: Box<dyn Listener>,
        options: BridgeOptions,
    ) -> Self {
        let bind_port = listener
            .local_addr()
            .map(|a| a.port())
            .unwrap_or(config.tcp.bind.port);
        info!(
            "Bridge listening at TCP({}) for UART({})",
            bind_port, config.uart.port
        );
        Self {
            buffer: RingBuffer::new(options.buffer_capacity),
            config,
            options,
            bind_port,
            state: SessionState::Listening,
            menu_state: MenuState::Main,
            gate: PasswordGate::default(),
            swallow_lf: false,
            listener,
            uart,
            client: None,
            next_client_id: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current menu screen; only meaningful while [`SessionState::InMenu`].
    pub fn menu_state(&self) -> Option<MenuState> {
        (self.state == SessionState::InMenu).then_some(self.menu_state)
    }

    /// Live configuration, including settings changed through the menu.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn client_peer(&self) -> Option<SocketAddr> {
        self.client.as_ref().map(|c| c.peer)
    }

    /// Number of UART bytes waiting for the client.
    pub fn pending_output(&self) -> usize {
        self.buffer.len()
    }

    pub fn listener_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }

    pub fn uart_fd(&self) -> RawFd {
        self.uart.as_raw_fd()
    }

    /// Connection id and descriptor of the current client, if any.
    pub fn client_fd(&self) -> Option<(u64, RawFd)> {
        self.client
            .as_ref()
            .map(|c| (c.id, c.transport.as_raw_fd()))
    }

    /// Whether buffered UART output is waiting for an authenticated client.
    pub fn wants_write(&self) -> bool {
        self.state == SessionState::Authenticated
            && self.client.is_some()
            && self.buffer.has_data()
    }

    /// The listening socket is readable: evict the current client and
    /// accept the pending one.
    pub fn accept(&mut self) -> BridgeEvent {
        self.close_client();
        match self.listener.accept() {
            Ok(Some(accepted)) => self.attach(accepted),
            Ok(None) => BridgeEvent::Idle,
            Err(e) => {
                warn!("TCP({}) accept failed: {}", self.bind_port, e);
                BridgeEvent::Idle
            }
        }
    }

    /// Install `accepted` as the client, replacing any existing one.
    pub fn attach(&mut self, accepted: Accepted) -> BridgeEvent {
        self.close_client();
        self.next_client_id += 1;
        info!("Accepted connection from {}", accepted.peer);
        self.client = Some(Client {
            id: self.next_client_id,
            peer: accepted.peer,
            transport: accepted.transport,
        });

        if self.config.password().is_some() {
            self.state = SessionState::EnterPassword;
            debug!("Prompting for password");
            if self.send(PASSWORD_PROMPT) == BridgeEvent::Disconnected {
                return BridgeEvent::Disconnected;
            }
        } else {
            self.state = SessionState::Authenticated;
        }
        BridgeEvent::Connected
    }

    /// The client socket is readable. Stale ids (an evicted connection
    /// still present in the server's ready list) are ignored.
    pub fn handle_client(&mut self, client_id: u64) -> BridgeEvent {
        let Some(client) = self.client.as_mut() else {
            return BridgeEvent::Idle;
        };
        if client.id != client_id {
            return BridgeEvent::Idle;
        }

        match client.transport.receive(CHUNK_SIZE) {
            Ok(Received::Data(data)) => self.on_client_data(&data),
            Ok(Received::Pending) => BridgeEvent::Idle,
            Ok(Received::Closed) => {
                info!("Client {} disconnected", client.peer);
                self.close_client();
                BridgeEvent::Disconnected
            }
            Err(e) => {
                warn!("Client {} read error: {}", client.peer, e);
                self.close_client();
                BridgeEvent::Disconnected
            }
        }
    }

    /// The UART is readable: buffer what it has and forward a chunk if a
    /// client is authenticated.
    pub fn handle_uart(&mut self) -> BridgeEvent {
        let mut buf = [0u8; CHUNK_SIZE];
        // One read per readiness event; a port with a read timeout would
        // otherwise stall the loop once it runs dry.
        let total = match self.uart.read_available(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                warn!("UART({}) read error: {}", self.config.uart.port, e);
                if self.client.is_some() {
                    self.close_client();
                    return BridgeEvent::Disconnected;
                }
                return BridgeEvent::Idle;
            }
        };
        self.buffer.put(&buf[..total]);

        if total > 0 && self.state != SessionState::Authenticated {
            debug!(
                "Buffering {} bytes from UART({}), no authenticated client",
                total, self.config.uart.port
            );
        }
        self.flush()
    }

    /// Forward one chunk of buffered UART output to an authenticated client.
    pub fn flush(&mut self) -> BridgeEvent {
        if !self.wants_write() {
            return BridgeEvent::Idle;
        }
        let chunk = self.buffer.get(CHUNK_SIZE);
        if self.options.log.verbose {
            info!(
                "UART({})->TCP({}) {:?}",
                self.config.uart.port,
                self.bind_port,
                String::from_utf8_lossy(&chunk)
            );
        }
        self.send(&chunk)
    }

    /// Drop the current client, if any, and free the slot.
    pub fn close_client(&mut self) {
        if let Some(mut client) = self.client.take() {
            info!("Closing client {}", client.peer);
            client.transport.shutdown();
        }
        self.state = SessionState::Listening;
        self.menu_state = MenuState::Main;
        self.gate.reset();
        self.swallow_lf = false;
    }

    /// Tear the bridge down: client, listener and UART are released.
    pub fn close(mut self) {
        self.close_client();
        info!("Closing TCP server on port {}", self.bind_port);
    }

    fn on_client_data(&mut self, data: &[u8]) -> BridgeEvent {
        match self.state {
            SessionState::EnterPassword => self.on_password_input(data),
            SessionState::Authenticated => self.relay(data),
            SessionState::InMenu => self.on_menu_input(data),
            SessionState::Listening => BridgeEvent::Idle,
        }
    }

    fn on_password_input(&mut self, data: &[u8]) -> BridgeEvent {
        let expected = self
            .config
            .password()
            .unwrap_or_default()
            .as_bytes()
            .to_vec();
        let mut rest = data;
        while !rest.is_empty() {
            let (used, attempt) = self.gate.feed(rest, &expected);
            rest = &rest[used..];
            match attempt {
                Attempt::Pending => break,
                Attempt::Failed => {
                    if let Some(client) = &self.client {
                        info!("Authentication failed for {}", client.peer);
                    }
                    if self.send(AUTH_FAILED) == BridgeEvent::Disconnected {
                        return BridgeEvent::Disconnected;
                    }
                }
                Attempt::Accepted => {
                    if let Some(client) = &self.client {
                        info!("Authentication succeeded for {}", client.peer);
                    }
                    self.state = SessionState::Authenticated;
                    self.swallow_lf = self.gate.after_cr();
                    self.buffer.rewind();
                    if self.send(AUTH_SUCCEEDED) == BridgeEvent::Disconnected {
                        return BridgeEvent::Disconnected;
                    }
                    if !rest.is_empty() {
                        return self.relay(rest);
                    }
                    return self.flush();
                }
            }
        }
        BridgeEvent::Idle
    }

    fn relay(&mut self, mut data: &[u8]) -> BridgeEvent {
        if std::mem::take(&mut self.swallow_lf) && data.first() == Some(&b'\n') {
            data = &data[1..];
            if data.is_empty() {
                return BridgeEvent::Idle;
            }
        }

        match ControlSequence::parse(data) {
            Some(ControlSequence::Break) => {
                info!("Sending break to UART({})", self.config.uart.port);
                if let Err(e) = self.uart.send_break() {
                    warn!("UART({}) break failed: {}", self.config.uart.port, e);
                }
                BridgeEvent::Idle
            }
            Some(ControlSequence::AreYouThere) => self.send(AYT_REPLY),
            Some(ControlSequence::Interrupt) => {
                info!("Entering configuration menu on TCP({})", self.bind_port);
                self.state = SessionState::InMenu;
                self.menu_state = MenuState::Main;
                self.redraw()
            }
            None => {
                if self.options.log.verbose {
                    info!(
                        "TCP({})->UART({}) {:?}",
                        self.bind_port,
                        self.config.uart.port,
                        String::from_utf8_lossy(data)
                    );
                }
                if let Err(e) = self.uart.write_all(data) {
                    warn!("UART({}) write error: {}", self.config.uart.port, e);
                    self.close_client();
                    return BridgeEvent::Disconnected;
                }
                BridgeEvent::Idle
            }
        }
    }

    fn on_menu_input(&mut self, data: &[u8]) -> BridgeEvent {
        for key in menu::keys(data) {
            match menu::interpret(self.menu_state, key) {
                MenuAction::Redraw => {}
                MenuAction::Open(screen) => self.menu_state = screen,
                MenuAction::Back => self.menu_state = MenuState::Main,
                MenuAction::Set(change) => {
                    let previous = self.config.uart.clone();
                    change.apply(&mut self.config.uart);
                    if let Err(e) = self.uart.reconfigure(&self.config.uart) {
                        warn!("{}", e);
                        self.config.uart = previous;
                    }
                }
                MenuAction::Close => {
                    self.menu_state = MenuState::Close;
                    return self.close_menu();
                }
            }
        }
        self.redraw()
    }

    fn close_menu(&mut self) -> BridgeEvent {
        let drifted = self.detect_drift();
        self.state = SessionState::Authenticated;
        self.menu_state = MenuState::Main;

        if drifted {
            info!(
                "UART({}) is not in the persisted configuration, requesting restart",
                self.config.uart.port
            );
            let _ = self.send(RESTARTING);
            return BridgeEvent::ConfigDrift;
        }

        info!("Leaving configuration menu on TCP({})", self.bind_port);
        match self.send(LEAVING_MENU) {
            BridgeEvent::Disconnected => BridgeEvent::Disconnected,
            _ => self.flush(),
        }
    }

    /// Whether the persisted bridge list lacks this bridge's UART.
    fn detect_drift(&self) -> bool {
        let Some(store) = &self.options.store else {
            return false;
        };
        match store.read() {
            Ok(persisted) => {
                let device = self.config.uart.port.device_path();
                !persisted
                    .bridges
                    .iter()
                    .any(|b| b.uart.port.device_path() == device)
            }
            Err(e) => {
                warn!(
                    "Could not re-read configuration {}: {}",
                    store.path().display(),
                    e
                );
                false
            }
        }
    }

    fn redraw(&mut self) -> BridgeEvent {
        let screen = menu::render(
            self.menu_state,
            &self.config.uart,
            &self.options.device_name,
        );
        self.send(&screen)
    }

    fn send(&mut self, data: &[u8]) -> BridgeEvent {
        let Some(client) = self.client.as_mut() else {
            return BridgeEvent::Idle;
        };
        match client.transport.send_all(data) {
            Ok(()) => BridgeEvent::Idle,
            Err(e) => {
                warn!("Client {} write error: {}", client.peer, e);
                self.close_client();
                BridgeEvent::Disconnected
            }
        }
    }
}
