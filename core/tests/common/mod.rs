//! Shared test utilities for serbridge core integration tests.
//!
//! In-memory stand-ins for the UART, the listening socket and client
//! connections, so bridge behavior can be driven step by step without
//! real devices or sockets.

// Each integration test is compiled as its own crate, so not every test file
// uses every function from this shared module. Suppress dead_code warnings.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::rc::Rc;

use serbridge_core::bridge::{Bridge, BridgeEvent, BridgeOptions};
use serbridge_core::config::{
    AuthConfig, BindAddress, BridgeConfig, LogSettings, PortSelector, TcpConfig, UartConfig,
};
use serbridge_core::errors::SerialError;
use serbridge_core::net::{Accepted, Listener, Received, Transport};
use serbridge_core::serial::SerialLine;

pub const BRIDGE_PORT: u16 = 2323;

/// What the fake UART saw and what it will produce.
#[derive(Debug, Default)]
pub struct UartLog {
    pub written: Vec<u8>,
    pub incoming: VecDeque<u8>,
    pub breaks: usize,
    pub applied: Vec<UartConfig>,
    pub fail_reconfigure: bool,
}

pub struct FakeUart {
    log: Rc<RefCell<UartLog>>,
}

impl SerialLine for FakeUart {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut log = self.log.borrow_mut();
        let n = buf.len().min(log.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(log.incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.log.borrow_mut().written.extend_from_slice(data);
        Ok(())
    }

    fn send_break(&mut self) -> io::Result<()> {
        self.log.borrow_mut().breaks += 1;
        Ok(())
    }

    fn reconfigure(&mut self, config: &UartConfig) -> Result<(), SerialError> {
        let mut log = self.log.borrow_mut();
        if log.fail_reconfigure {
            return Err(SerialError::Configure {
                port: config.port.device_path(),
                message: "rejected by fake".to_string(),
            });
        }
        log.applied.push(config.clone());
        Ok(())
    }

    fn as_raw_fd(&self) -> RawFd {
        -1
    }
}

/// Both directions of one fake client connection.
#[derive(Debug, Default)]
pub struct ClientWire {
    pub to_bridge: VecDeque<Vec<u8>>,
    pub from_bridge: Vec<u8>,
    pub hung_up: bool,
    pub shut_down: bool,
    pub fail_send: bool,
}

pub type Wire = Rc<RefCell<ClientWire>>;

struct FakeTransport {
    wire: Wire,
}

impl Transport for FakeTransport {
    fn receive(&mut self, max: usize) -> io::Result<Received> {
        let mut wire = self.wire.borrow_mut();
        match wire.to_bridge.pop_front() {
            Some(mut unit) => {
                if unit.len() > max {
                    let rest = unit.split_off(max);
                    wire.to_bridge.push_front(rest);
                }
                Ok(Received::Data(unit))
            }
            None if wire.hung_up => Ok(Received::Closed),
            None => Ok(Received::Pending),
        }
    }

    fn send_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut wire = self.wire.borrow_mut();
        if wire.fail_send {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        wire.from_bridge.extend_from_slice(data);
        Ok(())
    }

    fn as_raw_fd(&self) -> RawFd {
        -1
    }

    fn shutdown(&mut self) {
        self.wire.borrow_mut().shut_down = true;
    }
}

struct FakeListener {
    pending: Rc<RefCell<VecDeque<Wire>>>,
    accepted: u16,
}

impl Listener for FakeListener {
    fn accept(&mut self) -> io::Result<Option<Accepted>> {
        let Some(wire) = self.pending.borrow_mut().pop_front() else {
            return Ok(None);
        };
        self.accepted += 1;
        let peer = SocketAddr::from(([127, 0, 0, 1], 40000 + self.accepted));
        Ok(Some(Accepted {
            transport: Box::new(FakeTransport { wire }),
            peer,
        }))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::from(([127, 0, 0, 1], BRIDGE_PORT)))
    }

    fn as_raw_fd(&self) -> RawFd {
        -1
    }
}

/// Handles the test keeps after the fakes move into the bridge.
pub struct Harness {
    pub uart: Rc<RefCell<UartLog>>,
    pending: Rc<RefCell<VecDeque<Wire>>>,
}

impl Harness {
    /// Queue a connection and let the bridge accept it.
    pub fn connect(&self, bridge: &mut Bridge) -> Wire {
        let wire = Wire::default();
        self.pending.borrow_mut().push_back(wire.clone());
        bridge.accept();
        wire
    }

    /// Make `bytes` arrive from the UART and let the bridge read them.
    pub fn uart_emits(&self, bridge: &mut Bridge, bytes: &[u8]) {
        self.uart.borrow_mut().incoming.extend(bytes.iter().copied());
        while !self.uart.borrow().incoming.is_empty() {
            bridge.handle_uart();
        }
    }

    pub fn uart_written(&self) -> Vec<u8> {
        self.uart.borrow().written.clone()
    }
}

/// Deliver one received unit from the current client.
pub fn type_in(bridge: &mut Bridge, wire: &Wire, bytes: &[u8]) -> BridgeEvent {
    wire.borrow_mut().to_bridge.push_back(bytes.to_vec());
    let (id, _) = bridge.client_fd().expect("client attached");
    bridge.handle_client(id)
}

/// Drain everything the bridge sent to this client so far.
pub fn take_output(wire: &Wire) -> Vec<u8> {
    std::mem::take(&mut wire.borrow_mut().from_bridge)
}

pub fn bridge_config(password: Option<&str>) -> BridgeConfig {
    BridgeConfig {
        uart: UartConfig::new(PortSelector::Index(1)),
        tcp: TcpConfig {
            bind: BindAddress::all_interfaces(BRIDGE_PORT),
        },
        auth: password.map(|p| AuthConfig {
            password: p.to_string(),
        }),
        ssl: None,
    }
}

pub fn quiet_options() -> BridgeOptions {
    BridgeOptions {
        log: LogSettings { verbose: false },
        ..BridgeOptions::default()
    }
}

pub fn build_bridge(config: BridgeConfig, options: BridgeOptions) -> (Bridge, Harness) {
    let uart = Rc::new(RefCell::new(UartLog::default()));
    let pending = Rc::new(RefCell::new(VecDeque::new()));
    let bridge = Bridge::new(
        config,
        Box::new(FakeUart { log: uart.clone() }),
        Box::new(FakeListener {
            pending: pending.clone(),
            accepted: 0,
        }),
        options,
    );
    (bridge, Harness { uart, pending })
}

pub fn new_bridge(password: Option<&str>) -> (Bridge, Harness) {
    build_bridge(bridge_config(password), quiet_options())
}
