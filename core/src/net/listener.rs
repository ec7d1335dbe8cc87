use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::info;

use super::transport::{PlainTransport, Transport};
use crate::config::BindAddress;

/// Backlog passed to `listen(2)`.
const LISTEN_BACKLOG: i32 = 5;

/// A freshly accepted client connection.
pub struct Accepted {
    pub transport: Box<dyn Transport>,
    pub peer: SocketAddr,
}

/// A bound listening endpoint a bridge accepts clients from.
pub trait Listener {
    /// Accept one pending connection.
    ///
    /// `Ok(None)` means nothing usable was pending (spurious wakeup or a
    /// connection that failed during setup).
    fn accept(&mut self) -> io::Result<Option<Accepted>>;

    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Descriptor to watch for incoming connections.
    fn as_raw_fd(&self) -> RawFd;
}

/// Bind a non-blocking TCP listener with `SO_REUSEADDR`.
pub fn bind_tcp(address: &BindAddress) -> io::Result<TcpListener> {
    let addr = address.resolve()?;
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Accept one pending connection from a non-blocking listener.
pub fn accept_tcp(listener: &TcpListener) -> io::Result<Option<(TcpStream, SocketAddr)>> {
    match listener.accept() {
        Ok(pair) => Ok(Some(pair)),
        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e),
    }
}

/// Plain TCP listener producing [`PlainTransport`] clients.
pub struct PlainListener {
    listener: TcpListener,
}

impl PlainListener {
    pub fn bind(address: &BindAddress) -> io::Result<Self> {
        let listener = bind_tcp(address)?;
        info!("Listening at TCP {}", listener.local_addr()?);
        Ok(Self { listener })
    }
}

impl Listener for PlainListener {
    fn accept(&mut self) -> io::Result<Option<Accepted>> {
        let Some((stream, peer)) = accept_tcp(&self.listener)? else {
            return Ok(None);
        };
        let transport = PlainTransport::new(stream)?;
        Ok(Some(Accepted {
            transport: Box::new(transport),
            peer,
        }))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn as_raw_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }
}
