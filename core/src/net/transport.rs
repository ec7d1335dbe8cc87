use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::time::{Duration, Instant};

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

/// Longest a single `send_all` may wait for the peer to drain its window.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a non-waiting receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Application data (never empty).
    Data(Vec<u8>),
    /// Nothing available yet (e.g. a partial TLS record).
    Pending,
    /// The peer closed the connection.
    Closed,
}

/// A connected client stream, plain or TLS-wrapped.
pub trait Transport {
    /// Receive up to `max` bytes of application data without waiting.
    fn receive(&mut self, max: usize) -> io::Result<Received>;

    /// Send every byte, waiting at most [`SEND_TIMEOUT`] for writability.
    fn send_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Descriptor to watch for readiness.
    fn as_raw_fd(&self) -> RawFd;

    /// Best-effort orderly close.
    fn shutdown(&mut self);
}

/// Unencrypted TCP client.
pub struct PlainTransport {
    stream: TcpStream,
}

impl PlainTransport {
    /// Wrap a connected stream, switching it to non-blocking mode.
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

impl Transport for PlainTransport {
    fn receive(&mut self, max: usize) -> io::Result<Received> {
        let mut buf = vec![0u8; max];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return Ok(Received::Closed),
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(Received::Data(buf));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Received::Pending)
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn send_all(&mut self, mut data: &[u8]) -> io::Result<()> {
        let deadline = Instant::now() + SEND_TIMEOUT;
        while !data.is_empty() {
            match self.stream.write(data) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => data = &data[n..],
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    wait_ready(self.stream.as_raw_fd(), PollFlags::POLLOUT, deadline)?;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    fn shutdown(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Wait until `fd` reports `events` or `deadline` passes.
///
/// Used by transports to bound a send that hit a full socket buffer.
pub fn wait_ready(fd: RawFd, events: PollFlags, deadline: Instant) -> io::Result<()> {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "peer did not become ready in time",
            ));
        }
        let millis = u16::try_from(remaining.as_millis()).unwrap_or(u16::MAX);
        // SAFETY: the caller owns `fd` for the duration of this call.
        let bfd = unsafe { BorrowedFd::borrow_raw(fd) };
        let mut fds = [PollFd::new(bfd, events)];
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) => continue,
            Ok(_) => return Ok(()),
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn pair() -> (PlainTransport, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (PlainTransport::new(server).unwrap(), client)
    }

    #[test]
    fn receive_pending_then_data() {
        let (mut transport, mut client) = pair();
        assert_eq!(transport.receive(16).unwrap(), Received::Pending);

        client.write_all(b"hello").unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        wait_ready(transport.as_raw_fd(), PollFlags::POLLIN, deadline).unwrap();
        assert_eq!(
            transport.receive(16).unwrap(),
            Received::Data(b"hello".to_vec())
        );
    }

    #[test]
    fn receive_respects_max() {
        let (mut transport, mut client) = pair();
        client.write_all(b"abcdef").unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        wait_ready(transport.as_raw_fd(), PollFlags::POLLIN, deadline).unwrap();
        assert_eq!(transport.receive(4).unwrap(), Received::Data(b"abcd".to_vec()));
    }

    #[test]
    fn receive_reports_close() {
        let (mut transport, client) = pair();
        drop(client);
        let deadline = Instant::now() + Duration::from_secs(2);
        wait_ready(transport.as_raw_fd(), PollFlags::POLLIN, deadline).unwrap();
        assert_eq!(transport.receive(16).unwrap(), Received::Closed);
    }

    #[test]
    fn send_all_delivers() {
        let (mut transport, mut client) = pair();
        transport.send_all(b"password: ").unwrap();
        let mut buf = [0u8; 10];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"password: ");
    }

    #[test]
    fn wait_ready_times_out() {
        let (transport, _client) = pair();
        let err = wait_ready(
            transport.as_raw_fd(),
            PollFlags::POLLIN,
            Instant::now() + Duration::from_millis(20),
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
