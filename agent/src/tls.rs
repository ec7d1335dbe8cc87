//! TLS-wrapped listener and client transport (OpenSSL).
//!
//! The handshake runs blocking, bounded by [`HANDSHAKE_TIMEOUT`], right
//! after `accept`; the established stream then switches to non-blocking
//! mode like a plain client.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener};
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;
use nix::poll::PollFlags;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{ErrorCode, SslAcceptor, SslMethod, SslStream, SslVerifyMode};
use openssl::x509::X509;
use serbridge_core::config::{BindAddress, TlsConfig};
use serbridge_core::net::{
    accept_tcp, bind_tcp, wait_ready, Accepted, Listener, Received, Transport, SEND_TIMEOUT,
};
use tracing::{info, warn};

pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a server context from the certificate, key and optional CA files.
pub fn build_acceptor(tls: &TlsConfig) -> anyhow::Result<SslAcceptor> {
    let cert = load_certificate(Path::new(&tls.cert))?;
    let key = load_private_key(Path::new(&tls.key))?;

    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls_server())?;
    builder.set_certificate(&cert)?;
    builder.set_private_key(&key)?;
    builder
        .check_private_key()
        .with_context(|| format!("key {} does not match certificate {}", tls.key, tls.cert))?;
    if let Some(ca) = &tls.cadata {
        let ca = load_certificate(Path::new(ca))?;
        builder.cert_store_mut().add_cert(ca)?;
    }
    // Verify a client certificate when one is offered; do not demand one.
    builder.set_verify(SslVerifyMode::PEER);
    Ok(builder.build())
}

fn load_certificate(path: &Path) -> anyhow::Result<X509> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read certificate {}", path.display()))?;
    X509::from_pem(&bytes)
        .or_else(|_| X509::from_der(&bytes))
        .with_context(|| format!("{} is neither a PEM nor a DER certificate", path.display()))
}

fn load_private_key(path: &Path) -> anyhow::Result<PKey<Private>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read private key {}", path.display()))?;
    PKey::private_key_from_pem(&bytes)
        .or_else(|_| PKey::private_key_from_der(&bytes))
        .with_context(|| format!("{} is neither a PEM nor a DER private key", path.display()))
}

pub struct TlsListener {
    listener: TcpListener,
    acceptor: SslAcceptor,
}

impl TlsListener {
    pub fn bind(address: &BindAddress, tls: &TlsConfig) -> anyhow::Result<Self> {
        let acceptor = build_acceptor(tls)?;
        let listener =
            bind_tcp(address).with_context(|| format!("failed to bind TCP {}", address))?;
        info!("Listening at TLS {}", listener.local_addr()?);
        Ok(Self { listener, acceptor })
    }
}

impl Listener for TlsListener {
    fn accept(&mut self) -> io::Result<Option<Accepted>> {
        let Some((stream, peer)) = accept_tcp(&self.listener)? else {
            return Ok(None);
        };
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
        stream.set_write_timeout(Some(HANDSHAKE_TIMEOUT))?;

        let stream = match self.acceptor.accept(stream) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("TLS handshake with {} failed: {}", peer, e);
                return Ok(None);
            }
        };
        let tcp = stream.get_ref();
        tcp.set_read_timeout(None)?;
        tcp.set_write_timeout(None)?;
        tcp.set_nonblocking(true)?;
        tcp.set_nodelay(true)?;
        Ok(Some(Accepted {
            transport: Box::new(TlsTransport { stream }),
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

pub struct TlsTransport {
    stream: SslStream<std::net::TcpStream>,
}

impl Transport for TlsTransport {
    /// Decrypted bytes already buffered inside OpenSSL are drained in the
    /// same call, since the socket will not report them as readable.
    fn receive(&mut self, max: usize) -> io::Result<Received> {
        let mut buf = vec![0u8; max];
        let n = match self.stream.ssl_read(&mut buf) {
            Ok(0) => return Ok(Received::Closed),
            Ok(n) => n,
            Err(e) => {
                let code = e.code();
                if code == ErrorCode::WANT_READ || code == ErrorCode::WANT_WRITE {
                    return Ok(Received::Pending);
                }
                // A SYSCALL error without an OS error is an unclean EOF.
                if code == ErrorCode::ZERO_RETURN
                    || (code == ErrorCode::SYSCALL && e.io_error().is_none())
                {
                    return Ok(Received::Closed);
                }
                return Err(into_io_error(e));
            }
        };
        buf.truncate(n);

        while self.stream.ssl().pending() > 0 {
            let mut more = vec![0u8; self.stream.ssl().pending()];
            match self.stream.ssl_read(&mut more) {
                Ok(0) => break,
                Ok(m) => buf.extend_from_slice(&more[..m]),
                Err(_) => break,
            }
        }
        Ok(Received::Data(buf))
    }

    fn send_all(&mut self, mut data: &[u8]) -> io::Result<()> {
        let deadline = Instant::now() + SEND_TIMEOUT;
        while !data.is_empty() {
            match self.stream.ssl_write(data) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => data = &data[n..],
                Err(e) if e.code() == ErrorCode::WANT_WRITE => {
                    wait_ready(self.as_raw_fd(), PollFlags::POLLOUT, deadline)?;
                }
                Err(e) if e.code() == ErrorCode::WANT_READ => {
                    wait_ready(self.as_raw_fd(), PollFlags::POLLIN, deadline)?;
                }
                Err(e) => return Err(into_io_error(e)),
            }
        }
        Ok(())
    }

    fn as_raw_fd(&self) -> RawFd {
        self.stream.get_ref().as_raw_fd()
    }

    fn shutdown(&mut self) {
        let _ = self.stream.shutdown();
        let _ = self.stream.get_ref().shutdown(Shutdown::Both);
    }
}

fn into_io_error(e: openssl::ssl::Error) -> io::Error {
    e.into_io_error()
        .unwrap_or_else(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
}
