//! Reliable byte I/O over a connected TCP stream.
//!
//! Three primitives cover everything the protocol needs: a write that never
//! reports a short count as success, a blocking read that pulls whatever the
//! kernel has, and a non-blocking drain that scoops up every byte already
//! available so pipelined messages accumulate in one wakeup. Message
//! boundaries are the framer's job, not the transport's.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::FromRawFd;

use thiserror::Error;

use crate::protocol::framing;

/// Read granularity for the receive path.
const RECV_CHUNK: usize = 4096;

/// Transport failures. All of them end the session that observed them.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind listener on {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// A connected byte stream plus the send-side framing entry point.
pub struct Connection {
    stream: TcpStream,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Connect to a server endpoint.
    pub fn connect(addr: &SocketAddr) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).map_err(|e| TransportError::ConnectFailed {
            addr: addr.to_string(),
            source: e,
        })?;
        Ok(Self::new(stream))
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    /// Write the entire buffer, retrying transient interruptions. A short
    /// write is never reported as success; any other error is fatal to the
    /// session.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut written = 0;
        while written < bytes.len() {
            match self.stream.write(&bytes[written..]) {
                Ok(0) => {
                    return Err(TransportError::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "peer stopped accepting bytes",
                    )))
                }
                Ok(n) => written += n,
                Err(e)
                    if e.kind() == io::ErrorKind::Interrupted
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    continue
                }
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
        Ok(())
    }

    /// Frame a payload and write it out in full.
    pub fn send_message(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.write_all(&framing::frame(payload))
    }

    /// Blocking read of at most one chunk. Returns `(bytes_appended,
    /// peer_closed)`; a signal interrupt is retried, a would-block stops the
    /// read cleanly with zero bytes.
    pub fn block_read(&mut self, rxbuf: &mut Vec<u8>) -> Result<(usize, bool), TransportError> {
        let mut chunk = [0u8; RECV_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok((0, true)),
                Ok(n) => {
                    rxbuf.extend_from_slice(&chunk[..n]);
                    return Ok((n, false));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok((0, false)),
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }

    /// Non-blocking drain: append every byte that is immediately available.
    /// The socket must already be in non-blocking mode. Returns `(bytes_appended,
    /// peer_closed)`.
    pub fn drain_read(&mut self, rxbuf: &mut Vec<u8>) -> Result<(usize, bool), TransportError> {
        let mut chunk = [0u8; RECV_CHUNK];
        let mut total = 0;
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok((total, true)),
                Ok(n) => {
                    rxbuf.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok((total, false)),
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }

    /// Receive-path workhorse: block until the peer sends something, then
    /// drain whatever else is already queued so multiple pipelined messages
    /// land in the session buffer in one go. Returns `peer_closed`.
    pub fn recv_available(&mut self, rxbuf: &mut Vec<u8>) -> Result<bool, TransportError> {
        let (_, closed) = self.block_read(rxbuf)?;
        if closed {
            return Ok(true);
        }
        self.stream.set_nonblocking(true)?;
        let drained = self.drain_read(rxbuf);
        self.stream.set_nonblocking(false)?;
        let (_, closed) = drained?;
        Ok(closed)
    }
}

/// Build the listening socket: `SO_REUSEADDR`, bound to the given address,
/// with the configured backlog.
pub fn build_listener(addr: &SocketAddr, backlog: i32) -> Result<TcpListener, TransportError> {
    let bind_failed = |source: io::Error| TransportError::BindFailed {
        addr: addr.to_string(),
        source,
    };

    let SocketAddr::V4(v4) = addr else {
        return Err(bind_failed(io::Error::new(
            io::ErrorKind::Unsupported,
            "only IPv4 endpoints are supported",
        )));
    };

    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0);
        if fd < 0 {
            return Err(bind_failed(io::Error::last_os_error()));
        }
        // Close the raw fd on any failure below by owning it immediately.
        let listener = TcpListener::from_raw_fd(fd);

        let yes: libc::c_int = 1;
        if libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &yes as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        ) < 0
        {
            return Err(bind_failed(io::Error::last_os_error()));
        }

        let mut sin: libc::sockaddr_in = std::mem::zeroed();
        sin.sin_family = libc::AF_INET as libc::sa_family_t;
        sin.sin_port = v4.port().to_be();
        sin.sin_addr.s_addr = u32::from(*v4.ip()).to_be();

        if libc::bind(
            fd,
            &sin as *const _ as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        ) < 0
        {
            return Err(bind_failed(io::Error::last_os_error()));
        }

        if libc::listen(fd, backlog) < 0 {
            return Err(bind_failed(io::Error::last_os_error()));
        }

        Ok(listener)
    }
}
