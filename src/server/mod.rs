//! Server side: listener lifecycle and per-connection workers.
//!
//! One worker thread per accepted connection; workers share no mutable
//! state, so a slow or stuck client never blocks progress on other clients.
//! Each worker owns its receive buffer, its dispatch state, and the kernel
//! handles it has opened on behalf of its client; all of it dies with the
//! connection.

use std::io;
use std::net::SocketAddr;
use std::net::TcpListener;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::protocol::ProtocolError;
use crate::transport::{self, TransportError};

pub mod dirwalk;
pub mod handlers;
mod worker;

/// Server-side failures. Worker-level errors end one session; listener
/// setup errors end the process.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The accept loop and its listening socket.
pub struct Server {
    listener: TcpListener,
    max_message_len: usize,
}

impl Server {
    /// Bind the listening socket. This is the only failure that should
    /// take the server process down.
    pub fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let listener = transport::build_listener(&config.bind_socket_addr(), config.backlog)?;
        info!("listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            max_message_len: config.max_message_len,
        })
    }

    /// The bound address; useful when the configured port was 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, one worker thread per client. Finished
    /// workers are reaped opportunistically on each accept.
    pub fn run(&self) -> Result<(), ServerError> {
        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("accept failed: {}", e);
                    continue;
                }
            };
            info!("accepted connection from {}", peer);

            let max_message_len = self.max_message_len;
            let spawned = std::thread::Builder::new()
                .name(format!("worker-{}", peer))
                .spawn(move || worker::serve(stream, max_message_len));
            match spawned {
                Ok(handle) => workers.push(handle),
                // Dropping the accepted stream hangs up on this client;
                // the listener keeps serving everyone else.
                Err(e) => error!("failed to spawn worker for {}: {}", peer, e),
            }

            workers.retain(|w| !w.is_finished());
        }
    }
}
