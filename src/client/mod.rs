//! Client side: the RPC session and the POSIX-shaped call stubs.
//!
//! [`RpcClient`] owns one server connection and one session receive buffer
//! and exchanges exactly one response per request. [`file_ops::FileClient`]
//! builds on it with the per-call marshalling, local/remote handle
//! classification, and errno conventions. [`stub`] wraps a process-wide
//! session for callers that expect library-load-style global state.

use thiserror::Error;
use tracing::trace;

use crate::config::ClientConfig;
use crate::protocol::framing;
use crate::protocol::marshal::{RpcRequest, RpcResponse};
use crate::protocol::ProtocolError;
use crate::transport::{Connection, TransportError};

pub mod file_ops;
pub mod stub;

/// Client-side failures. Transport and protocol errors end the session; the
/// stub reports them to its caller as `EIO`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("server closed the connection")]
    ConnectionClosed,
}

/// One RPC session: a connection plus the receive buffer the framer carves
/// messages out of.
///
/// Request/response pairs are strictly ordered on a session; callers that
/// share one session across threads must serialize whole exchanges (see
/// [`stub`], which holds its lock for the full send-then-await window).
pub struct RpcClient {
    conn: Connection,
    rxbuf: Vec<u8>,
    max_message_len: usize,
}

impl RpcClient {
    /// Connect to the configured server endpoint.
    pub fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let addr = config.server_socket_addr();
        let conn = Connection::connect(&addr)?;
        trace!("connected to {}", addr);
        Ok(Self {
            conn,
            rxbuf: Vec::new(),
            max_message_len: config.max_message_len,
        })
    }

    /// Send one request and block until its response has been framed and
    /// decoded.
    pub fn call(&mut self, request: &RpcRequest) -> Result<RpcResponse, ClientError> {
        trace!(?request, "sending request");
        self.conn.send_message(&request.encode())?;
        let response = self.wait_response()?;
        trace!(?response, "received response");
        Ok(response)
    }

    /// Blocking receive loop: pull bytes into the session buffer, then try
    /// to extract a complete message. A partial message leaves its bytes in
    /// the buffer and the loop keeps reading.
    fn wait_response(&mut self) -> Result<RpcResponse, ClientError> {
        loop {
            if let Some(message) =
                framing::extract_message(&mut self.rxbuf, self.max_message_len)?
            {
                return Ok(RpcResponse::decode(&message)?);
            }
            let peer_closed = self.conn.recv_available(&mut self.rxbuf)?;
            if peer_closed {
                // The response may have arrived complete alongside the FIN.
                if let Some(message) =
                    framing::extract_message(&mut self.rxbuf, self.max_message_len)?
                {
                    return Ok(RpcResponse::decode(&message)?);
                }
                return Err(ClientError::ConnectionClosed);
            }
        }
    }
}
