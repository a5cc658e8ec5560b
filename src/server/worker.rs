//! Per-connection dispatch loop.

use std::net::TcpStream;

use tracing::{info, trace, warn};

use crate::protocol::framing;
use crate::protocol::marshal::RpcRequest;
use crate::transport::Connection;

use super::handlers;
use super::ServerError;

/// Worker entry point. Serves one client until it disconnects or the
/// session turns out to be unsalvageable (transport failure or a malformed
/// frame/message, which leave no way to find the next message boundary).
pub(super) fn serve(stream: TcpStream, max_message_len: usize) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());

    match serve_loop(Connection::new(stream), max_message_len) {
        Ok(()) => info!("client {} disconnected", peer),
        Err(e) => warn!("session with {} ended: {}", peer, e),
    }
}

fn serve_loop(mut conn: Connection, max_message_len: usize) -> Result<(), ServerError> {
    let mut rxbuf = Vec::new();
    loop {
        let peer_closed = conn.recv_available(&mut rxbuf)?;

        // Drain every complete message before going back to the socket;
        // one read may have delivered several pipelined requests.
        while let Some(message) = framing::extract_message(&mut rxbuf, max_message_len)? {
            let request = RpcRequest::decode(&message)?;
            trace!(?request, "dispatching");
            if let Some(response) = handlers::dispatch(&request)? {
                conn.send_message(&response.encode())?;
            }
        }

        if peer_closed {
            return Ok(());
        }
    }
}
