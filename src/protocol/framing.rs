//! Length-prefixed message envelope.
//!
//! One header line, a blank line, then an exact number of opaque payload
//! bytes:
//!
//! ```text
//! Message-Length:<decimal>\r\n\r\n<payload>
//! ```
//!
//! [`extract_message`] is re-entrant over partial data: it may be called any
//! number of times between reads and consumes complete messages one at a
//! time, compacting the receive buffer as it goes.

use super::ProtocolError;

/// Header naming the payload length.
pub const HEADER_MSG_LEN: &str = "Message-Length";

/// Line terminator used by every header line.
pub const CRLF: &[u8] = b"\r\n";

/// Separator between the envelope header and the payload.
pub const HEADER_SPLIT: &[u8] = b"\r\n\r\n";

/// Wrap a payload in the length-prefixed envelope.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let header = format!("{}:{}", HEADER_MSG_LEN, payload.len());
    let mut out = Vec::with_capacity(header.len() + HEADER_SPLIT.len() + payload.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(HEADER_SPLIT);
    out.extend_from_slice(payload);
    out
}

/// Try to take one complete message out of the receive buffer.
///
/// Returns `Ok(None)` when the buffer does not yet hold a full envelope; the
/// buffer contents are preserved so more bytes can be appended. On success
/// the payload is removed from the buffer and the remainder is compacted to
/// the front.
///
/// A header without a colon before the separator, a non-numeric length, or a
/// length above `max_len` is a [`ProtocolError::MalformedFrame`]; the caller
/// is expected to close the connection.
pub fn extract_message(
    rxbuf: &mut Vec<u8>,
    max_len: usize,
) -> Result<Option<Vec<u8>>, ProtocolError> {
    let split = match find(rxbuf, HEADER_SPLIT) {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let header = &rxbuf[..split];
    let colon = header
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| ProtocolError::MalformedFrame("no colon in envelope header".into()))?;

    let len = parse_len(&header[colon + 1..])?;
    if len > max_len {
        return Err(ProtocolError::MalformedFrame(format!(
            "declared length {} exceeds limit {}",
            len, max_len
        )));
    }

    let payload_start = split + HEADER_SPLIT.len();
    if rxbuf.len() < payload_start + len {
        // Envelope complete but payload still in flight.
        return Ok(None);
    }

    let payload = rxbuf[payload_start..payload_start + len].to_vec();
    rxbuf.drain(..payload_start + len);
    Ok(Some(payload))
}

fn parse_len(bytes: &[u8]) -> Result<usize, ProtocolError> {
    if bytes.is_empty() || !bytes.iter().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::MalformedFrame(format!(
            "non-numeric message length {:?}",
            String::from_utf8_lossy(bytes)
        )));
    }
    let s = std::str::from_utf8(bytes).expect("ascii digits");
    s.parse::<usize>()
        .map_err(|_| ProtocolError::MalformedFrame(format!("message length {} out of range", s)))
}

/// First occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
