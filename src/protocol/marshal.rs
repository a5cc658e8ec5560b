//! Self-describing request/response marshalling.
//!
//! The codec is deliberately text-oriented: numeric headers are decimal
//! ASCII, parameter bytes are copied verbatim into length-prefixed slots.
//! A request payload looks like
//!
//! ```text
//! Command:<opcode>\r\n
//! ParamNum:<n>\r\n
//! <size-1>\r\n<raw-bytes-1>\r\n
//! ...
//! <size-n>\r\n<raw-bytes-n>\r\n
//! ```
//!
//! and a response mirrors it with `Errno` and `ReturnNum` headers. Because
//! every slot size is declared up front, slot bytes may legally contain any
//! byte values including `\r` and `\n`.

use std::fmt;

use super::{Opcode, ProtocolError};

/// Request header naming the opcode.
pub const HEADER_COMMAND: &str = "Command";
/// Request header naming the parameter count.
pub const HEADER_PARAM_NUM: &str = "ParamNum";
/// Response header carrying the server-side errno (0 when the call succeeded).
pub const HEADER_ERRNO: &str = "Errno";
/// Response header naming the return-slot count.
pub const HEADER_RETURN_NUM: &str = "ReturnNum";

const CRLF: &[u8] = b"\r\n";

/// An RPC request: an opcode plus an ordered list of parameter slots.
///
/// Slots are owned byte buffers; the interpretation of each position
/// (integer, path, opaque blob) is fixed per opcode by the stub and the
/// server dispatcher.
#[derive(Clone, PartialEq, Eq)]
pub struct RpcRequest {
    op: i64,
    params: Vec<Vec<u8>>,
}

impl RpcRequest {
    pub fn new(op: Opcode) -> Self {
        Self {
            op: op as i64,
            params: Vec::new(),
        }
    }

    /// Raw wire opcode. May be outside the known range on the decode path.
    pub fn op(&self) -> i64 {
        self.op
    }

    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_wire(self.op)
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Append an integer parameter in its wire form (signed decimal ASCII).
    pub fn push_int(&mut self, val: i64) {
        self.params.push(val.to_string().into_bytes());
    }

    /// Append an opaque byte parameter.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.params.push(bytes.to_vec());
    }

    /// Parse the slot at `idx` as a signed decimal integer.
    pub fn int_at(&self, idx: usize) -> Result<i64, ProtocolError> {
        parse_int_slot(self.bytes_at(idx)?, idx)
    }

    /// Borrow the raw bytes of the slot at `idx`.
    pub fn bytes_at(&self, idx: usize) -> Result<&[u8], ProtocolError> {
        self.params.get(idx).map(|v| v.as_slice()).ok_or_else(|| {
            ProtocolError::MalformedMessage(format!(
                "request slot {} missing ({} present)",
                idx,
                self.params.len()
            ))
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_header(&mut out, HEADER_COMMAND, self.op);
        push_header(&mut out, HEADER_PARAM_NUM, self.params.len() as i64);
        encode_slots(&mut out, &self.params);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut cur = Cursor::new(buf);
        let op = cur.header_int(HEADER_COMMAND)?;
        let n = cur.header_int(HEADER_PARAM_NUM)?;
        let params = cur.slots(n, "request parameter")?;
        Ok(Self { op, params })
    }
}

impl fmt::Debug for RpcRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("RpcRequest");
        s.field("op", &self.op);
        s.field("params", &SlotList(&self.params));
        s.finish()
    }
}

/// An RPC response: the errno the server's syscall raised (0 when none) plus
/// an ordered list of return slots.
#[derive(Clone, PartialEq, Eq)]
pub struct RpcResponse {
    errno: i32,
    returns: Vec<Vec<u8>>,
}

impl RpcResponse {
    pub fn new(errno: i32) -> Self {
        Self {
            errno,
            returns: Vec::new(),
        }
    }

    pub fn errno(&self) -> i32 {
        self.errno
    }

    pub fn return_count(&self) -> usize {
        self.returns.len()
    }

    pub fn push_int(&mut self, val: i64) {
        self.returns.push(val.to_string().into_bytes());
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.returns.push(bytes.to_vec());
    }

    pub fn int_at(&self, idx: usize) -> Result<i64, ProtocolError> {
        parse_int_slot(self.bytes_at(idx)?, idx)
    }

    pub fn bytes_at(&self, idx: usize) -> Result<&[u8], ProtocolError> {
        self.returns.get(idx).map(|v| v.as_slice()).ok_or_else(|| {
            ProtocolError::MalformedMessage(format!(
                "response slot {} missing ({} present)",
                idx,
                self.returns.len()
            ))
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_header(&mut out, HEADER_ERRNO, i64::from(self.errno));
        push_header(&mut out, HEADER_RETURN_NUM, self.returns.len() as i64);
        encode_slots(&mut out, &self.returns);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut cur = Cursor::new(buf);
        let errno = cur.header_int(HEADER_ERRNO)?;
        let errno = i32::try_from(errno).map_err(|_| {
            ProtocolError::MalformedMessage(format!("errno {} out of range", errno))
        })?;
        let n = cur.header_int(HEADER_RETURN_NUM)?;
        let returns = cur.slots(n, "response return")?;
        Ok(Self { errno, returns })
    }
}

impl fmt::Debug for RpcResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("RpcResponse");
        s.field("errno", &self.errno);
        s.field("returns", &SlotList(&self.returns));
        s.finish()
    }
}

/// Slot list rendered as sizes plus a short lossy preview, so a traced
/// request with a megabyte blob stays readable.
struct SlotList<'a>(&'a [Vec<u8>]);

impl fmt::Debug for SlotList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for slot in self.0 {
            let preview: String = String::from_utf8_lossy(&slot[..slot.len().min(32)])
                .chars()
                .map(|c| if c.is_control() { '.' } else { c })
                .collect();
            list.entry(&format_args!("[{}]{:?}", slot.len(), preview));
        }
        list.finish()
    }
}

fn push_header(out: &mut Vec<u8>, name: &str, val: i64) {
    out.extend_from_slice(name.as_bytes());
    out.push(b':');
    out.extend_from_slice(val.to_string().as_bytes());
    out.extend_from_slice(CRLF);
}

fn encode_slots(out: &mut Vec<u8>, slots: &[Vec<u8>]) {
    for slot in slots {
        out.extend_from_slice(slot.len().to_string().as_bytes());
        out.extend_from_slice(CRLF);
        out.extend_from_slice(slot);
        out.extend_from_slice(CRLF);
    }
}

fn parse_int_slot(bytes: &[u8], idx: usize) -> Result<i64, ProtocolError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            ProtocolError::MalformedMessage(format!(
                "slot {} is not a decimal integer: {:?}",
                idx,
                String::from_utf8_lossy(bytes)
            ))
        })
}

/// Shared decode cursor over a message payload.
pub(super) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(super) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(super) fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Consume one `\r\n`-terminated line and return its contents.
    fn line(&mut self, what: &str) -> Result<&'a [u8], ProtocolError> {
        let rest = &self.buf[self.pos..];
        let end = rest
            .windows(CRLF.len())
            .position(|w| w == CRLF)
            .ok_or_else(|| {
                ProtocolError::MalformedMessage(format!("unterminated {} line", what))
            })?;
        self.pos += end + CRLF.len();
        Ok(&rest[..end])
    }

    /// Consume a `<name>:<value>` header line and return the raw value bytes.
    pub(super) fn header(&mut self, name: &str) -> Result<&'a [u8], ProtocolError> {
        let line = self.line(name)?;
        let colon = line.iter().position(|&b| b == b':').ok_or_else(|| {
            ProtocolError::MalformedMessage(format!("header {} has no colon", name))
        })?;
        if &line[..colon] != name.as_bytes() {
            return Err(ProtocolError::MalformedMessage(format!(
                "expected header {}, found {:?}",
                name,
                String::from_utf8_lossy(&line[..colon])
            )));
        }
        Ok(&line[colon + 1..])
    }

    /// Consume a header line whose value is a signed decimal integer.
    pub(super) fn header_int(&mut self, name: &str) -> Result<i64, ProtocolError> {
        let value = self.header(name)?;
        std::str::from_utf8(value)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| {
                ProtocolError::MalformedMessage(format!(
                    "header {} is not a decimal integer: {:?}",
                    name,
                    String::from_utf8_lossy(value)
                ))
            })
    }

    /// Consume `n` length-prefixed slots.
    fn slots(&mut self, n: i64, what: &str) -> Result<Vec<Vec<u8>>, ProtocolError> {
        if n < 0 {
            return Err(ProtocolError::MalformedMessage(format!(
                "negative {} count {}",
                what, n
            )));
        }
        let mut slots = Vec::new();
        for i in 0..n {
            let size_line = self.line("slot size")?;
            let size = std::str::from_utf8(size_line)
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| {
                    ProtocolError::MalformedMessage(format!(
                        "{} {} has a non-numeric size line",
                        what, i
                    ))
                })?;
            let rest = &self.buf[self.pos..];
            if rest.len() < CRLF.len() || size > rest.len() - CRLF.len() {
                return Err(ProtocolError::MalformedMessage(format!(
                    "{} {} declares {} bytes but only {} remain",
                    what,
                    i,
                    size,
                    rest.len().saturating_sub(CRLF.len())
                )));
            }
            if &rest[size..size + CRLF.len()] != CRLF {
                return Err(ProtocolError::MalformedMessage(format!(
                    "{} {} is not CRLF-terminated after {} bytes",
                    what, i, size
                )));
            }
            slots.push(rest[..size].to_vec());
            self.pos += size + CRLF.len();
        }
        Ok(slots)
    }
}
