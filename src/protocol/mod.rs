//! Wire protocol: framing, marshalling, directory-tree codec, handle bands.
//!
//! Everything in this module is pure: no sockets, no syscalls. The transport
//! layer moves the bytes these codecs produce and consume.

use thiserror::Error;

pub mod dirtree;
pub mod framing;
pub mod handle;
pub mod marshal;

/// Remote procedure opcodes. The numeric values are part of the wire
/// contract and must not change without a coordinated client+server upgrade.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Open = 0,
    Close = 1,
    Read = 2,
    Write = 3,
    Lseek = 4,
    Stat = 5,
    Unlink = 6,
    Getdirentries = 7,
    Getdirtree = 8,
    Freedirtree = 9,
}

impl Opcode {
    /// Decode a wire opcode. Unknown values are preserved by the caller so
    /// the dispatcher can log them and keep the connection alive.
    pub fn from_wire(v: i64) -> Option<Self> {
        match v {
            0 => Some(Opcode::Open),
            1 => Some(Opcode::Close),
            2 => Some(Opcode::Read),
            3 => Some(Opcode::Write),
            4 => Some(Opcode::Lseek),
            5 => Some(Opcode::Stat),
            6 => Some(Opcode::Unlink),
            7 => Some(Opcode::Getdirentries),
            8 => Some(Opcode::Getdirtree),
            9 => Some(Opcode::Freedirtree),
            _ => None,
        }
    }
}

/// Errors raised by the codecs in this module.
///
/// Frame and message errors terminate the session that produced them;
/// argument errors are synchronous encoder-side failures that never reach
/// the wire.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Envelope parse error: missing colon, non-numeric length, or a length
    /// beyond the configured limit.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Payload parse error: missing header, slot-count mismatch, or
    /// non-numeric bytes where an integer was expected.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A value that cannot be represented on the wire, e.g. a tree node name
    /// containing a line terminator.
    #[error("malformed argument: {0}")]
    MalformedArgument(String),
}
