//! TeleFS - Remote File Operation RPC
//!
//! TeleFS executes a fixed set of POSIX file operations on a remote host as
//! if they had been made locally. A client program calls through a stub with
//! the usual call signatures; each call is either serviced locally (when it
//! targets a local file handle) or marshalled, framed, and forwarded to a
//! server process that invokes the real system call on the client's behalf.
//!
//! # Architecture
//!
//! - **Protocol Layer** ([`protocol`]): Length-prefixed message framing,
//!   self-describing request/response marshalling, the directory-tree codec,
//!   and the local/remote file-handle namespace split
//! - **Transport Layer** ([`transport`]): Reliable byte I/O over a connected
//!   TCP stream with partial-write retry and partial-read accumulation
//! - **Client Stub** ([`client`]): POSIX-shaped wrappers that classify
//!   local vs. remote handles, issue requests, and translate results and
//!   errno back to the caller
//! - **Server** ([`server`]): Per-connection dispatch loop that decodes
//!   requests, invokes the real system calls, and marshals the results
//!
//! # Wire Protocol
//!
//! Every message travels in a `Message-Length:<n>\r\n\r\n<payload>` envelope.
//! Request payloads carry `Command` and `ParamNum` headers followed by
//! length-prefixed parameter slots; responses mirror this with `Errno` and
//! `ReturnNum`. Integers are signed decimal ASCII; opaque slots are raw bytes
//! with an authoritative length, so payloads may contain any byte values.
//!
//! # Example
//!
//! ```rust,no_run
//! use telefs::client::file_ops::FileClient;
//! use telefs::config::ClientConfig;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut fc = FileClient::connect(&ClientConfig::from_env())?;
//! let fd = fc.open("/tmp/a.txt", libc::O_RDONLY, 0);
//! let mut buf = [0u8; 64];
//! let n = fc.read(fd, &mut buf);
//! fc.close(fd);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod transport;

pub(crate) mod errno;
pub(crate) mod sysdir;
