//! POSIX-shaped call stubs.
//!
//! Every method keeps the result convention of the call it replaces: the
//! usual sentinel (`-1` or null-equivalent) on failure with the
//! thread-observable errno set to the server-reported value, the documented
//! success value otherwise. Handle-bearing calls first classify the handle:
//! values below the remote band go straight to the real local call and never
//! touch the network.
//!
//! The wire carries client-visible handles; the server subtracts the band
//! offset before touching the kernel, and `open` responses arrive already
//! biased into the remote band.

use std::mem;

use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::errno;
use crate::protocol::dirtree::{self, DirTreeNode};
use crate::protocol::handle;
use crate::protocol::marshal::{RpcRequest, RpcResponse};
use crate::protocol::Opcode;
use crate::sysdir;

use super::{ClientError, RpcClient};

/// A connected file-operation stub: one RPC session plus the marshalling
/// for each interposed call.
pub struct FileClient {
    rpc: RpcClient,
}

impl FileClient {
    pub fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            rpc: RpcClient::connect(config)?,
        })
    }

    /// Run one exchange; transport or decode failures surface as `EIO` per
    /// the propagation policy (the session is already unusable).
    fn exchange(&mut self, request: &RpcRequest) -> Option<RpcResponse> {
        match self.rpc.call(request) {
            Ok(response) => Some(response),
            Err(e) => {
                warn!("remote call failed: {}", e);
                errno::set(libc::EIO);
                None
            }
        }
    }

    /// Open a file on the server. Always remote; a successful return is a
    /// handle in the remote band. `mode` is consulted only when `O_CREAT`
    /// is set, the same rule the variadic libc signature implies.
    pub fn open(&mut self, path: &str, flags: i32, mode: u32) -> i32 {
        debug!("open: path={} flags={:#x}", path, flags);
        let mode = if flags & libc::O_CREAT != 0 { mode } else { 0 };

        let mut request = RpcRequest::new(Opcode::Open);
        request.push_bytes(path.as_bytes());
        request.push_int(i64::from(flags));
        request.push_int(i64::from(mode));

        let Some(response) = self.exchange(&request) else {
            return -1;
        };
        match response.int_at(0) {
            Ok(fd) if fd >= 0 => fd as i32,
            Ok(fd) => {
                errno::set(response.errno());
                fd as i32
            }
            Err(e) => {
                warn!("open: bad response: {}", e);
                errno::set(libc::EIO);
                -1
            }
        }
    }

    pub fn close(&mut self, fd: i32) -> i32 {
        if handle::is_local(i64::from(fd)) {
            return unsafe { libc::close(fd) };
        }
        debug!("close: fd={}", fd);

        let mut request = RpcRequest::new(Opcode::Close);
        request.push_int(i64::from(fd));

        let Some(response) = self.exchange(&request) else {
            return -1;
        };
        self.int_result(&response, 0) as i32
    }

    /// Read up to `buf.len()` bytes. On success the returned bytes are
    /// copied into the caller's buffer.
    pub fn read(&mut self, fd: i32, buf: &mut [u8]) -> isize {
        if handle::is_local(i64::from(fd)) {
            return unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        }
        debug!("read: fd={} count={}", fd, buf.len());

        let mut request = RpcRequest::new(Opcode::Read);
        request.push_int(i64::from(fd));
        // Capacity placeholder: its length conveys the caller's buffer size;
        // the server never looks at its content.
        request.push_bytes(&vec![0u8; buf.len()]);
        request.push_int(buf.len() as i64);

        let Some(response) = self.exchange(&request) else {
            return -1;
        };
        let n = match response.int_at(0) {
            Ok(n) if n < 0 => {
                errno::set(response.errno());
                return -1;
            }
            Ok(n) => n as usize,
            Err(e) => {
                warn!("read: bad response: {}", e);
                errno::set(libc::EIO);
                return -1;
            }
        };
        match response.bytes_at(1) {
            Ok(data) if n <= data.len() && n <= buf.len() => {
                buf[..n].copy_from_slice(&data[..n]);
                n as isize
            }
            _ => {
                warn!("read: returned byte count disagrees with data slot");
                errno::set(libc::EIO);
                -1
            }
        }
    }

    pub fn write(&mut self, fd: i32, buf: &[u8]) -> isize {
        if handle::is_local(i64::from(fd)) {
            return unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        }
        debug!("write: fd={} count={}", fd, buf.len());

        let mut request = RpcRequest::new(Opcode::Write);
        request.push_int(i64::from(fd));
        request.push_bytes(buf);
        request.push_int(buf.len() as i64);

        let Some(response) = self.exchange(&request) else {
            return -1;
        };
        self.int_result(&response, 0) as isize
    }

    pub fn lseek(&mut self, fd: i32, offset: i64, whence: i32) -> i64 {
        if handle::is_local(i64::from(fd)) {
            return unsafe { libc::lseek(fd, offset, whence) };
        }
        debug!("lseek: fd={} offset={} whence={}", fd, offset, whence);

        let mut request = RpcRequest::new(Opcode::Lseek);
        request.push_int(i64::from(fd));
        request.push_int(offset);
        request.push_int(i64::from(whence));

        let Some(response) = self.exchange(&request) else {
            return -1;
        };
        self.int_result(&response, 0)
    }

    /// Stat a remote path. The stat image is raw platform bytes; client and
    /// server must share the same ABI.
    pub fn stat(&mut self, path: &str, statbuf: &mut libc::stat) -> i32 {
        debug!("stat: path={}", path);

        let mut request = RpcRequest::new(Opcode::Stat);
        request.push_bytes(path.as_bytes());

        let Some(response) = self.exchange(&request) else {
            return -1;
        };
        match response.int_at(0) {
            Ok(rc) if rc < 0 => {
                errno::set(response.errno());
                -1
            }
            Ok(rc) => match response.bytes_at(1) {
                Ok(image) if image.len() == mem::size_of::<libc::stat>() => {
                    unsafe {
                        std::ptr::copy_nonoverlapping(
                            image.as_ptr(),
                            statbuf as *mut libc::stat as *mut u8,
                            image.len(),
                        );
                    }
                    rc as i32
                }
                _ => {
                    warn!("stat: image size disagrees with platform layout");
                    errno::set(libc::EIO);
                    -1
                }
            },
            Err(e) => {
                warn!("stat: bad response: {}", e);
                errno::set(libc::EIO);
                -1
            }
        }
    }

    pub fn unlink(&mut self, path: &str) -> i32 {
        debug!("unlink: path={}", path);

        let mut request = RpcRequest::new(Opcode::Unlink);
        request.push_bytes(path.as_bytes());

        let Some(response) = self.exchange(&request) else {
            return -1;
        };
        self.int_result(&response, 0) as i32
    }

    /// Read directory entries into `buf`, resuming from and updating
    /// `basep`. The entries blob is raw platform bytes.
    pub fn getdirentries(&mut self, fd: i32, buf: &mut [u8], basep: &mut i64) -> isize {
        if handle::is_local(i64::from(fd)) {
            return unsafe { sysdir::getdirentries(fd, buf, basep) };
        }
        debug!("getdirentries: fd={} nbytes={} basep={}", fd, buf.len(), basep);

        let mut request = RpcRequest::new(Opcode::Getdirentries);
        request.push_int(i64::from(fd));
        request.push_int(buf.len() as i64);
        request.push_int(*basep);

        let Some(response) = self.exchange(&request) else {
            return -1;
        };
        let rc = match response.int_at(0) {
            Ok(rc) if rc < 0 => {
                errno::set(response.errno());
                return -1;
            }
            Ok(rc) => rc as usize,
            Err(e) => {
                warn!("getdirentries: bad response: {}", e);
                errno::set(libc::EIO);
                return -1;
            }
        };
        match (response.bytes_at(1), response.int_at(2)) {
            (Ok(entries), Ok(newbase)) if rc <= entries.len() && rc <= buf.len() => {
                buf[..rc].copy_from_slice(&entries[..rc]);
                *basep = newbase;
                rc as isize
            }
            _ => {
                warn!("getdirentries: returned count disagrees with entry slot");
                errno::set(libc::EIO);
                -1
            }
        }
    }

    /// Enumerate a remote directory subtree. Returns `None` with errno set
    /// when the server could not produce a tree.
    pub fn getdirtree(&mut self, path: &str) -> Option<DirTreeNode> {
        debug!("getdirtree: path={}", path);

        let mut request = RpcRequest::new(Opcode::Getdirtree);
        request.push_bytes(path.as_bytes());

        let response = self.exchange(&request)?;
        if response.errno() != 0 {
            errno::set(response.errno());
            return None;
        }
        match response.bytes_at(0).map(dirtree::decode_tree) {
            Ok(Ok(tree)) => Some(tree),
            Ok(Err(e)) | Err(e) => {
                warn!("getdirtree: bad tree payload: {}", e);
                errno::set(libc::EIO);
                None
            }
        }
    }

    /// Release a tree obtained from [`getdirtree`](Self::getdirtree).
    /// Purely local: ownership is consumed and every child node is released
    /// with its parent.
    pub fn freedirtree(tree: DirTreeNode) {
        debug!("freedirtree: {} nodes", tree.node_count());
        drop(tree);
    }

    /// Shared interpretation for single-integer responses: negative return
    /// means the syscall failed and the response errno applies.
    fn int_result(&mut self, response: &RpcResponse, idx: usize) -> i64 {
        match response.int_at(idx) {
            Ok(rc) if rc < 0 => {
                errno::set(response.errno());
                rc
            }
            Ok(rc) => rc,
            Err(e) => {
                warn!("bad response slot: {}", e);
                errno::set(libc::EIO);
                -1
            }
        }
    }
}
