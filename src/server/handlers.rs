//! Per-opcode request handlers.
//!
//! Every handler follows the same shape: interpret the parameter slots per
//! the operation's contract, invoke the real system call with the handle
//! translated out of the client-visible band, and marshal a response whose
//! `Errno` is whatever the call raised (0 when it did not fail). Syscall
//! failures are the common case and never terminate the session; only a
//! structurally malformed request does.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use tracing::{debug, warn};

use crate::errno;
use crate::protocol::dirtree;
use crate::protocol::handle;
use crate::protocol::marshal::{RpcRequest, RpcResponse};
use crate::protocol::{Opcode, ProtocolError};
use crate::sysdir;

/// Largest read/getdirentries transfer the server will stage in memory.
/// A count beyond this (with no matching payload behind it) is a client
/// bug, answered with EINVAL rather than an allocation.
const MAX_TRANSFER: usize = 64 * 1024 * 1024;

/// Dispatch one decoded request. `Ok(None)` means no response is owed:
/// the opcode was unknown (logged and skipped, connection continues) or
/// purely client-local.
pub fn dispatch(request: &RpcRequest) -> Result<Option<RpcResponse>, ProtocolError> {
    let Some(op) = request.opcode() else {
        warn!("unknown opcode {}, skipping request", request.op());
        return Ok(None);
    };
    let response = match op {
        Opcode::Open => serve_open(request)?,
        Opcode::Close => serve_close(request)?,
        Opcode::Read => serve_read(request)?,
        Opcode::Write => serve_write(request)?,
        Opcode::Lseek => serve_lseek(request)?,
        Opcode::Stat => serve_stat(request)?,
        Opcode::Unlink => serve_unlink(request)?,
        Opcode::Getdirentries => serve_getdirentries(request)?,
        Opcode::Getdirtree => serve_getdirtree(request)?,
        Opcode::Freedirtree => {
            warn!("freedirtree has no remote side, skipping request");
            return Ok(None);
        }
    };
    Ok(Some(response))
}

/// Run a syscall with a clean errno and report what it raised, leaving the
/// worker's own errno undisturbed.
fn with_errno<T>(f: impl FnOnce() -> T) -> (T, i32) {
    let saved = errno::get();
    errno::set(0);
    let ret = f();
    let raised = errno::get();
    errno::set(saved);
    (ret, raised)
}

/// Response for a request whose slots are self-consistent but whose values
/// the kernel should never see (interior NUL in a path, absurd count).
fn invalid_argument() -> RpcResponse {
    let mut response = RpcResponse::new(libc::EINVAL);
    response.push_int(-1);
    response
}

fn path_arg(request: &RpcRequest, idx: usize) -> Result<Option<CString>, ProtocolError> {
    Ok(CString::new(request.bytes_at(idx)?).ok())
}

fn serve_open(request: &RpcRequest) -> Result<RpcResponse, ProtocolError> {
    let Some(path) = path_arg(request, 0)? else {
        return Ok(invalid_argument());
    };
    let flags = request.int_at(1)? as i32;
    let mode = request.int_at(2)? as libc::mode_t;

    let (fd, raised) = with_errno(|| unsafe {
        libc::open(path.as_ptr(), flags, libc::c_uint::from(mode))
    });
    let fd = if fd >= 0 {
        handle::to_client(i64::from(fd))
    } else {
        i64::from(fd)
    };
    debug!("open {:?} flags={:#x} -> {} (errno {})", path, flags, fd, raised);

    let mut response = RpcResponse::new(raised);
    response.push_int(fd);
    Ok(response)
}

fn serve_close(request: &RpcRequest) -> Result<RpcResponse, ProtocolError> {
    let fd = handle::to_server(request.int_at(0)?) as i32;

    let (rc, raised) = with_errno(|| unsafe { libc::close(fd) });
    debug!("close fd={} -> {} (errno {})", fd, rc, raised);

    let mut response = RpcResponse::new(raised);
    response.push_int(i64::from(rc));
    Ok(response)
}

fn serve_read(request: &RpcRequest) -> Result<RpcResponse, ProtocolError> {
    let fd = handle::to_server(request.int_at(0)?) as i32;
    let count = request.int_at(2)?;
    if count < 0 || count as usize > MAX_TRANSFER {
        return Ok(invalid_argument());
    }
    let count = count as usize;

    let mut buf = vec![0u8; count];
    let (rc, raised) = with_errno(|| unsafe {
        libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, count)
    });
    debug!("read fd={} count={} -> {} (errno {})", fd, count, rc, raised);

    let mut response = RpcResponse::new(raised);
    response.push_int(rc as i64);
    response.push_bytes(&buf[..rc.max(0) as usize]);
    Ok(response)
}

fn serve_write(request: &RpcRequest) -> Result<RpcResponse, ProtocolError> {
    let fd = handle::to_server(request.int_at(0)?) as i32;
    let data = request.bytes_at(1)?;
    let count = request.int_at(2)?;
    if count < 0 || count as usize > data.len() {
        return Ok(invalid_argument());
    }
    let count = count as usize;

    let (rc, raised) = with_errno(|| unsafe {
        libc::write(fd, data.as_ptr() as *const libc::c_void, count)
    });
    debug!("write fd={} count={} -> {} (errno {})", fd, count, rc, raised);

    let mut response = RpcResponse::new(raised);
    response.push_int(rc as i64);
    Ok(response)
}

fn serve_lseek(request: &RpcRequest) -> Result<RpcResponse, ProtocolError> {
    let fd = handle::to_server(request.int_at(0)?) as i32;
    let offset = request.int_at(1)?;
    let whence = request.int_at(2)? as i32;

    let (pos, raised) = with_errno(|| unsafe { libc::lseek(fd, offset, whence) });
    debug!(
        "lseek fd={} offset={} whence={} -> {} (errno {})",
        fd, offset, whence, pos, raised
    );

    let mut response = RpcResponse::new(raised);
    response.push_int(pos);
    Ok(response)
}

fn serve_stat(request: &RpcRequest) -> Result<RpcResponse, ProtocolError> {
    let Some(path) = path_arg(request, 0)? else {
        return Ok(invalid_argument());
    };

    let mut statbuf: libc::stat = unsafe { std::mem::zeroed() };
    let (rc, raised) = with_errno(|| unsafe { libc::stat(path.as_ptr(), &mut statbuf) });
    debug!("stat {:?} -> {} (errno {})", path, rc, raised);

    // The stat image crosses the wire as raw platform bytes.
    let image = unsafe {
        std::slice::from_raw_parts(
            &statbuf as *const libc::stat as *const u8,
            std::mem::size_of::<libc::stat>(),
        )
    };

    let mut response = RpcResponse::new(raised);
    response.push_int(i64::from(rc));
    response.push_bytes(image);
    Ok(response)
}

fn serve_unlink(request: &RpcRequest) -> Result<RpcResponse, ProtocolError> {
    let Some(path) = path_arg(request, 0)? else {
        return Ok(invalid_argument());
    };

    let (rc, raised) = with_errno(|| unsafe { libc::unlink(path.as_ptr()) });
    debug!("unlink {:?} -> {} (errno {})", path, rc, raised);

    let mut response = RpcResponse::new(raised);
    response.push_int(i64::from(rc));
    Ok(response)
}

fn serve_getdirentries(request: &RpcRequest) -> Result<RpcResponse, ProtocolError> {
    let fd = handle::to_server(request.int_at(0)?) as i32;
    let nbytes = request.int_at(1)?;
    let mut basep = request.int_at(2)?;
    if nbytes < 0 || nbytes as usize > MAX_TRANSFER {
        return Ok(invalid_argument());
    }
    let nbytes = nbytes as usize;

    let mut buf = vec![0u8; nbytes];
    let (rc, raised) = with_errno(|| unsafe { sysdir::getdirentries(fd, &mut buf, &mut basep) });
    debug!(
        "getdirentries fd={} nbytes={} -> {} basep={} (errno {})",
        fd, nbytes, rc, basep, raised
    );

    let mut response = RpcResponse::new(raised);
    response.push_int(rc as i64);
    response.push_bytes(&buf[..rc.max(0) as usize]);
    response.push_int(basep);
    Ok(response)
}

fn serve_getdirtree(request: &RpcRequest) -> Result<RpcResponse, ProtocolError> {
    let path_bytes = request.bytes_at(0)?;
    let path = Path::new(std::ffi::OsStr::from_bytes(path_bytes));

    match super::dirwalk::local_dirtree(path) {
        Ok(tree) => {
            debug!("getdirtree {:?} -> {} nodes", path, tree.node_count());
            match dirtree::encode_tree(&tree) {
                Ok(bytes) => {
                    let mut response = RpcResponse::new(0);
                    response.push_bytes(&bytes);
                    Ok(response)
                }
                Err(e) => {
                    // A local name the line-oriented codec cannot carry.
                    warn!("getdirtree {:?}: {}", path, e);
                    let mut response = RpcResponse::new(libc::EILSEQ);
                    response.push_bytes(b"");
                    Ok(response)
                }
            }
        }
        Err(e) => {
            debug!("getdirtree {:?} failed: {}", path, e);
            let mut response = RpcResponse::new(e.raw_os_error().unwrap_or(libc::EIO));
            response.push_bytes(b"");
            Ok(response)
        }
    }
}
