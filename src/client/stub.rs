//! Process-wide stub session.
//!
//! Interposed programs expect one server connection and one receive buffer
//! for the whole process, established at library load. This module is that
//! singleton with explicit init/teardown: one [`FileClient`] behind a mutex
//! whose lock is held for the full send-then-await-response window, so
//! multi-threaded callers serialize cleanly on the single connection.
//!
//! Handle-bearing calls classify before touching the session: a local
//! handle never wakes the connection (or triggers a lazy connect).

use std::sync::{Mutex, PoisonError};

use tracing::warn;

use crate::config::ClientConfig;
use crate::errno;
use crate::protocol::dirtree::DirTreeNode;
use crate::protocol::handle;
use crate::sysdir;

use super::file_ops::FileClient;
use super::ClientError;

static SESSION: Mutex<Option<FileClient>> = Mutex::new(None);

/// Connect the process-wide session using the environment configuration.
pub fn init() -> Result<(), ClientError> {
    init_with_config(&ClientConfig::from_env())
}

/// Connect the process-wide session to an explicit endpoint.
pub fn init_with_config(config: &ClientConfig) -> Result<(), ClientError> {
    let client = FileClient::connect(config)?;
    *lock() = Some(client);
    Ok(())
}

/// Drop the process-wide session. Open remote handles die with it.
pub fn teardown() {
    *lock() = None;
}

fn lock() -> std::sync::MutexGuard<'static, Option<FileClient>> {
    SESSION.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `f` against the session, connecting lazily on first use. A session
/// that cannot be established reports `EIO` through `fail`.
fn with_session<T>(fail: T, f: impl FnOnce(&mut FileClient) -> T) -> T {
    let mut guard = lock();
    if guard.is_none() {
        match FileClient::connect(&ClientConfig::from_env()) {
            Ok(client) => *guard = Some(client),
            Err(e) => {
                warn!("stub session unavailable: {}", e);
                errno::set(libc::EIO);
                return fail;
            }
        }
    }
    match guard.as_mut() {
        Some(client) => f(client),
        None => fail,
    }
}

pub fn open(path: &str, flags: i32, mode: u32) -> i32 {
    with_session(-1, |fc| fc.open(path, flags, mode))
}

pub fn close(fd: i32) -> i32 {
    if handle::is_local(i64::from(fd)) {
        return unsafe { libc::close(fd) };
    }
    with_session(-1, |fc| fc.close(fd))
}

pub fn read(fd: i32, buf: &mut [u8]) -> isize {
    if handle::is_local(i64::from(fd)) {
        return unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
    }
    with_session(-1, |fc| fc.read(fd, buf))
}

pub fn write(fd: i32, buf: &[u8]) -> isize {
    if handle::is_local(i64::from(fd)) {
        return unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
    }
    with_session(-1, |fc| fc.write(fd, buf))
}

pub fn lseek(fd: i32, offset: i64, whence: i32) -> i64 {
    if handle::is_local(i64::from(fd)) {
        return unsafe { libc::lseek(fd, offset, whence) };
    }
    with_session(-1, |fc| fc.lseek(fd, offset, whence))
}

pub fn stat(path: &str, statbuf: &mut libc::stat) -> i32 {
    with_session(-1, |fc| fc.stat(path, statbuf))
}

pub fn unlink(path: &str) -> i32 {
    with_session(-1, |fc| fc.unlink(path))
}

pub fn getdirentries(fd: i32, buf: &mut [u8], basep: &mut i64) -> isize {
    if handle::is_local(i64::from(fd)) {
        return unsafe { sysdir::getdirentries(fd, buf, basep) };
    }
    with_session(-1, |fc| fc.getdirentries(fd, buf, basep))
}

pub fn getdirtree(path: &str) -> Option<DirTreeNode> {
    with_session(None, |fc| fc.getdirtree(path))
}

/// Purely local: consumes the tree, releasing every node.
pub fn freedirtree(tree: DirTreeNode) {
    FileClient::freedirtree(tree);
}
