//! Thread-local errno access shared by the stub and the server handlers.

/// Read the calling thread's errno.
pub(crate) fn get() -> i32 {
    unsafe { *libc::__errno_location() }
}

/// Overwrite the calling thread's errno.
pub(crate) fn set(value: i32) {
    unsafe { *libc::__errno_location() = value }
}
