//! Errno values returned by the memory handlers
use log::debug;

/// Errno values for memory related calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    ESRCH = 3,   // No such process (cage)
    EBADF = 9,   // Bad file descriptor
    ENOMEM = 12, // Out of memory
    EFAULT = 14, // Bad address
    EINVAL = 22, // Invalid argument
}

impl Errno {
    /// Value as returned to the guest, i.e. negated
    pub fn as_retval(self) -> i32 {
        -(self as i32)
    }
}

/// Logs a failed call and hands the errno back for the caller to return
///
/// # Arguments
/// * `e` - errno describing the failure
/// * `syscall` - name of the failing call
/// * `message` - human readable reason
pub fn syscall_error(e: Errno, syscall: &str, message: &str) -> Errno {
    debug!("{}: {:?}: {}", syscall, e, message);
    e
}
