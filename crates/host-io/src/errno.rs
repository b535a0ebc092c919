use thiserror::Error;

/// Host error number, in host numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("host errno {0}")]
pub struct Errno(pub i32);

impl Errno {
    /// Bad address: a guest buffer that is not backed by guest memory.
    pub const EFAULT: Errno = Errno(libc::EFAULT);

    /// Captures the calling thread's last OS error.
    ///
    /// Must be called immediately after the failing foreign call; anything that touches the OS in
    /// between may overwrite it.
    pub fn last() -> Self {
        Self(std::io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }

    pub fn raw(self) -> i32 {
        self.0
    }
}

impl From<std::io::Error> for Errno {
    fn from(err: std::io::Error) -> Self {
        Self(err.raw_os_error().unwrap_or(0))
    }
}
