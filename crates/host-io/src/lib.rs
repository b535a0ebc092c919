//! Host operating-system services reachable from the syscall bridge.
//!
//! The bridge never talks to the OS directly. It goes through [`HostIo`], which keeps the
//! register-level protocol testable with scripted hosts and keeps every `unsafe` foreign call in
//! [`LibcHostIo`].

mod errno;
#[cfg(unix)]
mod libc_io;
mod stat;

pub use errno::Errno;
#[cfg(unix)]
pub use libc_io::LibcHostIo;
pub use stat::{HostStat, Timespec};

use std::ffi::CStr;

pub type HostResult<T> = Result<T, Errno>;

/// Thin host file-system interface.
///
/// Every method corresponds to one C runtime call. Failures carry the host error number captured
/// immediately after the failing call; successful values are returned unchanged.
pub trait HostIo {
    fn open(&mut self, path: &CStr, flags: i32, mode: u32) -> HostResult<i32>;
    fn close(&mut self, fd: i32) -> HostResult<i32>;
    fn read(&mut self, fd: i32, buf: &mut [u8]) -> HostResult<usize>;
    fn write(&mut self, fd: i32, buf: &[u8]) -> HostResult<usize>;
    fn lseek(&mut self, fd: i32, offset: i64, whence: i32) -> HostResult<i64>;
    fn fstat(&mut self, fd: i32) -> HostResult<HostStat>;

    /// `isatty` takes a 16-bit descriptor; callers must not widen it.
    fn isatty(&mut self, fd: u16) -> HostResult<i32>;

    fn chdir(&mut self, path: &CStr) -> HostResult<i32>;
}

impl<T: HostIo + ?Sized> HostIo for Box<T> {
    fn open(&mut self, path: &CStr, flags: i32, mode: u32) -> HostResult<i32> {
        <T as HostIo>::open(&mut **self, path, flags, mode)
    }

    fn close(&mut self, fd: i32) -> HostResult<i32> {
        <T as HostIo>::close(&mut **self, fd)
    }

    fn read(&mut self, fd: i32, buf: &mut [u8]) -> HostResult<usize> {
        <T as HostIo>::read(&mut **self, fd, buf)
    }

    fn write(&mut self, fd: i32, buf: &[u8]) -> HostResult<usize> {
        <T as HostIo>::write(&mut **self, fd, buf)
    }

    fn lseek(&mut self, fd: i32, offset: i64, whence: i32) -> HostResult<i64> {
        <T as HostIo>::lseek(&mut **self, fd, offset, whence)
    }

    fn fstat(&mut self, fd: i32) -> HostResult<HostStat> {
        <T as HostIo>::fstat(&mut **self, fd)
    }

    fn isatty(&mut self, fd: u16) -> HostResult<i32> {
        <T as HostIo>::isatty(&mut **self, fd)
    }

    fn chdir(&mut self, path: &CStr) -> HostResult<i32> {
        <T as HostIo>::chdir(&mut **self, path)
    }
}

impl<T: HostIo + ?Sized> HostIo for &mut T {
    fn open(&mut self, path: &CStr, flags: i32, mode: u32) -> HostResult<i32> {
        <T as HostIo>::open(&mut **self, path, flags, mode)
    }

    fn close(&mut self, fd: i32) -> HostResult<i32> {
        <T as HostIo>::close(&mut **self, fd)
    }

    fn read(&mut self, fd: i32, buf: &mut [u8]) -> HostResult<usize> {
        <T as HostIo>::read(&mut **self, fd, buf)
    }

    fn write(&mut self, fd: i32, buf: &[u8]) -> HostResult<usize> {
        <T as HostIo>::write(&mut **self, fd, buf)
    }

    fn lseek(&mut self, fd: i32, offset: i64, whence: i32) -> HostResult<i64> {
        <T as HostIo>::lseek(&mut **self, fd, offset, whence)
    }

    fn fstat(&mut self, fd: i32) -> HostResult<HostStat> {
        <T as HostIo>::fstat(&mut **self, fd)
    }

    fn isatty(&mut self, fd: u16) -> HostResult<i32> {
        <T as HostIo>::isatty(&mut **self, fd)
    }

    fn chdir(&mut self, path: &CStr) -> HostResult<i32> {
        <T as HostIo>::chdir(&mut **self, path)
    }
}
