use std::ffi::CStr;
use std::mem::MaybeUninit;

use crate::{Errno, HostIo, HostResult, HostStat, Timespec};

/// [`HostIo`] backed by the process's own C runtime.
///
/// Descriptors returned by [`HostIo::open`] are real host descriptors owned by the guest; this
/// type never closes them on drop.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibcHostIo;

impl LibcHostIo {
    pub fn new() -> Self {
        Self
    }
}

fn check_int(ret: libc::c_int) -> HostResult<i32> {
    if ret == -1 {
        Err(Errno::last())
    } else {
        Ok(ret)
    }
}

fn check_size(ret: libc::ssize_t) -> HostResult<usize> {
    if ret < 0 {
        Err(Errno::last())
    } else {
        Ok(ret as usize)
    }
}

impl HostIo for LibcHostIo {
    fn open(&mut self, path: &CStr, flags: i32, mode: u32) -> HostResult<i32> {
        // SAFETY: `path` is a valid NUL-terminated string for the duration of the call.
        let ret = unsafe { libc::open(path.as_ptr(), flags, mode as libc::c_uint) };
        check_int(ret)
    }

    fn close(&mut self, fd: i32) -> HostResult<i32> {
        // SAFETY: closing an arbitrary descriptor is memory-safe; failures are reported via errno.
        check_int(unsafe { libc::close(fd) })
    }

    fn read(&mut self, fd: i32, buf: &mut [u8]) -> HostResult<usize> {
        // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
        let ret = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        check_size(ret)
    }

    fn write(&mut self, fd: i32, buf: &[u8]) -> HostResult<usize> {
        // SAFETY: `buf` is valid for reads of `buf.len()` bytes.
        let ret = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
        check_size(ret)
    }

    fn lseek(&mut self, fd: i32, offset: i64, whence: i32) -> HostResult<i64> {
        // SAFETY: no pointers are passed.
        let ret = unsafe { libc::lseek(fd, offset as libc::off_t, whence) };
        if ret == -1 {
            Err(Errno::last())
        } else {
            Ok(ret as i64)
        }
    }

    fn fstat(&mut self, fd: i32) -> HostResult<HostStat> {
        let mut st = MaybeUninit::<libc::stat>::zeroed();
        // SAFETY: `st` points to writable storage for one `struct stat`.
        check_int(unsafe { libc::fstat(fd, st.as_mut_ptr()) })?;
        // SAFETY: `fstat` succeeded and fully initialised the record (it was zeroed beforehand in
        // any case).
        let st = unsafe { st.assume_init() };
        Ok(HostStat {
            dev: st.st_dev as u64,
            ino: st.st_ino as u64,
            mode: st.st_mode as u32,
            nlink: st.st_nlink as u64,
            uid: st.st_uid,
            gid: st.st_gid,
            size: st.st_size as i64,
            rdev: st.st_rdev as u64,
            blksize: st.st_blksize as i64,
            blocks: st.st_blocks as i64,
            atime: Timespec {
                sec: st.st_atime as i64,
                nsec: st.st_atime_nsec as i64,
            },
            mtime: Timespec {
                sec: st.st_mtime as i64,
                nsec: st.st_mtime_nsec as i64,
            },
            ctime: Timespec {
                sec: st.st_ctime as i64,
                nsec: st.st_ctime_nsec as i64,
            },
        })
    }

    fn isatty(&mut self, fd: u16) -> HostResult<i32> {
        // SAFETY: no pointers are passed.
        let ret = unsafe { libc::isatty(libc::c_int::from(fd)) };
        if ret == 0 {
            Err(Errno::last())
        } else {
            Ok(ret)
        }
    }

    fn chdir(&mut self, path: &CStr) -> HostResult<i32> {
        // SAFETY: `path` is a valid NUL-terminated string for the duration of the call.
        check_int(unsafe { libc::chdir(path.as_ptr()) })
    }
}
