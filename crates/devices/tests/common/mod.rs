#![allow(dead_code)]

use std::ffi::CStr;

use hostbridge_host_io::{Errno, HostIo, HostResult, HostStat};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Open { path: Vec<u8>, flags: i32, mode: u32 },
    Close(i32),
    Read { fd: i32, len: usize },
    Write { fd: i32, data: Vec<u8> },
    Lseek { fd: i32, offset: i64, whence: i32 },
    Fstat(i32),
    Isatty(u16),
    Chdir(Vec<u8>),
}

/// Scripted [`HostIo`] that records every call and answers with canned results.
#[derive(Debug)]
pub struct FakeHost {
    pub calls: Vec<HostCall>,
    pub open: HostResult<i32>,
    pub close: HostResult<i32>,
    pub read: Result<Vec<u8>, Errno>,
    pub write: Option<Errno>,
    pub lseek: HostResult<i64>,
    pub fstat: HostResult<HostStat>,
    pub isatty: HostResult<i32>,
    pub chdir: HostResult<i32>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            open: Ok(3),
            close: Ok(0),
            read: Ok(Vec::new()),
            write: None,
            lseek: Ok(0),
            fstat: Ok(HostStat::default()),
            isatty: Ok(1),
            chdir: Ok(0),
        }
    }
}

impl HostIo for FakeHost {
    fn open(&mut self, path: &CStr, flags: i32, mode: u32) -> HostResult<i32> {
        self.calls.push(HostCall::Open {
            path: path.to_bytes().to_vec(),
            flags,
            mode,
        });
        self.open
    }

    fn close(&mut self, fd: i32) -> HostResult<i32> {
        self.calls.push(HostCall::Close(fd));
        self.close
    }

    fn read(&mut self, fd: i32, buf: &mut [u8]) -> HostResult<usize> {
        self.calls.push(HostCall::Read { fd, len: buf.len() });
        let data = self.read.clone()?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    fn write(&mut self, fd: i32, buf: &[u8]) -> HostResult<usize> {
        self.calls.push(HostCall::Write {
            fd,
            data: buf.to_vec(),
        });
        match self.write {
            Some(err) => Err(err),
            None => Ok(buf.len()),
        }
    }

    fn lseek(&mut self, fd: i32, offset: i64, whence: i32) -> HostResult<i64> {
        self.calls.push(HostCall::Lseek { fd, offset, whence });
        self.lseek
    }

    fn fstat(&mut self, fd: i32) -> HostResult<HostStat> {
        self.calls.push(HostCall::Fstat(fd));
        self.fstat
    }

    fn isatty(&mut self, fd: u16) -> HostResult<i32> {
        self.calls.push(HostCall::Isatty(fd));
        self.isatty
    }

    fn chdir(&mut self, path: &CStr) -> HostResult<i32> {
        self.calls.push(HostCall::Chdir(path.to_bytes().to_vec()));
        self.chdir
    }
}
