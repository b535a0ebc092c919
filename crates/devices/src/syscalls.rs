//! Syscall bridge.
//!
//! A register-level RPC block: the guest stages operands in dedicated registers, writes a call
//! kind to [`regs::CALL`], and reads results back once the write returns. Calls run synchronously
//! inside the register write, so the guest never observes a call in flight.
//!
//! Host failures are reported as data (`-1` in the result register plus the host error number in
//! [`regs::ERRNO`]), matching what an unmodified guest C runtime expects. Only a call kind the
//! bridge does not know is a fault.

use std::any::Any;
use std::ffi::CString;

use hostbridge_host_io::{Errno, HostIo, HostStat};
use memory::MemoryBus;

use crate::mmio::MmioDevice;
use crate::{oflag, BridgeError};

/// Register offsets.
pub mod regs {
    pub const CALL: u64 = 0x00;
    pub const FD: u64 = 0x04;
    pub const BUFFER_SIZE: u64 = 0x08;
    pub const BUFFER: u64 = 0x0C;
    pub const OFLAG: u64 = 0x10;
    pub const PMODE: u64 = 0x14;
    pub const STATUS: u64 = 0x18;
    pub const ERRNO: u64 = 0x1C;
    pub const OFFSET: u64 = 0x20;
    pub const ORIGIN: u64 = 0x24;
    pub const POSITION: u64 = 0x28;

    pub const ST_DEV: u64 = 0x2C;
    pub const ST_INO: u64 = 0x30;
    pub const ST_MODE: u64 = 0x34;
    pub const ST_NLINK: u64 = 0x38;
    pub const ST_UID: u64 = 0x3C;
    pub const ST_GID: u64 = 0x40;
    pub const ST_SIZE: u64 = 0x44;
    pub const ST_RDEV: u64 = 0x48;
    pub const ST_BLKSIZE: u64 = 0x4C;
    pub const ST_BLOCKS: u64 = 0x50;
    pub const ST_ATIM: u64 = 0x54;
    pub const ST_MTIM: u64 = 0x58;
    pub const ST_CTIM: u64 = 0x5C;
    pub const ST_ATIM_NS: u64 = 0x60;
    pub const ST_MTIM_NS: u64 = 0x64;
    pub const ST_CTIM_NS: u64 = 0x68;

    pub const STAT_FIELDS: usize = 16;

    /// Size of the register window in bytes.
    pub const WINDOW_LEN: u64 = ST_CTIM_NS + 4;
}

/// Value the bridge writes into 32-bit result registers on failure.
const FAILED: u32 = -1i32 as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Call {
    Done = 0,
    Open = 1,
    Close = 2,
    Write = 3,
    Read = 4,
    Lseek = 5,
    Fstat = 6,
    Isatty = 7,
    Chdir = 8,
}

impl Call {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::Done,
            1 => Self::Open,
            2 => Self::Close,
            3 => Self::Write,
            4 => Self::Read,
            5 => Self::Lseek,
            6 => Self::Fstat,
            7 => Self::Isatty,
            8 => Self::Chdir,
            _ => return None,
        })
    }
}

/// Flatten a host status record into the sixteen stat registers, in register order.
///
/// Every field is truncated to 32 bits; the guest-side layout is fixed at that width.
pub fn flatten_stat(st: &HostStat) -> [u32; regs::STAT_FIELDS] {
    [
        st.dev as u32,
        st.ino as u32,
        st.mode,
        st.nlink as u32,
        st.uid,
        st.gid,
        st.size as u32,
        st.rdev as u32,
        st.blksize as u32,
        st.blocks as u32,
        st.atime.sec as u32,
        st.mtime.sec as u32,
        st.ctime.sec as u32,
        st.atime.nsec as u32,
        st.mtime.nsec as u32,
        st.ctime.nsec as u32,
    ]
}

const REG_COUNT: usize = (regs::WINDOW_LEN / 4) as usize;

pub struct SyscallBridge<H> {
    host: H,
    regs: [u32; REG_COUNT],
}

impl<H> std::fmt::Debug for SyscallBridge<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyscallBridge")
            .field("call", &self.reg(regs::CALL))
            .field("fd", &self.reg(regs::FD))
            .field("status", &self.reg(regs::STATUS))
            .field("errno", &self.reg(regs::ERRNO))
            .finish_non_exhaustive()
    }
}

fn reg_index(offset: u64) -> Option<usize> {
    (offset % 4 == 0 && offset < regs::WINDOW_LEN).then_some((offset / 4) as usize)
}

impl<H> SyscallBridge<H> {
    /// Current value of the register at `offset`; unknown offsets read as zero.
    pub fn reg(&self, offset: u64) -> u32 {
        reg_index(offset).map_or(0, |i| self.regs[i])
    }

    fn set_reg(&mut self, offset: u64, value: u32) {
        if let Some(i) = reg_index(offset) {
            self.regs[i] = value;
        }
    }

    /// The sixteen stat registers, in register order.
    pub fn stat_regs(&self) -> [u32; regs::STAT_FIELDS] {
        let first = (regs::ST_DEV / 4) as usize;
        let mut out = [0u32; regs::STAT_FIELDS];
        out.copy_from_slice(&self.regs[first..first + regs::STAT_FIELDS]);
        out
    }

    fn set_stat_regs(&mut self, values: [u32; regs::STAT_FIELDS]) {
        let first = (regs::ST_DEV / 4) as usize;
        self.regs[first..first + regs::STAT_FIELDS].copy_from_slice(&values);
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

impl<H: HostIo> SyscallBridge<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            regs: [0; REG_COUNT],
        }
    }

    /// Handle a guest write of `value` to the Call register.
    ///
    /// On return the call has completed and Call reads back [`Call::Done`]. A value that is not a
    /// callable kind (including `Done` itself) stays in Call and is reported as a fault.
    pub fn dispatch(&mut self, mem: &mut dyn MemoryBus, value: u32) -> Result<(), BridgeError> {
        self.set_reg(regs::ERRNO, 0);
        self.set_reg(regs::CALL, value);

        let call = Call::from_u32(value);
        tracing::debug!(
            "syscall {call:?}: fd={} buffer={:#x} size={}",
            self.fd(),
            self.reg(regs::BUFFER),
            self.reg(regs::BUFFER_SIZE)
        );

        match call {
            Some(Call::Open) => self.call_open(mem),
            Some(Call::Close) => self.call_close(),
            Some(Call::Write) => self.call_write(mem),
            Some(Call::Read) => self.call_read(mem),
            Some(Call::Lseek) => self.call_lseek(),
            Some(Call::Fstat) => self.call_fstat(),
            Some(Call::Isatty) => self.call_isatty(),
            Some(Call::Chdir) => self.call_chdir(mem),
            Some(Call::Done) | None => {
                tracing::error!("invalid syscall {value}: guest and bridge disagree on protocol");
                return Err(BridgeError::InvalidCall(value));
            }
        }

        self.set_reg(regs::CALL, Call::Done as u32);
        Ok(())
    }

    fn fd(&self) -> i32 {
        self.reg(regs::FD) as i32
    }

    fn set_errno(&mut self, err: Errno) {
        tracing::debug!("host call failed: {err}");
        self.set_reg(regs::ERRNO, err.raw() as u32);
    }

    /// Store a call result in the register at `offset`, or `-1` plus errno on failure.
    fn complete(&mut self, offset: u64, result: Result<i64, Errno>) {
        match result {
            Ok(value) => self.set_reg(offset, value as u32),
            Err(err) => {
                self.set_reg(offset, FAILED);
                self.set_errno(err);
            }
        }
    }

    /// Buffer/BufferSize as a guest range, or `EFAULT` if any of it lies outside guest memory.
    fn guest_range(&self, mem: &dyn MemoryBus) -> Result<(u64, usize), Errno> {
        let addr = u64::from(self.reg(regs::BUFFER));
        let len = self.reg(regs::BUFFER_SIZE) as usize;
        if !mem.is_backed(addr, len) {
            tracing::warn!("syscall buffer {addr:#x}+{len:#x} is outside guest memory");
            return Err(Errno::EFAULT);
        }
        Ok((addr, len))
    }

    fn guest_buffer(&self, mem: &mut dyn MemoryBus) -> Result<Vec<u8>, Errno> {
        let (addr, len) = self.guest_range(mem)?;
        Ok(mem.read_bytes(addr, len))
    }

    /// Guest buffer as a C path. The copy stops at the first NUL, like the C string it is.
    fn guest_path(&self, mem: &mut dyn MemoryBus) -> Result<CString, Errno> {
        let mut bytes = self.guest_buffer(mem)?;
        if let Some(nul) = bytes.iter().position(|&b| b == 0) {
            bytes.truncate(nul);
        }
        Ok(CString::new(bytes).unwrap_or_default())
    }

    fn call_open(&mut self, mem: &mut dyn MemoryBus) {
        let flags = oflag::to_host(self.reg(regs::OFLAG));
        let mode = self.reg(regs::PMODE);
        let result = self
            .guest_path(mem)
            .and_then(|path| self.host.open(&path, flags, mode));
        self.complete(regs::FD, result.map(i64::from));
    }

    fn call_close(&mut self) {
        let result = self.host.close(self.fd());
        self.complete(regs::STATUS, result.map(i64::from));
    }

    fn call_write(&mut self, mem: &mut dyn MemoryBus) {
        let fd = self.fd();
        let result = self
            .guest_buffer(mem)
            .and_then(|data| self.host.write(fd, &data));
        self.complete(regs::STATUS, result.map(|n| n as i64));
    }

    fn call_read(&mut self, mem: &mut dyn MemoryBus) {
        let fd = self.fd();
        let result = self.guest_range(mem).and_then(|(addr, len)| {
            let mut staging = vec![0u8; len];
            let n = self.host.read(fd, &mut staging)?;
            mem.write_physical(addr, &staging[..n]);
            Ok(n)
        });
        self.complete(regs::STATUS, result.map(|n| n as i64));
    }

    fn call_lseek(&mut self) {
        // Offset is a signed 32-bit guest value.
        let offset = i64::from(self.reg(regs::OFFSET) as i32);
        let whence = self.reg(regs::ORIGIN) as i32;
        let result = self.host.lseek(self.fd(), offset, whence);
        self.complete(regs::POSITION, result);
    }

    fn call_fstat(&mut self) {
        match self.host.fstat(self.fd()) {
            Ok(st) => {
                self.set_reg(regs::STATUS, 0);
                self.set_stat_regs(flatten_stat(&st));
            }
            Err(err) => {
                self.complete(regs::STATUS, Err(err));
                self.set_stat_regs(flatten_stat(&HostStat::default()));
            }
        }
    }

    fn call_isatty(&mut self) {
        // The descriptor is deliberately narrowed to 16 bits.
        match self.host.isatty(self.reg(regs::FD) as u16) {
            Ok(value) => self.set_reg(regs::STATUS, value as u32),
            Err(err) => {
                self.set_reg(regs::STATUS, 0);
                self.set_errno(err);
            }
        }
    }

    fn call_chdir(&mut self, mem: &mut dyn MemoryBus) {
        let result = self
            .guest_path(mem)
            .and_then(|path| self.host.chdir(&path));
        self.complete(regs::STATUS, result.map(i64::from));
    }
}

impl<H: HostIo + Send + 'static> MmioDevice for SyscallBridge<H> {
    fn mmio_read(&mut self, _mem: &mut dyn MemoryBus, offset: u64) -> u32 {
        self.reg(offset)
    }

    fn mmio_write(
        &mut self,
        mem: &mut dyn MemoryBus,
        offset: u64,
        value: u32,
    ) -> Result<(), BridgeError> {
        if offset == regs::CALL {
            return self.dispatch(mem, value);
        }
        self.set_reg(offset, value);
        Ok(())
    }

    fn reset(&mut self) {
        self.regs = [0; REG_COUNT];
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
