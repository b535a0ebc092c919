//! Guest-side drivers.
//!
//! These perform the same register sequences a retargeted guest C runtime performs: stage
//! operands in guest RAM, program the operand registers, trigger the operation and read the
//! results back.

use hostbridge_devices::data_channel::{self, Transfer};
use hostbridge_devices::syscalls::{regs, Call};

use crate::machine::{Machine, MachineError};

/// Result of one bridged call as the guest sees it: the result register and Errno.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallResult {
    pub value: i32,
    pub errno: i32,
}

impl SyscallResult {
    pub fn is_err(&self) -> bool {
        self.value < 0
    }
}

/// Guest view of the stat registers. Every field is truncated to 32 bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuestStat {
    pub dev: u32,
    pub ino: u32,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub rdev: u32,
    pub blksize: u32,
    pub blocks: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    pub atime_ns: u32,
    pub mtime_ns: u32,
    pub ctime_ns: u32,
}

impl From<[u32; regs::STAT_FIELDS]> for GuestStat {
    fn from(f: [u32; regs::STAT_FIELDS]) -> Self {
        Self {
            dev: f[0],
            ino: f[1],
            mode: f[2],
            nlink: f[3],
            uid: f[4],
            gid: f[5],
            size: f[6],
            rdev: f[7],
            blksize: f[8],
            blocks: f[9],
            atime: f[10],
            mtime: f[11],
            ctime: f[12],
            atime_ns: f[13],
            mtime_ns: f[14],
            ctime_ns: f[15],
        }
    }
}

/// Syscall bridge driver. `scratch` is a guest RAM address used to stage paths and data.
pub struct GuestSyscalls<'a> {
    machine: &'a mut Machine,
    base: u64,
    scratch: u64,
}

impl<'a> GuestSyscalls<'a> {
    pub fn new(machine: &'a mut Machine, scratch: u64) -> Self {
        let base = machine.config().syscalls_base;
        Self {
            machine,
            base,
            scratch,
        }
    }

    pub fn scratch(&self) -> u64 {
        self.scratch
    }

    fn set(&mut self, offset: u64, value: u32) -> Result<(), MachineError> {
        self.machine.write_u32(self.base + offset, value)
    }

    fn get(&mut self, offset: u64) -> Result<u32, MachineError> {
        self.machine.read_u32(self.base + offset)
    }

    fn stage(&mut self, bytes: &[u8]) -> Result<(), MachineError> {
        self.machine.write_ram(self.scratch, bytes)?;
        self.set(regs::BUFFER, self.scratch as u32)?;
        self.set(regs::BUFFER_SIZE, bytes.len() as u32)
    }

    fn stage_path(&mut self, path: &str) -> Result<(), MachineError> {
        let mut bytes = path.as_bytes().to_vec();
        bytes.push(0);
        self.stage(&bytes)
    }

    fn call(&mut self, call: Call, result: u64) -> Result<SyscallResult, MachineError> {
        self.set(regs::CALL, call as u32)?;
        Ok(SyscallResult {
            value: self.get(result)? as i32,
            errno: self.get(regs::ERRNO)? as i32,
        })
    }

    /// `flags` use the target (guest) open-flag encoding.
    pub fn open(
        &mut self,
        path: &str,
        flags: u32,
        mode: u32,
    ) -> Result<SyscallResult, MachineError> {
        self.stage_path(path)?;
        self.set(regs::OFLAG, flags)?;
        self.set(regs::PMODE, mode)?;
        self.call(Call::Open, regs::FD)
    }

    pub fn close(&mut self, fd: i32) -> Result<SyscallResult, MachineError> {
        self.set(regs::FD, fd as u32)?;
        self.call(Call::Close, regs::STATUS)
    }

    pub fn write(&mut self, fd: i32, data: &[u8]) -> Result<SyscallResult, MachineError> {
        self.stage(data)?;
        self.set(regs::FD, fd as u32)?;
        self.call(Call::Write, regs::STATUS)
    }

    /// Read up to `len` bytes into the scratch buffer and return what arrived.
    pub fn read(&mut self, fd: i32, len: u32) -> Result<(SyscallResult, Vec<u8>), MachineError> {
        self.set(regs::BUFFER, self.scratch as u32)?;
        self.set(regs::BUFFER_SIZE, len)?;
        self.set(regs::FD, fd as u32)?;
        let result = self.call(Call::Read, regs::STATUS)?;
        let got = usize::try_from(result.value).unwrap_or(0);
        let data = self.machine.read_ram(self.scratch, got)?;
        Ok((result, data))
    }

    pub fn lseek(
        &mut self,
        fd: i32,
        offset: i32,
        whence: i32,
    ) -> Result<SyscallResult, MachineError> {
        self.set(regs::FD, fd as u32)?;
        self.set(regs::OFFSET, offset as u32)?;
        self.set(regs::ORIGIN, whence as u32)?;
        self.call(Call::Lseek, regs::POSITION)
    }

    pub fn fstat(&mut self, fd: i32) -> Result<(SyscallResult, GuestStat), MachineError> {
        self.set(regs::FD, fd as u32)?;
        let result = self.call(Call::Fstat, regs::STATUS)?;
        let mut fields = [0u32; regs::STAT_FIELDS];
        for (i, field) in fields.iter_mut().enumerate() {
            *field = self.get(regs::ST_DEV + 4 * i as u64)?;
        }
        Ok((result, GuestStat::from(fields)))
    }

    /// Returns 1 for a terminal; 0 with Errno set otherwise.
    pub fn isatty(&mut self, fd: i32) -> Result<SyscallResult, MachineError> {
        self.set(regs::FD, fd as u32)?;
        self.call(Call::Isatty, regs::STATUS)
    }

    pub fn chdir(&mut self, path: &str) -> Result<SyscallResult, MachineError> {
        self.stage_path(path)?;
        self.call(Call::Chdir, regs::STATUS)
    }
}

/// Data channel driver. `scratch` is a guest RAM address used as the transfer buffer.
pub struct GuestChannel<'a> {
    machine: &'a mut Machine,
    base: u64,
    scratch: u64,
}

impl<'a> GuestChannel<'a> {
    pub fn new(machine: &'a mut Machine, scratch: u64) -> Self {
        let base = machine.config().channel_base;
        Self {
            machine,
            base,
            scratch,
        }
    }

    fn set(&mut self, offset: u64, value: u32) -> Result<(), MachineError> {
        self.machine.write_u32(self.base + offset, value)
    }

    fn start(&mut self, transfer: Transfer, len: usize) -> Result<(), MachineError> {
        self.set(data_channel::regs::SIZE, len as u32)?;
        self.set(data_channel::regs::DATA, self.scratch as u32)?;
        self.set(data_channel::regs::TRANSFER, transfer as u32)
    }

    /// Out transfer of `data` to the attached endpoint.
    pub fn send(&mut self, data: &[u8]) -> Result<(), MachineError> {
        self.machine.write_ram(self.scratch, data)?;
        self.start(Transfer::Out, data.len())
    }

    /// In transfer of exactly `len` bytes. Blocks until they have all arrived.
    ///
    /// If a reset cancels the transfer the scratch buffer is left as it was, so the returned
    /// bytes are whatever it held before.
    pub fn receive(&mut self, len: usize) -> Result<Vec<u8>, MachineError> {
        self.start(Transfer::In, len)?;
        self.machine.read_ram(self.scratch, len)
    }

    /// Current value of the Transfer register.
    pub fn transfer_state(&mut self) -> Result<u32, MachineError> {
        self.machine.read_u32(self.base + data_channel::regs::TRANSFER)
    }
}
