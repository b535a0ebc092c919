use hostbridge_devices::{
    data_channel, syscalls, BridgeError, DataChannel, MmioBus, RxHandle, SyscallBridge,
};
use hostbridge_host_io::HostIo;
use memory::{GuestMemoryError, GuestRam, MemoryBus};
use thiserror::Error;

use crate::config::{ConfigError, MachineConfig};

/// Syscall bridge as mapped by [`Machine`]: any sendable host adapter behind a box.
pub type HostSyscalls = SyscallBridge<Box<dyn HostIo + Send>>;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Memory(#[from] GuestMemoryError),

    /// A bridge rejected a guest access. The machine is halted from here on.
    #[error("bridge fault: {0}")]
    Fault(BridgeError),

    #[error("machine halted by an earlier fault: {0}")]
    Halted(BridgeError),
}

/// Guest RAM plus the two bridges on an MMIO bus.
///
/// Guest physical accesses that hit a bridge window go to the bridge; everything else goes to RAM
/// (unbacked addresses read as all-ones and drop writes). A bridge fault is latched: every later
/// guest access fails with [`MachineError::Halted`], including after [`Machine::reset`].
pub struct Machine {
    config: MachineConfig,
    ram: GuestRam,
    mmio: MmioBus,
    rx: RxHandle,
    fault: Option<BridgeError>,
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("config", &self.config)
            .field("ram", &self.ram)
            .field("mmio", &self.mmio)
            .field("fault", &self.fault)
            .finish()
    }
}

impl Machine {
    pub fn new(
        config: MachineConfig,
        host: Box<dyn HostIo + Send>,
        channel: DataChannel,
    ) -> Result<Self, MachineError> {
        config.validate()?;
        let ram = GuestRam::new(config.ram_size)?;
        let rx = channel.rx_handle();

        let mut mmio = MmioBus::new();
        let syscalls: HostSyscalls = SyscallBridge::new(host);
        mmio.register(
            config.syscalls_base,
            syscalls::regs::WINDOW_LEN,
            "syscalls",
            Box::new(syscalls),
        );
        mmio.register(
            config.channel_base,
            data_channel::regs::WINDOW_LEN,
            "data-channel",
            Box::new(channel),
        );
        tracing::info!(
            "machine: {:#x} bytes RAM, syscalls at {:#x}, data channel at {:#x}",
            config.ram_size,
            config.syscalls_base,
            config.channel_base
        );

        Ok(Self {
            config,
            ram,
            mmio,
            rx,
            fault: None,
        })
    }

    /// Machine whose syscall bridge talks to the host process's C runtime.
    #[cfg(unix)]
    pub fn with_libc_host(
        config: MachineConfig,
        channel: DataChannel,
    ) -> Result<Self, MachineError> {
        Self::new(config, Box::new(hostbridge_host_io::LibcHostIo::new()), channel)
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Producer handle for the data channel's receive buffer.
    pub fn rx_handle(&self) -> RxHandle {
        self.rx.clone()
    }

    pub fn fault(&self) -> Option<&BridgeError> {
        self.fault.as_ref()
    }

    fn check_running(&self) -> Result<(), MachineError> {
        match &self.fault {
            Some(err) => Err(MachineError::Halted(err.clone())),
            None => Ok(()),
        }
    }

    /// Guest read of `size` (1, 2 or 4) bytes at `paddr`, little-endian.
    pub fn read(&mut self, paddr: u64, size: usize) -> Result<u32, MachineError> {
        self.check_running()?;
        if self.mmio.contains(paddr) {
            return Ok(self.mmio.read(&mut self.ram, paddr, size));
        }
        let mut buf = [0u8; 4];
        let size = size.min(4);
        self.ram.read_physical(paddr, &mut buf[..size]);
        Ok(u32::from_le_bytes(buf))
    }

    /// Guest write of the low `size` (1, 2 or 4) bytes of `value` at `paddr`.
    pub fn write(&mut self, paddr: u64, size: usize, value: u32) -> Result<(), MachineError> {
        self.check_running()?;
        if self.mmio.contains(paddr) {
            if let Err(err) = self.mmio.write(&mut self.ram, paddr, size, value) {
                tracing::error!("guest write {value:#x} to {paddr:#x} faulted: {err}");
                self.fault = Some(err.clone());
                return Err(MachineError::Fault(err));
            }
            return Ok(());
        }
        let bytes = value.to_le_bytes();
        self.ram.write_physical(paddr, &bytes[..size.min(4)]);
        Ok(())
    }

    pub fn read_u32(&mut self, paddr: u64) -> Result<u32, MachineError> {
        self.read(paddr, 4)
    }

    pub fn write_u32(&mut self, paddr: u64, value: u32) -> Result<(), MachineError> {
        self.write(paddr, 4, value)
    }

    /// Copy bytes out of guest RAM. Unlike guest reads, the whole range must be backed.
    pub fn read_ram(&self, paddr: u64, len: usize) -> Result<Vec<u8>, MachineError> {
        let mut buf = vec![0u8; len];
        self.ram.read_into(paddr, &mut buf)?;
        Ok(buf)
    }

    pub fn write_ram(&mut self, paddr: u64, data: &[u8]) -> Result<(), MachineError> {
        self.ram.write_from(paddr, data)?;
        Ok(())
    }

    /// Reset both bridges. RAM contents and a latched fault survive.
    pub fn reset(&mut self) {
        tracing::info!("machine reset");
        self.mmio.reset();
    }

    pub fn syscalls_mut(&mut self) -> Option<&mut HostSyscalls> {
        self.mmio.device_mut::<HostSyscalls>()
    }

    pub fn channel_mut(&mut self) -> Option<&mut DataChannel> {
        self.mmio.device_mut::<DataChannel>()
    }
}
