//! Host bridges for an emulated guest.
//!
//! Two memory-mapped peripherals let guest firmware reach host services without simulating real
//! hardware:
//!
//! - the syscall bridge ([`devices::SyscallBridge`]) forwards file I/O calls to the host C
//!   runtime through a [`host_io::HostIo`] adapter;
//! - the data channel bridge ([`devices::DataChannel`]) moves byte blocks between guest memory
//!   and a [`terminal::ByteStreamEndpoint`], such as a [`terminal::SocketTerminal`].
//!
//! [`machine::Machine`] wires both onto guest RAM and an MMIO bus.
#![forbid(unsafe_code)]

pub use hostbridge_devices as devices;
pub use hostbridge_host_io as host_io;
pub use hostbridge_machine as machine;
pub use hostbridge_terminal as terminal;
pub use memory;
