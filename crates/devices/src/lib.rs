//! Host-bridge peripherals.
//!
//! Two memory-mapped register blocks that let guest firmware reach the host without modelling
//! real hardware:
//!
//! - [`syscalls::SyscallBridge`]: register-level RPC for a small set of POSIX file calls.
//! - [`data_channel::DataChannel`]: half-duplex byte transfers between guest memory and a
//!   [`hostbridge_terminal::ByteStreamEndpoint`], with a blocking receive path.
#![forbid(unsafe_code)]

pub mod data_channel;
pub mod mmio;
pub mod oflag;
pub mod syscalls;

mod error;

pub use data_channel::{DataChannel, RxHandle};
pub use error::BridgeError;
pub use mmio::{MmioBus, MmioDevice};
pub use syscalls::SyscallBridge;
