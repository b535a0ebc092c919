//! A minimal machine hosting the syscall bridge and the data channel bridge.
//!
//! [`Machine`] owns flat guest RAM at physical address zero and an MMIO bus with both bridges
//! mapped at the addresses from [`MachineConfig`]. Guest accesses go through [`Machine::read`] and
//! [`Machine::write`]; [`GuestSyscalls`] and [`GuestChannel`] drive the bridges the way a guest
//! runtime would.
#![forbid(unsafe_code)]

mod config;
mod guest;
mod machine;

pub use config::{ConfigError, MachineConfig};
pub use guest::{GuestChannel, GuestStat, GuestSyscalls, SyscallResult};
pub use machine::{HostSyscalls, Machine, MachineError};
