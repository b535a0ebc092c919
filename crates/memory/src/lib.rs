//! Guest physical memory as seen by host-bridge peripherals.
//!
//! Peripherals never own guest RAM; they receive a `&mut dyn MemoryBus` for the duration of a
//! register access and copy buffers in and out of it.
#![forbid(unsafe_code)]

pub mod bus;
pub mod phys;

pub use bus::MemoryBus;
pub use phys::{GuestMemoryError, GuestMemoryResult, GuestRam};
