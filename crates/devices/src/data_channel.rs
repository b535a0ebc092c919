//! Data channel bridge.
//!
//! A three-register block for half-duplex byte transfers between guest memory and a
//! [`ByteStreamEndpoint`]:
//!
//! - `Out`: `Size` bytes at `DataPointer` are sent to the endpoint, in order.
//! - `In`: the access blocks until `Size` bytes have arrived, then copies them to `DataPointer`.
//!
//! Incoming bytes are produced on another thread through an [`RxHandle`]. The receive FIFO is the
//! only state shared across threads; appends, waits and drains all happen under one mutex.
//!
//! An `In` request that is never satisfied blocks forever. A reset (from the bus or from any
//! [`RxHandle`]) cancels the wait: the waiter wakes, leaves guest memory untouched and the
//! transfer completes as `Done`.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use hostbridge_terminal::ByteStreamEndpoint;
use memory::MemoryBus;

use crate::mmio::MmioDevice;
use crate::BridgeError;

/// Register offsets.
pub mod regs {
    pub const TRANSFER: u64 = 0x00;
    pub const SIZE: u64 = 0x04;
    pub const DATA: u64 = 0x08;

    /// Size of the register window in bytes.
    pub const WINDOW_LEN: u64 = DATA + 4;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Transfer {
    Done = 0,
    Out = 1,
    In = 2,
}

impl Transfer {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Done),
            1 => Some(Self::Out),
            2 => Some(Self::In),
            _ => None,
        }
    }
}

/// Line settings a serial-style link can report. The data channel always reports one stop bit and
/// even parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// Parity modes a serial-style link can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

#[derive(Debug, Default)]
struct RxState {
    fifo: VecDeque<u8>,
    /// Byte count the current waiter needs; zero when nobody waits.
    requested: usize,
    waiting: bool,
    /// Bumped on every reset so a waiter can tell it was cancelled.
    epoch: u64,
}

#[derive(Debug, Default)]
struct RxShared {
    state: Mutex<RxState>,
    ready: Condvar,
}

/// Producer-side handle to a [`DataChannel`]'s receive FIFO.
///
/// Cheap to clone and safe to use from any thread.
#[derive(Debug, Clone, Default)]
pub struct RxHandle {
    shared: Arc<RxShared>,
}

impl RxHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RxState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one received byte.
    pub fn push_byte(&self, byte: u8) {
        let mut state = self.lock();
        state.fifo.push_back(byte);
        tracing::trace!(byte, buffered = state.fifo.len(), "data channel rx");
        if state.waiting && state.fifo.len() >= state.requested {
            self.shared.ready.notify_all();
        }
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        for &byte in bytes {
            self.push_byte(byte);
        }
    }

    /// Number of bytes received but not yet delivered to the guest.
    pub fn buffered(&self) -> usize {
        self.lock().fifo.len()
    }

    /// Whether an `In` transfer is currently blocked waiting for bytes.
    pub fn is_waiting(&self) -> bool {
        self.lock().waiting
    }

    /// Drop all buffered bytes and cancel any blocked `In` transfer.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.fifo.clear();
        state.epoch = state.epoch.wrapping_add(1);
        if state.waiting {
            tracing::warn!(
                "data channel reset while an In transfer of {} bytes was waiting; cancelling it",
                state.requested
            );
        }
        self.shared.ready.notify_all();
    }

    /// Remove and return the first `len` bytes, blocking until that many are buffered.
    ///
    /// Returns `None` if a reset cancels the wait. Bytes are never delivered partially.
    pub fn take_blocking(&self, len: usize) -> Option<Vec<u8>> {
        let mut state = self.lock();
        let epoch = state.epoch;
        state.requested = len;
        state.waiting = true;

        while state.fifo.len() < len && state.epoch == epoch {
            state = self
                .shared
                .ready
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }

        state.waiting = false;
        state.requested = 0;
        if state.epoch != epoch {
            return None;
        }
        Some(state.fifo.drain(..len).collect())
    }
}

pub struct DataChannel {
    transfer: u32,
    size: u32,
    data_ptr: u32,
    rx: RxHandle,
    endpoint: Option<Box<dyn ByteStreamEndpoint>>,
}

impl std::fmt::Debug for DataChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataChannel")
            .field("transfer", &self.transfer)
            .field("size", &self.size)
            .field("data_ptr", &self.data_ptr)
            .field("buffered", &self.rx.buffered())
            .field("endpoint_attached", &self.endpoint.is_some())
            .finish()
    }
}

impl DataChannel {
    pub fn new(rx: RxHandle, endpoint: Option<Box<dyn ByteStreamEndpoint>>) -> Self {
        Self {
            transfer: Transfer::Done as u32,
            size: 0,
            data_ptr: 0,
            rx,
            endpoint,
        }
    }

    pub fn rx_handle(&self) -> RxHandle {
        self.rx.clone()
    }

    pub fn attach_endpoint(&mut self, endpoint: Box<dyn ByteStreamEndpoint>) {
        self.endpoint = Some(endpoint);
    }

    pub fn detach_endpoint(&mut self) -> Option<Box<dyn ByteStreamEndpoint>> {
        self.endpoint.take()
    }

    /// Raw value of the Transfer register, without servicing a pending `In`.
    pub fn transfer(&self) -> u32 {
        self.transfer
    }

    pub fn baud_rate(&self) -> u32 {
        1920
    }

    pub fn stop_bits(&self) -> StopBits {
        StopBits::One
    }

    pub fn parity(&self) -> Parity {
        Parity::Even
    }

    fn service_out(&mut self, mem: &mut dyn MemoryBus) {
        if self.transfer != Transfer::Out as u32 {
            return;
        }
        let (addr, len) = (u64::from(self.data_ptr), self.size as usize);
        if !mem.is_backed(addr, len) {
            tracing::warn!("data channel out: buffer {addr:#x}+{len:#x} is outside guest memory");
            self.transfer = Transfer::Done as u32;
            return;
        }
        let bytes = mem.read_bytes(addr, len);
        tracing::debug!("data channel out: {} bytes from {:#x}", bytes.len(), self.data_ptr);
        if let Some(endpoint) = self.endpoint.as_mut() {
            for &byte in &bytes {
                endpoint.send_byte(byte);
            }
        }
        self.transfer = Transfer::Done as u32;
    }

    fn service_in(&mut self, mem: &mut dyn MemoryBus) {
        if self.transfer != Transfer::In as u32 {
            return;
        }
        let (addr, len) = (u64::from(self.data_ptr), self.size as usize);
        if !mem.is_backed(addr, len) {
            tracing::warn!("data channel in: buffer {addr:#x}+{len:#x} is outside guest memory");
            self.transfer = Transfer::Done as u32;
            return;
        }
        tracing::debug!("data channel in: {len} bytes to {addr:#x}");
        match self.rx.take_blocking(len) {
            Some(bytes) => mem.write_physical(addr, &bytes),
            None => tracing::debug!("data channel in: cancelled by reset"),
        }
        self.transfer = Transfer::Done as u32;
    }
}

impl MmioDevice for DataChannel {
    fn mmio_read(&mut self, mem: &mut dyn MemoryBus, offset: u64) -> u32 {
        match offset {
            regs::TRANSFER => {
                self.service_in(mem);
                self.transfer
            }
            regs::SIZE => self.size,
            regs::DATA => self.data_ptr,
            _ => 0,
        }
    }

    fn mmio_write(
        &mut self,
        mem: &mut dyn MemoryBus,
        offset: u64,
        value: u32,
    ) -> Result<(), BridgeError> {
        match offset {
            regs::TRANSFER => {
                if Transfer::from_u32(value).is_none() {
                    tracing::warn!("data channel: ignoring unknown transfer kind {value}");
                }
                self.transfer = value;
                self.service_out(mem);
                self.service_in(mem);
            }
            regs::SIZE => self.size = value,
            regs::DATA => self.data_ptr = value,
            _ => {}
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.rx.reset();
        self.transfer = Transfer::Done as u32;
        self.size = 0;
        self.data_ptr = 0;
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
