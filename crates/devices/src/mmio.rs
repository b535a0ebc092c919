//! Memory-mapped register windows.
//!
//! Bridges implement [`MmioDevice`] at doubleword granularity. [`MmioBus`] routes guest accesses
//! to the right window and translates byte and word accesses into doubleword accesses, so devices
//! only ever see aligned 32-bit reads and writes.

use std::any::Any;

use memory::MemoryBus;

use crate::BridgeError;

pub trait MmioDevice: Send {
    /// Read the doubleword register at `offset` (always 4-byte aligned).
    fn mmio_read(&mut self, mem: &mut dyn MemoryBus, offset: u64) -> u32;

    /// Write the doubleword register at `offset` (always 4-byte aligned).
    fn mmio_write(
        &mut self,
        mem: &mut dyn MemoryBus,
        offset: u64,
        value: u32,
    ) -> Result<(), BridgeError>;

    /// Reset the device back to its power-on state.
    fn reset(&mut self) {}

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct MmioWindow {
    base: u64,
    len: u64,
    name: &'static str,
    dev: Box<dyn MmioDevice>,
}

impl MmioWindow {
    fn end_exclusive(&self) -> u64 {
        self.base + self.len
    }

    fn contains(&self, paddr: u64) -> bool {
        paddr >= self.base && paddr < self.end_exclusive()
    }
}

fn lane_mask(size: usize) -> u32 {
    match size {
        1 => 0xFF,
        2 => 0xFFFF,
        _ => 0xFFFF_FFFF,
    }
}

#[derive(Default)]
pub struct MmioBus {
    windows: Vec<MmioWindow>,
}

impl std::fmt::Debug for MmioBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for w in &self.windows {
            list.entry(&format_args!(
                "{} [{:#x}..{:#x})",
                w.name,
                w.base,
                w.end_exclusive()
            ));
        }
        list.finish()
    }
}

impl MmioBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `dev` over `[base, base + len)`.
    ///
    /// # Panics
    ///
    /// Panics if the window is empty, wraps the address space, or overlaps an existing window.
    /// These are wiring bugs, not guest behaviour.
    pub fn register(&mut self, base: u64, len: u64, name: &'static str, dev: Box<dyn MmioDevice>) {
        assert!(len != 0, "MMIO window length must be non-zero");
        let end_exclusive = base
            .checked_add(len)
            .unwrap_or_else(|| panic!("MMIO window wraps: base={base:#x} len={len:#x}"));

        let idx = self.windows.partition_point(|w| w.base < base);
        if let Some(prev) = idx.checked_sub(1).and_then(|i| self.windows.get(i)) {
            assert!(
                base >= prev.end_exclusive(),
                "overlapping MMIO windows: new {name}=[{base:#x}..{end_exclusive:#x}) prev {}=[{:#x}..{:#x})",
                prev.name,
                prev.base,
                prev.end_exclusive()
            );
        }
        if let Some(next) = self.windows.get(idx) {
            assert!(
                end_exclusive <= next.base,
                "overlapping MMIO windows: new {name}=[{base:#x}..{end_exclusive:#x}) next {}=[{:#x}..{:#x})",
                next.name,
                next.base,
                next.end_exclusive()
            );
        }

        tracing::debug!("mapped {name} at [{base:#x}..{end_exclusive:#x})");
        self.windows.insert(
            idx,
            MmioWindow {
                base,
                len,
                name,
                dev,
            },
        );
    }

    fn find(&self, paddr: u64) -> Option<usize> {
        let idx = self.windows.partition_point(|w| w.base <= paddr);
        let cand = idx.checked_sub(1)?;
        self.windows[cand].contains(paddr).then_some(cand)
    }

    pub fn contains(&self, paddr: u64) -> bool {
        self.find(paddr).is_some()
    }

    /// First mapped device of type `T`.
    pub fn device_mut<T: MmioDevice + 'static>(&mut self) -> Option<&mut T> {
        self.windows
            .iter_mut()
            .find_map(|w| w.dev.as_any_mut().downcast_mut::<T>())
    }

    /// Resolve an access to `(window index, aligned doubleword offset, byte lane)`.
    ///
    /// Accesses that straddle a doubleword or use an unsupported size resolve to `None`.
    fn decode(&self, paddr: u64, size: usize) -> Option<(usize, u64, u32)> {
        if !matches!(size, 1 | 2 | 4) {
            return None;
        }
        let idx = self.find(paddr)?;
        let offset = paddr - self.windows[idx].base;
        let lane = (offset & 3) as u32;
        if lane as usize + size > 4 {
            return None;
        }
        Some((idx, offset & !3, lane))
    }

    pub fn read(&mut self, mem: &mut dyn MemoryBus, paddr: u64, size: usize) -> u32 {
        if size == 0 {
            return 0;
        }
        let mask = lane_mask(size);
        let Some((idx, offset, lane)) = self.decode(paddr, size) else {
            return mask;
        };
        let value = self.windows[idx].dev.mmio_read(mem, offset);
        (value >> (lane * 8)) & mask
    }

    pub fn write(
        &mut self,
        mem: &mut dyn MemoryBus,
        paddr: u64,
        size: usize,
        value: u32,
    ) -> Result<(), BridgeError> {
        if size == 0 {
            return Ok(());
        }
        let Some((idx, offset, lane)) = self.decode(paddr, size) else {
            return Ok(());
        };
        let dev = &mut self.windows[idx].dev;
        if size == 4 {
            return dev.mmio_write(mem, offset, value);
        }

        // Narrow write: merge into the containing doubleword.
        let shift = lane * 8;
        let mask = lane_mask(size) << shift;
        let old = dev.mmio_read(mem, offset);
        let merged = (old & !mask) | ((value << shift) & mask);
        dev.mmio_write(mem, offset, merged)
    }

    pub fn reset(&mut self) {
        for w in &mut self.windows {
            w.dev.reset();
        }
    }
}
