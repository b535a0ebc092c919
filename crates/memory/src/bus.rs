/// Abstraction for guest physical memory access.
///
/// Bridges copy path strings, write payloads and receive buffers through this trait. Reads are
/// defined as `&mut self` to allow implementations with side effects (e.g. MMIO-backed regions).
///
/// Accesses are infallible from the device's point of view: bytes outside the backing store read
/// as `0xFF` and writes to them are dropped, matching an open bus.
pub trait MemoryBus {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]);
    fn write_physical(&mut self, paddr: u64, buf: &[u8]);

    /// Whether every byte of `[paddr, paddr + len)` is backed by memory.
    ///
    /// Devices check this before sizing a copy from a guest-programmed length.
    fn is_backed(&self, paddr: u64, len: usize) -> bool;

    /// Copies `len` bytes starting at `paddr` into a freshly allocated buffer.
    fn read_bytes(&mut self, paddr: u64, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.read_physical(paddr, &mut buf);
        buf
    }

    fn read_u8(&mut self, paddr: u64) -> u8 {
        let mut buf = [0u8; 1];
        self.read_physical(paddr, &mut buf);
        buf[0]
    }

    fn read_u16(&mut self, paddr: u64) -> u16 {
        let mut buf = [0u8; 2];
        self.read_physical(paddr, &mut buf);
        u16::from_le_bytes(buf)
    }

    fn read_u32(&mut self, paddr: u64) -> u32 {
        let mut buf = [0u8; 4];
        self.read_physical(paddr, &mut buf);
        u32::from_le_bytes(buf)
    }

    fn write_u8(&mut self, paddr: u64, val: u8) {
        self.write_physical(paddr, &[val]);
    }

    fn write_u16(&mut self, paddr: u64, val: u16) {
        self.write_physical(paddr, &val.to_le_bytes());
    }

    fn write_u32(&mut self, paddr: u64, val: u32) {
        self.write_physical(paddr, &val.to_le_bytes());
    }
}

impl<T: MemoryBus + ?Sized> MemoryBus for &mut T {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
        <T as MemoryBus>::read_physical(&mut **self, paddr, buf);
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        <T as MemoryBus>::write_physical(&mut **self, paddr, buf);
    }

    fn is_backed(&self, paddr: u64, len: usize) -> bool {
        <T as MemoryBus>::is_backed(&**self, paddr, len)
    }
}

impl<T: MemoryBus + ?Sized> MemoryBus for Box<T> {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
        <T as MemoryBus>::read_physical(&mut **self, paddr, buf);
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        <T as MemoryBus>::write_physical(&mut **self, paddr, buf);
    }

    fn is_backed(&self, paddr: u64, len: usize) -> bool {
        <T as MemoryBus>::is_backed(&**self, paddr, len)
    }
}
