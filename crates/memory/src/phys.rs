use core::fmt;

use crate::bus::MemoryBus;

/// Errors returned by checked [`GuestRam`] accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestMemoryError {
    /// The requested address range is outside the guest physical memory size.
    OutOfRange { paddr: u64, len: usize, size: u64 },
    /// The requested size cannot be represented by the current platform's `usize`.
    SizeTooLarge { size: u64 },
}

impl fmt::Display for GuestMemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestMemoryError::OutOfRange { paddr, len, size } => write!(
                f,
                "guest memory access out of range: paddr=0x{paddr:x} len={len} size=0x{size:x}"
            ),
            GuestMemoryError::SizeTooLarge { size } => {
                write!(f, "guest memory size {size} does not fit in usize")
            }
        }
    }
}

impl std::error::Error for GuestMemoryError {}

pub type GuestMemoryResult<T> = Result<T, GuestMemoryError>;

fn check_range(size: u64, paddr: u64, len: usize) -> GuestMemoryResult<()> {
    let end = paddr
        .checked_add(len as u64)
        .ok_or(GuestMemoryError::OutOfRange { paddr, len, size })?;
    if end > size {
        return Err(GuestMemoryError::OutOfRange { paddr, len, size });
    }
    Ok(())
}

/// Flat, zero-initialised guest RAM starting at guest physical address 0.
#[derive(Clone)]
pub struct GuestRam {
    data: Vec<u8>,
}

impl fmt::Debug for GuestRam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestRam")
            .field("size", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl GuestRam {
    pub fn new(size: u64) -> GuestMemoryResult<Self> {
        let len = usize::try_from(size).map_err(|_| GuestMemoryError::SizeTooLarge { size })?;
        Ok(Self {
            data: vec![0u8; len],
        })
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Reads bytes from guest RAM into `dst`, failing if any byte is out of range.
    pub fn read_into(&self, paddr: u64, dst: &mut [u8]) -> GuestMemoryResult<()> {
        check_range(self.size(), paddr, dst.len())?;
        let start = paddr as usize;
        dst.copy_from_slice(&self.data[start..start + dst.len()]);
        Ok(())
    }

    /// Writes `src` into guest RAM, failing if any byte is out of range.
    pub fn write_from(&mut self, paddr: u64, src: &[u8]) -> GuestMemoryResult<()> {
        check_range(self.size(), paddr, src.len())?;
        let start = paddr as usize;
        self.data[start..start + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Number of bytes of `[paddr, paddr + len)` that are backed by RAM.
    fn backed_len(&self, paddr: u64, len: usize) -> usize {
        let avail = self.size().saturating_sub(paddr);
        usize::try_from(avail).map_or(len, |avail| avail.min(len))
    }
}

impl MemoryBus for GuestRam {
    fn is_backed(&self, paddr: u64, len: usize) -> bool {
        check_range(self.size(), paddr, len).is_ok()
    }

    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
        let backed = self.backed_len(paddr, buf.len());
        let (inside, outside) = buf.split_at_mut(backed);
        if !inside.is_empty() {
            let start = paddr as usize;
            inside.copy_from_slice(&self.data[start..start + backed]);
        }
        outside.fill(0xFF);
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        let backed = self.backed_len(paddr, buf.len());
        if backed != 0 {
            let start = paddr as usize;
            self.data[start..start + backed].copy_from_slice(&buf[..backed]);
        }
    }
}
