//! The raw EEPROM transport consumed by the engine.

use crate::persist::error::StoreError;

/// A byte-addressed EEPROM device.
///
/// Implementations perform one logical transaction per call and may assume
/// the caller already holds bus exclusivity (see
/// [`HandleFactory`](crate::persist::bus::HandleFactory)). Splitting a write
/// across physical write-page boundaries is the implementation's concern.
pub trait EepromDriver {
    /// Reads `dest.len()` bytes starting at `address`.
    fn read(&mut self, address: u32, dest: &mut [u8]) -> Result<(), StoreError>;

    /// Writes `src` starting at `address`.
    fn write(&mut self, address: u32, src: &[u8]) -> Result<(), StoreError>;
}

/// An array-backed EEPROM, for host-side tooling and tests.
pub struct MemEeprom<const N: usize> {
    mem: [u8; N],
}

impl<const N: usize> MemEeprom<N> {
    pub fn new() -> Self {
        Self { mem: [0xFF; N] }
    }

    /// Direct view of the backing memory.
    pub fn bytes(&self) -> &[u8] {
        &self.mem
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mem
    }

    fn range(&self, address: u32, len: usize) -> Result<core::ops::Range<usize>, StoreError> {
        let start = address as usize;
        let end = start.checked_add(len).ok_or(StoreError::OutOfBounds)?;
        if end > N {
            return Err(StoreError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl<const N: usize> Default for MemEeprom<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> EepromDriver for MemEeprom<N> {
    fn read(&mut self, address: u32, dest: &mut [u8]) -> Result<(), StoreError> {
        let range = self.range(address, dest.len())?;
        dest.copy_from_slice(&self.mem[range]);
        Ok(())
    }

    fn write(&mut self, address: u32, src: &[u8]) -> Result<(), StoreError> {
        let range = self.range(address, src.len())?;
        self.mem[range].copy_from_slice(src);
        Ok(())
    }
}
