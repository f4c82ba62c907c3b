//! Binds one in-memory struct to a fixed EEPROM window.
//!
//! The mapper remembers the CRC of the window as of the last load or save,
//! so "has this struct diverged from EEPROM" is answered without a bus read
//! and unchanged saves are skipped entirely, which is the crate's main
//! write-amplification guard.

use crate::persist::bus::{BusMutex, HandleFactory};
use crate::persist::crc::crc8;
use crate::persist::driver::EepromDriver;
use crate::persist::error::StoreError;

/// CRC-tracked window binding. The struct bytes themselves live with the
/// caller; the mapper only carries the link state.
#[derive(Debug, Default, Clone, Copy)]
pub struct SlimMapper {
    linked: bool,
    loaded_crc: u8,
}

impl SlimMapper {
    pub const fn new() -> Self {
        Self {
            linked: false,
            loaded_crc: 0,
        }
    }

    /// Whether a load or save has bound this mapper to its window.
    pub fn is_linked(&self) -> bool {
        self.linked
    }

    /// CRC of the window contents as of the last load or save.
    pub fn eeprom_crc(&self) -> u8 {
        self.loaded_crc
    }

    /// Reads the window into `dest` and records its CRC.
    pub fn load<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
        address: u32,
        dest: &mut [u8],
    ) -> Result<(), StoreError> {
        factory.device().read(address, dest)?;
        self.loaded_crc = crc8(dest);
        self.linked = true;
        Ok(())
    }

    /// Writes `src` to the window unconditionally and records its CRC.
    pub fn save<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
        address: u32,
        src: &[u8],
    ) -> Result<(), StoreError> {
        factory.device().write(address, src)?;
        self.loaded_crc = crc8(src);
        self.linked = true;
        Ok(())
    }

    /// Writes only when `src` differs from the last known window contents.
    /// Returns whether a write happened.
    pub fn save_if_dirty<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
        address: u32,
        src: &[u8],
    ) -> Result<bool, StoreError> {
        if !self.is_dirty(src) {
            return Ok(false);
        }
        self.save(factory, address, src)?;
        Ok(true)
    }

    /// Whether `data` differs from the window as of the last load/save.
    /// Pure probe, no bus traffic; an unlinked mapper is always dirty.
    pub fn is_dirty(&self, data: &[u8]) -> bool {
        !self.linked || crc8(data) != self.loaded_crc
    }
}
