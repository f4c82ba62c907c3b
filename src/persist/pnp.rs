//! Plug-and-play status flags reported to the host after device detection.

use bitmaps::Bitmap;

/// One detection fault. The bit positions are part of the reporting
/// protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PnpFlag {
    NoDeviceConnected = 0,
    GeneralOwError = 1,
    UnknownOwVersion = 2,
    OwCorruption = 3,
    SerialNumMismatch = 4,
    SignatureNotAllowed = 5,
    GeneralConfigError = 6,
    ConfigurationSetMiss = 7,
    ConfigurationStructMiss = 8,
    /// Raised with [`SignatureNotAllowed`](Self::SignatureNotAllowed) when
    /// the device's default card type itself is unsupported.
    IncompatibleCardType = 9,
}

/// Accumulated detection faults for one slot.
///
/// Starts clear ("no errors"); detection raises flags as it runs and the
/// whole set ships to the host as one little-endian `u16` status word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PnpStatus {
    flags: Bitmap<10>,
}

impl PnpStatus {
    pub fn new() -> Self {
        Self {
            flags: Bitmap::new(),
        }
    }

    pub fn raise(&mut self, flag: PnpFlag) {
        self.flags.set(flag as usize, true);
    }

    pub fn clear(&mut self, flag: PnpFlag) {
        self.flags.set(flag as usize, false);
    }

    pub fn is_raised(&self, flag: PnpFlag) -> bool {
        self.flags.get(flag as usize)
    }

    pub fn is_ok(&self) -> bool {
        self.flags.is_empty()
    }

    /// Status word as reported over the wire.
    pub fn to_word(&self) -> u16 {
        let mut word = 0u16;
        for bit in self.flags.into_iter() {
            word |= 1 << bit;
        }
        word
    }

    pub fn from_word(word: u16) -> Self {
        let mut status = Self::new();
        for bit in 0..10 {
            if word & (1 << bit) != 0 {
                status.flags.set(bit, true);
            }
        }
        status
    }
}
