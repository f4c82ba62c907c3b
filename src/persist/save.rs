//! Assembles a card's saved-configuration image from LUT lookups and
//! one-wire custom entries.
//!
//! Resolution order for a single signature: a matching custom entry wins;
//! a custom-range config id with no custom entry fails (custom ids never
//! fall through to the Config LUT); anything else resolves from the Config
//! LUT. The schema tables below are the single source of payload sizes for
//! both this module and the LUT files.

use crate::persist::crc::{crc8, crc8_with_seed};
use crate::persist::lut::{LutId, LutManager};
use crate::persist::stepper;
use crate::persist::types::{
    ConfigSignature, DeviceSignature, OneWireConfigHeader, SlotType, StructId,
};

/// Config signatures in a stepper slot save image.
pub const STEPPER_SIGNATURE_COUNT: usize = 9;

/// Subdevices on a stepper card.
const STEPPER_SUBDEVICES: u8 = 1;

/// Packed size of the structure behind a struct id; 0 for ids this firmware
/// does not persist.
pub fn config_size(id: StructId) -> usize {
    match id {
        StructId::Encoder => stepper::EncoderSave::SIZE,
        StructId::Limit => stepper::LimitsSave::SIZE,
        StructId::StepperConfig => stepper::StepperConfig::SIZE,
        StructId::StepperDrive => stepper::DriveParams::SIZE,
        StructId::StepperFlags => stepper::FlagsSave::SIZE,
        StructId::StepperHome => stepper::HomeParams::SIZE,
        StructId::StepperJog => stepper::JogParams::SIZE,
        StructId::StepperPid => stepper::PidSave::SIZE,
        StructId::StepperStore => stepper::StepperStore::SIZE,
        _ => 0,
    }
}

/// Size of the full signature list a slot save carries; 0 for card types
/// without constructed saves.
pub fn slot_save_size(ty: SlotType) -> usize {
    if ty.is_stepper() {
        STEPPER_SIGNATURE_COUNT * ConfigSignature::SIZE
    } else {
        0
    }
}

pub fn subdevice_count(ty: SlotType) -> u8 {
    if ty.is_stepper() { STEPPER_SUBDEVICES } else { 0 }
}

/// Resolves configuration structures against a LUT manager.
pub struct SaveConstructor<'a> {
    luts: &'a LutManager<'a>,
}

impl<'a> SaveConstructor<'a> {
    pub const fn new(luts: &'a LutManager<'a>) -> Self {
        Self { luts }
    }

    /// CRC of a save image, chained from its device signature.
    pub fn validate(signature: DeviceSignature, save: &[u8]) -> u8 {
        crc8_with_seed(save, crc8(&signature.to_bytes()))
    }

    /// Whether a stored CRC matches the save image.
    pub fn check_valid(signature: DeviceSignature, save: &[u8], saved_crc: u8) -> bool {
        Self::validate(signature, save) == saved_crc
    }

    /// Resolves one signature into the front of `out`. Returns the number
    /// of bytes written, or `None` when the signature cannot be resolved.
    pub fn construct_single(
        &self,
        signature: ConfigSignature,
        out: &mut [u8],
        custom_entries: &[u8],
    ) -> Option<usize> {
        let size = config_size(signature.struct_id);
        if size == 0 || out.len() < size {
            return None;
        }

        if let Some(offset) = custom_config_offset(custom_entries, signature, size) {
            out[..size].copy_from_slice(&custom_entries[offset..offset + size]);
            return Some(size);
        }
        if signature.is_custom() {
            // A custom id must come from the device itself.
            return None;
        }

        self.luts
            .load_data(LutId::Config, &signature.to_bytes(), out)
            .ok()
    }

    /// Resolves a signature list into `out`, packed back to back. Returns
    /// the total bytes written; on `None` the buffer is partially filled
    /// and must not be consumed.
    pub fn construct(
        &self,
        signatures: &[ConfigSignature],
        out: &mut [u8],
        custom_entries: &[u8],
    ) -> Option<usize> {
        let mut cursor = 0;
        for &signature in signatures {
            let written = self.construct_single(signature, &mut out[cursor..], custom_entries)?;
            cursor += written;
        }
        Some(cursor)
    }
}

/// Byte offset of the custom payload for `signature`, if the custom-entry
/// buffer holds one whose payload fits inside the buffer.
///
/// The buffer is a packed header region (bounded by the first header's
/// `index`) followed by payloads. Every access is clamped to the buffer
/// length; device data is untrusted.
fn custom_config_offset(
    custom_entries: &[u8],
    signature: ConfigSignature,
    payload_size: usize,
) -> Option<usize> {
    let first = OneWireConfigHeader::parse(custom_entries)?;
    let header_end = (first.index as usize).min(custom_entries.len());

    let mut offset = 0;
    while offset + OneWireConfigHeader::SIZE <= header_end {
        let header = OneWireConfigHeader::parse(&custom_entries[offset..])?;
        if header.signature == signature {
            let payload = header.index as usize;
            if payload_size > 0 && payload + payload_size <= custom_entries.len() {
                return Some(payload);
            }
            return None;
        }
        offset += OneWireConfigHeader::SIZE;
    }
    None
}
