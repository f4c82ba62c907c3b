//! Look-up-table resolution for device and config records.
//!
//! Two flash-resident files drive plug-and-play: the *device* LUT maps a
//! connected device (keyed by the slot card it runs on plus its signature)
//! to the ordered list of config signatures it needs, and the *config* LUT
//! maps each config signature to the packed structure bytes. Payload sizes
//! are never stored in the files; they come from the schema tables in
//! [`save`](crate::persist::save).
//!
//! File layout: a four-byte header `[version][indirection]
//! [structure_key_size][discriminator_key_size]`, then groups ordered by
//! strictly ascending group key. Each group is its key, an entry count
//! (`u32` LE) and that many entries; each entry is the discriminator key,
//! the payload and a CRC seeded with the chained CRC of the group key.

use crate::persist::crc::{crc8, crc8_with_seed};
use crate::persist::save;
use crate::persist::types::SlotType;
use crate::persist::types::StructId;

const LUT_FILE_VERSION: u8 = 1;
const HEADER_SIZE: usize = 4;

/// LUT resolution failure.
///
/// The discriminants are reported verbatim over the host protocol (success
/// is wire code 0); do not renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LutError {
    OutOfMemory = 1,
    MissingKey = 2,
    BadStructureKey = 3,
    BadDiscriminatorKey = 4,
    InvalidEntry = 5,
    MissingFile = 6,
    UnsupportedVersion = 7,
    KeySizeMismatch = 8,
    InvalidLutId = 9,
    OrderViolation = 10,
    HeaderMissing = 11,
    IndirectionMismatch = 12,
}

impl LutError {
    /// Wire code for the host protocol.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl core::fmt::Display for LutError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Self::OutOfMemory => "destination too small for payload",
            Self::MissingKey => "no group for key",
            Self::BadStructureKey => "structure key not in table",
            Self::BadDiscriminatorKey => "discriminator key not in group",
            Self::InvalidEntry => "entry corrupt",
            Self::MissingFile => "table file absent",
            Self::UnsupportedVersion => "unsupported table version",
            Self::KeySizeMismatch => "key size disagrees with table header",
            Self::InvalidLutId => "unknown table id",
            Self::OrderViolation => "group keys out of order",
            Self::HeaderMissing => "table header truncated",
            Self::IndirectionMismatch => "table indirection level mismatch",
        };
        f.write_str(msg)
    }
}

/// Which table a lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LutId {
    Device = 0,
    Config = 1,
}

impl LutId {
    pub fn from_u8(value: u8) -> Result<Self, LutError> {
        match value {
            0 => Ok(Self::Device),
            1 => Ok(Self::Config),
            _ => Err(LutError::InvalidLutId),
        }
    }

    fn indirection(self) -> u8 {
        match self {
            Self::Config => 1,
            Self::Device => 2,
        }
    }

    fn group_key_size(self) -> usize {
        match self {
            Self::Config => 2, // struct id
            Self::Device => 4, // running slot card + device slot type
        }
    }

    fn discriminator_key_size(self) -> usize {
        2 // config id / device id
    }
}

/// Holds the two table images and the advisory access lock.
///
/// The images live in the embedded file system; the manager borrows them
/// for its own lifetime. An absent image resolves every lookup to
/// [`LutError::MissingFile`].
pub struct LutManager<'a> {
    locked: bool,
    device_file: Option<&'a [u8]>,
    config_file: Option<&'a [u8]>,
}

impl<'a> LutManager<'a> {
    pub const fn new(device_file: Option<&'a [u8]>, config_file: Option<&'a [u8]>) -> Self {
        Self {
            locked: false,
            device_file,
            config_file,
        }
    }

    /// When set, the table files must not be touched through the general
    /// file interface; every read goes through this manager.
    pub fn set_lock(&mut self, lock: bool) {
        self.locked = lock;
    }

    pub fn get_lock(&self) -> bool {
        self.locked
    }

    /// Resolves `key` in the given table, writing the payload into `out`.
    /// Returns the number of bytes written (the schema size for the key;
    /// sizes are never stored in the file).
    pub fn load_data(&self, lut: LutId, key: &[u8], out: &mut [u8]) -> Result<usize, LutError> {
        let file = match lut {
            LutId::Device => self.device_file,
            LutId::Config => self.config_file,
        }
        .ok_or(LutError::MissingFile)?;

        let group_size = lut.group_key_size();
        let disc_size = lut.discriminator_key_size();
        if key.len() != group_size + disc_size {
            return Err(LutError::KeySizeMismatch);
        }

        if payload_size_for(lut, &key[..group_size])? == 0 {
            return Err(LutError::BadStructureKey);
        }

        check_header(file, lut, group_size, disc_size)?;
        lookup(
            &file[HEADER_SIZE..],
            lut,
            &key[..group_size],
            &key[group_size..],
            out,
        )
    }
}

/// Schema size of the payload behind a group key.
fn payload_size_for(lut: LutId, group_key: &[u8]) -> Result<usize, LutError> {
    match lut {
        LutId::Config => {
            let sid = StructId::from_u16(u16::from_le_bytes([group_key[0], group_key[1]]));
            Ok(save::config_size(sid))
        }
        LutId::Device => {
            // Payload is the ordered config-signature list, sized by the
            // running slot card.
            let raw = u16::from_le_bytes([group_key[0], group_key[1]]);
            let slot = SlotType::from_u16(raw).ok_or(LutError::BadStructureKey)?;
            Ok(save::slot_save_size(slot))
        }
    }
}

fn check_header(
    file: &[u8],
    lut: LutId,
    group_size: usize,
    disc_size: usize,
) -> Result<(), LutError> {
    if file.len() < HEADER_SIZE {
        return Err(LutError::HeaderMissing);
    }
    if file[0] != LUT_FILE_VERSION {
        return Err(LutError::UnsupportedVersion);
    }
    if file[1] != lut.indirection() {
        return Err(LutError::IndirectionMismatch);
    }
    if file[2] as usize != group_size || file[3] as usize != disc_size {
        return Err(LutError::KeySizeMismatch);
    }
    Ok(())
}

/// Group keys compare as little-endian unsigned integers.
fn key_value(bytes: &[u8]) -> u64 {
    let mut value = 0u64;
    for (i, &b) in bytes.iter().enumerate() {
        value |= u64::from(b) << (8 * i);
    }
    value
}

fn lookup(
    mut body: &[u8],
    lut: LutId,
    group_key: &[u8],
    disc_key: &[u8],
    out: &mut [u8],
) -> Result<usize, LutError> {
    let group_size = group_key.len();
    let disc_size = disc_key.len();
    let wanted = key_value(group_key);

    let mut previous: Option<u64> = None;
    while !body.is_empty() {
        if body.len() < group_size + 4 {
            return Err(LutError::InvalidEntry);
        }
        let this_key = &body[..group_size];
        let this_value = key_value(this_key);
        if previous.is_some_and(|p| p >= this_value) {
            return Err(LutError::OrderViolation);
        }
        previous = Some(this_value);

        // Entries carry no length field: each group's entry size comes
        // from the schema behind its own key. A key with no schema makes
        // the rest of the file unwalkable.
        let payload_size = match payload_size_for(lut, this_key) {
            Ok(size) if size > 0 => size,
            _ => return Err(LutError::InvalidEntry),
        };
        let entry_size = disc_size + payload_size + 1;

        let count = u32::from_le_bytes([
            body[group_size],
            body[group_size + 1],
            body[group_size + 2],
            body[group_size + 3],
        ]) as usize;
        let entries = &body[group_size + 4..];
        let group_len = count
            .checked_mul(entry_size)
            .filter(|&len| len <= entries.len())
            .ok_or(LutError::InvalidEntry)?;

        if this_value == wanted {
            return find_entry(
                &entries[..group_len],
                this_key,
                disc_key,
                payload_size,
                out,
            );
        }
        body = &entries[group_len..];
    }

    // Indirection matched but the structure key resolved nothing: the
    // device table has no list for this slot/device pairing.
    match lut {
        LutId::Device => Err(LutError::BadStructureKey),
        LutId::Config => Err(LutError::MissingKey),
    }
}

fn find_entry(
    mut entries: &[u8],
    group_key: &[u8],
    disc_key: &[u8],
    payload_size: usize,
    out: &mut [u8],
) -> Result<usize, LutError> {
    let disc_size = disc_key.len();
    let entry_size = disc_size + payload_size + 1;
    let seed = crc8(group_key);

    while entries.len() >= entry_size {
        let (entry, rest) = entries.split_at(entry_size);
        if &entry[..disc_size] == disc_key {
            let stored_crc = entry[entry_size - 1];
            if crc8_with_seed(&entry[..disc_size + payload_size], seed) != stored_crc {
                return Err(LutError::InvalidEntry);
            }
            let payload = &entry[disc_size..disc_size + payload_size];
            if out.len() < payload_size {
                return Err(LutError::OutOfMemory);
            }
            out[..payload_size].copy_from_slice(payload);
            return Ok(payload_size);
        }
        entries = rest;
    }
    Err(LutError::BadDiscriminatorKey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::test_support::LutFileBuilder;
    use crate::persist::types::{ConfigSignature, DeviceLutKey, DeviceSignature};

    fn encoder_payload() -> [u8; 9] {
        [1, 0x10, 0x00, 0x20, 0x00, 0, 0, 0x80, 0x3F]
    }

    fn config_file() -> LutFileBuilder {
        let mut builder = LutFileBuilder::new(1, 2, 2);
        // Struct id 0 (encoder), configs 3 and 5.
        builder.group(&0u16.to_le_bytes());
        builder.entry(&3u16.to_le_bytes(), &encoder_payload());
        builder.entry(&5u16.to_le_bytes(), &[9; 9]);
        // Struct id 3 (stepper drive), config 2.
        builder.group(&3u16.to_le_bytes());
        builder.entry(&2u16.to_le_bytes(), &[0xD0; 40]);
        // Struct id 4 (stepper flags), config 1.
        builder.group(&4u16.to_le_bytes());
        builder.entry(&1u16.to_le_bytes(), &[0x55]);
        builder
    }

    #[test]
    fn config_lookup_returns_schema_sized_payload() {
        let file = config_file();
        let manager = LutManager::new(None, Some(file.as_bytes()));

        let key = ConfigSignature::new(StructId::Encoder, 3).to_bytes();
        let mut out = [0u8; 16];
        let n = manager.load_data(LutId::Config, &key, &mut out).unwrap();
        assert_eq!(n, 9);
        assert_eq!(&out[..9], &encoder_payload());

        let key = ConfigSignature::new(StructId::StepperDrive, 2).to_bytes();
        let mut out = [0u8; 64];
        let n = manager.load_data(LutId::Config, &key, &mut out).unwrap();
        assert_eq!(n, 40);
        assert_eq!(&out[..40], &[0xD0; 40]);

        let key = ConfigSignature::new(StructId::StepperFlags, 1).to_bytes();
        let n = manager.load_data(LutId::Config, &key, &mut out).unwrap();
        assert_eq!(n, 1);
        assert_eq!(out[0], 0x55);
    }

    #[test]
    fn device_lookup_resolves_signature_list() {
        // Stepper card: payload is nine config signatures.
        let mut sigs = [0u8; 36];
        for (i, chunk) in sigs.chunks_exact_mut(4).enumerate() {
            let sig = ConfigSignature::new(StructId::from_u16(i as u16), 2);
            chunk.copy_from_slice(&sig.to_bytes());
        }
        let mut builder = LutFileBuilder::new(2, 4, 2);
        let group = [2u8, 0, 2, 0]; // running on Stepper, device slot type Stepper
        builder.group(&group);
        builder.entry(&7u16.to_le_bytes(), &sigs);

        let manager = LutManager::new(Some(builder.as_bytes()), None);
        let key = DeviceLutKey {
            running_slot_card: SlotType::Stepper,
            connected_device: DeviceSignature::new(SlotType::Stepper, 7),
        };
        let mut out = [0u8; 64];
        let n = manager
            .load_data(LutId::Device, &key.to_bytes(), &mut out)
            .unwrap();
        assert_eq!(n, 36);
        assert_eq!(&out[..36], &sigs);

        // Same table, device id that is not listed.
        let key = DeviceLutKey {
            running_slot_card: SlotType::Stepper,
            connected_device: DeviceSignature::new(SlotType::Stepper, 8),
        };
        assert_eq!(
            manager.load_data(LutId::Device, &key.to_bytes(), &mut out),
            Err(LutError::BadDiscriminatorKey)
        );

        // Structure key with no group at all.
        let key = DeviceLutKey {
            running_slot_card: SlotType::HcStepper,
            connected_device: DeviceSignature::new(SlotType::Stepper, 7),
        };
        assert_eq!(
            manager.load_data(LutId::Device, &key.to_bytes(), &mut out),
            Err(LutError::BadStructureKey)
        );
    }

    #[test]
    fn missing_pieces_map_to_distinct_errors() {
        let file = config_file();
        let manager = LutManager::new(None, Some(file.as_bytes()));
        let mut out = [0u8; 16];

        // Group exists, discriminator does not.
        let key = ConfigSignature::new(StructId::Encoder, 4).to_bytes();
        assert_eq!(
            manager.load_data(LutId::Config, &key, &mut out),
            Err(LutError::BadDiscriminatorKey)
        );

        // No group for this struct id.
        let key = ConfigSignature::new(StructId::StepperPid, 1).to_bytes();
        assert_eq!(
            manager.load_data(LutId::Config, &key, &mut out),
            Err(LutError::MissingKey)
        );

        // Struct id with no schema.
        let key = ConfigSignature::new(StructId::Invalid, 1).to_bytes();
        assert_eq!(
            manager.load_data(LutId::Config, &key, &mut out),
            Err(LutError::BadStructureKey)
        );

        // Absent file.
        let empty = LutManager::new(None, None);
        let key = ConfigSignature::new(StructId::Encoder, 3).to_bytes();
        assert_eq!(
            empty.load_data(LutId::Config, &key, &mut out),
            Err(LutError::MissingFile)
        );
    }

    #[test]
    fn header_checks_run_before_any_lookup() {
        let mut out = [0u8; 16];
        let key = ConfigSignature::new(StructId::Encoder, 3).to_bytes();

        let short = [1u8, 1];
        let manager = LutManager::new(None, Some(&short));
        assert_eq!(
            manager.load_data(LutId::Config, &key, &mut out),
            Err(LutError::HeaderMissing)
        );

        let bad_version = [2u8, 1, 2, 2];
        let manager = LutManager::new(None, Some(&bad_version));
        assert_eq!(
            manager.load_data(LutId::Config, &key, &mut out),
            Err(LutError::UnsupportedVersion)
        );

        // A device table presented as the config table.
        let wrong_level = [1u8, 2, 2, 2];
        let manager = LutManager::new(None, Some(&wrong_level));
        assert_eq!(
            manager.load_data(LutId::Config, &key, &mut out),
            Err(LutError::IndirectionMismatch)
        );

        let wrong_keys = [1u8, 1, 4, 2];
        let manager = LutManager::new(None, Some(&wrong_keys));
        assert_eq!(
            manager.load_data(LutId::Config, &key, &mut out),
            Err(LutError::KeySizeMismatch)
        );
    }

    #[test]
    fn corruption_is_detected() {
        let mut file = config_file();
        // Flip one payload bit in the first entry.
        let bytes = file.as_bytes_mut();
        bytes[4 + 2 + 4 + 2] ^= 0x01;
        let manager = LutManager::new(None, Some(file.as_bytes()));

        let key = ConfigSignature::new(StructId::Encoder, 3).to_bytes();
        let mut out = [0u8; 16];
        assert_eq!(
            manager.load_data(LutId::Config, &key, &mut out),
            Err(LutError::InvalidEntry)
        );
    }

    #[test]
    fn descending_groups_are_rejected() {
        let mut builder = LutFileBuilder::new(1, 2, 2);
        builder.group(&4u16.to_le_bytes());
        builder.entry(&1u16.to_le_bytes(), &[0x55]);
        builder.group(&0u16.to_le_bytes());
        builder.entry(&3u16.to_le_bytes(), &encoder_payload());

        let manager = LutManager::new(None, Some(builder.as_bytes()));
        // The walk reaches group 0 only after group 4, so any key past the
        // first group trips the ordering check.
        let key = ConfigSignature::new(StructId::Encoder, 3).to_bytes();
        let mut out = [0u8; 16];
        assert_eq!(
            manager.load_data(LutId::Config, &key, &mut out),
            Err(LutError::OrderViolation)
        );
    }

    #[test]
    fn schemaless_group_poisons_the_walk() {
        // Group sizes come from the schema tables, so a group keyed by an
        // unknown struct id cannot be skipped over.
        let mut builder = LutFileBuilder::new(1, 2, 2);
        builder.group(&0u16.to_le_bytes());
        builder.entry(&3u16.to_le_bytes(), &encoder_payload());
        builder.group(&12u16.to_le_bytes());
        builder.entry(&1u16.to_le_bytes(), &[0xAA; 4]);

        let manager = LutManager::new(None, Some(builder.as_bytes()));
        let mut out = [0u8; 16];

        // Keys resolved before the bad group still work.
        let key = ConfigSignature::new(StructId::Encoder, 3).to_bytes();
        assert_eq!(manager.load_data(LutId::Config, &key, &mut out), Ok(9));

        // Any key past it hits the unwalkable group.
        let key = ConfigSignature::new(StructId::StepperStore, 1).to_bytes();
        assert_eq!(
            manager.load_data(LutId::Config, &key, &mut out),
            Err(LutError::InvalidEntry)
        );
    }

    #[test]
    fn small_destination_is_out_of_memory() {
        let file = config_file();
        let manager = LutManager::new(None, Some(file.as_bytes()));
        let key = ConfigSignature::new(StructId::Encoder, 3).to_bytes();
        let mut out = [0u8; 4];
        assert_eq!(
            manager.load_data(LutId::Config, &key, &mut out),
            Err(LutError::OutOfMemory)
        );
    }

    #[test]
    fn lock_flag_is_advisory_state() {
        let mut manager = LutManager::new(None, None);
        assert!(!manager.get_lock());
        manager.set_lock(true);
        assert!(manager.get_lock());
        manager.set_lock(false);
        assert!(!manager.get_lock());
    }
}
