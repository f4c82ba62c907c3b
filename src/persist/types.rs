//! Identity types shared across the LUT, save-constructor and stepper
//! layers: structure ids, slot card types and the composite keys built
//! from them.
//!
//! All wire forms are packed little-endian; keys serialize through
//! `to_bytes` so lookup code compares plain byte strings.

/// A device id that references no LUT device entry.
pub const INVALID_DEVICE_ID: u16 = 0xFFFF;

/// A config id that references no LUT config entry.
pub const INVALID_CONFIG_ID: u16 = 0xFFFF;

/// First config id of the one-wire custom range. Ids at or above this value
/// must resolve from the custom-entry buffer, never from the Config LUT.
pub const OW_CUSTOM_CONFIG_BASE: u16 = 0xFFF0;

/// Serial number matching any device.
pub const SERIAL_NUMBER_WILDCARD: u64 = u64::MAX;

/// Serial number of a slot with no device recorded.
pub const SERIAL_NUMBER_EMPTY: u64 = 0;

/// Raw one-wire custom entry buffer, as read from a connected device.
pub type CustomEntries = heapless::Vec<u8, 256>;

/// Identifies a persisted structure layout in the Config LUT.
///
/// The discriminants are part of the external programming protocol;
/// unknown values decode to [`Invalid`](Self::Invalid).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StructId {
    Encoder = 0,
    Limit = 1,
    StepperConfig = 2,
    StepperDrive = 3,
    StepperFlags = 4,
    StepperHome = 5,
    StepperJog = 6,
    StepperPid = 7,
    StepperStore = 8,
    FlipperShutterSio = 9,
    FlipperShutterCommon = 10,
    ShutterWaveform = 11,
    Invalid = 0xFFFF,
}

impl StructId {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::Encoder,
            1 => Self::Limit,
            2 => Self::StepperConfig,
            3 => Self::StepperDrive,
            4 => Self::StepperFlags,
            5 => Self::StepperHome,
            6 => Self::StepperJog,
            7 => Self::StepperPid,
            8 => Self::StepperStore,
            9 => Self::FlipperShutterSio,
            10 => Self::FlipperShutterCommon,
            11 => Self::ShutterWaveform,
            _ => Self::Invalid,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// The card type occupying a motion-controller slot.
///
/// Discriminants are what the cards report over the backplane and what the
/// device LUT keys carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SlotType {
    NoCard = 0,
    NotProgrammed = 1,
    Stepper = 2,
    HcStepper = 3,
    Servo = 4,
    Shutter = 5,
    OtmDac = 6,
    OtmRs232 = 7,
    HcStepperHd = 8,
    SliderIo = 9,
    Shutter4 = 10,
    PiezoElliptec = 11,
    InvertStepperBiss = 12,
    InvertStepperSsi = 13,
    Piezo = 14,
    StepperInternalBiss = 15,
    StepperInternalSsi = 16,
    StepperMicroDb15 = 17,
    Shutter4Rev6 = 18,
    StepperLcHdDb15 = 19,
    FlipperShutter = 20,
    FlipperShutterRevA = 21,
    End = 0xFFFF,
}

impl SlotType {
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            0 => Self::NoCard,
            1 => Self::NotProgrammed,
            2 => Self::Stepper,
            3 => Self::HcStepper,
            4 => Self::Servo,
            5 => Self::Shutter,
            6 => Self::OtmDac,
            7 => Self::OtmRs232,
            8 => Self::HcStepperHd,
            9 => Self::SliderIo,
            10 => Self::Shutter4,
            11 => Self::PiezoElliptec,
            12 => Self::InvertStepperBiss,
            13 => Self::InvertStepperSsi,
            14 => Self::Piezo,
            15 => Self::StepperInternalBiss,
            16 => Self::StepperInternalSsi,
            17 => Self::StepperMicroDb15,
            18 => Self::Shutter4Rev6,
            19 => Self::StepperLcHdDb15,
            20 => Self::FlipperShutter,
            21 => Self::FlipperShutterRevA,
            0xFFFF => Self::End,
            _ => return None,
        })
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Whether the card is any member of the stepper family.
    pub fn is_stepper(self) -> bool {
        matches!(
            self,
            Self::Stepper
                | Self::HcStepper
                | Self::HcStepperHd
                | Self::InvertStepperBiss
                | Self::InvertStepperSsi
                | Self::StepperInternalBiss
                | Self::StepperInternalSsi
                | Self::StepperMicroDb15
                | Self::StepperLcHdDb15
        )
    }
}

/// Config LUT key: which structure, and which configuration of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigSignature {
    pub struct_id: StructId,
    pub config_id: u16,
}

impl ConfigSignature {
    pub const SIZE: usize = 4;

    pub const fn new(struct_id: StructId, config_id: u16) -> Self {
        Self {
            struct_id,
            config_id,
        }
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let sid = self.struct_id.as_u16().to_le_bytes();
        let cid = self.config_id.to_le_bytes();
        [sid[0], sid[1], cid[0], cid[1]]
    }

    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self {
            struct_id: StructId::from_u16(u16::from_le_bytes([bytes[0], bytes[1]])),
            config_id: u16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }

    /// Whether the config id falls in the one-wire custom range.
    pub fn is_custom(self) -> bool {
        self.config_id >= OW_CUSTOM_CONFIG_BASE
    }
}

/// Identity of a connected device: the card type it runs on plus its LUT
/// device id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSignature {
    pub slot_type: SlotType,
    pub device_id: u16,
}

impl DeviceSignature {
    pub const SIZE: usize = 4;

    pub const fn new(slot_type: SlotType, device_id: u16) -> Self {
        Self {
            slot_type,
            device_id,
        }
    }

    /// The signature of a slot with no programmed identity.
    pub const fn not_programmed() -> Self {
        Self {
            slot_type: SlotType::NotProgrammed,
            device_id: INVALID_DEVICE_ID,
        }
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let st = self.slot_type.as_u16().to_le_bytes();
        let id = self.device_id.to_le_bytes();
        [st[0], st[1], id[0], id[1]]
    }

    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Option<Self> {
        Some(Self {
            slot_type: SlotType::from_u16(u16::from_le_bytes([bytes[0], bytes[1]]))?,
            device_id: u16::from_le_bytes([bytes[2], bytes[3]]),
        })
    }
}

/// Device LUT key: the slot card the device is plugged into plus the
/// device's own signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLutKey {
    pub running_slot_card: SlotType,
    pub connected_device: DeviceSignature,
}

impl DeviceLutKey {
    pub const SIZE: usize = 6;

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let slot = self.running_slot_card.as_u16().to_le_bytes();
        let dev = self.connected_device.to_bytes();
        [slot[0], slot[1], dev[0], dev[1], dev[2], dev[3]]
    }
}

/// Header of one entry in a device's one-wire custom config region.
///
/// The custom region is a packed sequence of headers followed by payloads;
/// `index` is the byte offset of the payload within the region. The first
/// header's `index` also bounds the header area itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OneWireConfigHeader {
    pub signature: ConfigSignature,
    pub index: u16,
}

impl OneWireConfigHeader {
    pub const SIZE: usize = 6;

    /// Decodes a header from the start of `bytes`; `None` when fewer than
    /// [`SIZE`](Self::SIZE) bytes remain.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let mut sig = [0u8; ConfigSignature::SIZE];
        sig.copy_from_slice(&bytes[..ConfigSignature::SIZE]);
        Some(Self {
            signature: ConfigSignature::from_bytes(sig),
            index: u16::from_le_bytes([bytes[4], bytes[5]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_id_round_trips_and_saturates() {
        assert_eq!(StructId::from_u16(7), StructId::StepperPid);
        assert_eq!(StructId::from_u16(7).as_u16(), 7);
        assert_eq!(StructId::from_u16(500), StructId::Invalid);
        assert_eq!(StructId::Invalid.as_u16(), 0xFFFF);
    }

    #[test]
    fn slot_type_family_predicates() {
        for raw in [2u16, 3, 8, 12, 13, 15, 16, 17, 19] {
            let ty = SlotType::from_u16(raw).unwrap();
            assert!(ty.is_stepper(), "{raw} should be a stepper card");
        }
        assert!(!SlotType::Servo.is_stepper());
        assert!(!SlotType::FlipperShutter.is_stepper());
        assert_eq!(SlotType::from_u16(400), None);
    }

    #[test]
    fn signatures_serialize_little_endian() {
        let sig = ConfigSignature::new(StructId::StepperDrive, 0x0102);
        assert_eq!(sig.to_bytes(), [3, 0, 0x02, 0x01]);
        assert_eq!(ConfigSignature::from_bytes(sig.to_bytes()), sig);

        let dev = DeviceSignature::new(SlotType::FlipperShutter, 7);
        assert_eq!(dev.to_bytes(), [20, 0, 7, 0]);
        assert_eq!(DeviceSignature::from_bytes(dev.to_bytes()), Some(dev));

        let key = DeviceLutKey {
            running_slot_card: SlotType::Stepper,
            connected_device: dev,
        };
        assert_eq!(key.to_bytes(), [2, 0, 20, 0, 7, 0]);
    }

    #[test]
    fn custom_config_range() {
        assert!(ConfigSignature::new(StructId::Encoder, OW_CUSTOM_CONFIG_BASE).is_custom());
        assert!(ConfigSignature::new(StructId::Encoder, 0xFFFE).is_custom());
        assert!(!ConfigSignature::new(StructId::Encoder, 0x0003).is_custom());
    }

    #[test]
    fn one_wire_header_parses_prefix() {
        let bytes = [1, 0, 5, 0, 0x0C, 0x00, 0xAA];
        let header = OneWireConfigHeader::parse(&bytes).unwrap();
        assert_eq!(header.signature, ConfigSignature::new(StructId::Limit, 5));
        assert_eq!(header.index, 12);

        assert_eq!(OneWireConfigHeader::parse(&bytes[..5]), None);
    }
}
