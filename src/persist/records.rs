//! Versioned on-EEPROM settings records for slot cards.
//!
//! Every record shares a four-byte frame: CRC, little-endian length, then a
//! version byte, with the payload following. The length counts the version
//! byte plus the payload, and the CRC covers everything after itself. Reads
//! dispatch on the stored version; writes always emit the newest one.
//! Erasing a record zeroes its length so the next read fails the size check
//! and the caller falls back to compiled defaults.

use crate::persist::bus::{BusMutex, HandleFactory};
use crate::persist::cache::PageCache;
use crate::persist::crc::crc8_with_seed;
use crate::persist::driver::EepromDriver;
use crate::persist::error::RecordError;
use crate::persist::regions;
use crate::persist::slice::{ROSlice, WOSlice};
use crate::persist::span::AddressSpan;
use crate::persist::stream::{CachedStream, Seek, StreamDescriptor};
use crate::persist::types::SERIAL_NUMBER_WILDCARD;

/// SIO channels per card.
pub const SIO_CHANNEL_COUNT: u8 = 3;

/// Shutter channels per card.
pub const SHUTTER_CHANNEL_COUNT: u8 = 4;

/// A slot region is carved into this many equal record spans.
const SLOT_SUBDIVISIONS: u32 = 10;

/// Legacy waveforms store duties out of 1900 at a 24 V full scale.
const DUTY_FULL_SCALE_VOLTS: f32 = 24.0;
const DUTY_RANGE: f32 = 1900.0;

/// The record frame preceding every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFrame {
    pub crc: u8,
    pub length: u16,
    pub version: u8,
}

impl PageFrame {
    pub const SIZE: usize = 4;

    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        let view = ROSlice::new(&bytes);
        Self {
            crc: view.read_u8_at(0),
            length: view.read_u16_le_at(1),
            version: view.read_u8_at(3),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        let mut view = WOSlice::new(&mut bytes);
        view.write_u8_at(0, self.crc);
        view.write_u16_le_at(1, self.length);
        view.write_u8_at(3, self.version);
        bytes
    }
}

/// Maps a slot and channel to the address span holding its record.
pub trait EepromLayout {
    fn card_settings(&self, slot: u32) -> AddressSpan;
    fn sio_settings(&self, slot: u32, channel: u8) -> AddressSpan;
    fn shutter_settings(&self, slot: u32, channel: u8) -> AddressSpan;
}

/// Record placement on the 25LC1024: each slot region splits ten ways, with
/// the card record first, the SIO record second and one shutter record per
/// channel after that.
pub struct Layout25lc1024;

impl EepromLayout for Layout25lc1024 {
    fn card_settings(&self, slot: u32) -> AddressSpan {
        regions::slot(slot).split_and_index(SLOT_SUBDIVISIONS, 0)
    }

    fn sio_settings(&self, slot: u32, _channel: u8) -> AddressSpan {
        regions::slot(slot).split_and_index(SLOT_SUBDIVISIONS, 1)
    }

    fn shutter_settings(&self, slot: u32, channel: u8) -> AddressSpan {
        regions::slot(slot).split_and_index(SLOT_SUBDIVISIONS, 2 + channel as u32)
    }
}

/// Card-wide settings. One record per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CardSettings {
    pub enable_interlock_cable: bool,
    /// Not persisted; reads always report the compiled default.
    pub shutter_ttl_control_disables_usb_control: bool,
}

impl CardSettings {
    const VERSION: u8 = 0;
    const V0_LENGTH: u16 = 2;
}

/// Slider-IO settings. One record per slot; the per-channel booleans pack
/// into one byte each so a channel write never disturbs its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SioSettings {
    pub serial_number: u64,
    pub drives_high: bool,
    pub is_high_level_in_position: bool,
}

impl SioSettings {
    const VERSION: u8 = 0;
    const V0_LENGTH: u16 = 12;
    const CHANNEL_BITS_OFFSET: u32 = 12;

    const DRIVES_HIGH_BIT: u8 = 0x01;
    const HIGH_LEVEL_BIT: u8 = 0x02;

    fn channel_bits(&self) -> u8 {
        let mut bits = 0;
        if self.drives_high {
            bits |= Self::DRIVES_HIGH_BIT;
        }
        if self.is_high_level_in_position {
            bits |= Self::HIGH_LEVEL_BIT;
        }
        bits
    }

    /// Whether this record applies to the device with `connected_serial`.
    /// A wildcard saved serial matches any device; `ignore_serial_matching`
    /// bypasses the check entirely.
    pub fn accepts(&self, connected_serial: u64, ignore_serial_matching: bool) -> bool {
        serial_accepts(self.serial_number, connected_serial, ignore_serial_matching)
    }
}

impl Default for SioSettings {
    fn default() -> Self {
        Self {
            serial_number: SERIAL_NUMBER_WILDCARD,
            drives_high: true,
            is_high_level_in_position: true,
        }
    }
}

/// One shutter drive phase: how long to apply it and at what voltages.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Waveform {
    pub duration_100us: u32,
    pub holdoff_100us: u32,
    pub actuation_voltage: f32,
    pub holding_voltage: f32,
}

impl Waveform {
    /// Decodes the legacy duty-cycle encoding. Holdoff did not exist yet.
    fn from_v0_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        let view = ROSlice::new(bytes);
        let pulse_duty = view.read_i16_le_at(4);
        let hold_duty = view.read_i16_le_at(6);
        if opposite_signs(pulse_duty as f32, hold_duty as f32) {
            return Err(RecordError::InvalidValue);
        }
        Ok(Self {
            duration_100us: view.read_u32_le_at(0),
            holdoff_100us: 0,
            actuation_voltage: pulse_duty as f32 * DUTY_FULL_SCALE_VOLTS / DUTY_RANGE,
            holding_voltage: hold_duty as f32 * DUTY_FULL_SCALE_VOLTS / DUTY_RANGE,
        })
    }

    fn from_v1_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        let view = ROSlice::new(bytes);
        let waveform = Self {
            duration_100us: view.read_u32_le_at(0),
            holdoff_100us: view.read_u32_le_at(4),
            actuation_voltage: view.read_f32_le_at(8),
            holding_voltage: view.read_f32_le_at(12),
        };
        if opposite_signs(waveform.actuation_voltage, waveform.holding_voltage) {
            return Err(RecordError::InvalidValue);
        }
        Ok(waveform)
    }

    fn write_v1_bytes(&self, out: &mut WOSlice<'_>, offset: usize) {
        out.write_u32_le_at(offset, self.duration_100us);
        out.write_u32_le_at(offset + 4, self.holdoff_100us);
        out.write_f32_le_at(offset + 8, self.actuation_voltage);
        out.write_f32_le_at(offset + 12, self.holding_voltage);
    }

    fn is_consistent(&self) -> bool {
        !opposite_signs(self.actuation_voltage, self.holding_voltage)
    }
}

/// Shutter settings for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShutterSettings {
    pub serial_number: u64,
    pub open_waveform: Waveform,
    pub close_waveform: Waveform,
    pub trigger_mode: u8,
    pub powerup_state: u8,
}

impl ShutterSettings {
    const V0_LENGTH: u16 = 27;
    const V1_LENGTH: u16 = 43;
    const CURRENT_VERSION: u8 = 1;

    /// Whether this record applies to the device with `connected_serial`.
    /// A wildcard saved serial matches any device; `ignore_serial_matching`
    /// bypasses the check entirely.
    pub fn accepts(&self, connected_serial: u64, ignore_serial_matching: bool) -> bool {
        serial_accepts(self.serial_number, connected_serial, ignore_serial_matching)
    }
}

fn serial_accepts(saved: u64, connected: u64, ignore_serial_matching: bool) -> bool {
    ignore_serial_matching || saved == SERIAL_NUMBER_WILDCARD || saved == connected
}

fn opposite_signs(a: f32, b: f32) -> bool {
    (a > 0.0 && b < 0.0) || (a < 0.0 && b > 0.0)
}

/// Per-slot record store. Owns the page cache the record streams run
/// through; the bus handle factory is supplied per call so several
/// controllers can share one bus.
///
/// Getters return a [`RecordError`] when the stored record cannot be
/// trusted; the caller substitutes the type's `Default` and carries on.
/// Setters take `None` to erase the record back to that state.
pub struct PersistenceController<L: EepromLayout, const PS: usize = 256> {
    layout: L,
    slot: u32,
    cache: PageCache<PS>,
}

impl<L: EepromLayout, const PS: usize> PersistenceController<L, PS> {
    pub fn new(layout: L, slot: u32) -> Self {
        Self {
            layout,
            slot,
            cache: PageCache::new(),
        }
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn get_card_settings<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
    ) -> Result<CardSettings, RecordError> {
        let span = self.layout.card_settings(self.slot);
        let mut stream = stream_over(span, &mut self.cache)?;

        let frame = read_frame(&mut stream, factory)?;
        if frame.version != CardSettings::VERSION {
            return Err(RecordError::UnsupportedVersion);
        }
        verify_frame(&mut stream, factory, &frame, CardSettings::V0_LENGTH)?;

        stream.seek(Seek::Begin(PageFrame::SIZE as u32));
        let byte = stream
            .read_byte(factory)?
            .ok_or(RecordError::TooSmall)?;
        Ok(CardSettings {
            enable_interlock_cable: byte != 0,
            ..CardSettings::default()
        })
    }

    pub fn set_card_settings<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
        value: Option<&CardSettings>,
    ) -> Result<(), RecordError> {
        let span = self.layout.card_settings(self.slot);
        let mut stream = stream_over(span, &mut self.cache)?;

        let Some(value) = value else {
            return erase_record(&mut stream, factory);
        };

        stream.seek(Seek::Begin(PageFrame::SIZE as u32));
        let payload = [value.enable_interlock_cable as u8];
        if stream.write(factory, &payload)? != payload.len() {
            return Err(RecordError::TooSmall);
        }
        seal_record(
            &mut stream,
            factory,
            CardSettings::V0_LENGTH,
            CardSettings::VERSION,
        )
    }

    pub fn get_sio_settings<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
        channel: u8,
    ) -> Result<SioSettings, RecordError> {
        if channel >= SIO_CHANNEL_COUNT {
            return Err(RecordError::InvalidChannel);
        }
        let span = self.layout.sio_settings(self.slot, channel);
        let mut stream = stream_over(span, &mut self.cache)?;

        let frame = read_frame(&mut stream, factory)?;
        if frame.version != SioSettings::VERSION {
            return Err(RecordError::UnsupportedVersion);
        }
        verify_frame(&mut stream, factory, &frame, SioSettings::V0_LENGTH)?;

        stream.seek(Seek::Begin(PageFrame::SIZE as u32));
        let mut payload = [0u8; 8 + SIO_CHANNEL_COUNT as usize];
        if stream.read(factory, &mut payload)? != payload.len() {
            return Err(RecordError::TooSmall);
        }
        let view = ROSlice::new(&payload);
        let bits = view.read_u8_at(8 + channel as usize);
        Ok(SioSettings {
            serial_number: view.read_u64_le_at(0),
            drives_high: bits & SioSettings::DRIVES_HIGH_BIT != 0,
            is_high_level_in_position: bits & SioSettings::HIGH_LEVEL_BIT != 0,
        })
    }

    /// Writes one channel's SIO settings. The serial number and frame are
    /// rewritten; the other channels' bytes pass through the cache
    /// untouched, so the record stays valid for them too.
    pub fn set_sio_settings<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
        value: Option<&SioSettings>,
        channel: u8,
    ) -> Result<(), RecordError> {
        if channel >= SIO_CHANNEL_COUNT {
            return Err(RecordError::InvalidChannel);
        }
        let span = self.layout.sio_settings(self.slot, channel);
        let mut stream = stream_over(span, &mut self.cache)?;

        let Some(value) = value else {
            return erase_record(&mut stream, factory);
        };

        stream.seek(Seek::Begin(PageFrame::SIZE as u32));
        if stream.write(factory, &value.serial_number.to_le_bytes())? != 8 {
            return Err(RecordError::TooSmall);
        }
        stream.seek(Seek::Begin(SioSettings::CHANNEL_BITS_OFFSET + channel as u32));
        if stream.write(factory, &[value.channel_bits()])? != 1 {
            return Err(RecordError::TooSmall);
        }
        seal_record(
            &mut stream,
            factory,
            SioSettings::V0_LENGTH,
            SioSettings::VERSION,
        )
    }

    pub fn get_shutter_settings<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
        channel: u8,
    ) -> Result<ShutterSettings, RecordError> {
        if channel >= SHUTTER_CHANNEL_COUNT {
            return Err(RecordError::InvalidChannel);
        }
        let span = self.layout.shutter_settings(self.slot, channel);
        let mut stream = stream_over(span, &mut self.cache)?;

        let frame = read_frame(&mut stream, factory)?;
        match frame.version {
            0 => {
                verify_frame(&mut stream, factory, &frame, ShutterSettings::V0_LENGTH)?;
                stream.seek(Seek::Begin(PageFrame::SIZE as u32));
                let mut payload = [0u8; ShutterSettings::V0_LENGTH as usize - 1];
                if stream.read(factory, &mut payload)? != payload.len() {
                    return Err(RecordError::TooSmall);
                }
                let view = ROSlice::new(&payload);
                Ok(ShutterSettings {
                    serial_number: view.read_u64_le_at(0),
                    open_waveform: Waveform::from_v0_bytes(&payload[8..16])?,
                    close_waveform: Waveform::from_v0_bytes(&payload[16..24])?,
                    trigger_mode: view.read_u8_at(24),
                    powerup_state: view.read_u8_at(25),
                })
            }
            1 => {
                verify_frame(&mut stream, factory, &frame, ShutterSettings::V1_LENGTH)?;
                stream.seek(Seek::Begin(PageFrame::SIZE as u32));
                let mut payload = [0u8; ShutterSettings::V1_LENGTH as usize - 1];
                if stream.read(factory, &mut payload)? != payload.len() {
                    return Err(RecordError::TooSmall);
                }
                let view = ROSlice::new(&payload);
                Ok(ShutterSettings {
                    serial_number: view.read_u64_le_at(0),
                    open_waveform: Waveform::from_v1_bytes(&payload[8..24])?,
                    close_waveform: Waveform::from_v1_bytes(&payload[24..40])?,
                    trigger_mode: view.read_u8_at(40),
                    powerup_state: view.read_u8_at(41),
                })
            }
            _ => Err(RecordError::UnsupportedVersion),
        }
    }

    /// Writes shutter settings in the current record version, regardless of
    /// what version was stored before.
    pub fn set_shutter_settings<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
        value: Option<&ShutterSettings>,
        channel: u8,
    ) -> Result<(), RecordError> {
        if channel >= SHUTTER_CHANNEL_COUNT {
            return Err(RecordError::InvalidChannel);
        }
        let span = self.layout.shutter_settings(self.slot, channel);
        let mut stream = stream_over(span, &mut self.cache)?;

        let Some(value) = value else {
            return erase_record(&mut stream, factory);
        };
        if !value.open_waveform.is_consistent() || !value.close_waveform.is_consistent() {
            return Err(RecordError::InvalidValue);
        }

        let mut payload = [0u8; ShutterSettings::V1_LENGTH as usize - 1];
        let mut out = WOSlice::new(&mut payload);
        out.write_u64_le_at(0, value.serial_number);
        value.open_waveform.write_v1_bytes(&mut out, 8);
        value.close_waveform.write_v1_bytes(&mut out, 24);
        out.write_u8_at(40, value.trigger_mode);
        out.write_u8_at(41, value.powerup_state);

        stream.seek(Seek::Begin(PageFrame::SIZE as u32));
        if stream.write(factory, &payload)? != payload.len() {
            return Err(RecordError::TooSmall);
        }
        seal_record(
            &mut stream,
            factory,
            ShutterSettings::V1_LENGTH,
            ShutterSettings::CURRENT_VERSION,
        )
    }
}

fn stream_over<const PS: usize>(
    span: AddressSpan,
    cache: &mut PageCache<PS>,
) -> Result<CachedStream<'_, PS>, RecordError> {
    let desc = StreamDescriptor::from_span(span).ok_or(RecordError::TooSmall)?;
    Ok(CachedStream::new(desc, cache))
}

fn read_frame<M: BusMutex, E: EepromDriver, const PS: usize>(
    stream: &mut CachedStream<'_, PS>,
    factory: &mut HandleFactory<'_, M, E>,
) -> Result<PageFrame, RecordError> {
    stream.seek(Seek::Begin(0));
    let mut bytes = [0u8; PageFrame::SIZE];
    if stream.read(factory, &mut bytes)? != PageFrame::SIZE {
        return Err(RecordError::TooSmall);
    }
    Ok(PageFrame::from_bytes(bytes))
}

/// CRC of the `length + 2` bytes after the CRC byte, streamed through the
/// cache without an intermediate buffer.
fn record_crc<M: BusMutex, E: EepromDriver, const PS: usize>(
    stream: &mut CachedStream<'_, PS>,
    factory: &mut HandleFactory<'_, M, E>,
    length: u16,
) -> Result<u8, RecordError> {
    stream.seek(Seek::Begin(1));
    let mut remaining = length as usize + 2;
    let mut crc = 0u8;
    while remaining > 0 {
        let chunk = stream.read_to_cache_end(factory)?;
        if chunk.is_empty() {
            return Err(RecordError::TooSmall);
        }
        let take = chunk.len().min(remaining);
        crc = crc8_with_seed(&chunk[..take], crc);
        remaining -= take;
    }
    Ok(crc)
}

/// Length check, then CRC check. The version was dispatched on already.
fn verify_frame<M: BusMutex, E: EepromDriver, const PS: usize>(
    stream: &mut CachedStream<'_, PS>,
    factory: &mut HandleFactory<'_, M, E>,
    frame: &PageFrame,
    expected_length: u16,
) -> Result<(), RecordError> {
    if frame.length != expected_length {
        return Err(RecordError::SizeInvalid);
    }
    if record_crc(stream, factory, frame.length)? != frame.crc {
        return Err(RecordError::CrcInvalid);
    }
    Ok(())
}

/// Finishes a write whose payload already sits at offset 4: stores the
/// length and version, recomputes the CRC over the cached bytes, stores it,
/// and flushes.
fn seal_record<M: BusMutex, E: EepromDriver, const PS: usize>(
    stream: &mut CachedStream<'_, PS>,
    factory: &mut HandleFactory<'_, M, E>,
    length: u16,
    version: u8,
) -> Result<(), RecordError> {
    stream.seek(Seek::Begin(1));
    let mut tail = [0u8; 3];
    tail[..2].copy_from_slice(&length.to_le_bytes());
    tail[2] = version;
    if stream.write(factory, &tail)? != tail.len() {
        return Err(RecordError::TooSmall);
    }

    let crc = record_crc(stream, factory, length)?;
    stream.seek(Seek::Begin(0));
    if stream.write(factory, &[crc])? != 1 {
        return Err(RecordError::TooSmall);
    }
    stream.flush(factory)?;
    Ok(())
}

/// Zeroes the stored length so the record fails its size check. The version
/// and payload bytes are left behind; only the frame is spent.
fn erase_record<M: BusMutex, E: EepromDriver, const PS: usize>(
    stream: &mut CachedStream<'_, PS>,
    factory: &mut HandleFactory<'_, M, E>,
) -> Result<(), RecordError> {
    stream.seek(Seek::Begin(1));
    if stream.write(factory, &[0, 0])? != 2 {
        return Err(RecordError::TooSmall);
    }
    stream.flush(factory)?;
    Ok(())
}
