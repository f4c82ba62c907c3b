//! Stepper card parameter persistence.
//!
//! One contiguous EEPROM image per axis: an identity header (target device
//! serial plus a combined validity CRC), then the eight parameter
//! structures at compile-time offsets. Each structure has its own
//! [`SlimMapper`], so a sub-field save rewrites one structure and patches
//! the combined CRC by XOR instead of rehashing the whole image.

use crate::persist::bus::{BusMutex, HandleFactory};
use crate::persist::driver::EepromDriver;
use crate::persist::error::StoreError;
use crate::persist::mapper::SlimMapper;
use crate::persist::slice::{ROSlice, WOSlice};
use crate::persist::types::SERIAL_NUMBER_WILDCARD;

/// Target serial written by [`StepperSavedConfigs::invalidate`]; matches no
/// real one-wire serial.
pub const INVALIDATED_TARGET: u64 = 0x0FFF_FFFF_FFFF_FFFF;

/// Positions a stepper card can store per axis.
pub const STORED_POSITION_COUNT: usize = 10;

/// Axis geometry and identity.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct StepperConfig {
    pub axis_serial_no: u32,
    /// Affected by gearboxes, so it lives with the axis, not the encoder.
    pub counts_per_unit: f32,
    pub min_pos: u32,
    pub max_pos: u32,
    pub collision_threshold: u16,
}

impl StepperConfig {
    pub const SIZE: usize = 18;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut w = WOSlice::new(&mut buf);
        w.write_u32_le_at(0, self.axis_serial_no);
        w.write_f32_le_at(4, self.counts_per_unit);
        w.write_u32_le_at(8, self.min_pos);
        w.write_u32_le_at(12, self.max_pos);
        w.write_u16_le_at(16, self.collision_threshold);
        buf
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let r = ROSlice::new(bytes);
        Self {
            axis_serial_no: r.read_u32_le_at(0),
            counts_per_unit: r.read_f32_le_at(4),
            min_pos: r.read_u32_le_at(8),
            max_pos: r.read_u32_le_at(12),
            collision_threshold: r.read_u16_le_at(16),
        }
    }
}

/// Motion driver register image (L6470/L6480 family) plus servo-loop
/// extras.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DriveParams {
    pub acc: u32,
    pub dec: u32,
    pub max_speed: u32,
    pub min_speed: u16,
    pub fs_spd: u16,
    pub kval_hold: u8,
    pub kval_run: u8,
    pub kval_acc: u8,
    pub kval_dec: u8,
    pub int_speed: u16,
    pub stall_th: u8,
    pub st_slp: u8,
    pub fn_slp_acc: u8,
    pub fn_slp_dec: u8,
    pub ocd_th: u8,
    pub step_mode: u8,
    pub config: u16,
    pub gatecfg1: u16,
    pub gatecfg2: u8,
    pub approach_vel: u16,
    pub deadband: u16,
    pub backlash: u16,
    /// How long the PID keeps correcting after kickout, in 10 ms units.
    pub kickout_time: u8,
}

impl DriveParams {
    pub const SIZE: usize = 40;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut w = WOSlice::new(&mut buf);
        w.write_u32_le_at(0, self.acc);
        w.write_u32_le_at(4, self.dec);
        w.write_u32_le_at(8, self.max_speed);
        w.write_u16_le_at(12, self.min_speed);
        w.write_u16_le_at(14, self.fs_spd);
        w.write_u8_at(16, self.kval_hold);
        w.write_u8_at(17, self.kval_run);
        w.write_u8_at(18, self.kval_acc);
        w.write_u8_at(19, self.kval_dec);
        w.write_u16_le_at(20, self.int_speed);
        w.write_u8_at(22, self.stall_th);
        w.write_u8_at(23, self.st_slp);
        w.write_u8_at(24, self.fn_slp_acc);
        w.write_u8_at(25, self.fn_slp_dec);
        w.write_u8_at(26, self.ocd_th);
        w.write_u8_at(27, self.step_mode);
        w.write_u16_le_at(28, self.config);
        w.write_u16_le_at(30, self.gatecfg1);
        w.write_u8_at(32, self.gatecfg2);
        w.write_u16_le_at(33, self.approach_vel);
        w.write_u16_le_at(35, self.deadband);
        w.write_u16_le_at(37, self.backlash);
        w.write_u8_at(39, self.kickout_time);
        buf
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let r = ROSlice::new(bytes);
        Self {
            acc: r.read_u32_le_at(0),
            dec: r.read_u32_le_at(4),
            max_speed: r.read_u32_le_at(8),
            min_speed: r.read_u16_le_at(12),
            fs_spd: r.read_u16_le_at(14),
            kval_hold: r.read_u8_at(16),
            kval_run: r.read_u8_at(17),
            kval_acc: r.read_u8_at(18),
            kval_dec: r.read_u8_at(19),
            int_speed: r.read_u16_le_at(20),
            stall_th: r.read_u8_at(22),
            st_slp: r.read_u8_at(23),
            fn_slp_acc: r.read_u8_at(24),
            fn_slp_dec: r.read_u8_at(25),
            ocd_th: r.read_u8_at(26),
            step_mode: r.read_u8_at(27),
            config: r.read_u16_le_at(28),
            gatecfg1: r.read_u16_le_at(30),
            gatecfg2: r.read_u8_at(32),
            approach_vel: r.read_u16_le_at(33),
            deadband: r.read_u16_le_at(35),
            backlash: r.read_u16_le_at(37),
            kickout_time: r.read_u8_at(39),
        }
    }
}

/// Axis behavior flags.
///
/// bit 0 has encoder, bit 1 reverse encoder count, bit 2 has index,
/// bit 3 reverse stepper count, bit 4 PID for goto/jog, bit 5 PID kickout,
/// bit 6 rotational stage, bit 7 prefer soft stop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlagsSave {
    pub flags: u8,
}

impl FlagsSave {
    pub const SIZE: usize = 1;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        [self.flags]
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        Self { flags: bytes[0] }
    }
}

/// Limit switch configuration and travel bounds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LimitsSave {
    pub cw_hard_limit: u16,
    pub ccw_hard_limit: u16,
    pub cw_soft_limit: i32,
    pub ccw_soft_limit: i32,
    pub abs_hi_limit: i32,
    pub abs_low_limit: i32,
    pub limit_mode: u16,
}

impl LimitsSave {
    pub const SIZE: usize = 22;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut w = WOSlice::new(&mut buf);
        w.write_u16_le_at(0, self.cw_hard_limit);
        w.write_u16_le_at(2, self.ccw_hard_limit);
        w.write_i32_le_at(4, self.cw_soft_limit);
        w.write_i32_le_at(8, self.ccw_soft_limit);
        w.write_i32_le_at(12, self.abs_hi_limit);
        w.write_i32_le_at(16, self.abs_low_limit);
        w.write_u16_le_at(20, self.limit_mode);
        buf
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let r = ROSlice::new(bytes);
        Self {
            cw_hard_limit: r.read_u16_le_at(0),
            ccw_hard_limit: r.read_u16_le_at(2),
            cw_soft_limit: r.read_i32_le_at(4),
            ccw_soft_limit: r.read_i32_le_at(8),
            abs_hi_limit: r.read_i32_le_at(12),
            abs_low_limit: r.read_i32_le_at(16),
            limit_mode: r.read_u16_le_at(20),
        }
    }
}

/// Homing sequence parameters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HomeParams {
    pub home_mode: u8,
    pub home_dir: u8,
    pub limit_switch: u16,
    /// Percentage of max speed, 0 to 100.
    pub home_velocity: u32,
    /// Offset from the home switch, in encoder counts.
    pub offset_distance: i32,
}

impl HomeParams {
    pub const SIZE: usize = 12;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut w = WOSlice::new(&mut buf);
        w.write_u8_at(0, self.home_mode);
        w.write_u8_at(1, self.home_dir);
        w.write_u16_le_at(2, self.limit_switch);
        w.write_u32_le_at(4, self.home_velocity);
        w.write_i32_le_at(8, self.offset_distance);
        buf
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let r = ROSlice::new(bytes);
        Self {
            home_mode: r.read_u8_at(0),
            home_dir: r.read_u8_at(1),
            limit_switch: r.read_u16_le_at(2),
            home_velocity: r.read_u32_le_at(4),
            offset_distance: r.read_i32_le_at(8),
        }
    }
}

/// Jog command parameters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JogParams {
    pub jog_mode: i16,
    pub step_size: i32,
    pub min_vel: i32,
    pub acc: i32,
    pub max_vel: i32,
    pub stop_mode: i16,
}

impl JogParams {
    pub const SIZE: usize = 20;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut w = WOSlice::new(&mut buf);
        w.write_i16_le_at(0, self.jog_mode);
        w.write_i32_le_at(2, self.step_size);
        w.write_i32_le_at(6, self.min_vel);
        w.write_i32_le_at(10, self.acc);
        w.write_i32_le_at(14, self.max_vel);
        w.write_i16_le_at(18, self.stop_mode);
        buf
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let r = ROSlice::new(bytes);
        Self {
            jog_mode: r.read_i16_le_at(0),
            step_size: r.read_i32_le_at(2),
            min_vel: r.read_i32_le_at(6),
            acc: r.read_i32_le_at(10),
            max_vel: r.read_i32_le_at(14),
            stop_mode: r.read_i16_le_at(18),
        }
    }
}

/// Servo-loop tuning gains.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PidSave {
    pub kp: u32,
    pub ki: u32,
    pub kd: u32,
    pub imax: u32,
    pub filter_control: u16,
}

impl PidSave {
    pub const SIZE: usize = 18;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut w = WOSlice::new(&mut buf);
        w.write_u32_le_at(0, self.kp);
        w.write_u32_le_at(4, self.ki);
        w.write_u32_le_at(8, self.kd);
        w.write_u32_le_at(12, self.imax);
        w.write_u16_le_at(16, self.filter_control);
        buf
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let r = ROSlice::new(bytes);
        Self {
            kp: r.read_u32_le_at(0),
            ki: r.read_u32_le_at(4),
            kd: r.read_u32_le_at(8),
            imax: r.read_u32_le_at(12),
            filter_control: r.read_u16_le_at(16),
        }
    }
}

/// Encoder hardware description.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct EncoderSave {
    pub encoder_type: u8,
    pub index_delta_min: u16,
    pub index_delta_step: u16,
    /// nm per count on linear stages, milli-degrees per count on
    /// rotational stages.
    pub nm_per_count: f32,
}

impl EncoderSave {
    pub const SIZE: usize = 9;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut w = WOSlice::new(&mut buf);
        w.write_u8_at(0, self.encoder_type);
        w.write_u16_le_at(1, self.index_delta_min);
        w.write_u16_le_at(3, self.index_delta_step);
        w.write_f32_le_at(5, self.nm_per_count);
        buf
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let r = ROSlice::new(bytes);
        Self {
            encoder_type: r.read_u8_at(0),
            index_delta_min: r.read_u16_le_at(1),
            index_delta_step: r.read_u16_le_at(3),
            nm_per_count: r.read_f32_le_at(5),
        }
    }
}

/// High-frequency axis state, stored outside the parameter aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepperStore {
    pub enc_pos: i32,
    /// Electrical position of the motor (EL_POS register).
    pub el_pos: u16,
    pub enc_zero: i32,
    pub stored_pos: [i32; STORED_POSITION_COUNT],
    pub stored_pos_deadband: u16,
}

impl Default for StepperStore {
    fn default() -> Self {
        Self {
            enc_pos: 0,
            el_pos: 0,
            enc_zero: 0,
            stored_pos: [0; STORED_POSITION_COUNT],
            stored_pos_deadband: 0,
        }
    }
}

impl StepperStore {
    pub const SIZE: usize = 52;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut w = WOSlice::new(&mut buf);
        w.write_i32_le_at(0, self.enc_pos);
        w.write_u16_le_at(4, self.el_pos);
        w.write_i32_le_at(6, self.enc_zero);
        for (i, &pos) in self.stored_pos.iter().enumerate() {
            w.write_i32_le_at(10 + 4 * i, pos);
        }
        w.write_u16_le_at(50, self.stored_pos_deadband);
        buf
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let r = ROSlice::new(bytes);
        let mut stored_pos = [0i32; STORED_POSITION_COUNT];
        for (i, pos) in stored_pos.iter_mut().enumerate() {
            *pos = r.read_i32_le_at(10 + 4 * i);
        }
        Self {
            enc_pos: r.read_i32_le_at(0),
            el_pos: r.read_u16_le_at(4),
            enc_zero: r.read_i32_le_at(6),
            stored_pos,
            stored_pos_deadband: r.read_u16_le_at(50),
        }
    }
}

/// The full in-memory parameter set for one axis.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct StepperParams {
    pub config: StepperConfig,
    pub drive: DriveParams,
    pub flags: FlagsSave,
    pub limits: LimitsSave,
    pub home: HomeParams,
    pub jog: JogParams,
    pub encoder: EncoderSave,
    pub pid: PidSave,
}

// Image layout: identity header, then the structures back to back.
const HEADER_SIZE: usize = 8 + 1; // target serial + combined CRC
const CONFIG_OFFSET: u32 = HEADER_SIZE as u32;
const DRIVE_OFFSET: u32 = CONFIG_OFFSET + StepperConfig::SIZE as u32;
const FLAGS_OFFSET: u32 = DRIVE_OFFSET + DriveParams::SIZE as u32;
const LIMITS_OFFSET: u32 = FLAGS_OFFSET + FlagsSave::SIZE as u32;
const HOME_OFFSET: u32 = LIMITS_OFFSET + LimitsSave::SIZE as u32;
const JOG_OFFSET: u32 = HOME_OFFSET + HomeParams::SIZE as u32;
const ENCODER_OFFSET: u32 = JOG_OFFSET + JogParams::SIZE as u32;
const PID_OFFSET: u32 = ENCODER_OFFSET + EncoderSave::SIZE as u32;

/// Total bytes of a stepper save image.
pub const SAVE_IMAGE_SIZE: usize = PID_OFFSET as usize + PidSave::SIZE;

/// XOR-combined validity hash over the per-structure EEPROM CRCs.
///
/// XOR lets a sub-field save replace one structure's contribution without
/// touching the others: take the old CRC out, fold the new one in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CombinedCrc(u8);

impl CombinedCrc {
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Folds a structure CRC into the hash.
    pub fn combine_in(&mut self, crc: u8) {
        self.0 ^= crc;
    }

    /// Removes a previously folded structure CRC.
    pub fn combine_out(&mut self, crc: u8) {
        self.0 ^= crc;
    }
}

/// Saved-configuration aggregate for one stepper axis.
///
/// Holds the working parameter set (`params`), the per-structure mappers
/// and the identity header state. Sub-field saves implement the
/// MGMSG_MOT_SET_EEPROMPARAMS command family: when the image is mapped they
/// rewrite one structure and patch the combined CRC; otherwise they fall
/// back to a full save.
pub struct StepperSavedConfigs {
    base_address: u32,

    config_mapper: SlimMapper,
    drive_mapper: SlimMapper,
    flags_mapper: SlimMapper,
    limits_mapper: SlimMapper,
    home_mapper: SlimMapper,
    jog_mapper: SlimMapper,
    encoder_mapper: SlimMapper,
    pid_mapper: SlimMapper,

    target_device: u64,
    combined_crc: CombinedCrc,
    mapped: bool,

    configured: bool,
    configured_device: u64,

    pub params: StepperParams,
}

impl StepperSavedConfigs {
    pub fn new(base_address: u32) -> Self {
        Self {
            base_address,
            config_mapper: SlimMapper::new(),
            drive_mapper: SlimMapper::new(),
            flags_mapper: SlimMapper::new(),
            limits_mapper: SlimMapper::new(),
            home_mapper: SlimMapper::new(),
            jog_mapper: SlimMapper::new(),
            encoder_mapper: SlimMapper::new(),
            pid_mapper: SlimMapper::new(),
            target_device: SERIAL_NUMBER_WILDCARD,
            combined_crc: CombinedCrc::new(0),
            mapped: false,
            configured: false,
            configured_device: 0,
            params: StepperParams::default(),
        }
    }

    /// Reads the whole image into memory. The data may belong to another
    /// device, so the params are marked unconfigured until
    /// [`mark_configured`](Self::mark_configured).
    pub fn load<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
    ) -> Result<(), StoreError> {
        let mut header = [0u8; HEADER_SIZE];
        factory.device().read(self.base_address, &mut header)?;
        self.target_device = u64::from_le_bytes(header[..8].try_into().unwrap_or([0; 8]));
        self.combined_crc = CombinedCrc::new(header[8]);

        let base = self.base_address;
        let mut buf = [0u8; StepperConfig::SIZE];
        self.config_mapper
            .load(factory, base + CONFIG_OFFSET, &mut buf)?;
        self.params.config = StepperConfig::from_bytes(&buf);

        let mut buf = [0u8; DriveParams::SIZE];
        self.drive_mapper
            .load(factory, base + DRIVE_OFFSET, &mut buf)?;
        self.params.drive = DriveParams::from_bytes(&buf);

        let mut buf = [0u8; FlagsSave::SIZE];
        self.flags_mapper
            .load(factory, base + FLAGS_OFFSET, &mut buf)?;
        self.params.flags = FlagsSave::from_bytes(&buf);

        let mut buf = [0u8; LimitsSave::SIZE];
        self.limits_mapper
            .load(factory, base + LIMITS_OFFSET, &mut buf)?;
        self.params.limits = LimitsSave::from_bytes(&buf);

        let mut buf = [0u8; HomeParams::SIZE];
        self.home_mapper
            .load(factory, base + HOME_OFFSET, &mut buf)?;
        self.params.home = HomeParams::from_bytes(&buf);

        let mut buf = [0u8; JogParams::SIZE];
        self.jog_mapper.load(factory, base + JOG_OFFSET, &mut buf)?;
        self.params.jog = JogParams::from_bytes(&buf);

        let mut buf = [0u8; EncoderSave::SIZE];
        self.encoder_mapper
            .load(factory, base + ENCODER_OFFSET, &mut buf)?;
        self.params.encoder = EncoderSave::from_bytes(&buf);

        let mut buf = [0u8; PidSave::SIZE];
        self.pid_mapper.load(factory, base + PID_OFFSET, &mut buf)?;
        self.params.pid = PidSave::from_bytes(&buf);

        self.configured = false;
        Ok(())
    }

    /// Whether the EEPROM image is currently linked to the params.
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Checks the image against a device: the stored target serial must
    /// match and the combined CRC must agree with the per-structure CRCs.
    /// The mapped state follows the result.
    pub fn is_save_valid(&mut self, serial_number: u64) -> bool {
        let valid =
            serial_number == self.target_device && self.hash_crcs() == self.combined_crc.value();
        self.mapped = valid;
        valid
    }

    /// Whether the in-memory params were configured for this device.
    pub fn is_params_configured(&self, serial_number: u64) -> bool {
        self.configured && serial_number == self.configured_device
    }

    /// Records that the params now describe the given device. The device
    /// configured in memory and the one targeted on EEPROM may differ; the
    /// mapping drops when they do.
    pub fn mark_configured(&mut self, serial_number: u64) {
        self.configured_device = serial_number;
        self.configured = true;
        self.mapped = self.mapped && self.configured_device == self.target_device;
    }

    /// Serial the EEPROM image targets.
    pub fn target_device(&self) -> u64 {
        self.target_device
    }

    /// Serial the in-memory params were configured for.
    pub fn configured_device(&self) -> u64 {
        self.configured_device
    }

    /// Invalidates the stored image by retargeting it to a serial no
    /// device can have.
    pub fn invalidate<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
    ) -> Result<(), StoreError> {
        self.target_device = INVALIDATED_TARGET;
        self.configured = false;
        self.save_header(factory)
    }

    /// Saves the hard limits and limit mode. The soft limits stay as
    /// stored: the structure is re-read and only those fields merged.
    pub fn save_limit_params<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
    ) -> Result<(), StoreError> {
        if !self.mapped {
            return self.full_save(factory);
        }

        let address = self.base_address + LIMITS_OFFSET;
        let mut buf = [0u8; LimitsSave::SIZE];
        self.limits_mapper.load(factory, address, &mut buf)?;
        let old = self.limits_mapper.eeprom_crc();

        let mut tmp = LimitsSave::from_bytes(&buf);
        tmp.cw_hard_limit = self.params.limits.cw_hard_limit;
        tmp.ccw_hard_limit = self.params.limits.ccw_hard_limit;
        tmp.limit_mode = self.params.limits.limit_mode;

        self.limits_mapper.save(factory, address, &tmp.to_bytes())?;
        self.combined_crc.combine_out(old);
        self.combined_crc.combine_in(self.limits_mapper.eeprom_crc());
        self.save_header(factory)
    }

    /// Saves the soft limits, merging into the stored structure.
    pub fn save_soft_limits<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
    ) -> Result<(), StoreError> {
        if !self.mapped {
            return self.full_save(factory);
        }

        let address = self.base_address + LIMITS_OFFSET;
        let mut buf = [0u8; LimitsSave::SIZE];
        self.limits_mapper.load(factory, address, &mut buf)?;
        let old = self.limits_mapper.eeprom_crc();

        let mut tmp = LimitsSave::from_bytes(&buf);
        tmp.cw_soft_limit = self.params.limits.cw_soft_limit;
        tmp.ccw_soft_limit = self.params.limits.ccw_soft_limit;

        self.limits_mapper.save(factory, address, &tmp.to_bytes())?;
        self.combined_crc.combine_out(old);
        self.combined_crc.combine_in(self.limits_mapper.eeprom_crc());
        self.save_header(factory)
    }

    pub fn save_home_params<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
    ) -> Result<(), StoreError> {
        if !self.mapped {
            return self.full_save(factory);
        }

        let old = self.home_mapper.eeprom_crc();
        self.home_mapper.save(
            factory,
            self.base_address + HOME_OFFSET,
            &self.params.home.to_bytes(),
        )?;
        self.combined_crc.combine_out(old);
        self.combined_crc.combine_in(self.home_mapper.eeprom_crc());
        self.save_header(factory)
    }

    /// Saves the stage description: config, drive, flags and encoder.
    pub fn save_stage_params<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
    ) -> Result<(), StoreError> {
        if !self.mapped {
            return self.full_save(factory);
        }

        let old = self.config_mapper.eeprom_crc()
            ^ self.drive_mapper.eeprom_crc()
            ^ self.flags_mapper.eeprom_crc()
            ^ self.encoder_mapper.eeprom_crc();

        let base = self.base_address;
        self.config_mapper.save(
            factory,
            base + CONFIG_OFFSET,
            &self.params.config.to_bytes(),
        )?;
        self.drive_mapper
            .save(factory, base + DRIVE_OFFSET, &self.params.drive.to_bytes())?;
        self.flags_mapper
            .save(factory, base + FLAGS_OFFSET, &self.params.flags.to_bytes())?;
        self.encoder_mapper.save(
            factory,
            base + ENCODER_OFFSET,
            &self.params.encoder.to_bytes(),
        )?;

        let new = self.config_mapper.eeprom_crc()
            ^ self.drive_mapper.eeprom_crc()
            ^ self.flags_mapper.eeprom_crc()
            ^ self.encoder_mapper.eeprom_crc();

        self.combined_crc.combine_out(old);
        self.combined_crc.combine_in(new);
        self.save_header(factory)
    }

    pub fn save_jog_params<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
    ) -> Result<(), StoreError> {
        if !self.mapped {
            return self.full_save(factory);
        }

        let old = self.jog_mapper.eeprom_crc();
        self.jog_mapper.save(
            factory,
            self.base_address + JOG_OFFSET,
            &self.params.jog.to_bytes(),
        )?;
        self.combined_crc.combine_out(old);
        self.combined_crc.combine_in(self.jog_mapper.eeprom_crc());
        self.save_header(factory)
    }

    pub fn save_pid_params<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
    ) -> Result<(), StoreError> {
        if !self.mapped {
            return self.full_save(factory);
        }

        let old = self.pid_mapper.eeprom_crc();
        self.pid_mapper.save(
            factory,
            self.base_address + PID_OFFSET,
            &self.params.pid.to_bytes(),
        )?;
        self.combined_crc.combine_out(old);
        self.combined_crc.combine_in(self.pid_mapper.eeprom_crc());
        self.save_header(factory)
    }

    /// Writes every structure and retargets the image to the configured
    /// device. Callers ensure the params were configured first.
    pub fn full_save<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
    ) -> Result<(), StoreError> {
        let base = self.base_address;
        self.config_mapper.save(
            factory,
            base + CONFIG_OFFSET,
            &self.params.config.to_bytes(),
        )?;
        self.drive_mapper
            .save(factory, base + DRIVE_OFFSET, &self.params.drive.to_bytes())?;
        self.flags_mapper
            .save(factory, base + FLAGS_OFFSET, &self.params.flags.to_bytes())?;
        self.limits_mapper.save(
            factory,
            base + LIMITS_OFFSET,
            &self.params.limits.to_bytes(),
        )?;
        self.home_mapper
            .save(factory, base + HOME_OFFSET, &self.params.home.to_bytes())?;
        self.jog_mapper
            .save(factory, base + JOG_OFFSET, &self.params.jog.to_bytes())?;
        self.encoder_mapper.save(
            factory,
            base + ENCODER_OFFSET,
            &self.params.encoder.to_bytes(),
        )?;
        self.pid_mapper
            .save(factory, base + PID_OFFSET, &self.params.pid.to_bytes())?;

        self.target_device = self.configured_device;
        self.combined_crc = CombinedCrc::new(self.hash_crcs());
        self.save_header(factory)?;
        self.mapped = true;
        Ok(())
    }

    fn hash_crcs(&self) -> u8 {
        self.config_mapper.eeprom_crc()
            ^ self.drive_mapper.eeprom_crc()
            ^ self.flags_mapper.eeprom_crc()
            ^ self.limits_mapper.eeprom_crc()
            ^ self.home_mapper.eeprom_crc()
            ^ self.jog_mapper.eeprom_crc()
            ^ self.pid_mapper.eeprom_crc()
            ^ self.encoder_mapper.eeprom_crc()
    }

    fn save_header<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
    ) -> Result<(), StoreError> {
        let mut header = [0u8; HEADER_SIZE];
        header[..8].copy_from_slice(&self.target_device.to_le_bytes());
        header[8] = self.combined_crc.value();
        factory.device().write(self.base_address, &header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::bus::CsBusMutex;
    use crate::persist::driver::MemEeprom;

    const SERIAL: u64 = 0x0011_2233_4455_6677;

    fn sample_params() -> StepperParams {
        StepperParams {
            config: StepperConfig {
                axis_serial_no: 42,
                counts_per_unit: 2048.0,
                min_pos: 0,
                max_pos: 200_000,
                collision_threshold: 90,
            },
            drive: DriveParams {
                acc: 1000,
                dec: 1200,
                max_speed: 15_000,
                min_speed: 20,
                kval_run: 0x50,
                step_mode: 7,
                backlash: 12,
                ..DriveParams::default()
            },
            flags: FlagsSave { flags: 0b0101_0001 },
            limits: LimitsSave {
                cw_hard_limit: 1,
                ccw_hard_limit: 2,
                cw_soft_limit: 190_000,
                ccw_soft_limit: -100,
                abs_hi_limit: 200_000,
                abs_low_limit: -200,
                limit_mode: 3,
            },
            home: HomeParams {
                home_mode: 1,
                home_dir: 0,
                limit_switch: 4,
                home_velocity: 50,
                offset_distance: -128,
            },
            jog: JogParams {
                jog_mode: 2,
                step_size: 100,
                min_vel: 10,
                acc: 500,
                max_vel: 4000,
                stop_mode: 1,
            },
            encoder: EncoderSave {
                encoder_type: 1,
                index_delta_min: 5,
                index_delta_step: 10,
                nm_per_count: 157.5,
            },
            pid: PidSave {
                kp: 80,
                ki: 4,
                kd: 200,
                imax: 10_000,
                filter_control: 0,
            },
        }
    }

    #[test]
    fn image_layout_is_stable() {
        assert_eq!(CONFIG_OFFSET, 9);
        assert_eq!(DRIVE_OFFSET, 27);
        assert_eq!(FLAGS_OFFSET, 67);
        assert_eq!(LIMITS_OFFSET, 68);
        assert_eq!(HOME_OFFSET, 90);
        assert_eq!(JOG_OFFSET, 102);
        assert_eq!(ENCODER_OFFSET, 122);
        assert_eq!(PID_OFFSET, 131);
        assert_eq!(SAVE_IMAGE_SIZE, 149);
    }

    #[test]
    fn codecs_round_trip() {
        let params = sample_params();
        assert_eq!(
            StepperConfig::from_bytes(&params.config.to_bytes()),
            params.config
        );
        assert_eq!(
            DriveParams::from_bytes(&params.drive.to_bytes()),
            params.drive
        );
        assert_eq!(
            LimitsSave::from_bytes(&params.limits.to_bytes()),
            params.limits
        );
        assert_eq!(
            HomeParams::from_bytes(&params.home.to_bytes()),
            params.home
        );
        assert_eq!(JogParams::from_bytes(&params.jog.to_bytes()), params.jog);
        assert_eq!(
            EncoderSave::from_bytes(&params.encoder.to_bytes()),
            params.encoder
        );
        assert_eq!(PidSave::from_bytes(&params.pid.to_bytes()), params.pid);

        let store = StepperStore {
            enc_pos: -5,
            el_pos: 128,
            enc_zero: 7,
            stored_pos: [3; STORED_POSITION_COUNT],
            stored_pos_deadband: 2,
        };
        assert_eq!(StepperStore::from_bytes(&store.to_bytes()), store);
    }

    #[test]
    fn fresh_eeprom_is_not_a_valid_save() {
        let mutex = CsBusMutex::new();
        let mut eeprom = MemEeprom::<256>::new();
        let mut factory = HandleFactory::new(&mutex, &mut eeprom);

        let mut saved = StepperSavedConfigs::new(0);
        saved.load(&mut factory).unwrap();
        assert!(!saved.is_save_valid(SERIAL));
        assert!(!saved.is_mapped());
    }

    #[test]
    fn full_save_then_reload_validates() {
        let mutex = CsBusMutex::new();
        let mut eeprom = MemEeprom::<256>::new();
        {
            let mut factory = HandleFactory::new(&mutex, &mut eeprom);
            let mut saved = StepperSavedConfigs::new(0);
            saved.load(&mut factory).unwrap();
            saved.params = sample_params();
            saved.mark_configured(SERIAL);
            // Not mapped yet, so any sub-field save becomes a full save.
            saved.save_pid_params(&mut factory).unwrap();
            assert!(saved.is_mapped());
            assert_eq!(saved.target_device(), SERIAL);
        }

        let mut factory = HandleFactory::new(&mutex, &mut eeprom);
        let mut reloaded = StepperSavedConfigs::new(0);
        reloaded.load(&mut factory).unwrap();
        assert!(reloaded.is_save_valid(SERIAL));
        assert!(!reloaded.is_save_valid(SERIAL + 1));
        assert!(reloaded.is_save_valid(SERIAL));
        assert_eq!(reloaded.params, sample_params());
    }

    #[test]
    fn partial_save_patches_the_combined_crc() {
        let mutex = CsBusMutex::new();
        let mut eeprom = MemEeprom::<256>::new();
        {
            let mut factory = HandleFactory::new(&mutex, &mut eeprom);
            let mut saved = StepperSavedConfigs::new(0);
            saved.load(&mut factory).unwrap();
            saved.params = sample_params();
            saved.mark_configured(SERIAL);
            saved.full_save(&mut factory).unwrap();

            saved.params.jog.max_vel = 9999;
            saved.save_jog_params(&mut factory).unwrap();
            assert!(saved.is_mapped());
        }

        let mut factory = HandleFactory::new(&mutex, &mut eeprom);
        let mut reloaded = StepperSavedConfigs::new(0);
        reloaded.load(&mut factory).unwrap();
        assert!(reloaded.is_save_valid(SERIAL));
        assert_eq!(reloaded.params.jog.max_vel, 9999);
    }

    #[test]
    fn limit_saves_merge_into_stored_structure() {
        let mutex = CsBusMutex::new();
        let mut eeprom = MemEeprom::<256>::new();
        {
            let mut factory = HandleFactory::new(&mutex, &mut eeprom);
            let mut saved = StepperSavedConfigs::new(0);
            saved.load(&mut factory).unwrap();
            saved.params = sample_params();
            saved.mark_configured(SERIAL);
            saved.full_save(&mut factory).unwrap();

            // Change every limit field in memory, but only push the hard
            // limits. The stored soft limits must survive.
            saved.params.limits.cw_hard_limit = 11;
            saved.params.limits.limit_mode = 7;
            saved.params.limits.cw_soft_limit = -777;
            saved.save_limit_params(&mut factory).unwrap();
        }

        let mut factory = HandleFactory::new(&mutex, &mut eeprom);
        let mut reloaded = StepperSavedConfigs::new(0);
        reloaded.load(&mut factory).unwrap();
        assert!(reloaded.is_save_valid(SERIAL));
        assert_eq!(reloaded.params.limits.cw_hard_limit, 11);
        assert_eq!(reloaded.params.limits.limit_mode, 7);
        assert_eq!(
            reloaded.params.limits.cw_soft_limit,
            sample_params().limits.cw_soft_limit
        );
    }

    #[test]
    fn soft_limit_saves_leave_hard_limits_alone() {
        let mutex = CsBusMutex::new();
        let mut eeprom = MemEeprom::<256>::new();
        {
            let mut factory = HandleFactory::new(&mutex, &mut eeprom);
            let mut saved = StepperSavedConfigs::new(0);
            saved.load(&mut factory).unwrap();
            saved.params = sample_params();
            saved.mark_configured(SERIAL);
            saved.full_save(&mut factory).unwrap();

            saved.params.limits.cw_soft_limit = 123_456;
            saved.params.limits.cw_hard_limit = 0xDEAD;
            saved.save_soft_limits(&mut factory).unwrap();
        }

        let mut factory = HandleFactory::new(&mutex, &mut eeprom);
        let mut reloaded = StepperSavedConfigs::new(0);
        reloaded.load(&mut factory).unwrap();
        assert!(reloaded.is_save_valid(SERIAL));
        assert_eq!(reloaded.params.limits.cw_soft_limit, 123_456);
        assert_eq!(
            reloaded.params.limits.cw_hard_limit,
            sample_params().limits.cw_hard_limit
        );
    }

    #[test]
    fn invalidate_retargets_the_image() {
        let mutex = CsBusMutex::new();
        let mut eeprom = MemEeprom::<256>::new();
        let mut factory = HandleFactory::new(&mutex, &mut eeprom);

        let mut saved = StepperSavedConfigs::new(0);
        saved.load(&mut factory).unwrap();
        saved.params = sample_params();
        saved.mark_configured(SERIAL);
        saved.full_save(&mut factory).unwrap();
        assert!(saved.is_save_valid(SERIAL));

        saved.invalidate(&mut factory).unwrap();
        assert_eq!(saved.target_device(), INVALIDATED_TARGET);
        assert!(!saved.is_save_valid(SERIAL));
        assert!(!saved.is_params_configured(SERIAL));
    }

    #[test]
    fn configuring_a_different_device_drops_the_mapping() {
        let mutex = CsBusMutex::new();
        let mut eeprom = MemEeprom::<256>::new();
        let mut factory = HandleFactory::new(&mutex, &mut eeprom);

        let mut saved = StepperSavedConfigs::new(0);
        saved.load(&mut factory).unwrap();
        saved.params = sample_params();
        saved.mark_configured(SERIAL);
        saved.full_save(&mut factory).unwrap();
        assert!(saved.is_mapped());
        assert!(saved.is_params_configured(SERIAL));

        saved.mark_configured(SERIAL + 1);
        assert!(!saved.is_mapped());
        assert!(saved.is_params_configured(SERIAL + 1));
        assert!(!saved.is_params_configured(SERIAL));
    }
}
