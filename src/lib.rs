//! A `no_std`, no-alloc EEPROM persistence and LUT resolution engine for
//! slot-card motion controllers.
//!
//! Every card in the chassis persists its calibration/configuration data in a
//! small serial EEPROM and, when no valid local save exists, resolves factory
//! defaults from a compiled, flash-resident lookup table (LUT) keyed by device
//! type. This crate is that engine: page-cached EEPROM access, CRC-protected
//! versioned records, LUT key resolution, and the save constructor that
//! assembles a device's full configuration.
//!
//! # Features
//!
//! - **Zero heap allocation** - Bounded buffers, compile-time region math
//! - **Integrity checking** - Chainable CRC8 over every persisted structure
//! - **Schema versioning** - Backward-compatible reads, forward-only writes
//! - **Write-amplification control** - CRC-tracked mappers skip unchanged writes
//! - **Fallback semantics** - Custom device entries, then LUT, then compiled defaults
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────┐   ┌──────────────────────────┐
//! │  Card task            │   │  Persistence engine      │
//! │                       │   │                          │
//! │  get_*_settings()     │──▶│  records ─▶ stream ─┐    │
//! │  save_<field>()       │──▶│  stepper ─▶ mapper ─┤    │
//! │  construct(...)       │──▶│  save ──▶ lut       │    │
//! │                       │   │                     ▼    │
//! │                       │   │  cache ──▶ bus ─▶ EEPROM │
//! └───────────────────────┘   └──────────────────────────┘
//! ```
//!
//! - **Records/aggregates** frame typed structures with CRC + version headers
//! - **LUT + save constructor** resolve factory defaults for connected devices
//! - **Page cache + streams** batch bus traffic one physical page at a time
//! - **Bus arbiter** serializes every EEPROM transaction behind a scoped lock
//!
//! # Example
//!
//! ```rust
//! use embedded_persist::prelude::*;
//!
//! let mutex = CsBusMutex::new();
//! let mut eeprom = MemEeprom::<4096>::new();
//!
//! // Acquire the bus for the whole sequence (released on drop).
//! let mut bus = HandleFactory::new(&mutex, &mut eeprom);
//!
//! // Bind a struct window to EEPROM and skip the write when nothing changed.
//! let mut mapper = SlimMapper::new();
//! let data = [0x11u8, 0x22, 0x33, 0x44];
//! mapper.save(&mut bus, 0x100, &data).unwrap();
//! assert!(!mapper.save_if_dirty(&mut bus, 0x100, &data).unwrap());
//! ```

#![deny(unsafe_code)]
#![no_std]

pub mod persist;

pub mod prelude {
    pub use crate::persist::prelude::*;
}
