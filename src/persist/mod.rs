pub mod bus;
pub mod cache;
pub mod crc;
pub mod driver;
pub mod error;
pub mod lut;
pub mod mapper;
pub mod pnp;
pub mod records;
pub mod regions;
pub mod save;
pub mod slice;
pub mod span;
pub mod stepper;
pub mod stream;
pub mod types;

#[cfg(test)]
mod test_support;

pub use bus::{BusMutex, CsBusMutex, HandleFactory};
pub use cache::{FlushGuard, PageCache};
pub use crc::{crc8, crc8_with_seed};
pub use driver::{EepromDriver, MemEeprom};
pub use error::{RecordError, StoreError};
pub use lut::{LutError, LutId, LutManager};
pub use mapper::SlimMapper;
pub use pnp::{PnpFlag, PnpStatus};
pub use records::{
    CardSettings, EepromLayout, Layout25lc1024, PageFrame, PersistenceController, SioSettings,
    ShutterSettings, Waveform,
};
pub use save::SaveConstructor;
pub use slice::{ROSlice, WOSlice};
pub use span::AddressSpan;
pub use stepper::{
    CombinedCrc, DriveParams, EncoderSave, FlagsSave, HomeParams, JogParams, LimitsSave, PidSave,
    StepperConfig, StepperParams, StepperSavedConfigs, StepperStore,
};
pub use stream::{CachedStream, DirectStream, Seek, StreamDescriptor};
pub use types::{
    ConfigSignature, CustomEntries, DeviceLutKey, DeviceSignature, OneWireConfigHeader, SlotType,
    StructId,
};

pub mod prelude {
    pub use super::{
        AddressSpan, BusMutex, CachedStream, CardSettings, CombinedCrc, ConfigSignature,
        CsBusMutex, CustomEntries, DeviceLutKey, DeviceSignature, DirectStream, EepromDriver,
        EepromLayout, FlushGuard, HandleFactory, Layout25lc1024, LutError, LutId, LutManager,
        MemEeprom, PageCache, PersistenceController, PnpFlag, PnpStatus, ROSlice, RecordError,
        SaveConstructor, Seek, ShutterSettings, SioSettings, SlimMapper, SlotType, StoreError,
        StreamDescriptor, StructId, WOSlice, Waveform, crc8, crc8_with_seed,
    };
}
