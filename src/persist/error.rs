/// Errors from the raw EEPROM transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Address or length exceeds the device bounds.
    OutOfBounds,
    /// The bus transaction failed.
    Bus,
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreError::OutOfBounds => write!(f, "address or length exceeds device bounds"),
            StoreError::Bus => write!(f, "bus transaction failed"),
        }
    }
}

/// Errors from the versioned record serializers.
///
/// Any of these means the record cannot be trusted; the caller substitutes
/// the type's compiled defaults and continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    /// The layout handed the serializer too few bytes.
    TooSmall,
    /// The layout does not support the given channel.
    InvalidChannel,
    /// The stored length does not match the version's schema size.
    SizeInvalid,
    /// The stored version byte is not supported by any serializer.
    UnsupportedVersion,
    /// The recomputed CRC does not match the stored one.
    CrcInvalid,
    /// The framing checks passed but a field value is inconsistent.
    InvalidValue,
    /// The underlying bus transaction failed.
    Store(StoreError),
}

impl From<StoreError> for RecordError {
    fn from(err: StoreError) -> Self {
        RecordError::Store(err)
    }
}

impl core::fmt::Display for RecordError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RecordError::TooSmall => write!(f, "layout provides too few bytes"),
            RecordError::InvalidChannel => write!(f, "channel not supported by layout"),
            RecordError::SizeInvalid => write!(f, "stored length does not match schema size"),
            RecordError::UnsupportedVersion => write!(f, "stored version is not supported"),
            RecordError::CrcInvalid => write!(f, "stored CRC does not match recomputed CRC"),
            RecordError::InvalidValue => write!(f, "record field value is inconsistent"),
            RecordError::Store(err) => write!(f, "store error: {err}"),
        }
    }
}
