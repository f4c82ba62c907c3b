use super::macros::{impl_read_primitive, impl_read_primitives, impl_slice_common, impl_slice_ro};

/// Read-only slice wrapper.
///
/// Used by record deserializers over raw EEPROM bytes: bounds-checked
/// primitive reads plus bulk copy-out.
pub struct ROSlice<'a>(&'a [u8]);

impl<'a> ROSlice<'a> {
    /// Creates a new read-only slice wrapper.
    #[inline]
    pub fn new(slice: &'a [u8]) -> Self {
        Self(slice)
    }

    impl_slice_common!();
    impl_slice_ro!();
}
