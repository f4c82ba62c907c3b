use super::macros::{
    impl_slice_common, impl_slice_wo, impl_write_primitive, impl_write_primitives,
};

/// Write-only slice wrapper.
///
/// Used by record serializers filling a frame from typed settings; the
/// underlying data cannot be read back through the wrapper.
#[derive(Debug)]
pub struct WOSlice<'a>(&'a mut [u8]);

impl<'a> WOSlice<'a> {
    /// Creates a new write-only slice wrapper.
    #[inline]
    pub fn new(slice: &'a mut [u8]) -> Self {
        Self(slice)
    }

    impl_slice_common!();
    impl_slice_wo!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wo_slice_operations() {
        let mut data = [0u8; 8];

        WOSlice::new(&mut data[..4]).copy_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(&data[..4], &[0xAA, 0xBB, 0xCC, 0xDD]);

        data = [0u8; 8];
        WOSlice::new(&mut data).copy_from_slice_at(1, &[0x11, 0x22]);
        assert_eq!(&data[..4], &[0x00, 0x11, 0x22, 0x00]);

        WOSlice::new(&mut data).fill(0xFF);
        assert_eq!(data, [0xFF; 8]);

        data = [0u8; 8];
        WOSlice::new(&mut data).fill_at(1, 2, 0xAA);
        assert_eq!(&data[..4], &[0x00, 0xAA, 0xAA, 0x00]);

        WOSlice::new(&mut data).write_u64_le_at(0, 0x0807_0605_0403_0201);
        assert_eq!(data, [1, 2, 3, 4, 5, 6, 7, 8]);

        WOSlice::new(&mut data).write_f32_le_at(0, 2.5);
        assert_eq!(&data[..4], &2.5f32.to_le_bytes());
    }
}
