//! Shared fixtures for the persistence tests.

use crate::persist::crc::{crc8, crc8_with_seed};

/// Builds a LUT file image in memory: header, then groups in the order
/// added. Entry CRCs are computed the way the loader verifies them, chained
/// from the group key. Deliberately does not enforce group ordering so the
/// ordering check itself can be tested.
pub struct LutFileBuilder {
    bytes: heapless::Vec<u8, 1024>,
    group_key: heapless::Vec<u8, 8>,
    count_offset: usize,
}

impl LutFileBuilder {
    pub fn new(indirection: u8, group_key_size: u8, disc_key_size: u8) -> Self {
        let mut bytes = heapless::Vec::new();
        bytes
            .extend_from_slice(&[1, indirection, group_key_size, disc_key_size])
            .unwrap();
        Self {
            bytes,
            group_key: heapless::Vec::new(),
            count_offset: 0,
        }
    }

    /// Starts a new group with the given key.
    pub fn group(&mut self, key: &[u8]) {
        self.group_key.clear();
        self.group_key.extend_from_slice(key).unwrap();
        self.bytes.extend_from_slice(key).unwrap();
        self.count_offset = self.bytes.len();
        self.bytes.extend_from_slice(&0u32.to_le_bytes()).unwrap();
    }

    /// Appends an entry to the current group and bumps its count.
    pub fn entry(&mut self, disc_key: &[u8], payload: &[u8]) {
        let mut crc = crc8_with_seed(disc_key, crc8(&self.group_key));
        crc = crc8_with_seed(payload, crc);

        self.bytes.extend_from_slice(disc_key).unwrap();
        self.bytes.extend_from_slice(payload).unwrap();
        self.bytes.push(crc).unwrap();

        let mut count = [0u8; 4];
        count.copy_from_slice(&self.bytes[self.count_offset..self.count_offset + 4]);
        let count = u32::from_le_bytes(count) + 1;
        self.bytes[self.count_offset..self.count_offset + 4]
            .copy_from_slice(&count.to_le_bytes());
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}
