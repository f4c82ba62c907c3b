//! CRC8 used for every persisted structure and LUT record.
//!
//! Polynomial `0x31`, MSB-first, zero init, table-driven. The checksum is
//! seedable so independent sub-structures can be chained into one value; the
//! offline LUT compiler produces bit-identical results.

/// One step per input byte: `crc = TABLE[crc ^ byte]`.
const CRC_TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC8 of `data` continuing from a previous partial checksum.
///
/// Chainable: `crc8_with_seed(b, crc8_with_seed(a, s))` equals the CRC of
/// `a` followed by `b` with seed `s`.
#[inline]
pub fn crc8_with_seed(data: &[u8], seed: u8) -> u8 {
    let mut crc = seed;
    for byte in data {
        crc = CRC_TABLE[(crc ^ byte) as usize];
    }
    crc
}

/// CRC8 of `data` with a zero seed.
///
/// # Example
/// ```
/// use embedded_persist::persist::crc::{crc8, crc8_with_seed};
///
/// let whole = crc8(b"stepper");
/// let chained = crc8_with_seed(b"pper", crc8(b"ste"));
/// assert_eq!(whole, chained);
/// ```
#[inline]
pub fn crc8(data: &[u8]) -> u8 {
    crc8_with_seed(data, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bit-by-bit reference implementation, no table.
    fn reference(data: &[u8], seed: u8) -> u8 {
        let mut crc = seed;
        for byte in data {
            crc ^= byte;
            for _ in 0..8 {
                crc = if crc & 0x80 != 0 {
                    (crc << 1) ^ 0x31
                } else {
                    crc << 1
                };
            }
        }
        crc
    }

    #[test]
    fn matches_reference() {
        let mut buf = [0u8; 64];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(37).wrapping_add(11);
        }
        for len in 0..buf.len() {
            assert_eq!(crc8(&buf[..len]), reference(&buf[..len], 0), "len {len}");
        }
    }

    #[test]
    fn empty_is_seed() {
        assert_eq!(crc8(&[]), 0);
        assert_eq!(crc8_with_seed(&[], 0xA5), 0xA5);
    }

    #[test]
    fn seed_chains_across_splits() {
        let data = [0xDEu8, 0xAD, 0xBE, 0xEF, 0x01, 0x02, 0x03];
        let whole = crc8(&data);
        for split in 0..=data.len() {
            let (a, b) = data.split_at(split);
            assert_eq!(crc8_with_seed(b, crc8(a)), whole, "split {split}");
        }
    }

    #[test]
    fn detects_single_bit_flips() {
        let data = [0x55u8, 0xAA, 0x0F, 0xF0];
        let good = crc8(&data);
        for byte in 0..data.len() {
            for bit in 0..8 {
                let mut bad = data;
                bad[byte] ^= 1 << bit;
                assert_ne!(crc8(&bad), good);
            }
        }
    }
}
