//! Named regions of the 25LC1024 EEPROM.
//!
//! The layout is fixed at compile time: page 0 for the board type, ten pages
//! per slot, one page per HID port bank, single pages for the power-restart
//! flag, board app data and synchronized-motion scratch, and the upper half
//! of the part for the embedded file system holding the LUT files.

use crate::persist::span::AddressSpan;

/// Physical write-page size of the 25LC1024.
pub const PAGE_SIZE: u32 = 256;
/// Total pages on the part (1 Mbit).
pub const PAGE_COUNT: u32 = 512;

pub const SLOT_COUNT: u32 = 8;
pub const PAGES_PER_SLOT: u32 = 10;
pub const HID_PORT_COUNT: u32 = 8;

const fn page(index: u32) -> AddressSpan {
    AddressSpan::new(index * PAGE_SIZE, (index + 1) * PAGE_SIZE)
}

const fn pages(first: u32, count: u32) -> AddressSpan {
    AddressSpan::new(first * PAGE_SIZE, (first + count) * PAGE_SIZE)
}

/// Page 0: board type identification.
pub const fn board_type() -> AddressSpan {
    page(0)
}

/// Ten pages of persistent storage for slot `slot` (0-based).
/// Invalid slots yield an empty span.
pub const fn slot(slot: u32) -> AddressSpan {
    if slot >= SLOT_COUNT {
        return AddressSpan::empty_at((1 + SLOT_COUNT * PAGES_PER_SLOT) * PAGE_SIZE);
    }
    pages(1 + slot * PAGES_PER_SLOT, PAGES_PER_SLOT)
}

/// One page per HID input port. Invalid ports yield an empty span.
pub const fn hid_in(port: u32) -> AddressSpan {
    if port >= HID_PORT_COUNT {
        return AddressSpan::empty_at((81 + HID_PORT_COUNT) * PAGE_SIZE);
    }
    page(81 + port)
}

/// One page per HID output port. Invalid ports yield an empty span.
pub const fn hid_out(port: u32) -> AddressSpan {
    if port >= HID_PORT_COUNT {
        return AddressSpan::empty_at((89 + HID_PORT_COUNT) * PAGE_SIZE);
    }
    page(89 + port)
}

/// Power-fail restart flag page.
pub const fn power_restart() -> AddressSpan {
    page(97)
}

/// Board application data page.
pub const fn board_app_data() -> AddressSpan {
    page(98)
}

/// Synchronized-motion scratch page.
pub const fn synchronized_motion() -> AddressSpan {
    page(99)
}

/// Upper half of the part: embedded file system holding the LUT files.
pub const fn embedded_file_system() -> AddressSpan {
    pages(256, PAGE_COUNT - 256)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_ten_pages_and_contiguous() {
        assert_eq!(slot(0).head, PAGE_SIZE);
        for s in 0..SLOT_COUNT {
            assert_eq!(slot(s).len(), PAGES_PER_SLOT * PAGE_SIZE);
            if s > 0 {
                assert_eq!(slot(s).head, slot(s - 1).tail);
            }
        }
    }

    #[test]
    fn invalid_indices_yield_empty_spans() {
        assert!(slot(SLOT_COUNT).is_empty());
        assert!(slot(u32::MAX).is_empty());
        assert!(hid_in(HID_PORT_COUNT).is_empty());
        assert!(hid_out(HID_PORT_COUNT).is_empty());
    }

    #[test]
    fn fixed_regions_do_not_overlap() {
        let regions = [
            board_type(),
            slot(0),
            slot(SLOT_COUNT - 1),
            hid_in(0),
            hid_in(HID_PORT_COUNT - 1),
            hid_out(0),
            hid_out(HID_PORT_COUNT - 1),
            power_restart(),
            board_app_data(),
            synchronized_motion(),
            embedded_file_system(),
        ];
        for (i, a) in regions.iter().enumerate() {
            for b in regions.iter().skip(i + 1) {
                assert!(a.intersect(b).is_empty(), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn everything_fits_on_the_part() {
        let part = AddressSpan::new(0, PAGE_SIZE * PAGE_COUNT);
        assert_eq!(embedded_file_system().intersect(&part), embedded_file_system());
        assert_eq!(embedded_file_system().tail, part.tail);
        assert!(part.contains(synchronized_motion().head));
    }
}
