//! Half-open byte ranges over the flat EEPROM address space.
//!
//! All operations clamp rather than panic; an out-of-range request yields an
//! empty span and validity stays the caller's responsibility.

/// A half-open byte range `[head, tail)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpan {
    pub head: u32,
    pub tail: u32,
}

impl AddressSpan {
    /// Creates a span; `tail` is clamped up to `head`.
    #[inline]
    pub const fn new(head: u32, tail: u32) -> Self {
        Self {
            head,
            tail: if tail < head { head } else { tail },
        }
    }

    /// Creates a span from a start address and a byte count.
    #[inline]
    pub const fn from_head_size(head: u32, size: u32) -> Self {
        Self {
            head,
            tail: head.saturating_add(size),
        }
    }

    /// An empty span positioned at `addr`.
    #[inline]
    pub const fn empty_at(addr: u32) -> Self {
        Self {
            head: addr,
            tail: addr,
        }
    }

    #[inline]
    pub const fn len(&self) -> u32 {
        self.tail - self.head
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    #[inline]
    pub const fn contains(&self, addr: u32) -> bool {
        self.head <= addr && addr < self.tail
    }

    /// The overlapping range of two spans; empty (at the clamp point) when
    /// they are disjoint.
    pub fn intersect(&self, other: &AddressSpan) -> AddressSpan {
        let head = self.head.max(other.head);
        let tail = self.tail.min(other.tail);
        if tail < head {
            AddressSpan::empty_at(head.min(self.tail))
        } else {
            AddressSpan { head, tail }
        }
    }

    /// The remainder of the span after skipping `offset` bytes.
    pub fn subspan(&self, offset: u32) -> AddressSpan {
        let head = self.head.saturating_add(offset).min(self.tail);
        AddressSpan {
            head,
            tail: self.tail,
        }
    }

    /// At most `size` bytes starting `offset` bytes in, clamped to the span.
    pub fn subspan_sized(&self, offset: u32, size: u32) -> AddressSpan {
        let head = self.head.saturating_add(offset).min(self.tail);
        let tail = head.saturating_add(size).min(self.tail);
        AddressSpan { head, tail }
    }

    /// Splits the span into `parts` equal slices and returns slice `index`.
    ///
    /// The division remainder folds into the last slice. Zero `parts` or an
    /// out-of-range `index` yields an empty span.
    ///
    /// # Example
    /// ```
    /// use embedded_persist::persist::span::AddressSpan;
    ///
    /// let span = AddressSpan::new(0, 10);
    /// assert_eq!(span.split_and_index(3, 0), AddressSpan::new(0, 3));
    /// assert_eq!(span.split_and_index(3, 2), AddressSpan::new(6, 10));
    /// assert!(span.split_and_index(3, 3).is_empty());
    /// ```
    pub fn split_and_index(&self, parts: u32, index: u32) -> AddressSpan {
        if parts == 0 || index >= parts {
            return AddressSpan::empty_at(self.tail);
        }

        let part_len = self.len() / parts;
        let head = self.head + part_len * index;
        let tail = if index == parts - 1 {
            self.tail
        } else {
            head + part_len
        };
        AddressSpan { head, tail }
    }

    /// Splits the span into `chunk`-sized pieces and returns piece `index`;
    /// the final piece may be short. Out of range yields an empty span at
    /// the tail.
    pub fn split_every_and_index(&self, chunk: u32, index: u32) -> AddressSpan {
        if chunk == 0 {
            return AddressSpan::empty_at(self.tail);
        }

        let offset = match chunk.checked_mul(index) {
            Some(offset) if offset < self.len() => offset,
            _ => return AddressSpan::empty_at(self.tail),
        };
        self.subspan_sized(offset, chunk)
    }
}
