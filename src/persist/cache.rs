//! One physical EEPROM page mirrored in RAM with dirty tracking.

use crate::persist::bus::{BusMutex, HandleFactory};
use crate::persist::driver::EepromDriver;
use crate::persist::error::StoreError;
use crate::persist::span::AddressSpan;

/// In-memory mirror of exactly one physical page.
///
/// A cache is owned by exactly one slot's persistence controller; it is never
/// shared across tasks. Subspan accessors clip to the cached page and never
/// straddle two physical pages; multi-page operations loop at the stream
/// layer.
pub struct PageCache<const PS: usize = 256> {
    buf: [u8; PS],
    head: Option<u32>,
    dirty: bool,
}

impl<const PS: usize> PageCache<PS> {
    pub const fn new() -> Self {
        Self {
            buf: [0; PS],
            head: None,
            dirty: false,
        }
    }

    /// Page-aligned address of the cached page, if any.
    pub fn head_address(&self) -> Option<u32> {
        self.head
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn cached_span(&self) -> AddressSpan {
        match self.head {
            Some(head) => AddressSpan::from_head_size(head, PS as u32),
            None => AddressSpan::empty_at(0),
        }
    }

    /// Points the cache at the page containing `address`, reading it from
    /// the device.
    ///
    /// The page is always re-read and the dirty flag cleared, even when it is
    /// the page already cached: pending unflushed writes are discarded.
    /// Callers that may have dirty data must flush first (the cached stream
    /// does; see also [`FlushGuard`]).
    pub fn cache<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
        address: u32,
    ) -> Result<(), StoreError> {
        let aligned = address - (address % PS as u32);
        factory.device().read(aligned, &mut self.buf)?;
        self.head = Some(aligned);
        self.dirty = false;
        Ok(())
    }

    /// Re-reads the cached page from the device, discarding pending writes.
    pub fn recache<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
    ) -> Result<(), StoreError> {
        if let Some(head) = self.head {
            factory.device().read(head, &mut self.buf)?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Read-only view of `[address, address + len)` clipped to the cached
    /// page; empty when disjoint or nothing is cached. Never touches the
    /// dirty flag.
    pub fn subspan(&self, address: u32, len: u32) -> &[u8] {
        let clipped = self
            .cached_span()
            .intersect(&AddressSpan::from_head_size(address, len));
        if clipped.is_empty() {
            return &[];
        }
        let start = (clipped.head - self.cached_span().head) as usize;
        &self.buf[start..start + clipped.len() as usize]
    }

    /// Writable view of `[address, address + len)` clipped to the cached
    /// page.
    ///
    /// Marks the cache dirty whenever the returned slice is non-empty, even
    /// if the caller never writes through it. The over-approximation is
    /// deliberate.
    pub fn mutable_subspan(&mut self, address: u32, len: u32) -> &mut [u8] {
        let clipped = self
            .cached_span()
            .intersect(&AddressSpan::from_head_size(address, len));
        if clipped.is_empty() {
            return &mut [];
        }
        self.dirty = true;
        let start = (clipped.head - self.cached_span().head) as usize;
        &mut self.buf[start..start + clipped.len() as usize]
    }

    /// Writes the page back iff dirty, then clears the flag.
    pub fn flush<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
    ) -> Result<(), StoreError> {
        if self.dirty {
            if let Some(head) = self.head {
                factory.device().write(head, &self.buf)?;
            }
            self.dirty = false;
        }
        Ok(())
    }
}

impl<const PS: usize> Default for PageCache<PS> {
    fn default() -> Self {
        Self::new()
    }
}

/// Flushes a borrowed [`PageCache`] when the scope ends.
///
/// Drop cannot report a failed write; call [`finish`](Self::finish) on the
/// success path and let drop act only as the error-path safety net.
pub struct FlushGuard<'a, 'f, M: BusMutex, E: EepromDriver, const PS: usize> {
    cache: &'a mut PageCache<PS>,
    factory: &'a mut HandleFactory<'f, M, E>,
    finished: bool,
}

impl<'a, 'f, M: BusMutex, E: EepromDriver, const PS: usize> FlushGuard<'a, 'f, M, E, PS> {
    pub fn new(cache: &'a mut PageCache<PS>, factory: &'a mut HandleFactory<'f, M, E>) -> Self {
        Self {
            cache,
            factory,
            finished: false,
        }
    }

    pub fn cache(&mut self) -> &mut PageCache<PS> {
        self.cache
    }

    pub fn factory(&mut self) -> &mut HandleFactory<'f, M, E> {
        self.factory
    }

    /// Flushes now and disarms the drop-time flush.
    pub fn finish(mut self) -> Result<(), StoreError> {
        self.finished = true;
        self.cache.flush(self.factory)
    }
}

impl<M: BusMutex, E: EepromDriver, const PS: usize> Drop for FlushGuard<'_, '_, M, E, PS> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.cache.flush(self.factory);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::bus::CsBusMutex;
    use crate::persist::driver::MemEeprom;

    const PS: usize = 16;

    fn fixture() -> (CsBusMutex, MemEeprom<64>) {
        let mut eeprom = MemEeprom::<64>::new();
        for (i, b) in eeprom.bytes_mut().iter_mut().enumerate() {
            *b = i as u8;
        }
        (CsBusMutex::new(), eeprom)
    }

    #[test]
    fn cache_aligns_down_to_page() {
        let (mutex, mut eeprom) = fixture();
        let mut factory = HandleFactory::new(&mutex, &mut eeprom);
        let mut cache = PageCache::<PS>::new();
        assert_eq!(cache.head_address(), None);

        cache.cache(&mut factory, 21).unwrap();
        assert_eq!(cache.head_address(), Some(16));
        assert_eq!(cache.subspan(16, 4), &[16, 17, 18, 19]);
    }

    #[test]
    fn subspan_clips_and_never_straddles_pages() {
        let (mutex, mut eeprom) = fixture();
        let mut factory = HandleFactory::new(&mutex, &mut eeprom);
        let mut cache = PageCache::<PS>::new();
        cache.cache(&mut factory, 16).unwrap();

        // Clipped at the page tail even when the request runs past it.
        assert_eq!(cache.subspan(30, 8), &[30, 31]);
        // Disjoint page: empty.
        assert!(cache.subspan(40, 4).is_empty());
        assert!(cache.subspan(0, 4).is_empty());
        assert!(!cache.is_dirty());
    }

    #[test]
    fn mutable_subspan_marks_dirty_even_without_a_write() {
        let (mutex, mut eeprom) = fixture();
        let mut factory = HandleFactory::new(&mutex, &mut eeprom);
        let mut cache = PageCache::<PS>::new();
        cache.cache(&mut factory, 0).unwrap();

        let _ = cache.mutable_subspan(4, 4);
        assert!(cache.is_dirty());

        // An empty clip does not mark dirty.
        let mut clean = PageCache::<PS>::new();
        clean.cache(&mut factory, 0).unwrap();
        assert!(clean.mutable_subspan(32, 4).is_empty());
        assert!(!clean.is_dirty());
    }

    #[test]
    fn flush_round_trip() {
        let (mutex, mut eeprom) = fixture();
        {
            let mut factory = HandleFactory::new(&mutex, &mut eeprom);
            let mut cache = PageCache::<PS>::new();
            cache.cache(&mut factory, 16).unwrap();
            cache.mutable_subspan(20, 3).copy_from_slice(&[0xA0, 0xA1, 0xA2]);
            cache.flush(&mut factory).unwrap();
            assert!(!cache.is_dirty());

            cache.recache(&mut factory).unwrap();
            assert_eq!(cache.subspan(20, 3), &[0xA0, 0xA1, 0xA2]);
        }
        assert_eq!(&eeprom.bytes()[20..23], &[0xA0, 0xA1, 0xA2]);
    }

    #[test]
    fn recaching_another_page_discards_dirty_data() {
        let (mutex, mut eeprom) = fixture();
        let mut factory = HandleFactory::new(&mutex, &mut eeprom);
        let mut cache = PageCache::<PS>::new();

        cache.cache(&mut factory, 0).unwrap();
        cache.mutable_subspan(0, 2).copy_from_slice(&[0xEE, 0xEE]);
        assert!(cache.is_dirty());

        // Documented hazard: pending writes are lost on a page switch.
        cache.cache(&mut factory, 16).unwrap();
        assert!(!cache.is_dirty());
        cache.cache(&mut factory, 0).unwrap();
        assert_eq!(cache.subspan(0, 2), &[0, 1]);
    }

    #[test]
    fn caching_the_same_page_rereads_the_device() {
        let (mutex, mut eeprom) = fixture();
        let mut factory = HandleFactory::new(&mutex, &mut eeprom);
        let mut cache = PageCache::<PS>::new();

        cache.cache(&mut factory, 0).unwrap();
        cache.mutable_subspan(0, 1).copy_from_slice(&[0x99]);
        // Same page, but cache() always re-reads: the pending byte is gone
        // and the device contents win.
        cache.cache(&mut factory, 8).unwrap();
        assert!(!cache.is_dirty());
        assert_eq!(cache.subspan(0, 1), &[0]);
    }

    #[test]
    fn flush_guard_flushes_on_drop() {
        let (mutex, mut eeprom) = fixture();
        {
            let mut factory = HandleFactory::new(&mutex, &mut eeprom);
            let mut cache = PageCache::<PS>::new();
            cache.cache(&mut factory, 0).unwrap();
            {
                let mut guard = FlushGuard::new(&mut cache, &mut factory);
                guard.cache().mutable_subspan(2, 1).copy_from_slice(&[0x42]);
            }
            assert!(!cache.is_dirty());
        }
        assert_eq!(eeprom.bytes()[2], 0x42);
    }
}
