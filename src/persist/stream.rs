//! Sequential cursors over EEPROM address spans.
//!
//! The direct stream issues one bus transaction per call. The cached stream
//! batches traffic through a borrowed [`PageCache`], looping across page
//! edges with a flush-then-recache so pending writes survive the switch.
//! Both clamp to the span and report the actually-transferred length;
//! truncation is silent and callers detect it by comparing lengths.

use crate::persist::bus::{BusMutex, HandleFactory};
use crate::persist::cache::PageCache;
use crate::persist::driver::EepromDriver;
use crate::persist::error::StoreError;
use crate::persist::span::AddressSpan;

/// Seek origins; every seek clamps into `[head, tail]` rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seek {
    /// Offset forward from the span head.
    Begin(u32),
    /// Signed offset from the current position.
    Current(i32),
    /// Offset backward from the span tail.
    End(u32),
}

/// Cursor state over an address span: `head <= current <= tail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDescriptor {
    head: u32,
    tail: u32,
    current: u32,
}

impl StreamDescriptor {
    /// Builds a descriptor positioned at the span head; `None` for an empty
    /// span.
    pub fn from_span(span: AddressSpan) -> Option<Self> {
        if span.is_empty() {
            return None;
        }
        Some(Self {
            head: span.head,
            tail: span.tail,
            current: span.head,
        })
    }

    pub fn span(&self) -> AddressSpan {
        AddressSpan::new(self.head, self.tail)
    }

    /// Absolute address of the cursor.
    pub fn address(&self) -> u32 {
        self.current
    }

    /// Cursor offset from the span head.
    pub fn position(&self) -> u32 {
        self.current - self.head
    }

    pub fn remaining(&self) -> u32 {
        self.tail - self.current
    }

    /// Moves the cursor, clamping into range. Returns the new position.
    pub fn seek(&mut self, seek: Seek) -> u32 {
        self.current = match seek {
            Seek::Begin(offset) => self.head.saturating_add(offset),
            Seek::Current(delta) => {
                if delta >= 0 {
                    self.current.saturating_add(delta as u32)
                } else {
                    self.current.saturating_sub(delta.unsigned_abs())
                }
            }
            Seek::End(offset) => self.tail.saturating_sub(offset),
        }
        .clamp(self.head, self.tail);
        self.position()
    }

    fn advance(&mut self, len: u32) {
        self.current = (self.current + len).min(self.tail);
    }
}

/// A stream that hits the bus on every call.
pub struct DirectStream {
    desc: StreamDescriptor,
}

impl DirectStream {
    pub fn new(desc: StreamDescriptor) -> Self {
        Self { desc }
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.desc
    }

    pub fn seek(&mut self, seek: Seek) -> u32 {
        self.desc.seek(seek)
    }

    /// Reads up to `dest.len()` bytes; returns the transferred length.
    pub fn read<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
        dest: &mut [u8],
    ) -> Result<usize, StoreError> {
        let want = (dest.len() as u32).min(self.desc.remaining()) as usize;
        if want > 0 {
            factory.device().read(self.desc.address(), &mut dest[..want])?;
            self.desc.advance(want as u32);
        }
        Ok(want)
    }

    /// Writes up to `src.len()` bytes; returns the transferred length.
    pub fn write<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
        src: &[u8],
    ) -> Result<usize, StoreError> {
        let want = (src.len() as u32).min(self.desc.remaining()) as usize;
        if want > 0 {
            factory.device().write(self.desc.address(), &src[..want])?;
            self.desc.advance(want as u32);
        }
        Ok(want)
    }
}

/// A stream backed by a borrowed [`PageCache`].
///
/// The stream borrows the cache for its whole lifetime so a multi-page
/// operation stays atomic with respect to other cache users; it does not own
/// the cache and leaves the final [`flush`](Self::flush) to the caller.
pub struct CachedStream<'a, const PS: usize> {
    desc: StreamDescriptor,
    cache: &'a mut PageCache<PS>,
}

impl<'a, const PS: usize> CachedStream<'a, PS> {
    pub fn new(desc: StreamDescriptor, cache: &'a mut PageCache<PS>) -> Self {
        Self { desc, cache }
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.desc
    }

    pub fn address(&self) -> u32 {
        self.desc.address()
    }

    pub fn position(&self) -> u32 {
        self.desc.position()
    }

    pub fn seek(&mut self, seek: Seek) -> u32 {
        self.desc.seek(seek)
    }

    /// Flushes the backing cache if dirty.
    pub fn flush<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
    ) -> Result<(), StoreError> {
        self.cache.flush(factory)
    }

    fn ensure_page<M: BusMutex, E: EepromDriver>(
        cache: &mut PageCache<PS>,
        factory: &mut HandleFactory<'_, M, E>,
        address: u32,
    ) -> Result<(), StoreError> {
        let aligned = address - (address % PS as u32);
        if cache.head_address() != Some(aligned) {
            // Flush first so pending writes survive the page switch.
            cache.flush(factory)?;
            cache.cache(factory, aligned)?;
        }
        Ok(())
    }

    /// Reads up to `dest.len()` bytes; returns the transferred length.
    pub fn read<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
        dest: &mut [u8],
    ) -> Result<usize, StoreError> {
        let Self { desc, cache } = self;
        let want = (dest.len() as u32).min(desc.remaining());
        let mut done = 0u32;
        while done < want {
            let address = desc.address();
            Self::ensure_page(cache, factory, address)?;
            let src = cache.subspan(address, want - done);
            let n = src.len() as u32;
            dest[done as usize..(done + n) as usize].copy_from_slice(src);
            desc.advance(n);
            done += n;
        }
        Ok(want as usize)
    }

    /// Reads a single byte, if any remain.
    pub fn read_byte<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
    ) -> Result<Option<u8>, StoreError> {
        let mut byte = [0u8; 1];
        Ok(match self.read(factory, &mut byte)? {
            0 => None,
            _ => Some(byte[0]),
        })
    }

    /// Writes up to `src.len()` bytes; returns the transferred length.
    pub fn write<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
        src: &[u8],
    ) -> Result<usize, StoreError> {
        let Self { desc, cache } = self;
        let want = (src.len() as u32).min(desc.remaining());
        let mut done = 0u32;
        while done < want {
            let address = desc.address();
            Self::ensure_page(cache, factory, address)?;
            let dest = cache.mutable_subspan(address, want - done);
            let n = dest.len() as u32;
            dest.copy_from_slice(&src[done as usize..(done + n) as usize]);
            desc.advance(n);
            done += n;
        }
        Ok(want as usize)
    }

    /// Returns the cached bytes from the cursor to the end of the current
    /// page (or the span tail, whichever is first) and advances past them.
    ///
    /// Repeated calls walk the whole span page by page without copying,
    /// which is how record CRCs are streamed. Returns an empty slice at the
    /// span end.
    pub fn read_to_cache_end<M: BusMutex, E: EepromDriver>(
        &mut self,
        factory: &mut HandleFactory<'_, M, E>,
    ) -> Result<&[u8], StoreError> {
        let Self { desc, cache } = self;
        if desc.remaining() == 0 {
            return Ok(&[]);
        }
        let address = desc.address();
        Self::ensure_page(cache, factory, address)?;
        let src = cache.subspan(address, desc.remaining());
        desc.advance(src.len() as u32);
        Ok(src)
    }
}
