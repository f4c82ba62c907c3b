//! Scoped-lock arbitration for the shared EEPROM bus.
//!
//! The physical bus is a single exclusive resource. Every consumer receives a
//! [`HandleFactory`] by reference and holds it for any sequence that must be
//! atomic across bus transactions (a cached-stream read spanning a page
//! refill, a multi-field mapper load). The factory locks on construction by
//! default and releases on drop; only lock acquisition is cancellable via
//! timeout, since an in-progress transfer always runs to completion.

use core::cell::Cell;

use crate::persist::driver::EepromDriver;

/// A blocking mutex guarding the bus.
///
/// `lock` blocks indefinitely; `try_lock_for` gives up after the given number
/// of scheduler ticks. On an RTOS target this wraps the native semaphore.
pub trait BusMutex {
    fn lock(&self);
    fn try_lock_for(&self, timeout_ticks: u32) -> bool;
    fn unlock(&self);
}

/// A [`BusMutex`] built on `critical-section`, for single-core targets and
/// host tests.
///
/// `lock` spins; with a single context the first attempt always succeeds, so
/// the spin only matters when the lock discipline is violated.
pub struct CsBusMutex {
    taken: critical_section::Mutex<Cell<bool>>,
}

impl CsBusMutex {
    pub const fn new() -> Self {
        Self {
            taken: critical_section::Mutex::new(Cell::new(false)),
        }
    }

    fn try_take(&self) -> bool {
        critical_section::with(|cs| {
            let taken = self.taken.borrow(cs);
            if taken.get() {
                false
            } else {
                taken.set(true);
                true
            }
        })
    }
}

impl Default for CsBusMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl BusMutex for CsBusMutex {
    fn lock(&self) {
        while !self.try_take() {
            core::hint::spin_loop();
        }
    }

    fn try_lock_for(&self, timeout_ticks: u32) -> bool {
        for _ in 0..=timeout_ticks {
            if self.try_take() {
                return true;
            }
            core::hint::spin_loop();
        }
        false
    }

    fn unlock(&self) {
        critical_section::with(|cs| self.taken.borrow(cs).set(false));
    }
}

/// Bus-arbiter context: couples the bus mutex with the EEPROM device it
/// guards.
///
/// Constructed once per sequence and passed by reference into streams,
/// caches, mappers and aggregates. The lock is released when the factory is
/// dropped (if owned at that point).
pub struct HandleFactory<'a, M: BusMutex, E: EepromDriver> {
    mutex: &'a M,
    device: &'a mut E,
    owns_lock: bool,
}

impl<'a, M: BusMutex, E: EepromDriver> HandleFactory<'a, M, E> {
    /// Locks the bus (blocking) and returns the factory.
    pub fn new(mutex: &'a M, device: &'a mut E) -> Self {
        mutex.lock();
        Self {
            mutex,
            device,
            owns_lock: true,
        }
    }

    /// Creates the factory without taking the lock.
    pub fn defer_lock(mutex: &'a M, device: &'a mut E) -> Self {
        Self {
            mutex,
            device,
            owns_lock: false,
        }
    }

    /// Takes ownership of a lock already acquired by the caller.
    pub fn adopt_lock(mutex: &'a M, device: &'a mut E) -> Self {
        Self {
            mutex,
            device,
            owns_lock: true,
        }
    }

    /// Locks within `timeout_ticks`; the factory may come back unlocked
    /// (check [`has_lock`](Self::has_lock)).
    pub fn try_lock(mutex: &'a M, device: &'a mut E, timeout_ticks: u32) -> Self {
        let owns_lock = mutex.try_lock_for(timeout_ticks);
        Self {
            mutex,
            device,
            owns_lock,
        }
    }

    pub fn has_lock(&self) -> bool {
        self.owns_lock
    }

    /// Takes the lock if not owned, blocking.
    pub fn acquire_lock(&mut self) {
        if !self.owns_lock {
            self.mutex.lock();
            self.owns_lock = true;
        }
    }

    /// Takes the lock if not owned, within `timeout_ticks`.
    /// Returns whether the factory holds the lock.
    pub fn try_acquire_lock(&mut self, timeout_ticks: u32) -> bool {
        if !self.owns_lock {
            self.owns_lock = self.mutex.try_lock_for(timeout_ticks);
        }
        self.owns_lock
    }

    /// Releases the lock if owned.
    pub fn release_lock(&mut self) {
        if self.owns_lock {
            self.mutex.unlock();
            self.owns_lock = false;
        }
    }

    /// Access to the guarded device. Only meaningful while the lock is held.
    pub fn device(&mut self) -> &mut E {
        debug_assert!(self.owns_lock, "bus access without holding the lock");
        self.device
    }
}

impl<M: BusMutex, E: EepromDriver> Drop for HandleFactory<'_, M, E> {
    fn drop(&mut self) {
        self.release_lock();
    }
}
