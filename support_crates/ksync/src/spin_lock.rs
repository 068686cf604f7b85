use core::cell::UnsafeCell;
use core::fmt;
use core::hint::spin_loop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// A SpinLock Mutex implementation.
///
/// Besides protecting data, a `SpinLock<()>` is used to mark critical windows (e.g. while a foreign address
/// environment is installed) during which no other party may enter the same window.
pub struct SpinLock<T> {
    is_locked: AtomicBool,
    value: UnsafeCell<T>,
}

/// The error returned by [`SpinLock::try_lock`] when the lock is currently held by someone else.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct WouldBlock;

/// A Guard protecting some data locked through a [`SpinLock`].
///
/// Use it via the implemented [`Deref`] and [`DerefMut`] traits.
/// The lock is released when the guard is dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct Guard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            is_locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Try to lock the lock once and return a [`Guard`] if successful
    pub fn try_lock(&self) -> Result<Guard<T>, WouldBlock> {
        if self.is_locked.swap(true, Ordering::Acquire) {
            Err(WouldBlock)
        } else {
            Ok(Guard { lock: self })
        }
    }

    /// Try to repeatedly lock the lock until it succeeds, returning the protected data via a [`Guard`]
    pub fn spin_lock(&self) -> Guard<T> {
        loop {
            match self.try_lock() {
                Ok(guard) => return guard,
                // only spin on a relaxed load to not hammer the cache line with writes
                Err(WouldBlock) => {
                    while self.is_locked.load(Ordering::Relaxed) {
                        spin_loop();
                    }
                }
            }
        }
    }

    /// Whether the lock is currently held.
    ///
    /// The answer may already be outdated when it is returned and should only be used for diagnostics and
    /// assertions.
    pub fn is_locked(&self) -> bool {
        self.is_locked.load(Ordering::Relaxed)
    }

    /// Access the protected value without locking.
    ///
    /// This is safe because the exclusive borrow statically guarantees that no guard exists.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Consume the lock and return the protected value
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }

    fn unlock(&self) {
        self.is_locked.store(false, Ordering::Release)
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("is_locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

unsafe impl<T> Sync for SpinLock<T> where T: Send {}

impl<T> Deref for Guard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // Safety: The very existence of this Guard guarantees we've exclusively locked the lock
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for Guard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // Safety: The very existence of this Guard guarantees we've exclusively locked the lock
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for Guard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

impl<T> fmt::Debug for Guard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard").finish_non_exhaustive()
    }
}
