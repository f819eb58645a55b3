//! Named locks with optional loom support
//!
//! Every executive table sits behind a [`SharedLock`]. A poisoned lock is
//! reported and then recovered: a panic in one caller must not take the
//! resource tables away from every other task.

#[cfg(not(feature = "loom"))]
pub use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(feature = "loom")]
pub use loom::sync::{Arc, Mutex, MutexGuard};

/// Mutex carrying a name for diagnostics.
pub struct SharedLock<T> {
    name: &'static str,
    inner: Mutex<T>,
}

impl<T> SharedLock<T> {
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            inner: Mutex::new(value),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Take the lock, recovering it if a previous holder panicked.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            log::error!("{}: lock poisoned by a panicked holder, recovering", self.name);
            poisoned.into_inner()
        })
    }

    /// Run `f` with the lock held.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for SharedLock<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedLock").field("name", &self.name).finish()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;

    #[test]
    fn test_lock_and_with() {
        let lock = SharedLock::new("test", 1u32);
        *lock.lock() += 1;
        assert_eq!(lock.with(|v| *v), 2);
        assert_eq!(lock.name(), "test");
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let lock = Arc::new(SharedLock::new("poison", 5u32));
        let holder = Arc::clone(&lock);
        let result = std::thread::spawn(move || {
            let mut guard = holder.lock();
            *guard = 6;
            panic!("holder failed");
        })
        .join();
        assert!(result.is_err());

        // Value written before the panic is still there
        assert_eq!(*lock.lock(), 6);
        *lock.lock() = 7;
        assert_eq!(*lock.lock(), 7);
    }
}
