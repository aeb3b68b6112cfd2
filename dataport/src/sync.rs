#[cfg(not(feature = "loom"))]
pub use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "loom")]
pub use loom::sync::atomic::{AtomicU64, Ordering};

/// The overflow byte has a fixed one-byte layout inside the region, so it is
/// always the std atomic, even when the indices are modeled by loom.
pub use std::sync::atomic::AtomicU8;

#[cfg(not(feature = "loom"))]
pub mod notification {
    use crate::error::DataportError;
    use nix::sys::eventfd::{EfdFlags, EventFd};
    use std::os::{
        fd::{AsFd, BorrowedFd},
        unix::io::OwnedFd,
    };

    /// One-way "data available" signal backed by an eventfd.
    ///
    /// The eventfd counter coalesces repeated signals, so notifying N times
    /// before the consumer waits wakes it exactly once.
    pub struct Notification {
        eventfd: EventFd,
    }

    impl Notification {
        pub fn new() -> Result<Self, DataportError> {
            let eventfd = EventFd::from_value_and_flags(0, EfdFlags::EFD_CLOEXEC)
                .map_err(DataportError::EventfdCreation)?;

            Ok(Notification { eventfd })
        }

        /// # Safety
        ///
        /// The caller must ensure that `fd` is a valid eventfd file descriptor.
        /// The file descriptor will be owned by this Notification instance.
        pub unsafe fn from_owned_fd(fd: OwnedFd) -> Self {
            let eventfd = unsafe { EventFd::from_owned_fd(fd) };
            Notification { eventfd }
        }

        /// Another handle on the same eventfd, e.g. for the consumer side.
        pub fn try_clone(&self) -> Result<Self, DataportError> {
            let fd = self.eventfd.as_fd().try_clone_to_owned()?;
            Ok(unsafe { Self::from_owned_fd(fd) })
        }

        pub fn notify(&self) -> Result<(), DataportError> {
            self.eventfd
                .write(1)
                .map_err(DataportError::EventfdWrite)?;
            Ok(())
        }

        pub fn wait(&self) -> Result<(), DataportError> {
            self.eventfd.read().map_err(DataportError::EventfdRead)?;
            Ok(())
        }

        pub fn fd(&self) -> BorrowedFd<'_> {
            self.eventfd.as_fd()
        }
    }
}

#[cfg(feature = "loom")]
pub mod notification {
    use crate::error::DataportError;
    use loom::sync::{Arc, Condvar, Mutex, MutexGuard};

    /// Model of the eventfd signal: a counter that `notify` bumps and `wait`
    /// resets to zero after blocking while it is zero.
    #[derive(Clone)]
    pub struct Notification {
        inner: Arc<(Mutex<u64>, Condvar)>,
    }

    impl Notification {
        pub fn new() -> Result<Self, DataportError> {
            Ok(Notification {
                inner: Arc::new((Mutex::new(0), Condvar::new())),
            })
        }

        pub fn try_clone(&self) -> Result<Self, DataportError> {
            Ok(self.clone())
        }

        pub fn notify(&self) -> Result<(), DataportError> {
            let (counter, condvar) = &*self.inner;
            let mut pending = lock(counter)?;
            *pending += 1;
            condvar.notify_one();
            Ok(())
        }

        pub fn wait(&self) -> Result<(), DataportError> {
            let (counter, condvar) = &*self.inner;
            let mut pending = lock(counter)?;
            while *pending == 0 {
                pending = condvar.wait(pending).map_err(poisoned)?;
            }
            *pending = 0;
            Ok(())
        }

        /// Signals raised since the last `wait`.
        pub fn pending(&self) -> Result<u64, DataportError> {
            Ok(*lock(&self.inner.0)?)
        }
    }

    fn lock(counter: &Mutex<u64>) -> Result<MutexGuard<'_, u64>, DataportError> {
        counter.lock().map_err(poisoned)
    }

    fn poisoned<T>(_: T) -> DataportError {
        DataportError::Memory("notification lock poisoned".to_string())
    }
}
