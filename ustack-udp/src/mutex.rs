//! Socket and table locks that name the purpose of every acquisition
//!
//! `wait` is the suspension point for blocking receive: the lock is released while the thread
//! sleeps on the condition variable and reacquired before the guard is handed back, so a
//! producer can always enqueue while a consumer waits.

#[cfg(feature = "lock_tracking")]
mod tracking {
    use std::{
        collections::VecDeque,
        fmt::Debug,
        ops::{Deref, DerefMut},
        sync::Condvar,
        time::{Duration, Instant},
    };

    use tracing::warn;

    #[derive(Debug)]
    struct Inner<T> {
        last_lock_owner: VecDeque<(&'static str, Duration)>,
        value: T,
    }

    /// A Mutex which tracks how long a lock was held and emits warnings in case of excessive
    /// lock times
    pub(crate) struct Mutex<T> {
        inner: std::sync::Mutex<Inner<T>>,
    }

    impl<T: Debug> Debug for Mutex<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            Debug::fmt(&self.inner, f)
        }
    }

    impl<T> Mutex<T> {
        pub(crate) fn new(value: T) -> Self {
            Self {
                inner: std::sync::Mutex::new(Inner {
                    last_lock_owner: VecDeque::new(),
                    value,
                }),
            }
        }

        /// Acquires the lock for a certain purpose
        ///
        /// The purpose will be recorded in the list of last lock owners
        pub(crate) fn lock(&self, purpose: &'static str) -> MutexGuard<'_, T> {
            let now = Instant::now();
            let guard = self.inner.lock().unwrap();

            let lock_time = Instant::now();
            let elapsed = lock_time.duration_since(now);

            if elapsed > Duration::from_millis(1) {
                warn!(
                    "locking the socket for {} took {:?}; last owners: {:?}",
                    purpose, elapsed, guard.last_lock_owner
                );
            }

            MutexGuard {
                guard: Some(guard),
                start_time: lock_time,
                purpose,
            }
        }
    }

    pub(crate) struct MutexGuard<'a, T> {
        guard: Option<std::sync::MutexGuard<'a, Inner<T>>>,
        start_time: Instant,
        purpose: &'static str,
    }

    impl<'a, T> MutexGuard<'a, T> {
        /// Release the lock, sleep on `condvar`, and reacquire on wakeup
        ///
        /// Wakeups may be spurious; callers re-check their predicate after this returns.
        pub(crate) fn wait(mut self, condvar: &Condvar) -> Self {
            let purpose = self.purpose;
            self.record_hold();
            let guard = self.guard.take().unwrap();
            let guard = condvar.wait(guard).unwrap();
            Self {
                guard: Some(guard),
                start_time: Instant::now(),
                purpose,
            }
        }

        fn record_hold(&mut self) {
            let duration = self.start_time.elapsed();
            let guard = self.guard.as_mut().unwrap();

            if guard.last_lock_owner.len() == MAX_LOCK_OWNERS {
                guard.last_lock_owner.pop_back();
            }

            if duration > Duration::from_millis(1) {
                warn!(
                    "utilizing the socket for {} took {:?}",
                    self.purpose, duration
                );
            }

            guard.last_lock_owner.push_front((self.purpose, duration));
        }
    }

    impl<T> Drop for MutexGuard<'_, T> {
        fn drop(&mut self) {
            if self.guard.is_some() {
                self.record_hold();
            }
        }
    }

    impl<T> Deref for MutexGuard<'_, T> {
        type Target = T;

        fn deref(&self) -> &Self::Target {
            &self.guard.as_ref().unwrap().value
        }
    }

    impl<T> DerefMut for MutexGuard<'_, T> {
        fn deref_mut(&mut self) -> &mut Self::Target {
            &mut self.guard.as_mut().unwrap().value
        }
    }

    const MAX_LOCK_OWNERS: usize = 20;
}

#[cfg(feature = "lock_tracking")]
pub(crate) use tracking::{Mutex, MutexGuard};

#[cfg(not(feature = "lock_tracking"))]
mod non_tracking {
    use std::{
        ops::{Deref, DerefMut},
        sync::Condvar,
    };

    /// A Mutex which optionally tracks how long a lock was held and emits warnings in case of
    /// excessive lock times
    #[derive(Debug)]
    pub(crate) struct Mutex<T> {
        inner: std::sync::Mutex<T>,
    }

    impl<T> Mutex<T> {
        pub(crate) fn new(value: T) -> Self {
            Self {
                inner: std::sync::Mutex::new(value),
            }
        }

        /// Acquires the lock for a certain purpose
        pub(crate) fn lock(&self, _purpose: &'static str) -> MutexGuard<'_, T> {
            MutexGuard {
                guard: self.inner.lock().unwrap(),
            }
        }
    }

    pub(crate) struct MutexGuard<'a, T> {
        guard: std::sync::MutexGuard<'a, T>,
    }

    impl<'a, T> MutexGuard<'a, T> {
        /// Release the lock, sleep on `condvar`, and reacquire on wakeup
        ///
        /// Wakeups may be spurious; callers re-check their predicate after this returns.
        pub(crate) fn wait(self, condvar: &Condvar) -> Self {
            Self {
                guard: condvar.wait(self.guard).unwrap(),
            }
        }
    }

    impl<T> Deref for MutexGuard<'_, T> {
        type Target = T;

        fn deref(&self) -> &Self::Target {
            self.guard.deref()
        }
    }

    impl<T> DerefMut for MutexGuard<'_, T> {
        fn deref_mut(&mut self) -> &mut Self::Target {
            self.guard.deref_mut()
        }
    }
}

#[cfg(not(feature = "lock_tracking"))]
pub(crate) use non_tracking::{Mutex, MutexGuard};
