//! Mutex-backed 64-bit counters for targets without 64-bit atomic instructions.
//!
//! Each operation holds the lock for its whole read/modify/write, which gives
//! the same observable contract as the native counters. Callers must not rely
//! on lock-free progress.

use parking_lot::Mutex;

use super::AtomicInteger;

macro_rules! locked_integer {
    ($(#[$meta:meta])* $name:ident, $value:ty) => {
        $(#[$meta])*
        #[derive(Debug, Default)]
        pub struct $name {
            core: Mutex<$value>,
        }

        impl $name {
            /// Create a counter holding `val`.
            pub const fn new(val: $value) -> Self {
                Self {
                    core: Mutex::new(val),
                }
            }
        }

        impl AtomicInteger for $name {
            type Value = $value;

            fn with_value(val: $value) -> Self {
                Self::new(val)
            }

            fn load(&self) -> $value {
                *self.core.lock()
            }

            fn store(&self, val: $value) {
                *self.core.lock() = val;
            }

            fn add(&self, delta: $value) -> $value {
                let mut core = self.core.lock();
                *core = core.wrapping_add(delta);
                *core
            }

            fn sub(&self, delta: $value) -> $value {
                let mut core = self.core.lock();
                *core = core.wrapping_sub(delta);
                *core
            }

            fn increment(&self) -> $value {
                self.add(1)
            }

            fn decrement(&self) -> $value {
                self.sub(1)
            }

            fn compare_and_swap(&self, old: $value, new: $value) -> bool {
                let mut core = self.core.lock();
                if *core == old {
                    *core = new;
                    return true;
                }
                false
            }

            fn swap(&self, new: $value) -> $value {
                std::mem::replace(&mut *self.core.lock(), new)
            }
        }
    };
}

locked_integer!(
    /// Signed 64-bit counter guarded by a mutex.
    LockedInt64,
    i64
);

locked_integer!(
    /// Unsigned 64-bit counter guarded by a mutex.
    LockedUint64,
    u64
);
