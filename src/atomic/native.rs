//! Counters backed by CPU atomic instructions.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
#[cfg(target_has_atomic = "64")]
use std::sync::atomic::{AtomicI64, AtomicU64};

use super::AtomicInteger;

macro_rules! native_integer {
    ($(#[$meta:meta])* $name:ident, $atomic:ty, $value:ty) => {
        $(#[$meta])*
        #[derive(Debug, Default)]
        pub struct $name {
            core: $atomic,
        }

        impl $name {
            /// Create a counter holding `val`.
            pub const fn new(val: $value) -> Self {
                Self {
                    core: <$atomic>::new(val),
                }
            }
        }

        impl AtomicInteger for $name {
            type Value = $value;

            fn with_value(val: $value) -> Self {
                Self::new(val)
            }

            #[inline]
            fn load(&self) -> $value {
                self.core.load(Ordering::SeqCst)
            }

            #[inline]
            fn store(&self, val: $value) {
                self.core.store(val, Ordering::SeqCst);
            }

            #[inline]
            fn add(&self, delta: $value) -> $value {
                self.core.fetch_add(delta, Ordering::SeqCst).wrapping_add(delta)
            }

            #[inline]
            fn sub(&self, delta: $value) -> $value {
                self.core.fetch_sub(delta, Ordering::SeqCst).wrapping_sub(delta)
            }

            #[inline]
            fn increment(&self) -> $value {
                self.add(1)
            }

            #[inline]
            fn decrement(&self) -> $value {
                self.sub(1)
            }

            #[inline]
            fn compare_and_swap(&self, old: $value, new: $value) -> bool {
                self.core
                    .compare_exchange(old, new, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            }

            #[inline]
            fn swap(&self, new: $value) -> $value {
                self.core.swap(new, Ordering::SeqCst)
            }
        }
    };
}

native_integer!(
    /// Signed 32-bit counter.
    Int32,
    AtomicI32,
    i32
);

native_integer!(
    /// Unsigned 32-bit counter.
    Uint32,
    AtomicU32,
    u32
);

#[cfg(target_has_atomic = "64")]
native_integer!(
    /// Signed 64-bit counter using native instructions.
    NativeInt64,
    AtomicI64,
    i64
);

#[cfg(target_has_atomic = "64")]
native_integer!(
    /// Unsigned 64-bit counter using native instructions.
    NativeUint64,
    AtomicU64,
    u64
);
