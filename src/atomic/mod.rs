//! Portable atomic counters.
//!
//! Every counter in the crate goes through these types so the rest of the code
//! does not care whether the target has native 64-bit atomic instructions.
//! 32-bit counters and the boolean flag always use the native instructions.
//! `Int64` and `Uint64` resolve to the native types when
//! `target_has_atomic = "64"` holds and to the mutex-backed types otherwise.
//!
//! All operations are sequentially consistent and arithmetic wraps on overflow.

mod flag;
mod locked;
mod native;

pub use flag::Bool;
pub use locked::{LockedInt64, LockedUint64};
pub use native::{Int32, Uint32};

#[cfg(target_has_atomic = "64")]
pub use native::{NativeInt64 as Int64, NativeUint64 as Uint64};

#[cfg(target_has_atomic = "64")]
pub use native::{NativeInt64, NativeUint64};

#[cfg(not(target_has_atomic = "64"))]
pub use locked::{LockedInt64 as Int64, LockedUint64 as Uint64};

/// Shared contract of the integer counters.
///
/// The native and lock-backed implementations are interchangeable behind this
/// trait; only their progress guarantees differ.
pub trait AtomicInteger: Default + Send + Sync {
    /// The scalar held by the counter.
    type Value: Copy + PartialEq + std::fmt::Debug + Send + Sync + 'static;

    /// Create a counter holding `val`.
    fn with_value(val: Self::Value) -> Self;

    /// Read the current value.
    fn load(&self) -> Self::Value;

    /// Replace the current value.
    fn store(&self, val: Self::Value);

    /// Add `delta` and return the new value.
    fn add(&self, delta: Self::Value) -> Self::Value;

    /// Subtract `delta` and return the new value.
    fn sub(&self, delta: Self::Value) -> Self::Value;

    /// Add one and return the new value.
    fn increment(&self) -> Self::Value;

    /// Subtract one and return the new value.
    fn decrement(&self) -> Self::Value;

    /// Store `new` if the current value equals `old`.
    ///
    /// Returns `true` when the swap happened.
    fn compare_and_swap(&self, old: Self::Value, new: Self::Value) -> bool;

    /// Store `new` and return the previous value.
    fn swap(&self, new: Self::Value) -> Self::Value;
}
