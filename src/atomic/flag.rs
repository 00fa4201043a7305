//! Boolean flag projected over [`Int32`].

use super::{AtomicInteger, Int32};

/// Atomic boolean stored as `0`/`1` in an [`Int32`].
///
/// Only `1` reads back as `true`.
#[derive(Debug, Default)]
pub struct Bool {
    core: Int32,
}

impl Bool {
    /// Create a flag holding `val`.
    pub const fn new(val: bool) -> Self {
        Self {
            core: Int32::new(encode(val)),
        }
    }

    pub fn load(&self) -> bool {
        decode(self.core.load())
    }

    pub fn store(&self, val: bool) {
        self.core.store(encode(val));
    }

    /// Store `new` if the flag currently equals `old`.
    pub fn compare_and_swap(&self, old: bool, new: bool) -> bool {
        self.core.compare_and_swap(encode(old), encode(new))
    }

    /// Store `new` and return the previous value.
    pub fn swap(&self, new: bool) -> bool {
        decode(self.core.swap(encode(new)))
    }
}

const fn encode(val: bool) -> i32 {
    if val {
        1
    } else {
        0
    }
}

const fn decode(val: i32) -> bool {
    val == 1
}
