//! Size class table and lookup functions.
//!
//! Bucket `i` nominally holds blocks up to `MIN_BLOCK_SIZE << i` bytes. A block
//! is filed in the smallest class whose capacity strictly exceeds its size, so
//! every block in class `i > 0` is at least `class_capacity(i - 1)` bytes. The
//! last class also takes every block too large for the table.
//!
//! The smallest adjusted request is `MIN_BLOCK_SIZE` rounded up to a double
//! word (6 words), more than class 1 guarantees, so the segregated search
//! never starts below class 2. Blocks filed in classes 0 and 1 are only
//! reused once coalescing merges them into a larger block, or by the
//! address-order and bucket-walking fit policies.

use crate::MIN_BLOCK_SIZE;

/// Number of segregated buckets.
pub const NUM_SIZE_CLASSES: usize = 20;

/// Nominal capacity of each class.
pub static CLASS_CAPACITY: [usize; NUM_SIZE_CLASSES] = const {
    let mut table = [0usize; NUM_SIZE_CLASSES];
    let mut i = 0;
    while i < NUM_SIZE_CLASSES {
        table[i] = MIN_BLOCK_SIZE << i;
        i += 1;
    }
    table
};

/// Index of the last (overflow) class.
pub const LAST_CLASS: usize = NUM_SIZE_CLASSES - 1;

/// Class a block of `size` bytes is filed under.
#[inline]
pub fn class_of(size: usize) -> usize {
    let mut cls = 0;
    while cls < LAST_CLASS {
        if CLASS_CAPACITY[cls] > size {
            return cls;
        }
        cls += 1;
    }
    LAST_CLASS
}

#[inline]
pub fn class_capacity(cls: usize) -> usize {
    CLASS_CAPACITY[cls]
}

/// Smallest block size any member of class `cls` can have.
#[inline]
pub fn guaranteed_size(cls: usize) -> usize {
    if cls == 0 { 0 } else { CLASS_CAPACITY[cls - 1] }
}

/// First class whose every member is at least `asize` bytes.
///
/// Returns `None` when even the overflow class makes no such guarantee; such
/// requests must check node sizes in the overflow class.
#[inline]
pub fn first_qualifying(asize: usize) -> Option<usize> {
    (1..NUM_SIZE_CLASSES).find(|&cls| guaranteed_size(cls) >= asize)
}
