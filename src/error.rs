//! Error types for the allocator.
//!
//! `ArenaError` comes from the backing memory source, `AllocError` is what the
//! public API surfaces, and `InvariantViolation` is only ever produced by the
//! consistency checker.

use thiserror::Error;

/// Failure to grow the backing arena.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    /// The memory source cannot supply the requested bytes.
    #[error("arena exhausted: requested {requested} bytes, {remaining} bytes remaining")]
    Exhausted {
        /// Bytes asked for.
        requested: usize,
        /// Bytes still available before the source's limit.
        remaining: usize,
    },

    /// The backing region could not be reserved.
    #[error("cannot reserve a {limit}-byte backing region")]
    Reserve {
        /// Requested ceiling.
        limit: usize,
    },

    /// Growth must be a whole number of double words.
    #[error("arena growth of {requested} bytes is not a multiple of the double word")]
    Misaligned {
        /// Bytes asked for.
        requested: usize,
    },
}

/// Errors returned by the allocator API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// The arena could not grow to satisfy the request. Never retried internally.
    #[error("out of memory: cannot grow the arena for a {requested}-byte block")]
    OutOfMemory {
        /// Adjusted block size that triggered the growth.
        requested: usize,
        /// Why the arena refused to grow.
        #[source]
        source: ArenaError,
    },

    /// The offset does not name a live allocated block.
    #[error("offset {offset} does not name an allocated block")]
    InvalidPointer {
        /// The rejected payload offset.
        offset: usize,
    },

    /// Adding block overhead to the request overflowed.
    #[error("request of {size} bytes overflows the maximum block size")]
    Overflow {
        /// The requested payload size.
        size: usize,
    },
}

/// A broken heap invariant, reported by [`SegMalloc::check`](crate::SegMalloc::check).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// The prologue sentinel is not a one-word allocated block.
    #[error("bad prologue tag at offset {offset}")]
    BadPrologue {
        /// Offset of the prologue tag.
        offset: usize,
    },

    /// The address-order walk did not end on a zero-size allocated tag at the arena end.
    #[error("bad epilogue tag at offset {offset}")]
    BadEpilogue {
        /// Offset of the tag where the walk stopped.
        offset: usize,
    },

    /// Header and footer encodings differ.
    #[error("block {offset}: header {header:#x} does not match footer {footer:#x}")]
    HeaderFooterMismatch {
        /// Payload offset of the block.
        offset: usize,
        /// Raw header word.
        header: usize,
        /// Raw footer word.
        footer: usize,
    },

    /// Payload offset is not double-word aligned, or block size is not a
    /// multiple of the double word.
    #[error("block {offset} is not double-word aligned (size {size})")]
    Misaligned {
        /// Payload offset of the block.
        offset: usize,
        /// Encoded block size.
        size: usize,
    },

    /// A block extends beyond the arena, or is smaller than the minimum block.
    #[error("block {offset} of size {size} does not fit the arena")]
    OutOfBounds {
        /// Payload offset of the block.
        offset: usize,
        /// Encoded block size.
        size: usize,
    },

    /// Two consecutive blocks in address order are both free.
    #[error("free blocks {first} and {second} are adjacent")]
    AdjacentFree {
        /// The lower of the two blocks.
        first: usize,
        /// The block right after it.
        second: usize,
    },

    /// A free block is not reachable from any bucket.
    #[error("free block {offset} is not in any bucket")]
    UnlistedFreeBlock {
        /// Payload offset of the block.
        offset: usize,
    },

    /// A bucket holds a block whose tags say it is allocated.
    #[error("bucket {class} holds allocated block {offset}")]
    AllocatedInFreeList {
        /// Bucket index.
        class: usize,
        /// Payload offset of the block.
        offset: usize,
    },

    /// A free-list node links to itself.
    #[error("free block {offset} links to itself")]
    SelfLink {
        /// Payload offset of the block.
        offset: usize,
    },

    /// `next.prev` does not point back at the node (or the head has a prev).
    #[error("free block {offset} has asymmetric links")]
    AsymmetricLink {
        /// Payload offset of the block.
        offset: usize,
    },

    /// A node sits in a bucket other than the one its size selects.
    #[error("free block {offset} of size {size} filed in bucket {class}")]
    WrongBucket {
        /// Payload offset of the block.
        offset: usize,
        /// Encoded block size.
        size: usize,
        /// Bucket it was found in.
        class: usize,
    },

    /// A node is reachable more than once across the buckets.
    #[error("free block {offset} is reachable more than once")]
    DuplicateMembership {
        /// Payload offset of the block.
        offset: usize,
    },

    /// The next-fit rover points at neither the prologue nor a block boundary.
    #[error("next-fit rover {offset} is not a block boundary")]
    DanglingRover {
        /// Offset the rover holds.
        offset: usize,
    },

    /// Block sizes plus sentinels do not add up to the bytes the arena granted.
    #[error("blocks account for {accounted} bytes but the arena granted {granted}")]
    SizeMismatch {
        /// Sum of all block sizes and sentinel words.
        accounted: usize,
        /// Total bytes granted by the arena manager.
        granted: usize,
    },
}
