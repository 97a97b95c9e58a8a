//! Runtime configuration for a [`SegMalloc`](crate::SegMalloc) instance.

use crate::{CHUNK_SIZE, DSIZE, MAX_HEAP, MIN_BLOCK_SIZE};

/// How the placement engine picks a free block for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FitPolicy {
    /// Head of the first non-empty bucket whose class guarantees the size.
    #[default]
    Segregated,
    /// First free block in address order that is large enough.
    FirstFit,
    /// Smallest adequate free block in address order; exact matches win early.
    BestFit,
    /// First fit that resumes after the block it last returned and wraps
    /// around to the heap start.
    NextFit,
    /// First adequate block found walking the buckets, head first.
    ExplicitFirstFit,
    /// Smallest adequate block found walking the buckets.
    ExplicitBestFit,
}

/// Allocator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Minimum heap extension on a miss, and the size of the initial free block.
    pub chunk_size: usize,
    /// Ceiling of the default [`VecSource`](crate::VecSource).
    pub max_heap: usize,
    /// Placement policy.
    pub fit_policy: FitPolicy,
    /// Run the consistency checker after every public operation and log failures.
    pub check_each_op: bool,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            max_heap: MAX_HEAP,
            fit_policy: FitPolicy::Segregated,
            check_each_op: false,
        }
    }
}

impl AllocatorConfig {
    /// Chunk size, rounded up to a double word and at least one minimum block.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(MIN_BLOCK_SIZE).next_multiple_of(DSIZE);
        self
    }

    pub fn with_max_heap(mut self, max_heap: usize) -> Self {
        self.max_heap = max_heap;
        self
    }

    pub fn with_fit_policy(mut self, fit_policy: FitPolicy) -> Self {
        self.fit_policy = fit_policy;
        self
    }

    pub fn with_check_each_op(mut self, check_each_op: bool) -> Self {
        self.check_each_op = check_each_op;
        self
    }
}
