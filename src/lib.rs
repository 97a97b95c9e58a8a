//! segmalloc: a segregated-fit, boundary-tag memory allocator.
//!
//! Manages a single growable byte arena and hands out payload offsets into it.
//! The design has five layers:
//! - Arena manager (monotonic growth from a [`MemorySource`])
//! - Block layout (header/footer boundary tags, neighbor arithmetic)
//! - Free-list registry (size-class buckets of doubly linked free blocks)
//! - Placement engine (segregated fit + splitting)
//! - Coalescing engine (immediate merge with free neighbors on release)
//!
//! # Usage
//!
//! ```
//! use segmalloc::{AllocatorConfig, SegMalloc};
//!
//! let mut heap = SegMalloc::init(AllocatorConfig::default()).unwrap();
//! let ptr = heap.allocate(100).unwrap().unwrap();
//! heap.payload_mut(ptr).unwrap()[..5].copy_from_slice(b"hello");
//! heap.release(Some(ptr)).unwrap();
//! assert!(heap.check(false).is_empty());
//! ```
//!
//! The allocator is single-threaded: every operation takes `&mut self` and
//! runs to completion.

pub mod error;
pub mod config;
pub mod arena;
pub mod block;
pub mod size_class;
pub mod free_list;
pub mod placement;
pub mod coalesce;
pub mod checker;
pub mod allocator;
#[cfg(feature = "ffi")]
pub mod ffi;

/// Word size (bytes): header, footer and link fields are one word each.
pub const WORD_SIZE: usize = core::mem::size_of::<usize>();

/// Double word: the block granularity and payload alignment.
pub const DSIZE: usize = 2 * WORD_SIZE;

/// Default amount the heap is extended by when no fit is found (bytes).
pub const CHUNK_SIZE: usize = 1 << 12;

/// Smallest block: header, two free-list link words, one payload word, footer.
pub const MIN_BLOCK_SIZE: usize = 5 * WORD_SIZE;

/// Default ceiling for the backing arena (20 MiB).
pub const MAX_HEAP: usize = 20 * (1 << 20);

pub use allocator::{HeapPtr, SegMalloc};
pub use arena::{Arena, MemorySource, RawRegion, VecSource};
pub use checker::HeapStats;
pub use config::{AllocatorConfig, FitPolicy};
pub use error::{AllocError, ArenaError, InvariantViolation};
