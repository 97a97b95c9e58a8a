//! Top-level allocator: ties the arena, registry, placement and coalescing
//! together behind allocate/release/reallocate.
//!
//! All mutable state lives in one [`SegMalloc`] value, so independent heaps
//! can coexist (one per test, one per thread behind the FFI layer).

use crate::arena::{Arena, MemorySource, VecSource};
use crate::block::{self, Tag};
use crate::config::AllocatorConfig;
use crate::error::{AllocError, ArenaError};
use crate::free_list::SegregatedFreeList;
use crate::{DSIZE, MIN_BLOCK_SIZE, WORD_SIZE};

/// Payload offset of an allocated block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeapPtr(usize);

impl HeapPtr {
    /// Wraps a raw payload offset. Validity is checked when the pointer is used.
    pub const fn from_offset(offset: usize) -> Self {
        Self(offset)
    }

    pub const fn offset(self) -> usize {
        self.0
    }
}

/// Segregated-fit allocator over a single growable arena.
pub struct SegMalloc<S = VecSource> {
    pub(crate) arena: Arena<S>,
    pub(crate) free_list: SegregatedFreeList,
    pub(crate) config: AllocatorConfig,
    /// Payload offset of the prologue sentinel.
    pub(crate) heap_listp: usize,
    /// Block the next-fit search resumes after. Always the prologue or a
    /// block boundary.
    pub(crate) rover: usize,
}

impl SegMalloc<VecSource> {
    /// Creates a heap over a fresh [`VecSource`] capped at `config.max_heap`.
    pub fn init(config: AllocatorConfig) -> Result<Self, AllocError> {
        let source = VecSource::with_limit(config.max_heap);
        Self::with_source(source, config)
    }
}

impl<S: MemorySource> SegMalloc<S> {
    /// Lays down the prologue and epilogue in an empty `source`, then extends
    /// the heap with one free block of `config.chunk_size` bytes.
    pub fn with_source(source: S, mut config: AllocatorConfig) -> Result<Self, AllocError> {
        config.chunk_size = config.chunk_size.max(MIN_BLOCK_SIZE).next_multiple_of(DSIZE);
        let mut arena = Arena::new(source);
        let base = arena
            .grow(2 * WORD_SIZE)
            .map_err(|source| AllocError::OutOfMemory {
                requested: 2 * WORD_SIZE,
                source,
            })?;
        // One-word prologue: its header and footer are the same word.
        arena.put(base, Tag::pack(WORD_SIZE, true));
        arena.write_epilogue(base + DSIZE);

        let mut heap = Self {
            arena,
            free_list: SegregatedFreeList::new(),
            heap_listp: base + WORD_SIZE,
            rover: base + WORD_SIZE,
            config,
        };
        let chunk = heap.config.chunk_size;
        heap.extend_heap(chunk / WORD_SIZE)
            .map_err(|source| AllocError::OutOfMemory {
                requested: chunk,
                source,
            })?;
        tracing::debug!(chunk, policy = ?heap.config.fit_policy, "heap initialized");
        heap.after_op("init");
        Ok(heap)
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// The underlying arena.
    pub fn arena(&self) -> &Arena<S> {
        &self.arena
    }

    /// Allocates a block with at least `size` payload bytes.
    ///
    /// `size == 0` is not an error: it returns `Ok(None)` and leaves the heap
    /// untouched.
    pub fn allocate(&mut self, size: usize) -> Result<Option<HeapPtr>, AllocError> {
        if size == 0 {
            return Ok(None);
        }
        let bp = self.allocate_block(size)?;
        self.after_op("allocate");
        Ok(Some(HeapPtr(bp)))
    }

    /// Frees `ptr`, merging it with free neighbors. `None` is ignored.
    pub fn release(&mut self, ptr: Option<HeapPtr>) -> Result<(), AllocError> {
        let Some(ptr) = ptr else {
            return Ok(());
        };
        let bp = self.validate(ptr)?;
        self.release_block(bp);
        self.after_op("release");
        Ok(())
    }

    /// Moves `ptr` into a fresh block of at least `size` payload bytes.
    ///
    /// `ptr == None` behaves as `allocate(size)`, `size == 0` as
    /// `release(ptr)` returning `None`. Otherwise a new block is always
    /// allocated, the first `min(old payload, size)` bytes are copied, and the
    /// old block is released. If allocation fails the old block is untouched.
    pub fn reallocate(
        &mut self,
        ptr: Option<HeapPtr>,
        size: usize,
    ) -> Result<Option<HeapPtr>, AllocError> {
        let Some(old) = ptr else {
            return self.allocate(size);
        };
        if size == 0 {
            self.release(Some(old))?;
            return Ok(None);
        }

        let old_bp = self.validate(old)?;
        let old_payload = block::payload_size(self.arena.block_size(old_bp));
        let new_bp = self.allocate_block(size)?;

        let copy_size = old_payload.min(size);
        self.arena
            .bytes_mut()
            .copy_within(old_bp..old_bp + copy_size, new_bp);
        self.release_block(old_bp);

        tracing::trace!(old = old_bp, new = new_bp, copy_size, "block reallocated");
        self.after_op("reallocate");
        Ok(Some(HeapPtr(new_bp)))
    }

    /// Payload bytes of an allocated block.
    pub fn payload(&self, ptr: HeapPtr) -> Result<&[u8], AllocError> {
        let bp = self.validate(ptr)?;
        let len = block::payload_size(self.arena.block_size(bp));
        Ok(&self.arena.bytes()[bp..bp + len])
    }

    /// Payload bytes of an allocated block, mutably.
    pub fn payload_mut(&mut self, ptr: HeapPtr) -> Result<&mut [u8], AllocError> {
        let bp = self.validate(ptr)?;
        let len = block::payload_size(self.arena.block_size(bp));
        Ok(&mut self.arena.bytes_mut()[bp..bp + len])
    }

    /// Block size for a `size`-byte request: header and footer overhead,
    /// at least the minimum block, rounded up to a double word.
    pub fn adjust_size(size: usize) -> Result<usize, AllocError> {
        size.checked_add(2 * WORD_SIZE)
            .map(|total| total.max(MIN_BLOCK_SIZE))
            .and_then(|total| total.checked_next_multiple_of(DSIZE))
            .ok_or(AllocError::Overflow { size })
    }

    fn allocate_block(&mut self, size: usize) -> Result<usize, AllocError> {
        let asize = Self::adjust_size(size)?;

        let bp = match self.find_fit(asize) {
            Some(bp) => bp,
            None => {
                let extend = asize.max(self.config.chunk_size);
                self.extend_heap(extend / WORD_SIZE).map_err(|source| {
                    tracing::warn!(size, asize, error = %source, "out of memory");
                    AllocError::OutOfMemory {
                        requested: asize,
                        source,
                    }
                })?
            }
        };
        self.place(bp, asize);
        Ok(bp)
    }

    fn release_block(&mut self, bp: usize) {
        let size = self.arena.block_size(bp);
        self.arena.write_tags(bp, size, false);
        let bp = self.coalesce(bp);
        let size = self.arena.block_size(bp);
        self.free_list.reattach(bp, size);
    }

    /// Extends the heap by `words` words (rounded up to an even count) with a
    /// new free block, merges it with a free trailing block and files it.
    pub(crate) fn extend_heap(&mut self, words: usize) -> Result<usize, ArenaError> {
        let words = if words % 2 == 1 { words + 1 } else { words };
        let size = words * WORD_SIZE;

        // The new block's header overwrites the old epilogue.
        let bp = self.arena.grow(size)?;
        self.arena.write_tags(bp, size, false);
        let end = self.arena.next_blkp(bp);
        self.arena.write_epilogue(end);

        let bp = self.coalesce(bp);
        let size = self.arena.block_size(bp);
        self.free_list.push(bp, size);
        Ok(bp)
    }

    /// Every block between the prologue and the epilogue, in address order.
    pub(crate) fn blocks(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks_from(self.heap_listp + WORD_SIZE)
    }

    /// Blocks from `start` up to the epilogue, in address order.
    pub(crate) fn blocks_from(&self, start: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(start), |&bp| Some(self.arena.next_blkp(bp)))
            .take_while(|&bp| self.arena.block_size(bp) > 0)
    }

    /// Checks that `ptr` names an allocated block inside the heap.
    fn validate(&self, ptr: HeapPtr) -> Result<usize, AllocError> {
        let bp = ptr.0;
        let invalid = AllocError::InvalidPointer { offset: bp };
        let first = self.heap_listp + WORD_SIZE;
        if bp < first || bp % DSIZE != 0 || bp >= self.arena.len() {
            return Err(invalid);
        }
        let header = self.arena.header(bp);
        let in_bounds = bp
            .checked_add(header.size)
            .is_some_and(|end| end <= self.arena.len());
        if !header.allocated || header.size < MIN_BLOCK_SIZE || !in_bounds {
            return Err(invalid);
        }
        if self.arena.word(self.arena.ftrp(bp)) != Tag::pack(header.size, true) {
            return Err(invalid);
        }
        Ok(bp)
    }

    /// Post-operation consistency hook.
    fn after_op(&self, op: &'static str) {
        if self.config.check_each_op {
            let violations = self.check(false);
            if !violations.is_empty() {
                tracing::warn!(op, count = violations.len(), "heap consistency check failed");
            }
        }
        cfg_if::cfg_if! {
            if #[cfg(all(feature = "debug", debug_assertions))] {
                let violations = self.check(false);
                debug_assert!(
                    violations.is_empty(),
                    "heap inconsistent after {op}: {violations:?}"
                );
            }
        }
    }
}
