//! Placement engine: picks a free block for a request and splits it.

use crate::allocator::SegMalloc;
use crate::arena::MemorySource;
use crate::config::FitPolicy;
use crate::size_class::{self, LAST_CLASS, NUM_SIZE_CLASSES};
use crate::MIN_BLOCK_SIZE;

impl<S: MemorySource> SegMalloc<S> {
    /// Finds a free block of at least `asize` bytes, or `None` when the heap
    /// must grow.
    pub(crate) fn find_fit(&mut self, asize: usize) -> Option<usize> {
        match self.config.fit_policy {
            FitPolicy::Segregated => self.segregated_fit(asize),
            FitPolicy::FirstFit => self.first_fit(asize),
            FitPolicy::BestFit => best_fit(self.blocks(), |bp| self.free_size(bp), asize),
            FitPolicy::NextFit => self.next_fit(asize),
            FitPolicy::ExplicitFirstFit => self
                .listed_blocks()
                .find(|&bp| self.arena.block_size(bp) >= asize),
            FitPolicy::ExplicitBestFit => {
                best_fit(self.listed_blocks(), |bp| Some(self.arena.block_size(bp)), asize)
            }
        }
    }

    /// Head of the first non-empty bucket whose class guarantees `asize`.
    ///
    /// The class cursor starts at the request's first qualifying class and
    /// only moves upward during this scan; nothing carries over between
    /// calls. Members of a qualifying class are large enough by
    /// construction, so nodes are not inspected. Requests beyond every
    /// class guarantee fall back to a size-checked walk of the overflow
    /// bucket.
    fn segregated_fit(&self, asize: usize) -> Option<usize> {
        let Some(start) = size_class::first_qualifying(asize) else {
            return self
                .free_list
                .iter_class(LAST_CLASS)
                .find(|&bp| self.arena.block_size(bp) >= asize);
        };

        let mut cursor = start;
        while cursor < NUM_SIZE_CLASSES {
            if let Some(bp) = self.free_list.head(cursor) {
                tracing::trace!(asize, class = cursor, bp, "segregated fit");
                return Some(bp);
            }
            cursor += 1;
        }
        None
    }

    /// First free block in address order with room for `asize`.
    fn first_fit(&self, asize: usize) -> Option<usize> {
        self.blocks()
            .find(|&bp| self.free_size(bp).is_some_and(|size| size >= asize))
    }

    /// First fit starting just past the rover, wrapping to the heap start.
    ///
    /// The rover moves to the block found, or back to the prologue on a miss.
    fn next_fit(&mut self, asize: usize) -> Option<usize> {
        let fits = |bp: usize| self.free_size(bp).is_some_and(|size| size >= asize);
        let start = self.arena.next_blkp(self.rover);
        let found = self
            .blocks_from(start)
            .find(|&bp| fits(bp))
            .or_else(|| {
                self.blocks()
                    .take_while(|&bp| bp <= self.rover)
                    .find(|&bp| fits(bp))
            });
        self.rover = found.unwrap_or(self.heap_listp);
        if let Some(bp) = found {
            tracing::trace!(asize, bp, "next fit");
        }
        found
    }

    /// Every listed block, bucket by bucket, each bucket head first.
    fn listed_blocks(&self) -> impl Iterator<Item = usize> + '_ {
        (0..NUM_SIZE_CLASSES).flat_map(|cls| self.free_list.iter_class(cls))
    }

    /// Size of `bp` if it is free.
    fn free_size(&self, bp: usize) -> Option<usize> {
        let tag = self.arena.header(bp);
        (!tag.allocated).then_some(tag.size)
    }

    /// Allocates `asize` bytes at the start of free block `bp`.
    ///
    /// The block leaves its bucket. A remainder of at least
    /// [`MIN_BLOCK_SIZE`] becomes a new free block filed by its own size;
    /// anything smaller stays inside the allocated block.
    pub(crate) fn place(&mut self, bp: usize, asize: usize) {
        let csize = self.arena.block_size(bp);
        debug_assert!(csize >= asize, "block {bp} of {csize} bytes cannot hold {asize}");
        self.free_list.unlink(bp);

        if csize - asize >= MIN_BLOCK_SIZE {
            self.arena.write_tags(bp, asize, true);
            let rest = self.arena.next_blkp(bp);
            self.arena.write_tags(rest, csize - asize, false);
            self.free_list.push(rest, csize - asize);
            tracing::trace!(bp, asize, rest, remainder = csize - asize, "split free block");
        } else {
            self.arena.write_tags(bp, csize, true);
            tracing::trace!(bp, asize, slack = csize - asize, "placed whole block");
        }
    }
}

/// Smallest candidate with room for `asize`; an exact match ends the search.
fn best_fit(
    candidates: impl Iterator<Item = usize>,
    free_size: impl Fn(usize) -> Option<usize>,
    asize: usize,
) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for bp in candidates {
        let Some(size) = free_size(bp).filter(|&size| size >= asize) else {
            continue;
        };
        if size == asize {
            return Some(bp);
        }
        if best.is_none_or(|(_, best_size)| size < best_size) {
            best = Some((bp, size));
        }
    }
    best.map(|(bp, _)| bp)
}
