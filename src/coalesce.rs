//! Coalescing engine: boundary-tag merge of a freed block with its neighbors.

use crate::allocator::SegMalloc;
use crate::arena::MemorySource;
use crate::DSIZE;

impl<S: MemorySource> SegMalloc<S> {
    /// Merges the just-freed block `bp` with whichever address-order
    /// neighbors are free and returns the surviving block.
    ///
    /// `bp` must carry free tags and must not be in the registry. Absorbed
    /// neighbors are unlinked from their buckets; the survivor is left for
    /// the caller to file, keyed by its merged size. A backward merge moves
    /// the block's identity to the previous block's offset.
    ///
    /// A next-fit rover left inside the merged block moves to its start.
    pub(crate) fn coalesce(&mut self, bp: usize) -> usize {
        let prev = self.arena.prev_blkp(bp);
        // A predecessor that resolves to the block itself counts as allocated.
        let prev_alloc = prev == bp || self.arena.tag(bp - DSIZE).allocated;
        let next = self.arena.next_blkp(bp);
        let next_alloc = self.arena.header(next).allocated;
        let mut size = self.arena.block_size(bp);

        match (prev_alloc, next_alloc) {
            (true, true) => bp,
            (true, false) => {
                size += self.arena.block_size(next);
                self.free_list.unlink(next);
                self.arena.write_tags(bp, size, false);
                if self.rover == next {
                    self.rover = bp;
                }
                tracing::trace!(bp, next, size, "merged with next block");
                bp
            }
            (false, true) => {
                size += self.arena.block_size(prev);
                self.free_list.unlink(prev);
                self.arena.write_tags(prev, size, false);
                if self.rover == bp {
                    self.rover = prev;
                }
                tracing::trace!(bp, prev, size, "merged with previous block");
                prev
            }
            (false, false) => {
                size += self.arena.block_size(prev) + self.arena.block_size(next);
                self.free_list.unlink(prev);
                self.free_list.unlink(next);
                self.arena.write_tags(prev, size, false);
                if self.rover == bp || self.rover == next {
                    self.rover = prev;
                }
                tracing::trace!(bp, prev, next, size, "merged with both neighbors");
                prev
            }
        }
    }
}
