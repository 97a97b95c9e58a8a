//! Block layout and boundary tags.
//!
//! Every block is addressed by its payload offset `bp`:
//!
//! ```text
//!   bp - W          bp                                 bp + size - D
//!   ┌────────┬─────────────────────────────────────────┬────────┐
//!   │ header │ payload (free: reserved link words last) │ footer │
//!   └────────┴─────────────────────────────────────────┴────────┘
//!   size|a                                               size|a
//! ```
//!
//! Header and footer always carry the same encoded word, which gives O(1)
//! forward (header size) and backward (previous footer size) traversal.

use crate::arena::{Arena, MemorySource};
use crate::{DSIZE, WORD_SIZE};

/// Allocated flag, stored in the low bit of a tag.
pub const ALLOC_BIT: usize = 0x1;

const SIZE_MASK: usize = !(WORD_SIZE - 1);

/// Decoded boundary tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub size: usize,
    pub allocated: bool,
}

impl Tag {
    /// Packs a size and allocated flag into one word.
    #[inline]
    pub const fn pack(size: usize, allocated: bool) -> usize {
        size | (allocated as usize)
    }

    #[inline]
    pub const fn unpack(word: usize) -> Self {
        Self {
            size: word & SIZE_MASK,
            allocated: word & ALLOC_BIT != 0,
        }
    }
}

/// Payload bytes available in a block of `size` bytes.
#[inline]
pub const fn payload_size(size: usize) -> usize {
    size - 2 * WORD_SIZE
}

/// Header offset of block `bp`.
#[inline]
pub const fn hdrp(bp: usize) -> usize {
    bp - WORD_SIZE
}

impl<S: MemorySource> Arena<S> {
    #[inline]
    pub fn tag(&self, offset: usize) -> Tag {
        Tag::unpack(self.word(offset))
    }

    #[inline]
    pub fn header(&self, bp: usize) -> Tag {
        self.tag(hdrp(bp))
    }

    #[inline]
    pub fn block_size(&self, bp: usize) -> usize {
        self.header(bp).size
    }

    #[inline]
    pub fn is_allocated(&self, bp: usize) -> bool {
        self.header(bp).allocated
    }

    /// Footer offset of block `bp`, located through its header size.
    #[inline]
    pub fn ftrp(&self, bp: usize) -> usize {
        bp + self.block_size(bp) - DSIZE
    }

    #[inline]
    pub fn footer(&self, bp: usize) -> Tag {
        self.tag(self.ftrp(bp))
    }

    /// Next block in address order.
    #[inline]
    pub fn next_blkp(&self, bp: usize) -> usize {
        bp + self.block_size(bp)
    }

    /// Previous block in address order, located through its footer.
    ///
    /// Resolves to `bp` itself when the preceding footer encodes size 0.
    #[inline]
    pub fn prev_blkp(&self, bp: usize) -> usize {
        bp - self.tag(bp - DSIZE).size
    }

    /// Stamps identical header and footer tags on block `bp`.
    pub fn write_tags(&mut self, bp: usize, size: usize, allocated: bool) {
        let tag = Tag::pack(size, allocated);
        self.put(hdrp(bp), tag);
        self.put(bp + size - DSIZE, tag);
    }

    /// Stamps a zero-size allocated epilogue tag at the header slot of `bp`.
    pub fn write_epilogue(&mut self, bp: usize) {
        self.put(hdrp(bp), Tag::pack(0, true));
    }
}
