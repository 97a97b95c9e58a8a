//! Free-list registry: one doubly linked LIFO list per size class.
//!
//! Link metadata lives in a side table keyed by the free block's payload
//! offset rather than inside the block itself. A block has an entry exactly
//! while it is a member of some bucket, so the links of an allocated block
//! cannot be read.

use std::collections::HashMap;

use crate::size_class::{self, NUM_SIZE_CLASSES};

/// Registry links of one free block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Links {
    pub prev: Option<usize>,
    pub next: Option<usize>,
    /// Bucket the block was filed in.
    pub class: usize,
}

/// Segregated free lists.
pub struct SegregatedFreeList {
    heads: [Option<usize>; NUM_SIZE_CLASSES],
    lengths: [usize; NUM_SIZE_CLASSES],
    links: HashMap<usize, Links>,
}

impl Default for SegregatedFreeList {
    fn default() -> Self {
        Self::new()
    }
}

impl SegregatedFreeList {
    pub fn new() -> Self {
        Self {
            heads: [None; NUM_SIZE_CLASSES],
            lengths: [0; NUM_SIZE_CLASSES],
            links: HashMap::new(),
        }
    }

    #[inline]
    pub fn head(&self, cls: usize) -> Option<usize> {
        self.heads[cls]
    }

    #[inline]
    pub fn links(&self, bp: usize) -> Option<Links> {
        self.links.get(&bp).copied()
    }

    #[inline]
    pub fn contains(&self, bp: usize) -> bool {
        self.links.contains_key(&bp)
    }

    /// Number of blocks in bucket `cls`.
    pub fn class_len(&self, cls: usize) -> usize {
        self.lengths[cls]
    }

    /// Mutable links of `bp`, for corrupting the registry in checker tests.
    #[cfg(test)]
    pub(crate) fn links_mut(&mut self, bp: usize) -> Option<&mut Links> {
        self.links.get_mut(&bp)
    }

    /// Total number of free blocks across all buckets.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Pushes free block `bp` of `size` bytes at the head of its bucket.
    pub fn push(&mut self, bp: usize, size: usize) {
        debug_assert!(!self.contains(bp), "block {bp} is already listed");
        let cls = size_class::class_of(size);
        let head = self.heads[cls];
        if let Some(head) = head {
            if let Some(links) = self.links.get_mut(&head) {
                links.prev = Some(bp);
            }
        }
        self.links.insert(
            bp,
            Links {
                prev: None,
                next: head,
                class: cls,
            },
        );
        self.heads[cls] = Some(bp);
        self.lengths[cls] += 1;
    }

    /// Removes `bp` from its bucket, patching both neighbors. Advances the
    /// bucket head when `bp` was the head. Returns the links it had.
    pub fn unlink(&mut self, bp: usize) -> Option<Links> {
        let links = self.links.remove(&bp)?;
        match links.prev {
            Some(prev) => {
                if let Some(prev_links) = self.links.get_mut(&prev) {
                    prev_links.next = links.next;
                }
            }
            None => self.heads[links.class] = links.next,
        }
        if let Some(next) = links.next {
            if let Some(next_links) = self.links.get_mut(&next) {
                next_links.prev = links.prev;
            }
        }
        self.lengths[links.class] -= 1;
        Some(links)
    }

    /// Files `bp` under the bucket its current `size` selects, unlinking it
    /// first if it is already a member somewhere.
    pub fn reattach(&mut self, bp: usize, size: usize) {
        self.unlink(bp);
        self.push(bp, size);
    }

    /// Walks bucket `cls` from its head.
    pub fn iter_class(&self, cls: usize) -> ClassIter<'_> {
        ClassIter {
            list: self,
            cursor: self.heads[cls],
        }
    }
}

/// Iterator over one bucket, head first.
pub struct ClassIter<'a> {
    list: &'a SegregatedFreeList,
    cursor: Option<usize>,
}

impl Iterator for ClassIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let bp = self.cursor?;
        self.cursor = self.list.links.get(&bp).and_then(|links| links.next);
        Some(bp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MIN_BLOCK_SIZE;

    const SMALL: usize = MIN_BLOCK_SIZE;
    const LARGE: usize = MIN_BLOCK_SIZE * 8;

    fn collect(list: &SegregatedFreeList, cls: usize) -> Vec<usize> {
        list.iter_class(cls).collect()
    }

    #[test]
    fn test_push_is_lifo() {
        let mut list = SegregatedFreeList::new();
        let cls = size_class::class_of(SMALL);
        list.push(100, SMALL);
        list.push(200, SMALL);
        list.push(300, SMALL);
        assert_eq!(collect(&list, cls), vec![300, 200, 100]);
        assert_eq!(list.head(cls), Some(300));
        assert_eq!(list.class_len(cls), 3);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_links_are_symmetric() {
        let mut list = SegregatedFreeList::new();
        list.push(100, SMALL);
        list.push(200, SMALL);
        let head = list.links(200).unwrap();
        let tail = list.links(100).unwrap();
        assert_eq!(head.prev, None);
        assert_eq!(head.next, Some(100));
        assert_eq!(tail.prev, Some(200));
        assert_eq!(tail.next, None);
    }

    #[test]
    fn test_unlink_head_middle_tail() {
        let mut list = SegregatedFreeList::new();
        let cls = size_class::class_of(SMALL);
        for bp in [100, 200, 300, 400] {
            list.push(bp, SMALL);
        }

        // Middle.
        list.unlink(300).unwrap();
        assert_eq!(collect(&list, cls), vec![400, 200, 100]);
        assert_eq!(list.links(200).unwrap().prev, Some(400));

        // Head advances.
        list.unlink(400).unwrap();
        assert_eq!(list.head(cls), Some(200));
        assert_eq!(list.links(200).unwrap().prev, None);

        // Tail.
        list.unlink(100).unwrap();
        assert_eq!(collect(&list, cls), vec![200]);
        assert_eq!(list.links(200).unwrap().next, None);

        list.unlink(200).unwrap();
        assert_eq!(list.head(cls), None);
        assert!(list.is_empty());
        assert_eq!(list.class_len(cls), 0);
    }

    #[test]
    fn test_unlink_missing() {
        let mut list = SegregatedFreeList::new();
        assert_eq!(list.unlink(100), None);
    }

    #[test]
    fn test_reattach_moves_between_classes() {
        let mut list = SegregatedFreeList::new();
        let small = size_class::class_of(SMALL);
        let large = size_class::class_of(LARGE);
        assert_ne!(small, large);

        list.push(100, SMALL);
        list.push(200, SMALL);
        list.reattach(100, LARGE);
        assert_eq!(collect(&list, small), vec![200]);
        assert_eq!(collect(&list, large), vec![100]);
        assert_eq!(list.links(100).unwrap().class, large);

        // Reattaching an unlisted block is a plain push.
        list.reattach(300, LARGE);
        assert_eq!(collect(&list, large), vec![300, 100]);
    }
}
