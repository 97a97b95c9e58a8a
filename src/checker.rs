//! Heap consistency checker and statistics.
//!
//! Diagnostic only: nothing here runs on the allocation path unless
//! `check_each_op` or the `debug` feature asks for it.

use std::collections::HashSet;

use crate::allocator::SegMalloc;
use crate::arena::MemorySource;
use crate::block::Tag;
use crate::error::InvariantViolation;
use crate::size_class::{self, NUM_SIZE_CLASSES};
use crate::{DSIZE, MIN_BLOCK_SIZE, WORD_SIZE};

/// Totals from an address-order walk of the heap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Arena length, sentinels included.
    pub heap_bytes: usize,
    pub free_bytes: usize,
    pub allocated_bytes: usize,
    pub free_blocks: usize,
    pub allocated_blocks: usize,
}

impl<S: MemorySource> SegMalloc<S> {
    /// Validates every boundary tag, the sentinels, alignment, conservation
    /// and every bucket, returning all violations found.
    ///
    /// Each violation is logged at `warn`. With `verbose`, every block is
    /// also dumped at `debug`.
    pub fn check(&self, verbose: bool) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();
        let free_blocks = self.check_blocks(verbose, &mut violations);
        self.check_buckets(&free_blocks, &mut violations);

        for violation in &violations {
            tracing::warn!(%violation, "heap invariant violated");
        }
        violations
    }

    /// Address-order totals.
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            heap_bytes: self.arena.len(),
            ..HeapStats::default()
        };
        for bp in self.blocks() {
            let tag = self.arena.header(bp);
            if tag.allocated {
                stats.allocated_bytes += tag.size;
                stats.allocated_blocks += 1;
            } else {
                stats.free_bytes += tag.size;
                stats.free_blocks += 1;
            }
        }
        stats
    }

    /// Walks the heap in address order. Returns the free blocks seen.
    fn check_blocks(
        &self,
        verbose: bool,
        violations: &mut Vec<InvariantViolation>,
    ) -> HashSet<usize> {
        let len = self.arena.len();
        let mut free_blocks = HashSet::new();

        let prologue = self.heap_listp - WORD_SIZE;
        if self.arena.try_word(prologue) != Some(Tag::pack(WORD_SIZE, true)) {
            violations.push(InvariantViolation::BadPrologue { offset: prologue });
        }
        if verbose {
            tracing::debug!(start = self.heap_listp, len, "heap");
        }

        // Prologue word plus epilogue word.
        let mut accounted = 2 * WORD_SIZE;
        let mut prev_free: Option<usize> = None;
        let mut rover_seen = self.rover == self.heap_listp;
        let mut bp = self.heap_listp + WORD_SIZE;
        loop {
            let Some(header) = self.arena.try_word(bp - WORD_SIZE) else {
                violations.push(InvariantViolation::BadEpilogue {
                    offset: bp - WORD_SIZE,
                });
                break;
            };
            let header = Tag::unpack(header);
            if header.size == 0 {
                if !header.allocated || bp != len {
                    violations.push(InvariantViolation::BadEpilogue {
                        offset: bp - WORD_SIZE,
                    });
                }
                if verbose {
                    tracing::debug!(bp, "end of heap");
                }
                break;
            }

            let in_bounds = bp.checked_add(header.size).is_some_and(|end| end <= len);
            if header.size < MIN_BLOCK_SIZE || !in_bounds {
                violations.push(InvariantViolation::OutOfBounds {
                    offset: bp,
                    size: header.size,
                });
                break;
            }
            if bp % DSIZE != 0 || header.size % DSIZE != 0 {
                violations.push(InvariantViolation::Misaligned {
                    offset: bp,
                    size: header.size,
                });
            }

            let header_word = self.arena.word(bp - WORD_SIZE);
            let footer_word = self.arena.word(bp + header.size - DSIZE);
            if header_word != footer_word {
                violations.push(InvariantViolation::HeaderFooterMismatch {
                    offset: bp,
                    header: header_word,
                    footer: footer_word,
                });
            }
            if verbose {
                let footer = Tag::unpack(footer_word);
                tracing::debug!(
                    "{bp}: header: [{}:{}] footer: [{}:{}]",
                    header.size,
                    if header.allocated { 'a' } else { 'f' },
                    footer.size,
                    if footer.allocated { 'a' } else { 'f' },
                );
            }

            if header.allocated {
                prev_free = None;
            } else {
                if let Some(first) = prev_free {
                    violations.push(InvariantViolation::AdjacentFree { first, second: bp });
                }
                if !self.free_list.contains(bp) {
                    violations.push(InvariantViolation::UnlistedFreeBlock { offset: bp });
                }
                free_blocks.insert(bp);
                prev_free = Some(bp);
            }

            rover_seen |= bp == self.rover;
            accounted += header.size;
            bp += header.size;
        }

        if !rover_seen {
            violations.push(InvariantViolation::DanglingRover { offset: self.rover });
        }

        let granted = self.arena.granted();
        if accounted != granted {
            violations.push(InvariantViolation::SizeMismatch { accounted, granted });
        }
        free_blocks
    }

    /// Walks every bucket, checking tags, links and class membership.
    fn check_buckets(&self, free_blocks: &HashSet<usize>, violations: &mut Vec<InvariantViolation>) {
        let mut seen = HashSet::new();
        for cls in 0..NUM_SIZE_CLASSES {
            let mut expected_prev = None;
            // A bucket can never be longer than the registry; stop on cycles.
            for bp in self.free_list.iter_class(cls).take(self.free_list.len() + 1) {
                if !seen.insert(bp) {
                    violations.push(InvariantViolation::DuplicateMembership { offset: bp });
                    break;
                }
                let Some(links) = self.free_list.links(bp) else {
                    break;
                };

                if links.next == Some(bp) || links.prev == Some(bp) {
                    violations.push(InvariantViolation::SelfLink { offset: bp });
                }
                if links.prev != expected_prev {
                    violations.push(InvariantViolation::AsymmetricLink { offset: bp });
                }
                expected_prev = Some(bp);

                if !free_blocks.contains(&bp) {
                    // Not a free block reached by the address walk: either
                    // allocated or not a block boundary at all.
                    let allocated = self
                        .arena
                        .try_word(bp.wrapping_sub(WORD_SIZE))
                        .is_none_or(|word| Tag::unpack(word).allocated);
                    if allocated {
                        violations.push(InvariantViolation::AllocatedInFreeList { class: cls, offset: bp });
                    }
                    continue;
                }

                let size = self.arena.block_size(bp);
                if links.class != cls || size_class::class_of(size) != cls {
                    violations.push(InvariantViolation::WrongBucket {
                        offset: bp,
                        size,
                        class: cls,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocatorConfig;

    fn heap() -> SegMalloc {
        SegMalloc::init(AllocatorConfig::default().with_max_heap(1 << 20)).unwrap()
    }

    #[test]
    fn test_fresh_heap_is_clean() {
        let heap = heap();
        assert!(heap.check(true).is_empty());
    }

    #[test]
    fn test_stats_account_for_all_bytes() {
        let mut heap = heap();
        let a = heap.allocate(100).unwrap();
        let _b = heap.allocate(200).unwrap();
        heap.release(a).unwrap();
        let stats = heap.stats();
        assert_eq!(stats.allocated_blocks, 1);
        assert_eq!(stats.free_blocks, 2);
        assert_eq!(
            stats.free_bytes + stats.allocated_bytes + 2 * WORD_SIZE,
            heap.arena.granted()
        );
        assert_eq!(stats.heap_bytes, heap.arena.granted());
    }

    #[test]
    fn test_detects_footer_mismatch() {
        let mut heap = heap();
        let p = heap.allocate(100).unwrap().unwrap().offset();
        let footer = heap.arena.ftrp(p);
        heap.arena.put(footer, Tag::pack(heap.arena.block_size(p), false));
        let violations = heap.check(false);
        assert!(violations.iter().any(|v| matches!(
            v,
            InvariantViolation::HeaderFooterMismatch { offset, .. } if *offset == p
        )));
    }

    #[test]
    fn test_detects_bad_prologue() {
        let mut heap = heap();
        heap.arena.put(0, Tag::pack(WORD_SIZE, false));
        assert!(heap.check(false).contains(&InvariantViolation::BadPrologue { offset: 0 }));
    }

    #[test]
    fn test_detects_unlisted_free_block() {
        let mut heap = heap();
        let p = heap.allocate(100).unwrap().unwrap().offset();
        let _fence = heap.allocate(1).unwrap();
        let size = heap.arena.block_size(p);
        heap.arena.write_tags(p, size, false);
        assert!(heap.check(false).contains(&InvariantViolation::UnlistedFreeBlock { offset: p }));
    }

    #[test]
    fn test_detects_allocated_in_free_list() {
        let mut heap = heap();
        let p = heap.allocate(100).unwrap().unwrap().offset();
        heap.free_list.push(p, heap.arena.block_size(p));
        assert!(heap.check(false).iter().any(|v| matches!(
            v,
            InvariantViolation::AllocatedInFreeList { offset, .. } if *offset == p
        )));
    }

    #[test]
    fn test_detects_adjacent_free_and_wrong_bucket() {
        let mut heap = heap();
        let a = heap.allocate(100).unwrap().unwrap().offset();
        let b = heap.allocate(100).unwrap().unwrap().offset();
        let _fence = heap.allocate(1).unwrap();
        // Free both blocks by hand, skipping coalescing.
        for bp in [a, b] {
            let size = heap.arena.block_size(bp);
            heap.arena.write_tags(bp, size, false);
            heap.free_list.push(bp, size);
        }
        let violations = heap.check(false);
        assert!(violations.contains(&InvariantViolation::AdjacentFree { first: a, second: b }));

        // Grow `a` over `b` without refiling it.
        let merged = heap.arena.block_size(a) + heap.arena.block_size(b);
        heap.free_list.unlink(b);
        heap.arena.write_tags(a, merged, false);
        let violations = heap.check(false);
        assert!(violations.iter().any(|v| matches!(
            v,
            InvariantViolation::WrongBucket { offset, .. } if *offset == a
        )));
    }

    #[test]
    fn test_reports_oversized_header() {
        let mut heap = heap();
        let first = heap.heap_listp + WORD_SIZE;
        let huge = usize::MAX & !(WORD_SIZE - 1);
        heap.arena.put(first - WORD_SIZE, Tag::pack(huge, false));
        let violations = heap.check(true);
        assert!(violations.contains(&InvariantViolation::OutOfBounds {
            offset: first,
            size: huge,
        }));
    }

    #[test]
    fn test_detects_self_link() {
        let mut heap = heap();
        let tail = heap.heap_listp + WORD_SIZE;
        heap.free_list.links_mut(tail).unwrap().next = Some(tail);
        let violations = heap.check(false);
        assert!(violations.contains(&InvariantViolation::SelfLink { offset: tail }));
        // The walk revisits the node and stops.
        assert!(violations.contains(&InvariantViolation::DuplicateMembership { offset: tail }));
    }

    #[test]
    fn test_detects_asymmetric_link() {
        let mut heap = heap();
        let tail = heap.heap_listp + WORD_SIZE;
        // A bucket head must not have a predecessor.
        heap.free_list.links_mut(tail).unwrap().prev = Some(tail + DSIZE);
        assert!(heap.check(false).contains(&InvariantViolation::AsymmetricLink { offset: tail }));
    }

    #[test]
    fn test_detects_duplicate_membership() {
        let mut heap = heap();
        let hole = heap.allocate(100).unwrap();
        let fence = heap.allocate(1).unwrap().unwrap();
        heap.release(hole).unwrap();
        let hole = hole.unwrap().offset();
        let tail = heap.arena.next_blkp(fence.offset());
        assert!(size_class::class_of(heap.arena.block_size(hole)) < size_class::class_of(heap.arena.block_size(tail)));

        // Chain the tail behind the hole so it is reachable from two buckets.
        heap.free_list.links_mut(hole).unwrap().next = Some(tail);
        let violations = heap.check(false);
        assert!(violations.contains(&InvariantViolation::DuplicateMembership { offset: tail }));
    }

    #[test]
    fn test_detects_dangling_rover() {
        let mut heap = heap();
        let p = heap.allocate(100).unwrap().unwrap().offset();
        assert!(heap.check(false).is_empty());
        heap.rover = p + DSIZE;
        assert!(heap.check(false).contains(&InvariantViolation::DanglingRover { offset: p + DSIZE }));
    }

    #[test]
    fn test_detects_size_mismatch() {
        let mut heap = heap();
        // Shrink the free tail by one double word without touching the arena.
        let tail = heap.heap_listp + WORD_SIZE;
        let size = heap.arena.block_size(tail);
        heap.free_list.unlink(tail);
        heap.arena.write_tags(tail, size - DSIZE, false);
        heap.free_list.push(tail, size - DSIZE);
        let violations = heap.check(false);
        assert!(violations.iter().any(|v| matches!(v, InvariantViolation::BadEpilogue { .. })));
        assert!(violations.contains(&InvariantViolation::SizeMismatch {
            accounted: heap.arena.granted() - DSIZE,
            granted: heap.arena.granted(),
        }));
    }
}
