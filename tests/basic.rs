//! Basic integration test: drive a heap through the public API and check the
//! documented allocate/release/reallocate behavior.

use segmalloc::{AllocError, AllocatorConfig, HeapPtr, SegMalloc, DSIZE};

fn heap() -> SegMalloc {
    SegMalloc::init(AllocatorConfig::default().with_max_heap(1 << 22)).unwrap()
}

#[test]
fn test_allocate_is_aligned_and_consistent() {
    let mut heap = heap();
    let p1 = heap.allocate(100).unwrap().unwrap();
    assert_eq!(p1.offset() % DSIZE, 0);
    assert!(heap.payload(p1).unwrap().len() >= 100);
    assert!(heap.check(false).is_empty());
}

#[test]
fn test_freed_block_is_reused() {
    let mut heap = heap();
    let p1 = heap.allocate(100).unwrap();
    heap.release(p1).unwrap();
    let granted = heap.arena().granted();
    let p2 = heap.allocate(100).unwrap();
    assert_eq!(p1, p2);
    assert_eq!(heap.arena().granted(), granted);
}

#[test]
fn test_neighbors_coalesce() {
    let mut heap = heap();
    let a = heap.allocate(16).unwrap().unwrap();
    let b = heap.allocate(16).unwrap().unwrap();
    let a_len = heap.payload(a).unwrap().len();
    let b_len = heap.payload(b).unwrap().len();
    assert_eq!(b.offset(), a.offset() + a_len + 2 * std::mem::size_of::<usize>());

    heap.release(Some(a)).unwrap();
    heap.release(Some(b)).unwrap();
    assert_eq!(heap.stats().free_blocks, 1);

    let granted = heap.arena().granted();
    let c = heap.allocate(a_len + b_len).unwrap();
    assert_eq!(c, Some(a));
    assert_eq!(heap.arena().granted(), granted);
}

#[test]
fn test_reallocate_preserves_contents() {
    let mut heap = heap();
    let p = heap.allocate(40).unwrap().unwrap();
    let pattern: Vec<u8> = (0..40).map(|i| (i * 7) as u8).collect();
    heap.payload_mut(p).unwrap()[..40].copy_from_slice(&pattern);

    let q = heap.reallocate(Some(p), 1000).unwrap().unwrap();
    assert_eq!(&heap.payload(q).unwrap()[..40], pattern.as_slice());

    let r = heap.reallocate(Some(q), 10).unwrap().unwrap();
    assert_eq!(&heap.payload(r).unwrap()[..10], &pattern[..10]);
    assert!(heap.check(false).is_empty());
}

#[test]
fn test_empty_requests_leave_heap_unchanged() {
    let mut heap = heap();
    let before = heap.stats();
    assert_eq!(heap.allocate(0).unwrap(), None);
    heap.release(None).unwrap();
    assert_eq!(heap.stats(), before);
    assert!(heap.check(false).is_empty());
}

#[test]
fn test_reallocate_null_and_zero() {
    let mut heap = heap();
    let p = heap.reallocate(None, 24).unwrap();
    assert!(p.is_some());
    assert_eq!(heap.reallocate(p, 0).unwrap(), None);
    assert_eq!(heap.stats().allocated_blocks, 0);
}

#[test]
fn test_many_sizes() {
    let mut heap = heap();
    let sizes = [1, 8, 16, 64, 256, 1024, 4096, 8192, 65536];
    let ptrs: Vec<HeapPtr> = sizes
        .iter()
        .map(|&size| heap.allocate(size).unwrap().unwrap())
        .collect();
    for (&size, &ptr) in sizes.iter().zip(&ptrs) {
        assert!(heap.payload(ptr).unwrap().len() >= size);
        heap.payload_mut(ptr).unwrap().fill(size as u8);
    }
    for (&size, &ptr) in sizes.iter().zip(&ptrs) {
        assert!(heap.payload(ptr).unwrap().iter().all(|&b| b == size as u8));
    }
    for ptr in ptrs {
        heap.release(Some(ptr)).unwrap();
    }
    let stats = heap.stats();
    assert_eq!(stats.allocated_blocks, 0);
    assert_eq!(stats.free_blocks, 1);
}

#[test]
fn test_alloc_free_cycle() {
    let mut heap = heap();
    let granted = heap.arena().granted();
    for _ in 0..100 {
        let v = heap.allocate(800).unwrap();
        heap.release(v).unwrap();
    }
    assert_eq!(heap.arena().granted(), granted);
}

#[test]
fn test_out_of_memory_is_reported() {
    let mut heap = SegMalloc::init(AllocatorConfig::default().with_max_heap(1 << 16)).unwrap();
    let err = heap.allocate(1 << 17).unwrap_err();
    assert!(matches!(err, AllocError::OutOfMemory { .. }));
    assert!(heap.check(false).is_empty());
}

#[test]
fn test_invalid_pointer_is_rejected() {
    let mut heap = heap();
    let bogus = HeapPtr::from_offset(3);
    assert_eq!(heap.release(Some(bogus)), Err(AllocError::InvalidPointer { offset: 3 }));
    assert!(heap.payload(bogus).is_err());
}
