//! C-ABI exports for driving the allocator from an external harness.
//!
//! Gated behind `features = ["ffi"]`. Each thread owns one heap, created by
//! `segmalloc_init`, over a [`RawRegion`] reserved at its full ceiling. The
//! pointers handed out are computed from the region's base pointer rather
//! than from a borrowed slice, so they stay valid across later calls until
//! freed.

use core::ffi::c_int;
use core::ptr;
use std::cell::RefCell;

use crate::allocator::{HeapPtr, SegMalloc};
use crate::arena::RawRegion;
use crate::config::AllocatorConfig;
use crate::error::AllocError;

type FfiHeap = SegMalloc<RawRegion>;

thread_local! {
    static HEAP: RefCell<Option<FfiHeap>> = const { RefCell::new(None) };
}

fn create_heap() -> Result<FfiHeap, AllocError> {
    let config = AllocatorConfig::default();
    let region = RawRegion::with_limit(config.max_heap).map_err(|source| AllocError::OutOfMemory {
        requested: config.max_heap,
        source,
    })?;
    SegMalloc::with_source(region, config)
}

fn to_ptr(heap: &FfiHeap, ptr: Option<HeapPtr>) -> *mut u8 {
    match ptr {
        // SAFETY: payload offsets lie inside the granted part of the region.
        Some(ptr) => unsafe { heap.arena().source().base().as_ptr().add(ptr.offset()) },
        None => ptr::null_mut(),
    }
}

fn to_heap_ptr(heap: &FfiHeap, ptr: *mut u8) -> Option<HeapPtr> {
    let base = heap.arena().source().base().as_ptr();
    (!ptr.is_null()).then(|| HeapPtr::from_offset(ptr.addr().wrapping_sub(base.addr())))
}

/// Creates (or recreates) this thread's heap. Returns 0 on success, -1 on failure.
#[unsafe(no_mangle)]
pub extern "C" fn segmalloc_init() -> c_int {
    match create_heap() {
        Ok(heap) => {
            HEAP.with_borrow_mut(|slot| *slot = Some(heap));
            0
        }
        Err(error) => {
            tracing::warn!(%error, "segmalloc_init failed");
            -1
        }
    }
}

/// Allocates `size` bytes. Returns null for `size == 0`, on failure, or before init.
#[unsafe(no_mangle)]
pub extern "C" fn segmalloc_malloc(size: usize) -> *mut u8 {
    HEAP.with_borrow_mut(|slot| {
        let Some(heap) = slot.as_mut() else {
            return ptr::null_mut();
        };
        match heap.allocate(size) {
            Ok(ptr) => to_ptr(heap, ptr),
            Err(_) => ptr::null_mut(),
        }
    })
}

/// Frees a pointer returned by this thread's heap. Null is ignored.
///
/// # Safety
///
/// `ptr` must be null or a live pointer from `segmalloc_malloc`/`segmalloc_realloc`
/// on the same thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn segmalloc_free(ptr: *mut u8) {
    HEAP.with_borrow_mut(|slot| {
        if let Some(heap) = slot.as_mut() {
            let ptr = to_heap_ptr(heap, ptr);
            if let Err(error) = heap.release(ptr) {
                tracing::warn!(%error, "segmalloc_free rejected pointer");
            }
        }
    })
}

/// Reallocates `ptr` to `size` bytes with `realloc` semantics.
///
/// # Safety
///
/// Same contract as [`segmalloc_free`] for `ptr`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn segmalloc_realloc(ptr: *mut u8, size: usize) -> *mut u8 {
    HEAP.with_borrow_mut(|slot| {
        let Some(heap) = slot.as_mut() else {
            return ptr::null_mut();
        };
        let old = to_heap_ptr(heap, ptr);
        match heap.reallocate(old, size) {
            Ok(new) => to_ptr(heap, new),
            Err(_) => ptr::null_mut(),
        }
    })
}

/// Runs the consistency checker. Returns the number of violations, or -1
/// before init.
#[unsafe(no_mangle)]
pub extern "C" fn segmalloc_check(verbose: bool) -> c_int {
    HEAP.with_borrow(|slot| match slot.as_ref() {
        Some(heap) => c_int::try_from(heap.check(verbose).len()).unwrap_or(c_int::MAX),
        None => -1,
    })
}
