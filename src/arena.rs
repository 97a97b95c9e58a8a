//! Arena manager: the single growable byte region the allocator carves up.
//!
//! A [`MemorySource`] plays the role of `sbrk`: it only ever grows, and every
//! offset it has handed out stays valid. [`Arena`] wraps a source with the
//! double-word growth contract and word-granular access used by the block
//! layout.

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::slice;

use crate::error::ArenaError;
use crate::{DSIZE, WORD_SIZE};

/// Backing store for an [`Arena`].
pub trait MemorySource {
    /// Extends the region by `bytes` zeroed bytes and returns the offset of the
    /// first new byte (the old end of the region).
    fn sbrk(&mut self, bytes: usize) -> Result<usize, ArenaError>;

    /// The whole region granted so far.
    fn bytes(&self) -> &[u8];

    /// The whole region granted so far, mutably.
    fn bytes_mut(&mut self) -> &mut [u8];
}

/// A `Vec`-backed memory source with a hard ceiling.
///
/// The full ceiling is reserved up front, so growth never moves the buffer
/// and the base address stays stable for the life of the source.
pub struct VecSource {
    buf: Vec<u8>,
    limit: usize,
}

impl VecSource {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit),
            limit,
        }
    }
}

impl MemorySource for VecSource {
    fn sbrk(&mut self, bytes: usize) -> Result<usize, ArenaError> {
        let base = self.buf.len();
        let remaining = self.limit - base;
        if bytes > remaining {
            return Err(ArenaError::Exhausted {
                requested: bytes,
                remaining,
            });
        }
        // Within the reserved capacity: no reallocation.
        self.buf.resize(base + bytes, 0);
        Ok(base)
    }

    fn bytes(&self) -> &[u8] {
        &self.buf
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

/// A fixed region from the global allocator, reserved zeroed at its ceiling.
///
/// Every view of the region, including [`RawRegion::base`], derives from one
/// base pointer, so raw pointers computed from the base stay usable across
/// later `bytes_mut` calls. This is the source behind the C exports.
pub struct RawRegion {
    base: NonNull<u8>,
    layout: Layout,
    len: usize,
}

impl RawRegion {
    pub fn with_limit(limit: usize) -> Result<Self, ArenaError> {
        let layout = Layout::from_size_align(limit, DSIZE).map_err(|_| ArenaError::Reserve { limit })?;
        let base = if limit == 0 {
            NonNull::dangling()
        } else {
            // SAFETY: `layout` has a non-zero size.
            NonNull::new(unsafe { alloc::alloc_zeroed(layout) }).ok_or(ArenaError::Reserve { limit })?
        };
        Ok(Self { base, layout, len: 0 })
    }

    /// Start of the region.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }
}

impl MemorySource for RawRegion {
    fn sbrk(&mut self, bytes: usize) -> Result<usize, ArenaError> {
        let base = self.len;
        let remaining = self.layout.size() - base;
        if bytes > remaining {
            return Err(ArenaError::Exhausted {
                requested: bytes,
                remaining,
            });
        }
        // Already zeroed at reservation.
        self.len += bytes;
        Ok(base)
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: the first `len` bytes are allocated and initialized.
        unsafe { slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `bytes`; `&mut self` makes this view unique among
        // references into the region.
        unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }
}

impl Drop for RawRegion {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            // SAFETY: allocated in `with_limit` with this layout.
            unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
        }
    }
}

/// Monotonically growing arena with word-level accessors.
pub struct Arena<S> {
    source: S,
    /// Total bytes granted by `grow` over the arena's lifetime.
    granted: usize,
}

impl<S: MemorySource> Arena<S> {
    pub fn new(source: S) -> Self {
        Self { source, granted: 0 }
    }

    /// Grows the arena by `bytes`, which must be a multiple of [`DSIZE`].
    ///
    /// Returns the offset just past the old end. The caller stamps a fresh
    /// epilogue at the new end. Failure is returned as-is, never retried.
    pub fn grow(&mut self, bytes: usize) -> Result<usize, ArenaError> {
        if bytes % DSIZE != 0 {
            return Err(ArenaError::Misaligned { requested: bytes });
        }
        let base = self.source.sbrk(bytes)?;
        self.granted += bytes;
        tracing::debug!(base, bytes, granted = self.granted, "arena grown");
        Ok(base)
    }

    /// Bytes granted so far.
    pub fn granted(&self) -> usize {
        self.granted
    }

    /// Current length of the region (one past the epilogue tag).
    pub fn len(&self) -> usize {
        self.source.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> &[u8] {
        self.source.bytes()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.source.bytes_mut()
    }

    /// Reads the word at `offset`. Out-of-range offsets are a bug and panic.
    #[inline]
    pub fn word(&self, offset: usize) -> usize {
        let mut raw = [0u8; WORD_SIZE];
        raw.copy_from_slice(&self.source.bytes()[offset..offset + WORD_SIZE]);
        usize::from_ne_bytes(raw)
    }

    /// Reads the word at `offset`, or `None` if it lies outside the arena.
    pub fn try_word(&self, offset: usize) -> Option<usize> {
        let end = offset.checked_add(WORD_SIZE)?;
        let bytes = self.source.bytes().get(offset..end)?;
        let mut raw = [0u8; WORD_SIZE];
        raw.copy_from_slice(bytes);
        Some(usize::from_ne_bytes(raw))
    }

    /// Writes `value` to the word at `offset`.
    #[inline]
    pub fn put(&mut self, offset: usize, value: usize) {
        self.source.bytes_mut()[offset..offset + WORD_SIZE].copy_from_slice(&value.to_ne_bytes());
    }
}
