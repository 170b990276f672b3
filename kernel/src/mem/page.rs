use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use core::fmt;
use core::ops::{Deref, DerefMut};

use spin::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::environment::PAGE_SIZE;

#[repr(C, align(4096))]
#[derive(Clone, Copy)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
}

impl Page {
    pub const fn new() -> Self {
        Page { data: [0; PAGE_SIZE] }
    }
}

fn pages_as_bytes(pages: &[Page]) -> &[u8] {
    // SAFETY: `Page` is a `repr(C)` wrapper around `[u8; PAGE_SIZE]` whose
    // size equals its alignment, so a slice of pages has no padding.
    unsafe { core::slice::from_raw_parts(pages.as_ptr() as *const u8, pages.len() * PAGE_SIZE) }
}

fn pages_as_bytes_mut(pages: &mut [Page]) -> &mut [u8] {
    // SAFETY: see `pages_as_bytes`; the exclusive borrow is carried over.
    unsafe { core::slice::from_raw_parts_mut(pages.as_mut_ptr() as *mut u8, pages.len() * PAGE_SIZE) }
}

/// A block of physically contiguous page frames.
///
/// Frames are allocated zeroed and never move for the lifetime of the block,
/// so `as_ptr()` is stable. Readers and the (rare) writer are serialized by
/// an internal reader-writer lock.
pub struct PageFrames {
    frames: RwLock<Box<[Page]>>,
    base: *const u8,
    num_of_pages: usize,
}

// SAFETY: `base` is only used as an address; all access to the bytes goes
// through `frames`.
unsafe impl Send for PageFrames {}
unsafe impl Sync for PageFrames {}

/// Allocates a number of contiguous, zeroed pages.
///
/// # Arguments
/// * `num_of_pages` - The number of pages to allocate
///
/// # Returns
/// A shared handle to the allocated frames. The frames are released once the
/// last handle (including every `PageRef` into the block) is dropped.
pub fn allocate_frames(num_of_pages: usize) -> Arc<PageFrames> {
    let frames = vec![Page::new(); num_of_pages].into_boxed_slice();
    let base = frames.as_ptr() as *const u8;
    Arc::new(PageFrames {
        frames: RwLock::new(frames),
        base,
        num_of_pages,
    })
}

impl PageFrames {
    pub fn page_count(&self) -> usize {
        self.num_of_pages
    }

    pub fn byte_len(&self) -> usize {
        self.num_of_pages * PAGE_SIZE
    }

    /// Address of the first byte of the block.
    pub fn as_ptr(&self) -> *const u8 {
        self.base
    }

    pub fn read(&self) -> FramesRead<'_> {
        FramesRead { guard: self.frames.read() }
    }

    pub fn write(&self) -> FramesWrite<'_> {
        FramesWrite { guard: self.frames.write() }
    }

    /// Create a new reference to one page of this block.
    pub fn page_ref(self: &Arc<Self>, index: usize) -> PageRef {
        assert!(index < self.num_of_pages, "page {} out of range (block has {} pages)", index, self.num_of_pages);
        PageRef {
            frames: Arc::clone(self),
            index,
        }
    }
}

impl fmt::Debug for PageFrames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageFrames")
            .field("base", &self.base)
            .field("num_of_pages", &self.num_of_pages)
            .finish()
    }
}

/// Shared view of a frame block's bytes.
pub struct FramesRead<'a> {
    guard: RwLockReadGuard<'a, Box<[Page]>>,
}

impl Deref for FramesRead<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        pages_as_bytes(&self.guard)
    }
}

/// Exclusive view of a frame block's bytes.
pub struct FramesWrite<'a> {
    guard: RwLockWriteGuard<'a, Box<[Page]>>,
}

impl Deref for FramesWrite<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        pages_as_bytes(&self.guard)
    }
}

impl DerefMut for FramesWrite<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        pages_as_bytes_mut(&mut self.guard)
    }
}

/// Reference-counted handle to a single page inside a `PageFrames` block.
///
/// The handle keeps the whole block alive, which is what lets a page that is
/// mapped into an address space outlive the cache entry it came from.
#[derive(Clone)]
pub struct PageRef {
    frames: Arc<PageFrames>,
    index: usize,
}

impl PageRef {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.frames.as_ptr().wrapping_add(self.index * PAGE_SIZE)
    }

    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let bytes = self.frames.read();
        let start = self.index * PAGE_SIZE;
        f(&bytes[start..start + PAGE_SIZE])
    }

    /// Whether `other` refers to the same page of the same block.
    pub fn same_page(&self, other: &PageRef) -> bool {
        Arc::ptr_eq(&self.frames, &other.frames) && self.index == other.index
    }
}

impl fmt::Debug for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageRef")
            .field("addr", &self.as_ptr())
            .field("index", &self.index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_zeroed_and_page_aligned() {
        let frames = allocate_frames(3);
        assert_eq!(frames.page_count(), 3);
        assert_eq!(frames.byte_len(), 3 * PAGE_SIZE);
        assert_eq!(frames.as_ptr() as usize % PAGE_SIZE, 0);
        assert!(frames.read().iter().all(|&b| b == 0));
    }

    #[test]
    fn page_ref_sees_writes_and_outlives_owner() {
        let frames = allocate_frames(2);
        {
            let mut bytes = frames.write();
            bytes[PAGE_SIZE] = 0xAB;
            bytes[2 * PAGE_SIZE - 1] = 0xCD;
        }
        let page = frames.page_ref(1);
        let base = frames.as_ptr();
        drop(frames);

        assert_eq!(page.as_ptr(), base.wrapping_add(PAGE_SIZE));
        page.with_bytes(|bytes| {
            assert_eq!(bytes.len(), PAGE_SIZE);
            assert_eq!(bytes[0], 0xAB);
            assert_eq!(bytes[PAGE_SIZE - 1], 0xCD);
        });

        let copy = page.clone();
        assert!(copy.same_page(&page));
        assert_eq!(copy.index(), 1);
    }

    #[test]
    #[should_panic]
    fn page_ref_out_of_range() {
        let frames = allocate_frames(1);
        let _ = frames.page_ref(1);
    }
}
