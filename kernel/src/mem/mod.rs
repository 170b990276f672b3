//! Memory primitives used by the filesystem layer.
//!
//! Only page frames are needed here: cached FAT32 clusters are backed by
//! contiguous, page-aligned frames so that individual pages can be handed
//! out to mapping code without copying.

pub mod page;

pub use page::{allocate_frames, Page, PageFrames, PageRef};
