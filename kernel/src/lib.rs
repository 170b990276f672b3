//! # fat32ro
//!
//! A read-only FAT32 filesystem driver for the VFS v2 layer.
//!
//! ## Layout
//!
//! - `device::block`: the synchronous block-device boundary the driver reads from
//! - `mem::page`: page frames and per-page reference handles backing cached clusters
//! - `fs`: error/metadata types, filesystem parameters and the VFS v2 traits
//! - `fs::vfs_v2::drivers::fat32`: the FAT32 driver itself (cluster cache,
//!   allocation table, directory entry codec, vnodes and the filesystem root)
//!
//! The crate is `no_std` + `alloc` outside of tests. Logging goes through the
//! `log` facade; the embedding kernel installs the logger.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod device;
pub mod environment;
pub mod fs;
pub mod mem;

pub use fs::vfs_v2::drivers::fat32::{Fat32Driver, Fat32FileSystem, Fat32Node};
pub use fs::{FileSystemError, FileSystemErrorKind};
