//! VFS v2 Filesystem Drivers
//!
//! Filesystem drivers that implement the VFS v2 `FileSystemOperations`
//! interface.
//!
//! ## Available Drivers
//!
//! - **fat32**: Read-only FAT32 filesystem driver for block devices
//!
//! ## Adding New Drivers
//!
//! 1. Create a new module implementing `FileSystemOperations`
//! 2. Implement `VfsNode` for your filesystem's node type
//! 3. Add a driver struct implementing `FileSystemDriver`

pub mod fat32;
