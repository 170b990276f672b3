//! VFS Version 2
//!
//! - VfsNode: File "entity" interface (similar to Linux inode/BSD vnode)
//! - FileSystemOperations: Driver API for filesystem-wide operations
//! - drivers: filesystem implementations of the two traits

pub mod core;
pub mod drivers;

pub use self::core::*;
