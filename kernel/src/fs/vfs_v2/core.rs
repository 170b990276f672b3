//! Core VFS v2 types and traits
//!
//! This module defines the two contracts a filesystem driver implements:
//! - VfsNode: the per-file/per-directory "entity" interface (similar to a BSD vnode)
//! - FileSystemOperations: the filesystem-wide entry points used for path resolution

use alloc::{
    string::String,
    sync::{Arc, Weak},
};
use core::any::Any;

use crate::fs::{FileMetadata, FileSystemError, FileSystemErrorKind, FileType};
use crate::mem::PageRef;

/// VfsNode trait represents the "entity" interface for files and directories
///
/// Directory iteration is stateless: `next_dirent(None)` yields the first name
/// and `next_dirent(Some(name))` the one after `name`, so callers only ever
/// carry the last name they saw. `.` and `..` are part of every listing.
pub trait VfsNode: Send + Sync {
    /// Returns a (Weak) reference to the filesystem this node belongs to
    fn filesystem(&self) -> Option<Weak<dyn FileSystemOperations>>;

    /// Get metadata for this node
    fn stat(&self) -> Result<FileMetadata, FileSystemError>;

    /// Get the file type of this node
    fn file_type(&self) -> Result<FileType, FileSystemError> {
        Ok(self.stat()?.file_type)
    }

    /// Returns true if this node is a directory
    fn is_directory(&self) -> Result<bool, FileSystemError> {
        Ok(self.file_type()? == FileType::Directory)
    }

    /// Returns true if this node is a regular file
    fn is_regular_file(&self) -> Result<bool, FileSystemError> {
        Ok(self.file_type()? == FileType::RegularFile)
    }

    /// Size of the file contents in bytes (0 for directories)
    fn file_size(&self) -> Result<usize, FileSystemError> {
        Ok(self.stat()?.size)
    }

    /// Read up to `buffer.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes copied; reading at or past the end of the
    /// file yields 0.
    fn read_at(&self, buffer: &mut [u8], offset: usize) -> Result<usize, FileSystemError>;

    fn write_at(&self, buffer: &[u8], offset: usize) -> Result<usize, FileSystemError>;

    fn truncate(&self, length: usize) -> Result<(), FileSystemError>;

    /// Get a handle to the page backing page `page_index` of the file, for
    /// mapping file contents without copying.
    fn get_page_info(&self, page_index: usize) -> Result<PageRef, FileSystemError>;

    /// Name of the directory entry that follows `last` (`None` = start).
    ///
    /// Returns `Ok(None)` once the listing is exhausted.
    fn next_dirent(&self, last: Option<&str>) -> Result<Option<String>, FileSystemError>;

    fn child_exists(&self, name: &str) -> Result<bool, FileSystemError>;

    fn hardlink(&self, name: &str, target: Arc<dyn VfsNode>) -> Result<(), FileSystemError>;

    fn rename(&self, old_name: &str, new_parent: Arc<dyn VfsNode>, new_name: &str) -> Result<(), FileSystemError>;

    fn remove(&self, name: &str) -> Result<(), FileSystemError>;

    fn create_file(&self, name: &str) -> Result<Arc<dyn VfsNode>, FileSystemError>;

    fn create_dir(&self, name: &str) -> Result<Arc<dyn VfsNode>, FileSystemError>;

    fn create_device(&self, name: &str, device_id: u32) -> Result<Arc<dyn VfsNode>, FileSystemError>;

    fn create_socket(&self, name: &str) -> Result<Arc<dyn VfsNode>, FileSystemError>;

    /// Device number this node stands for, if it is a device node
    fn as_device(&self) -> Option<u32> {
        None
    }

    /// Whether `other` is the very same node object as `self`
    fn is_same(&self, other: &dyn VfsNode) -> bool;

    /// Helper for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Helper for downcasting a shared handle
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// FileSystemOperations trait defines the driver API for filesystem operations
///
/// Path resolution is step-wise: the VFS walks a path one component at a time
/// through `resolve_child` and `resolve_parent`, starting from `root()` or a
/// caller-supplied base node.
pub trait FileSystemOperations: Send + Sync {
    /// Get the root VfsNode for this filesystem
    fn root(&self) -> Arc<dyn VfsNode>;

    /// Look up `name` inside the directory `base`
    fn resolve_child(&self, base: Arc<dyn VfsNode>, name: &str) -> Result<Arc<dyn VfsNode>, FileSystemError>;

    /// Parent directory of `base` (the root is its own parent)
    fn resolve_parent(&self, base: Arc<dyn VfsNode>) -> Result<Arc<dyn VfsNode>, FileSystemError>;

    /// Resolve a `/`-separated path relative to `base`.
    ///
    /// Absolute paths start at `root()`; empty components and `.` are skipped.
    fn resolve_path(&self, base: Arc<dyn VfsNode>, path: &str) -> Result<Arc<dyn VfsNode>, FileSystemError> {
        let mut current = if path.starts_with('/') { self.root() } else { base };
        for component in path.split('/') {
            current = match component {
                "" | "." => continue,
                ".." => self.resolve_parent(current)?,
                name => {
                    if !current.is_directory()? {
                        return Err(FileSystemError::new(
                            FileSystemErrorKind::NotADirectory,
                            alloc::format!("Cannot resolve '{}' inside a non-directory", name),
                        ));
                    }
                    self.resolve_child(current, name)?
                }
            };
        }
        Ok(current)
    }

    /// Get filesystem name
    fn name(&self) -> &str;

    /// Check if filesystem is read-only
    fn is_read_only(&self) -> bool {
        false
    }
}
