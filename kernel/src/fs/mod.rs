//! Filesystem layer: shared error and metadata types, filesystem parameters,
//! and the VFS v2 node/filesystem traits with their drivers.

use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;

use crate::device::block::BlockDevice;

pub mod params;
pub mod vfs_v2;

use params::FileSystemParams;
use vfs_v2::core::FileSystemOperations;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSystemErrorKind {
    NotFound,
    IoError,
    InvalidData,
    NotADirectory,
    NotAFile,
    ReadOnly,
    NotSupported,
}

#[derive(Clone, PartialEq, Eq)]
pub struct FileSystemError {
    pub kind: FileSystemErrorKind,
    pub message: String,
}

impl FileSystemError {
    pub fn new(kind: FileSystemErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn read_only(operation: &str) -> Self {
        Self::new(
            FileSystemErrorKind::ReadOnly,
            alloc::format!("{}: filesystem is read-only", operation),
        )
    }
}

impl fmt::Debug for FileSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileSystemError {{ kind: {:?}, message: {} }}", self.kind, self.message)
    }
}

impl fmt::Display for FileSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Result type for file system operations
pub type Result<T> = core::result::Result<T, FileSystemError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    RegularFile,
    Directory,
    CharDevice,
    BlockDevice,
    Pipe,
    SymbolicLink,
    Socket,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilePermission {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

/// What `stat` reports for a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub file_type: FileType,
    pub size: usize,
    pub permissions: FilePermission,
    pub created_time: u64,
    pub modified_time: u64,
    pub accessed_time: u64,
    /// Inode-like identifier, unique within one filesystem
    pub file_id: u64,
    pub link_count: u32,
    /// Number of the device the filesystem lives on
    pub device_id: u32,
}

/// A filesystem driver that knows how to mount itself from a block device.
pub trait FileSystemDriver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Mount with default parameters.
    fn create_from_block(&self, block_device: Arc<dyn BlockDevice>) -> Result<Arc<dyn FileSystemOperations>>;

    /// Mount with driver-specific parameters.
    fn create_from_params(
        &self,
        block_device: Arc<dyn BlockDevice>,
        params: &dyn FileSystemParams,
    ) -> Result<Arc<dyn FileSystemOperations>>;
}
