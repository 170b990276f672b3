//! FAT32 Filesystem Driver Implementation
//!
//! This module implements the FileSystemDriver trait for FAT32,
//! enabling the filesystem to be registered with the VFS manager
//! and created from block devices.

use alloc::sync::Arc;

use crate::{
    device::block::BlockDevice,
    fs::{
        params::{Fat32Params, FileSystemParams},
        FileSystemDriver, FileSystemError, FileSystemErrorKind,
    },
};

use super::{super::super::core::FileSystemOperations, Fat32FileSystem};

/// FAT32 filesystem driver
///
/// This driver implements the FileSystemDriver trait and is responsible
/// for creating FAT32 filesystem instances from block devices.
pub struct Fat32Driver;

impl FileSystemDriver for Fat32Driver {
    fn name(&self) -> &'static str {
        "fat32"
    }

    fn create_from_block(
        &self,
        block_device: Arc<dyn BlockDevice>,
    ) -> Result<Arc<dyn FileSystemOperations>, FileSystemError> {
        let fs = Fat32FileSystem::mount(block_device)?;
        Ok(fs as Arc<dyn FileSystemOperations>)
    }

    fn create_from_params(
        &self,
        block_device: Arc<dyn BlockDevice>,
        params: &dyn FileSystemParams,
    ) -> Result<Arc<dyn FileSystemOperations>, FileSystemError> {
        let fat32_params = params.as_any().downcast_ref::<Fat32Params>().ok_or_else(|| {
            FileSystemError::new(
                FileSystemErrorKind::NotSupported,
                "FAT32 driver requires Fat32Params",
            )
        })?;
        let fs = Fat32FileSystem::mount_with_params(block_device, fat32_params)?;
        Ok(fs as Arc<dyn FileSystemOperations>)
    }
}
