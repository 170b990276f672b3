//! FAT32 Filesystem Implementation
//!
//! This module implements a read-only FAT32 filesystem driver for the VFS v2
//! architecture. Every piece of on-disk data, the allocation table included,
//! is read through a bounded cache of cluster-sized buffers.
//!
//! ## Architecture
//!
//! The FAT32 implementation consists of:
//! - `ClusterCache`: bounded, shared cache of cluster buffers
//! - `AllocationTable`: cluster chain lookups over the first FAT copy
//! - `dirent`: directory entry and VFAT long filename codec
//! - `Fat32Node`: VFS node implementation for files and directories
//! - `Fat32FileSystem`: mount logic and the filesystem root
//! - `Fat32Driver`: filesystem driver for registration
//!
//! Writes are not supported. Every mutating VFS operation reports
//! `ReadOnly` and leaves the volume untouched.

use alloc::{
    format,
    sync::{Arc, Weak},
};
use core::fmt::Debug;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::{
    device::block::BlockDevice,
    environment::{PAGE_SIZE, SECTOR_SIZE},
    fs::{params::Fat32Params, FileSystemError, FileSystemErrorKind},
};

use super::super::core::{FileSystemOperations, VfsNode};

pub mod alloc_table;
pub mod cluster_cache;
pub mod dirent;
pub mod driver;
pub mod node;
pub mod structures;

#[cfg(test)]
pub mod testimg;

pub use alloc_table::AllocationTable;
pub use cluster_cache::{Cluster, ClusterCache};
pub use driver::Fat32Driver;
pub use node::Fat32Node;
pub use structures::*;

/// Counters for recoverable oddities found while decoding directories.
///
/// Each kind is logged once per mount; later occurrences are only counted.
#[derive(Debug, Default)]
pub struct Diagnostics {
    non_ascii: AtomicUsize,
    invalid_lfn: AtomicUsize,
    non_ascii_reported: AtomicBool,
    invalid_lfn_reported: AtomicBool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A long filename held a character outside ASCII, replaced with `?`.
    pub fn report_non_ascii(&self, unit: u16) {
        self.non_ascii.fetch_add(1, Ordering::Relaxed);
        if !self.non_ascii_reported.swap(true, Ordering::Relaxed) {
            log::warn!(
                "[FAT32] non-ASCII character {:#06x} in long filename replaced with '?' [not reporting further occurrences]",
                unit
            );
        }
    }

    /// A long filename sequence was malformed or did not match its entry.
    pub fn report_invalid_lfn(&self) {
        self.invalid_lfn.fetch_add(1, Ordering::Relaxed);
        if !self.invalid_lfn_reported.swap(true, Ordering::Relaxed) {
            log::warn!("[FAT32] invalid long filename sequence, falling back to the short name [not reporting further occurrences]");
        }
    }

    pub fn non_ascii_count(&self) -> usize {
        self.non_ascii.load(Ordering::Relaxed)
    }

    pub fn invalid_lfn_count(&self) -> usize {
        self.invalid_lfn.load(Ordering::Relaxed)
    }
}

/// State shared by every node of one mounted volume.
pub struct Fat32Volume {
    header: Fat32BootSector,
    cache: Arc<ClusterCache>,
    table: Arc<AllocationTable>,
    diagnostics: Diagnostics,
}

impl Fat32Volume {
    /// Panics unless `cluster_id` names a cluster of the data region.
    fn validate_cluster_id(&self, cluster_id: u32) {
        let end = self.header.data_clusters() as u64 + FAT32_FIRST_DATA_CLUSTER as u64;
        if (cluster_id as u64) < FAT32_FIRST_DATA_CLUSTER as u64 || cluster_id as u64 >= end {
            panic!(
                "[FAT32] cluster id {} out of range [{}, {})",
                cluster_id, FAT32_FIRST_DATA_CLUSTER, end
            );
        }
    }
}

/// FAT32 Filesystem implementation
///
/// Created by mounting a block device. The root node lives as long as the
/// filesystem; every other node is created on lookup and lives as long as
/// someone holds it.
pub struct Fat32FileSystem {
    volume: Arc<Fat32Volume>,
    root: Arc<Fat32Node>,
}

impl Debug for Fat32FileSystem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Fat32FileSystem")
            .field("root_cluster", &{ self.volume.header.root_cluster })
            .field("data_clusters", &self.volume.header.data_clusters())
            .field("cluster_size", &self.volume.header.cluster_size())
            .field("cache", &self.volume.cache)
            .finish()
    }
}

impl Fat32FileSystem {
    /// Mount `block_device` with the default cache budget.
    pub fn mount(block_device: Arc<dyn BlockDevice>) -> Result<Arc<Self>, FileSystemError> {
        Self::mount_with_params(block_device, &Fat32Params::default())
    }

    /// Mount `block_device`, sizing the cluster cache from `params`.
    ///
    /// Volumes that are not FAT32, or whose layout this driver does not
    /// handle, are rejected with an error. Corruption found later, while
    /// walking chains or reading clusters, is fatal.
    pub fn mount_with_params(
        block_device: Arc<dyn BlockDevice>,
        params: &Fat32Params,
    ) -> Result<Arc<Self>, FileSystemError> {
        let header = Self::read_boot_sector(block_device.as_ref())?;
        if !header.check_signature() {
            log::debug!("[FAT32] {}: no FAT32 signature", block_device.get_disk_name());
            return Err(FileSystemError::new(FileSystemErrorKind::InvalidData, "Not a FAT32 volume"));
        }

        let cluster_size = header.cluster_size();
        if cluster_size % PAGE_SIZE != 0 {
            log::warn!(
                "[FAT32] {}: cluster size {} is not a multiple of the page size",
                block_device.get_disk_name(),
                cluster_size
            );
            return Err(FileSystemError::new(
                FileSystemErrorKind::NotSupported,
                format!("Cluster size {} is not a multiple of the page size {}", cluster_size, PAGE_SIZE),
            ));
        }

        let max_clusters = params.cache_bytes / cluster_size;
        if max_clusters == 0 {
            return Err(FileSystemError::new(
                FileSystemErrorKind::InvalidData,
                format!("Cache budget of {} bytes cannot hold a {} byte cluster", params.cache_bytes, cluster_size),
            ));
        }

        let fat_entries = header.sectors_per_fat() as u64 * SECTOR_SIZE as u64 / FAT32_ENTRY_SIZE as u64;
        if fat_entries < header.data_clusters() as u64 + FAT32_FIRST_DATA_CLUSTER as u64 {
            return Err(FileSystemError::new(
                FileSystemErrorKind::InvalidData,
                "Allocation table is too small for the data region",
            ));
        }

        let root_cluster = header.root_cluster;
        if root_cluster < FAT32_FIRST_DATA_CLUSTER
            || root_cluster as u64 >= header.data_clusters() as u64 + FAT32_FIRST_DATA_CLUSTER as u64
        {
            return Err(FileSystemError::new(
                FileSystemErrorKind::InvalidData,
                format!("Root cluster {} lies outside the data region", root_cluster),
            ));
        }

        let disk_name = block_device.get_disk_name();
        let first_data_offset = header.first_data_sector() * SECTOR_SIZE as u64;
        let cache = Arc::new(ClusterCache::new(block_device, max_clusters, cluster_size, first_data_offset));
        let table = Arc::new(AllocationTable::new(
            Arc::clone(&cache),
            header.first_fat_sector(),
            header.sectors_per_fat(),
        ));
        let volume = Arc::new(Fat32Volume {
            header,
            cache,
            table,
            diagnostics: Diagnostics::new(),
        });

        let filesystem = Arc::new_cyclic(|weak: &Weak<Self>| {
            let root = Fat32Node::new(weak.clone(), Arc::clone(&volume), root_cluster, true, None, 0);
            Self { volume, root }
        });

        log::info!(
            "[FAT32] mounted {}: {} clusters of {} bytes, root at cluster {}, cache of {} clusters",
            disk_name,
            header.data_clusters(),
            cluster_size,
            root_cluster,
            max_clusters
        );
        Ok(filesystem)
    }

    fn read_boot_sector(block_device: &dyn BlockDevice) -> Result<Fat32BootSector, FileSystemError> {
        let mut sector = [0u8; SECTOR_SIZE];
        block_device.read_exact_at(&mut sector, 0).map_err(|e| {
            FileSystemError::new(
                FileSystemErrorKind::IoError,
                format!("Failed to read boot sector of {}: {}", block_device.get_disk_name(), e),
            )
        })?;
        Ok(Fat32BootSector::from_bytes(&sector))
    }

    pub fn header(&self) -> &Fat32BootSector {
        &self.volume.header
    }

    pub fn cluster_cache(&self) -> &Arc<ClusterCache> {
        &self.volume.cache
    }

    pub fn alloc_table(&self) -> &Arc<AllocationTable> {
        &self.volume.table
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.volume.diagnostics
    }

    pub fn root_node(&self) -> Arc<Fat32Node> {
        Arc::clone(&self.root)
    }

    /// Recover a `Fat32Node` of this filesystem from a VFS node.
    fn own_node(&self, node: Arc<dyn VfsNode>) -> Result<Arc<Fat32Node>, FileSystemError> {
        let node = node.into_any().downcast::<Fat32Node>().map_err(|_| {
            FileSystemError::new(FileSystemErrorKind::NotSupported, "Node does not belong to a FAT32 filesystem")
        })?;
        if !Arc::ptr_eq(node.volume(), &self.volume) {
            return Err(FileSystemError::new(
                FileSystemErrorKind::NotSupported,
                "Node belongs to a different FAT32 filesystem",
            ));
        }
        Ok(node)
    }
}

impl FileSystemOperations for Fat32FileSystem {
    fn root(&self) -> Arc<dyn VfsNode> {
        self.root_node()
    }

    fn resolve_child(&self, base: Arc<dyn VfsNode>, name: &str) -> Result<Arc<dyn VfsNode>, FileSystemError> {
        let node = self.own_node(base)?;
        if !node.is_directory()? {
            return Err(FileSystemError::new(FileSystemErrorKind::NotADirectory, "Not a directory"));
        }
        match name {
            "." => Ok(node as Arc<dyn VfsNode>),
            ".." => Ok(node.ref_parent() as Arc<dyn VfsNode>),
            _ => node
                .ref_child(name)
                .map(|child| child as Arc<dyn VfsNode>)
                .ok_or_else(|| FileSystemError::new(FileSystemErrorKind::NotFound, format!("'{}' not found", name))),
        }
    }

    fn resolve_parent(&self, base: Arc<dyn VfsNode>) -> Result<Arc<dyn VfsNode>, FileSystemError> {
        let node = self.own_node(base)?;
        Ok(node.ref_parent() as Arc<dyn VfsNode>)
    }

    fn name(&self) -> &str {
        "fat32"
    }

    fn is_read_only(&self) -> bool {
        true
    }
}
