//! FAT32 VFS Node Implementation
//!
//! This module implements the VfsNode trait for FAT32 filesystem nodes.
//! A node owns the full cluster chain of its file or directory, computed once
//! when the node is created. Directory nodes read their entries lazily, the
//! first time a lookup or listing needs them, and never again.

use alloc::{
    boxed::Box,
    format,
    string::String,
    sync::{Arc, Weak},
    vec::Vec,
};
use core::{any::Any, fmt::Debug};
use spin::{Mutex, Once};

use super::cluster_cache::Cluster;
use super::dirent::{Fat32DirectoryEntry, Fat32LongNameEntry, LongNameAssembler, DIR_ENTRY_SIZE};
use super::structures::FAT32_FIRST_DATA_CLUSTER;
use super::{Fat32FileSystem, Fat32Volume};
use crate::environment::PAGE_SIZE;
use crate::fs::vfs_v2::core::{FileSystemOperations, VfsNode};
use crate::fs::{FileMetadata, FilePermission, FileSystemError, FileSystemErrorKind, FileType};
use crate::mem::PageRef;

/// One directory entry as found on disk, plus the node built from it (if
/// anyone still holds that node).
struct DirChild {
    /// Resolved name, lowercased
    name: String,
    entry: Fat32DirectoryEntry,
    node: Mutex<Weak<Fat32Node>>,
}

/// FAT32 filesystem node
///
/// This structure represents a file or directory in the FAT32 filesystem.
/// It implements the VfsNode trait to integrate with the VFS v2 architecture.
///
/// Children hold their parent strongly; a directory only keeps weak handles
/// to the child nodes it has handed out.
pub struct Fat32Node {
    filesystem: Weak<Fat32FileSystem>,
    volume: Arc<Fat32Volume>,
    parent: Option<Arc<Fat32Node>>,
    directory: bool,
    /// File length in bytes (always 0 for directories)
    file_size: u32,
    /// Data cluster numbers of the chain, in order
    cluster_ids: Box<[u32]>,
    children: Once<Vec<DirChild>>,
}

impl Debug for Fat32Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Fat32Node")
            .field("first_cluster", &self.first_cluster_id())
            .field("directory", &self.directory)
            .field("file_size", &self.file_size)
            .field("cluster_count", &self.cluster_ids.len())
            .field("children_populated", &self.children.is_completed())
            .finish()
    }
}

impl Fat32Node {
    /// Build a node for the chain starting at `first_cluster`.
    ///
    /// Only the root has no parent. Regular files may start at cluster 0,
    /// which is how FAT32 stores empty files; every other cluster number in
    /// the chain must fall inside the data region or the volume is corrupt.
    pub(super) fn new(
        filesystem: Weak<Fat32FileSystem>,
        volume: Arc<Fat32Volume>,
        first_cluster: u32,
        directory: bool,
        parent: Option<Arc<Fat32Node>>,
        file_size: u32,
    ) -> Arc<Self> {
        assert!(parent.is_some() || directory, "[FAT32] the root node must be a directory");

        let cluster_ids = if first_cluster == 0 && !directory {
            Box::default()
        } else {
            volume.validate_cluster_id(first_cluster);
            let ids = volume.table.chain(first_cluster);
            for &id in ids.iter() {
                volume.validate_cluster_id(id);
            }
            ids
        };

        Arc::new(Self {
            filesystem,
            volume,
            parent,
            directory,
            file_size: if directory { 0 } else { file_size },
            cluster_ids,
            children: Once::new(),
        })
    }

    /// First cluster of the chain (0 for an empty file)
    pub fn first_cluster_id(&self) -> u32 {
        self.cluster_ids.first().copied().unwrap_or(0)
    }

    pub fn cluster_count(&self) -> usize {
        self.cluster_ids.len()
    }

    pub(super) fn volume(&self) -> &Arc<Fat32Volume> {
        &self.volume
    }

    pub fn cluster_ids(&self) -> &[u32] {
        &self.cluster_ids
    }

    pub fn is_offset_in_file(&self, offset: usize) -> bool {
        !self.directory && offset < self.file_size as usize
    }

    /// The `local`-th cluster of this node's chain, if the chain is that long.
    fn get_cluster_data(&self, local: usize) -> Option<Arc<Cluster>> {
        let id = *self.cluster_ids.get(local)?;
        Some(self.volume.cache.get_cluster(id as i64 - FAT32_FIRST_DATA_CLUSTER as i64))
    }

    fn require_directory(&self) -> Result<(), FileSystemError> {
        if !self.directory {
            return Err(FileSystemError::new(FileSystemErrorKind::NotADirectory, "Not a directory"));
        }
        Ok(())
    }

    fn populate_children(&self) -> &[DirChild] {
        self.children.call_once(|| self.scan_directory())
    }

    fn scan_directory(&self) -> Vec<DirChild> {
        let diagnostics = &self.volume.diagnostics;
        let mut assembler = LongNameAssembler::new();
        let mut children = Vec::new();

        'clusters: for local in 0..self.cluster_ids.len() {
            let Some(cluster) = self.get_cluster_data(local) else {
                break;
            };
            let data = cluster.data();
            for raw in data.chunks_exact(DIR_ENTRY_SIZE) {
                let entry = Fat32DirectoryEntry::from_bytes(raw);
                if entry.is_deleted() {
                    continue;
                }
                if entry.is_end() {
                    // Nothing in use follows, in this cluster or any later one.
                    break 'clusters;
                }
                if entry.is_dot() {
                    continue;
                }
                if entry.is_long_filename() {
                    assembler.push_fragment(&Fat32LongNameEntry::from_bytes(raw), diagnostics);
                    continue;
                }
                if entry.is_volume_label() {
                    continue;
                }

                let mut name = assembler.finish(&entry, diagnostics);
                name.make_ascii_lowercase();
                children.push(DirChild {
                    name,
                    entry,
                    node: Mutex::new(Weak::new()),
                });
            }
        }
        assembler.end_of_directory(diagnostics);

        log::debug!(
            "[FAT32] directory at cluster {} holds {} entries",
            self.first_cluster_id(),
            children.len()
        );
        children
    }

    fn find_child(&self, name: &str) -> Option<&DirChild> {
        self.populate_children()
            .iter()
            .find(|child| child.name.eq_ignore_ascii_case(name))
    }

    /// Look up `name` (case-insensitively) among this directory's entries.
    ///
    /// A child node that is still alive elsewhere is handed out again;
    /// otherwise a new node is built from the directory entry.
    pub fn ref_child(self: &Arc<Self>, name: &str) -> Option<Arc<Fat32Node>> {
        if !self.directory {
            return None;
        }
        let child = self.find_child(name)?;
        if let Some(node) = child.node.lock().upgrade() {
            return Some(node);
        }

        let entry = child.entry;
        let node = Fat32Node::new(
            self.filesystem.clone(),
            Arc::clone(&self.volume),
            entry.cluster(),
            entry.is_directory(),
            Some(Arc::clone(self)),
            entry.file_size,
        );

        let mut slot = child.node.lock();
        if let Some(existing) = slot.upgrade() {
            return Some(existing);
        }
        *slot = Arc::downgrade(&node);
        Some(node)
    }

    /// Parent directory; the root is its own parent.
    pub fn ref_parent(self: &Arc<Self>) -> Arc<Fat32Node> {
        match &self.parent {
            Some(parent) => Arc::clone(parent),
            None => Arc::clone(self),
        }
    }

    fn read_only(operation: &str) -> FileSystemError {
        FileSystemError::read_only(operation)
    }
}

impl VfsNode for Fat32Node {
    fn filesystem(&self) -> Option<Weak<dyn FileSystemOperations>> {
        let filesystem: Weak<dyn FileSystemOperations> = self.filesystem.clone();
        Some(filesystem)
    }

    fn stat(&self) -> Result<FileMetadata, FileSystemError> {
        Ok(FileMetadata {
            file_type: if self.directory { FileType::Directory } else { FileType::RegularFile },
            size: self.file_size as usize,
            permissions: FilePermission {
                read: true,
                write: false,
                execute: self.directory,
            },
            created_time: 0,
            modified_time: 0,
            accessed_time: 0,
            file_id: self.first_cluster_id() as u64,
            link_count: 1,
            device_id: self.volume.cache.devno(),
        })
    }

    fn file_type(&self) -> Result<FileType, FileSystemError> {
        Ok(if self.directory { FileType::Directory } else { FileType::RegularFile })
    }

    fn is_directory(&self) -> Result<bool, FileSystemError> {
        Ok(self.directory)
    }

    fn is_regular_file(&self) -> Result<bool, FileSystemError> {
        Ok(!self.directory)
    }

    fn read_at(&self, buffer: &mut [u8], offset: usize) -> Result<usize, FileSystemError> {
        if self.directory {
            return Err(FileSystemError::new(FileSystemErrorKind::NotAFile, "Cannot read a directory"));
        }
        let file_size = self.file_size as usize;
        if offset >= file_size {
            return Ok(0);
        }
        let len = buffer.len().min(file_size - offset);
        let cluster_size = self.volume.cache.cluster_size();

        let mut done = 0;
        while done < len {
            let position = offset + done;
            let local = position / cluster_size;
            let within = position % cluster_size;
            let Some(cluster) = self.get_cluster_data(local) else {
                panic!(
                    "[FAT32] file at cluster {} is {} bytes but its chain ends after {} clusters",
                    self.first_cluster_id(),
                    file_size,
                    self.cluster_ids.len()
                );
            };
            let chunk = (cluster_size - within).min(len - done);
            buffer[done..done + chunk].copy_from_slice(&cluster.data()[within..within + chunk]);
            done += chunk;
        }
        Ok(done)
    }

    fn write_at(&self, _buffer: &[u8], _offset: usize) -> Result<usize, FileSystemError> {
        Err(Self::read_only("write_at"))
    }

    fn truncate(&self, _length: usize) -> Result<(), FileSystemError> {
        Err(Self::read_only("truncate"))
    }

    fn get_page_info(&self, page_index: usize) -> Result<PageRef, FileSystemError> {
        let pages_per_cluster = self.volume.cache.cluster_size() / PAGE_SIZE;
        let local = page_index / pages_per_cluster;
        let cluster = self.get_cluster_data(local).ok_or_else(|| {
            FileSystemError::new(
                FileSystemErrorKind::InvalidData,
                format!("Page {} lies beyond the last cluster", page_index),
            )
        })?;
        Ok(cluster.page_ref(page_index % pages_per_cluster))
    }

    fn next_dirent(&self, last: Option<&str>) -> Result<Option<String>, FileSystemError> {
        self.require_directory()?;
        let next = match last {
            None => Some(String::from(".")),
            Some(".") => Some(String::from("..")),
            Some("..") => self.populate_children().first().map(|child| child.name.clone()),
            // O(n) per step: the position of `last` is found again every call.
            Some(last) => {
                let children = self.populate_children();
                let position = children
                    .iter()
                    .position(|child| child.name.eq_ignore_ascii_case(last))
                    .ok_or_else(|| {
                        FileSystemError::new(
                            FileSystemErrorKind::NotFound,
                            format!("Previous entry '{}' not found", last),
                        )
                    })?;
                children.get(position + 1).map(|child| child.name.clone())
            }
        };
        Ok(next)
    }

    fn child_exists(&self, name: &str) -> Result<bool, FileSystemError> {
        self.require_directory()?;
        if name == "." || name == ".." {
            return Ok(true);
        }
        Ok(self.find_child(name).is_some())
    }

    fn hardlink(&self, _name: &str, _target: Arc<dyn VfsNode>) -> Result<(), FileSystemError> {
        Err(Self::read_only("hardlink"))
    }

    fn rename(&self, _old_name: &str, _new_parent: Arc<dyn VfsNode>, _new_name: &str) -> Result<(), FileSystemError> {
        Err(Self::read_only("rename"))
    }

    fn remove(&self, _name: &str) -> Result<(), FileSystemError> {
        Err(Self::read_only("remove"))
    }

    fn create_file(&self, _name: &str) -> Result<Arc<dyn VfsNode>, FileSystemError> {
        Err(Self::read_only("create_file"))
    }

    fn create_dir(&self, _name: &str) -> Result<Arc<dyn VfsNode>, FileSystemError> {
        Err(Self::read_only("create_dir"))
    }

    fn create_device(&self, _name: &str, _device_id: u32) -> Result<Arc<dyn VfsNode>, FileSystemError> {
        Err(Self::read_only("create_device"))
    }

    fn create_socket(&self, _name: &str) -> Result<Arc<dyn VfsNode>, FileSystemError> {
        Err(Self::read_only("create_socket"))
    }

    fn is_same(&self, other: &dyn VfsNode) -> bool {
        other
            .as_any()
            .downcast_ref::<Fat32Node>()
            .is_some_and(|other| core::ptr::eq(self, other))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
