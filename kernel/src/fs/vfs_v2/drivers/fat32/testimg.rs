//! FAT32 image builder for tests.
//!
//! Lays out a 512 MiB volume (4 KiB clusters, two FATs) on a sparse mock
//! device, so that only the sectors actually written cost memory.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::dirent::{
    encode_long_name, lfn_checksum, short_alias, short_filename, Fat32DirectoryEntry, ATTR_ARCHIVE, ATTR_DIRECTORY,
    DIR_ENTRY_SIZE,
};
use super::structures::{Fat32BootSector, FAT32_CHAIN_END};
use crate::device::block::mockblk::MockBlockDevice;
use crate::environment::SECTOR_SIZE;

pub const TOTAL_SECTORS: u32 = 1 << 20;
pub const RESERVED_SECTORS: u16 = 32;
pub const SECTORS_PER_FAT: u32 = 1024;
pub const SECTORS_PER_CLUSTER: u8 = 8;
pub const CLUSTER_SIZE: usize = SECTORS_PER_CLUSTER as usize * SECTOR_SIZE;
pub const ROOT_CLUSTER: u32 = 2;

struct DirImage {
    clusters: Vec<u32>,
    entries: Vec<[u8; DIR_ENTRY_SIZE]>,
    aliases: u32,
}

pub struct ImageBuilder {
    device: Arc<MockBlockDevice>,
    /// Layout the builder writes with
    header: Fat32BootSector,
    /// Boot sector written out by `finish`
    boot_sector: Fat32BootSector,
    next_free: u32,
    directories: BTreeMap<u32, DirImage>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::with_device(MockBlockDevice::new("fat32-img", SECTOR_SIZE, TOTAL_SECTORS as usize))
    }

    pub fn with_device(device: MockBlockDevice) -> Self {
        let mut bytes = [0u8; SECTOR_SIZE];
        bytes[0] = 0xEB;
        bytes[1] = 0x58;
        bytes[2] = 0x90;
        bytes[3..11].copy_from_slice(b"MSWIN4.1");
        let mut header = Fat32BootSector::from_bytes(&bytes);
        header.bytes_per_sector = SECTOR_SIZE as u16;
        header.sectors_per_cluster = SECTORS_PER_CLUSTER;
        header.reserved_sectors = RESERVED_SECTORS;
        header.fat_count = 2;
        header.media_descriptor = 0xF8;
        header.total_sectors_32 = TOTAL_SECTORS;
        header.sectors_per_fat_32 = SECTORS_PER_FAT;
        header.root_cluster = ROOT_CLUSTER;
        header.fs_info_sector = 1;
        header.backup_boot_sector = 6;
        header.boot_signature = 0x29;
        header.volume_label = *b"NO NAME    ";
        header.fs_type = *b"FAT32   ";
        header.signature = 0xAA55;

        let mut builder = Self {
            device: Arc::new(device),
            header,
            boot_sector: header,
            next_free: ROOT_CLUSTER,
            directories: BTreeMap::new(),
        };
        builder.set_fat(0, 0x0FFF_FFF8);
        builder.set_fat(1, FAT32_CHAIN_END);
        let root = builder.alloc_chain(1)[0];
        assert_eq!(root, ROOT_CLUSTER);
        builder.directories.insert(
            root,
            DirImage {
                clusters: alloc::vec![root],
                entries: Vec::new(),
                aliases: 0,
            },
        );
        builder
    }

    pub fn root(&self) -> u32 {
        ROOT_CLUSTER
    }

    pub fn device(&self) -> Arc<MockBlockDevice> {
        Arc::clone(&self.device)
    }

    /// Byte offset of data cluster `cluster` on the device.
    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        let first_data = self.header.first_data_sector() * SECTOR_SIZE as u64;
        first_data + (cluster as u64 - 2) * CLUSTER_SIZE as u64
    }

    /// Change the boot sector before it is written out.
    ///
    /// Directories and FAT entries stay where the unpatched layout puts them.
    pub fn patch_header(&mut self, edit: impl FnOnce(&mut Fat32BootSector)) {
        edit(&mut self.boot_sector);
    }

    /// Write a raw FAT entry into both FAT copies.
    pub fn set_fat(&mut self, cluster: u32, value: u32) {
        for copy in 0..self.header.fat_count as u64 {
            let base = (self.header.first_fat_sector() as u64 + copy * self.header.sectors_per_fat() as u64)
                * SECTOR_SIZE as u64;
            self.device.write_at(&value.to_le_bytes(), base + cluster as u64 * 4);
        }
    }

    /// Allocate `count` consecutive clusters linked into one chain.
    pub fn alloc_chain(&mut self, count: usize) -> Vec<u32> {
        let clusters: Vec<u32> = (0..count as u32).map(|i| self.next_free + i).collect();
        self.next_free += count as u32;
        for pair in clusters.windows(2) {
            self.set_fat(pair[0], pair[1]);
        }
        if let Some(&last) = clusters.last() {
            self.set_fat(last, FAT32_CHAIN_END);
        }
        clusters
    }

    /// Add a regular file holding `contents` to directory `dir`.
    ///
    /// Returns the first cluster (0 for an empty file).
    pub fn file(&mut self, dir: u32, name: &str, contents: &[u8]) -> u32 {
        let clusters = self.alloc_chain(contents.len().div_ceil(CLUSTER_SIZE));
        for (chunk, &cluster) in contents.chunks(CLUSTER_SIZE).zip(clusters.iter()) {
            self.device.write_at(chunk, self.cluster_offset(cluster));
        }
        let first = clusters.first().copied().unwrap_or(0);
        self.add_entry(dir, name, ATTR_ARCHIVE, first, contents.len() as u32);
        first
    }

    /// Add a one-cluster subdirectory to `dir`.
    pub fn dir(&mut self, parent: u32, name: &str) -> u32 {
        self.dir_with_clusters(parent, name, 1)
    }

    pub fn dir_with_clusters(&mut self, parent: u32, name: &str, count: usize) -> u32 {
        let clusters = self.alloc_chain(count);
        let first = clusters[0];
        self.add_entry(parent, name, ATTR_DIRECTORY, first, 0);
        let dot = Fat32DirectoryEntry::new(*b".          ", ATTR_DIRECTORY, first, 0);
        // ".." of a top-level directory points at cluster 0
        let parent_cluster = if parent == ROOT_CLUSTER { 0 } else { parent };
        let dotdot = Fat32DirectoryEntry::new(*b"..         ", ATTR_DIRECTORY, parent_cluster, 0);
        self.directories.insert(
            first,
            DirImage {
                clusters,
                entries: alloc::vec![dot.to_bytes(), dotdot.to_bytes()],
                aliases: 0,
            },
        );
        first
    }

    /// Add a directory entry, with long name fragments if `name` needs them.
    pub fn add_entry(&mut self, dir: u32, name: &str, attributes: u8, cluster: u32, size: u32) {
        let image = self.directories.get_mut(&dir).expect("no such directory in image");
        match short_filename(name) {
            Some(short) => {
                let entry = Fat32DirectoryEntry::new(short, attributes, cluster, size);
                image.entries.push(entry.to_bytes());
            }
            None => {
                image.aliases += 1;
                let alias = short_alias(name, image.aliases);
                image.entries.extend(encode_long_name(name, lfn_checksum(&alias)));
                let entry = Fat32DirectoryEntry::new(alias, attributes, cluster, size);
                image.entries.push(entry.to_bytes());
            }
        }
    }

    /// Append a raw 32-byte record to directory `dir`.
    pub fn raw_entry(&mut self, dir: u32, raw: [u8; DIR_ENTRY_SIZE]) {
        let image = self.directories.get_mut(&dir).expect("no such directory in image");
        image.entries.push(raw);
    }

    /// Write the boot sector and all directories, and hand out the device.
    pub fn finish(self) -> Arc<MockBlockDevice> {
        self.device.write_at(&self.boot_sector.to_bytes(), 0);
        let per_cluster = CLUSTER_SIZE / DIR_ENTRY_SIZE;
        for image in self.directories.values() {
            assert!(
                image.entries.len() <= image.clusters.len() * per_cluster,
                "directory entries overflow their clusters"
            );
            for (chunk, &cluster) in image.entries.chunks(per_cluster).zip(image.clusters.iter()) {
                let bytes: Vec<u8> = chunk.iter().flatten().copied().collect();
                self.device.write_at(&bytes, self.cluster_offset(cluster));
            }
        }
        self.device
    }
}
