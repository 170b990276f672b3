//! FAT32 allocation table
//!
//! A view over the first FAT copy. Entries are read and written in place in
//! the cluster cache, so the table keeps nothing but its location and size.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::cluster_cache::{Cluster, ClusterCache};
use super::structures::{FAT32_BAD, FAT32_CHAIN_END, FAT32_ENTRY_MASK, FAT32_ENTRY_SIZE, FAT32_EOC, FAT32_FREE};
use crate::environment::SECTOR_SIZE;

pub struct AllocationTable {
    cache: Arc<ClusterCache>,
    /// First sector of the table on disk
    base_sector: u32,
    /// Number of entries
    len: usize,
}

impl AllocationTable {
    pub fn new(cache: Arc<ClusterCache>, first_fat_sector: u32, sectors_per_fat: u32) -> Self {
        Self {
            cache,
            base_sector: first_fat_sector,
            len: sectors_per_fat as usize * SECTOR_SIZE / FAT32_ENTRY_SIZE,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn entry_location(&self, cluster_id: u32) -> (Arc<Cluster>, usize) {
        if cluster_id as usize >= self.len {
            panic!("[FAT32] cluster id {} not in allocation table range [0, {})", cluster_id, self.len);
        }
        let offset = self.base_sector as u64 * SECTOR_SIZE as u64 + cluster_id as u64 * FAT32_ENTRY_SIZE as u64;
        let (cluster, within) = self.cache.get_cluster_for_disk_byte_offset(offset);
        debug_assert!(within + FAT32_ENTRY_SIZE <= self.cache.cluster_size());
        (cluster, within)
    }

    /// The raw 32-bit entry for `cluster_id`, reserved bits included.
    pub fn raw_entry(&self, cluster_id: u32) -> u32 {
        let (cluster, within) = self.entry_location(cluster_id);
        let data = cluster.data();
        let mut raw = [0u8; FAT32_ENTRY_SIZE];
        raw.copy_from_slice(&data[within..within + FAT32_ENTRY_SIZE]);
        u32::from_le_bytes(raw)
    }

    fn write_entry(&self, cluster_id: u32, value: u32) {
        let (cluster, within) = self.entry_location(cluster_id);
        let mut data = cluster.data_mut();
        let slot = &mut data[within..within + FAT32_ENTRY_SIZE];
        let mut raw = [0u8; FAT32_ENTRY_SIZE];
        raw.copy_from_slice(slot);
        // The top four bits are reserved and must survive the update.
        let entry = (u32::from_le_bytes(raw) & !FAT32_ENTRY_MASK) | (value & FAT32_ENTRY_MASK);
        slot.copy_from_slice(&entry.to_le_bytes());
    }

    /// The cluster following `from` in its chain, or `None` at end of chain.
    ///
    /// Panics on the bad-cluster marker: a file is never expected to run
    /// through a cluster the formatter flagged as unusable.
    pub fn get_next_cluster_id(&self, from: u32) -> Option<u32> {
        let next = self.raw_entry(from) & FAT32_ENTRY_MASK;
        if next == FAT32_BAD {
            panic!("[FAT32] should never encounter a bad cluster while scanning a file (entry {})", from);
        }
        if next >= FAT32_EOC { None } else { Some(next) }
    }

    pub fn set_next_cluster_id(&self, from: u32, next: u32) {
        self.write_entry(from, next);
    }

    pub fn mark_cluster_final(&self, cluster_id: u32) {
        self.write_entry(cluster_id, FAT32_CHAIN_END);
    }

    pub fn mark_cluster_free(&self, cluster_id: u32) {
        self.write_entry(cluster_id, FAT32_FREE);
    }

    /// Every cluster of the chain starting at `first`, in order.
    ///
    /// Counts the chain, then walks it again to copy it out; the two walks
    /// must agree. A chain longer than the table itself loops back on itself.
    pub fn chain(&self, first: u32) -> Box<[u32]> {
        let mut count = 1usize;
        let mut current = first;
        while let Some(next) = self.get_next_cluster_id(current) {
            count += 1;
            if count > self.len {
                panic!("[FAT32] cluster chain starting at {} loops back on itself", first);
            }
            current = next;
        }

        let mut ids = Vec::with_capacity(count);
        let mut current = first;
        for i in 0..count {
            ids.push(current);
            let next = self.get_next_cluster_id(current);
            if next.is_some() != (i + 1 < count) {
                panic!("[FAT32] cluster count changed while walking the chain starting at {}", first);
            }
            if let Some(next) = next {
                current = next;
            }
        }
        ids.into_boxed_slice()
    }
}

impl core::fmt::Debug for AllocationTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AllocationTable")
            .field("base_sector", &self.base_sector)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::block::mockblk::MockBlockDevice;

    const FAT_SECTOR: u32 = 32;
    const FAT_SECTORS: u32 = 8;
    const DATA_SECTOR: u32 = FAT_SECTOR + FAT_SECTORS;
    const CLUSTER: usize = 4096;

    fn setup(entries: &[(u32, u32)]) -> (Arc<MockBlockDevice>, Arc<ClusterCache>, Arc<AllocationTable>) {
        let dev = Arc::new(MockBlockDevice::new("fat-test", 512, 256));
        for &(id, value) in entries {
            dev.write_at(&value.to_le_bytes(), (FAT_SECTOR as u64 * 512) + id as u64 * 4);
        }
        let cache = Arc::new(ClusterCache::new(dev.clone(), 4, CLUSTER, DATA_SECTOR as u64 * 512));
        let table = Arc::new(AllocationTable::new(cache.clone(), FAT_SECTOR, FAT_SECTORS));
        (dev, cache, table)
    }

    #[test]
    fn table_length_covers_all_sectors() {
        let (_, _, table) = setup(&[]);
        assert_eq!(table.len(), 8 * 512 / 4);
        assert!(!table.is_empty());
    }

    #[test]
    fn follows_chain_to_terminator() {
        let (_, _, table) = setup(&[(2, 3), (3, 7), (7, 0x0FFF_FFFF)]);
        assert_eq!(table.get_next_cluster_id(2), Some(3));
        assert_eq!(table.get_next_cluster_id(3), Some(7));
        assert_eq!(table.get_next_cluster_id(7), None);
        assert_eq!(&*table.chain(2), &[2, 3, 7]);
        assert_eq!(&*table.chain(7), &[7]);
    }

    #[test]
    fn every_terminator_value_ends_chain() {
        let entries: Vec<(u32, u32)> = (0..8).map(|i| (10 + i, 0x0FFF_FFF8 + i)).collect();
        let (_, _, table) = setup(&entries);
        for i in 0..8 {
            assert_eq!(table.get_next_cluster_id(10 + i), None);
        }
    }

    #[test]
    fn reserved_bits_are_ignored() {
        let (_, _, table) = setup(&[(4, 0xF000_0005), (5, 0xFFFF_FFFF), (6, 0xFFFF_FFF8)]);
        assert_eq!(table.get_next_cluster_id(4), Some(5));
        assert_eq!(table.get_next_cluster_id(5), None);
        assert_eq!(table.get_next_cluster_id(6), None);
        assert_eq!(&*table.chain(4), &[4, 5]);
    }

    #[test]
    #[should_panic(expected = "bad cluster")]
    fn bad_cluster_is_fatal() {
        let (_, _, table) = setup(&[(2, 3), (3, 0x0FFF_FFF7)]);
        let _ = table.chain(2);
    }

    #[test]
    #[should_panic(expected = "not in allocation table range")]
    fn out_of_range_id_is_fatal() {
        let (_, _, table) = setup(&[]);
        let _ = table.get_next_cluster_id(1024);
    }

    #[test]
    #[should_panic(expected = "loops back on itself")]
    fn looping_chain_is_fatal() {
        let (_, _, table) = setup(&[(2, 3), (3, 4), (4, 2)]);
        let _ = table.chain(2);
    }

    #[test]
    fn writes_preserve_reserved_bits_and_dirty_cluster() {
        let (_, cache, table) = setup(&[(2, 0xA000_0000), (3, 0x5FFF_FFFF)]);
        table.set_next_cluster_id(2, 3);
        assert_eq!(table.raw_entry(2), 0xA000_0003);
        assert_eq!(table.get_next_cluster_id(2), Some(3));

        table.mark_cluster_final(2);
        assert_eq!(table.raw_entry(2), 0xAFFF_FFFF);
        table.mark_cluster_free(3);
        assert_eq!(table.raw_entry(3), 0x5000_0000);

        // the FAT sits in the cluster just before the data region
        assert!(cache.try_get_cluster(-1).unwrap().is_dirty());
    }

    #[test]
    fn released_cluster_is_marked_free() {
        let (_, cache, table) = setup(&[(5, 6), (6, 0x0FFF_FFFF)]);
        // data cluster 5 is cache id 3
        let cluster = cache.get_cluster(3);
        cluster.mark_free_on_release(&table);
        let evicted = cache.evict_cluster(3).unwrap();
        assert_eq!(table.raw_entry(5), 6);

        drop(evicted);
        assert_eq!(table.raw_entry(5), 6);
        drop(cluster);
        assert_eq!(table.raw_entry(5), 0);
        assert_eq!(table.raw_entry(6), 0x0FFF_FFFF);
    }
}
