//! FAT32 cluster cache
//!
//! Maps cluster ids to reference-counted, page-backed copies of the cluster
//! on disk. Ids are relative to the first data cluster: id 0 is FAT cluster
//! number 2, and negative ids address the bytes before the data region (the
//! allocation table lives there).
//!
//! The lookup table owns one `Arc` per resident cluster. Eviction removes
//! only entries nobody else holds, so a caller's handle always stays valid;
//! a handle that outlives its table entry simply keeps the cluster alive
//! until it is dropped.

use alloc::collections::BTreeMap;
use alloc::sync::{Arc, Weak};
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use hashbrown::HashMap;
use spin::{Once, RwLock};

use super::alloc_table::AllocationTable;
use super::structures::FAT32_FIRST_DATA_CLUSTER;
use crate::device::block::BlockDevice;
use crate::environment::PAGE_SIZE;
use crate::mem::page::{allocate_frames, FramesRead, FramesWrite, PageFrames, PageRef};

/// Immutable parameters shared by the cache and every cluster it hands out.
///
/// Clusters hold their own handle, so one can finish populating even after
/// the cache that created it has been torn down.
pub struct CacheMetadata {
    pub device: Arc<dyn BlockDevice>,
    pub max_clusters: usize,
    pub cluster_size: usize,
    /// Absolute disk byte offset of cluster id 0
    pub first_cluster_offset: u64,
}

impl fmt::Debug for CacheMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheMetadata")
            .field("device", &self.device.get_disk_name())
            .field("max_clusters", &self.max_clusters)
            .field("cluster_size", &self.cluster_size)
            .field("first_cluster_offset", &self.first_cluster_offset)
            .finish()
    }
}

/// One cached cluster.
///
/// The backing frames are allocated and filled from disk on first access;
/// concurrent first accesses wait for that single read to finish.
pub struct Cluster {
    id: i64,
    metadata: Arc<CacheMetadata>,
    frames: Once<Arc<PageFrames>>,
    dirty: AtomicBool,
    free_on_release: Once<Weak<AllocationTable>>,
}

impl Cluster {
    fn new(id: i64, metadata: Arc<CacheMetadata>) -> Self {
        Self {
            id,
            metadata,
            frames: Once::new(),
            dirty: AtomicBool::new(false),
            free_on_release: Once::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    fn frames(&self) -> &Arc<PageFrames> {
        self.frames.call_once(|| self.populate())
    }

    fn populate(&self) -> Arc<PageFrames> {
        let cluster_size = self.metadata.cluster_size;
        let frames = allocate_frames(cluster_size / PAGE_SIZE);

        let mut offset = cluster_size as i64 * self.id + self.metadata.first_cluster_offset as i64;
        if offset <= -(cluster_size as i64) {
            panic!(
                "[FAT32] cluster {} starts too far before the start of disk: {} <= -{}",
                self.id, offset, cluster_size
            );
        }

        let mut bytes = frames.write();
        let mut start = 0;
        if offset < 0 {
            // Frames come zeroed, which covers the part before the disk.
            start = offset.unsigned_abs() as usize;
            offset = 0;
        }
        if let Err(err) = self.metadata.device.read_exact_at(&mut bytes[start..], offset as u64) {
            panic!(
                "[FAT32] failed to read cluster {} ({} bytes at disk offset {}): {}",
                self.id,
                cluster_size - start,
                offset,
                err
            );
        }
        drop(bytes);
        frames
    }

    /// Cluster contents; blocks until the first population has finished.
    pub fn data(&self) -> FramesRead<'_> {
        self.frames().read()
    }

    /// Mutable cluster contents. Marks the cluster dirty.
    pub fn data_mut(&self) -> FramesWrite<'_> {
        let frames = self.frames();
        self.mark_dirty();
        frames.write()
    }

    /// Address of the cluster buffer, stable for the lifetime of the cluster.
    pub fn as_ptr(&self) -> *const u8 {
        self.frames().as_ptr()
    }

    /// Reference to one page of the buffer; it stays valid after eviction.
    pub fn page_ref(&self, page: usize) -> PageRef {
        self.frames().page_ref(page)
    }

    pub fn is_populated(&self) -> bool {
        self.frames.is_completed()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Once the last handle to this cluster is dropped, mark its data cluster
    /// free in `table`. Only the first call has an effect.
    pub fn mark_free_on_release(&self, table: &Arc<AllocationTable>) {
        self.free_on_release.call_once(|| Arc::downgrade(table));
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        if self.is_dirty() {
            // TODO: write dirty clusters back once the block layer grows a write path
            log::debug!("[FAT32] dropping dirty cluster {} without writeback", self.id);
        }
        let Some(table) = self.free_on_release.get().and_then(Weak::upgrade) else {
            return;
        };
        if self.id >= 0 {
            table.mark_cluster_free(self.id as u32 + FAT32_FIRST_DATA_CLUSTER);
        }
    }
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("id", &self.id)
            .field("populated", &self.is_populated())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

struct Slot {
    cluster: Arc<Cluster>,
    /// Key of this entry in `CacheTable::order`
    seq: u64,
}

/// Lookup table plus the eviction ring, ordered by insertion.
struct CacheTable {
    slots: HashMap<i64, Slot>,
    order: BTreeMap<u64, i64>,
    /// Where the next eviction walk starts
    cursor: u64,
    next_seq: u64,
}

impl CacheTable {
    fn new(capacity: usize) -> Self {
        Self {
            slots: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
            cursor: 0,
            next_seq: 0,
        }
    }

    fn insert(&mut self, id: i64, cluster: Arc<Cluster>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, id);
        self.slots.insert(id, Slot { cluster, seq });
    }

    fn remove(&mut self, id: i64) -> Option<Arc<Cluster>> {
        let slot = self.slots.remove(&id)?;
        self.order.remove(&slot.seq);
        Some(slot.cluster)
    }

    /// Remove one entry that only the table references.
    ///
    /// Walks the ring once starting at the cursor and leaves the cursor just
    /// past the evicted entry. The removed handle is returned so the caller
    /// can drop it after releasing the table lock.
    fn evict_unused(&mut self) -> Option<Arc<Cluster>> {
        let slots = &self.slots;
        let (seq, id) = self
            .order
            .range(self.cursor..)
            .chain(self.order.range(..self.cursor))
            .find(|(_, id)| slots.get(*id).is_some_and(|slot| Arc::strong_count(&slot.cluster) == 1))
            .map(|(&seq, &id)| (seq, id))?;
        self.cursor = seq + 1;
        self.remove(id)
    }
}

/// Bounded cache of disk clusters.
pub struct ClusterCache {
    metadata: Arc<CacheMetadata>,
    table: RwLock<CacheTable>,
}

impl ClusterCache {
    pub fn new(
        device: Arc<dyn BlockDevice>,
        max_clusters: usize,
        cluster_size: usize,
        first_cluster_offset: u64,
    ) -> Self {
        assert!(max_clusters > 0, "cluster cache needs room for at least one cluster");
        assert!(
            cluster_size > 0 && cluster_size % PAGE_SIZE == 0,
            "cluster size {} is not a multiple of the page size",
            cluster_size
        );
        Self {
            metadata: Arc::new(CacheMetadata {
                device,
                max_clusters,
                cluster_size,
                first_cluster_offset,
            }),
            table: RwLock::new(CacheTable::new(max_clusters)),
        }
    }

    pub fn metadata(&self) -> &Arc<CacheMetadata> {
        &self.metadata
    }

    pub fn cluster_size(&self) -> usize {
        self.metadata.cluster_size
    }

    /// Device number of the underlying block device
    pub fn devno(&self) -> u32 {
        self.metadata.device.get_id()
    }

    pub fn clusters_used(&self) -> usize {
        self.table.read().slots.len()
    }

    pub fn max_clusters_used(&self) -> usize {
        self.metadata.max_clusters
    }

    /// Get the cluster with the given id, reading it from disk if needed.
    ///
    /// Panics if the cache is full and every resident cluster is held by
    /// someone, or if the disk read fails.
    pub fn get_cluster(&self, id: i64) -> Arc<Cluster> {
        if let Some(cluster) = self.try_get_cluster(id) {
            cluster.frames();
            return cluster;
        }

        let mut evicted = None;
        let cluster = {
            let mut table = self.table.write();
            match table.slots.get(&id) {
                Some(slot) => Arc::clone(&slot.cluster),
                None => {
                    if table.slots.len() >= self.metadata.max_clusters {
                        evicted = table.evict_unused();
                        if evicted.is_none() {
                            panic!("[FAT32] entire FAT32 cluster cache used up by unfreeable clusters");
                        }
                    }
                    let cluster = Arc::new(Cluster::new(id, Arc::clone(&self.metadata)));
                    table.insert(id, Arc::clone(&cluster));
                    cluster
                }
            }
        };
        if let Some(old) = evicted {
            log::debug!("[FAT32] evicted cluster {} to make room for {}", old.id(), id);
            // Dropped outside the table lock: a release hook may call back into the cache.
            drop(old);
        }

        cluster.frames();
        cluster
    }

    /// Cluster containing the absolute disk byte `offset`, plus the offset
    /// of that byte within the cluster.
    pub fn get_cluster_for_disk_byte_offset(&self, offset: u64) -> (Arc<Cluster>, usize) {
        let cluster_size = self.metadata.cluster_size as i64;
        let from_base = offset as i64 - self.metadata.first_cluster_offset as i64;
        let id = from_base.div_euclid(cluster_size);
        let within = from_base.rem_euclid(cluster_size) as usize;
        (self.get_cluster(id), within)
    }

    /// Resident cluster with the given id, without touching the disk.
    pub fn try_get_cluster(&self, id: i64) -> Option<Arc<Cluster>> {
        self.table.read().slots.get(&id).map(|slot| Arc::clone(&slot.cluster))
    }

    /// Drop the table's reference to a cluster whose contents are stale.
    ///
    /// Returns the cluster if it was resident, so the caller can decide what
    /// happens when the last handle goes away.
    pub fn evict_cluster(&self, id: i64) -> Option<Arc<Cluster>> {
        self.table.write().remove(id)
    }
}

impl fmt::Debug for ClusterCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterCache")
            .field("metadata", &self.metadata)
            .field("clusters_used", &self.clusters_used())
            .finish()
    }
}
