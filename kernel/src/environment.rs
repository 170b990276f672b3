pub const PAGE_SIZE: usize = 0x1000; // 4KB
pub const SECTOR_SIZE: usize = 512;
pub const DEFAULT_CLUSTER_CACHE_BYTES: usize = 0x100000; // 1MB
