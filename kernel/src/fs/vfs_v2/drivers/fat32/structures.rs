//! FAT32 data structures
//!
//! On-disk boot sector layout, the geometry derived from it, and the FAT
//! entry constants. The layout follows Microsoft's FAT32 documentation.

use core::mem;

use crate::environment::SECTOR_SIZE;

/// FAT32 Boot Sector structure
///
/// This structure represents the boot sector (first sector) of a FAT32 filesystem.
/// It contains essential information about the filesystem layout and parameters.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Fat32BootSector {
    /// Jump instruction (`EB xx 90`)
    pub jump_instruction: [u8; 3],
    /// OEM name (8 bytes)
    pub oem_name: [u8; 8],
    /// Bytes per sector (must be 512)
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    /// Number of reserved sectors (including boot sector)
    pub reserved_sectors: u16,
    /// Number of FAT copies (typically 2)
    pub fat_count: u8,
    /// Maximum number of root directory entries (0 for FAT32)
    pub max_root_entries: u16,
    /// Total sectors (16-bit, 0 if the 32-bit field is used)
    pub total_sectors_16: u16,
    pub media_descriptor: u8,
    /// Sectors per FAT (16-bit, only for FAT12/FAT16)
    pub sectors_per_fat_16: u16,
    pub sectors_per_track: u16,
    pub heads: u16,
    pub hidden_sectors: u32,
    /// Total sectors (32-bit)
    pub total_sectors_32: u32,
    /// Sectors per FAT (32-bit)
    pub sectors_per_fat_32: u32,
    /// Extended flags (FAT mirroring); must be 0
    pub extended_flags: u16,
    pub fs_version: u16,
    /// Root directory cluster number
    pub root_cluster: u32,
    pub fs_info_sector: u16,
    pub backup_boot_sector: u16,
    pub reserved: [u8; 12],
    pub drive_number: u8,
    pub reserved1: u8,
    /// Extended boot signature (0x28 or 0x29)
    pub boot_signature: u8,
    pub volume_serial: u32,
    /// Volume label, padded with spaces
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
    pub boot_code: [u8; 420],
    /// Boot sector signature (0xAA55)
    pub signature: u16,
}

impl Fat32BootSector {
    /// Reinterpret a raw 512-byte sector as a boot sector.
    pub fn from_bytes(bytes: &[u8; SECTOR_SIZE]) -> Self {
        // SAFETY: the struct is packed, exactly SECTOR_SIZE bytes, and made of
        // plain integers, so every bit pattern is a valid value.
        unsafe { mem::transmute::<[u8; SECTOR_SIZE], Self>(*bytes) }
    }

    pub fn to_bytes(&self) -> [u8; SECTOR_SIZE] {
        // SAFETY: see `from_bytes`.
        unsafe { mem::transmute::<Self, [u8; SECTOR_SIZE]>(*self) }
    }

    /// Get the total number of sectors
    pub fn total_sectors(&self) -> u32 {
        if self.total_sectors_16 != 0 {
            self.total_sectors_16 as u32
        } else {
            self.total_sectors_32
        }
    }

    pub fn sectors_per_fat(&self) -> u32 {
        if self.sectors_per_fat_16 != 0 {
            self.sectors_per_fat_16 as u32
        } else {
            self.sectors_per_fat_32
        }
    }

    pub fn first_fat_sector(&self) -> u32 {
        self.reserved_sectors as u32
    }

    /// Calculate the first data sector
    ///
    /// FAT32 keeps the root directory in the data region, so there is no
    /// fixed root directory area to skip. Computed in 64 bits so that no
    /// header, however corrupt, can overflow it.
    pub fn first_data_sector(&self) -> u64 {
        self.first_fat_sector() as u64 + self.fat_count as u64 * self.sectors_per_fat() as u64
    }

    /// Calculate the number of data sectors (0 for a nonsensical layout)
    pub fn data_sectors(&self) -> u32 {
        // Never larger than total_sectors(), so it fits back into u32.
        (self.total_sectors() as u64).saturating_sub(self.first_data_sector()) as u32
    }

    /// Calculate the number of data clusters
    pub fn data_clusters(&self) -> u32 {
        match self.sectors_per_cluster {
            0 => 0,
            spc => self.data_sectors() / spc as u32,
        }
    }

    pub fn cluster_size(&self) -> usize {
        self.sectors_per_cluster as usize * SECTOR_SIZE
    }

    /// Check whether this sector describes a FAT32 volume this driver accepts.
    ///
    /// Volumes whose cluster count places them in FAT12/FAT16 or exFAT
    /// territory are rejected, as are layouts with hidden sectors, non-512
    /// byte sectors, or mirrored-FAT flags.
    pub fn check_signature(&self) -> bool {
        // The middle jump byte varies between formatters.
        if self.jump_instruction[0] != 0xEB || self.jump_instruction[2] != 0x90 {
            return false;
        }
        if self.max_root_entries != 0 {
            return false;
        }
        if self.sectors_per_cluster == 0 {
            return false;
        }
        let clusters = self.data_clusters();
        if !(FAT32_MIN_CLUSTERS..FAT32_MAX_CLUSTERS).contains(&clusters) {
            return false;
        }
        if self.bytes_per_sector as usize != SECTOR_SIZE {
            return false;
        }
        if self.fat_count < 1 {
            return false;
        }
        if self.hidden_sectors != 0 {
            return false;
        }
        if self.extended_flags != 0 {
            return false;
        }
        if self.boot_signature != 0x28 && self.boot_signature != 0x29 {
            return false;
        }
        self.signature == 0xAA55
    }
}

/// FAT entry constants
pub const FAT32_ENTRY_MASK: u32 = 0x0FFF_FFFF;
pub const FAT32_EOC: u32 = 0x0FFF_FFF8; // End of chain marker (and above)
pub const FAT32_BAD: u32 = 0x0FFF_FFF7; // Bad cluster marker
pub const FAT32_FREE: u32 = 0x0000_0000; // Free cluster marker
pub const FAT32_CHAIN_END: u32 = 0x0FFF_FFFF; // Written to terminate a chain
pub const FAT32_ENTRY_SIZE: usize = 4;

/// Data cluster numbering starts at 2; entries 0 and 1 are reserved.
pub const FAT32_FIRST_DATA_CLUSTER: u32 = 2;

/// Cluster counts outside `[FAT32_MIN_CLUSTERS, FAT32_MAX_CLUSTERS)` are not FAT32.
pub const FAT32_MIN_CLUSTERS: u32 = 0xFFF5;
pub const FAT32_MAX_CLUSTERS: u32 = 0x0FFF_FFF5;

const _: () = assert!(mem::size_of::<Fat32BootSector>() == SECTOR_SIZE);
