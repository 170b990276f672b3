//! FAT32 directory entry codec
//!
//! Decoding and encoding of the two 32-byte directory record kinds: the short
//! (8.3) entry and the VFAT long filename fragment. Nothing here touches the
//! disk; callers hand in raw entry bytes taken from a directory cluster.

use alloc::string::String;
use alloc::vec::Vec;
use core::mem;

use super::Diagnostics;

/// Size of one directory record
pub const DIR_ENTRY_SIZE: usize = 32;

/// Directory entry attribute constants
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
/// Attribute value that marks an LFN fragment
pub const ATTR_LONG_NAME: u8 = 0x0F;

/// First name byte of a deleted entry
pub const DIRENT_DELETED: u8 = 0xE5;
/// First name byte of the entry after the last one in use
pub const DIRENT_END: u8 = 0x00;
/// Stored in place of a leading 0xE5 byte, which would read as "deleted"
const DIRENT_KANJI_E5: u8 = 0x05;

pub const LFN_CHARS_PER_ENTRY: usize = 13;
/// A long name is at most 255 characters, i.e. 20 fragments.
pub const LFN_MAX_FRAGMENTS: u8 = 20;
/// Set on the fragment holding the end of the name (stored first on disk)
pub const LFN_LAST_LOGICAL: u8 = 0x40;
const LFN_INDEX_MASK: u8 = 0x1F;
const LFN_RESERVED_SEQUENCE_BITS: u8 = 0xA0;
const LFN_PADDING: u16 = 0xFFFF;

/// FAT32 short (8.3) directory entry
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Fat32DirectoryEntry {
    /// Base name, padded with spaces
    pub name: [u8; 8],
    /// Extension, padded with spaces
    pub extension: [u8; 3],
    pub attributes: u8,
    pub nt_reserved: u8,
    pub creation_time_tenths: u8,
    pub creation_time: u16,
    pub creation_date: u16,
    pub last_access_date: u16,
    /// High 16 bits of cluster number
    pub cluster_high: u16,
    pub modification_time: u16,
    pub modification_date: u16,
    /// Low 16 bits of cluster number
    pub cluster_low: u16,
    /// File size in bytes (0 for directories)
    pub file_size: u32,
}

const _: () = assert!(mem::size_of::<Fat32DirectoryEntry>() == DIR_ENTRY_SIZE);

impl Fat32DirectoryEntry {
    pub fn new(short_name: [u8; 11], attributes: u8, cluster: u32, file_size: u32) -> Self {
        let mut name = [b' '; 8];
        let mut extension = [b' '; 3];
        name.copy_from_slice(&short_name[..8]);
        extension.copy_from_slice(&short_name[8..]);
        Self {
            name,
            extension,
            attributes,
            nt_reserved: 0,
            creation_time_tenths: 0,
            creation_time: 0,
            creation_date: 0,
            last_access_date: 0,
            cluster_high: (cluster >> 16) as u16,
            modification_time: 0,
            modification_date: 0,
            cluster_low: (cluster & 0xFFFF) as u16,
            file_size,
        }
    }

    /// Decode the first 32 bytes of `raw`.
    pub fn from_bytes(raw: &[u8]) -> Self {
        assert!(raw.len() >= DIR_ENTRY_SIZE, "directory entry needs {} bytes, got {}", DIR_ENTRY_SIZE, raw.len());
        // SAFETY: length checked above; the struct is packed plain integers.
        unsafe { core::ptr::read_unaligned(raw.as_ptr() as *const Self) }
    }

    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        // SAFETY: same size, and every byte of the packed struct is initialized.
        unsafe { mem::transmute::<Self, [u8; DIR_ENTRY_SIZE]>(*self) }
    }

    /// Get the starting cluster number
    pub fn cluster(&self) -> u32 {
        (self.cluster_high as u32) << 16 | (self.cluster_low as u32)
    }

    pub fn is_deleted(&self) -> bool {
        self.name[0] == DIRENT_DELETED
    }

    /// Check if this entry marks the end of the directory
    pub fn is_end(&self) -> bool {
        self.name[0] == DIRENT_END
    }

    /// `.` and `..`
    pub fn is_dot(&self) -> bool {
        self.name[0] == b'.'
    }

    pub fn is_long_filename(&self) -> bool {
        self.attributes == ATTR_LONG_NAME
    }

    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    pub fn is_volume_label(&self) -> bool {
        !self.is_long_filename() && self.attributes & ATTR_VOLUME_ID != 0
    }

    /// The raw 11-byte short name, as covered by the LFN checksum
    pub fn short_name(&self) -> [u8; 11] {
        let mut raw = [0u8; 11];
        raw[..8].copy_from_slice(&{ self.name });
        raw[8..].copy_from_slice(&{ self.extension });
        raw
    }

    /// Get the filename in `NAME.EXT` form, padding removed.
    ///
    /// Panics if the entry yields an empty name, which only a corrupt volume
    /// can produce.
    pub fn extract_filename(&self) -> String {
        let mut name = self.name;
        if name[0] == DIRENT_KANJI_E5 {
            name[0] = DIRENT_DELETED;
        }
        let extension = self.extension;

        let mut out = String::with_capacity(12);
        out.extend(trim_padding(&name).iter().map(|&b| b as char));
        out.push('.');
        out.extend(trim_padding(&extension).iter().map(|&b| b as char));
        while out.ends_with('.') {
            out.pop();
        }
        if out.is_empty() {
            panic!(
                "[FAT32] zero-length filename from 8.3 entry (first byte {:#04x}, attributes {:#04x})",
                name[0], self.attributes
            );
        }
        out
    }

    /// VFAT checksum of the short name, as stored in its long name fragments
    pub fn checksum(&self) -> u8 {
        lfn_checksum(&self.short_name())
    }
}

fn trim_padding(field: &[u8]) -> &[u8] {
    let len = field.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    &field[..len]
}

/// Rotate-right-by-one-and-add over the 11 raw short name bytes.
pub fn lfn_checksum(short_name: &[u8; 11]) -> u8 {
    short_name
        .iter()
        .fold(0u8, |sum, &c| ((sum & 1) << 7).wrapping_add(sum >> 1).wrapping_add(c))
}

/// VFAT long filename fragment
///
/// Each fragment carries 13 UCS-2 code units. Fragments are stored in reverse
/// logical order directly before the short entry they decorate, the first one
/// on disk having `LFN_LAST_LOGICAL` set in its sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fat32LongNameEntry {
    pub sequence: u8,
    pub attributes: u8,
    pub vfat_type: u8,
    /// Checksum of the short entry this fragment belongs to
    pub checksum: u8,
    pub zero_cluster: u16,
    pub name: [u16; LFN_CHARS_PER_ENTRY],
}

/// Byte ranges of the three name pieces within the 32-byte record
const LFN_NAME_RANGES: [(usize, usize); 3] = [(1, 5), (14, 6), (28, 2)];

impl Fat32LongNameEntry {
    pub fn from_bytes(raw: &[u8]) -> Self {
        assert!(raw.len() >= DIR_ENTRY_SIZE, "directory entry needs {} bytes, got {}", DIR_ENTRY_SIZE, raw.len());
        let mut name = [0u16; LFN_CHARS_PER_ENTRY];
        let mut units = name.iter_mut();
        for &(start, count) in LFN_NAME_RANGES.iter() {
            for (bytes, unit) in raw[start..start + count * 2].chunks_exact(2).zip(units.by_ref()) {
                *unit = u16::from_le_bytes([bytes[0], bytes[1]]);
            }
        }
        Self {
            sequence: raw[0],
            attributes: raw[11],
            vfat_type: raw[12],
            checksum: raw[13],
            zero_cluster: u16::from_le_bytes([raw[26], raw[27]]),
            name,
        }
    }

    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        raw[0] = self.sequence;
        raw[11] = self.attributes;
        raw[12] = self.vfat_type;
        raw[13] = self.checksum;
        raw[26..28].copy_from_slice(&self.zero_cluster.to_le_bytes());
        let mut units = self.name.iter();
        for &(start, count) in LFN_NAME_RANGES.iter() {
            for (bytes, unit) in raw[start..start + count * 2].chunks_exact_mut(2).zip(units.by_ref()) {
                bytes.copy_from_slice(&unit.to_le_bytes());
            }
        }
        raw
    }

    /// 1-based position of this fragment within the long name
    pub fn index(&self) -> u8 {
        self.sequence & LFN_INDEX_MASK
    }

    /// False for the fragment that starts a new long name on disk
    pub fn is_continuation(&self) -> bool {
        self.sequence & LFN_LAST_LOGICAL == 0
    }

    pub fn validate(&self) -> bool {
        self.zero_cluster == 0
            && self.attributes == ATTR_LONG_NAME
            && self.vfat_type == 0
            && self.sequence & LFN_RESERVED_SEQUENCE_BITS == 0
            && !is_name_terminator(self.name[0])
    }

    /// Decode this fragment's characters, stopping at the terminator.
    ///
    /// Only ASCII is supported; wider code units become `?` and are reported
    /// to `diagnostics`.
    pub fn extract_name_segment(&self, diagnostics: &Diagnostics) -> String {
        let mut out = String::with_capacity(LFN_CHARS_PER_ENTRY);
        for &unit in self.name.iter().take_while(|&&u| !is_name_terminator(u)) {
            if unit > 0xFF {
                diagnostics.report_non_ascii(unit);
                out.push('?');
            } else {
                out.push(unit as u8 as char);
            }
        }
        out
    }
}

fn is_name_terminator(unit: u16) -> bool {
    unit == 0 || unit == LFN_PADDING
}

fn is_short_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || b"!#$%&'()-@^_`{}~".contains(&c)
}

/// Encode `name` as a bare 8.3 entry name if it fits one.
///
/// Returns `None` for names that need long filename fragments: base longer
/// than 8 or extension longer than 3 characters, more than one dot, or
/// characters not allowed in short names. Letters are upper-cased.
pub fn short_filename(name: &str) -> Option<[u8; 11]> {
    let (base, extension) = match name.rsplit_once('.') {
        Some((base, extension)) => (base, extension),
        None => (name, ""),
    };
    if base.is_empty() || base.len() > 8 || extension.len() > 3 {
        return None;
    }
    if !base.bytes().chain(extension.bytes()).all(is_short_name_char) {
        return None;
    }

    let mut out = [b' '; 11];
    for (dst, src) in out[..8].iter_mut().zip(base.bytes()) {
        *dst = src.to_ascii_uppercase();
    }
    for (dst, src) in out[8..].iter_mut().zip(extension.bytes()) {
        *dst = src.to_ascii_uppercase();
    }
    if out[0] == DIRENT_DELETED {
        out[0] = DIRENT_KANJI_E5;
    }
    Some(out)
}

/// Build the `BASIS~N.EXT` short alias stored alongside a long name.
pub fn short_alias(name: &str, ordinal: u32) -> [u8; 11] {
    let (base, extension) = match name.rsplit_once('.') {
        Some((base, extension)) if !base.is_empty() => (base, extension),
        _ => (name, ""),
    };
    let mut tail = [0u8; 10];
    let mut tail_len = 0;
    let mut n = ordinal.max(1);
    while n > 0 {
        tail[tail_len] = b'0' + (n % 10) as u8;
        tail_len += 1;
        n /= 10;
    }
    tail[tail_len] = b'~';
    tail_len += 1;
    let tail = &mut tail[..tail_len];
    tail.reverse();

    let basis_len = 8usize.saturating_sub(tail.len());
    let mut out = [b' '; 11];
    let mut pos = 0;
    for c in base.bytes().filter(|&c| is_short_name_char(c)).take(basis_len) {
        out[pos] = c.to_ascii_uppercase();
        pos += 1;
    }
    if pos == 0 {
        out[0] = b'_';
        pos = 1;
    }
    out[pos..pos + tail.len()].copy_from_slice(tail);
    for (dst, src) in out[8..].iter_mut().zip(extension.bytes().filter(|&c| is_short_name_char(c))) {
        *dst = src.to_ascii_uppercase();
    }
    out
}

/// Encode `name` as long filename fragments in on-disk order.
///
/// The returned records precede the short entry whose 11-byte name has the
/// given `checksum`. Panics on an empty name or one longer than 255 units.
pub fn encode_long_name(name: &str, checksum: u8) -> Vec<[u8; DIR_ENTRY_SIZE]> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let fragments = units.len().div_ceil(LFN_CHARS_PER_ENTRY);
    assert!(
        fragments >= 1 && fragments <= LFN_MAX_FRAGMENTS as usize,
        "long filename of {} units cannot be encoded",
        units.len()
    );

    (1..=fragments)
        .rev()
        .map(|index| {
            let start = (index - 1) * LFN_CHARS_PER_ENTRY;
            let mut chunk = [LFN_PADDING; LFN_CHARS_PER_ENTRY];
            let piece = &units[start..units.len().min(start + LFN_CHARS_PER_ENTRY)];
            chunk[..piece.len()].copy_from_slice(piece);
            if piece.len() < LFN_CHARS_PER_ENTRY {
                chunk[piece.len()] = 0;
            }
            let mut sequence = index as u8;
            if index == fragments {
                sequence |= LFN_LAST_LOGICAL;
            }
            Fat32LongNameEntry {
                sequence,
                attributes: ATTR_LONG_NAME,
                vfat_type: 0,
                checksum,
                zero_cluster: 0,
                name: chunk,
            }
            .to_bytes()
        })
        .collect()
}

/// Reassembles long names from fragments met during a directory scan.
///
/// Fragments arrive last-logical-first; each segment is prepended to the
/// pending name. Any break in the sequence drops the pending name, and the
/// short entry that follows falls back to its 8.3 name.
#[derive(Debug, Default)]
pub struct LongNameAssembler {
    pending: bool,
    checksum: u8,
    last_index: u8,
    name: String,
}

impl LongNameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    fn discard(&mut self) {
        self.pending = false;
        self.name.clear();
    }

    /// Feed one long filename fragment.
    pub fn push_fragment(&mut self, fragment: &Fat32LongNameEntry, diagnostics: &Diagnostics) {
        let index = fragment.index();
        if !fragment.validate() || index == 0 || index > LFN_MAX_FRAGMENTS {
            diagnostics.report_invalid_lfn();
            self.discard();
            return;
        }

        if fragment.is_continuation() {
            if !self.pending
                || self.checksum != fragment.checksum
                || self.last_index == 1
                || self.last_index - 1 != index
            {
                diagnostics.report_invalid_lfn();
                self.discard();
                return;
            }
        } else {
            if self.pending {
                // previous name never reached its short entry
                diagnostics.report_invalid_lfn();
            }
            self.name.clear();
            self.pending = true;
            self.checksum = fragment.checksum;
        }

        self.last_index = index;
        let segment = fragment.extract_name_segment(diagnostics);
        self.name.insert_str(0, &segment);
    }

    /// Resolve the name of the short entry that ends the current run.
    pub fn finish(&mut self, entry: &Fat32DirectoryEntry, diagnostics: &Diagnostics) -> String {
        let complete = self.pending && self.last_index == 1 && self.checksum == entry.checksum();
        let name = if complete {
            mem::take(&mut self.name)
        } else {
            if self.pending {
                diagnostics.report_invalid_lfn();
            }
            entry.extract_filename()
        };
        self.discard();
        name
    }

    /// Called once the scan is over; a dangling long name is reported.
    pub fn end_of_directory(&mut self, diagnostics: &Diagnostics) {
        if self.pending {
            diagnostics.report_invalid_lfn();
        }
        self.discard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_entry(name: &[u8; 11]) -> Fat32DirectoryEntry {
        Fat32DirectoryEntry::new(*name, ATTR_ARCHIVE, 5, 100)
    }

    fn assemble(name: &str, alias: &[u8; 11], diagnostics: &Diagnostics) -> String {
        let entry = short_entry(alias);
        let mut assembler = LongNameAssembler::new();
        for raw in encode_long_name(name, entry.checksum()) {
            assembler.push_fragment(&Fat32LongNameEntry::from_bytes(&raw), diagnostics);
        }
        assembler.finish(&entry, diagnostics)
    }

    #[test]
    fn short_entry_layout() {
        let entry = Fat32DirectoryEntry::new(*b"README  TXT", ATTR_ARCHIVE, 0x0012_3456, 4321);
        let raw = entry.to_bytes();
        assert_eq!(&raw[0..11], b"README  TXT");
        assert_eq!(raw[11], ATTR_ARCHIVE);
        assert_eq!(&raw[20..22], &[0x12, 0x00]);
        assert_eq!(&raw[26..28], &[0x56, 0x34]);
        assert_eq!(&raw[28..32], &4321u32.to_le_bytes());

        let back = Fat32DirectoryEntry::from_bytes(&raw);
        assert_eq!(back.cluster(), 0x0012_3456);
        assert_eq!({ back.file_size }, 4321);
        assert!(!back.is_directory());
        assert!(!back.is_volume_label());
    }

    #[test]
    fn extract_filename_trims_padding() {
        assert_eq!(short_entry(b"README  TXT").extract_filename(), "README.TXT");
        assert_eq!(short_entry(b"README     ").extract_filename(), "README");
        assert_eq!(short_entry(b"A       B  ").extract_filename(), "A.B");
        assert_eq!(short_entry(b"\x05BC        ").extract_filename(), "\u{e5}BC");
    }

    #[test]
    #[should_panic(expected = "zero-length filename")]
    fn extract_filename_rejects_blank_entry() {
        short_entry(b"           ").extract_filename();
    }

    #[test]
    fn checksum_matches_known_value() {
        assert_eq!(lfn_checksum(b"FOO     BAR"), 0x53);
        assert_eq!(short_entry(b"FOO     BAR").checksum(), 0x53);
        assert_ne!(lfn_checksum(b"FOO     BAR"), lfn_checksum(b"FOO     BAS"));
    }

    #[test]
    fn short_filename_round_trip() {
        for name in ["readme", "a.txt", "Makefile", "x_1-2.c", "ABCDEFGH.IJK"] {
            let encoded = short_filename(name).unwrap();
            let decoded = short_entry(&encoded).extract_filename();
            assert_eq!(decoded.to_ascii_lowercase(), name.to_ascii_lowercase());
        }
    }

    #[test]
    fn short_filename_rejects_long_or_odd_names() {
        assert_eq!(short_filename("verylongname.txt"), None);
        assert_eq!(short_filename("a.html"), None);
        assert_eq!(short_filename("two.dots.c"), None);
        assert_eq!(short_filename("with space"), None);
        assert_eq!(short_filename(".hidden"), None);
        assert_eq!(short_filename(""), None);
    }

    #[test]
    fn short_alias_shape() {
        assert_eq!(&short_alias("verylongname.txt", 1), b"VERYLO~1TXT");
        assert_eq!(&short_alias("a b c.html", 12), b"ABC~12  HTM");
        assert_eq!(&short_alias("...", 3), b"_~3        ");
    }

    #[test]
    fn long_name_fragments_layout() {
        let fragments = encode_long_name("verylongname.txt", 0x5A);
        assert_eq!(fragments.len(), 2);

        let first = Fat32LongNameEntry::from_bytes(&fragments[0]);
        assert_eq!(first.index(), 2);
        assert!(!first.is_continuation());
        assert!(first.validate());
        assert_eq!(first.checksum, 0x5A);
        assert_eq!(&first.name[..5], &[b't' as u16, b'x' as u16, b't' as u16, 0, 0xFFFF]);

        let second = Fat32LongNameEntry::from_bytes(&fragments[1]);
        assert_eq!(second.index(), 1);
        assert!(second.is_continuation());
        assert_eq!(Fat32LongNameEntry::from_bytes(&second.to_bytes()), second);
        assert_eq!(fragments[1][11], ATTR_LONG_NAME);
    }

    #[test]
    fn long_name_round_trip() {
        let diagnostics = Diagnostics::new();
        for name in [
            "verylongname.txt",
            "exactly13char",
            "a name spanning three fragments.text",
            "Mixed Case Name.Rs",
        ] {
            assert_eq!(assemble(name, &short_alias(name, 1), &diagnostics), name);
        }
        assert_eq!(diagnostics.invalid_lfn_count(), 0);
    }

    #[test]
    fn checksum_mismatch_falls_back_to_short_name() {
        let diagnostics = Diagnostics::new();
        let entry = short_entry(b"VERYLO~1TXT");
        let mut assembler = LongNameAssembler::new();
        for raw in encode_long_name("verylongname.txt", entry.checksum().wrapping_add(1)) {
            assembler.push_fragment(&Fat32LongNameEntry::from_bytes(&raw), &diagnostics);
        }
        assert_eq!(assembler.finish(&entry, &diagnostics), "VERYLO~1.TXT");
        assert_eq!(diagnostics.invalid_lfn_count(), 1);
        assert!(!assembler.is_pending());
    }

    #[test]
    fn missing_fragment_discards_pending_name() {
        let diagnostics = Diagnostics::new();
        let entry = short_entry(b"ANAMES~1TEX");
        let fragments = encode_long_name("a name spanning three fragments.text", entry.checksum());
        assert_eq!(fragments.len(), 3);

        let mut assembler = LongNameAssembler::new();
        // skip the middle fragment
        assembler.push_fragment(&Fat32LongNameEntry::from_bytes(&fragments[0]), &diagnostics);
        assembler.push_fragment(&Fat32LongNameEntry::from_bytes(&fragments[2]), &diagnostics);
        assert!(!assembler.is_pending());
        assert_eq!(assembler.finish(&entry, &diagnostics), "ANAMES~1.TEX");
        assert_eq!(diagnostics.invalid_lfn_count(), 1);
    }

    #[test]
    fn restarted_name_replaces_abandoned_one() {
        let diagnostics = Diagnostics::new();
        let entry = short_entry(b"SECOND~1TXT");
        let mut assembler = LongNameAssembler::new();
        let abandoned = encode_long_name("first long name.txt", 0x11);
        assembler.push_fragment(&Fat32LongNameEntry::from_bytes(&abandoned[0]), &diagnostics);
        for raw in encode_long_name("second long name.txt", entry.checksum()) {
            assembler.push_fragment(&Fat32LongNameEntry::from_bytes(&raw), &diagnostics);
        }
        assert_eq!(assembler.finish(&entry, &diagnostics), "second long name.txt");
        assert_eq!(diagnostics.invalid_lfn_count(), 1);
    }

    #[test]
    fn invalid_fragment_is_rejected() {
        let diagnostics = Diagnostics::new();
        let mut raw = encode_long_name("short", 0)[0];
        raw[26] = 1; // non-zero cluster field
        let fragment = Fat32LongNameEntry::from_bytes(&raw);
        assert!(!fragment.validate());

        let mut assembler = LongNameAssembler::new();
        assembler.push_fragment(&fragment, &diagnostics);
        assert!(!assembler.is_pending());
        assembler.end_of_directory(&diagnostics);
        assert_eq!(diagnostics.invalid_lfn_count(), 1);

        let mut reserved = Fat32LongNameEntry::from_bytes(&encode_long_name("short", 0)[0]);
        reserved.sequence |= 0x80;
        assert!(!reserved.validate());
        reserved.sequence &= !0x80;
        reserved.name[0] = 0xFFFF;
        assert!(!reserved.validate());
    }

    #[test]
    fn dangling_name_reported_at_end() {
        let diagnostics = Diagnostics::new();
        let mut assembler = LongNameAssembler::new();
        for raw in encode_long_name("orphaned fragment", 0x42) {
            assembler.push_fragment(&Fat32LongNameEntry::from_bytes(&raw), &diagnostics);
        }
        assert!(assembler.is_pending());
        assembler.end_of_directory(&diagnostics);
        assert!(!assembler.is_pending());
        assert_eq!(diagnostics.invalid_lfn_count(), 1);
    }

    #[test]
    fn non_ascii_units_are_replaced() {
        let diagnostics = Diagnostics::new();
        let mut fragment = Fat32LongNameEntry::from_bytes(&encode_long_name("abc", 0)[0]);
        fragment.name[1] = 0x3042;
        assert_eq!(fragment.extract_name_segment(&diagnostics), "a?c");
        fragment.name[2] = 0x4E00;
        assert_eq!(fragment.extract_name_segment(&diagnostics), "a??");
        assert_eq!(diagnostics.non_ascii_count(), 3);
    }
}
