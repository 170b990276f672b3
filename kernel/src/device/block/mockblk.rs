use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use spin::Mutex;

use super::BlockDevice;

/// In-memory block device.
///
/// Sectors are stored sparsely: a sector that was never written reads back as
/// zeroes and costs nothing, so a volume geometry that needs hundreds of
/// megabytes on paper can be simulated with a handful of populated sectors.
///
/// Every read is counted per starting offset, which lets callers assert how
/// many times a given region was fetched from "disk".
pub struct MockBlockDevice {
    id: u32,
    disk_name: &'static str,
    sector_size: usize,
    sector_count: usize,
    data: Mutex<BTreeMap<usize, Vec<u8>>>,
    reads: Mutex<BTreeMap<u64, usize>>,
    total_reads: AtomicUsize,
    read_delay: AtomicUsize,
    fail_reads: AtomicBool,
    short_reads: AtomicBool,
}

impl MockBlockDevice {
    pub fn new(disk_name: &'static str, sector_size: usize, sector_count: usize) -> Self {
        Self {
            id: 0,
            disk_name,
            sector_size,
            sector_count,
            data: Mutex::new(BTreeMap::new()),
            reads: Mutex::new(BTreeMap::new()),
            total_reads: AtomicUsize::new(0),
            read_delay: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            short_reads: AtomicBool::new(false),
        }
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    pub fn sector_count(&self) -> usize {
        self.sector_count
    }

    /// Write `buffer` at the absolute byte `offset`.
    ///
    /// Panics if the write runs past the end of the device.
    pub fn write_at(&self, buffer: &[u8], offset: u64) {
        let offset = offset as usize;
        assert!(
            offset + buffer.len() <= self.get_disk_size(),
            "write of {} bytes at {} runs past the end of the device",
            buffer.len(),
            offset
        );
        let mut data = self.data.lock();
        let mut done = 0;
        while done < buffer.len() {
            let pos = offset + done;
            let sector = pos / self.sector_size;
            let within = pos % self.sector_size;
            let len = (self.sector_size - within).min(buffer.len() - done);
            let sector_data = data.entry(sector).or_insert_with(|| vec![0; self.sector_size]);
            sector_data[within..within + len].copy_from_slice(&buffer[done..done + len]);
            done += len;
        }
    }

    /// Number of reads that started at exactly `offset`.
    pub fn reads_at(&self, offset: u64) -> usize {
        self.reads.lock().get(&offset).copied().unwrap_or(0)
    }

    pub fn total_reads(&self) -> usize {
        self.total_reads.load(Ordering::SeqCst)
    }

    /// Busy-wait for `spins` iterations inside every read, to widen race windows.
    pub fn set_read_delay(&self, spins: usize) {
        self.read_delay.store(spins, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every read stop one byte short of what was asked for.
    pub fn set_short_reads(&self, short: bool) {
        self.short_reads.store(short, Ordering::SeqCst);
    }
}

impl BlockDevice for MockBlockDevice {
    fn get_id(&self) -> u32 {
        self.id
    }

    fn get_disk_name(&self) -> &'static str {
        self.disk_name
    }

    fn get_disk_size(&self) -> usize {
        self.sector_size * self.sector_count
    }

    fn read_at(&self, buffer: &mut [u8], offset: u64) -> Result<usize, &'static str> {
        self.total_reads.fetch_add(1, Ordering::SeqCst);
        *self.reads.lock().entry(offset).or_insert(0) += 1;

        for _ in 0..self.read_delay.load(Ordering::Relaxed) {
            core::hint::spin_loop();
        }

        if self.fail_reads.load(Ordering::SeqCst) {
            return Err("Injected read failure");
        }

        let disk_size = self.get_disk_size() as u64;
        if offset >= disk_size {
            return Ok(0);
        }
        let mut len = buffer.len().min((disk_size - offset) as usize);
        if self.short_reads.load(Ordering::SeqCst) && len > 0 {
            len -= 1;
        }

        let data = self.data.lock();
        let offset = offset as usize;
        let mut done = 0;
        while done < len {
            let pos = offset + done;
            let sector = pos / self.sector_size;
            let within = pos % self.sector_size;
            let chunk = (self.sector_size - within).min(len - done);
            match data.get(&sector) {
                Some(sector_data) => buffer[done..done + chunk].copy_from_slice(&sector_data[within..within + chunk]),
                None => buffer[done..done + chunk].fill(0),
            }
            done += chunk;
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_sectors_read_as_zero() {
        let dev = MockBlockDevice::new("mock", 512, 1 << 20);
        let mut buf = [0xFFu8; 1024];
        assert_eq!(dev.read_at(&mut buf, 4096), Ok(1024));
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn writes_straddling_sectors_round_trip() {
        let dev = MockBlockDevice::new("mock", 512, 16);
        let pattern: Vec<u8> = (0..700u32).map(|i| i as u8).collect();
        dev.write_at(&pattern, 300);

        let mut buf = vec![0u8; 700];
        dev.read_exact_at(&mut buf, 300).unwrap();
        assert_eq!(buf, pattern);
        assert_eq!(dev.reads_at(300), 1);
        assert_eq!(dev.total_reads(), 1);
    }

    #[test]
    fn read_past_end_is_short() {
        let dev = MockBlockDevice::new("mock", 512, 2);
        let mut buf = [0u8; 512];
        assert_eq!(dev.read_at(&mut buf, 768), Ok(256));
        assert!(dev.read_exact_at(&mut buf, 768).is_err());
    }

    #[test]
    fn injected_failures() {
        let dev = MockBlockDevice::new("mock", 512, 2);
        let mut buf = [0u8; 16];
        dev.set_short_reads(true);
        assert_eq!(dev.read_at(&mut buf, 0), Ok(15));
        dev.set_short_reads(false);
        dev.set_fail_reads(true);
        assert!(dev.read_at(&mut buf, 0).is_err());
    }
}
