//! Block device boundary.
//!
//! The FAT32 driver only ever issues synchronous, byte-addressed reads. There
//! is no request queue and no partial-read contract: a device either fills the
//! whole buffer or the caller treats the result as a failure.

pub mod mockblk;

pub trait BlockDevice: Send + Sync {
    /// Device number, reported as `device_id` in file metadata.
    fn get_id(&self) -> u32;

    fn get_disk_name(&self) -> &'static str;

    /// Size of the device in bytes.
    fn get_disk_size(&self) -> usize;

    /// Read `buffer.len()` bytes starting at the absolute byte `offset`.
    ///
    /// # Returns
    /// The number of bytes actually read, which may be smaller than the
    /// buffer when the request runs off the end of the device.
    fn read_at(&self, buffer: &mut [u8], offset: u64) -> Result<usize, &'static str>;

    /// Like `read_at`, but a short read is reported as an error.
    fn read_exact_at(&self, buffer: &mut [u8], offset: u64) -> Result<(), &'static str> {
        let read = self.read_at(buffer, offset)?;
        if read != buffer.len() {
            return Err("Short read from block device");
        }
        Ok(())
    }
}
