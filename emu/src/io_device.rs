/// Byte-addressable register file exposed to the system bus.
///
/// `size` is the access width in bytes and is one of 1, 2, 4 or 8.
/// `read` takes `&mut self` because a read is allowed to have
/// device-visible side effects.
pub trait MmioDevice {
    fn read(&mut self, offset: usize, size: usize) -> u64;
    fn write(&mut self, offset: usize, value: u64, size: usize);

    /// Number of byte offsets the device decodes, starting at 0.
    fn address_space_size(&self) -> usize;
}
