use crate::storage_view::RawBuffer;

/// Builds a 16-byte buffer with bytes `0x00..0x0f`, as in `spec.md` §8 S1.
pub fn sequential_bytes(start: u8, len: usize) -> RawBuffer {
    RawBuffer::new((0..len as u32).map(|i| start.wrapping_add(i as u8)).collect(), 1)
}
