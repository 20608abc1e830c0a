use std::marker::PhantomData;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Append-only byte sink whose multi-byte integers use the byte order `E`.
///
/// Both binary containers are assembled through this type: the WAV encoder
/// with [`LittleEndianWriter`] and the OT encoder with [`BigEndianWriter`].
#[derive(Debug, Clone)]
pub struct EndianWriter<E> {
    bytes: Vec<u8>,
    _order: PhantomData<E>,
}

pub type BigEndianWriter = EndianWriter<BigEndian>;
pub type LittleEndianWriter = EndianWriter<LittleEndian>;

impl<E: ByteOrder> Default for EndianWriter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ByteOrder> EndianWriter<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            _order: PhantomData,
        }
    }

    pub fn tag(&mut self, tag: &[u8; 4]) -> &mut Self {
        self.bytes.extend_from_slice(tag);
        self
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn zeros(&mut self, count: usize) -> &mut Self {
        self.bytes.resize(self.bytes.len() + count, 0);
        self
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.bytes.push(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        let mut buf = [0_u8; 2];
        E::write_u16(&mut buf, value);
        self.raw(&buf)
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        let mut buf = [0_u8; 4];
        E::write_u32(&mut buf, value);
        self.raw(&buf)
    }

    pub fn i16_slice(&mut self, samples: &[i16]) -> &mut Self {
        let start = self.bytes.len();
        self.bytes.resize(start + samples.len() * 2, 0);
        E::write_i16_into(samples, &mut self.bytes[start..]);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_writes_most_significant_byte_first() {
        let mut writer = BigEndianWriter::new();
        writer.u32(0x0102_0304).u16(0x0506).u8(7);
        assert_eq!(writer.as_slice(), &[1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn little_endian_writes_least_significant_byte_first() {
        let mut writer = LittleEndianWriter::new();
        writer.u32(0x0102_0304).u16(0x0506);
        assert_eq!(writer.as_slice(), &[4, 3, 2, 1, 6, 5]);
    }

    #[test]
    fn tags_and_zero_runs_are_appended_verbatim() {
        let mut writer = BigEndianWriter::with_capacity(16);
        writer.tag(b"FORM").zeros(3).raw(&[9]);
        assert_eq!(writer.len(), 8);
        assert_eq!(writer.into_bytes(), b"FORM\0\0\0\x09".to_vec());
    }

    #[test]
    fn sample_slices_follow_writer_order() {
        let mut little = LittleEndianWriter::new();
        little.i16_slice(&[1, -2]);
        assert_eq!(little.as_slice(), &[0x01, 0x00, 0xFE, 0xFF]);

        let mut big = BigEndianWriter::new();
        big.i16_slice(&[1, -2]);
        assert_eq!(big.as_slice(), &[0x00, 0x01, 0xFF, 0xFE]);
    }
}
