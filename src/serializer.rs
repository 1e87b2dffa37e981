//! Minimal binary (de)serialization primitives.
//!
//! Every on-disk and on-wire type in this crate (`Covenant`, `Coin`,
//! `Credit`, cache records, ...) implements `Serializer` directly rather than
//! going through a generic derive. This keeps the on-disk format an explicit,
//! auditable contract instead of an accident of whatever serde backend is
//! linked in, matching how the teacher wallet treats its own wire types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("not enough bytes left to read")]
    OutOfBounds,
    #[error("invalid value encountered while reading")]
    InvalidValue,
    #[error("invalid size: expected {expected}, got {got}")]
    InvalidSize { expected: usize, got: usize },
}

pub struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub fn total_read(&self) -> usize {
        self.offset
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ReaderError> {
        if self.remaining() < n {
            return Err(ReaderError::OutOfBounds);
        }
        let slice = &self.bytes[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ReaderError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, ReaderError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ReaderError::InvalidValue),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16, ReaderError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32, ReaderError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64, ReaderError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, ReaderError> {
        Ok(self.take(n)?.to_vec())
    }

    pub fn read_fixed_bytes<const N: usize>(&mut self) -> Result<[u8; N], ReaderError> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    /// Reads a length-prefixed (u32 LE) byte blob — the format used by every
    /// covenant item.
    pub fn read_sized_bytes(&mut self) -> Result<Vec<u8>, ReaderError> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    pub fn read_hash(&mut self) -> Result<crate::hash::Hash, ReaderError> {
        let bytes = self.read_fixed_bytes::<32>()?;
        Ok(crate::hash::Hash::new(bytes))
    }
}

#[derive(Default)]
pub struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(if v { 1 } else { 0 });
    }

    pub fn write_u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.bytes.extend_from_slice(v);
    }

    /// Writes a length-prefixed (u32 LE) byte blob.
    pub fn write_sized_bytes(&mut self, v: &[u8]) {
        self.write_u32(v.len() as u32);
        self.write_bytes(v);
    }

    pub fn write_hash(&mut self, hash: &crate::hash::Hash) {
        self.bytes.extend_from_slice(hash.as_bytes());
    }
}

pub trait Serializer: Sized {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError>;
    fn write(&self, writer: &mut Writer);

    fn size(&self) -> usize {
        let mut writer = Writer::new();
        self.write(&mut writer);
        writer.len()
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        self.write(&mut writer);
        writer.into_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ReaderError> {
        let mut reader = Reader::new(bytes);
        Self::read(&mut reader)
    }
}

impl Serializer for u8 {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u8()
    }
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(*self);
    }
    fn size(&self) -> usize {
        1
    }
}

impl Serializer for u32 {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u32()
    }
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(*self);
    }
    fn size(&self) -> usize {
        4
    }
}

impl Serializer for u64 {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u64()
    }
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(*self);
    }
    fn size(&self) -> usize {
        8
    }
}

impl Serializer for bool {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_bool()
    }
    fn write(&self, writer: &mut Writer) {
        writer.write_bool(*self);
    }
    fn size(&self) -> usize {
        1
    }
}

impl Serializer for Vec<u8> {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_sized_bytes()
    }
    fn write(&self, writer: &mut Writer) {
        writer.write_sized_bytes(self);
    }
    fn size(&self) -> usize {
        4 + self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;

    #[test]
    fn round_trips_primitives() {
        let mut w = Writer::new();
        42u32.write(&mut w);
        true.write(&mut w);
        vec![1u8, 2, 3].write(&mut w);
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        assert_eq!(u32::read(&mut r).unwrap(), 42);
        assert_eq!(bool::read(&mut r).unwrap(), true);
        assert_eq!(Vec::<u8>::read(&mut r).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn round_trips_hash() {
        let hash = Hash::hash(b"hello");
        let bytes = hash.to_bytes();
        let back = Hash::from_bytes(&bytes).unwrap();
        assert_eq!(hash, back);
    }

    #[test]
    fn out_of_bounds_errors() {
        let bytes = [0u8; 2];
        let mut r = Reader::new(&bytes);
        assert!(matches!(r.read_u32(), Err(ReaderError::OutOfBounds)));
    }
}
