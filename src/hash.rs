//! Protocol hash newtype, modeled on the teacher's `tos_common::crypto::hash`
//! module: a fixed-size digest with hex display/serde and a `Hashable`
//! convenience trait for any `Serializer` type.

use crate::serializer::{Reader, ReaderError, Serializer, Writer};
use serde::{de::Error as SerdeError, Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::{convert::TryInto, fmt, str::FromStr};

pub const HASH_SIZE: usize = 32;

#[derive(Eq, PartialEq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    pub const fn zero() -> Self {
        Hash([0u8; HASH_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Hashes an arbitrary byte slice using the protocol digest (SHA3-256).
    pub fn hash(value: &[u8]) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update(value);
        let out = hasher.finalize();
        Hash(out.into())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Hash {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| "invalid hex string")?;
        let bytes: [u8; HASH_SIZE] = bytes.try_into().map_err(|_| "invalid hash length")?;
        Ok(Hash(bytes))
    }
}

impl Serializer for Hash {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_hash()
    }

    fn write(&self, writer: &mut Writer) {
        writer.write_hash(self);
    }

    fn size(&self) -> usize {
        HASH_SIZE
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Hash::from_str(&s).map_err(SerdeError::custom)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Any serializable type can be content-addressed via its canonical bytes.
pub trait Hashable: Serializer {
    fn hash(&self) -> Hash {
        Hash::hash(&self.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let h = Hash::hash(b"example");
        let s = h.to_hex();
        let back: Hash = s.parse().unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn deterministic() {
        assert_eq!(Hash::hash(b"a"), Hash::hash(b"a"));
        assert_ne!(Hash::hash(b"a"), Hash::hash(b"b"));
    }
}
