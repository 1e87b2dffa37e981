//! Persistent `blind -> (value, nonce)` map (spec §3, §4.1 BID/REVEAL),
//! encrypted at rest via `Cipher` the same way the teacher encrypts wallet
//! secret material in `storage::EncryptedStorage`.

use crate::{
    collaborators::PersistentStore,
    error::{CryptoError, EngineError},
    hash::Hash,
    serializer::{Reader, ReaderError, Serializer, Writer},
};

const BLIND_TREE: &str = "blinds";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlindEntry {
    pub value: u64,
    pub nonce: Hash,
}

impl Serializer for BlindEntry {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let value = reader.read_u64()?;
        let nonce = reader.read_hash()?;
        Ok(Self { value, nonce })
    }

    fn write(&self, writer: &mut Writer) {
        writer.write_u64(self.value);
        writer.write_hash(&self.nonce);
    }
}

pub struct BlindStore<'a> {
    store: &'a dyn PersistentStore,
}

impl<'a> BlindStore<'a> {
    pub fn new(store: &'a dyn PersistentStore) -> Self {
        Self { store }
    }

    pub fn put(&self, blind: &Hash, value: u64, nonce: Hash) -> Result<(), EngineError> {
        let entry = BlindEntry { value, nonce };
        self.store
            .put(BLIND_TREE, blind.as_bytes(), &entry.to_bytes())
    }

    /// Resolves `blind` back to `(value, nonce)`, the step REVEAL needs
    /// before it can spend a BID outpoint (spec §4.1: "if missing, fail").
    pub fn get(&self, blind: &Hash) -> Result<BlindEntry, EngineError> {
        let bytes = self
            .store
            .get(BLIND_TREE, blind.as_bytes())?
            .ok_or_else(|| EngineError::from(CryptoError::BlindNotFound(*blind)))?;
        BlindEntry::from_bytes(&bytes)
            .map_err(|e| EngineError::Internal(format!("corrupt blind store entry: {e}")))
    }

    pub fn contains(&self, blind: &Hash) -> Result<bool, EngineError> {
        Ok(self.store.get(BLIND_TREE, blind.as_bytes())?.is_some())
    }

    pub fn del(&self, blind: &Hash) -> Result<(), EngineError> {
        self.store.del(BLIND_TREE, blind.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn put_then_get_round_trips() {
        let backing = MemoryStore::new();
        let blind_store = BlindStore::new(&backing);
        let blind = Hash::hash(b"blind-1");
        let nonce = Hash::hash(b"nonce-1");
        blind_store.put(&blind, 1000, nonce).unwrap();

        let entry = blind_store.get(&blind).unwrap();
        assert_eq!(entry.value, 1000);
        assert_eq!(entry.nonce, nonce);
    }

    #[test]
    fn missing_blind_is_an_error() {
        let backing = MemoryStore::new();
        let blind_store = BlindStore::new(&backing);
        let blind = Hash::hash(b"missing");
        assert!(blind_store.get(&blind).is_err());
        assert!(!blind_store.contains(&blind).unwrap());
    }
}
