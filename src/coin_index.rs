//! In-memory credit cache with an account secondary index (spec §4.3),
//! grounded on the teacher's `storage::EncryptedStorage` load/save pattern
//! but adding the deferred `CachedBatch` commit discipline spec §4.3 and §9
//! call out explicitly ("make the deferred CachedBatch explicit").

use crate::{
    coin::{Account, Credit, OutPoint},
    collaborators::{PersistentStore, StoreBatch},
    config::COIN_INDEX_HINT_CAPACITY,
    error::EngineError,
    hash::Hash,
    serializer::Serializer,
};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

const CREDITS_TREE: &str = "credits";

/// One queued mutation against the coin index. Recorded by a producer while
/// it holds the fund lock; applied to the in-memory maps only after the
/// corresponding `StoreBatch` commits (see `CoinIndex::commit`).
#[derive(Debug, Clone)]
pub enum IndexOp {
    PutCredit(Credit),
    DelCredit(OutPoint),
}

/// Accumulates `IndexOp`s and the parallel `StoreBatch` of encoded writes;
/// `CoinIndex::commit` is the only thing allowed to apply it.
#[derive(Default)]
pub struct CachedBatch {
    ops: Vec<IndexOp>,
    store_batch: StoreBatch,
}

impl CachedBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_credit(&mut self, credit: Credit) {
        let key = credit_key(&credit.outpoint());
        self.store_batch.put(CREDITS_TREE, key, credit.to_bytes());
        self.ops.push(IndexOp::PutCredit(credit));
    }

    pub fn del_credit(&mut self, outpoint: OutPoint) {
        let key = credit_key(&outpoint);
        self.store_batch.del(CREDITS_TREE, key);
        self.ops.push(IndexOp::DelCredit(outpoint));
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

fn credit_key(outpoint: &OutPoint) -> Vec<u8> {
    outpoint.to_bytes()
}

/// `credits_by_outpoint: tx_hash -> output_index -> Credit` and
/// `credits_by_account: account -> tx_hash -> {output_index}`, matching
/// spec §4.3's data layout exactly.
#[derive(Default)]
struct Index {
    by_outpoint: HashMap<Hash, HashMap<u32, Credit>>,
    by_account: HashMap<Account, HashMap<Hash, HashSet<u32>>>,
}

impl Index {
    fn apply(&mut self, op: IndexOp) {
        match op {
            IndexOp::PutCredit(credit) => {
                let outpoint = credit.outpoint();
                let account = credit.account;
                self.by_outpoint
                    .entry(outpoint.txid)
                    .or_insert_with(HashMap::new)
                    .insert(outpoint.index, credit);
                self.by_account
                    .entry(account)
                    .or_insert_with(HashMap::new)
                    .entry(outpoint.txid)
                    .or_insert_with(HashSet::new)
                    .insert(outpoint.index);
            }
            IndexOp::DelCredit(outpoint) => {
                if let Some(by_idx) = self.by_outpoint.get_mut(&outpoint.txid) {
                    if let Some(credit) = by_idx.remove(&outpoint.index) {
                        if let Some(by_tx) = self.by_account.get_mut(&credit.account) {
                            if let Some(idxs) = by_tx.get_mut(&outpoint.txid) {
                                idxs.remove(&outpoint.index);
                                if idxs.is_empty() {
                                    by_tx.remove(&outpoint.txid);
                                }
                            }
                        }
                    }
                    if by_idx.is_empty() {
                        self.by_outpoint.remove(&outpoint.txid);
                    }
                }
            }
        }
    }
}

pub struct CoinIndex {
    index: RwLock<Index>,
}

impl CoinIndex {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(Index::default()),
        }
    }

    /// Scans every persisted credit and rebuilds the in-memory index,
    /// called once on wallet open (spec §4.3: "the cache is populated by
    /// scanning all persisted credits").
    pub fn load_from_store(
        &self,
        store: &dyn PersistentStore,
        all_keys: impl IntoIterator<Item = Vec<u8>>,
    ) -> Result<(), EngineError> {
        let mut index = self.index.write().expect("coin index lock poisoned");
        for key in all_keys {
            if let Some(bytes) = store.get(CREDITS_TREE, &key)? {
                let credit = Credit::from_bytes(&bytes)
                    .map_err(|e| EngineError::Internal(format!("corrupt credit record: {e}")))?;
                index.apply(IndexOp::PutCredit(credit));
            }
        }
        Ok(())
    }

    /// Commits `batch` to `store` first; only on success are the queued
    /// `IndexOp`s replayed into the in-memory maps. A store failure leaves
    /// the index exactly as it was (spec §4.3, §5, §9).
    pub fn commit(&self, store: &dyn PersistentStore, batch: CachedBatch) -> Result<(), EngineError> {
        if batch.ops.is_empty() {
            return Ok(());
        }
        store.write(batch.store_batch)?;
        let mut index = self.index.write().expect("coin index lock poisoned");
        for op in batch.ops {
            index.apply(op);
        }
        Ok(())
    }

    pub fn get_credit(&self, txid: &Hash, index: u32) -> Option<Credit> {
        self.index
            .read()
            .expect("coin index lock poisoned")
            .by_outpoint
            .get(txid)
            .and_then(|m| m.get(&index))
            .cloned()
    }

    pub fn has_coin(&self, txid: &Hash, index: u32) -> bool {
        self.get_credit(txid, index).is_some()
    }

    pub fn has_coin_by_account(&self, account: Account, txid: &Hash, index: u32) -> bool {
        self.index
            .read()
            .expect("coin index lock poisoned")
            .by_account
            .get(&account)
            .and_then(|by_tx| by_tx.get(txid))
            .map(|idxs| idxs.contains(&index))
            .unwrap_or(false)
    }

    /// All credits currently indexed under `account`, defensively cloned.
    pub fn credits_for(&self, account: Account) -> Vec<Credit> {
        let guard = self.index.read().expect("coin index lock poisoned");
        let Some(by_tx) = guard.by_account.get(&account) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(COIN_INDEX_HINT_CAPACITY);
        for (txid, idxs) in by_tx {
            for idx in idxs {
                if let Some(credit) = guard.by_outpoint.get(txid).and_then(|m| m.get(idx)) {
                    out.push(credit.clone());
                }
            }
        }
        out
    }

    pub fn outpoints_for(&self, account: Account) -> Vec<OutPoint> {
        self.credits_for(account)
            .into_iter()
            .map(|c| c.outpoint())
            .collect()
    }
}

impl Default for CoinIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        coin::{Address, Coin},
        covenant::Covenant,
        store::MemoryStore,
    };

    fn sample_credit(txid: Hash, index: u32, account: Account) -> Credit {
        let coin = Coin {
            outpoint: OutPoint::new(txid, index),
            value: 1000,
            covenant: Covenant::none(),
            address: Address::new(0, vec![1; 20]),
            block_height: 10,
        };
        Credit::new(coin, true, account)
    }

    #[test]
    fn commit_applies_only_after_store_succeeds() {
        let store = MemoryStore::new();
        let index = CoinIndex::new();
        let txid = Hash::hash(b"tx1");
        let credit = sample_credit(txid, 0, Account::DEFAULT);

        let mut batch = CachedBatch::new();
        batch.put_credit(credit.clone());
        index.commit(&store, batch).unwrap();

        assert!(index.has_coin(&txid, 0));
        assert_eq!(index.get_credit(&txid, 0), Some(credit));
        assert_eq!(store.get(CREDITS_TREE, &credit_key(&OutPoint::new(txid, 0))).unwrap().is_some(), true);
    }

    #[test]
    fn secondary_index_by_account() {
        let store = MemoryStore::new();
        let index = CoinIndex::new();
        let acct = Account(7);
        let txid = Hash::hash(b"tx2");

        let mut batch = CachedBatch::new();
        batch.put_credit(sample_credit(txid, 0, acct));
        batch.put_credit(sample_credit(txid, 1, acct));
        index.commit(&store, batch).unwrap();

        assert!(index.has_coin_by_account(acct, &txid, 0));
        assert!(index.has_coin_by_account(acct, &txid, 1));
        assert_eq!(index.credits_for(acct).len(), 2);
        assert_eq!(index.credits_for(Account::DEFAULT).len(), 0);
    }

    #[test]
    fn del_credit_removes_from_both_indexes() {
        let store = MemoryStore::new();
        let index = CoinIndex::new();
        let acct = Account(1);
        let txid = Hash::hash(b"tx3");

        let mut put_batch = CachedBatch::new();
        put_batch.put_credit(sample_credit(txid, 0, acct));
        index.commit(&store, put_batch).unwrap();

        let mut del_batch = CachedBatch::new();
        del_batch.del_credit(OutPoint::new(txid, 0));
        index.commit(&store, del_batch).unwrap();

        assert!(!index.has_coin(&txid, 0));
        assert_eq!(index.credits_for(acct).len(), 0);
    }
}
