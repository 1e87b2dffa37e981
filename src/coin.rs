//! Coin/Credit inventory types (spec §3). `Coin` is the chain-visible unspent
//! output; `Credit` adds the wallet-local bookkeeping (`spent`, `own`) the
//! engine needs to avoid double-spending an output it has already committed
//! to a pending action.

use crate::{
    covenant::Covenant,
    hash::Hash,
    serializer::{Reader, ReaderError, Serializer, Writer},
};
use serde::{Deserialize, Serialize};

/// Opaque account identifier used by `CoinIndex`'s secondary index and by
/// the Funder's account filter. Address derivation itself is an
/// out-of-scope collaborator (spec §1); the engine only needs a stable key
/// to partition credits by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Account(pub u32);

impl Account {
    pub const DEFAULT: Account = Account(0);
}

/// A receive/change/transfer-target address: a version byte plus a fixed
/// witness-program-style hash, matching the `(addr_version, addr_hash)` pair
/// carried by the TRANSFER covenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub version: u8,
    pub hash: Vec<u8>,
}

impl Address {
    pub fn new(version: u8, hash: Vec<u8>) -> Self {
        Self { version, hash }
    }

    /// The all-zero address is never a legal destination.
    pub fn is_null(&self) -> bool {
        self.hash.iter().all(|b| *b == 0)
    }
}

impl Serializer for Address {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let version = reader.read_u8()?;
        let hash = reader.read_sized_bytes()?;
        Ok(Self { version, hash })
    }

    fn write(&self, writer: &mut Writer) {
        writer.write_u8(self.version);
        writer.write_sized_bytes(&self.hash);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: Hash, index: u32) -> Self {
        Self { txid, index }
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

impl Serializer for OutPoint {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let txid = reader.read_hash()?;
        let index = reader.read_u32()?;
        Ok(Self { txid, index })
    }

    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.txid);
        writer.write_u32(self.index);
    }
}

/// A chain-visible unspent transaction output carrying a naming covenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub outpoint: OutPoint,
    pub value: u64,
    pub covenant: Covenant,
    pub address: Address,
    pub block_height: u32,
}

impl Serializer for Coin {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let outpoint = OutPoint::read(reader)?;
        let value = reader.read_u64()?;
        let covenant = Covenant::read(reader)?;
        let address = Address::read(reader)?;
        let block_height = reader.read_u32()?;
        Ok(Self {
            outpoint,
            value,
            covenant,
            address,
            block_height,
        })
    }

    fn write(&self, writer: &mut Writer) {
        self.outpoint.write(writer);
        writer.write_u64(self.value);
        self.covenant.write(writer);
        self.address.write(writer);
        writer.write_u32(self.block_height);
    }
}

/// A wallet-local annotation of a `Coin`: whether it is exclusively owned
/// by this wallet (`own`) and whether it has already been committed to a
/// pending, not-yet-confirmed action (`spent`) and must not be reused by
/// coin selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credit {
    pub coin: Coin,
    pub spent: bool,
    pub own: bool,
    pub account: Account,
}

impl Credit {
    pub fn new(coin: Coin, own: bool, account: Account) -> Self {
        Self {
            coin,
            spent: false,
            own,
            account,
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        self.coin.outpoint
    }

    pub fn value(&self) -> u64 {
        self.coin.value
    }

    /// Coin age in blocks, used by the `age` coin-selection policy.
    pub fn age(&self, current_height: u32) -> u32 {
        current_height.saturating_sub(self.coin.block_height)
    }
}

impl Serializer for Credit {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let coin = Coin::read(reader)?;
        let spent = reader.read_bool()?;
        let own = reader.read_bool()?;
        let account = Account(reader.read_u32()?);
        Ok(Self {
            coin,
            spent,
            own,
            account,
        })
    }

    fn write(&self, writer: &mut Writer) {
        self.coin.write(writer);
        writer.write_bool(self.spent);
        writer.write_bool(self.own);
        writer.write_u32(self.account.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covenant::Covenant;

    fn sample_credit(index: u32, value: u64, height: u32) -> Credit {
        let coin = Coin {
            outpoint: OutPoint::new(Hash::hash(b"tx"), index),
            value,
            covenant: Covenant::none(),
            address: Address::new(0, vec![1; 20]),
            block_height: height,
        };
        Credit::new(coin, true, Account::DEFAULT)
    }

    #[test]
    fn round_trips_through_serializer() {
        let credit = sample_credit(0, 5000, 10);
        let bytes = credit.to_bytes();
        let back = Credit::from_bytes(&bytes).unwrap();
        assert_eq!(credit, back);
    }

    #[test]
    fn age_saturates_at_zero() {
        let credit = sample_credit(0, 100, 50);
        assert_eq!(credit.age(10), 0);
        assert_eq!(credit.age(60), 10);
    }
}
