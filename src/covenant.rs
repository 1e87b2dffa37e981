//! Typed covenant side-data attached to transaction outputs (spec §3).
//!
//! REDESIGN FLAG (spec §9, "Dynamic covenant items by integer indexes"): the
//! original representation addresses covenant items by raw integer index
//! into a `Vec<Vec<u8>>`, so a wrong index silently reads the wrong field.
//! Here every covenant type is its own named-field variant; the item
//! tuple's shape (lengths, ordering) is enforced once, at construction, and
//! runtime access is a normal, typed struct field access.

use crate::hash::Hash;
use crate::serializer::{Reader, ReaderError, Serializer, Writer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr, strum::Display)]
#[repr(u8)]
pub enum CovenantKind {
    None = 0,
    Open = 1,
    Bid = 2,
    Reveal = 3,
    Redeem = 4,
    Register = 5,
    Update = 6,
    Renew = 7,
    Transfer = 8,
    Finalize = 9,
    Revoke = 10,
}

/// A typed, tagged covenant. `kind()` returns the `CovenantKind`
/// discriminant the engine branches on when validating an action's
/// preconditions against `coin.covenant`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Covenant {
    /// A plain, non-naming output (regular payment, change).
    None,
    Open {
        name_hash: Hash,
        epoch: u32,
        raw_name: Vec<u8>,
    },
    Bid {
        name_hash: Hash,
        epoch: u32,
        raw_name: Vec<u8>,
        blind: Hash,
    },
    Reveal {
        name_hash: Hash,
        epoch: u32,
        nonce: Hash,
    },
    Redeem {
        name_hash: Hash,
        epoch: u32,
    },
    Register {
        name_hash: Hash,
        epoch: u32,
        resource_bytes: Vec<u8>,
        renewal_block_hash: Hash,
    },
    /// An `UPDATE` with an empty `resource_bytes` is the CANCEL action
    /// (spec §3: "(an UPDATE with empty resource_bytes)") — constructed only
    /// through `Covenant::cancel`, never by hand, so the empty-resource
    /// invariant is established in one place.
    Update {
        name_hash: Hash,
        epoch: u32,
        resource_bytes: Vec<u8>,
    },
    Renew {
        name_hash: Hash,
        epoch: u32,
        renewal_block_hash: Hash,
    },
    Transfer {
        name_hash: Hash,
        epoch: u32,
        addr_version: u8,
        addr_hash: Vec<u8>,
    },
    Finalize {
        name_hash: Hash,
        epoch: u32,
        raw_name: Vec<u8>,
        flags: u8,
        claimed: u32,
        renewals: u32,
        renewal_block_hash: Hash,
    },
    Revoke {
        name_hash: Hash,
        epoch: u32,
    },
}

/// Bit 0 of `Covenant::Finalize::flags` — whether the name was claimed
/// under the weak-name (accidental squat) policy rather than won at
/// auction.
pub const FLAG_WEAK: u8 = 0b0000_0001;

impl Covenant {
    pub fn none() -> Self {
        Covenant::None
    }

    pub fn cancel(name_hash: Hash, epoch: u32) -> Self {
        Covenant::Update {
            name_hash,
            epoch,
            resource_bytes: Vec::new(),
        }
    }

    /// Whether this `Update` covenant is actually a CANCEL (empty resource).
    pub fn is_cancel(&self) -> bool {
        matches!(self, Covenant::Update { resource_bytes, .. } if resource_bytes.is_empty())
    }

    pub fn kind(&self) -> CovenantKind {
        match self {
            Covenant::None => CovenantKind::None,
            Covenant::Open { .. } => CovenantKind::Open,
            Covenant::Bid { .. } => CovenantKind::Bid,
            Covenant::Reveal { .. } => CovenantKind::Reveal,
            Covenant::Redeem { .. } => CovenantKind::Redeem,
            Covenant::Register { .. } => CovenantKind::Register,
            Covenant::Update { .. } => CovenantKind::Update,
            Covenant::Renew { .. } => CovenantKind::Renew,
            Covenant::Transfer { .. } => CovenantKind::Transfer,
            Covenant::Finalize { .. } => CovenantKind::Finalize,
            Covenant::Revoke { .. } => CovenantKind::Revoke,
        }
    }

    pub fn name_hash(&self) -> Option<&Hash> {
        match self {
            Covenant::None => None,
            Covenant::Open { name_hash, .. }
            | Covenant::Bid { name_hash, .. }
            | Covenant::Reveal { name_hash, .. }
            | Covenant::Redeem { name_hash, .. }
            | Covenant::Register { name_hash, .. }
            | Covenant::Update { name_hash, .. }
            | Covenant::Renew { name_hash, .. }
            | Covenant::Transfer { name_hash, .. }
            | Covenant::Finalize { name_hash, .. }
            | Covenant::Revoke { name_hash, .. } => Some(name_hash),
        }
    }

    pub fn epoch(&self) -> Option<u32> {
        match self {
            Covenant::None => None,
            Covenant::Open { epoch, .. }
            | Covenant::Bid { epoch, .. }
            | Covenant::Reveal { epoch, .. }
            | Covenant::Redeem { epoch, .. }
            | Covenant::Register { epoch, .. }
            | Covenant::Update { epoch, .. }
            | Covenant::Renew { epoch, .. }
            | Covenant::Transfer { epoch, .. }
            | Covenant::Finalize { epoch, .. }
            | Covenant::Revoke { epoch, .. } => Some(*epoch),
        }
    }

    /// Whether this output is zero-valued-exempt from the dust check
    /// (spec §4.2: "except zero-valued covenant outputs that are
    /// protocol-exempt").
    pub fn is_dust_exempt(&self) -> bool {
        !matches!(self, Covenant::None)
    }
}

impl Serializer for Covenant {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let tag = reader.read_u8()?;
        let kind = CovenantKind::from_repr(tag).ok_or(ReaderError::InvalidValue)?;
        Ok(match kind {
            CovenantKind::None => Covenant::None,
            CovenantKind::Open => Covenant::Open {
                name_hash: reader.read_hash()?,
                epoch: reader.read_u32()?,
                raw_name: reader.read_sized_bytes()?,
            },
            CovenantKind::Bid => Covenant::Bid {
                name_hash: reader.read_hash()?,
                epoch: reader.read_u32()?,
                raw_name: reader.read_sized_bytes()?,
                blind: reader.read_hash()?,
            },
            CovenantKind::Reveal => Covenant::Reveal {
                name_hash: reader.read_hash()?,
                epoch: reader.read_u32()?,
                nonce: reader.read_hash()?,
            },
            CovenantKind::Redeem => Covenant::Redeem {
                name_hash: reader.read_hash()?,
                epoch: reader.read_u32()?,
            },
            CovenantKind::Register => Covenant::Register {
                name_hash: reader.read_hash()?,
                epoch: reader.read_u32()?,
                resource_bytes: reader.read_sized_bytes()?,
                renewal_block_hash: reader.read_hash()?,
            },
            CovenantKind::Update => Covenant::Update {
                name_hash: reader.read_hash()?,
                epoch: reader.read_u32()?,
                resource_bytes: reader.read_sized_bytes()?,
            },
            CovenantKind::Renew => Covenant::Renew {
                name_hash: reader.read_hash()?,
                epoch: reader.read_u32()?,
                renewal_block_hash: reader.read_hash()?,
            },
            CovenantKind::Transfer => Covenant::Transfer {
                name_hash: reader.read_hash()?,
                epoch: reader.read_u32()?,
                addr_version: reader.read_u8()?,
                addr_hash: reader.read_sized_bytes()?,
            },
            CovenantKind::Finalize => Covenant::Finalize {
                name_hash: reader.read_hash()?,
                epoch: reader.read_u32()?,
                raw_name: reader.read_sized_bytes()?,
                flags: reader.read_u8()?,
                claimed: reader.read_u32()?,
                renewals: reader.read_u32()?,
                renewal_block_hash: reader.read_hash()?,
            },
            CovenantKind::Revoke => Covenant::Revoke {
                name_hash: reader.read_hash()?,
                epoch: reader.read_u32()?,
            },
        })
    }

    fn write(&self, writer: &mut Writer) {
        writer.write_u8(self.kind() as u8);
        match self {
            Covenant::None => {}
            Covenant::Open {
                name_hash,
                epoch,
                raw_name,
            } => {
                writer.write_hash(name_hash);
                writer.write_u32(*epoch);
                writer.write_sized_bytes(raw_name);
            }
            Covenant::Bid {
                name_hash,
                epoch,
                raw_name,
                blind,
            } => {
                writer.write_hash(name_hash);
                writer.write_u32(*epoch);
                writer.write_sized_bytes(raw_name);
                writer.write_hash(blind);
            }
            Covenant::Reveal {
                name_hash,
                epoch,
                nonce,
            } => {
                writer.write_hash(name_hash);
                writer.write_u32(*epoch);
                writer.write_hash(nonce);
            }
            Covenant::Redeem { name_hash, epoch } => {
                writer.write_hash(name_hash);
                writer.write_u32(*epoch);
            }
            Covenant::Register {
                name_hash,
                epoch,
                resource_bytes,
                renewal_block_hash,
            } => {
                writer.write_hash(name_hash);
                writer.write_u32(*epoch);
                writer.write_sized_bytes(resource_bytes);
                writer.write_hash(renewal_block_hash);
            }
            Covenant::Update {
                name_hash,
                epoch,
                resource_bytes,
            } => {
                writer.write_hash(name_hash);
                writer.write_u32(*epoch);
                writer.write_sized_bytes(resource_bytes);
            }
            Covenant::Renew {
                name_hash,
                epoch,
                renewal_block_hash,
            } => {
                writer.write_hash(name_hash);
                writer.write_u32(*epoch);
                writer.write_hash(renewal_block_hash);
            }
            Covenant::Transfer {
                name_hash,
                epoch,
                addr_version,
                addr_hash,
            } => {
                writer.write_hash(name_hash);
                writer.write_u32(*epoch);
                writer.write_u8(*addr_version);
                writer.write_sized_bytes(addr_hash);
            }
            Covenant::Finalize {
                name_hash,
                epoch,
                raw_name,
                flags,
                claimed,
                renewals,
                renewal_block_hash,
            } => {
                writer.write_hash(name_hash);
                writer.write_u32(*epoch);
                writer.write_sized_bytes(raw_name);
                writer.write_u8(*flags);
                writer.write_u32(*claimed);
                writer.write_u32(*renewals);
                writer.write_hash(renewal_block_hash);
            }
            Covenant::Revoke { name_hash, epoch } => {
                writer.write_hash(name_hash);
                writer.write_u32(*epoch);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_covenants() -> Vec<Covenant> {
        let nh = Hash::hash(b"alice");
        vec![
            Covenant::None,
            Covenant::Open {
                name_hash: nh,
                epoch: 0,
                raw_name: b"alice".to_vec(),
            },
            Covenant::Bid {
                name_hash: nh,
                epoch: 10,
                raw_name: b"alice".to_vec(),
                blind: Hash::hash(b"blind"),
            },
            Covenant::Reveal {
                name_hash: nh,
                epoch: 10,
                nonce: Hash::hash(b"nonce"),
            },
            Covenant::Redeem {
                name_hash: nh,
                epoch: 10,
            },
            Covenant::Register {
                name_hash: nh,
                epoch: 10,
                resource_bytes: b"resource".to_vec(),
                renewal_block_hash: Hash::hash(b"block"),
            },
            Covenant::cancel(nh, 10),
            Covenant::Update {
                name_hash: nh,
                epoch: 10,
                resource_bytes: b"new resource".to_vec(),
            },
            Covenant::Renew {
                name_hash: nh,
                epoch: 10,
                renewal_block_hash: Hash::hash(b"block2"),
            },
            Covenant::Transfer {
                name_hash: nh,
                epoch: 10,
                addr_version: 0,
                addr_hash: vec![1; 20],
            },
            Covenant::Finalize {
                name_hash: nh,
                epoch: 10,
                raw_name: b"alice".to_vec(),
                flags: FLAG_WEAK,
                claimed: 1,
                renewals: 2,
                renewal_block_hash: Hash::hash(b"block3"),
            },
            Covenant::Revoke {
                name_hash: nh,
                epoch: 10,
            },
        ]
    }

    #[test]
    fn round_trips_every_kind() {
        for covenant in sample_covenants() {
            let bytes = covenant.to_bytes();
            let decoded = Covenant::read(&mut Reader::new(&bytes)).unwrap();
            assert_eq!(covenant, decoded);
            // re-encoding preserves bytes exactly (spec §8)
            assert_eq!(bytes, decoded.to_bytes());
        }
    }

    #[test]
    fn cancel_is_an_update_with_empty_resource() {
        let c = Covenant::cancel(Hash::hash(b"x"), 1);
        assert_eq!(c.kind(), CovenantKind::Update);
        assert!(c.is_cancel());
    }

    #[test]
    fn dust_exemption() {
        assert!(!Covenant::None.is_dust_exempt());
        assert!(Covenant::cancel(Hash::hash(b"x"), 1).is_dust_exempt());
    }
}
