//! Pure predicates and hashing over names (spec §2 "Rules"). No state, no
//! I/O — every function here is a free function over plain inputs, mirroring
//! the teacher's free-function style in `tos_common::crypto::hash`.

use crate::{coin::Account, config::ROLLOUT_HEIGHT, error::ValidationError, hash::Hash};

/// Names are ASCII, lowercase, and bounded the way Handshake consensus
/// bounds them: 1 to 63 characters, no leading/trailing hyphen, no
/// consecutive hyphens, and restricted to `[a-z0-9-]`.
pub const MIN_NAME_LENGTH: usize = 1;
pub const MAX_NAME_LENGTH: usize = 63;

/// Returns `Ok(())` when `name` is syntactically legal, otherwise the
/// specific validation failure.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.len() < MIN_NAME_LENGTH || name.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::InvalidName);
    }

    if !name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-') {
        return Err(ValidationError::InvalidName);
    }

    if name.starts_with('-') || name.ends_with('-') {
        return Err(ValidationError::InvalidName);
    }

    if name.contains("--") {
        return Err(ValidationError::InvalidName);
    }

    Ok(())
}

pub fn is_valid_name(name: &str) -> bool {
    validate_name(name).is_ok()
}

/// A small, explicit reserved list. A production deployment sources this
/// from a consensus-pinned snapshot (the Alexa top-100k at genesis, in
/// Handshake); this engine exposes the gate and leaves sourcing the actual
/// list to the chain collaborator / config loader.
pub fn is_reserved(name: &str, reserved: &std::collections::HashSet<String>) -> bool {
    reserved.contains(name)
}

/// ICANN-locked TLDs are never auctionable while the lockup policy is
/// enforced, independent of the reserved-name list.
pub fn is_locked_up(name: &str, locked_up: &std::collections::HashSet<String>) -> bool {
    locked_up.contains(name)
}

/// A name has "rolled out" once the chain height has passed the point at
/// which its hash bucket becomes auctionable.
pub fn has_rolled_out(height: u32) -> bool {
    height >= ROLLOUT_HEIGHT
}

/// The protocol identifier for a name: a content hash of its lowercase ASCII
/// bytes.
pub fn name_hash(name: &str) -> Hash {
    Hash::hash(name.as_bytes())
}

/// Derives the deterministic blind-commitment nonce index, per spec §3:
/// `idx = (value_hi xor value_lo) & 0x7fffffff`.
pub fn nonce_index(value: u64) -> u32 {
    let value_hi = (value >> 32) as u32;
    let value_lo = value as u32;
    (value_hi ^ value_lo) & 0x7fff_ffff
}

/// Derives `nonce = H(addr_hash || account_pubkey(idx) || name_hash)`.
///
/// `account_pubkey` is supplied by the caller (address derivation is an
/// out-of-scope collaborator, spec §1); this function only fixes the
/// deterministic hashing order so a lost nonce can always be regenerated
/// from (address, bid value, name hash).
pub fn derive_nonce(addr_hash: &[u8], account_pubkey_at_idx: &[u8], name_hash: &Hash) -> Hash {
    let mut data = Vec::with_capacity(addr_hash.len() + account_pubkey_at_idx.len() + 32);
    data.extend_from_slice(addr_hash);
    data.extend_from_slice(account_pubkey_at_idx);
    data.extend_from_slice(name_hash.as_bytes());
    Hash::hash(&data)
}

/// Derives `blind = H(value || nonce)`.
pub fn derive_blind(value: u64, nonce: &Hash) -> Hash {
    let mut data = Vec::with_capacity(8 + 32);
    data.extend_from_slice(&value.to_le_bytes());
    data.extend_from_slice(nonce.as_bytes());
    Hash::hash(&data)
}

/// Full blind-commitment derivation for a bid: given the bidder's address
/// hash, a key-derivation function producing the account public key at a
/// given index, the name hash, and the bid value, returns `(blind, nonce)`.
pub fn blind_commitment<F>(
    addr_hash: &[u8],
    derive_pubkey_at: F,
    name_hash: &Hash,
    value: u64,
) -> (Hash, Hash)
where
    F: FnOnce(u32) -> Vec<u8>,
{
    let idx = nonce_index(value);
    let pubkey = derive_pubkey_at(idx);
    let nonce = derive_nonce(addr_hash, &pubkey, name_hash);
    let blind = derive_blind(value, &nonce);
    (blind, nonce)
}

/// Used by `REVEAL`'s cross-epoch replay guard: a credit confirmed before
/// the auction's opening height belongs to a stale epoch.
pub fn confirmed_in_epoch(confirmation_height: u32, epoch_height: u32) -> bool {
    confirmation_height >= epoch_height
}

/// Account id used by `CoinIndex`'s secondary index; a thin alias kept here
/// (rather than in `coin.rs`) since it is a `rules`-level concept (which
/// account a credit/derivation path belongs to), not part of the coin's wire
/// encoding itself.
pub type AccountId = Account;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_names() {
        assert!(is_valid_name("alice"));
        assert!(is_valid_name("a-b-c"));
        assert!(is_valid_name("a1"));
    }

    #[test]
    fn rejects_bad_names() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("-alice"));
        assert!(!is_valid_name("alice-"));
        assert!(!is_valid_name("al--ice"));
        assert!(!is_valid_name("ALICE"));
        assert!(!is_valid_name(&"a".repeat(64)));
    }

    #[test]
    fn name_hash_is_deterministic() {
        assert_eq!(name_hash("alice"), name_hash("alice"));
        assert_ne!(name_hash("alice"), name_hash("bob"));
    }

    #[test]
    fn blind_commitment_round_trip_is_deterministic() {
        let name = name_hash("gamma");
        let addr_hash = [1u8; 20];
        let derive = |idx: u32| -> Vec<u8> { format!("pubkey-{idx}").into_bytes() };

        let (blind1, nonce1) = blind_commitment(&addr_hash, derive, &name, 1000);
        let (blind2, nonce2) = blind_commitment(&addr_hash, derive, &name, 1000);
        assert_eq!(blind1, blind2);
        assert_eq!(nonce1, nonce2);

        let (blind3, _) = blind_commitment(&addr_hash, derive, &name, 999);
        assert_ne!(blind1, blind3);
    }
}
