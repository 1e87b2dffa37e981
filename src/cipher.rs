//! Symmetric encryption-at-rest for secret-bearing store values (blind
//! store entries, the wallet's private key material), unchanged from the
//! teacher's `cipher.rs` apart from swapping `tos_common::crypto::hash` for
//! this crate's own `hash` module.

use crate::{config::SALT_SIZE, error::CryptoError, hash::Hash};
use chacha20poly1305::{aead::Aead, AeadCore, KeyInit, XChaCha20Poly1305, XNonce};

pub struct Cipher {
    cipher: XChaCha20Poly1305,
    // salt mixed into every key hash and prepended to every encrypted value
    salt: Option<[u8; SALT_SIZE]>,
}

impl Cipher {
    pub const NONCE_SIZE: usize = 24;

    pub fn new(key: &[u8], salt: Option<[u8; SALT_SIZE]>) -> Result<Self, CryptoError> {
        Ok(Self {
            cipher: XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::Cipher)?,
            salt,
        })
    }

    /// Encrypts `value`, generating a fresh random nonce each call.
    pub fn encrypt_value(&self, value: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = XChaCha20Poly1305::generate_nonce().map_err(|_| CryptoError::NonceGeneration)?;
        self.encrypt_value_with_nonce(value, &nonce.into())
    }

    pub fn encrypt_value_with_nonce(
        &self,
        value: &[u8],
        nonce: &[u8; Self::NONCE_SIZE],
    ) -> Result<Vec<u8>, CryptoError> {
        let mut plaintext = Vec::with_capacity(SALT_SIZE + value.len());
        if let Some(salt) = &self.salt {
            plaintext.extend_from_slice(salt);
        }
        plaintext.extend_from_slice(value);

        let data = self
            .cipher
            .encrypt(nonce.into(), plaintext.as_slice())
            .map_err(|_| CryptoError::Cipher)?;

        let mut encrypted = Vec::with_capacity(Self::NONCE_SIZE + data.len());
        encrypted.extend_from_slice(nonce);
        encrypted.extend_from_slice(&data);
        Ok(encrypted)
    }

    /// Decrypts a value produced by `encrypt_value`/`encrypt_value_with_nonce`.
    pub fn decrypt_value(&self, encrypted: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if encrypted.len() < Self::NONCE_SIZE + 1 {
            return Err(CryptoError::InvalidEncryptedValue);
        }

        let nonce = XNonce::try_from(&encrypted[0..Self::NONCE_SIZE])
            .map_err(|_| CryptoError::NonceGeneration)?;

        let mut decrypted = self
            .cipher
            .decrypt(&nonce, &encrypted[Self::NONCE_SIZE..])
            .map_err(|_| CryptoError::Cipher)?;

        if let Some(salt) = &self.salt {
            decrypted.drain(0..salt.len());
        }

        Ok(decrypted)
    }

    /// Hashes `key` salted, for use as an at-rest key so the on-disk tree
    /// never leaks plaintext key material.
    pub fn hash_key<S: AsRef<[u8]>>(&self, key: S) -> [u8; 32] {
        let mut data = Vec::new();
        if let Some(salt) = &self.salt {
            data.extend_from_slice(salt);
        }
        data.extend_from_slice(key.as_ref());
        *Hash::hash(&data).as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let cipher = Cipher::new(&[7u8; 32], Some([9u8; SALT_SIZE])).unwrap();
        let value = b"super secret blind nonce";
        let encrypted = cipher.encrypt_value(value).unwrap();
        let decrypted = cipher.decrypt_value(&encrypted).unwrap();
        assert_eq!(decrypted, value);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let cipher = Cipher::new(&[1u8; 32], None).unwrap();
        let mut encrypted = cipher.encrypt_value(b"data").unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0xff;
        assert!(cipher.decrypt_value(&encrypted).is_err());
    }

    #[test]
    fn hash_key_is_deterministic() {
        let cipher = Cipher::new(&[1u8; 32], Some([2u8; SALT_SIZE])).unwrap();
        assert_eq!(cipher.hash_key("abc"), cipher.hash_key("abc"));
        assert_ne!(cipher.hash_key("abc"), cipher.hash_key("abd"));
    }
}
