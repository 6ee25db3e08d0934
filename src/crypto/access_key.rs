use chacha20poly1305::{Key as ChaChaKey, KeyInit, XChaCha20Poly1305};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::CryptoError;

const ACCESS_KEY_LENGTH: usize = 32;

/// Symmetric key owned by a single node. Never escapes the node it belongs to except when
/// embedded in a [`crate::codec::LinkParameters`] produced by an explicit link operation.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKey([u8; ACCESS_KEY_LENGTH]);

impl AccessKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; ACCESS_KEY_LENGTH];
        crate::utils::crypto_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != ACCESS_KEY_LENGTH {
            return Err(CryptoError::InvalidKeyLength {
                expected: ACCESS_KEY_LENGTH,
                actual: bytes.len(),
            });
        }

        let mut key = [0u8; ACCESS_KEY_LENGTH];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub(crate) fn chacha_key(&self) -> &ChaChaKey {
        ChaChaKey::from_slice(&self.0)
    }

    pub(crate) fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(self.chacha_key())
    }

    pub const fn size() -> usize {
        ACCESS_KEY_LENGTH
    }
}

impl std::fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessKey(..)")
    }
}

impl PartialEq for AccessKey {
    fn eq(&self, other: &Self) -> bool {
        let mut diff = 0u8;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}
impl Eq for AccessKey {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_full_length_and_distinct() {
        let a = AccessKey::generate();
        let b = AccessKey::generate();
        assert_eq!(a.as_bytes().len(), AccessKey::size());
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        assert!(AccessKey::from_bytes(&[0u8; 4]).is_err());
    }
}
