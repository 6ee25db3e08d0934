use chacha20poly1305::XNonce as ChaChaNonce;

use crate::codec::ObjectId;

const NONCE_LENGTH: usize = 24;

/// Nonce used for a node's header, derived as a pure function of its [`ObjectId`]. Two writes of
/// the same object therefore always produce the same header nonce, which is what lets the
/// segmented scheme verify a delta write against its base without re-deriving anything.
#[derive(Clone)]
pub struct HeaderNonce([u8; NONCE_LENGTH]);

impl HeaderNonce {
    pub fn derive(obj_id: &ObjectId) -> Self {
        let hash = blake3::hash(&obj_id.as_bytes());
        let mut bytes = [0u8; NONCE_LENGTH];
        bytes.copy_from_slice(&hash.as_bytes()[..NONCE_LENGTH]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LENGTH] {
        &self.0
    }

    pub(crate) fn as_chacha_nonce(&self) -> &ChaChaNonce {
        ChaChaNonce::from_slice(&self.0)
    }

    pub const fn size() -> usize {
        NONCE_LENGTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_pure() {
        let id = ObjectId::opaque(vec![7, 7, 7]);
        let a = HeaderNonce::derive(&id);
        let b = HeaderNonce::derive(&id);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn distinct_ids_derive_distinct_nonces() {
        let a = HeaderNonce::derive(&ObjectId::opaque(vec![1]));
        let b = HeaderNonce::derive(&ObjectId::opaque(vec![2]));
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn root_derives_a_stable_nonce() {
        let a = HeaderNonce::derive(&ObjectId::Root);
        let b = HeaderNonce::derive(&ObjectId::Root);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }
}
