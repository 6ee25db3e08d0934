use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::b64;

/// Opaque, variable-length identifier for an object in the backing [`Storage`](crate::store::Storage).
/// Produced by the store when a node is created and immutable for the lifetime of the node.
///
/// `ObjectId::Root` is a distinguished sentinel that always addresses the filesystem's root
/// folder; the store never hands out an opaque id equal to it (see [`ObjectId::is_root`]).
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectId {
    Root,
    Opaque(#[serde(with = "opaque_bytes")] Vec<u8>),
}

impl ObjectId {
    pub fn opaque(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Opaque(bytes.into())
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root)
    }

    /// Bytes used to key caches and to derive the header nonce. `Root` is given a fixed all-zero
    /// representation so the derivation stays a pure function of identity.
    pub fn as_bytes(&self) -> std::borrow::Cow<'_, [u8]> {
        match self {
            Self::Root => std::borrow::Cow::Borrowed(ROOT_SENTINEL_BYTES),
            Self::Opaque(bytes) => std::borrow::Cow::Borrowed(bytes),
        }
    }
}

const ROOT_SENTINEL_BYTES: &[u8] = b"{{cryptree:root}}";

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "ObjectId::Root"),
            Self::Opaque(bytes) => write!(f, "ObjectId({})", b64::encode(bytes)),
        }
    }
}

mod opaque_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::b64;

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&b64::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(de)?;
        b64::decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_not_opaque() {
        let root = ObjectId::Root;
        let opaque = ObjectId::opaque(ROOT_SENTINEL_BYTES.to_vec());
        assert_ne!(root, opaque);
    }

    #[test]
    fn round_trips_through_json() {
        let id = ObjectId::opaque(vec![1, 2, 3, 4]);
        let encoded = serde_json::to_string(&id).unwrap();
        let decoded: ObjectId = serde_json::from_str(&encoded).unwrap();
        assert_eq!(id, decoded);
    }
}
