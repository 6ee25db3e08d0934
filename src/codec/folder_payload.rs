use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codec::{b64, NodeKind, NodeName, ObjectId};
use crate::crypto::AccessKey;

/// A single child entry as persisted inside a folder's encrypted payload. Each entry carries
/// its own `objId` and its own key — never the parent's key — so that opening a folder
/// transitively yields exactly the keys needed to open its children, and nothing more.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChildEntry {
    pub obj_id: ObjectId,
    #[serde(with = "key_b64")]
    pub key: AccessKey,
    pub kind: NodeKind,
}

/// In-memory form of a folder's child table, keyed by validated [`NodeName`]. Serializes to the
/// wire format via [`FolderPayload`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChildTable(BTreeMap<NodeName, ChildEntry>);

impl ChildTable {
    pub fn get(&self, name: &NodeName) -> Option<&ChildEntry> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &NodeName) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: NodeName, entry: ChildEntry) -> Option<ChildEntry> {
        self.0.insert(name, entry)
    }

    pub fn remove(&mut self, name: &NodeName) -> Option<ChildEntry> {
        self.0.remove(name)
    }

    pub fn rename(&mut self, old: &NodeName, new: NodeName) -> Option<ChildEntry> {
        let entry = self.0.remove(old)?;
        self.0.insert(new, entry.clone());
        Some(entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeName, &ChildEntry)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// On-the-wire representation of a folder's encrypted payload: every child's own name, object id,
/// kind and key, keyed so deserialization can rebuild a [`ChildTable`] directly.
///
/// This is also the "Folder-in-JSON" format used for ASMail message roots (`{nodes, ctime}`):
/// the same shape, without the surrounding node key that normally wraps a folder's object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FolderPayload {
    pub nodes: BTreeMap<String, WireChildEntry>,
    pub ctime: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireChildEntry {
    pub obj_id: ObjectId,
    pub name: String,
    #[serde(with = "key_b64")]
    pub key: AccessKey,
    pub is_file: bool,
    pub is_folder: bool,
}

impl FolderPayload {
    pub fn from_child_table(table: &ChildTable, ctime: u64) -> Self {
        let nodes = table
            .iter()
            .map(|(name, entry)| {
                (
                    name.as_str().to_string(),
                    WireChildEntry {
                        obj_id: entry.obj_id.clone(),
                        name: name.as_str().to_string(),
                        // Each child is encoded with its OWN key, never the folder's key: the
                        // point of a folder payload is that it grants exactly the keys to open
                        // its immediate children, nothing broader.
                        key: entry.key.clone(),
                        is_file: entry.kind.is_file(),
                        is_folder: entry.kind.is_folder(),
                    },
                )
            })
            .collect();

        Self { nodes, ctime }
    }

    pub fn into_child_table(self) -> Result<ChildTable, crate::error::InternalError> {
        let mut table = ChildTable::default();
        for (raw_name, wire) in self.nodes {
            let name = NodeName::try_from(raw_name)?;
            let kind = if wire.is_folder {
                NodeKind::Folder
            } else if wire.is_file {
                NodeKind::File
            } else {
                NodeKind::Link
            };
            table.insert(
                name,
                ChildEntry {
                    obj_id: wire.obj_id,
                    key: wire.key,
                    kind,
                },
            );
        }
        Ok(table)
    }
}

mod key_b64 {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{b64, AccessKey};

    pub fn serialize<S: Serializer>(key: &AccessKey, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&b64::encode(key.as_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<AccessKey, D::Error> {
        let encoded = String::deserialize(de)?;
        let bytes = b64::decode(encoded).map_err(serde::de::Error::custom)?;
        AccessKey::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: NodeKind) -> ChildEntry {
        ChildEntry {
            obj_id: ObjectId::opaque(vec![1, 2, 3]),
            key: AccessKey::generate(),
            kind,
        }
    }

    /// Regression test for the containment property: each child must round-trip with its own
    /// distinct key, never the key of a sibling or the parent.
    #[test]
    fn each_child_keeps_its_own_key() {
        let mut table = ChildTable::default();
        let a_entry = entry(NodeKind::File);
        let b_entry = entry(NodeKind::Folder);
        assert_ne!(a_entry.key.as_bytes(), b_entry.key.as_bytes());

        table.insert(NodeName::try_from("a").unwrap(), a_entry.clone());
        table.insert(NodeName::try_from("b").unwrap(), b_entry.clone());

        let payload = FolderPayload::from_child_table(&table, 0);
        let restored = payload.into_child_table().unwrap();

        let restored_a = restored.get(&NodeName::try_from("a").unwrap()).unwrap();
        let restored_b = restored.get(&NodeName::try_from("b").unwrap()).unwrap();

        assert_eq!(restored_a.key.as_bytes(), a_entry.key.as_bytes());
        assert_eq!(restored_b.key.as_bytes(), b_entry.key.as_bytes());
        assert_ne!(restored_a.key.as_bytes(), restored_b.key.as_bytes());
    }

    #[test]
    fn rename_preserves_obj_id_and_key() {
        let mut table = ChildTable::default();
        let original = entry(NodeKind::File);
        table.insert(NodeName::try_from("old").unwrap(), original.clone());

        let moved = table
            .rename(&NodeName::try_from("old").unwrap(), NodeName::try_from("new").unwrap())
            .unwrap();

        assert_eq!(moved.obj_id, original.obj_id);
        assert_eq!(moved.key.as_bytes(), original.key.as_bytes());
        assert!(table.get(&NodeName::try_from("old").unwrap()).is_none());
        assert!(table.get(&NodeName::try_from("new").unwrap()).is_some());
    }
}
