use serde::{Deserialize, Serialize};

use crate::codec::{b64, ObjectId, StorageType};
use crate::crypto::AccessKey;

/// Self-contained reference to a node in some storage, persisted as the payload of a link node.
/// Carries the key needed to open the target, so a link is openable by anyone who can read it,
/// independent of how they reached it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkParameters {
    pub storage_type: StorageType,
    #[serde(default)]
    pub readonly: bool,
    #[serde(flatten)]
    pub target: LinkTarget,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LinkTarget {
    #[serde(rename = "file")]
    File {
        #[serde(rename = "isFile")]
        is_file: bool,
        params: FileLinkParams,
    },
    #[serde(rename = "folder")]
    Folder {
        #[serde(rename = "isFolder")]
        is_folder: bool,
        params: FolderLinkParams,
    },
}

impl LinkTarget {
    pub fn file(params: FileLinkParams) -> Self {
        LinkTarget::File {
            is_file: true,
            params,
        }
    }

    pub fn folder(params: FolderLinkParams) -> Self {
        LinkTarget::Folder {
            is_folder: true,
            params,
        }
    }

    pub fn obj_id(&self) -> &ObjectId {
        match self {
            LinkTarget::File { params, .. } => &params.obj_id,
            LinkTarget::Folder { params, .. } => &params.obj_id,
        }
    }

    pub fn key(&self) -> &AccessKey {
        match self {
            LinkTarget::File { params, .. } => &params.f_key,
            LinkTarget::Folder { params, .. } => &params.f_key,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, LinkTarget::File { .. })
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLinkParams {
    pub file_name: String,
    pub obj_id: ObjectId,
    #[serde(with = "key_b64")]
    pub f_key: AccessKey,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderLinkParams {
    pub folder_name: String,
    pub obj_id: ObjectId,
    #[serde(with = "key_b64")]
    pub f_key: AccessKey,
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

    #[test]
    fn file_link_round_trips_through_json() {
        let params = LinkParameters {
            storage_type: StorageType::Synced,
            readonly: true,
            target: LinkTarget::file(FileLinkParams {
                file_name: "photo.jpg".into(),
                obj_id: ObjectId::opaque(vec![9, 9, 9]),
                f_key: AccessKey::generate(),
            }),
        };

        let encoded = serde_json::to_string(&params).unwrap();
        assert!(encoded.contains("\"isFile\":true"));
        let decoded: LinkParameters = serde_json::from_str(&encoded).unwrap();
        assert_eq!(params, decoded);
    }

    #[test]
    fn folder_link_round_trips_through_json() {
        let params = LinkParameters {
            storage_type: StorageType::Local,
            readonly: false,
            target: LinkTarget::folder(FolderLinkParams {
                folder_name: "photos".into(),
                obj_id: ObjectId::opaque(vec![1, 2]),
                f_key: AccessKey::generate(),
            }),
        };

        let encoded = serde_json::to_string(&params).unwrap();
        let decoded: LinkParameters = serde_json::from_str(&encoded).unwrap();
        assert_eq!(params, decoded);
    }
}
