//! Wire-level and identity types shared across the filesystem: object identifiers, versions,
//! node kinds/names, attributes, and the JSON formats used for link and folder payloads.

mod attrs;
mod b64;
mod folder_payload;
mod link_params;
mod node_kind;
mod node_name;
mod object_id;
mod storage_type;
mod version;

pub use attrs::{CommonAttrs, XAttrs, XAttrsChange};
pub use folder_payload::{ChildEntry, ChildTable, FolderPayload, WireChildEntry};
pub use link_params::{FileLinkParams, FolderLinkParams, LinkParameters, LinkTarget};
pub use node_kind::NodeKind;
pub use node_name::{NodeName, NodeNameError};
pub use object_id::ObjectId;
pub use storage_type::StorageType;
pub use version::Version;
