//! The object store consumed by the filesystem core through the [`Storage`] port: allocation of
//! fresh object ids, versioned get/save of encrypted object bytes, and a feed of low-level
//! change events that [`crate::filesystem::EventRouter`] turns into path-shaped events.

mod memory;

pub use memory::MemoryStorage;

use async_std::channel::Receiver;
use async_trait::async_trait;

use crate::codec::{NodeKind, ObjectId, StorageType, Version};
use crate::crypto::Subscribe;

/// Opaque token correlating a cross-folder `entry-removal` with its paired `entry-addition`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct MoveLabel(u128);

impl MoveLabel {
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        crate::utils::crypto_rng().fill_bytes(&mut bytes);
        Self(u128::from_le_bytes(bytes))
    }
}

/// A low-level, objId-keyed change reported by the store. [`crate::filesystem::EventRouter`]
/// translates a stream of these into path-shaped events for `watch_folder`/`watch_tree`.
#[derive(Clone, Debug)]
pub struct NodeEvent {
    pub obj_id: ObjectId,
    pub parent_obj_id: Option<ObjectId>,
    pub kind: NodeEventKind,
}

#[derive(Clone, Debug)]
pub enum NodeEventKind {
    EntryAddition {
        name: String,
        child_kind: NodeKind,
        move_label: Option<MoveLabel>,
    },
    EntryRemoval {
        name: String,
        move_label: Option<MoveLabel>,
    },
    EntryRenaming {
        old_name: String,
        new_name: String,
    },
    Removed,
    Changed {
        new_version: Version,
    },
}

/// The decrypted-at-rest object header plus its encrypted body, as handed back by
/// [`Storage::get_obj`]. `header` is opaque to the store; only [`crate::filesystem::NodePersistence`]
/// knows how to interpret it.
#[derive(Clone, Debug)]
pub struct ObjSource {
    pub version: Version,
    header: Vec<u8>,
    body: Vec<u8>,
}

impl ObjSource {
    pub fn new(version: Version, header: Vec<u8>, body: Vec<u8>) -> Self {
        Self {
            version,
            header,
            body,
        }
    }

    pub fn read_header(&self) -> &[u8] {
        &self.header
    }

    pub fn seg_src(&self) -> &[u8] {
        &self.body
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    fn storage_type(&self) -> StorageType;

    async fn generate_new_obj_id(&self) -> Result<ObjectId, StorageError>;

    /// Fetches an object's current header and body. `ObjectId::Root` addresses the root folder.
    async fn get_obj(&self, obj_id: &ObjectId) -> Result<ObjSource, StorageError>;

    /// Writer-push save: the caller has already assigned `new_version` and commits to it before
    /// any byte is written, so `save_obj` must reject a version that isn't exactly one greater
    /// than the object's current version (or 1, for a brand-new object).
    async fn save_obj(
        &self,
        obj_id: &ObjectId,
        new_version: Version,
        header: Vec<u8>,
        subscribe: Subscribe,
    ) -> Result<(), StorageError>;

    /// Removes an object outright. Used when a folder entry is deleted, never for an in-place
    /// truncate (that goes through `save_obj` with `truncate: true`).
    async fn remove_obj(&self, obj_id: &ObjectId) -> Result<(), StorageError>;

    fn get_node_events(&self) -> Receiver<NodeEvent>;

    /// Hands a semantic event (entry added/removed/renamed, a node's content changed, ...) to the
    /// store's event bus. Folder and file nodes call this after a save/remove has durably
    /// committed; the store itself is just the transport, it doesn't interpret object bytes.
    async fn publish_event(&self, event: NodeEvent);
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found")]
    NotFound,

    #[error("expected to write version {expected:?}, store is at {actual:?}")]
    VersionConflict { expected: Version, actual: Version },

    #[error("storage has been closed")]
    Closed,

    #[error("underlying crypto operation failed: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
