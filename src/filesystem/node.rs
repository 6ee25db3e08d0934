//! Component C: identity, attribute access and write serialization shared by every node kind.
//!
//! [`FileNode`] and [`FolderNode`] each hold a [`Node`] and drive it through the
//! acquire-lock / compute-update / commit protocol described on [`Node::change_lock`].
//!
//! [`FileNode`]: crate::filesystem::FileNode
//! [`FolderNode`]: crate::filesystem::FolderNode

use std::sync::Arc;

use async_std::channel::{bounded, Receiver, Sender};
use async_std::sync::RwLock;

use crate::codec::{CommonAttrs, NodeName, ObjectId, Version, XAttrs, XAttrsChange};
use crate::crypto::AccessKey;
use crate::error::{FsError, FsResult};
use crate::store::{NodeEvent, NodeEventKind, Storage};

use super::attr_store;
use super::persistence::NodePersistence;

/// A snapshot of a node's versioned, attribute-carrying state.
#[derive(Clone)]
pub(crate) struct NodeState {
    pub version: Version,
    pub attrs: CommonAttrs,
    pub xattrs: XAttrs,
}

/// An owned, movable handle on a node's exclusive write permission. Acquired from
/// [`ChangeLock::acquire`] and released on drop; because it owns its half of the lock channel
/// rather than borrowing it, it can be handed to a spawned, detached task — which is exactly
/// what the streaming-write protocol on `FileNode::write_sink` needs: the lock must stay held
/// until the save task finishes, well after the acquiring call has returned.
pub(crate) struct ChangeLockGuard {
    release: Sender<()>,
}

impl Drop for ChangeLockGuard {
    fn drop(&mut self) {
        let _ = self.release.try_send(());
    }
}

/// A single-permit FIFO lock. `async_std::sync::Mutex` would work too, but its guard borrows the
/// mutex and can't outlive a spawned task; channel-backed permits give us an owned guard instead.
pub(crate) struct ChangeLock {
    acquire: Sender<()>,
    wait: Receiver<()>,
}

impl ChangeLock {
    pub fn new() -> Self {
        let (acquire, wait) = bounded(1);
        acquire
            .try_send(())
            .expect("fresh bounded(1) channel always accepts one send");
        Self { acquire, wait }
    }

    pub async fn acquire(&self) -> ChangeLockGuard {
        self.wait
            .recv()
            .await
            .expect("change lock permit channel never closes while the node is alive");
        ChangeLockGuard {
            release: self.acquire.clone(),
        }
    }
}

/// Identity, attributes and write serialization common to files, folders and links.
pub struct Node {
    obj_id: ObjectId,
    parent_id: Option<ObjectId>,
    name: Option<NodeName>,
    key: AccessKey,
    storage: Arc<dyn Storage + Send + Sync>,
    persistence: Arc<NodePersistence>,
    state: RwLock<NodeState>,
    change_lock: ChangeLock,
}

impl Node {
    pub(crate) fn new(
        obj_id: ObjectId,
        parent_id: Option<ObjectId>,
        name: Option<NodeName>,
        key: AccessKey,
        storage: Arc<dyn Storage + Send + Sync>,
        persistence: Arc<NodePersistence>,
        version: Version,
        attrs: CommonAttrs,
        xattrs: XAttrs,
    ) -> Self {
        Self {
            obj_id,
            parent_id,
            name,
            key,
            storage,
            persistence,
            state: RwLock::new(NodeState {
                version,
                attrs,
                xattrs,
            }),
            change_lock: ChangeLock::new(),
        }
    }

    pub fn obj_id(&self) -> &ObjectId {
        &self.obj_id
    }

    pub fn parent_id(&self) -> Option<&ObjectId> {
        self.parent_id.as_ref()
    }

    pub(crate) fn set_parent_id(&mut self, parent_id: Option<ObjectId>) {
        self.parent_id = parent_id;
    }

    pub fn name(&self) -> Option<&NodeName> {
        self.name.as_ref()
    }

    pub(crate) fn set_name(&mut self, name: NodeName) {
        self.name = Some(name);
    }

    pub fn key(&self) -> &AccessKey {
        &self.key
    }

    pub(crate) fn storage(&self) -> &Arc<dyn Storage + Send + Sync> {
        &self.storage
    }

    pub(crate) fn persistence(&self) -> &Arc<NodePersistence> {
        &self.persistence
    }

    pub async fn version(&self) -> Version {
        self.state.read().await.version
    }

    pub async fn attrs(&self) -> CommonAttrs {
        self.state.read().await.attrs
    }

    pub async fn xattrs(&self) -> XAttrs {
        self.state.read().await.xattrs.clone()
    }

    pub(crate) async fn snapshot(&self) -> NodeState {
        self.state.read().await.clone()
    }

    /// Acquires this node's exclusive change permission. Hold the returned guard for the entire
    /// mutating interval — including, for streaming writes, the lifetime of the detached save
    /// task — so no concurrent writer can observe or create an interleaved version.
    pub(crate) async fn change_lock(&self) -> ChangeLockGuard {
        self.change_lock.acquire().await
    }

    /// Fails with `version-mismatch` if `expected` is supplied and doesn't match the live
    /// version. Must be called while holding the change lock so the check and the subsequent
    /// write are atomic with respect to other writers.
    pub(crate) async fn check_version(&self, expected: Option<Version>) -> FsResult<NodeState> {
        let state = self.snapshot().await;
        if let Some(expected) = expected {
            if state.version != expected {
                return Err(FsError::version_mismatch());
            }
        }
        Ok(state)
    }

    /// Computes the next version, attrs and xattrs for an update, without committing them. The
    /// node's live state is unaffected until [`Node::set_updated`] is called.
    pub(crate) fn get_params_for_update(
        &self,
        current: &NodeState,
        xattr_change: Option<XAttrsChange>,
    ) -> (Version, CommonAttrs, XAttrs) {
        let new_version = current.version.next();
        let now_ms = crate::utils::current_time_ms().max(0) as u64;
        let (attrs, xattrs) =
            attr_store::apply_update(current.attrs, &current.xattrs, xattr_change, now_ms);
        (new_version, attrs, xattrs)
    }

    /// Commits a successful write into the node's live state. Does not publish an event: callers
    /// publish the kind-specific event (`file-change`, `entry-addition`, ...) themselves, since
    /// only they know its shape.
    pub(crate) async fn set_updated(&self, version: Version, attrs: CommonAttrs, xattrs: XAttrs) {
        let mut state = self.state.write().await;
        state.version = version;
        state.attrs = attrs;
        state.xattrs = xattrs;
    }

    pub(crate) async fn publish_event(&self, kind: NodeEventKind) {
        self.storage
            .publish_event(NodeEvent {
                obj_id: self.obj_id.clone(),
                parent_obj_id: self.parent_id.clone(),
                kind,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[async_std::test]
    async fn change_lock_serializes_acquirers() {
        let lock = ChangeLock::new();
        let first = lock.acquire().await;

        let lock = Arc::new(lock);
        let lock2 = lock.clone();
        let handle = async_std::task::spawn(async move { lock2.acquire().await });

        async_std::task::sleep(std::time::Duration::from_millis(20)).await;
        drop(first);

        let _second = handle.await;
    }
}
