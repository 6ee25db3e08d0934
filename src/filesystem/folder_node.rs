//! Component E: directory entries, child lifecycle, folder-level events, subtree traversal.

use std::collections::HashMap;
use std::sync::Arc;

use async_recursion::async_recursion;
use async_std::channel::bounded;
use async_std::sync::RwLock;

use crate::codec::{
    ChildEntry, ChildTable, CommonAttrs, FolderPayload, LinkParameters, NodeKind, NodeName,
    ObjectId, Version, XAttrs,
};
use crate::crypto::{AccessKey, Subscribe};
use crate::error::{from_storage_error, FsError, FsErrorKind, FsResult};
use crate::store::{MoveLabel, NodeEventKind};
use tracing::{debug, error};

use super::file_node::FileNode;
use super::link_node::LinkNode;
use super::node::Node;

/// A name's resolved child, loaded into memory. Cheaply cloneable: each variant is an `Arc`.
#[derive(Clone)]
pub enum LoadedNode {
    File(Arc<FileNode>),
    Folder(Arc<FolderNode>),
    Link(Arc<LinkNode>),
}

impl LoadedNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            LoadedNode::File(_) => NodeKind::File,
            LoadedNode::Folder(_) => NodeKind::Folder,
            LoadedNode::Link(_) => NodeKind::Link,
        }
    }
}

/// A snapshot entry as returned by [`FolderNode::list`].
#[derive(Clone, Debug)]
pub struct FolderEntry {
    pub name: NodeName,
    pub kind: NodeKind,
}

pub struct FolderNode {
    node: Node,
    table: RwLock<ChildTable>,
    loaded: RwLock<HashMap<NodeName, LoadedNode>>,
}

impl FolderNode {
    pub(crate) fn new(node: Node, table: ChildTable) -> Self {
        Self {
            node,
            table: RwLock::new(table),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn node(&self) -> &Node {
        &self.node
    }

    pub fn obj_id(&self) -> &ObjectId {
        self.node.obj_id()
    }

    pub async fn version(&self) -> Version {
        self.node.version().await
    }

    /// Snapshot of `{name, kind}` entries plus the folder's current version.
    pub async fn list(&self) -> (Vec<FolderEntry>, Version) {
        let table = self.table.read().await;
        let entries = table
            .iter()
            .map(|(name, entry)| FolderEntry {
                name: name.clone(),
                kind: entry.kind,
            })
            .collect();
        drop(table);
        (entries, self.node.version().await)
    }

    /// Resolves `name` to a loaded child, caching the result. `None` if no such child exists.
    pub async fn get_node(&self, name: &NodeName) -> FsResult<Option<LoadedNode>> {
        if let Some(loaded) = self.loaded.read().await.get(name) {
            return Ok(Some(loaded.clone()));
        }

        let entry = {
            let table = self.table.read().await;
            match table.get(name) {
                Some(entry) => entry.clone(),
                None => return Ok(None),
            }
        };

        let loaded = self.load_child(name, &entry).await?;
        self.loaded
            .write()
            .await
            .insert(name.clone(), loaded.clone());
        Ok(Some(loaded))
    }

    /// Returns the loaded file at `name`. `None` only if `null_on_missing` and the name doesn't
    /// exist; otherwise a missing name fails `not-found` and a non-file name fails `not-file`.
    pub async fn get_file(
        &self,
        name: &NodeName,
        null_on_missing: bool,
    ) -> FsResult<Option<Arc<FileNode>>> {
        match self.get_node(name).await? {
            Some(LoadedNode::File(file)) => Ok(Some(file)),
            Some(_) => Err(FsError::not_file()),
            None if null_on_missing => Ok(None),
            None => Err(FsError::not_found()),
        }
    }

    pub async fn get_link(&self, name: &NodeName) -> FsResult<Arc<LinkNode>> {
        match self.get_node(name).await? {
            Some(LoadedNode::Link(link)) => Ok(link),
            Some(_) => Err(FsError::not_link()),
            None => Err(FsError::not_found()),
        }
    }

    pub async fn get_folder(&self, name: &NodeName) -> FsResult<Arc<FolderNode>> {
        match self.get_node(name).await? {
            Some(LoadedNode::Folder(folder)) => Ok(folder),
            Some(_) => Err(FsError::not_directory()),
            None => Err(FsError::not_found()),
        }
    }

    /// Walks `parts` from this folder. An empty path returns `this`. See the component contract
    /// for the exact create/exclusive semantics at each segment.
    #[async_recursion]
    pub async fn get_folder_in_sub_tree(
        self: &Arc<Self>,
        parts: &[NodeName],
        create: bool,
        exclusive: bool,
    ) -> FsResult<Arc<FolderNode>> {
        let Some((head, rest)) = parts.split_first() else {
            return Ok(Arc::clone(self));
        };
        let is_leaf = rest.is_empty();

        match self.get_node(head).await? {
            Some(LoadedNode::Folder(folder)) => {
                if is_leaf && create && exclusive {
                    return Err(FsError::already_exists());
                }
                folder.get_folder_in_sub_tree(rest, create, exclusive).await
            }
            Some(_) => Err(FsError::not_directory()),
            None => {
                if !create {
                    return Err(FsError::not_found());
                }
                let folder = self.create_folder(head.clone()).await?;
                folder.get_folder_in_sub_tree(rest, create, exclusive).await
            }
        }
    }

    /// Allocates a new file node (fresh `objId`, fresh key), writes its initial empty payload,
    /// then installs the entry and persists this folder (child first, then parent).
    pub async fn create_file(self: &Arc<Self>, name: NodeName) -> FsResult<Arc<FileNode>> {
        let _guard = self.node.change_lock().await;

        if self.table.read().await.contains(&name) {
            return Err(FsError::already_exists());
        }

        let (obj_id, key) = self.allocate_child().await?;
        let child_node = self.new_child_node(obj_id.clone(), key.clone(), name.clone());
        let file = Arc::new(FileNode::new(child_node, 0));
        file.save(Vec::new(), None).await?;

        self.install_entry(
            name.clone(),
            ChildEntry {
                obj_id,
                key,
                kind: NodeKind::File,
            },
        )
        .await?;

        self.loaded
            .write()
            .await
            .insert(name, LoadedNode::File(Arc::clone(&file)));
        Ok(file)
    }

    /// Allocates a new, empty folder node and installs it as a child, mirroring
    /// [`FolderNode::create_file`]. All folders other than the VFS root derive their key from
    /// secure random bytes at creation time.
    pub async fn create_folder(self: &Arc<Self>, name: NodeName) -> FsResult<Arc<FolderNode>> {
        let _guard = self.node.change_lock().await;

        if self.table.read().await.contains(&name) {
            return Err(FsError::already_exists());
        }

        let (obj_id, key) = self.allocate_child().await?;
        let child_node = self.new_child_node(obj_id.clone(), key.clone(), name.clone());
        let folder = Arc::new(FolderNode::new(child_node, ChildTable::default()));
        folder.persist_table(ChildTable::default()).await?;

        self.install_entry(
            name.clone(),
            ChildEntry {
                obj_id,
                key,
                kind: NodeKind::Folder,
            },
        )
        .await?;

        self.loaded
            .write()
            .await
            .insert(name, LoadedNode::Folder(Arc::clone(&folder)));
        Ok(folder)
    }

    /// Installs a link entry whose payload is the serialized target parameters. Fails with a
    /// file exception if this folder's storage type can't reach the target's.
    pub async fn create_link(
        self: &Arc<Self>,
        name: NodeName,
        params: LinkParameters,
    ) -> FsResult<Arc<LinkNode>> {
        let _guard = self.node.change_lock().await;

        if self.table.read().await.contains(&name) {
            return Err(FsError::already_exists());
        }

        if !self
            .node
            .storage()
            .storage_type()
            .can_link_to(params.storage_type)
        {
            return Err(FsError::new(FsErrorKind::PermissionDenied));
        }

        let (obj_id, key) = self.allocate_child().await?;
        let child_node = self.new_child_node(obj_id.clone(), key.clone(), name.clone());
        let link = Arc::new(LinkNode::new(child_node));
        link.write_params(&params).await?;

        self.install_entry(
            name.clone(),
            ChildEntry {
                obj_id,
                key,
                kind: NodeKind::Link,
            },
        )
        .await?;

        self.loaded
            .write()
            .await
            .insert(name, LoadedNode::Link(Arc::clone(&link)));
        Ok(link)
    }

    /// Moves `old_name` from this folder into `dst` as `new_name`, preserving the child's
    /// `objId` and key. A move within the same folder is just a rename. A cross-folder move
    /// acquires both folders' change locks in `objId` order (lower first) — the only compound
    /// lock in the system — and emits a correlated `entry-removal`/`entry-addition` pair sharing
    /// a fresh `moveLabel`.
    pub async fn move_child_to(
        self: &Arc<Self>,
        old_name: &NodeName,
        dst: &Arc<FolderNode>,
        new_name: NodeName,
    ) -> FsResult<()> {
        if Arc::ptr_eq(self, dst) {
            return self.rename_in_place(old_name, new_name).await;
        }

        let self_first = self.obj_id().as_bytes() <= dst.obj_id().as_bytes();
        let (_first_guard, _second_guard) = if self_first {
            (self.node.change_lock().await, dst.node.change_lock().await)
        } else {
            (dst.node.change_lock().await, self.node.change_lock().await)
        };

        let entry = {
            let table = self.table.read().await;
            table.get(old_name).cloned().ok_or_else(FsError::not_found)?
        };

        if dst.table.read().await.contains(&new_name) {
            return Err(FsError::already_exists());
        }

        let mut dst_table = dst.table.read().await.clone();
        dst_table.insert(new_name.clone(), entry.clone());
        let mut src_table = self.table.read().await.clone();
        src_table.remove(old_name);

        dst.persist_table(dst_table).await?;
        self.persist_table(src_table).await?;

        let move_label = MoveLabel::generate();
        dst.node
            .publish_event(NodeEventKind::EntryAddition {
                name: new_name.as_str().to_string(),
                child_kind: entry.kind,
                move_label: Some(move_label),
            })
            .await;
        self.node
            .publish_event(NodeEventKind::EntryRemoval {
                name: old_name.as_str().to_string(),
                move_label: Some(move_label),
            })
            .await;

        if let Some(child) = self.loaded.write().await.remove(old_name) {
            dst.loaded.write().await.insert(new_name, child);
        }

        Ok(())
    }

    async fn rename_in_place(
        self: &Arc<Self>,
        old_name: &NodeName,
        new_name: NodeName,
    ) -> FsResult<()> {
        let _guard = self.node.change_lock().await;

        let mut table = self.table.read().await.clone();
        if !table.contains(old_name) {
            return Err(FsError::not_found());
        }
        if old_name != &new_name && table.contains(&new_name) {
            return Err(FsError::already_exists());
        }
        table.rename(old_name, new_name.clone());
        self.persist_table(table).await?;

        self.node
            .publish_event(NodeEventKind::EntryRenaming {
                old_name: old_name.as_str().to_string(),
                new_name: new_name.as_str().to_string(),
            })
            .await;

        if let Some(child) = self.loaded.write().await.remove(old_name) {
            self.loaded.write().await.insert(new_name, child);
        }

        Ok(())
    }

    /// Removes `name`. Fails `not-empty` for a non-empty folder unless `recursive` is set, in
    /// which case every descendant object is deleted from the store too, depth-first, before the
    /// folder's own object and the parent's entry for it are removed.
    pub async fn remove_child(self: &Arc<Self>, name: &NodeName, recursive: bool) -> FsResult<()> {
        let _guard = self.node.change_lock().await;

        let entry = {
            let table = self.table.read().await;
            match table.get(name).cloned() {
                Some(entry) => entry,
                None => {
                    debug!(?name, "remove_child: no such entry");
                    return Err(FsError::not_found());
                }
            }
        };

        let mut child_folder = None;
        if entry.kind == NodeKind::Folder {
            if let Some(LoadedNode::Folder(folder)) = self.get_node(name).await? {
                let (entries, _) = folder.list().await;
                if !entries.is_empty() && !recursive {
                    return Err(FsError::not_empty());
                }
                child_folder = Some(folder);
            }
        }

        let mut table = self.table.read().await.clone();
        table.remove(name);
        self.persist_table(table).await?;

        if let Some(folder) = child_folder {
            remove_all_descendants(&folder).await?;
        }

        self.node
            .storage()
            .remove_obj(&entry.obj_id)
            .await
            .map_err(|e| {
                let err = from_storage_error(e);
                error!(?name, obj_id = ?entry.obj_id, ?err, "failed to remove child object");
                err
            })?;

        self.node
            .publish_event(NodeEventKind::EntryRemoval {
                name: name.as_str().to_string(),
                move_label: None,
            })
            .await;

        self.loaded.write().await.remove(name);
        debug!(?name, recursive, "removed child");
        Ok(())
    }

    async fn load_child(&self, name: &NodeName, entry: &ChildEntry) -> FsResult<LoadedNode> {
        let obj = self
            .node
            .storage()
            .get_obj(&entry.obj_id)
            .await
            .map_err(from_storage_error)?;

        let payload = self
            .node
            .persistence()
            .read_payload(&entry.obj_id, &entry.key, &obj)
            .await?;
        let version = payload.version;
        let attrs = payload.attrs;
        let xattrs = payload.xattrs.clone();

        match entry.kind {
            NodeKind::File => {
                let content_len = payload.content_len();
                let node = self.loaded_child_node(entry, name, version, attrs, xattrs);
                Ok(LoadedNode::File(Arc::new(FileNode::new(node, content_len))))
            }
            NodeKind::Folder => {
                let content = payload.into_bytes();
                let folder_payload: FolderPayload =
                    serde_json::from_slice(&content).map_err(FsError::parsing_error)?;
                let table = folder_payload
                    .into_child_table()
                    .map_err(|e| FsError::new(FsErrorKind::Io).with_cause(e))?;
                let node = self.loaded_child_node(entry, name, version, attrs, xattrs);
                Ok(LoadedNode::Folder(Arc::new(FolderNode::new(node, table))))
            }
            NodeKind::Link => {
                let node = self.loaded_child_node(entry, name, version, attrs, xattrs);
                Ok(LoadedNode::Link(Arc::new(LinkNode::new(node))))
            }
        }
    }

    fn loaded_child_node(
        &self,
        entry: &ChildEntry,
        name: &NodeName,
        version: Version,
        attrs: CommonAttrs,
        xattrs: XAttrs,
    ) -> Node {
        Node::new(
            entry.obj_id.clone(),
            Some(self.obj_id().clone()),
            Some(name.clone()),
            entry.key.clone(),
            self.node.storage().clone(),
            self.node.persistence().clone(),
            version,
            attrs,
            xattrs,
        )
    }

    fn new_child_node(&self, obj_id: ObjectId, key: AccessKey, name: NodeName) -> Node {
        let now_ms = crate::utils::current_time_ms().max(0) as u64;
        Node::new(
            obj_id,
            Some(self.obj_id().clone()),
            Some(name),
            key,
            self.node.storage().clone(),
            self.node.persistence().clone(),
            Version::Unknown,
            CommonAttrs::new(now_ms),
            XAttrs::default(),
        )
    }

    async fn allocate_child(&self) -> FsResult<(ObjectId, AccessKey)> {
        let obj_id = self
            .node
            .storage()
            .generate_new_obj_id()
            .await
            .map_err(from_storage_error)?;
        Ok((obj_id, AccessKey::generate()))
    }

    /// Installs `entry` under `name` and persists this folder. Must run after the child object
    /// itself has already been durably written, per the child-first-then-parent lifecycle rule.
    async fn install_entry(&self, name: NodeName, entry: ChildEntry) -> FsResult<()> {
        let mut table = self.table.read().await.clone();
        table.insert(name.clone(), entry.clone());
        self.persist_table(table).await?;

        self.node
            .publish_event(NodeEventKind::EntryAddition {
                name: name.as_str().to_string(),
                child_kind: entry.kind,
                move_label: None,
            })
            .await;
        Ok(())
    }

    /// Re-encodes and saves this folder's payload from `new_table`, bumping its version. Callers
    /// must already hold this folder's change lock.
    pub(crate) async fn persist_table(&self, new_table: ChildTable) -> FsResult<Version> {
        let current = self.node.snapshot().await;
        let (new_version, attrs, xattrs) = self.node.get_params_for_update(&current, None);

        let payload = FolderPayload::from_child_table(&new_table, attrs.ctime);
        let bytes = serde_json::to_vec(&payload).map_err(FsError::parsing_error)?;

        let (header, body) = self
            .node
            .persistence()
            .write_whole(
                self.node.obj_id(),
                self.node.key(),
                new_version,
                attrs,
                xattrs.clone(),
                &bytes,
            )
            .await?;

        let (tx, rx) = bounded::<Vec<u8>>(1);
        tx.send(body).await.ok();
        tx.close();
        let subscribe = Subscribe::new(rx);

        self.node
            .storage()
            .save_obj(self.node.obj_id(), new_version, header, subscribe)
            .await
            .map_err(|e| {
                let err = from_storage_error(e);
                error!(obj_id = ?self.node.obj_id(), ?err, "failed to persist folder table");
                err
            })?;

        self.node.set_updated(new_version, attrs, xattrs).await;
        *self.table.write().await = new_table;
        Ok(new_version)
    }
}

/// Depth-first removal of every object under `folder` from the store, used by
/// [`FolderNode::remove_child`] for a recursive delete. `folder`'s own object is left for the
/// caller to remove once this returns.
#[async_recursion]
async fn remove_all_descendants(folder: &Arc<FolderNode>) -> FsResult<()> {
    let (entries, _) = folder.list().await;
    for entry in entries {
        let Some(loaded) = folder.get_node(&entry.name).await? else {
            continue;
        };
        if let LoadedNode::Folder(sub) = &loaded {
            remove_all_descendants(sub).await?;
        }
        let obj_id = match &loaded {
            LoadedNode::File(f) => f.obj_id(),
            LoadedNode::Folder(f) => f.obj_id(),
            LoadedNode::Link(l) => l.obj_id(),
        };
        folder
            .node()
            .storage()
            .remove_obj(obj_id)
            .await
            .map_err(from_storage_error)?;
    }
    Ok(())
}
