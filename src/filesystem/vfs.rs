//! Component F: the VFS root. Owns one root [`FolderNode`] and a reference to [`Storage`], and
//! exposes every path-rooted operation applications drive the filesystem through.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_recursion::async_recursion;
use async_std::channel::{bounded, unbounded, Receiver, Sender};

use crate::codec::{
    ChildTable, CommonAttrs, FileLinkParams, FolderPayload, LinkParameters, NodeKind, NodeName,
    ObjectId, Version, XAttrs,
};
use crate::crypto::{AccessKey, Cryptor, FileByteSink, Subscribe};
use crate::error::{from_storage_error, FsError, FsErrorKind, FsResult};
use crate::store::{NodeEventKind, Storage};
use tracing::{debug, warn};

use super::event_router::{EventRouter, PathEvent};
use super::folder_node::{FolderEntry, FolderNode, LoadedNode};
use super::node::Node;
use super::persistence::NodePersistence;

/// `{create, exclusive, truncate}` write semantics shared by `write_bytes`/`write_text`/
/// `write_json`/`get_byte_sink`. `truncate` is only meaningful for `get_byte_sink`: a one-shot
/// write always replaces the whole payload, so it has nothing to truncate against.
#[derive(Clone, Copy, Debug, Default)]
pub struct WriteFlags {
    pub create: bool,
    pub exclusive: bool,
    pub truncate: bool,
}

impl WriteFlags {
    pub fn create() -> Self {
        Self {
            create: true,
            exclusive: false,
            truncate: true,
        }
    }

    pub fn create_exclusive() -> Self {
        Self {
            create: true,
            exclusive: true,
            truncate: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StatInfo {
    pub kind: NodeKind,
    pub version: Version,
    pub attrs: CommonAttrs,
}

/// A live `watch_file`/`watch_folder`/`watch_tree` subscription. Detach is idempotent: calling it
/// twice, or after the owning [`Vfs`] has been closed, is a no-op.
pub struct Watch {
    receiver: Receiver<PathEvent>,
    detached: Arc<AtomicBool>,
}

impl Watch {
    pub async fn next_event(&self) -> Option<PathEvent> {
        self.receiver.recv().await.ok()
    }

    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }
}

/// The VFS object: path parsing and resolution, path-rooted operations, and derivation of
/// read-only/writable sub-roots over the same underlying tree.
pub struct Vfs {
    root: Arc<FolderNode>,
    storage: Arc<dyn Storage + Send + Sync>,
    closed: Arc<AtomicBool>,
    readonly: bool,
}

impl Vfs {
    /// Provisions a brand-new, empty root folder under `root_key` and persists it as version 1.
    pub async fn new_root(
        storage: Arc<dyn Storage + Send + Sync>,
        cryptor: Arc<dyn Cryptor>,
        root_key: AccessKey,
    ) -> FsResult<Self> {
        let persistence = Arc::new(NodePersistence::new(cryptor));
        let now_ms = crate::utils::current_time_ms().max(0) as u64;
        let attrs = CommonAttrs::new(now_ms);
        let xattrs = XAttrs::default();
        let empty_table = ChildTable::default();

        let payload = FolderPayload::from_child_table(&empty_table, attrs.ctime);
        let bytes = serde_json::to_vec(&payload).map_err(FsError::parsing_error)?;

        let (header, body) = persistence
            .write_whole(
                &ObjectId::Root,
                &root_key,
                Version::INITIAL,
                attrs,
                xattrs.clone(),
                &bytes,
            )
            .await?;

        let (tx, rx) = bounded::<Vec<u8>>(1);
        tx.send(body).await.ok();
        tx.close();
        storage
            .save_obj(&ObjectId::Root, Version::INITIAL, header, Subscribe::new(rx))
            .await
            .map_err(from_storage_error)?;

        let root_node = Node::new(
            ObjectId::Root,
            None,
            None,
            root_key,
            storage.clone(),
            persistence,
            Version::INITIAL,
            attrs,
            xattrs,
        );

        Ok(Self {
            root: Arc::new(FolderNode::new(root_node, empty_table)),
            storage,
            closed: Arc::new(AtomicBool::new(false)),
            readonly: false,
        })
    }

    /// Opens an existing root folder, decrypting its child table with `root_key`.
    pub async fn open_root(
        storage: Arc<dyn Storage + Send + Sync>,
        cryptor: Arc<dyn Cryptor>,
        root_key: AccessKey,
    ) -> FsResult<Self> {
        let persistence = Arc::new(NodePersistence::new(cryptor));
        let obj = storage
            .get_obj(&ObjectId::Root)
            .await
            .map_err(from_storage_error)?;
        let payload = persistence
            .read_payload(&ObjectId::Root, &root_key, &obj)
            .await?;

        let version = payload.version;
        let attrs = payload.attrs;
        let xattrs = payload.xattrs.clone();
        let folder_payload: FolderPayload =
            serde_json::from_slice(&payload.into_bytes()).map_err(FsError::parsing_error)?;
        let table = folder_payload
            .into_child_table()
            .map_err(|e| FsError::new(FsErrorKind::Io).with_cause(e))?;

        let root_node = Node::new(
            ObjectId::Root,
            None,
            None,
            root_key,
            storage.clone(),
            persistence,
            version,
            attrs,
            xattrs,
        );

        Ok(Self {
            root: Arc::new(FolderNode::new(root_node, table)),
            storage,
            closed: Arc::new(AtomicBool::new(false)),
            readonly: false,
        })
    }

    fn ensure_open(&self, path: &str) -> FsResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FsError::storage_closed().with_path(path));
        }
        Ok(())
    }

    fn ensure_writable(&self, path: &str) -> FsResult<()> {
        self.ensure_open(path)?;
        if self.readonly {
            return Err(FsError::new(FsErrorKind::PermissionDenied).with_path(path));
        }
        Ok(())
    }

    /// Closes the VFS. Every subsequent operation fails with `storage-closed`. Does not close the
    /// underlying `Storage`. A second call is a no-op.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    #[tracing::instrument(skip(self))]
    pub async fn make_folder(&self, path: &str, exclusive: bool) -> FsResult<()> {
        self.ensure_writable(path)?;
        let parts = parse_path(path)?;
        let result = with_path(
            self.root
                .get_folder_in_sub_tree(&parts, true, exclusive)
                .await
                .map(|_| ()),
            path,
        );
        if let Err(err) = &result {
            warn!(%path, ?err, "make_folder failed");
        }
        result
    }

    pub async fn delete_file(&self, path: &str) -> FsResult<()> {
        self.ensure_writable(path)?;
        let parts = parse_path(path)?;
        let (parent_parts, leaf) = with_path(split_leaf(parts), path)?;
        let op = async {
            let parent = self
                .root
                .get_folder_in_sub_tree(&parent_parts, false, false)
                .await?;
            match parent.get_node(&leaf).await? {
                Some(LoadedNode::File(_)) => parent.remove_child(&leaf, false).await,
                Some(_) => Err(FsError::not_file()),
                None => Err(FsError::not_found()),
            }
        };
        with_path(op.await, path)
    }

    pub async fn delete_link(&self, path: &str) -> FsResult<()> {
        self.ensure_writable(path)?;
        let parts = parse_path(path)?;
        let (parent_parts, leaf) = with_path(split_leaf(parts), path)?;
        let op = async {
            let parent = self
                .root
                .get_folder_in_sub_tree(&parent_parts, false, false)
                .await?;
            match parent.get_node(&leaf).await? {
                Some(LoadedNode::Link(_)) => parent.remove_child(&leaf, false).await,
                Some(_) => Err(FsError::not_link()),
                None => Err(FsError::not_found()),
            }
        };
        with_path(op.await, path)
    }

    pub async fn delete_folder(&self, path: &str, remove_content: bool) -> FsResult<()> {
        self.ensure_writable(path)?;
        let parts = parse_path(path)?;
        let (parent_parts, leaf) = with_path(split_leaf(parts), path)?;
        let op = async {
            let parent = self
                .root
                .get_folder_in_sub_tree(&parent_parts, false, false)
                .await?;
            match parent.get_node(&leaf).await? {
                Some(LoadedNode::Folder(_)) => parent.remove_child(&leaf, remove_content).await,
                Some(_) => Err(FsError::not_directory()),
                None => Err(FsError::not_found()),
            }
        };
        with_path(op.await, path)
    }

    /// Maps a failed precondition to the side of the move it belongs to: the source folder not
    /// having `src`'s leaf fails on `src`; the destination already having `dst`'s leaf fails on
    /// `dst`. Any other error (e.g. a bad intermediate path segment) is attributed to `src`.
    #[tracing::instrument(skip(self))]
    pub async fn move_node(&self, src: &str, dst: &str) -> FsResult<()> {
        self.ensure_writable(src)?;
        let src_parts = parse_path(src).map_err(|e| e.retarget_path(src))?;
        let dst_parts = parse_path(dst).map_err(|e| e.retarget_path(dst))?;
        let (src_parent_parts, src_leaf) =
            split_leaf(src_parts).map_err(|e| e.retarget_path(src))?;
        let (dst_parent_parts, dst_leaf) =
            split_leaf(dst_parts).map_err(|e| e.retarget_path(dst))?;

        let src_parent = self
            .root
            .get_folder_in_sub_tree(&src_parent_parts, false, false)
            .await
            .map_err(|e| e.retarget_path(src))?;
        let dst_parent = self
            .root
            .get_folder_in_sub_tree(&dst_parent_parts, false, false)
            .await
            .map_err(|e| e.retarget_path(dst))?;

        let result = src_parent
            .move_child_to(&src_leaf, &dst_parent, dst_leaf)
            .await
            .map_err(|e| match e.kind() {
                FsErrorKind::AlreadyExists => e.retarget_path(dst),
                _ => e.retarget_path(src),
            });
        if let Err(err) = &result {
            warn!(%src, %dst, ?err, "move_node failed");
        } else {
            debug!(%src, %dst, "moved node");
        }
        result
    }

    pub async fn stat(&self, path: &str) -> FsResult<StatInfo> {
        self.ensure_open(path)?;
        let parts = parse_path(path)?;
        let op = async {
            if parts.is_empty() {
                let attrs = self.root.node().attrs().await;
                return Ok(StatInfo {
                    kind: NodeKind::Folder,
                    version: self.root.version().await,
                    attrs,
                });
            }
            let (parent_parts, leaf) = with_path(split_leaf(parts), path)?;
            let parent = self
                .root
                .get_folder_in_sub_tree(&parent_parts, false, false)
                .await?;
            match parent.get_node(&leaf).await?.ok_or_else(FsError::not_found)? {
                LoadedNode::File(file) => Ok(StatInfo {
                    kind: NodeKind::File,
                    version: file.version().await,
                    attrs: file.node().attrs().await,
                }),
                LoadedNode::Folder(folder) => Ok(StatInfo {
                    kind: NodeKind::Folder,
                    version: folder.version().await,
                    attrs: folder.node().attrs().await,
                }),
                LoadedNode::Link(link) => Ok(StatInfo {
                    kind: NodeKind::Link,
                    version: link.version().await,
                    attrs: link.node().attrs().await,
                }),
            }
        };
        with_path(op.await, path)
    }

    pub async fn list_folder(&self, path: &str) -> FsResult<(Vec<FolderEntry>, Version)> {
        self.ensure_open(path)?;
        let parts = parse_path(path)?;
        let op = async {
            let folder = self.root.get_folder_in_sub_tree(&parts, false, false).await?;
            Ok(folder.list().await)
        };
        with_path(op.await, path)
    }

    /// Returns `check_*_presence`-style existence, distinguishing "missing" from every other
    /// error (which still propagates).
    pub async fn check_presence(&self, path: &str) -> FsResult<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == FsErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn read_bytes(
        &self,
        path: &str,
        start: u64,
        end: Option<u64>,
    ) -> FsResult<(Vec<u8>, Version)> {
        self.ensure_open(path)?;
        let parts = parse_path(path)?;
        let (parent_parts, leaf) = with_path(split_leaf(parts), path)?;
        let op = async {
            let parent = self
                .root
                .get_folder_in_sub_tree(&parent_parts, false, false)
                .await?;
            let file = parent
                .get_file(&leaf, true)
                .await?
                .ok_or_else(FsError::not_found)?;
            file.read_bytes(start, end).await
        };
        with_path(op.await, path)
    }

    pub async fn write_bytes(
        &self,
        path: &str,
        bytes: &[u8],
        flags: WriteFlags,
    ) -> FsResult<Version> {
        self.ensure_writable(path)?;
        let parts = parse_path(path)?;
        let (parent_parts, leaf) = with_path(split_leaf(parts), path)?;
        let op = async {
            let parent = self
                .root
                .get_folder_in_sub_tree(&parent_parts, flags.create, false)
                .await?;
            let file = self.open_for_write(&parent, &leaf, flags).await?;
            file.save(bytes.to_vec(), None).await
        };
        let result = with_path(op.await, path);
        if let Err(err) = &result {
            warn!(%path, ?err, "write_bytes failed");
        }
        result
    }

    pub async fn get_byte_sink(
        &self,
        path: &str,
        flags: WriteFlags,
        current_version: Option<Version>,
    ) -> FsResult<(Box<dyn FileByteSink>, Version)> {
        self.ensure_writable(path)?;
        let parts = parse_path(path)?;
        let (parent_parts, leaf) = with_path(split_leaf(parts), path)?;
        let op = async {
            let parent = self
                .root
                .get_folder_in_sub_tree(&parent_parts, flags.create, false)
                .await?;
            let file = self.open_for_write(&parent, &leaf, flags).await?;
            file.write_sink(flags.truncate, current_version, None).await
        };
        let result = with_path(op.await, path);
        if let Err(err) = &result {
            warn!(%path, ?err, "get_byte_sink failed");
        }
        result
    }

    async fn open_for_write(
        &self,
        parent: &Arc<FolderNode>,
        leaf: &NodeName,
        flags: WriteFlags,
    ) -> FsResult<Arc<super::file_node::FileNode>> {
        match parent.get_file(leaf, true).await? {
            Some(file) => {
                if flags.create && flags.exclusive {
                    Err(FsError::already_exists())
                } else {
                    Ok(file)
                }
            }
            None => {
                if !flags.create {
                    Err(FsError::not_found())
                } else {
                    parent.create_file(leaf.clone()).await
                }
            }
        }
    }

    pub async fn read_text(&self, path: &str) -> FsResult<(String, Version)> {
        let (bytes, version) = self.read_bytes(path, 0, None).await?;
        let text = String::from_utf8(bytes)
            .map_err(FsError::parsing_error)
            .map_err(|e| e.with_path(path))?;
        Ok((text, version))
    }

    pub async fn write_text(&self, path: &str, text: &str, flags: WriteFlags) -> FsResult<Version> {
        self.write_bytes(path, text.as_bytes(), flags).await
    }

    pub async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> FsResult<(T, Version)> {
        let (bytes, version) = self.read_bytes(path, 0, None).await?;
        let value = serde_json::from_slice(&bytes)
            .map_err(FsError::parsing_error)
            .map_err(|e| e.with_path(path))?;
        Ok((value, version))
    }

    pub async fn write_json<T: serde::Serialize>(
        &self,
        path: &str,
        value: &T,
        flags: WriteFlags,
    ) -> FsResult<Version> {
        let bytes = serde_json::to_vec(value)
            .map_err(FsError::parsing_error)
            .map_err(|e| e.with_path(path))?;
        self.write_bytes(path, &bytes, flags).await
    }

    pub async fn copy_file(&self, src: &str, dst: &str, flags: WriteFlags) -> FsResult<Version> {
        self.ensure_writable(dst)?;
        let (bytes, _version) = self
            .read_bytes(src, 0, None)
            .await
            .map_err(|e| e.retarget_path(src))?;
        self.write_bytes(dst, &bytes, flags)
            .await
            .map_err(|e| e.retarget_path(dst))
    }

    #[tracing::instrument(skip(self))]
    pub async fn copy_folder(
        &self,
        src: &str,
        dst: &str,
        merge_and_overwrite: bool,
    ) -> FsResult<()> {
        self.ensure_writable(dst)?;
        let src_parts = parse_path(src).map_err(|e| e.retarget_path(src))?;
        let dst_parts = parse_path(dst).map_err(|e| e.retarget_path(dst))?;
        let src_folder = self
            .root
            .get_folder_in_sub_tree(&src_parts, false, false)
            .await
            .map_err(|e| e.retarget_path(src))?;
        let dst_folder = self
            .root
            .get_folder_in_sub_tree(&dst_parts, true, false)
            .await
            .map_err(|e| e.retarget_path(dst))?;
        let result = copy_folder_contents(&src_folder, &dst_folder, merge_and_overwrite)
            .await
            .map_err(|e| e.retarget_path(dst));
        if let Err(err) = &result {
            warn!(%src, %dst, ?err, "copy_folder failed");
        }
        result
    }

    /// Imports a single file from another VFS (possibly a different storage/cryptor pairing).
    pub async fn save_file(
        &self,
        path: &str,
        other: &Vfs,
        other_path: &str,
        flags: WriteFlags,
    ) -> FsResult<Version> {
        self.ensure_writable(path)?;
        let (bytes, _version) = other
            .read_bytes(other_path, 0, None)
            .await
            .map_err(|e| e.retarget_path(other_path))?;
        self.write_bytes(path, &bytes, flags)
            .await
            .map_err(|e| e.retarget_path(path))
    }

    /// Imports a whole folder tree from another VFS.
    pub async fn save_folder(
        &self,
        path: &str,
        other: &Vfs,
        other_path: &str,
        merge_and_overwrite: bool,
    ) -> FsResult<()> {
        self.ensure_writable(path)?;
        let dst_parts = parse_path(path).map_err(|e| e.retarget_path(path))?;
        let dst_folder = self
            .root
            .get_folder_in_sub_tree(&dst_parts, true, false)
            .await
            .map_err(|e| e.retarget_path(path))?;
        let src_parts = parse_path(other_path).map_err(|e| e.retarget_path(other_path))?;
        let src_folder = other
            .root
            .get_folder_in_sub_tree(&src_parts, false, false)
            .await
            .map_err(|e| e.retarget_path(other_path))?;
        copy_folder_contents(&src_folder, &dst_folder, merge_and_overwrite)
            .await
            .map_err(|e| e.retarget_path(path))
    }

    pub async fn link(&self, path: &str, target: LinkParameters) -> FsResult<()> {
        self.ensure_writable(path)?;
        let parts = parse_path(path)?;
        let (parent_parts, leaf) = with_path(split_leaf(parts), path)?;
        let op = async {
            let parent = self
                .root
                .get_folder_in_sub_tree(&parent_parts, true, false)
                .await?;
            parent.create_link(leaf, target).await.map(|_| ())
        };
        with_path(op.await, path)
    }

    pub async fn read_link(&self, path: &str) -> FsResult<LinkParameters> {
        self.ensure_open(path)?;
        let parts = parse_path(path)?;
        let (parent_parts, leaf) = with_path(split_leaf(parts), path)?;
        let op = async {
            let parent = self
                .root
                .get_folder_in_sub_tree(&parent_parts, false, false)
                .await?;
            let link = parent.get_link(&leaf).await?;
            link.read_params().await
        };
        with_path(op.await, path)
    }

    pub async fn get_link_params(&self, path: &str) -> FsResult<FileLinkParams> {
        self.ensure_open(path)?;
        let parts = parse_path(path)?;
        let (parent_parts, leaf) = with_path(split_leaf(parts), path)?;
        let op = async {
            let parent = self
                .root
                .get_folder_in_sub_tree(&parent_parts, false, false)
                .await?;
            let file = parent
                .get_file(&leaf, true)
                .await?
                .ok_or_else(FsError::not_found)?;
            file.get_link_params().await
        };
        with_path(op.await, path)
    }

    /// A read-only view onto the subtree at `path`: every mutating operation fails with
    /// `permission-denied`, but reads can decrypt every descendant using only the keys reachable
    /// from the sub-root's own folder payload — no key beyond it is ever needed.
    pub async fn readonly_sub_root(&self, path: &str) -> FsResult<Vfs> {
        self.ensure_open(path)?;
        let parts = parse_path(path)?;
        let folder = with_path(
            self.root.get_folder_in_sub_tree(&parts, false, false).await,
            path,
        )?;
        Ok(Vfs {
            root: folder,
            storage: self.storage.clone(),
            closed: self.closed.clone(),
            readonly: true,
        })
    }

    pub async fn writable_sub_root(&self, path: &str, flags: WriteFlags) -> FsResult<Vfs> {
        self.ensure_writable(path)?;
        let parts = parse_path(path)?;
        let folder = with_path(
            self.root
                .get_folder_in_sub_tree(&parts, flags.create, flags.exclusive)
                .await,
            path,
        )?;
        Ok(Vfs {
            root: folder,
            storage: self.storage.clone(),
            closed: self.closed.clone(),
            readonly: false,
        })
    }

    pub async fn watch_file(&self, path: &str) -> FsResult<Watch> {
        self.ensure_open(path)?;
        let parts = parse_path(path)?;
        let (parent_parts, leaf) = with_path(split_leaf(parts), path)?;
        let op = async {
            let parent = self
                .root
                .get_folder_in_sub_tree(&parent_parts, false, false)
                .await?;
            let file = parent
                .get_file(&leaf, true)
                .await?
                .ok_or_else(FsError::not_found)?;
            Ok(file.obj_id().clone())
        };
        let watched_id: ObjectId = with_path(op.await, path)?;
        let relative_path = leaf_display(path);

        Ok(self.spawn_watch(move |event| {
            if event.obj_id != watched_id {
                return None;
            }
            match event.kind {
                NodeEventKind::Changed { .. } | NodeEventKind::Removed => Some(PathEvent {
                    path: relative_path.clone(),
                    kind: event.kind,
                }),
                _ => None,
            }
        }))
    }

    pub async fn watch_folder(&self, path: &str) -> FsResult<Watch> {
        self.ensure_open(path)?;
        let parts = parse_path(path)?;
        let folder = with_path(
            self.root.get_folder_in_sub_tree(&parts, false, false).await,
            path,
        )?;
        let watched_id = folder.obj_id().clone();

        Ok(self.spawn_watch(move |event| {
            if event.obj_id != watched_id {
                return None;
            }
            match event.kind {
                NodeEventKind::Changed { .. } => None,
                _ => Some(PathEvent {
                    path: String::new(),
                    kind: event.kind,
                }),
            }
        }))
    }

    /// Subscribes to every event under `path`'s subtree, with paths reported relative to it
    /// (`"."` for the sub-root itself). Seeds the router with a depth-first walk under the
    /// current snapshot, then forwards the store's live event stream through it.
    pub async fn watch_tree(&self, path: &str) -> FsResult<Watch> {
        self.ensure_open(path)?;
        let parts = parse_path(path)?;
        let folder = with_path(
            self.root.get_folder_in_sub_tree(&parts, false, false).await,
            path,
        )?;

        let mut router = EventRouter::new(folder.obj_id().clone());
        seed_event_router(&folder, ".", &mut router).await?;

        let (tx, rx) = unbounded::<PathEvent>();
        let detached = Arc::new(AtomicBool::new(false));
        let detach_flag = detached.clone();
        let mut store_events = self.storage.get_node_events();
        let closed = self.closed.clone();

        async_std::task::spawn(async move {
            while !detach_flag.load(Ordering::SeqCst) && !closed.load(Ordering::SeqCst) {
                match store_events.recv().await {
                    Ok(event) => {
                        if let Some(path_event) = router.route(event) {
                            if tx.send(path_event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Watch {
            receiver: rx,
            detached,
        })
    }

    fn spawn_watch(
        &self,
        mut filter: impl FnMut(crate::store::NodeEvent) -> Option<PathEvent> + Send + 'static,
    ) -> Watch {
        let (tx, rx) = unbounded::<PathEvent>();
        let detached = Arc::new(AtomicBool::new(false));
        let detach_flag = detached.clone();
        let mut store_events = self.storage.get_node_events();
        let closed = self.closed.clone();

        async_std::task::spawn(async move {
            while !detach_flag.load(Ordering::SeqCst) && !closed.load(Ordering::SeqCst) {
                match store_events.recv().await {
                    Ok(event) => {
                        if let Some(path_event) = filter(event) {
                            if tx.send(path_event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Watch { receiver: rx, detached }
    }
}

fn leaf_display(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

#[async_recursion]
async fn seed_event_router(
    folder: &Arc<FolderNode>,
    prefix: &str,
    router: &mut EventRouter,
) -> FsResult<()> {
    let (entries, _) = folder.list().await;
    for entry in entries {
        let child_path = if prefix == "." {
            entry.name.as_str().to_string()
        } else {
            format!("{prefix}/{}", entry.name.as_str())
        };

        if let Some(loaded) = folder.get_node(&entry.name).await? {
            match loaded {
                LoadedNode::Folder(sub) => {
                    router.insert(sub.obj_id().clone(), child_path.clone());
                    seed_event_router(&sub, &child_path, router).await?;
                }
                LoadedNode::File(file) => {
                    router.insert(file.obj_id().clone(), child_path);
                }
                LoadedNode::Link(link) => {
                    router.insert(link.obj_id().clone(), child_path);
                }
            }
        }
    }
    Ok(())
}

#[async_recursion]
async fn copy_folder_contents(
    src: &Arc<FolderNode>,
    dst: &Arc<FolderNode>,
    merge_and_overwrite: bool,
) -> FsResult<()> {
    let (entries, _) = src.list().await;
    for entry in entries {
        // `list()` and `get_node()` are two independent unlocked reads; a concurrent removal of
        // this same entry between them is a legitimate race, not a bug — skip it rather than
        // failing the whole copy.
        let Some(loaded) = src.get_node(&entry.name).await? else {
            continue;
        };

        match loaded {
            LoadedNode::File(file) => {
                let existing = dst.get_file(&entry.name, true).await?;
                if existing.is_some() && !merge_and_overwrite {
                    return Err(FsError::already_exists());
                }
                let target = match existing {
                    Some(f) => f,
                    None => dst.create_file(entry.name.clone()).await?,
                };
                let source = file.read_src().await?;
                target.save(source.bytes().to_vec(), None).await?;
            }
            LoadedNode::Folder(folder) => {
                let target = match dst.get_folder(&entry.name).await {
                    Ok(existing) => existing,
                    Err(_) => dst.create_folder(entry.name.clone()).await?,
                };
                copy_folder_contents(&folder, &target, merge_and_overwrite).await?;
            }
            LoadedNode::Link(link) => {
                let exists = dst.get_node(&entry.name).await?.is_some();
                if exists && !merge_and_overwrite {
                    return Err(FsError::already_exists());
                }
                if !exists {
                    let params = link.read_params().await?;
                    dst.create_link(entry.name.clone(), params).await?;
                }
            }
        }
    }
    Ok(())
}

fn parse_path(path: &str) -> FsResult<Vec<NodeName>> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            NodeName::try_from(segment)
                .map_err(|e| FsError::bad_argument().with_path(path).with_cause(e))
        })
        .collect()
}

fn split_leaf(mut parts: Vec<NodeName>) -> FsResult<(Vec<NodeName>, NodeName)> {
    let leaf = parts.pop().ok_or_else(FsError::bad_argument)?;
    Ok((parts, leaf))
}

fn with_path<T>(result: FsResult<T>, path: &str) -> FsResult<T> {
    result.map_err(|e| {
        if e.path().is_some() {
            e
        } else {
            e.with_path(path)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ChaChaCryptor;
    use crate::store::MemoryStorage;

    async fn fresh_vfs() -> Vfs {
        let storage = Arc::new(MemoryStorage::new(crate::codec::StorageType::Local));
        let cryptor: Arc<dyn Cryptor> = Arc::new(ChaChaCryptor::default());
        Vfs::new_root(storage, cryptor, AccessKey::generate())
            .await
            .unwrap()
    }

    #[async_std::test]
    async fn s1_create_read_text() {
        let vfs = fresh_vfs().await;
        vfs.write_text("/a/b.txt", "hello", WriteFlags::create())
            .await
            .unwrap();

        let (entries, _) = vfs.list_folder("/a").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name.as_str(), "b.txt");
        assert!(entries[0].kind.is_file());

        let (text, _) = vfs.read_text("/a/b.txt").await.unwrap();
        assert_eq!(text, "hello");
    }

    #[async_std::test]
    async fn s2_exclusive_collision() {
        let vfs = fresh_vfs().await;
        vfs.write_text("/a/b.txt", "hello", WriteFlags::create())
            .await
            .unwrap();

        let err = vfs
            .write_text("/a/b.txt", "x", WriteFlags::create_exclusive())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::AlreadyExists);
        assert_eq!(err.path(), Some("/a/b.txt"));

        let (text, _) = vfs.read_text("/a/b.txt").await.unwrap();
        assert_eq!(text, "hello");
    }

    #[async_std::test]
    async fn s3_non_empty_folder_delete() {
        let vfs = fresh_vfs().await;
        vfs.make_folder("/d", false).await.unwrap();
        vfs.write_text("/d/f", "1", WriteFlags::create()).await.unwrap();

        let err = vfs.delete_folder("/d", false).await.unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::NotEmpty);

        vfs.delete_folder("/d", true).await.unwrap();
        assert!(!vfs.check_presence("/d").await.unwrap());
    }

    #[async_std::test]
    async fn s4_cross_folder_move() {
        let vfs = fresh_vfs().await;
        vfs.make_folder("/x", false).await.unwrap();
        vfs.make_folder("/y", false).await.unwrap();
        vfs.write_text("/x/f", "v1", WriteFlags::create()).await.unwrap();

        vfs.move_node("/x/f", "/y/g").await.unwrap();

        let (text, _) = vfs.read_text("/y/g").await.unwrap();
        assert_eq!(text, "v1");
        assert!(!vfs.check_presence("/x/f").await.unwrap());
    }

    #[async_std::test]
    async fn s6_version_mismatch_on_streaming_write() {
        let vfs = fresh_vfs().await;
        let v = vfs
            .write_text("/a", "v1", WriteFlags::create())
            .await
            .unwrap();

        let stale = match v {
            Version::Known(n) => Version::Known(n - 1),
            Version::Unknown => panic!("write must report a known version"),
        };

        let err = vfs
            .get_byte_sink(
                "/a",
                WriteFlags {
                    create: false,
                    exclusive: false,
                    truncate: false,
                },
                Some(stale),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::VersionMismatch);
    }

    #[async_std::test]
    async fn property_subtree_key_containment() {
        let vfs = fresh_vfs().await;
        vfs.make_folder("/shared", false).await.unwrap();
        vfs.write_text("/shared/a.txt", "hello", WriteFlags::create())
            .await
            .unwrap();
        vfs.make_folder("/shared/inner", false).await.unwrap();
        vfs.write_text("/shared/inner/b.txt", "world", WriteFlags::create())
            .await
            .unwrap();

        let sub = vfs.readonly_sub_root("/shared").await.unwrap();
        let (a, _) = sub.read_text("a.txt").await.unwrap();
        let (b, _) = sub.read_text("inner/b.txt").await.unwrap();
        assert_eq!(a, "hello");
        assert_eq!(b, "world");

        let err = sub
            .write_text("a.txt", "nope", WriteFlags::create())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::PermissionDenied);
    }

    #[async_std::test]
    async fn property_close_idempotence() {
        let vfs = fresh_vfs().await;
        vfs.write_text("/a", "v1", WriteFlags::create()).await.unwrap();
        vfs.close();
        vfs.close();

        let err = vfs.read_text("/a").await.unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::StorageClosed);
        assert_eq!(err.path(), Some("/a"));
    }
}
