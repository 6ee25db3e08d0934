//! Component D: versioned byte content, streaming read/write, size bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_std::channel::bounded;

use crate::codec::{ObjectId, StorageType, Version, XAttrsChange};
use crate::crypto::FileByteSink;
use crate::error::{from_storage_error, FsError, FsErrorKind, FsResult};
use crate::store::NodeEventKind;
use tracing::{debug, warn};

use super::node::Node;

/// A lazily-decrypted view over a file's bytes at the version observed when it was produced.
pub struct FileByteSource {
    version: Version,
    bytes: Vec<u8>,
}

impl FileByteSource {
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

pub struct FileNode {
    node: Node,
    size: AtomicU64,
}

impl FileNode {
    pub(crate) fn new(node: Node, size: u64) -> Self {
        Self {
            node,
            size: AtomicU64::new(size),
        }
    }

    pub(crate) fn node(&self) -> &Node {
        &self.node
    }

    pub fn obj_id(&self) -> &ObjectId {
        self.node.obj_id()
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::SeqCst)
    }

    pub async fn version(&self) -> Version {
        self.node.version().await
    }

    /// Returns a lazy byte source and the version it was read at. If the store reports a newer
    /// version than the node's cached one, the node's cached attrs/size are refreshed first.
    pub async fn read_src(&self) -> FsResult<FileByteSource> {
        let obj = self
            .node
            .storage()
            .get_obj(self.node.obj_id())
            .await
            .map_err(from_storage_error)?;

        let payload = self
            .node
            .persistence()
            .read_payload(self.node.obj_id(), self.node.key(), &obj)
            .await?;

        if let Some(std::cmp::Ordering::Greater) =
            payload.version.checked_cmp(&self.node.version().await)
        {
            self.node
                .set_updated(payload.version, payload.attrs, payload.xattrs.clone())
                .await;
            self.size.store(payload.content_len(), Ordering::SeqCst);
        }

        Ok(FileByteSource {
            version: payload.version,
            bytes: payload.into_bytes(),
        })
    }

    /// Returns the subrange `[start, min(end, size))`. `start >= size` yields empty bytes rather
    /// than an error, and still returns the current version.
    pub async fn read_bytes(&self, start: u64, end: Option<u64>) -> FsResult<(Vec<u8>, Version)> {
        let src = self.read_src().await?;
        let size = src.bytes().len() as u64;
        let end = end.unwrap_or(size).min(size).max(start.min(size));
        if start >= size {
            return Ok((Vec::new(), src.version()));
        }
        Ok((
            src.bytes()[start as usize..end as usize].to_vec(),
            src.version(),
        ))
    }

    /// One-shot write of a complete payload. Bumps the version, rewrites size, emits the file's
    /// change event.
    pub async fn save(
        &self,
        bytes: Vec<u8>,
        xattr_change: Option<XAttrsChange>,
    ) -> FsResult<Version> {
        let _guard = self.node.change_lock().await;

        let current = self.node.snapshot().await;
        let (new_version, attrs, xattrs) = self.node.get_params_for_update(&current, xattr_change);

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
        let subscribe = crate::crypto::Subscribe::new(rx);

        self.node
            .storage()
            .save_obj(self.node.obj_id(), new_version, header, subscribe)
            .await
            .map_err(|e| {
                let err = from_storage_error(e);
                warn!(obj_id = ?self.node.obj_id(), ?new_version, ?err, "save failed");
                err
            })?;

        self.node.set_updated(new_version, attrs, xattrs).await;
        self.size.store(bytes.len() as u64, Ordering::SeqCst);
        self.node
            .publish_event(NodeEventKind::Changed { new_version })
            .await;

        debug!(obj_id = ?self.node.obj_id(), ?new_version, size = bytes.len(), "saved file");
        Ok(new_version)
    }

    /// Streaming write. Returns a sink and the new version synchronously: the version is
    /// assigned before any byte is written.
    ///
    /// Protocol (mirrors the component design exactly):
    /// 1. Validate `current_version` under the change lock; mismatch fails immediately.
    /// 2. Compute the new version/attrs/xattrs. If not truncating, fetch the current object as
    ///    a delta base.
    /// 3. Obtain `(sink, subscribe, driver, commit_tx)` from `NodePersistence`.
    /// 4. Spawn a detached save task holding the change lock: drive the encrypting pipe, forward
    ///    `subscribe` to `Storage::save_obj`, and commit this node's new state only if both the
    ///    save and the driver's own resolved size agree the write succeeded. Either way, send the
    ///    combined verdict into `commit_tx`.
    /// 5. The sink's `done(err)` blocks on that same verdict: `Some(size)` only once the save has
    ///    actually landed, `None` if `err` was supplied, encryption failed, or `Storage::save_obj`
    ///    itself returned an error (e.g. a version conflict from a concurrent writer) — in every
    ///    `None` case the save is abandoned from the caller's point of view even though the bytes
    ///    may already be sitting in the store under the node's new version.
    ///
    /// The change lock is held by the save task for the whole interval, so no concurrent writer
    /// can race it; it's only released once the save has committed or been abandoned.
    ///
    /// Takes `self` behind an `Arc` because the detached save task must outlive this call and
    /// needs its own handle on the node to commit the new state once the save has landed.
    pub async fn write_sink(
        self: &Arc<Self>,
        truncate: bool,
        current_version: Option<Version>,
        xattr_change: Option<XAttrsChange>,
    ) -> FsResult<(Box<dyn FileByteSink>, Version)> {
        let guard = self.node.change_lock().await;

        let current = match self.node.check_version(current_version).await {
            Ok(state) => state,
            Err(err) => {
                drop(guard);
                return Err(err);
            }
        };

        let (new_version, attrs, xattrs) = self.node.get_params_for_update(&current, xattr_change);

        let base = if truncate {
            None
        } else {
            self.node.storage().get_obj(self.node.obj_id()).await.ok()
        };

        let (sink, subscribe, driver, commit_tx) =
            self.node
                .persistence()
                .write_sink(self.node.obj_id(), self.node.key(), base.as_ref());

        let header =
            super::persistence::NodePersistence::encode_header(new_version, attrs, xattrs.clone())?;

        let obj_id = self.node.obj_id().clone();
        let storage = self.node.storage().clone();
        let this = Arc::clone(self);

        async_std::task::spawn(async move {
            let _guard = guard;

            let drive_handle = async_std::task::spawn(driver);
            let saved = storage.save_obj(&obj_id, new_version, header, subscribe).await;
            let final_size = drive_handle.await;

            if let Err(err) = &saved {
                warn!(?obj_id, ?new_version, ?err, "streaming save_obj failed");
            }

            // `done()` must only report success once the save itself landed — a storage-layer
            // failure (e.g. a version conflict from a concurrent writer) has to surface as `None`
            // even though every segment encrypted cleanly.
            let commit = if saved.is_ok() { final_size } else { None };

            if let Some(size) = commit {
                this.node.set_updated(new_version, attrs, xattrs).await;
                this.size.store(size, Ordering::SeqCst);
                this.node
                    .publish_event(NodeEventKind::Changed { new_version })
                    .await;
                debug!(?obj_id, ?new_version, size, "streaming write committed");
            }

            let _ = commit_tx.send(commit).await;
        });

        Ok((sink, new_version))
    }

    /// Fails when this node's storage type isn't `local` or `synced` (a share already has link
    /// parameters materialized for it by whoever shared it).
    pub async fn get_link_params(&self) -> FsResult<crate::codec::FileLinkParams> {
        let storage_type = self.node.storage().storage_type();
        if !matches!(storage_type, StorageType::Local | StorageType::Synced) {
            return Err(FsError::new(FsErrorKind::PermissionDenied));
        }

        let name = self
            .node
            .name()
            .map(|n| n.as_str().to_string())
            .unwrap_or_default();

        Ok(crate::codec::FileLinkParams {
            file_name: name,
            obj_id: self.node.obj_id().clone(),
            f_key: self.node.key().clone(),
        })
    }
}
