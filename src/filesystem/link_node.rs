//! SymLink node: stores serialized [`LinkParameters`] as its one-shot payload.

use async_std::channel::bounded;

use crate::codec::{LinkParameters, ObjectId, Version};
use crate::error::{from_storage_error, FsError, FsResult};

use super::node::Node;

pub struct LinkNode {
    node: Node,
}

impl LinkNode {
    pub(crate) fn new(node: Node) -> Self {
        Self { node }
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

    /// Decrypts and parses this link's target parameters.
    pub async fn read_params(&self) -> FsResult<LinkParameters> {
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

        serde_json::from_slice(&payload.into_bytes()).map_err(FsError::parsing_error)
    }

    /// Writes this link's parameters. Only ever called once, at creation time, by
    /// `FolderNode::create_link` while it holds the parent's change lock.
    pub(crate) async fn write_params(&self, params: &LinkParameters) -> FsResult<Version> {
        let current = self.node.snapshot().await;
        let (new_version, attrs, xattrs) = self.node.get_params_for_update(&current, None);
        let bytes = serde_json::to_vec(params).map_err(FsError::parsing_error)?;

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
            .map_err(from_storage_error)?;

        self.node.set_updated(new_version, attrs, xattrs).await;
        Ok(new_version)
    }
}
