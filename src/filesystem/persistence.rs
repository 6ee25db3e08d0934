//! Component A: binds a node's payload to storage bytes via the node's key, a header nonce
//! derived from its [`ObjectId`], and an injected [`Cryptor`].

use std::sync::Arc;

use async_std::channel::Sender;
use serde::{Deserialize, Serialize};

use crate::codec::{CommonAttrs, ObjectId, Version, XAttrs};
use crate::crypto::{self, AccessKey, ByteSource, Cryptor, FileByteSink, HeaderNonce, Subscribe};
use crate::error::{FsError, FsResult};
use crate::store::ObjSource;

/// The decoded, authenticated contents of a node's object: attributes plus a lazy handle onto
/// the (already-decrypted) content bytes.
pub struct Payload {
    pub version: Version,
    pub attrs: CommonAttrs,
    pub xattrs: XAttrs,
    content: Vec<u8>,
}

impl Payload {
    pub fn read_content(&self, start: u64, end: u64) -> Vec<u8> {
        let len = self.content.len() as u64;
        let start = start.min(len);
        let end = end.min(len).max(start);
        self.content[start as usize..end as usize].to_vec()
    }

    pub fn content_len(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn file_byte_source(&self) -> impl ByteSource + '_ {
        InMemoryByteSource {
            bytes: &self.content,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.content
    }
}

struct InMemoryByteSource<'a> {
    bytes: &'a [u8],
}

#[async_trait::async_trait]
impl<'a> ByteSource for InMemoryByteSource<'a> {
    async fn read_content(&self, start: u64, end: u64) -> Result<Vec<u8>, crypto::CryptoError> {
        let len = self.bytes.len() as u64;
        let start = start.min(len);
        let end = end.min(len).max(start);
        Ok(self.bytes[start as usize..end as usize].to_vec())
    }

    async fn size(&self) -> Result<u64, crypto::CryptoError> {
        Ok(self.bytes.len() as u64)
    }
}

/// The cleartext header encoded alongside every object: everything needed to reconstruct a
/// `Payload` except the content bytes themselves, which live in the (encrypted) body.
#[derive(Clone, Serialize, Deserialize)]
struct Header {
    version: Version,
    attrs: CommonAttrs,
    xattrs: XAttrs,
}

pub struct NodePersistence {
    cryptor: Arc<dyn Cryptor + Send + Sync>,
}

impl NodePersistence {
    pub fn new(cryptor: Arc<dyn Cryptor + Send + Sync>) -> Self {
        Self { cryptor }
    }

    fn header_nonce(obj_id: &ObjectId) -> HeaderNonce {
        HeaderNonce::derive(obj_id)
    }

    pub async fn read_payload(
        &self,
        obj_id: &ObjectId,
        key: &AccessKey,
        source: &ObjSource,
    ) -> FsResult<Payload> {
        let header: Header =
            serde_json::from_slice(source.read_header()).map_err(FsError::parsing_error)?;

        let nonce = Self::header_nonce(obj_id);
        let content = self
            .cryptor
            .make_decrypted_byte_source(key, &nonce, source.seg_src())
            .await
            .map_err(|e| FsError::new(crate::error::FsErrorKind::Io).with_cause(e))?;

        Ok(Payload {
            version: header.version,
            attrs: header.attrs,
            xattrs: header.xattrs,
            content,
        })
    }

    /// Encodes a complete in-memory payload, returning `(header_bytes, encrypted_body)` ready to
    /// hand to [`crate::store::Storage::save_obj`].
    pub async fn write_whole(
        &self,
        obj_id: &ObjectId,
        key: &AccessKey,
        version: Version,
        attrs: CommonAttrs,
        xattrs: XAttrs,
        bytes: &[u8],
    ) -> FsResult<(Vec<u8>, Vec<u8>)> {
        let nonce = Self::header_nonce(obj_id);
        let body = self
            .cryptor
            .make_encrypting_obj_source(key, &nonce, bytes)
            .await
            .map_err(|e| FsError::new(crate::error::FsErrorKind::Io).with_cause(e))?;

        let header = Header {
            version,
            attrs,
            xattrs,
        };
        let header_bytes = serde_json::to_vec(&header).map_err(FsError::parsing_error)?;

        Ok((header_bytes, body))
    }

    /// Opens a streaming sink for a new version of `obj_id`. `base` is ignored by the reference
    /// cryptor (whole-object re-encryption), but is accepted here so storage types that support
    /// true delta writes have a place to plug in.
    ///
    /// Returns the sink/subscribe pair, the encrypting driver to spawn, and `commit_tx`: the
    /// caller must send the combined `Storage::save_obj` + driver outcome into it once both are
    /// known, since that alone is what the sink's `done()` reports back to the application.
    pub fn write_sink(
        &self,
        obj_id: &ObjectId,
        key: &AccessKey,
        _base: Option<&ObjSource>,
    ) -> (
        Box<dyn FileByteSink>,
        Subscribe,
        impl std::future::Future<Output = Option<u64>> + Send + 'static,
        Sender<Option<u64>>,
    ) {
        let nonce = Self::header_nonce(obj_id);
        let (sink, subscribe, driver, commit_tx) =
            crypto::encrypting_pipe(self.cryptor.clone(), key.clone(), nonce);
        (Box::new(sink), subscribe, driver, commit_tx)
    }

    pub fn encode_header(version: Version, attrs: CommonAttrs, xattrs: XAttrs) -> FsResult<Vec<u8>> {
        serde_json::to_vec(&Header {
            version,
            attrs,
            xattrs,
        })
        .map_err(FsError::parsing_error)
    }
}
