//! The segmented-box encryption primitive consumed by [`crate::filesystem::NodePersistence`],
//! abstracted behind the [`Cryptor`] port so the filesystem core never hard-codes a cipher.
//!
//! A node's payload is split into fixed-size segments, each sealed under a nonce derived from
//! the node's [`HeaderNonce`] and the segment's index, so segments can be encrypted/decrypted
//! independently and a delta write only has to touch the segments that changed.

mod access_key;
mod chacha_cryptor;
mod header_nonce;
mod sink;

pub use access_key::AccessKey;
pub use chacha_cryptor::ChaChaCryptor;
pub use header_nonce::HeaderNonce;
pub use sink::{ByteSource, FileByteSink, Subscribe};
pub(crate) use sink::encrypting_pipe;

use async_trait::async_trait;

/// Plaintext bytes per segment before encryption overhead. Chosen to keep individual encrypted
/// chunks small enough to stream comfortably without fragmenting every write into thousands of
/// segments.
pub const SEGMENT_SIZE: usize = 16 * 1024;

#[async_trait]
pub trait Cryptor: Send + Sync {
    /// Encrypts an entire in-memory payload as a sequence of segments, returning the full
    /// encrypted object body. Used by [`crate::filesystem::NodePersistence::write_whole`].
    async fn make_encrypting_obj_source(
        &self,
        key: &AccessKey,
        header_nonce: &HeaderNonce,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Decrypts a full encrypted object body back into plaintext.
    async fn make_decrypted_byte_source(
        &self,
        key: &AccessKey,
        header_nonce: &HeaderNonce,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Encrypts a single segment of a streaming write. `segment_index` must be supplied in
    /// increasing order for a given `(key, header_nonce)`; the cryptor derives a per-segment
    /// nonce from it so segments never reuse a nonce.
    async fn make_segments_writer(
        &self,
        key: &AccessKey,
        header_nonce: &HeaderNonce,
        segment_index: u64,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Decrypts a single segment produced by [`Cryptor::make_segments_writer`].
    async fn make_segments_reader(
        &self,
        key: &AccessKey,
        header_nonce: &HeaderNonce,
        segment_index: u64,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CryptoError {
    #[error("expected a {expected}-byte key, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("authentication failed while decrypting a segment")]
    AuthenticationFailed,

    #[error("encrypted object body is malformed or truncated")]
    MalformedCiphertext,
}
