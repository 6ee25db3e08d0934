use async_std::channel::{bounded, Receiver, RecvError, Sender};
use async_trait::async_trait;

use super::CryptoError;

/// Lazy, random-access view over a decrypted object's bytes, returned by
/// [`crate::filesystem::NodePersistence::read_payload`].
#[async_trait]
pub trait ByteSource: Send + Sync {
    async fn read_content(&self, start: u64, end: u64) -> Result<Vec<u8>, CryptoError>;

    async fn size(&self) -> Result<u64, CryptoError>;
}

/// Caller-facing handle for a streaming write: the application pushes plaintext chunks in, then
/// calls [`FileByteSink::done`] to learn the final size once the underlying save has committed
/// (or to report a mid-stream error and have the save cancelled).
///
/// See the streaming-write protocol on [`crate::filesystem::FileNode::write_sink`] for how this
/// is wired to a [`Subscribe`] on the other end.
#[async_trait]
pub trait FileByteSink: Send + Sync {
    async fn write(&self, chunk: Vec<u8>) -> Result<(), CryptoError>;

    /// Signals the end of the write. `err` is `None` on success. Resolves to the final byte
    /// count on success; `None` if `err` was supplied or the encrypting pipe itself failed, in
    /// which case the save is cancelled rather than committed.
    async fn done(&self, err: Option<CryptoError>) -> Option<u64>;
}

/// A writer-push handle surfacing encrypted object bytes chunk-by-chunk, consumed by the save
/// task that hands them to [`crate::store::Storage::save_obj`].
pub struct Subscribe {
    receiver: Receiver<Vec<u8>>,
}

impl Subscribe {
    /// Wraps a raw chunk receiver directly. Mainly useful for `Storage` implementations' own
    /// tests; real sinks come from [`crate::filesystem::NodePersistence`]'s write path.
    pub fn new(receiver: Receiver<Vec<u8>>) -> Self {
        Self { receiver }
    }

    pub async fn next_chunk(&self) -> Option<Vec<u8>> {
        self.receiver.recv().await.ok()
    }
}

enum SinkMessage {
    Chunk(Vec<u8>),
    Done(Option<CryptoError>),
}

/// Channel-backed [`FileByteSink`] that encrypts each plaintext chunk into a segment as it
/// arrives and forwards the encrypted bytes to a paired [`Subscribe`].
///
/// `done()` does not resolve from the encrypting driver alone: it blocks on `commit_rx`, which
/// the caller driving the paired [`Subscribe`] into `Storage::save_obj` feeds only once that save
/// has actually landed. That keeps `done()`'s `Some(size)`/`None` answer tied to the real commit
/// outcome rather than to encryption success alone — a storage-layer failure (e.g. a version
/// conflict) must make `done()` report `None` even though every segment encrypted cleanly.
pub struct ChannelFileByteSink {
    plaintext_tx: Sender<SinkMessage>,
    commit_rx: Receiver<Option<u64>>,
}

#[async_trait]
impl FileByteSink for ChannelFileByteSink {
    async fn write(&self, chunk: Vec<u8>) -> Result<(), CryptoError> {
        self.plaintext_tx
            .send(SinkMessage::Chunk(chunk))
            .await
            .map_err(|_| CryptoError::MalformedCiphertext)
    }

    async fn done(&self, err: Option<CryptoError>) -> Option<u64> {
        if self
            .plaintext_tx
            .send(SinkMessage::Done(err))
            .await
            .is_err()
        {
            return None;
        }

        match self.commit_rx.recv().await {
            Ok(result) => result,
            Err(RecvError) => None,
        }
    }
}

/// Builds a connected `(sink, subscribe)` pair, the driver future that must be spawned to
/// actually encrypt segments, and the `commit_tx` half of `done()`'s outcome channel. Kept
/// internal: [`crate::filesystem::NodePersistence`] is the only caller, since it alone knows the
/// key, header nonce and segment cadence to drive the pipe.
///
/// The driver resolves to `Some(total_plaintext_len)` on a clean encrypt, `None` on a caller
/// error or an encryption failure. It does *not* decide what `done()` reports: the task that
/// also awaits `Storage::save_obj` must combine that result with the driver's and send the
/// combined verdict into `commit_tx` — only that determines what `done()` returns.
pub(crate) fn encrypting_pipe(
    cryptor: std::sync::Arc<dyn super::Cryptor>,
    key: super::AccessKey,
    header_nonce: super::HeaderNonce,
) -> (
    ChannelFileByteSink,
    Subscribe,
    impl std::future::Future<Output = Option<u64>> + Send + 'static,
    Sender<Option<u64>>,
) {
    let (plaintext_tx, plaintext_rx) = bounded::<SinkMessage>(8);
    let (ciphertext_tx, ciphertext_rx) = bounded::<Vec<u8>>(8);
    let (commit_tx, commit_rx) = bounded::<Option<u64>>(1);

    let driver = async move {
        let mut segment_index = 0u64;
        let mut total_plain = 0u64;
        let mut encountered_error = false;

        loop {
            match plaintext_rx.recv().await {
                Ok(SinkMessage::Chunk(chunk)) => {
                    if encountered_error {
                        continue;
                    }
                    total_plain += chunk.len() as u64;
                    match cryptor
                        .make_segments_writer(&key, &header_nonce, segment_index, &chunk)
                        .await
                    {
                        Ok(encrypted) => {
                            segment_index += 1;
                            if ciphertext_tx.send(encrypted).await.is_err() {
                                encountered_error = true;
                            }
                        }
                        Err(_) => encountered_error = true,
                    }
                }
                Ok(SinkMessage::Done(caller_err)) => {
                    drop(ciphertext_tx);
                    return if caller_err.is_some() || encountered_error {
                        None
                    } else {
                        Some(total_plain)
                    };
                }
                Err(RecvError) => {
                    drop(ciphertext_tx);
                    return None;
                }
            }
        }
    };

    (
        ChannelFileByteSink {
            plaintext_tx,
            commit_rx,
        },
        Subscribe {
            receiver: ciphertext_rx,
        },
        driver,
        commit_tx,
    )
}
