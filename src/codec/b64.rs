//! Tiny wrapper around the `base64` crate's `Engine` trait so the rest of the codec module can
//! call `b64::encode`/`b64::decode` without every call site naming an engine.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    STANDARD.encode(bytes)
}

pub fn decode(encoded: impl AsRef<[u8]>) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded)
}
