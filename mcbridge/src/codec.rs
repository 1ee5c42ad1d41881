//! Pluggable byte transforms applied to persisted state.

use crate::error::CodecError;

/// A reversible byte transform.
///
/// `decompress(compress(b)) == b` must hold for every input the codec accepts.
pub trait Codec: Send + Sync + 'static {
    /// Transforms bytes for storage.
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Reverses [`Codec::compress`].
    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Returns the codec name for logging.
    fn name(&self) -> &'static str;
}

/// Passes bytes through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl Codec for IdentityCodec {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(bytes.to_vec())
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(bytes.to_vec())
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}
