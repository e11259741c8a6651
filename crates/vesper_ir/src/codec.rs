//! The serialization seam between the cache and the synthesis engine.
//!
//! The cache treats module bytes as opaque; the engine supplies the codec.
//! Keeping the trait here lets `vesper_cache` depend only on the IR.

use crate::design::Design;
use crate::module::Module;

/// Errors from module serialization or deserialization.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The module could not be encoded.
    #[error("module encode failed: {reason}")]
    Encode {
        /// Description of the encoder failure.
        reason: String,
    },
    /// The byte payload could not be decoded.
    #[error("module decode failed: {reason}")]
    Decode {
        /// Description of the decoder failure.
        reason: String,
    },
    /// The decoded module carried an empty name.
    #[error("decoded module has an empty name")]
    EmptyName,
}

/// Serializes modules to opaque bytes and loads them back into a design.
///
/// Implementations must be self-contained per module: `load_module` applied
/// to the output of `serialize_module` must reproduce a module with the
/// same content fingerprint.
pub trait ModuleCodec {
    /// Encodes a single module into an opaque byte string.
    fn serialize_module(&self, module: &Module) -> Result<Vec<u8>, CodecError>;

    /// Decodes a byte string and inserts the module into the design,
    /// replacing any module of the same name. Returns the module name.
    fn load_module(&self, data: &[u8], design: &mut Design) -> Result<String, CodecError>;
}
