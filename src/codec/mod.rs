//! Class-file codec boundary
//!
//! The transformation engine never touches raw bytes itself: it hands a [`crate::model::ClassNode`]
//! to a [`ClassCodec`] and gets bytes back (and vice versa). The codec owns every byte-level
//! concern, including resolving label marks to instruction offsets on encode and rebuilding marks
//! on decode, so callers never compute offsets or frame layouts manually.

mod binary;

pub use binary::BinaryCodec;

use crate::model::ClassNode;
use crate::Error;

/// Reads and writes the binary representation of one class
pub trait ClassCodec {
    /// Decode raw bytes into a structured class model
    fn decode(&self, bytes: &[u8]) -> Result<ClassNode, Error>;

    /// Encode a class model back into raw bytes
    fn encode(&self, class: &ClassNode) -> Result<Vec<u8>, Error>;
}
