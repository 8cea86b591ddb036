//! Entry Codec Module
//!
//! Frames packed entries for storage: a single marker byte states whether the
//! payload that follows is raw or zlib-compressed, so any backend can decode
//! bytes written under different compression settings.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::cache::entry::Entry;
use crate::error::{CacheError, Result};

// == Markers ==
/// Payload bytes follow the marker verbatim.
pub const MARKER_UNCOMPRESSED: u8 = 0x00;
/// Payload bytes are zlib-compressed.
pub const MARKER_COMPRESSED: u8 = 0x01;

// == Serialize ==
/// Encodes an entry into its storage representation.
///
/// Compression is attempted only when `compress` is set and the packed entry
/// is at least `compress_threshold` bytes long, and the compressed form is
/// kept only when it is actually smaller than the raw one. Either way the
/// output carries exactly one marker byte up front.
///
/// # Arguments
/// * `entry` - The entry to encode
/// * `compress` - Whether compression is enabled for this write
/// * `compress_threshold` - Minimum packed size, in bytes, to compress
///
/// # Returns
/// The marker byte followed by the (possibly compressed) packed entry.
pub fn serialize(entry: &Entry, compress: bool, compress_threshold: usize) -> Result<Vec<u8>> {
    let packed = entry.pack()?;

    if compress && packed.len() >= compress_threshold {
        let compressed = deflate(&packed)?;
        if compressed.len() < packed.len() {
            let mut out = Vec::with_capacity(1 + compressed.len());
            out.push(MARKER_COMPRESSED);
            out.extend_from_slice(&compressed);
            return Ok(out);
        }
    }

    let mut out = Vec::with_capacity(1 + packed.len());
    out.push(MARKER_UNCOMPRESSED);
    out.extend_from_slice(&packed);
    Ok(out)
}

// == Deserialize ==
/// Decodes a storage representation back into an entry.
///
/// Reads the marker byte, inflates the payload when it says compressed, and
/// unpacks the result. Any malformed input, including an unknown marker or an
/// undecodable compressed stream, fails with [`CacheError::CorruptEntry`].
pub fn deserialize(data: &[u8]) -> Result<Entry> {
    let (marker, payload) = data
        .split_first()
        .ok_or_else(|| CacheError::CorruptEntry("empty serialized entry".to_string()))?;

    match *marker {
        MARKER_UNCOMPRESSED => Entry::unpack(payload),
        MARKER_COMPRESSED => {
            let packed = inflate(payload)?;
            Entry::unpack(&packed)
        }
        other => Err(CacheError::CorruptEntry(format!(
            "unknown codec marker 0x{:02x}",
            other
        ))),
    }
}

// == Compression Helpers ==
fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| CacheError::Serialization(format!("deflate failed: {}", e)))
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CacheError::CorruptEntry(format!("inflate failed: {}", e)))?;
    Ok(out)
}
