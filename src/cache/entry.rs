//! Cache Entry Module
//!
//! Defines the value object stored per key: the payload plus its expiration
//! and version metadata, with a compact binary pack/unpack representation.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{CacheError, Result};

// Flags byte of the packed layout. Presence bits keep "field absent"
// distinguishable from "field present with value zero".
const FLAG_EXPIRES_AT: u8 = 0b0000_0001;
const FLAG_VERSION: u8 = 0b0000_0010;
const FLAG_KNOWN: u8 = FLAG_EXPIRES_AT | FLAG_VERSION;

// == Cache Entry ==
/// A single cached payload with its metadata.
///
/// Entries are immutable after construction and live only for the duration of
/// one store operation; the race-condition repair path produces a fresh entry
/// via [`Entry::refreshed`] instead of mutating in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// The stored value, opaque to the store
    value: String,
    /// Absolute expiration (seconds since Unix epoch), None = never expires
    expires_at: Option<f64>,
    /// Version tag checked against reads, None = don't care
    version: Option<i32>,
}

impl Entry {
    // == Constructor ==
    /// Creates a new entry, resolving a relative expiration against the
    /// current clock.
    ///
    /// `expires_in` is in seconds and may be zero or negative, producing an
    /// entry that is already expired on arrival (used by the race-condition
    /// TTL tests and by absolute `expires_at` writes that lie in the past).
    pub fn new(value: String, expires_in: Option<f64>, version: Option<i32>) -> Self {
        let expires_at = expires_in.map(|secs| unix_now() + secs);
        Self {
            value,
            expires_at,
            version,
        }
    }

    /// Rebuilds an entry from its raw parts. Used by `unpack` and tests.
    pub(crate) fn from_parts(value: String, expires_at: Option<f64>, version: Option<i32>) -> Self {
        Self {
            value,
            expires_at,
            version,
        }
    }

    // == Accessors ==
    /// The stored value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Consumes the entry, returning the stored value.
    pub fn into_value(self) -> String {
        self.value
    }

    /// Absolute expiration timestamp (seconds since epoch), if any.
    pub fn expires_at(&self) -> Option<f64> {
        self.expires_at
    }

    /// Version tag, if any.
    pub fn version(&self) -> Option<i32> {
        self.version
    }

    // == Expiration ==
    /// Checks whether the entry has expired against the current clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }

    /// Checks expiration against a supplied clock reading.
    ///
    /// Boundary condition: an entry is expired iff `expires_at` is set and
    /// strictly less than `at`. An entry read at exactly its expiration
    /// instant is still served.
    pub fn is_expired_at(&self, at: f64) -> bool {
        match self.expires_at {
            Some(expires) => expires < at,
            None => false,
        }
    }

    // == Version Check ==
    /// Checks whether the entry's version conflicts with a requested one.
    ///
    /// A `None` on either side is never a mismatch; it means "don't care".
    pub fn mismatched(&self, requested: Option<i32>) -> bool {
        matches!((self.version, requested), (Some(own), Some(req)) if own != req)
    }

    // == Copy-on-write Repair ==
    /// Returns a copy of this entry with its expiration pushed to
    /// `new_expires_at`. The race-condition repair path uses this instead of
    /// mutation so a stale entry is never aliased across concurrent readers.
    pub fn refreshed(&self, new_expires_at: f64) -> Self {
        Self {
            value: self.value.clone(),
            expires_at: Some(new_expires_at),
            version: self.version,
        }
    }

    // == Pack ==
    /// Serializes the entry into its compact binary representation.
    ///
    /// Layout: one flags byte (presence of `expires_at` / `version`), the
    /// present fields as little-endian fixed-width numbers, then the
    /// length-prefixed UTF-8 value. Fails with
    /// [`CacheError::Serialization`] when the value is too large for the
    /// u32 length prefix.
    pub fn pack(&self) -> Result<Vec<u8>> {
        let value_len = value_len_prefix(self.value.len())?;
        let mut buf = Vec::with_capacity(1 + 8 + 4 + 4 + self.value.len());

        let mut flags = 0u8;
        if self.expires_at.is_some() {
            flags |= FLAG_EXPIRES_AT;
        }
        if self.version.is_some() {
            flags |= FLAG_VERSION;
        }
        buf.push(flags);

        if let Some(expires_at) = self.expires_at {
            buf.extend_from_slice(&expires_at.to_le_bytes());
        }
        if let Some(version) = self.version {
            buf.extend_from_slice(&version.to_le_bytes());
        }

        buf.extend_from_slice(&value_len.to_le_bytes());
        buf.extend_from_slice(self.value.as_bytes());

        Ok(buf)
    }

    // == Unpack ==
    /// Deserializes an entry previously produced by [`Entry::pack`].
    ///
    /// Fails with [`CacheError::CorruptEntry`] on any malformed layout:
    /// truncated fields, unknown flag bits, a value length that disagrees
    /// with the buffer, or a non-UTF-8 value.
    pub fn unpack(data: &[u8]) -> Result<Self> {
        let mut pos = 0;

        let flags = *data
            .first()
            .ok_or_else(|| corrupt("missing flags byte"))?;
        pos += 1;

        if flags & !FLAG_KNOWN != 0 {
            return Err(corrupt(format!("unknown flag bits 0x{:02x}", flags)));
        }

        let expires_at = if flags & FLAG_EXPIRES_AT != 0 {
            let raw = take(data, &mut pos, 8, "expires_at")?;
            Some(f64::from_le_bytes(
                raw.try_into().map_err(|_| corrupt("invalid expires_at"))?,
            ))
        } else {
            None
        };

        let version = if flags & FLAG_VERSION != 0 {
            let raw = take(data, &mut pos, 4, "version")?;
            Some(i32::from_le_bytes(
                raw.try_into().map_err(|_| corrupt("invalid version"))?,
            ))
        } else {
            None
        };

        let raw = take(data, &mut pos, 4, "value length")?;
        let value_len = u32::from_le_bytes(
            raw.try_into().map_err(|_| corrupt("invalid value length"))?,
        ) as usize;

        let raw_value = take(data, &mut pos, value_len, "value")?;
        if pos != data.len() {
            return Err(corrupt(format!(
                "{} trailing bytes after value",
                data.len() - pos
            )));
        }

        let value = String::from_utf8(raw_value.to_vec())
            .map_err(|_| corrupt("value is not valid UTF-8"))?;

        Ok(Self {
            value,
            expires_at,
            version,
        })
    }

    /// Byte length of the packed representation without serializing.
    pub fn packed_len(&self) -> usize {
        1 + if self.expires_at.is_some() { 8 } else { 0 }
            + if self.version.is_some() { 4 } else { 0 }
            + 4
            + self.value.len()
    }
}

/// Converts a value length to the u32 wire prefix, rejecting values that
/// would silently truncate.
fn value_len_prefix(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        CacheError::Serialization(format!(
            "value of {} bytes exceeds the {}-byte packing limit",
            len,
            u32::MAX
        ))
    })
}

/// Reads `len` bytes at `*pos`, advancing the cursor.
fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize, field: &str) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| corrupt(format!("truncated {field}")))?;
    let slice = &data[*pos..end];
    *pos = end;
    Ok(slice)
}

fn corrupt(msg: impl Into<String>) -> CacheError {
    CacheError::CorruptEntry(msg.into())
}

// == Utility Functions ==
/// Returns the current Unix timestamp in seconds, as a float.
pub(crate) fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs_f64()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation_no_expiry() {
        let entry = Entry::new("test_value".to_string(), None, None);

        assert_eq!(entry.value(), "test_value");
        assert!(entry.expires_at().is_none());
        assert!(entry.version().is_none());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_creation_with_expiry() {
        let entry = Entry::new("test_value".to_string(), Some(60.0), None);

        assert!(entry.expires_at().is_some());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_negative_expiry_is_born_expired() {
        let entry = Entry::new("stale".to_string(), Some(-5.0), None);
        assert!(entry.is_expired());
    }

    #[test]
    fn test_expiration_boundary_is_strict() {
        let now = unix_now();
        let entry = Entry::from_parts("v".to_string(), Some(now), None);

        // Not expired at exactly the expiration instant, expired any later.
        assert!(!entry.is_expired_at(now));
        assert!(entry.is_expired_at(now + 0.001));
        assert!(!entry.is_expired_at(now - 0.001));
    }

    #[test]
    fn test_mismatched_requires_both_sides() {
        let versioned = Entry::new("v".to_string(), None, Some(3));
        let unversioned = Entry::new("v".to_string(), None, None);

        assert!(versioned.mismatched(Some(4)));
        assert!(!versioned.mismatched(Some(3)));
        assert!(!versioned.mismatched(None));
        assert!(!unversioned.mismatched(Some(4)));
        assert!(!unversioned.mismatched(None));
    }

    #[test]
    fn test_refreshed_is_a_new_entry() {
        let entry = Entry::from_parts("v".to_string(), Some(100.0), Some(1));
        let repaired = entry.refreshed(500.0);

        assert_eq!(entry.expires_at(), Some(100.0));
        assert_eq!(repaired.expires_at(), Some(500.0));
        assert_eq!(repaired.value(), "v");
        assert_eq!(repaired.version(), Some(1));
    }

    #[test]
    fn test_pack_unpack_round_trip_all_fields() {
        let entry = Entry::from_parts("hello".to_string(), Some(1234.5), Some(42));
        let unpacked = Entry::unpack(&entry.pack().unwrap()).unwrap();
        assert_eq!(unpacked, entry);
    }

    #[test]
    fn test_pack_unpack_round_trip_bare() {
        let entry = Entry::from_parts(String::new(), None, None);
        let unpacked = Entry::unpack(&entry.pack().unwrap()).unwrap();
        assert_eq!(unpacked, entry);
    }

    #[test]
    fn test_pack_distinguishes_absent_from_zero() {
        let zeroed = Entry::from_parts("v".to_string(), Some(0.0), Some(0));
        let unset = Entry::from_parts("v".to_string(), None, None);

        let zeroed_back = Entry::unpack(&zeroed.pack().unwrap()).unwrap();
        let unset_back = Entry::unpack(&unset.pack().unwrap()).unwrap();

        assert_eq!(zeroed_back.expires_at(), Some(0.0));
        assert_eq!(zeroed_back.version(), Some(0));
        assert!(unset_back.expires_at().is_none());
        assert!(unset_back.version().is_none());
    }

    #[test]
    fn test_packed_len_matches_pack() {
        for entry in [
            Entry::from_parts("some value".to_string(), Some(9.5), Some(-7)),
            Entry::from_parts("x".to_string(), None, Some(1)),
            Entry::from_parts(String::new(), Some(0.0), None),
            Entry::from_parts("no metadata".to_string(), None, None),
        ] {
            assert_eq!(entry.pack().unwrap().len(), entry.packed_len());
        }
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_oversized_value_length_is_rejected() {
        // Anything past the u32 prefix would otherwise wrap around silently.
        assert!(value_len_prefix(u32::MAX as usize).is_ok());
        let err = value_len_prefix(u32::MAX as usize + 1).unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
    }

    #[test]
    fn test_unpack_empty_input() {
        let err = Entry::unpack(&[]).unwrap_err();
        assert!(matches!(err, CacheError::CorruptEntry(_)));
    }

    #[test]
    fn test_unpack_truncated_expires_at() {
        // Flags claim an expires_at but only half of it is present.
        let data = [FLAG_EXPIRES_AT, 0, 0, 0, 0];
        let err = Entry::unpack(&data).unwrap_err();
        assert!(matches!(err, CacheError::CorruptEntry(_)));
    }

    #[test]
    fn test_unpack_truncated_value() {
        let mut data = Entry::from_parts("full value".to_string(), None, None).pack().unwrap();
        data.truncate(data.len() - 3);
        let err = Entry::unpack(&data).unwrap_err();
        assert!(matches!(err, CacheError::CorruptEntry(_)));
    }

    #[test]
    fn test_unpack_trailing_bytes() {
        let mut data = Entry::from_parts("v".to_string(), None, None).pack().unwrap();
        data.push(0xFF);
        let err = Entry::unpack(&data).unwrap_err();
        assert!(matches!(err, CacheError::CorruptEntry(_)));
    }

    #[test]
    fn test_unpack_unknown_flags() {
        let data = [0b1000_0000, 0, 0, 0, 0];
        let err = Entry::unpack(&data).unwrap_err();
        assert!(matches!(err, CacheError::CorruptEntry(_)));
    }

    #[test]
    fn test_unpack_invalid_utf8_value() {
        let mut data = vec![0u8];
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&[0xC3, 0x28]); // invalid UTF-8 sequence
        let err = Entry::unpack(&data).unwrap_err();
        assert!(matches!(err, CacheError::CorruptEntry(_)));
    }
}
