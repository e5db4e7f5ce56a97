//! Save/load materialized valuesets to/from disk.
//!
//! # File Format
//!
//! A valueset file (`.vsb`) is little-endian binary:
//!
//! ```text
//! [4 bytes]  Magic: "VSB1"
//! [4 bytes]  Format version (u32)
//! [8 bytes]  Snapshot generation (u64)
//! [4 + var]  Release label (u32 length + UTF-8)
//! [4 + var]  Valueset id
//! [4 + var]  Valueset version
//! [4 + var]  Canonical rule
//! [32 bytes] SHA-256 of the canonical rule
//! [8 bytes]  Member count (u64)
//! [4 + var]  Serialized roaring treemap of member SCTIDs
//! ```
//!
//! Members are stored by SCTID rather than dense index, so a file stays
//! readable after the snapshot it came from is gone.

mod directory;
mod manifest;

pub use directory::DirectoryIndexer;
pub use manifest::{ManifestEntry, ValuesetManifest};

use std::path::Path;

use roaring::RoaringTreemap;
use snomed_hierarchy::SctId;
use snomed_valueset::{Fingerprint, ValuesetKey};

use crate::error::{ExpansionError, ExpansionResult};
use crate::indexing::IndexedValueset;
use crate::snapshot::SnapshotVersion;

/// Magic bytes for valueset files.
const VALUESET_MAGIC: &[u8; 4] = b"VSB1";

/// Current valueset file format version.
const FORMAT_VERSION: u32 = 1;

/// Longest string field accepted on load.
const MAX_FIELD_LEN: usize = 16 * 1024 * 1024;

/// A materialized valueset as stored on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesetFile {
    /// Snapshot the members were computed against.
    pub snapshot: SnapshotVersion,
    /// Valueset identity.
    pub key: ValuesetKey,
    /// Canonical rule text.
    pub rule: String,
    /// Fingerprint of `rule`.
    pub fingerprint: Fingerprint,
    /// Member SCTIDs.
    pub members: RoaringTreemap,
}

impl ValuesetFile {
    /// Creates a file from a rule and its members.
    pub fn new<I: IntoIterator<Item = SctId>>(
        snapshot: SnapshotVersion,
        key: ValuesetKey,
        rule: impl Into<String>,
        members: I,
    ) -> Self {
        let rule = rule.into();
        Self {
            snapshot,
            key,
            fingerprint: Fingerprint::of(&rule),
            rule,
            members: members.into_iter().collect(),
        }
    }

    /// Creates a file from an indexed valueset.
    pub fn from_indexed(snapshot: &SnapshotVersion, valueset: &IndexedValueset) -> Self {
        Self::new(
            snapshot.clone(),
            valueset.key.clone(),
            valueset.rule.clone(),
            valueset.members.iter().copied(),
        )
    }

    /// Number of members.
    pub fn len(&self) -> u64 {
        self.members.len()
    }

    /// Returns true if there are no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Membership test.
    pub fn contains(&self, concept_id: SctId) -> bool {
        self.members.contains(concept_id)
    }

    /// Members in ascending order.
    pub fn to_sorted_ids(&self) -> Vec<SctId> {
        self.members.iter().collect()
    }

    /// Encodes the file.
    pub fn to_bytes(&self) -> ExpansionResult<Vec<u8>> {
        let mut bitmap = Vec::with_capacity(self.members.serialized_size());
        self.members
            .serialize_into(&mut bitmap)
            .map_err(|e| ExpansionError::Serialization(e.to_string()))?;

        let mut out = Vec::with_capacity(96 + self.rule.len() + bitmap.len());
        out.extend_from_slice(VALUESET_MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&self.snapshot.generation.to_le_bytes());
        for field in [
            self.snapshot.release.as_bytes(),
            self.key.id.as_bytes(),
            self.key.version.as_bytes(),
            self.rule.as_bytes(),
        ] {
            put_bytes(&mut out, field)?;
        }
        out.extend_from_slice(&self.fingerprint.0);
        out.extend_from_slice(&self.members.len().to_le_bytes());
        put_bytes(&mut out, &bitmap)?;
        Ok(out)
    }

    /// Decodes and verifies a file.
    ///
    /// # Errors
    ///
    /// - [`ExpansionError::InvalidFormat`] on bad magic, version, truncation
    ///   or a member count that disagrees with the bitmap
    /// - [`ExpansionError::HashMismatch`] if the rule does not match the
    ///   stored fingerprint
    pub fn from_bytes(bytes: &[u8]) -> ExpansionResult<Self> {
        let mut reader = Reader { bytes };

        if reader.take(4)? != VALUESET_MAGIC {
            return Err(ExpansionError::invalid_format("Invalid magic bytes"));
        }
        let version = reader.u32()?;
        if version != FORMAT_VERSION {
            return Err(ExpansionError::invalid_format(format!(
                "Unsupported version: {} (expected {})",
                version, FORMAT_VERSION
            )));
        }

        let generation = reader.u64()?;
        let release = reader.string()?;
        let id = reader.string()?;
        let key_version = reader.string()?;
        let rule = reader.string()?;

        let mut stored = [0u8; 32];
        stored.copy_from_slice(reader.take(32)?);
        let stored = Fingerprint(stored);
        let actual = Fingerprint::of(&rule);
        if stored != actual {
            return Err(ExpansionError::HashMismatch {
                expected: stored.to_hex(),
                actual: actual.to_hex(),
            });
        }

        let count = reader.u64()?;
        let bitmap = reader.bytes()?;
        let members = RoaringTreemap::deserialize_from(bitmap)
            .map_err(|e| ExpansionError::invalid_format(format!("Corrupt member bitmap: {e}")))?;
        if members.len() != count {
            return Err(ExpansionError::invalid_format(format!(
                "Member count mismatch: header says {}, bitmap holds {}",
                count,
                members.len()
            )));
        }

        Ok(Self {
            snapshot: SnapshotVersion::new(generation, release),
            key: ValuesetKey::new(id, key_version),
            rule,
            fingerprint: stored,
            members,
        })
    }

    /// Writes the file to `path`. Returns the size in bytes.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ExpansionResult<u64> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes).map_err(|e| ExpansionError::io_error(path, e))?;
        Ok(bytes.len() as u64)
    }

    /// Reads and verifies the file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> ExpansionResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| ExpansionError::io_error(path, e))?;
        Self::from_bytes(&bytes)
    }
}

fn put_bytes(out: &mut Vec<u8>, field: &[u8]) -> ExpansionResult<()> {
    let len = u32::try_from(field.len())
        .map_err(|_| ExpansionError::invalid_format(format!("Field too long: {} bytes", field.len())))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(field);
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> ExpansionResult<&'a [u8]> {
        if self.bytes.len() < n {
            return Err(ExpansionError::invalid_format("Unexpected end of file"));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn u32(&mut self) -> ExpansionResult<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> ExpansionResult<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn bytes(&mut self) -> ExpansionResult<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn string(&mut self) -> ExpansionResult<String> {
        let len = self.u32()? as usize;
        if len > MAX_FIELD_LEN {
            return Err(ExpansionError::invalid_format(format!("Field too long: {len} bytes")));
        }
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| ExpansionError::invalid_format("Field is not UTF-8"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> ValuesetFile {
        ValuesetFile::new(
            SnapshotVersion::new(7, "20240101"),
            ValuesetKey::new("diabetes", "2"),
            "<< 73211009",
            [73211009, 44054006, 46635009, 900000000000207008],
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("diabetes.vsb");
        let file = sample();
        let size = file.save(&path).unwrap();
        assert!(size > 0);

        let loaded = ValuesetFile::load(&path).unwrap();
        assert_eq!(loaded, file);
        assert_eq!(loaded.snapshot.generation, 7);
        assert!(loaded.contains(900000000000207008));
        assert_eq!(loaded.to_sorted_ids()[0], 44054006);
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0] = b'X';
        let err = ValuesetFile::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, ExpansionError::InvalidFormat { .. }));
    }

    #[test]
    fn test_tampered_rule_is_rejected() {
        let bytes = sample().to_bytes().unwrap();
        let needle = b"<< 73211009";
        let at = bytes.windows(needle.len()).position(|w| w == needle).unwrap();
        let mut tampered = bytes.clone();
        tampered[at + 3] = b'8';

        let err = ValuesetFile::from_bytes(&tampered).unwrap_err();
        assert!(matches!(err, ExpansionError::HashMismatch { .. }));
    }

    #[test]
    fn test_truncated() {
        let bytes = sample().to_bytes().unwrap();
        let err = ValuesetFile::from_bytes(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, ExpansionError::InvalidFormat { .. }));
    }

    #[test]
    fn test_empty_valueset() {
        let file = ValuesetFile::new(SnapshotVersion::new(1, "r"), ValuesetKey::new("e", "1"), "<< 1", []);
        let loaded = ValuesetFile::from_bytes(&file.to_bytes().unwrap()).unwrap();
        assert!(loaded.is_empty());
    }
}
