//! Manifest for a directory of valueset files.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ExpansionError, ExpansionResult};
use crate::snapshot::SnapshotVersion;

/// Describes every valueset file written for one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuesetManifest {
    /// Snapshot the files were materialized against.
    pub snapshot: SnapshotVersion,
    /// When the files were written.
    pub compiled_at: DateTime<Utc>,
    /// Version of the tool that wrote them.
    pub compiler_version: String,
    /// Per-valueset entries, sorted by key.
    pub valuesets: Vec<ManifestEntry>,
    /// `id|version` of catalog valuesets that failed to materialize.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

/// One valueset file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Valueset id.
    pub id: String,
    /// Valueset version.
    pub version: String,
    /// Human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Canonical rule.
    pub rule: String,
    /// Hex fingerprint of the rule.
    pub fingerprint: String,
    /// Number of members.
    pub member_count: u64,
    /// Concepts skipped as unknown.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<u64>,
    /// File size in bytes.
    pub file_size_bytes: u64,
    /// File name relative to the manifest.
    pub filename: String,
}

impl ValuesetManifest {
    /// Creates an empty manifest.
    pub fn new(snapshot: SnapshotVersion) -> Self {
        Self {
            snapshot,
            compiled_at: Utc::now(),
            compiler_version: env!("CARGO_PKG_VERSION").to_string(),
            valuesets: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Adds an entry.
    pub fn add_entry(&mut self, entry: ManifestEntry) {
        self.valuesets.push(entry);
    }

    /// Number of valuesets.
    pub fn count(&self) -> usize {
        self.valuesets.len()
    }

    /// Total file size of all valuesets.
    pub fn total_size_bytes(&self) -> u64 {
        self.valuesets.iter().map(|e| e.file_size_bytes).sum()
    }

    /// Sum of member counts.
    pub fn total_members(&self) -> u64 {
        self.valuesets.iter().map(|e| e.member_count).sum()
    }

    /// Finds an entry.
    pub fn get_entry(&self, id: &str, version: &str) -> Option<&ManifestEntry> {
        self.valuesets.iter().find(|e| e.id == id && e.version == version)
    }

    /// Saves the manifest as pretty JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ExpansionResult<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| ExpansionError::io_error(path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| ExpansionError::Serialization(e.to_string()))
    }

    /// Loads a manifest.
    pub fn load<P: AsRef<Path>>(path: P) -> ExpansionResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ExpansionError::io_error(path, e))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| ExpansionError::Serialization(e.to_string()))
    }
}

impl std::fmt::Display for ValuesetManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Valueset Manifest")?;
        writeln!(f, "  Snapshot:        {}", self.snapshot)?;
        writeln!(f, "  Compiled:        {}", self.compiled_at)?;
        writeln!(f, "  Compiler:        {}", self.compiler_version)?;
        writeln!(f, "  Valuesets:       {}", self.count())?;
        writeln!(f, "  Failed:          {}", self.failed.len())?;
        writeln!(f, "  Total members:   {}", self.total_members())?;
        writeln!(f, "  Total size:      {} KB", self.total_size_bytes() / 1024)?;
        Ok(())
    }
}
