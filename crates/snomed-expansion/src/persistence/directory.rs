//! Filesystem implementation of [`ValuesetIndexer`].

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tracing::info;

use super::manifest::{ManifestEntry, ValuesetManifest};
use super::ValuesetFile;
use crate::error::{ExpansionError, ExpansionResult};
use crate::indexing::{IndexBatch, ValuesetIndexer};

const MANIFEST_FILE: &str = "manifest.json";
const MEMBERSHIP_FILE: &str = "membership.json";

/// Writes each batch as `.vsb` files plus `manifest.json` and
/// `membership.json` under one directory.
///
/// A later batch overwrites the manifest; files of valuesets no longer in
/// the batch are left in place but unreferenced.
#[derive(Debug, Clone)]
pub struct DirectoryIndexer {
    root: PathBuf,
}

impl DirectoryIndexer {
    /// Creates an indexer writing under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Output directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads the current manifest.
    pub fn manifest(&self) -> ExpansionResult<ValuesetManifest> {
        ValuesetManifest::load(self.root.join(MANIFEST_FILE))
    }

    /// Loads one valueset through the manifest.
    pub fn load(&self, id: &str, version: &str) -> ExpansionResult<ValuesetFile> {
        let manifest = self.manifest()?;
        let entry = manifest.get_entry(id, version).ok_or_else(|| {
            ExpansionError::UnknownValueset(snomed_valueset::ValuesetKey::new(id, version))
        })?;
        ValuesetFile::load(self.root.join(&entry.filename))
    }
}

impl ValuesetIndexer for DirectoryIndexer {
    fn publish(&self, batch: &IndexBatch) -> ExpansionResult<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| ExpansionError::io_error(&self.root, e))?;

        let mut manifest = ValuesetManifest::new(batch.snapshot.clone());
        for valueset in &batch.valuesets {
            let file = ValuesetFile::from_indexed(&batch.snapshot, valueset);
            let filename = file_name(&valueset.key.id, &valueset.key.version, &valueset.fingerprint);
            let file_size_bytes = file.save(self.root.join(&filename))?;

            manifest.add_entry(ManifestEntry {
                id: valueset.key.id.clone(),
                version: valueset.key.version.clone(),
                title: valueset.title.clone(),
                rule: valueset.rule.clone(),
                fingerprint: valueset.fingerprint.clone(),
                member_count: file.len(),
                skipped: valueset.skipped.clone(),
                file_size_bytes,
                filename,
            });
        }
        manifest.failed = batch.failed.iter().map(ToString::to_string).collect();

        let membership_path = self.root.join(MEMBERSHIP_FILE);
        let membership = File::create(&membership_path).map_err(|e| ExpansionError::io_error(&membership_path, e))?;
        serde_json::to_writer(BufWriter::new(membership), &batch.membership)
            .map_err(|e| ExpansionError::Serialization(e.to_string()))?;

        // Manifest last, so readers never see entries whose files are missing.
        manifest.save(self.root.join(MANIFEST_FILE))?;

        info!(
            root = %self.root.display(),
            snapshot = %batch.snapshot,
            valuesets = manifest.count(),
            "Wrote valueset files"
        );
        Ok(())
    }
}

/// `id_version_fingerprint8.vsb`, with anything outside `[A-Za-z0-9.-]` replaced.
fn file_name(id: &str, version: &str, fingerprint: &str) -> String {
    let clean = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect()
    };
    let short = fingerprint.get(..8).unwrap_or(fingerprint);
    format!("{}_{}_{}.vsb", clean(id), clean(version), short)
}
