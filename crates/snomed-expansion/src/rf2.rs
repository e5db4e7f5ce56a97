//! RF2 snapshot reader.
//!
//! Reads the two files the hierarchy needs from a SNOMED CT release:
//! `sct2_Concept_Snapshot_*.txt` and `sct2_Relationship_Snapshot_*.txt`.
//! Both are tab-separated with a header row.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use snomed_hierarchy::{Concept, Relationship, SctId};
use tracing::info;

use crate::error::{ExpansionError, ExpansionResult};
use crate::snapshot::SnapshotInput;

const CONCEPT_COLUMNS: &[&str] = &["id", "effectiveTime", "active", "moduleId", "definitionStatusId"];

const RELATIONSHIP_COLUMNS: &[&str] = &[
    "id",
    "effectiveTime",
    "active",
    "moduleId",
    "sourceId",
    "destinationId",
    "relationshipGroup",
    "typeId",
    "characteristicTypeId",
    "modifierId",
];

/// Paths to the RF2 files of one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rf2Files {
    /// Concept snapshot file.
    pub concepts: PathBuf,
    /// Relationship snapshot file.
    pub relationships: PathBuf,
    /// Release date taken from the concept file name.
    pub release: Option<String>,
}

/// Finds the concept and relationship snapshot files under `dir`.
///
/// Accepts the release root, its `Snapshot` directory or the `Terminology`
/// directory itself.
pub fn discover<P: AsRef<Path>>(dir: P) -> ExpansionResult<Rf2Files> {
    let dir = dir.as_ref();
    let terminology = [
        dir.to_path_buf(),
        dir.join("Terminology"),
        dir.join("Snapshot").join("Terminology"),
    ]
    .into_iter()
    .find(|candidate| candidate.is_dir() && contains_concept_file(candidate))
    .ok_or_else(|| rf2_error(dir, "no sct2_Concept_Snapshot file found"))?;

    let mut concepts = None;
    let mut relationships = None;
    let mut release = None;

    for entry in fs::read_dir(&terminology).map_err(|e| ExpansionError::io_error(&terminology, e))? {
        let entry = entry.map_err(|e| ExpansionError::io_error(&terminology, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".txt") {
            continue;
        }
        if name.starts_with("sct2_Concept_Snapshot") {
            release = release_date(&name);
            concepts = Some(entry.path());
        } else if name.starts_with("sct2_Relationship_Snapshot") {
            relationships = Some(entry.path());
        }
    }

    Ok(Rf2Files {
        concepts: concepts.ok_or_else(|| rf2_error(&terminology, "no sct2_Concept_Snapshot file found"))?,
        relationships: relationships
            .ok_or_else(|| rf2_error(&terminology, "no sct2_Relationship_Snapshot file found"))?,
        release,
    })
}

/// Reads a release directory into a [`SnapshotInput`].
///
/// Only IS-A relationships are kept. The release label falls back to the
/// directory name when the file names carry no date.
pub fn load_snapshot_input<P: AsRef<Path>>(dir: P) -> ExpansionResult<SnapshotInput> {
    let dir = dir.as_ref();
    let files = discover(dir)?;
    let concepts = read_concepts(&files.concepts)?;
    let relationships = read_relationships(&files.relationships)?;
    let release = files.release.unwrap_or_else(|| {
        dir.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string())
    });

    info!(
        release = %release,
        concepts = concepts.len(),
        relationships = relationships.len(),
        "Read RF2 snapshot"
    );
    Ok(SnapshotInput::new(release, concepts, relationships))
}

/// Reads a concept snapshot file.
pub fn read_concepts<P: AsRef<Path>>(path: P) -> ExpansionResult<Vec<Concept>> {
    let path = path.as_ref();
    let file = fs::File::open(path).map_err(|e| ExpansionError::io_error(path, e))?;
    parse_concepts(file, path)
}

/// Reads a relationship snapshot file, keeping IS-A rows only.
pub fn read_relationships<P: AsRef<Path>>(path: P) -> ExpansionResult<Vec<Relationship>> {
    let path = path.as_ref();
    let file = fs::File::open(path).map_err(|e| ExpansionError::io_error(path, e))?;
    parse_relationships(file, path)
}

fn parse_concepts<R: Read>(reader: R, path: &Path) -> ExpansionResult<Vec<Concept>> {
    let mut concepts = Vec::new();
    for_each_record(reader, path, CONCEPT_COLUMNS, |row| {
        concepts.push(Concept {
            id: row.sctid(0)?,
            effective_time: row.effective_time(1)?,
            active: row.boolean(2)?,
            module_id: row.sctid(3)?,
        });
        Ok(())
    })?;
    Ok(concepts)
}

fn parse_relationships<R: Read>(reader: R, path: &Path) -> ExpansionResult<Vec<Relationship>> {
    let mut relationships = Vec::new();
    for_each_record(reader, path, RELATIONSHIP_COLUMNS, |row| {
        let relationship = Relationship {
            id: row.sctid(0)?,
            active: row.boolean(2)?,
            source_id: row.sctid(4)?,
            destination_id: row.sctid(5)?,
            type_id: row.sctid(7)?,
        };
        if relationship.is_is_a() {
            relationships.push(relationship);
        }
        Ok(())
    })?;
    Ok(relationships)
}

fn for_each_record<R, F>(reader: R, path: &Path, columns: &[&str], mut handle: F) -> ExpansionResult<()>
where
    R: Read,
    F: FnMut(Row<'_>) -> ExpansionResult<()>,
{
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(false)
        .quoting(false)
        .from_reader(reader);

    let headers = reader.headers().map_err(|e| rf2_error(path, e))?;
    if headers.len() < columns.len() {
        return Err(rf2_error(
            path,
            format!("expected {} columns, found {}", columns.len(), headers.len()),
        ));
    }
    for (position, (found, expected)) in headers.iter().zip(columns).enumerate() {
        let found = found.trim_start_matches('\u{feff}');
        if found != *expected {
            return Err(rf2_error(
                path,
                format!("column {position}: expected '{expected}', found '{found}'"),
            ));
        }
    }

    let mut record = StringRecord::new();
    let mut line = 1u64;
    while reader.read_record(&mut record).map_err(|e| rf2_error(path, e))? {
        line += 1;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        handle(Row {
            record: &record,
            path,
            line,
        })?;
    }
    Ok(())
}

struct Row<'a> {
    record: &'a StringRecord,
    path: &'a Path,
    line: u64,
}

impl Row<'_> {
    fn field(&self, index: usize) -> &str {
        self.record.get(index).unwrap_or("")
    }

    fn invalid(&self, index: usize, what: &str) -> ExpansionError {
        rf2_error(
            self.path,
            format!("line {}: invalid {what} '{}'", self.line, self.field(index)),
        )
    }

    fn sctid(&self, index: usize) -> ExpansionResult<SctId> {
        self.field(index).parse().map_err(|_| self.invalid(index, "SCTID"))
    }

    fn boolean(&self, index: usize) -> ExpansionResult<bool> {
        match self.field(index) {
            "0" => Ok(false),
            "1" => Ok(true),
            _ => Err(self.invalid(index, "active flag")),
        }
    }

    fn effective_time(&self, index: usize) -> ExpansionResult<u32> {
        let value = self.field(index);
        if value.len() != 8 {
            return Err(self.invalid(index, "effective time"));
        }
        value.parse().map_err(|_| self.invalid(index, "effective time"))
    }
}

fn contains_concept_file(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .any(|e| e.file_name().to_string_lossy().starts_with("sct2_Concept_Snapshot"))
        })
        .unwrap_or(false)
}

/// `sct2_Concept_Snapshot_INT_20240101.txt` → `20240101`.
fn release_date(file_name: &str) -> Option<String> {
    let stem = file_name.trim_end_matches(".txt");
    let last = stem.rsplit('_').next()?;
    (last.len() == 8 && last.chars().all(|c| c.is_ascii_digit())).then(|| last.to_string())
}

fn rf2_error(path: &Path, message: impl ToString) -> ExpansionError {
    ExpansionError::Rf2 {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snomed_hierarchy::IS_A;

    const CONCEPTS: &str = "\u{feff}id\teffectiveTime\tactive\tmoduleId\tdefinitionStatusId\n\
        73211009\t20020131\t1\t900000000000207008\t900000000000074008\n\
        44054006\t20020131\t1\t900000000000207008\t900000000000074008\n\
        46635009\t20020131\t0\t900000000000207008\t900000000000074008\n";

    const RELATIONSHIPS: &str = "id\teffectiveTime\tactive\tmoduleId\tsourceId\tdestinationId\trelationshipGroup\ttypeId\tcharacteristicTypeId\tmodifierId\n\
        100\t20020131\t1\t900000000000207008\t44054006\t73211009\t0\t116680003\t900000000000011006\t900000000000451002\n\
        101\t20020131\t1\t900000000000207008\t44054006\t113331007\t0\t363698007\t900000000000011006\t900000000000451002\n\
        102\t20020131\t0\t900000000000207008\t46635009\t73211009\t0\t116680003\t900000000000011006\t900000000000451002\n";

    fn write_release(dir: &Path) {
        let terminology = dir.join("Snapshot").join("Terminology");
        fs::create_dir_all(&terminology).unwrap();
        fs::write(terminology.join("sct2_Concept_Snapshot_INT_20240101.txt"), CONCEPTS).unwrap();
        fs::write(
            terminology.join("sct2_Relationship_Snapshot_INT_20240101.txt"),
            RELATIONSHIPS,
        )
        .unwrap();
    }

    #[test]
    fn test_parse_concepts() {
        let concepts = parse_concepts(CONCEPTS.as_bytes(), Path::new("c.txt")).unwrap();
        assert_eq!(concepts.len(), 3);
        assert_eq!(concepts[0].id, 73211009);
        assert_eq!(concepts[0].effective_time, 20020131);
        assert!(!concepts[2].active);
    }

    #[test]
    fn test_parse_relationships_keeps_is_a_only() {
        let relationships = parse_relationships(RELATIONSHIPS.as_bytes(), Path::new("r.txt")).unwrap();
        assert_eq!(relationships.len(), 2);
        assert!(relationships.iter().all(|r| r.type_id == IS_A));
        assert!(!relationships[1].active);
    }

    #[test]
    fn test_bad_header() {
        let err = parse_concepts("id\tactive\n1\t1\n".as_bytes(), Path::new("c.txt")).unwrap_err();
        assert!(matches!(err, ExpansionError::Rf2 { .. }));
    }

    #[test]
    fn test_bad_field_reports_line() {
        let data = "id\teffectiveTime\tactive\tmoduleId\tdefinitionStatusId\n\
            1\t20020131\t1\t9\t9\n\
            2\t20020131\tyes\t9\t9\n";
        let err = parse_concepts(data.as_bytes(), Path::new("c.txt")).unwrap_err();
        assert!(err.to_string().contains("line 3: invalid active flag 'yes'"));
    }

    #[test]
    fn test_release_date() {
        assert_eq!(
            release_date("sct2_Concept_Snapshot_INT_20240101.txt").as_deref(),
            Some("20240101")
        );
        assert_eq!(release_date("sct2_Concept_Snapshot.txt"), None);
    }

    #[test]
    fn test_load_snapshot_input() {
        let dir = tempfile::tempdir().unwrap();
        write_release(dir.path());

        let input = load_snapshot_input(dir.path()).unwrap();
        assert_eq!(input.release, "20240101");
        assert_eq!(input.concepts.len(), 3);
        assert_eq!(input.relationships.len(), 2);
    }

    #[test]
    fn test_discover_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(discover(dir.path()), Err(ExpansionError::Rf2 { .. })));
    }
}
