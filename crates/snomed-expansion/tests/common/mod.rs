//! Shared fixtures: a small clinical-finding hierarchy.
//!
//! ```text
//! 138875005 SNOMED CT Concept
//! └── 404684003 Clinical finding
//!     ├── 386661006 Fever
//!     └── 64572001 Disease
//!         ├── 90708001 Kidney disease ─────────┐
//!         └── 73211009 Diabetes mellitus       │
//!             ├── 46635009 Type 1              │
//!             ├── 44054006 Type 2              │
//!             └── 127013003 Diabetic renal ◄───┘
//! 190368000 Type I diabetes (inactive, retired)
//! ```

#![allow(dead_code)]

use snomed_expansion::{Concept, Relationship, SnapshotInput};

pub const ROOT: u64 = 138875005;
pub const CLINICAL_FINDING: u64 = 404684003;
pub const FEVER: u64 = 386661006;
pub const DISEASE: u64 = 64572001;
pub const KIDNEY_DISEASE: u64 = 90708001;
pub const DIABETES: u64 = 73211009;
pub const TYPE_1: u64 = 46635009;
pub const TYPE_2: u64 = 44054006;
pub const DIABETIC_RENAL: u64 = 127013003;
pub const RETIRED_TYPE_1: u64 = 190368000;
/// Only present in the second release.
pub const INSULIN_TREATED_TYPE_2: u64 = 237599002;

pub fn concepts() -> Vec<Concept> {
    let mut concepts: Vec<Concept> = [
        ROOT,
        CLINICAL_FINDING,
        FEVER,
        DISEASE,
        KIDNEY_DISEASE,
        DIABETES,
        TYPE_1,
        TYPE_2,
        DIABETIC_RENAL,
    ]
    .map(Concept::new)
    .to_vec();
    concepts.push(Concept::inactive(RETIRED_TYPE_1));
    concepts
}

pub fn relationships() -> Vec<Relationship> {
    let mut retired = Relationship::is_a(10, RETIRED_TYPE_1, DIABETES);
    retired.active = false;
    vec![
        Relationship::is_a(1, CLINICAL_FINDING, ROOT),
        Relationship::is_a(2, FEVER, CLINICAL_FINDING),
        Relationship::is_a(3, DISEASE, CLINICAL_FINDING),
        Relationship::is_a(4, KIDNEY_DISEASE, DISEASE),
        Relationship::is_a(5, DIABETES, DISEASE),
        Relationship::is_a(6, TYPE_1, DIABETES),
        Relationship::is_a(7, TYPE_2, DIABETES),
        Relationship::is_a(8, DIABETIC_RENAL, DIABETES),
        Relationship::is_a(9, DIABETIC_RENAL, KIDNEY_DISEASE),
        retired,
    ]
}

/// The first release.
pub fn release_1() -> SnapshotInput {
    SnapshotInput::new("20240101", concepts(), relationships())
}

/// The first release plus one new Type 2 subtype.
pub fn release_2() -> SnapshotInput {
    let mut concepts = concepts();
    concepts.push(Concept::new(INSULIN_TREATED_TYPE_2));
    let mut relationships = relationships();
    relationships.push(Relationship::is_a(11, INSULIN_TREATED_TYPE_2, TYPE_2));
    SnapshotInput::new("20240701", concepts, relationships)
}

/// The second release padded with `extra` leaf findings under Fever, which
/// makes its snapshot slow enough to build that readers overlap the rebuild.
pub fn large_release_2(extra: u64) -> SnapshotInput {
    let mut input = release_2();
    for i in 0..extra {
        input.concepts.push(Concept::new(PADDING_BASE + i));
        input
            .relationships
            .push(Relationship::is_a(PADDING_BASE + i, PADDING_BASE + i, FEVER));
    }
    input
}

/// First id used for padding concepts.
pub const PADDING_BASE: u64 = 900_000_000;

/// Members of `<< 73211009` in the first release, sorted.
pub const DIABETES_MEMBERS: [u64; 4] = [TYPE_2, TYPE_1, DIABETES, DIABETIC_RENAL];
