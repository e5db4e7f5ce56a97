//! FHIR `ValueSet.compose` support.
//!
//! Catalog sources commonly publish valuesets as FHIR compose blocks:
//!
//! ```json
//! {
//!   "include": [
//!     { "system": "http://snomed.info/sct",
//!       "filter": [{ "property": "concept", "op": "is-a", "value": "404684003" }] },
//!     { "system": "http://snomed.info/sct",
//!       "concept": [{ "code": "53075003", "display": "Distal phalanx of hallux" }] }
//!   ],
//!   "exclude": []
//! }
//! ```
//!
//! [`Compose::to_rule`] converts such a block into a [`RuleExpr`]:
//! every include set contributes the union of its concepts and filters, and
//! the union of all exclude sets is subtracted from the union of all includes.

use serde::{Deserialize, Serialize};

use crate::ast::{ConceptRef, RuleExpr};
use crate::error::{RuleError, RuleResult};
use crate::SctId;

/// Code system URI for SNOMED CT.
pub const SNOMED_SYSTEM: &str = "http://snomed.info/sct";

/// A FHIR `ValueSet.compose` element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Compose {
    /// Sets whose members are included.
    #[serde(default)]
    pub include: Vec<ComposeSet>,
    /// Sets whose members are removed from the includes.
    #[serde(default)]
    pub exclude: Vec<ComposeSet>,
}

/// A single include or exclude set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeSet {
    /// Code system URI. Missing means SNOMED CT.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Explicitly enumerated concepts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concept: Vec<ComposeConcept>,
    /// Property filters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<ComposeFilter>,
}

/// An enumerated concept in a compose set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeConcept {
    /// Concept code (an SCTID for SNOMED CT).
    pub code: String,
    /// Optional display term.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// A property filter in a compose set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeFilter {
    /// Filtered property. Only `concept` is supported.
    pub property: String,
    /// Filter operator: `is-a`, `descendent-of` or `=`.
    pub op: String,
    /// Filter value (an SCTID).
    pub value: String,
}

/// Result of converting a compose block.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeRule {
    /// The converted rule.
    pub rule: RuleExpr,
    /// Systems whose sets were skipped because they are not SNOMED CT.
    pub skipped_systems: Vec<String>,
}

impl Compose {
    /// Parses a compose block from JSON text.
    pub fn from_json(json: &str) -> RuleResult<Self> {
        serde_json::from_str(json).map_err(|e| RuleError::InvalidDefinition(e.to_string()))
    }

    /// Converts the compose block into a single rule.
    ///
    /// # Errors
    ///
    /// - [`RuleError::EmptyCompose`] if no SNOMED CT include set remains
    /// - [`RuleError::UnsupportedFilter`] for non-subsumption filters
    /// - [`RuleError::InvalidConceptId`] for codes that are not SCTIDs
    pub fn to_rule(&self) -> RuleResult<ComposeRule> {
        let mut skipped_systems = Vec::new();

        let include = Self::union_of(&self.include, &mut skipped_systems)?
            .ok_or(RuleError::EmptyCompose)?;
        let exclude = Self::union_of(&self.exclude, &mut skipped_systems)?;

        let rule = match exclude {
            Some(exclude) => RuleExpr::difference(include.grouped(), exclude.grouped()),
            None => include,
        };

        skipped_systems.sort();
        skipped_systems.dedup();

        Ok(ComposeRule {
            rule,
            skipped_systems,
        })
    }

    fn union_of(
        sets: &[ComposeSet],
        skipped_systems: &mut Vec<String>,
    ) -> RuleResult<Option<RuleExpr>> {
        let mut rules = Vec::new();
        for set in sets {
            if !set.is_snomed() {
                if let Some(system) = &set.system {
                    skipped_systems.push(system.clone());
                }
                continue;
            }
            if let Some(rule) = set.to_rule()? {
                rules.push(rule.grouped());
            }
        }
        Ok(RuleExpr::union_all(rules))
    }
}

impl ComposeSet {
    /// Returns true if the set targets SNOMED CT (or names no system).
    pub fn is_snomed(&self) -> bool {
        self.system.as_deref().map_or(true, |s| s == SNOMED_SYSTEM)
    }

    /// Converts the set into the union of its concepts and filters.
    ///
    /// Returns `None` when the set enumerates nothing.
    pub fn to_rule(&self) -> RuleResult<Option<RuleExpr>> {
        let mut rules = Vec::with_capacity(self.concept.len() + self.filter.len());

        for concept in &self.concept {
            let id = parse_code(&concept.code)?;
            rules.push(RuleExpr::Concept(ConceptRef {
                id,
                term: concept.display.clone(),
            }));
        }

        for filter in &self.filter {
            rules.push(filter.to_rule()?);
        }

        Ok(RuleExpr::union_all(rules))
    }
}

impl ComposeFilter {
    /// Converts a concept filter into a hierarchy rule.
    pub fn to_rule(&self) -> RuleResult<RuleExpr> {
        if self.property != "concept" {
            return Err(self.unsupported());
        }
        let wrap: fn(ConceptRef) -> RuleExpr = match self.op.as_str() {
            "is-a" => RuleExpr::DescendantOrSelfOf,
            "descendent-of" => RuleExpr::DescendantOf,
            "=" => RuleExpr::Concept,
            _ => return Err(self.unsupported()),
        };
        // Only supported operators get their value read as an SCTID
        Ok(wrap(ConceptRef::new(parse_code(&self.value)?)))
    }

    fn unsupported(&self) -> RuleError {
        RuleError::UnsupportedFilter {
            property: self.property.clone(),
            op: self.op.clone(),
        }
    }
}

fn parse_code(code: &str) -> RuleResult<SctId> {
    code.trim()
        .parse::<SctId>()
        .map_err(|_| RuleError::InvalidConceptId(code.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_a(value: &str) -> ComposeFilter {
        ComposeFilter {
            property: "concept".to_string(),
            op: "is-a".to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_single_is_a_filter() {
        let compose = Compose {
            include: vec![ComposeSet {
                system: Some(SNOMED_SYSTEM.to_string()),
                filter: vec![is_a("404684003")],
                ..Default::default()
            }],
            exclude: vec![],
        };

        let converted = compose.to_rule().unwrap();
        assert_eq!(converted.rule.to_string(), "<< 404684003");
        assert!(converted.skipped_systems.is_empty());
    }

    #[test]
    fn test_includes_and_excludes() {
        let compose = Compose::from_json(
            r#"{
                "include": [
                    {"system": "http://snomed.info/sct", "filter": [{"property": "concept", "op": "is-a", "value": "1"}]},
                    {"system": "http://snomed.info/sct", "concept": [{"code": "7", "display": "Seven"}, {"code": "8"}]}
                ],
                "exclude": [
                    {"system": "http://snomed.info/sct", "filter": [{"property": "concept", "op": "descendent-of", "value": "2"}]}
                ]
            }"#,
        )
        .unwrap();

        let converted = compose.to_rule().unwrap();
        assert_eq!(converted.rule.to_string(), "(<< 1 OR (7 OR 8)) MINUS < 2");
        assert_eq!(converted.rule.concept_ids(), vec![1, 7, 8, 2]);
    }

    #[test]
    fn test_non_snomed_sets_are_skipped() {
        let compose = Compose::from_json(
            r#"{
                "include": [
                    {"system": "http://loinc.org", "concept": [{"code": "1234-5"}]},
                    {"filter": [{"property": "concept", "op": "is-a", "value": "3"}]}
                ]
            }"#,
        )
        .unwrap();

        let converted = compose.to_rule().unwrap();
        assert_eq!(converted.rule.to_string(), "<< 3");
        assert_eq!(converted.skipped_systems, vec!["http://loinc.org".to_string()]);
    }

    #[test]
    fn test_empty_compose() {
        let compose = Compose::default();
        assert_eq!(compose.to_rule(), Err(RuleError::EmptyCompose));
    }

    #[test]
    fn test_unsupported_filter() {
        let set = ComposeSet {
            filter: vec![ComposeFilter {
                property: "concept".to_string(),
                op: "regex".to_string(),
                value: ".*".to_string(),
            }],
            ..Default::default()
        };
        assert_eq!(
            set.to_rule(),
            Err(RuleError::UnsupportedFilter {
                property: "concept".to_string(),
                op: "regex".to_string(),
            })
        );
    }

    #[test]
    fn test_supported_filter_with_bad_value() {
        let filter = ComposeFilter {
            property: "concept".to_string(),
            op: "is-a".to_string(),
            value: "diabetes".to_string(),
        };
        assert_eq!(
            filter.to_rule(),
            Err(RuleError::InvalidConceptId("diabetes".to_string()))
        );
    }

    #[test]
    fn test_large_enumeration() {
        let set = ComposeSet {
            concept: (1..=100_000)
                .map(|id: u64| ComposeConcept {
                    code: id.to_string(),
                    display: None,
                })
                .collect(),
            ..Default::default()
        };
        let compose = Compose {
            include: vec![set],
            ..Default::default()
        };
        let rule = compose.to_rule().unwrap().rule;
        assert!(rule.depth() <= 3);
        assert_eq!(rule.concept_ids().len(), 100_000);
    }

    #[test]
    fn test_invalid_code() {
        let set = ComposeSet {
            concept: vec![ComposeConcept {
                code: "abc".to_string(),
                display: None,
            }],
            ..Default::default()
        };
        assert_eq!(
            set.to_rule(),
            Err(RuleError::InvalidConceptId("abc".to_string()))
        );
    }
}
