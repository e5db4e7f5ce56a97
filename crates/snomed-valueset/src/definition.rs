//! Versioned valueset definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ast::RuleExpr;
use crate::compose::Compose;
use crate::error::{RuleError, RuleResult};
use crate::parser::parse;

/// Stable identity of a valueset definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValuesetKey {
    /// Catalog identifier (e.g. `v_0` or a canonical URL).
    pub id: String,
    /// Definition version.
    pub version: String,
}

impl ValuesetKey {
    /// Creates a key.
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ValuesetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.id, self.version)
    }
}

/// SHA-256 of a rule's canonical rendering.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    /// Fingerprints a canonical rule string.
    pub fn of(canonical: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Returns the fingerprint as lowercase hex.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

/// An intensional valueset definition.
///
/// The canonical rule text and its fingerprint are computed once on
/// construction; the rule itself is immutable afterwards.
///
/// # Example
///
/// ```rust
/// use snomed_valueset::ValuesetDefinition;
///
/// let def = ValuesetDefinition::from_expression("diabetes", "1", "<< 73211009").unwrap();
/// assert_eq!(def.canonical(), "<< 73211009");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuesetDefinition {
    /// Identity.
    pub key: ValuesetKey,
    /// Optional human-readable title.
    pub title: Option<String>,
    rule: RuleExpr,
    canonical: String,
    fingerprint: Fingerprint,
}

impl ValuesetDefinition {
    /// Creates a definition from a parsed rule.
    pub fn new(key: ValuesetKey, rule: RuleExpr) -> Self {
        let canonical = rule.to_string();
        let fingerprint = Fingerprint::of(&canonical);
        Self {
            key,
            title: None,
            rule,
            canonical,
            fingerprint,
        }
    }

    /// Parses a definition from rule text.
    pub fn from_expression(
        id: impl Into<String>,
        version: impl Into<String>,
        expression: &str,
    ) -> RuleResult<Self> {
        Ok(Self::new(ValuesetKey::new(id, version), parse(expression)?))
    }

    /// Converts a definition from a FHIR compose block.
    ///
    /// Returns the definition and the non-SNOMED systems that were skipped.
    pub fn from_compose(
        id: impl Into<String>,
        version: impl Into<String>,
        compose: &Compose,
    ) -> RuleResult<(Self, Vec<String>)> {
        let converted = compose.to_rule()?;
        Ok((
            Self::new(ValuesetKey::new(id, version), converted.rule),
            converted.skipped_systems,
        ))
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// The rule defining membership.
    pub fn rule(&self) -> &RuleExpr {
        &self.rule
    }

    /// Canonical rule text.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Fingerprint of the canonical rule text.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

/// Rule source of a catalog record: either rule text or a FHIR compose block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleSource {
    /// Rule text, e.g. `<< 73211009`.
    Expression {
        /// The rule text.
        expression: String,
    },
    /// A FHIR compose block.
    Compose {
        /// The compose element.
        compose: Compose,
    },
}

/// A valueset definition as stored in a JSON catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionRecord {
    /// Catalog identifier.
    pub id: String,
    /// Definition version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Optional title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Rule source.
    #[serde(flatten)]
    pub source: RuleSource,
}

fn default_version() -> String {
    "1".to_string()
}

impl DefinitionRecord {
    /// Converts the record into a definition.
    pub fn into_definition(self) -> RuleResult<ValuesetDefinition> {
        let definition = match &self.source {
            RuleSource::Expression { expression } => {
                ValuesetDefinition::from_expression(self.id, self.version, expression)?
            }
            RuleSource::Compose { compose } => {
                ValuesetDefinition::from_compose(self.id, self.version, compose)?.0
            }
        };
        Ok(match self.title {
            Some(title) => definition.with_title(title),
            None => definition,
        })
    }
}

/// Loads a JSON array of [`DefinitionRecord`]s.
pub fn load_catalog_json(json: &str) -> RuleResult<Vec<ValuesetDefinition>> {
    let records: Vec<DefinitionRecord> =
        serde_json::from_str(json).map_err(|e| RuleError::InvalidDefinition(e.to_string()))?;
    records
        .into_iter()
        .map(DefinitionRecord::into_definition)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        assert_eq!(ValuesetKey::new("v_0", "2").to_string(), "v_0|2");
    }

    #[test]
    fn test_fingerprint_ignores_formatting() {
        let a = ValuesetDefinition::from_expression("a", "1", "<<1 |Diabetes| or 2").unwrap();
        let b = ValuesetDefinition::from_expression("b", "1", "<< 1 OR 2").unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = ValuesetDefinition::from_expression("c", "1", "<< 1 OR 3").unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_fingerprint_is_stored() {
        let def = ValuesetDefinition::from_expression("a", "1", "<< 1 MINUS 2").unwrap();
        assert_eq!(def.canonical(), "<< 1 MINUS 2");
        assert_eq!(def.fingerprint(), Fingerprint::of("<< 1 MINUS 2"));

        let titled = def.clone().with_title("A");
        assert_eq!(titled.fingerprint(), def.fingerprint());
        assert_eq!(titled.rule(), def.rule());
    }

    #[test]
    fn test_fingerprint_hex() {
        let hex = Fingerprint::of("<< 1").to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_load_catalog_json() {
        let json = r#"[
            {"id": "diabetes", "version": "2", "title": "Diabetes", "expression": "<< 73211009"},
            {"id": "v_0", "compose": {"include": [
                {"system": "http://snomed.info/sct", "filter": [{"property": "concept", "op": "is-a", "value": "223366009"}]}
            ]}}
        ]"#;

        let defs = load_catalog_json(json).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].key, ValuesetKey::new("diabetes", "2"));
        assert_eq!(defs[0].title.as_deref(), Some("Diabetes"));
        assert_eq!(defs[1].key.version, "1");
        assert_eq!(defs[1].canonical(), "<< 223366009");
    }

    #[test]
    fn test_load_catalog_rejects_bad_rule() {
        let json = r#"[{"id": "broken", "expression": "<< OR"}]"#;
        assert!(matches!(
            load_catalog_json(json),
            Err(RuleError::ParseError { .. })
        ));
    }

    #[test]
    fn test_load_catalog_rejects_bad_json() {
        assert!(matches!(
            load_catalog_json("{not json"),
            Err(RuleError::InvalidDefinition(_))
        ));
    }
}
