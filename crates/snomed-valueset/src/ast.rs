//! Abstract syntax tree for valueset rules.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::SctId;

/// A reference to a single concept, with an optional human-readable term.
///
/// The term is a label only: it never takes part in evaluation, rendering
/// or fingerprinting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConceptRef {
    /// The SNOMED CT concept ID.
    pub id: SctId,
    /// Optional term/label in pipe notation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
}

impl ConceptRef {
    /// Creates a reference without a term.
    pub fn new(id: SctId) -> Self {
        Self { id, term: None }
    }

    /// Creates a reference with a term.
    pub fn with_term(id: SctId, term: impl Into<String>) -> Self {
        Self {
            id,
            term: Some(term.into()),
        }
    }
}

/// An intensional valueset rule.
///
/// Composite operators share one precedence and associate left to right:
/// `A OR B MINUS C` is `(A OR B) MINUS C`. Runs of the same operator are
/// stored flat, so a rule enumerating thousands of concepts is one
/// [`RuleExpr::Union`] rather than a chain thousands of levels deep.
/// [`RuleExpr::Nested`] records explicit grouping.
///
/// Build composites through [`RuleExpr::union`], [`RuleExpr::intersection`]
/// and [`RuleExpr::difference`], which keep the flat shape.
///
/// # Examples
///
/// ```rust
/// use snomed_valueset::{parse, RuleExpr};
///
/// let expr = parse("73211009").unwrap();
/// assert!(matches!(expr, RuleExpr::Concept(_)));
///
/// let expr = parse("<< 73211009").unwrap();
/// assert!(matches!(expr, RuleExpr::DescendantOrSelfOf(_)));
///
/// let expr = parse("1 OR 2 OR 3").unwrap();
/// assert!(matches!(expr, RuleExpr::Union(ref operands) if operands.len() == 3));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleExpr {
    /// Exactly one concept.
    /// Example: `404684003 |Clinical finding|`
    Concept(ConceptRef),

    /// Descendants of a concept, excluding the concept itself.
    /// Syntax: `< conceptReference`
    DescendantOf(ConceptRef),

    /// A concept and all of its descendants.
    /// Syntax: `<< conceptReference`
    DescendantOrSelfOf(ConceptRef),

    /// Direct children of a concept.
    /// Syntax: `<! conceptReference`
    ChildOf(ConceptRef),

    /// Ancestors of a concept, excluding the concept itself.
    /// Syntax: `> conceptReference`
    AncestorOf(ConceptRef),

    /// A concept and all of its ancestors.
    /// Syntax: `>> conceptReference`
    AncestorOrSelfOf(ConceptRef),

    /// Every concept in the snapshot.
    /// Syntax: `*`
    Any,

    /// Set union of all operands.
    /// Syntax: `expression OR expression OR ...`
    Union(Vec<RuleExpr>),

    /// Set intersection of all operands.
    /// Syntax: `expression AND expression` or `expression , expression`
    Intersection(Vec<RuleExpr>),

    /// The first expression minus each of the others in turn.
    /// Syntax: `expression MINUS expression MINUS ...`
    Difference(Box<RuleExpr>, Vec<RuleExpr>),

    /// Parenthesised sub-expression.
    Nested(Box<RuleExpr>),
}

impl RuleExpr {
    /// Builds `left OR right`, extending an existing union.
    pub fn union(left: RuleExpr, right: RuleExpr) -> Self {
        let mut operands = match left {
            Self::Union(operands) => operands,
            other => vec![other],
        };
        match right {
            Self::Union(more) => operands.extend(more),
            other => operands.push(other),
        }
        Self::Union(operands)
    }

    /// Builds `left AND right`, extending an existing intersection.
    pub fn intersection(left: RuleExpr, right: RuleExpr) -> Self {
        let mut operands = match left {
            Self::Intersection(operands) => operands,
            other => vec![other],
        };
        match right {
            Self::Intersection(more) => operands.extend(more),
            other => operands.push(other),
        }
        Self::Intersection(operands)
    }

    /// Builds `left MINUS right`. `(A MINUS B) MINUS C` stays one difference.
    pub fn difference(left: RuleExpr, right: RuleExpr) -> Self {
        match left {
            Self::Difference(base, mut subtrahends) => {
                subtrahends.push(right);
                Self::Difference(base, subtrahends)
            }
            other => Self::Difference(Box::new(other), vec![right]),
        }
    }

    /// Wraps the expression in explicit grouping unless it is already atomic.
    pub fn grouped(self) -> Self {
        match self {
            Self::Union(..) | Self::Intersection(..) | Self::Difference(..) => {
                Self::Nested(Box::new(self))
            }
            other => other,
        }
    }

    /// Combines a list of rules into one flat union.
    ///
    /// Returns `None` for an empty list and the rule itself for a single one.
    pub fn union_all<I: IntoIterator<Item = RuleExpr>>(rules: I) -> Option<Self> {
        let mut operands = Vec::new();
        for rule in rules {
            match rule {
                Self::Union(more) => operands.extend(more),
                other => operands.push(other),
            }
        }
        match operands.len() {
            0 => None,
            1 => operands.pop(),
            _ => Some(Self::Union(operands)),
        }
    }

    /// Returns every concept ID referenced by the rule, in first-seen order.
    pub fn concept_ids(&self) -> Vec<SctId> {
        let mut ids = Vec::new();
        let mut seen = HashSet::new();
        self.collect_ids(&mut ids, &mut seen);
        ids
    }

    fn collect_ids(&self, out: &mut Vec<SctId>, seen: &mut HashSet<SctId>) {
        match self {
            Self::Concept(c)
            | Self::DescendantOf(c)
            | Self::DescendantOrSelfOf(c)
            | Self::ChildOf(c)
            | Self::AncestorOf(c)
            | Self::AncestorOrSelfOf(c) => {
                if seen.insert(c.id) {
                    out.push(c.id);
                }
            }
            Self::Any => {}
            Self::Union(operands) | Self::Intersection(operands) => {
                for operand in operands {
                    operand.collect_ids(out, seen);
                }
            }
            Self::Difference(base, subtrahends) => {
                base.collect_ids(out, seen);
                for operand in subtrahends {
                    operand.collect_ids(out, seen);
                }
            }
            Self::Nested(inner) => inner.collect_ids(out, seen),
        }
    }

    /// Returns true if the rule is a single concept or hierarchy primitive.
    pub fn is_primitive(&self) -> bool {
        !matches!(
            self,
            Self::Union(..) | Self::Intersection(..) | Self::Difference(..) | Self::Nested(_)
        )
    }

    /// Nesting depth of the tree; primitives are depth 1.
    ///
    /// Walks with an explicit stack, so it is safe on any input.
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self, 1)];
        while let Some((expr, depth)) = stack.pop() {
            max = max.max(depth);
            match expr {
                Self::Union(operands) | Self::Intersection(operands) => {
                    stack.extend(operands.iter().map(|o| (o, depth + 1)));
                }
                Self::Difference(base, subtrahends) => {
                    stack.push((base, depth + 1));
                    stack.extend(subtrahends.iter().map(|o| (o, depth + 1)));
                }
                Self::Nested(inner) => stack.push((inner, depth + 1)),
                _ => {}
            }
        }
        max
    }

    /// Drops the rule without recursing, however deep it nests.
    pub(crate) fn dismantle(self) {
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Self::Union(operands) | Self::Intersection(operands) => stack.extend(operands),
                Self::Difference(base, subtrahends) => {
                    stack.push(*base);
                    stack.extend(subtrahends);
                }
                Self::Nested(inner) => stack.push(*inner),
                _ => {}
            }
        }
    }
}

/// Writes `first OP rest[0] OP rest[1] ...`. Operands after the first are
/// parenthesised when composite, since the grammar folds to the left.
fn write_chain<'a>(
    f: &mut fmt::Formatter<'_>,
    first: &RuleExpr,
    rest: impl IntoIterator<Item = &'a RuleExpr>,
    op: &str,
) -> fmt::Result {
    write!(f, "{}", first)?;
    for operand in rest {
        if operand.is_primitive() || matches!(operand, RuleExpr::Nested(_)) {
            write!(f, " {} {}", op, operand)?;
        } else {
            write!(f, " {} ({})", op, operand)?;
        }
    }
    Ok(())
}

/// Canonical rendering: terms dropped, single spaces, explicit grouping kept.
impl fmt::Display for RuleExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concept(c) => write!(f, "{}", c.id),
            Self::DescendantOf(c) => write!(f, "< {}", c.id),
            Self::DescendantOrSelfOf(c) => write!(f, "<< {}", c.id),
            Self::ChildOf(c) => write!(f, "<! {}", c.id),
            Self::AncestorOf(c) => write!(f, "> {}", c.id),
            Self::AncestorOrSelfOf(c) => write!(f, ">> {}", c.id),
            Self::Any => write!(f, "*"),
            Self::Union(operands) | Self::Intersection(operands) => {
                let op = if matches!(self, Self::Union(_)) { "OR" } else { "AND" };
                match operands.split_first() {
                    Some((first, rest)) => write_chain(f, first, rest, op),
                    None => Ok(()),
                }
            }
            Self::Difference(base, subtrahends) => write_chain(f, base, subtrahends, "MINUS"),
            Self::Nested(inner) => write!(f, "({})", inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_drops_terms() {
        let expr = RuleExpr::DescendantOrSelfOf(ConceptRef::with_term(73211009, "Diabetes"));
        assert_eq!(expr.to_string(), "<< 73211009");
    }

    #[test]
    fn test_display_composite() {
        let expr = RuleExpr::difference(
            RuleExpr::DescendantOrSelfOf(ConceptRef::new(1)),
            RuleExpr::union(
                RuleExpr::Concept(ConceptRef::new(2)),
                RuleExpr::ChildOf(ConceptRef::new(3)),
            )
            .grouped(),
        );
        assert_eq!(expr.to_string(), "<< 1 MINUS (2 OR <! 3)");
    }

    #[test]
    fn test_concept_ids_deduplicated() {
        let expr = RuleExpr::union(
            RuleExpr::DescendantOrSelfOf(ConceptRef::new(1)),
            RuleExpr::difference(
                RuleExpr::Concept(ConceptRef::new(2)),
                RuleExpr::AncestorOf(ConceptRef::new(1)),
            ),
        );
        assert_eq!(expr.concept_ids(), vec![1, 2]);
    }

    #[test]
    fn test_grouped_leaves_primitives_alone() {
        let primitive = RuleExpr::Concept(ConceptRef::new(5));
        assert_eq!(primitive.clone().grouped(), primitive);
        assert!(primitive.is_primitive());

        let composite = RuleExpr::union(primitive.clone(), RuleExpr::Any).grouped();
        assert!(matches!(composite, RuleExpr::Nested(_)));
    }

    #[test]
    fn test_union_all() {
        assert!(RuleExpr::union_all(Vec::new()).is_none());

        let rule = RuleExpr::union_all(vec![
            RuleExpr::Concept(ConceptRef::new(1)),
            RuleExpr::Concept(ConceptRef::new(2)),
            RuleExpr::Concept(ConceptRef::new(3)),
        ])
        .unwrap();
        assert_eq!(rule.to_string(), "1 OR 2 OR 3");
    }

    #[test]
    fn test_same_operator_runs_stay_flat() {
        let c = |id| RuleExpr::Concept(ConceptRef::new(id));
        let union = RuleExpr::union(RuleExpr::union(c(1), c(2)), RuleExpr::union(c(3), c(4)));
        assert_eq!(union, RuleExpr::Union(vec![c(1), c(2), c(3), c(4)]));

        let diff = RuleExpr::difference(RuleExpr::difference(c(1), c(2)), c(3));
        assert_eq!(diff, RuleExpr::Difference(Box::new(c(1)), vec![c(2), c(3)]));
        assert_eq!(diff.to_string(), "1 MINUS 2 MINUS 3");
    }

    #[test]
    fn test_composite_right_operand_is_parenthesised() {
        let c = |id| RuleExpr::Concept(ConceptRef::new(id));
        let expr = RuleExpr::difference(c(1), RuleExpr::union(c(2), c(3)));
        assert_eq!(expr.to_string(), "1 MINUS (2 OR 3)");

        // Left operands fold naturally and need no grouping
        let expr = RuleExpr::intersection(RuleExpr::union(c(1), c(2)), c(3));
        assert_eq!(expr.to_string(), "1 OR 2 AND 3");
    }

    #[test]
    fn test_large_enumeration_is_shallow() {
        let rule = RuleExpr::union_all((1..=100_000).map(|id| RuleExpr::Concept(ConceptRef::new(id)))).unwrap();
        assert_eq!(rule.depth(), 2);
        assert_eq!(rule.concept_ids().len(), 100_000);

        let text = rule.to_string();
        assert!(text.starts_with("1 OR 2 OR 3"));
        assert!(text.ends_with("OR 100000"));
        drop(rule);
    }

    #[test]
    fn test_union_all_single_rule() {
        let only = RuleExpr::DescendantOf(ConceptRef::new(9));
        assert_eq!(RuleExpr::union_all([only.clone()]), Some(only));
    }
}
