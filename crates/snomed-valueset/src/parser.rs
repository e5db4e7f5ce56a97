//! Valueset rule parser implementation using nom.
//!
//! The grammar is the subsumption subset of the SNOMED CT Expression
//! Constraint Language: concept references, hierarchy operators, the
//! wildcard, `AND`/`OR`/`MINUS` and parentheses. Refinements, filters and
//! member-of are not part of the rule language.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{all_consuming, map, opt, value},
    multi::fold_many0,
    sequence::{delimited, pair, preceded},
    IResult,
};

use crate::ast::{ConceptRef, RuleExpr};
use crate::error::{RuleError, RuleResult};
use crate::SctId;

/// Parse a valueset rule string.
///
/// # Examples
///
/// ```rust
/// use snomed_valueset::parse;
///
/// // Exactly one concept
/// let expr = parse("404684003").unwrap();
///
/// // With term
/// let expr = parse("404684003 |Clinical finding|").unwrap();
///
/// // Concept and descendants
/// let expr = parse("<< 404684003").unwrap();
///
/// // Compound expression
/// let expr = parse("<< 19829001 AND << 301867009").unwrap();
/// ```
pub fn parse(input: &str) -> RuleResult<RuleExpr> {
    let input = input.trim();
    if input.is_empty() {
        return Err(RuleError::EmptyExpression);
    }

    let depth = parenthesis_depth(input);
    if depth > MAX_RULE_DEPTH {
        return Err(RuleError::TooDeep {
            depth,
            limit: MAX_RULE_DEPTH,
        });
    }

    match all_consuming(expression)(input) {
        Ok((_, expr)) => {
            // Alternating operators nest one level per switch
            let depth = expr.depth();
            if depth > MAX_RULE_DEPTH {
                expr.dismantle();
                return Err(RuleError::TooDeep {
                    depth,
                    limit: MAX_RULE_DEPTH,
                });
            }
            Ok(expr)
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let position = input.len() - e.input.len();
            Err(RuleError::ParseError {
                position,
                message: format!("unexpected input at: '{}'", truncate(e.input, 20)),
            })
        }
        Err(nom::Err::Incomplete(_)) => Err(RuleError::Incomplete("expression".to_string())),
    }
}

/// Deepest nesting a rule may have, counting parentheses and operator switches.
pub const MAX_RULE_DEPTH: usize = 128;

/// Maximum parenthesis nesting, ignoring anything inside `|term|` labels.
fn parenthesis_depth(input: &str) -> usize {
    let mut depth = 0usize;
    let mut max = 0;
    let mut in_term = false;
    for c in input.chars() {
        match c {
            '|' => in_term = !in_term,
            '(' if !in_term => {
                depth += 1;
                max = max.max(depth);
            }
            ')' if !in_term => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}

/// Parses and re-renders a rule in canonical form.
///
/// Two rule strings that differ only in whitespace, operator case or
/// pipe-terms normalise to the same key.
pub fn normalize_expression(input: &str) -> RuleResult<String> {
    parse(input).map(|expr| expr.to_string())
}

fn truncate(s: &str, max_len: usize) -> &str {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ============================================================================
// Compound expressions
// ============================================================================

fn expression(input: &str) -> IResult<&str, RuleExpr> {
    delimited(ws, compound_expression, ws)(input)
}

fn compound_expression(input: &str) -> IResult<&str, RuleExpr> {
    let (input, first) = sub_expression(input)?;
    let mut first = Some(first);
    // Left associative, folded iteratively so long operator runs stay flat
    fold_many0(
        pair(compound_operator, preceded(ws, sub_expression)),
        move || first.take().unwrap_or(RuleExpr::Any),
        |left, (op, right)| match op {
            CompoundOp::And => RuleExpr::intersection(left, right),
            CompoundOp::Or => RuleExpr::union(left, right),
            CompoundOp::Minus => RuleExpr::difference(left, right),
        },
    )(input)
}

fn compound_operator(input: &str) -> IResult<&str, CompoundOp> {
    // Word operators need leading whitespace, the comma does not
    alt((
        preceded(mws, word_compound_operator),
        preceded(ws, comma_operator),
    ))(input)
}

#[derive(Debug, Clone, Copy)]
enum CompoundOp {
    And,
    Or,
    Minus,
}

fn word_compound_operator(input: &str) -> IResult<&str, CompoundOp> {
    alt((
        value(CompoundOp::And, tag_no_case("AND")),
        value(CompoundOp::Or, tag_no_case("OR")),
        value(CompoundOp::Minus, tag_no_case("MINUS")),
    ))(input)
}

fn comma_operator(input: &str) -> IResult<&str, CompoundOp> {
    value(CompoundOp::And, tag(","))(input)
}

// ============================================================================
// Sub-expressions
// ============================================================================

fn sub_expression(input: &str) -> IResult<&str, RuleExpr> {
    alt((
        map(
            delimited(
                pair(char('('), ws),
                compound_expression,
                pair(ws, char(')')),
            ),
            |inner| RuleExpr::Nested(Box::new(inner)),
        ),
        hierarchy_expression,
        value(RuleExpr::Any, char('*')),
        map(concept_reference, RuleExpr::Concept),
    ))(input)
}

#[derive(Debug, Clone, Copy)]
enum HierarchyOp {
    DescendantOf,
    DescendantOrSelfOf,
    ChildOf,
    AncestorOf,
    AncestorOrSelfOf,
}

fn hierarchy_operator(input: &str) -> IResult<&str, HierarchyOp> {
    alt((
        // Longer matches first
        value(HierarchyOp::DescendantOrSelfOf, tag("<<")),
        value(HierarchyOp::ChildOf, tag("<!")),
        value(HierarchyOp::DescendantOf, tag("<")),
        value(HierarchyOp::AncestorOrSelfOf, tag(">>")),
        value(HierarchyOp::AncestorOf, tag(">")),
    ))(input)
}

fn hierarchy_expression(input: &str) -> IResult<&str, RuleExpr> {
    let (input, op) = hierarchy_operator(input)?;
    let (input, _) = ws(input)?;
    let (input, concept) = concept_reference(input)?;

    let expr = match op {
        HierarchyOp::DescendantOf => RuleExpr::DescendantOf(concept),
        HierarchyOp::DescendantOrSelfOf => RuleExpr::DescendantOrSelfOf(concept),
        HierarchyOp::ChildOf => RuleExpr::ChildOf(concept),
        HierarchyOp::AncestorOf => RuleExpr::AncestorOf(concept),
        HierarchyOp::AncestorOrSelfOf => RuleExpr::AncestorOrSelfOf(concept),
    };
    Ok((input, expr))
}

// ============================================================================
// Concept references
// ============================================================================

fn concept_reference(input: &str) -> IResult<&str, ConceptRef> {
    let (input, id) = sct_id(input)?;
    let (input, term) = opt(preceded(ws, term_in_pipes))(input)?;
    Ok((input, ConceptRef { id, term }))
}

fn sct_id(input: &str) -> IResult<&str, SctId> {
    let (rest, digits) = digit1(input)?;
    match digits.parse::<SctId>() {
        Ok(id) => Ok((rest, id)),
        Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        ))),
    }
}

fn term_in_pipes(input: &str) -> IResult<&str, String> {
    let (input, _) = char('|')(input)?;
    let (input, term) = take_while(|c| c != '|')(input)?;
    let (input, _) = char('|')(input)?;
    Ok((input, term.trim().to_string()))
}

// ============================================================================
// Whitespace handling
// ============================================================================

/// Optional whitespace
fn ws(input: &str) -> IResult<&str, &str> {
    multispace0(input)
}

/// Mandatory whitespace
fn mws(input: &str) -> IResult<&str, &str> {
    multispace1(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept_id(expr: &RuleExpr) -> SctId {
        match expr {
            RuleExpr::Concept(c)
            | RuleExpr::DescendantOf(c)
            | RuleExpr::DescendantOrSelfOf(c)
            | RuleExpr::ChildOf(c)
            | RuleExpr::AncestorOf(c)
            | RuleExpr::AncestorOrSelfOf(c) => c.id,
            other => panic!("Expected primitive, got {:?}", other),
        }
    }

    #[test]
    fn test_self_concept() {
        let expr = parse("404684003").unwrap();
        assert_eq!(expr, RuleExpr::Concept(ConceptRef::new(404684003)));
    }

    #[test]
    fn test_self_concept_with_term() {
        let expr = parse("404684003 |Clinical finding|").unwrap();
        match expr {
            RuleExpr::Concept(c) => {
                assert_eq!(c.id, 404684003);
                assert_eq!(c.term.as_deref(), Some("Clinical finding"));
            }
            other => panic!("Expected Concept, got {:?}", other),
        }
    }

    #[test]
    fn test_hierarchy_operators() {
        let cases = [
            ("< 1", "DescendantOf"),
            ("<< 1", "DescendantOrSelfOf"),
            ("<! 1", "ChildOf"),
            ("> 1", "AncestorOf"),
            (">> 1", "AncestorOrSelfOf"),
        ];
        for (input, name) in cases {
            let expr = parse(input).unwrap();
            assert_eq!(concept_id(&expr), 1);
            assert!(format!("{:?}", expr).starts_with(name), "{input} -> {expr:?}");
        }
    }

    #[test]
    fn test_operator_without_space() {
        assert!(matches!(parse("<<73211009").unwrap(), RuleExpr::DescendantOrSelfOf(_)));
        assert!(matches!(parse("<73211009").unwrap(), RuleExpr::DescendantOf(_)));
    }

    #[test]
    fn test_wildcard() {
        assert_eq!(parse("*").unwrap(), RuleExpr::Any);
    }

    #[test]
    fn test_left_associative() {
        let expr = parse("<< 1 OR << 2 MINUS 3").unwrap();
        match expr {
            RuleExpr::Difference(left, right) => {
                assert!(matches!(*left, RuleExpr::Union(ref operands) if operands.len() == 2));
                assert_eq!(right, vec![RuleExpr::Concept(ConceptRef::new(3))]);
            }
            other => panic!("Expected Difference, got {:?}", other),
        }
    }

    #[test]
    fn test_explicit_grouping() {
        let expr = parse("<< 1 MINUS (<< 2 OR 3)").unwrap();
        match expr {
            RuleExpr::Difference(_, right) => match &right[..] {
                [RuleExpr::Nested(inner)] => assert!(matches!(**inner, RuleExpr::Union(_))),
                other => panic!("Expected Nested, got {:?}", other),
            },
            other => panic!("Expected Difference, got {:?}", other),
        }
    }

    #[test]
    fn test_comma_is_intersection() {
        let expr = parse("<< 1, << 2").unwrap();
        assert!(matches!(expr, RuleExpr::Intersection(_)));
    }

    #[test]
    fn test_case_insensitive_operators() {
        let expr = parse("<< 1 or << 2 minus 3 and 4").unwrap();
        assert_eq!(expr.to_string(), "<< 1 OR << 2 MINUS 3 AND 4");
    }

    #[test]
    fn test_normalize_expression() {
        assert_eq!(
            normalize_expression("  <<73211009 |Diabetes|   or   <  2 ").unwrap(),
            "<< 73211009 OR < 2"
        );
        assert_eq!(
            normalize_expression("(<<1 minus 2)").unwrap(),
            normalize_expression("( << 1  MINUS 2 )").unwrap()
        );
    }

    #[test]
    fn test_display_roundtrip_is_stable() {
        let inputs = ["<< 1 MINUS (2 OR <! 3)", "* MINUS >> 5", "(1 OR 2) AND << 3"];
        for input in inputs {
            let once = parse(input).unwrap().to_string();
            let twice = parse(&once).unwrap().to_string();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_empty_expression() {
        assert_eq!(parse("   "), Err(RuleError::EmptyExpression));
    }

    #[test]
    fn test_trailing_operator_is_error() {
        assert!(matches!(parse("<< 1 OR"), Err(RuleError::ParseError { .. })));
    }

    #[test]
    fn test_unbalanced_parenthesis() {
        assert!(parse("(<< 1 OR 2").is_err());
        assert!(parse("<< 1)").is_err());
    }

    #[test]
    fn test_error_position() {
        match parse("<< 1 XOR 2") {
            // Trailing whitespace after the last complete rule is consumed
            Err(RuleError::ParseError { position, .. }) => assert_eq!(position, 5),
            other => panic!("Expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_id_overflow_rejected() {
        assert!(parse("99999999999999999999999").is_err());
    }

    #[test]
    fn test_long_or_chain_is_flat() {
        let text = (1..=100_000).map(|id| id.to_string()).collect::<Vec<_>>().join(" OR ");
        let expr = parse(&text).unwrap();
        match &expr {
            RuleExpr::Union(operands) => assert_eq!(operands.len(), 100_000),
            other => panic!("Expected Union, got {}", other),
        }
        assert_eq!(expr.to_string(), text);
    }

    #[test]
    fn test_long_minus_chain_is_flat() {
        let text = (1..=5_000).map(|id| format!("<< {id}")).collect::<Vec<_>>().join(" MINUS ");
        let expr = parse(&text).unwrap();
        assert_eq!(expr.depth(), 2);
    }

    #[test]
    fn test_deep_parentheses_rejected() {
        let depth = MAX_RULE_DEPTH + 1;
        let text = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(
            parse(&text),
            Err(RuleError::TooDeep {
                depth,
                limit: MAX_RULE_DEPTH
            })
        );

        // Parentheses inside terms do not count
        let term = "(".repeat(depth);
        assert!(parse(&format!("1 |{term}|")).is_ok());
    }

    #[test]
    fn test_alternating_operators_rejected_past_limit() {
        let mut text = "1".to_string();
        for i in 0..MAX_RULE_DEPTH {
            text.push_str(if i % 2 == 0 { " OR 2" } else { " MINUS 3" });
        }
        assert!(matches!(parse(&text), Err(RuleError::TooDeep { .. })));
    }

    #[test]
    fn test_long_alternating_chain_rejected() {
        let mut text = "1".to_string();
        for _ in 0..50_000 {
            text.push_str(" OR 2 AND 3");
        }
        match parse(&text) {
            Err(RuleError::TooDeep { depth, limit }) => {
                assert_eq!(limit, MAX_RULE_DEPTH);
                assert_eq!(depth, 100_001);
            }
            other => panic!("Expected TooDeep, got {:?}", other),
        }
    }
}
