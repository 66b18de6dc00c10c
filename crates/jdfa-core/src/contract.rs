//! Method contract clauses.
//!
//! A contract is a `;`-separated list of clauses. Each clause maps a tuple of
//! parameter constraints to a return outcome:
//!
//! ```text
//! _, null -> false; null, _ -> false; !null, !null -> true
//! ```
//!
//! Parameter constraints are `_`, `null`, `!null`, `true` and `false`.
//! Outcomes are the same tokens plus `fail` (the method throws), `this`,
//! `new` (a fresh non-null object) and `paramN` (returns its N-th argument,
//! 1-based). Clauses are evaluated first-match.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::JType;

/// Constraint on one argument of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueConstraint {
    Any,
    Null,
    NotNull,
    True,
    False,
}

impl ValueConstraint {
    pub fn token(self) -> &'static str {
        match self {
            ValueConstraint::Any => "_",
            ValueConstraint::Null => "null",
            ValueConstraint::NotNull => "!null",
            ValueConstraint::True => "true",
            ValueConstraint::False => "false",
        }
    }

    pub fn from_token(token: &str) -> Option<ValueConstraint> {
        match token {
            "_" => Some(ValueConstraint::Any),
            "null" => Some(ValueConstraint::Null),
            "!null" => Some(ValueConstraint::NotNull),
            "true" => Some(ValueConstraint::True),
            "false" => Some(ValueConstraint::False),
            _ => None,
        }
    }

    /// The complementary constraint; `Any` has none.
    pub fn negate(self) -> Option<ValueConstraint> {
        match self {
            ValueConstraint::Any => None,
            ValueConstraint::Null => Some(ValueConstraint::NotNull),
            ValueConstraint::NotNull => Some(ValueConstraint::Null),
            ValueConstraint::True => Some(ValueConstraint::False),
            ValueConstraint::False => Some(ValueConstraint::True),
        }
    }

    /// Both constraints at once; `None` when they exclude each other.
    pub fn meet(self, other: ValueConstraint) -> Option<ValueConstraint> {
        match (self, other) {
            (ValueConstraint::Any, x) | (x, ValueConstraint::Any) => Some(x),
            (a, b) if a == b => Some(a),
            _ => None,
        }
    }

    /// Returns `true` for `null` and `!null`.
    pub fn is_nullness(self) -> bool {
        matches!(self, ValueConstraint::Null | ValueConstraint::NotNull)
    }

    /// Returns `true` for `true` and `false`.
    pub fn is_boolean(self) -> bool {
        matches!(self, ValueConstraint::True | ValueConstraint::False)
    }

    /// Returns `true` if a value of type `ty` can satisfy the constraint
    /// without conversion.
    pub fn can_be_applied_to(self, ty: &JType) -> bool {
        match self {
            ValueConstraint::Any => true,
            ValueConstraint::Null | ValueConstraint::NotNull => !ty.is_primitive(),
            ValueConstraint::True | ValueConstraint::False => ty.is_boolean_like(),
        }
    }
}

impl fmt::Display for ValueConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// What a call returns when a clause applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnOutcome {
    Any,
    Null,
    NotNull,
    True,
    False,
    /// The call throws.
    Fail,
    This,
    New,
    /// Returns the argument at this 0-based index.
    Parameter(usize),
}

impl ReturnOutcome {
    pub fn from_token(token: &str) -> Option<ReturnOutcome> {
        match token {
            "fail" => Some(ReturnOutcome::Fail),
            "this" => Some(ReturnOutcome::This),
            "new" => Some(ReturnOutcome::New),
            "_" => Some(ReturnOutcome::Any),
            "null" => Some(ReturnOutcome::Null),
            "!null" => Some(ReturnOutcome::NotNull),
            "true" => Some(ReturnOutcome::True),
            "false" => Some(ReturnOutcome::False),
            _ => {
                let n: usize = token.strip_prefix("param")?.parse().ok()?;
                n.checked_sub(1).map(ReturnOutcome::Parameter)
            }
        }
    }

    /// Returns `true` if the outcome says something about the return value.
    pub fn is_informative(self) -> bool {
        self != ReturnOutcome::Any
    }
}

impl fmt::Display for ReturnOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnOutcome::Any => f.write_str("_"),
            ReturnOutcome::Null => f.write_str("null"),
            ReturnOutcome::NotNull => f.write_str("!null"),
            ReturnOutcome::True => f.write_str("true"),
            ReturnOutcome::False => f.write_str("false"),
            ReturnOutcome::Fail => f.write_str("fail"),
            ReturnOutcome::This => f.write_str("this"),
            ReturnOutcome::New => f.write_str("new"),
            ReturnOutcome::Parameter(i) => write!(f, "param{}", i + 1),
        }
    }
}

/// One `constraints -> outcome` clause.
///
/// Serializes as its clause text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StandardMethodContract {
    pub constraints: Vec<ValueConstraint>,
    pub outcome: ReturnOutcome,
}

/// Malformed contract text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    /// Index of the offending clause.
    pub clause_index: usize,
    pub parameter_index: Option<usize>,
    /// Byte range of the offending text within the whole contract string.
    pub text_range: Option<Range<usize>>,
}

impl StandardMethodContract {
    pub fn new(constraints: Vec<ValueConstraint>, outcome: ReturnOutcome) -> Self {
        StandardMethodContract {
            constraints,
            outcome,
        }
    }

    /// Parses a whole contract string into its clauses.
    ///
    /// Blank text is an empty contract.
    pub fn parse_contract(text: &str) -> Result<Vec<StandardMethodContract>, ParseError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut clauses = Vec::new();
        let mut offset = 0;
        for (clause_index, clause) in text.split(';').enumerate() {
            clauses.push(parse_clause(clause, offset, clause_index)?);
            offset += clause.len() + 1;
        }
        Ok(clauses)
    }

    pub fn parameter_count(&self) -> usize {
        self.constraints.len()
    }

    /// Returns `true` if no argument is constrained.
    pub fn is_trivial(&self) -> bool {
        self.constraints.iter().all(|c| *c == ValueConstraint::Any)
    }

    /// Condition tuple satisfied by both clauses, or `None` if no call can
    /// match both.
    pub fn intersect(&self, other: &StandardMethodContract) -> Option<Vec<ValueConstraint>> {
        intersect_conditions(&self.constraints, &other.constraints)
    }

    /// Removes this clause's condition region from a set of disjoint
    /// condition tuples, returning the remaining disjoint tuples.
    pub fn exclude_contract(&self, space: &[Vec<ValueConstraint>]) -> Vec<Vec<ValueConstraint>> {
        let mut remaining = Vec::new();
        for tuple in space {
            if intersect_conditions(tuple, &self.constraints).is_none() {
                remaining.push(tuple.clone());
                continue;
            }
            let mut prefix = tuple.clone();
            for (i, constraint) in self.constraints.iter().enumerate() {
                let Some(negated) = constraint.negate() else {
                    continue;
                };
                let Some(slot) = prefix.get(i).copied() else {
                    continue;
                };
                if let Some(outside) = slot.meet(negated) {
                    let mut piece = prefix.clone();
                    piece[i] = outside;
                    remaining.push(piece);
                }
                match slot.meet(*constraint) {
                    Some(inside) => prefix[i] = inside,
                    None => break,
                }
            }
        }
        remaining
    }
}

fn intersect_conditions(a: &[ValueConstraint], b: &[ValueConstraint]) -> Option<Vec<ValueConstraint>> {
    if a.len() != b.len() {
        return None;
    }
    a.iter().zip(b).map(|(x, y)| x.meet(*y)).collect()
}

fn parse_clause(
    clause: &str,
    offset: usize,
    clause_index: usize,
) -> Result<StandardMethodContract, ParseError> {
    let clause_range = trimmed_range(clause, offset);
    let error = |message: String, parameter_index: Option<usize>, range: Range<usize>| ParseError {
        message,
        clause_index,
        parameter_index,
        text_range: Some(range),
    };

    if clause.trim().is_empty() {
        return Err(error("Clause is empty".to_string(), None, clause_range));
    }
    let Some(arrow) = clause.find("->") else {
        return Err(error(
            "Clause must contain '->'".to_string(),
            None,
            clause_range,
        ));
    };
    let (lhs, rhs) = (&clause[..arrow], &clause[arrow + 2..]);
    if rhs.contains("->") {
        return Err(error(
            "Clause must contain exactly one '->'".to_string(),
            None,
            clause_range,
        ));
    }

    let mut constraints = Vec::new();
    if !lhs.trim().is_empty() {
        let mut token_offset = offset;
        for (parameter_index, token) in lhs.split(',').enumerate() {
            let range = trimmed_range(token, token_offset);
            let trimmed = token.trim();
            match ValueConstraint::from_token(trimmed) {
                Some(c) => constraints.push(c),
                None => {
                    let message = if trimmed.is_empty() {
                        "Constraint should not be empty".to_string()
                    } else {
                        format!(
                            "Constraint should be one of: _, null, !null, true, false. Found: {}",
                            trimmed
                        )
                    };
                    return Err(error(message, Some(parameter_index), range));
                }
            }
            token_offset += token.len() + 1;
        }
    }

    let rhs_offset = offset + arrow + 2;
    let outcome_token = rhs.trim();
    let outcome = ReturnOutcome::from_token(outcome_token).ok_or_else(|| {
        error(
            format!(
                "Return value should be one of: null, !null, true, false, this, new, paramN, fail, _. Found: {}",
                outcome_token
            ),
            None,
            trimmed_range(rhs, rhs_offset),
        )
    })?;

    Ok(StandardMethodContract {
        constraints,
        outcome,
    })
}

/// Byte range of `part` without surrounding whitespace, shifted by `offset`.
fn trimmed_range(part: &str, offset: usize) -> Range<usize> {
    let start = part.len() - part.trim_start().len();
    let end = part.trim_end().len();
    if start >= end {
        offset..offset + part.len()
    } else {
        offset + start..offset + end
    }
}

impl fmt::Display for StandardMethodContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let conditions: Vec<&str> = self.constraints.iter().map(|c| c.token()).collect();
        write!(f, "{} -> {}", conditions.join(", "), self.outcome)
    }
}

impl TryFrom<String> for StandardMethodContract {
    type Error = ParseError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        let mut clauses = StandardMethodContract::parse_contract(&text)?;
        if clauses.len() != 1 {
            return Err(ParseError {
                message: format!("expected exactly one clause, found {}", clauses.len()),
                clause_index: 0,
                parameter_index: None,
                text_range: None,
            });
        }
        Ok(clauses.remove(0))
    }
}

impl From<StandardMethodContract> for String {
    fn from(contract: StandardMethodContract) -> String {
        contract.to_string()
    }
}
