//! Facts gathered while a method body is analyzed, and the problems they
//! imply.
//!
//! The runner records what every anchored instruction observed across all
//! reachable states: which way conditions went, whether dereferenced values
//! could be null, whether casts and index checks could succeed. A fact is
//! only conclusive once the run completes; an aborted run yields no report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use jdfa_core::{AnchorId, ConstValue, DfType, Nullability, TypeRegistry, ValueId};

use crate::interpreter::trace::TraceEntry;
use crate::state::MemoryState;

/// Which way a condition went over all states reaching it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchOutcome {
    pub seen_true: bool,
    pub seen_false: bool,
}

impl BranchOutcome {
    pub fn record(&mut self, can_be_true: bool, can_be_false: bool) {
        self.seen_true |= can_be_true;
        self.seen_false |= can_be_false;
    }

    /// The constant value of the condition, if it only ever went one way.
    pub fn always(&self) -> Option<bool> {
        match (self.seen_true, self.seen_false) {
            (true, false) => Some(true),
            (false, true) => Some(false),
            _ => None,
        }
    }
}

/// Nullness of a dereferenced value over all states reaching it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullnessOutcome {
    pub null: bool,
    pub nullable: bool,
    pub not_null: bool,
}

/// Outcome of a check that may pass or fail, such as a cast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub can_pass: bool,
    pub can_fail: bool,
}

impl CheckOutcome {
    fn record(&mut self, can_pass: bool, can_fail: bool) {
        self.can_pass |= can_pass;
        self.can_fail |= can_fail;
    }
}

/// Everything observed at one anchor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnchorFacts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<BranchOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dereference: Option<NullnessOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cast: Option<CheckOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<CheckOutcome>,
    /// Join of the values the anchored expression produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DfType>,
}

/// Per-anchor fact accumulator filled by the runner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactCollector {
    facts: BTreeMap<AnchorId, AnchorFacts>,
}

impl FactCollector {
    pub fn new() -> Self {
        FactCollector::default()
    }

    pub fn record_condition(&mut self, anchor: AnchorId, can_be_true: bool, can_be_false: bool) {
        self.facts
            .entry(anchor)
            .or_default()
            .condition
            .get_or_insert_with(BranchOutcome::default)
            .record(can_be_true, can_be_false);
    }

    pub fn record_dereference(&mut self, anchor: AnchorId, nullability: Nullability) {
        let outcome = self
            .facts
            .entry(anchor)
            .or_default()
            .dereference
            .get_or_insert_with(NullnessOutcome::default);
        match nullability {
            Nullability::Null => outcome.null = true,
            Nullability::Nullable => outcome.nullable = true,
            Nullability::NotNull | Nullability::Unknown => outcome.not_null = true,
        }
    }

    pub fn record_cast(&mut self, anchor: AnchorId, can_pass: bool, can_fail: bool) {
        self.facts
            .entry(anchor)
            .or_default()
            .cast
            .get_or_insert_with(CheckOutcome::default)
            .record(can_pass, can_fail);
    }

    pub fn record_index(&mut self, anchor: AnchorId, in_bounds: bool, out_of_bounds: bool) {
        self.facts
            .entry(anchor)
            .or_default()
            .index
            .get_or_insert_with(CheckOutcome::default)
            .record(in_bounds, out_of_bounds);
    }

    pub fn record_result(&mut self, anchor: AnchorId, df_type: &DfType, reg: &TypeRegistry) {
        let entry = self.facts.entry(anchor).or_default();
        entry.result = Some(match &entry.result {
            Some(previous) => previous.join(df_type, reg),
            None => df_type.clone(),
        });
    }

    pub fn get(&self, anchor: AnchorId) -> Option<&AnchorFacts> {
        self.facts.get(&anchor)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AnchorId, &AnchorFacts)> {
        self.facts.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalExit {
    Return,
    Throw,
}

/// A path that left the method.
#[derive(Debug, Clone, Serialize)]
pub struct TerminalState {
    pub ip: usize,
    pub exit: TerminalExit,
    pub anchor: Option<AnchorId>,
    /// Returned or thrown value.
    pub return_value: Option<ValueId>,
    pub return_fact: Option<DfType>,
    #[serde(skip)]
    pub state: MemoryState,
}

/// Result of a completed analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub terminals: Vec<TerminalState>,
    pub facts: FactCollector,
    /// Number of worklist steps taken.
    pub steps: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<TraceEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    ConditionAlwaysTrue,
    ConditionAlwaysFalse,
    NullDereference,
    PossibleNullDereference,
    CastAlwaysFails,
    IndexAlwaysOutOfBounds,
    ConstantExpression,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub anchor: AnchorId,
    pub kind: ProblemKind,
    pub message: String,
}

impl AnalysisReport {
    /// Terminals that return normally.
    pub fn returns(&self) -> impl Iterator<Item = &TerminalState> {
        self.terminals
            .iter()
            .filter(|t| t.exit == TerminalExit::Return)
    }

    /// Diagnostics implied by the collected facts, ordered by anchor.
    pub fn problems(&self, reg: &TypeRegistry) -> Vec<Problem> {
        let mut problems = Vec::new();
        for (anchor, facts) in self.facts.iter() {
            let mut report = |kind, message: String| {
                problems.push(Problem {
                    anchor: *anchor,
                    kind,
                    message,
                })
            };
            if let Some(always) = facts.condition.and_then(|c| c.always()) {
                if always {
                    report(
                        ProblemKind::ConditionAlwaysTrue,
                        "Condition is always true".to_string(),
                    );
                } else {
                    report(
                        ProblemKind::ConditionAlwaysFalse,
                        "Condition is always false".to_string(),
                    );
                }
            }
            if let Some(deref) = facts.dereference {
                if deref.null && !deref.nullable && !deref.not_null {
                    report(
                        ProblemKind::NullDereference,
                        "Dereference of a value that is always null".to_string(),
                    );
                } else if deref.null || deref.nullable {
                    report(
                        ProblemKind::PossibleNullDereference,
                        "Dereference may produce NullPointerException".to_string(),
                    );
                }
            }
            if let Some(cast) = facts.cast {
                if cast.can_fail && !cast.can_pass {
                    report(
                        ProblemKind::CastAlwaysFails,
                        "Cast always fails with ClassCastException".to_string(),
                    );
                }
            }
            if let Some(index) = facts.index {
                if index.can_fail && !index.can_pass {
                    report(
                        ProblemKind::IndexAlwaysOutOfBounds,
                        "Array index is always out of bounds".to_string(),
                    );
                }
            }
            if let Some(value) = facts.result.as_ref().and_then(DfType::constant_value) {
                // Conditions already report their constant value.
                if facts.condition.is_none() {
                    let shown = match value {
                        ConstValue::Class(id) => format!("{}.class", reg.name(id)),
                        other => other.to_string(),
                    };
                    report(
                        ProblemKind::ConstantExpression,
                        format!("Value of expression is always {}", shown),
                    );
                }
            }
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jdfa_core::JType;

    fn reg() -> TypeRegistry {
        TypeRegistry::new()
    }

    fn report_of(facts: FactCollector) -> AnalysisReport {
        AnalysisReport {
            terminals: Vec::new(),
            facts,
            steps: 0,
            trace: Vec::new(),
        }
    }

    #[test]
    fn branch_outcome_always() {
        let mut outcome = BranchOutcome::default();
        assert_eq!(outcome.always(), None);
        outcome.record(true, false);
        assert_eq!(outcome.always(), Some(true));
        outcome.record(false, true);
        assert_eq!(outcome.always(), None);
    }

    #[test]
    fn condition_seen_one_way_is_reported() {
        let mut facts = FactCollector::new();
        facts.record_condition(AnchorId(1), false, true);
        facts.record_condition(AnchorId(1), false, true);
        facts.record_condition(AnchorId(2), true, false);
        facts.record_condition(AnchorId(2), false, true);
        let problems = report_of(facts).problems(&reg());
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].anchor, AnchorId(1));
        assert_eq!(problems[0].kind, ProblemKind::ConditionAlwaysFalse);
    }

    #[test]
    fn dereference_classification() {
        let mut facts = FactCollector::new();
        facts.record_dereference(AnchorId(1), Nullability::Null);
        facts.record_dereference(AnchorId(2), Nullability::Nullable);
        facts.record_dereference(AnchorId(2), Nullability::NotNull);
        facts.record_dereference(AnchorId(3), Nullability::NotNull);
        let kinds: Vec<_> = report_of(facts)
            .problems(&reg())
            .into_iter()
            .map(|p| (p.anchor, p.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (AnchorId(1), ProblemKind::NullDereference),
                (AnchorId(2), ProblemKind::PossibleNullDereference),
            ]
        );
    }

    #[test]
    fn results_are_joined() {
        let reg = reg();
        let mut facts = FactCollector::new();
        let five = DfType::constant(&ConstValue::Int(5), &JType::INT);
        facts.record_result(AnchorId(4), &five, &reg);
        facts.record_result(AnchorId(4), &five, &reg);
        let problems = report_of(facts.clone()).problems(&reg);
        assert_eq!(problems[0].kind, ProblemKind::ConstantExpression);
        assert_eq!(problems[0].message, "Value of expression is always 5");

        let six = DfType::constant(&ConstValue::Int(6), &JType::INT);
        facts.record_result(AnchorId(4), &six, &reg);
        assert!(report_of(facts).problems(&reg).is_empty());
    }

    #[test]
    fn cast_that_never_passes() {
        let mut facts = FactCollector::new();
        facts.record_cast(AnchorId(9), false, true);
        facts.record_index(AnchorId(10), true, true);
        let problems = report_of(facts).problems(&reg());
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].kind, ProblemKind::CastAlwaysFails);
    }
}
