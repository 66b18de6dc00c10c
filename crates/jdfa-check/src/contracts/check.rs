//! Checking a contract clause against the body of the method it describes.
//!
//! The body is analyzed from an entry state in which the clause conditions
//! hold. Every exit that contradicts the clause outcome becomes a violation.

use std::collections::BTreeMap;

use jdfa_core::{
    AnchorId, MethodBody, ReturnOutcome, StandardMethodContract, TypeRegistry, ValueFactory,
    ValueId,
};

use super::{apply_constraint, outcome_fact};
use crate::interpreter::{AnalysisError, DataFlowRunner, RunnerOutcome};
use crate::report::{AnalysisReport, TerminalState};

/// Runs contract clauses through the data flow runner.
pub struct ContractChecker<'r> {
    runner: &'r DataFlowRunner,
}

impl<'r> ContractChecker<'r> {
    pub fn new(runner: &'r DataFlowRunner) -> Self {
        ContractChecker { runner }
    }

    /// Maps the anchors where `contract` is violated to an error message.
    ///
    /// For the method's own contract (`own_contract`) violations are placed
    /// on the offending return or throw; otherwise on the method itself.
    /// Implicit exceptions leaving the method carry no anchor and are
    /// reported on the method too. An incomplete analysis or a clause whose
    /// conditions can never hold yields no violations.
    pub fn check_contract_clause(
        &self,
        body: &MethodBody,
        types: &TypeRegistry,
        contract: &StandardMethodContract,
        own_contract: bool,
    ) -> Result<BTreeMap<AnchorId, String>, AnalysisError> {
        let descriptor = &body.descriptor;
        let mut errors = BTreeMap::new();
        if contract.parameter_count() != descriptor.params.len() {
            return Ok(errors);
        }

        let mut factory = ValueFactory::new(types.clone());
        let mut state = self.runner.initial_state(&mut factory, descriptor);
        let mut params = Vec::with_capacity(descriptor.params.len());
        for (index, constraint) in contract.constraints.iter().enumerate() {
            let Some(var) = descriptor.param_variable(index) else {
                return Ok(errors);
            };
            let value = factory.get_variable(var, None);
            if !apply_constraint(&mut factory, &mut state, value, *constraint) {
                tracing::debug!("clause '{}' of {} can never apply", contract, descriptor.name);
                return Ok(errors);
            }
            params.push(value);
        }
        let this = descriptor
            .this_variable()
            .map(|var| factory.get_variable(var, None));

        let report = match self.runner.analyze_with(body, &mut factory, vec![state])? {
            RunnerOutcome::Completed(report) => report,
            RunnerOutcome::TooComplex | RunnerOutcome::Cancelled => {
                tracing::info!(
                    "no verdict for clause '{}' of {}: analysis incomplete",
                    contract,
                    descriptor.name
                );
                return Ok(errors);
            }
        };

        let expected = Expected {
            outcome: contract.outcome,
            this,
            params,
        };
        for (terminal, reason) in violations(&factory, &report, &expected) {
            let anchor = if own_contract {
                terminal.anchor.unwrap_or(descriptor.anchor)
            } else {
                descriptor.anchor
            };
            errors
                .entry(anchor)
                .or_insert_with(|| format!("Contract clause '{}' is violated: {}", contract, reason));
        }
        Ok(errors)
    }
}

struct Expected {
    outcome: ReturnOutcome,
    this: Option<ValueId>,
    params: Vec<ValueId>,
}

fn violations<'a>(
    factory: &ValueFactory,
    report: &'a AnalysisReport,
    expected: &Expected,
) -> Vec<(&'a TerminalState, String)> {
    let mut found = Vec::new();
    if expected.outcome == ReturnOutcome::Fail {
        for terminal in report.returns() {
            found.push((terminal, "method may return normally".to_string()));
        }
        return found;
    }

    // Throwing is only a violation when no path returns at all.
    if report.returns().next().is_none() {
        for terminal in &report.terminals {
            found.push((terminal, "method always fails".to_string()));
        }
        return found;
    }

    for terminal in report.returns() {
        if let Some(reason) = return_violation(factory, terminal, expected) {
            found.push((terminal, reason));
        }
    }
    found
}

fn return_violation(
    factory: &ValueFactory,
    terminal: &TerminalState,
    expected: &Expected,
) -> Option<String> {
    let value = terminal.return_value?;
    let reg = factory.types();
    if let Some(fact) = outcome_fact(expected.outcome) {
        let returned = terminal.return_fact.as_ref()?;
        return returned
            .meet(&fact, reg)
            .is_bottom()
            .then(|| format!("method may return {}", describe_fact(terminal)));
    }
    let target = match expected.outcome {
        ReturnOutcome::This => expected.this?,
        ReturnOutcome::Parameter(index) => *expected.params.get(index)?,
        _ => return None,
    };
    terminal
        .state
        .are_distinct(factory, value, target)
        .then(|| format!("method does not return {}", expected.outcome))
}

fn describe_fact(terminal: &TerminalState) -> String {
    match terminal.return_fact.as_ref().and_then(|f| f.constant_value()) {
        Some(value) => value.to_string(),
        None => "a value contradicting the outcome".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jdfa_core::{
        ConstValue, EvalOp, Instruction, JType, MethodDescriptor, Operand, Parameter,
        RelationType,
    };

    use crate::interpreter::RunnerConfig;

    fn descriptor(params: &[JType], ret: JType) -> MethodDescriptor {
        let params = params
            .iter()
            .enumerate()
            .map(|(i, ty)| Parameter::new(&format!("p{}", i + 1), ty.clone()))
            .collect();
        MethodDescriptor::new("m", params, ret, AnchorId(100))
    }

    fn null() -> Operand {
        Operand::constant(ConstValue::Null, JType::Null)
    }

    /// `boolean m(String p1) { return p1 == null; }`
    fn is_null_body() -> MethodBody {
        let d = descriptor(&[JType::STRING], JType::BOOLEAN);
        let p1 = d.param_operand(0).unwrap();
        MethodBody::new(
            d,
            vec![
                Instruction::push(p1),
                Instruction::push(null()),
                Instruction::eval(EvalOp::Relation {
                    relation: RelationType::Eq,
                }),
                Instruction::Return {
                    has_value: true,
                    anchor: Some(AnchorId(7)),
                },
            ],
        )
    }

    /// `String m(String p1) { return p1; }`
    fn identity_body() -> MethodBody {
        let d = descriptor(&[JType::STRING], JType::STRING);
        let p1 = d.param_operand(0).unwrap();
        MethodBody::new(
            d,
            vec![
                Instruction::push(p1),
                Instruction::Return {
                    has_value: true,
                    anchor: Some(AnchorId(3)),
                },
            ],
        )
    }

    fn check(body: &MethodBody, clause: &str, own: bool) -> BTreeMap<AnchorId, String> {
        let runner = DataFlowRunner::new(RunnerConfig::default());
        let checker = ContractChecker::new(&runner);
        let contract: StandardMethodContract = clause.to_string().try_into().unwrap();
        checker
            .check_contract_clause(body, &TypeRegistry::new(), &contract, own)
            .unwrap()
    }

    #[test]
    fn satisfied_clauses_report_nothing() {
        let body = is_null_body();
        assert!(check(&body, "null -> true", true).is_empty());
        assert!(check(&body, "!null -> false", true).is_empty());
        assert!(check(&identity_body(), "_ -> param1", true).is_empty());
        assert!(check(&identity_body(), "null -> null", true).is_empty());
    }

    #[test]
    fn contradicted_outcome_is_reported_at_the_return() {
        let errors = check(&is_null_body(), "null -> false", true);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.get(&AnchorId(7)).map(String::as_str),
            Some("Contract clause 'null -> false' is violated: method may return true")
        );
    }

    #[test]
    fn foreign_contracts_are_reported_on_the_method() {
        let errors = check(&is_null_body(), "null -> false", false);
        assert!(errors.contains_key(&AnchorId(100)));
    }

    #[test]
    fn fail_clause_with_normal_return() {
        let errors = check(&identity_body(), "null -> fail", true);
        assert_eq!(errors.len(), 1);
        assert!(errors[&AnchorId(3)].ends_with("method may return normally"));
    }

    #[test]
    fn null_returned_where_not_null_promised() {
        let errors = check(&identity_body(), "null -> !null", true);
        assert!(errors[&AnchorId(3)].contains("null"));
    }

    #[test]
    fn always_throwing_body_violates_value_clause() {
        let d = descriptor(&[JType::STRING], JType::STRING);
        let body = MethodBody::new(
            d,
            vec![
                Instruction::push(Operand::Unknown),
                Instruction::Throw {
                    anchor: Some(AnchorId(9)),
                },
            ],
        );
        let errors = check(&body, "_ -> !null", true);
        assert!(errors[&AnchorId(9)].ends_with("method always fails"));
        assert!(check(&body, "_ -> fail", true).is_empty());
    }

    /// `String m(String p1) { p1.trim(); return p1; }`, reduced to the
    /// dereference.
    fn dereferencing_body() -> MethodBody {
        let d = descriptor(&[JType::STRING], JType::STRING);
        let p1 = d.param_operand(0).unwrap();
        MethodBody::new(
            d,
            vec![
                Instruction::push(p1),
                Instruction::MethodReference {
                    anchor: Some(AnchorId(5)),
                },
                Instruction::Return {
                    has_value: true,
                    anchor: Some(AnchorId(3)),
                },
            ],
        )
    }

    #[test]
    fn null_dereference_under_the_clause_always_fails() {
        let errors = check(&dereferencing_body(), "null -> !null", true);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.get(&AnchorId(100)).map(String::as_str),
            Some("Contract clause 'null -> !null' is violated: method always fails")
        );
        assert!(check(&dereferencing_body(), "null -> fail", true).is_empty());
        assert!(check(&dereferencing_body(), "!null -> !null", true).is_empty());
    }

    #[test]
    fn failing_cast_violates_value_clause() {
        // Integer m(String p1) { return (Integer) (Object) "x"; }
        let d = descriptor(&[JType::STRING], JType::Class(jdfa_core::TypeId::INTEGER));
        let body = MethodBody::new(
            d,
            vec![
                Instruction::push(Operand::constant(ConstValue::Str("x".into()), JType::STRING)),
                Instruction::type_cast(JType::Class(jdfa_core::TypeId::INTEGER), None, None)
                    .unwrap(),
                Instruction::Return {
                    has_value: true,
                    anchor: Some(AnchorId(3)),
                },
            ],
        );
        let errors = check(&body, "_ -> null", true);
        assert!(errors[&AnchorId(100)].ends_with("method always fails"));
        assert!(check(&body, "_ -> fail", true).is_empty());
    }

    #[test]
    fn arity_mismatch_is_left_to_validation() {
        assert!(check(&is_null_body(), "_, _ -> true", true).is_empty());
    }
}
