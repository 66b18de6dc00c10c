//! Validation of declared contracts against the method they annotate.
//!
//! Every problem carries the clause it was found in and, when it can be
//! pinned down, the parameter and the byte range inside the contract text.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use jdfa_core::{
    JType, MethodDescriptor, MutationSignature, ParseError, PrimitiveType, ReturnOutcome,
    StandardMethodContract, TypeId, TypeRegistry, ValueConstraint,
};

/// Why a clause can never apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnreachableReason {
    /// Earlier clauses already cover every possible call.
    AllCasesCovered,
    /// Every call matching this clause is taken by an earlier one.
    ConditionsCovered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractProblemKind {
    Syntax,
    ArityMismatch,
    ConstraintTypeMismatch,
    ReturnTypeMismatch,
    Unreachable(UnreachableReason),
    MutationSyntax,
    MutationTarget,
    PureConflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractProblem {
    pub kind: ContractProblemKind,
    pub message: String,
    pub clause_index: Option<usize>,
    pub parameter_index: Option<usize>,
    pub text_range: Option<Range<usize>>,
}

impl ContractProblem {
    fn in_clause(kind: ContractProblemKind, message: String, clause_index: usize) -> Self {
        ContractProblem {
            kind,
            message,
            clause_index: Some(clause_index),
            parameter_index: None,
            text_range: None,
        }
    }

    fn for_method(kind: ContractProblemKind, message: String) -> Self {
        ContractProblem {
            kind,
            message,
            clause_index: None,
            parameter_index: None,
            text_range: None,
        }
    }
}

impl From<ParseError> for ContractProblem {
    fn from(err: ParseError) -> Self {
        ContractProblem {
            kind: ContractProblemKind::Syntax,
            message: err.message,
            clause_index: Some(err.clause_index),
            parameter_index: err.parameter_index,
            text_range: err.text_range,
        }
    }
}

/// Checks parsed clauses against the method's signature and against each
/// other.
///
/// Clauses with the wrong number of constraints are reported and take no
/// further part. Coverage of the argument space is tracked as a list of
/// disjoint constraint tuples; once that list grows beyond `max_states`
/// tracking stops and later clauses are assumed reachable.
pub fn validate_contract(
    descriptor: &MethodDescriptor,
    clauses: &[StandardMethodContract],
    types: &TypeRegistry,
    max_states: usize,
) -> Vec<ContractProblem> {
    let arity = descriptor.params.len();
    let mut problems = Vec::new();
    let mut space = Some(vec![vec![ValueConstraint::Any; arity]]);

    for (clause_index, clause) in clauses.iter().enumerate() {
        if clause.parameter_count() != arity {
            problems.push(ContractProblem::in_clause(
                ContractProblemKind::ArityMismatch,
                format!(
                    "Method takes {} parameter(s), but {} parameter(s) specified",
                    arity,
                    clause.parameter_count()
                ),
                clause_index,
            ));
            continue;
        }

        for (parameter_index, (constraint, param)) in
            clause.constraints.iter().zip(&descriptor.params).enumerate()
        {
            if !constraint.can_be_applied_to(&param.ty) {
                problems.push(ContractProblem {
                    kind: ContractProblemKind::ConstraintTypeMismatch,
                    message: format!(
                        "Constraint '{}' is not applicable to parameter #{} of type '{}'",
                        constraint,
                        parameter_index + 1,
                        types.type_name(&param.ty)
                    ),
                    clause_index: Some(clause_index),
                    parameter_index: Some(parameter_index),
                    text_range: None,
                });
            }
        }

        if let Some(message) = check_outcome(descriptor, clause.outcome, types) {
            problems.push(ContractProblem::in_clause(
                ContractProblemKind::ReturnTypeMismatch,
                message,
                clause_index,
            ));
        }

        let Some(remaining) = space.take() else {
            continue;
        };
        if remaining.is_empty() {
            problems.push(ContractProblem::in_clause(
                ContractProblemKind::Unreachable(UnreachableReason::AllCasesCovered),
                "Contract clause is unreachable: previous clauses cover all possible cases"
                    .to_string(),
                clause_index,
            ));
            space = Some(remaining);
            continue;
        }
        let conditions_only =
            StandardMethodContract::new(clause.constraints.clone(), ReturnOutcome::Any);
        let reachable = remaining.iter().any(|tuple| {
            conditions_only
                .intersect(&StandardMethodContract::new(tuple.clone(), ReturnOutcome::Any))
                .is_some()
        });
        if !reachable {
            problems.push(ContractProblem::in_clause(
                ContractProblemKind::Unreachable(UnreachableReason::ConditionsCovered),
                format!(
                    "Contract clause '{}' is unreachable: previous clauses cover all cases matching its conditions",
                    clause
                ),
                clause_index,
            ));
            space = Some(remaining);
            continue;
        }
        let next = clause.exclude_contract(&remaining);
        if next.len() <= max_states {
            space = Some(next);
        } else {
            tracing::debug!(
                clause_index,
                tuples = next.len(),
                "Contract coverage tracking stopped"
            );
        }
    }

    problems
}

/// Problem with a clause's outcome given the declared return type.
fn check_outcome(
    descriptor: &MethodDescriptor,
    outcome: ReturnOutcome,
    types: &TypeRegistry,
) -> Option<String> {
    let ret = &descriptor.return_type;
    let ret_name = types.type_name(ret);
    match outcome {
        ReturnOutcome::Any | ReturnOutcome::Fail => None,
        _ if *ret == JType::Void => Some(format!(
            "Return value '{}' is not applicable to a void method: only 'fail' or '_' is allowed",
            outcome
        )),
        ReturnOutcome::Null | ReturnOutcome::NotNull | ReturnOutcome::New
            if ret.is_primitive() =>
        {
            Some(format!(
                "Return value '{}' is not applicable to the primitive return type '{}'",
                outcome, ret_name
            ))
        }
        ReturnOutcome::True | ReturnOutcome::False if !ret.is_boolean_like() => Some(format!(
            "Return value '{}' is only applicable to boolean methods, the return type is '{}'",
            outcome, ret_name
        )),
        ReturnOutcome::This => {
            if descriptor.is_static {
                return Some("Return value 'this' is not applicable to a static method".to_string());
            }
            let this_type = JType::Class(descriptor.declaring_class);
            if is_assignable(types, &this_type, ret) {
                None
            } else {
                Some(format!(
                    "Return value 'this' of type '{}' is not assignable to the return type '{}'",
                    types.name(descriptor.declaring_class),
                    ret_name
                ))
            }
        }
        ReturnOutcome::Parameter(index) => {
            let Some(param) = descriptor.params.get(index) else {
                return Some(format!(
                    "Return value '{}' refers to a parameter that does not exist; the method has {} parameter(s)",
                    outcome,
                    descriptor.params.len()
                ));
            };
            if is_assignable(types, &param.ty, ret) {
                None
            } else {
                Some(format!(
                    "Return value '{}' of type '{}' is not assignable to the return type '{}'",
                    outcome,
                    types.type_name(&param.ty),
                    ret_name
                ))
            }
        }
        ReturnOutcome::Null
        | ReturnOutcome::NotNull
        | ReturnOutcome::New
        | ReturnOutcome::True
        | ReturnOutcome::False => None,
    }
}

/// Assignment compatibility without boxing conversions.
fn is_assignable(types: &TypeRegistry, from: &JType, to: &JType) -> bool {
    match (from, to) {
        (JType::Primitive(a), JType::Primitive(b)) => a == b || a.is_lossless_widening_to(*b),
        (JType::Class(a), JType::Class(b)) => types.is_subtype(*a, *b),
        (JType::Null, JType::Class(_)) => true,
        _ => false,
    }
}

/// Checks a mutation signature against the method's parameters.
pub fn validate_mutation(
    descriptor: &MethodDescriptor,
    signature: &MutationSignature,
) -> Vec<ContractProblem> {
    let mut problems = Vec::new();
    let mut target = |message: String, parameter_index: Option<usize>| {
        problems.push(ContractProblem {
            kind: ContractProblemKind::MutationTarget,
            message,
            clause_index: None,
            parameter_index,
            text_range: None,
        })
    };

    if signature.this && descriptor.is_static {
        target("Static method cannot mutate 'this'".to_string(), None);
    }
    if signature.bare_param && descriptor.params.len() != 1 {
        target(
            format!(
                "Reference 'param' is ambiguous: the method has {} parameters, use 'paramN' instead",
                descriptor.params.len()
            ),
            None,
        );
    }
    for &index in &signature.params {
        let Some(param) = descriptor.params.get(index) else {
            if !signature.bare_param {
                target(
                    format!(
                        "Parameter #{} does not exist; the method has {} parameter(s)",
                        index + 1,
                        descriptor.params.len()
                    ),
                    Some(index),
                );
            }
            continue;
        };
        if let Some(reason) = immutable_reason(&param.ty) {
            target(
                format!("Parameter #{} is {} and cannot be mutated", index + 1, reason),
                Some(index),
            );
        }
    }
    problems
}

fn immutable_reason(ty: &JType) -> Option<&'static str> {
    match ty {
        JType::Primitive(_) => Some("primitive"),
        JType::Class(TypeId::STRING) => Some("an immutable String"),
        JType::Class(id) if PrimitiveType::from_box_class(*id).is_some() => {
            Some("an immutable boxed value")
        }
        _ => None,
    }
}

/// Validates everything a descriptor declares: its contract text, its
/// mutation signature and their consistency with the `pure` flag.
pub fn validate_method_contracts(
    descriptor: &MethodDescriptor,
    types: &TypeRegistry,
    max_states: usize,
) -> Vec<ContractProblem> {
    let mut problems = Vec::new();

    if let Some(text) = descriptor.contract.as_deref() {
        match StandardMethodContract::parse_contract(text) {
            Ok(clauses) => {
                let ranges = clause_ranges(text);
                for mut problem in validate_contract(descriptor, &clauses, types, max_states) {
                    if problem.text_range.is_none() {
                        problem.text_range = problem
                            .clause_index
                            .and_then(|i| ranges.get(i).cloned());
                    }
                    problems.push(problem);
                }
            }
            Err(err) => problems.push(err.into()),
        }
    }

    if let Some(text) = descriptor.mutates.as_deref() {
        match MutationSignature::parse(text) {
            Ok(signature) => {
                if descriptor.pure && !signature.is_pure() {
                    problems.push(ContractProblem::for_method(
                        ContractProblemKind::PureConflict,
                        "Pure method cannot have mutation contract".to_string(),
                    ));
                }
                problems.extend(validate_mutation(descriptor, &signature));
            }
            Err(err) => problems.push(ContractProblem::for_method(
                ContractProblemKind::MutationSyntax,
                err.to_string(),
            )),
        }
    }

    problems
}

/// Byte range of every `;`-separated clause, surrounding blanks excluded.
fn clause_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut offset = 0;
    for clause in text.split(';') {
        let start = clause.len() - clause.trim_start().len();
        let end = clause.trim_end().len().max(start);
        ranges.push(offset + start..offset + end);
        offset += clause.len() + 1;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use jdfa_core::{AnchorId, Parameter};

    fn method(params: &[JType], ret: JType) -> MethodDescriptor {
        let params = params
            .iter()
            .enumerate()
            .map(|(i, ty)| Parameter::new(&format!("p{}", i + 1), ty.clone()))
            .collect();
        MethodDescriptor::new("m", params, ret, AnchorId(0))
    }

    fn validate(descriptor: &MethodDescriptor, text: &str) -> Vec<ContractProblem> {
        let clauses = StandardMethodContract::parse_contract(text).unwrap();
        validate_contract(descriptor, &clauses, &TypeRegistry::new(), 300)
    }

    fn kinds(problems: &[ContractProblem]) -> Vec<ContractProblemKind> {
        problems.iter().map(|p| p.kind).collect()
    }

    // --- Signature checks ---

    #[test]
    fn arity_must_match() {
        let one = method(&[JType::STRING], JType::BOOLEAN);
        let two = method(&[JType::STRING, JType::STRING], JType::BOOLEAN);
        let problems = validate(&one, "_, null -> false");
        assert_eq!(kinds(&problems), vec![ContractProblemKind::ArityMismatch]);
        assert_eq!(problems[0].clause_index, Some(0));
        assert!(validate(&two, "_, null -> false").is_empty());
    }

    #[test]
    fn nullness_constraint_on_primitive_parameter() {
        let m = method(&[JType::INT], JType::BOOLEAN);
        let problems = validate(&m, "null -> false");
        assert_eq!(kinds(&problems), vec![ContractProblemKind::ConstraintTypeMismatch]);
        assert_eq!(problems[0].parameter_index, Some(0));
    }

    #[test]
    fn boolean_constraint_on_non_boolean_parameter() {
        let m = method(&[JType::STRING], JType::BOOLEAN);
        let problems = validate(&m, "true -> false");
        assert_eq!(kinds(&problems), vec![ContractProblemKind::ConstraintTypeMismatch]);
        let boxed = method(&[JType::Class(TypeId::BOOLEAN)], JType::BOOLEAN);
        assert!(validate(&boxed, "true -> false").is_empty());
    }

    #[test]
    fn return_outcome_must_fit_return_type() {
        let void = method(&[JType::STRING], JType::Void);
        assert!(validate(&void, "null -> fail").is_empty());
        assert_eq!(
            kinds(&validate(&void, "null -> null")),
            vec![ContractProblemKind::ReturnTypeMismatch]
        );

        let int = method(&[JType::STRING], JType::INT);
        assert_eq!(
            kinds(&validate(&int, "null -> !null")),
            vec![ContractProblemKind::ReturnTypeMismatch]
        );
        assert_eq!(
            kinds(&validate(&int, "null -> true")),
            vec![ContractProblemKind::ReturnTypeMismatch]
        );
    }

    #[test]
    fn this_and_parameter_outcomes() {
        let mut m = method(&[JType::STRING, JType::INT], JType::OBJECT);
        assert!(validate(&m, "_, _ -> this").is_empty());
        assert!(validate(&m, "_, _ -> param1").is_empty());
        assert_eq!(
            kinds(&validate(&m, "_, _ -> param2")),
            vec![ContractProblemKind::ReturnTypeMismatch]
        );
        assert_eq!(
            kinds(&validate(&m, "_, _ -> param3")),
            vec![ContractProblemKind::ReturnTypeMismatch]
        );
        m.is_static = true;
        assert_eq!(
            kinds(&validate(&m, "_, _ -> this")),
            vec![ContractProblemKind::ReturnTypeMismatch]
        );
    }

    // --- Coverage ---

    #[test]
    fn clause_shadowed_by_earlier_clause() {
        let m = method(&[JType::STRING], JType::BOOLEAN);
        let problems = validate(&m, "null -> false; null -> true");
        assert_eq!(
            kinds(&problems),
            vec![ContractProblemKind::Unreachable(UnreachableReason::ConditionsCovered)]
        );
        assert_eq!(problems[0].clause_index, Some(1));
    }

    #[test]
    fn clause_after_full_coverage() {
        let m = method(&[JType::STRING], JType::BOOLEAN);
        let problems = validate(&m, "null -> false; !null -> true; _ -> true");
        assert_eq!(
            kinds(&problems),
            vec![ContractProblemKind::Unreachable(UnreachableReason::AllCasesCovered)]
        );
        assert_eq!(problems[0].clause_index, Some(2));
    }

    #[test]
    fn partially_overlapping_clauses_are_fine() {
        let m = method(&[JType::STRING, JType::STRING], JType::BOOLEAN);
        assert!(validate(&m, "_, null -> false; null, _ -> false; !null, !null -> true").is_empty());
    }

    #[test]
    fn coverage_tracking_gives_up_past_limit() {
        let m = method(&[JType::STRING, JType::STRING, JType::STRING], JType::BOOLEAN);
        let clauses = StandardMethodContract::parse_contract(
            "null, null, null -> false; null, null, null -> true",
        )
        .unwrap();
        let tracked = validate_contract(&m, &clauses, &TypeRegistry::new(), 300);
        assert_eq!(tracked.len(), 1);
        // The first exclusion leaves three tuples, more than a limit of two.
        let untracked = validate_contract(&m, &clauses, &TypeRegistry::new(), 2);
        assert!(untracked.is_empty());
    }

    // --- Mutation signatures ---

    #[test]
    fn mutation_targets() {
        let mut m = method(&[JType::INT, JType::OBJECT], JType::Void);
        let sig = MutationSignature::parse("param1,param2,param3").unwrap();
        let problems = validate_mutation(&m, &sig);
        assert_eq!(problems.len(), 2);
        assert_eq!(problems[0].parameter_index, Some(0));
        assert_eq!(problems[1].parameter_index, Some(2));

        m.is_static = true;
        let this = MutationSignature::parse("this").unwrap();
        assert_eq!(validate_mutation(&m, &this).len(), 1);

        let two_objects = method(&[JType::OBJECT, JType::OBJECT], JType::Void);
        let bare = MutationSignature::parse("param").unwrap();
        assert_eq!(validate_mutation(&two_objects, &bare).len(), 1);
    }

    #[test]
    fn string_parameters_are_immutable() {
        let m = method(&[JType::STRING], JType::Void);
        let sig = MutationSignature::parse("param").unwrap();
        let problems = validate_mutation(&m, &sig);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].message.contains("String"));
    }

    #[test]
    fn pure_with_mutation_conflicts() {
        let mut m = method(&[JType::OBJECT], JType::Void);
        m.pure = true;
        m.mutates = Some("param1".to_string());
        let problems = validate_method_contracts(&m, &TypeRegistry::new(), 300);
        assert_eq!(kinds(&problems), vec![ContractProblemKind::PureConflict]);
    }

    #[test]
    fn syntax_errors_keep_their_location() {
        let mut m = method(&[JType::STRING], JType::BOOLEAN);
        m.contract = Some("null -> false; nul -> true".to_string());
        let problems = validate_method_contracts(&m, &TypeRegistry::new(), 300);
        assert_eq!(kinds(&problems), vec![ContractProblemKind::Syntax]);
        assert_eq!(problems[0].clause_index, Some(1));
        assert_eq!(problems[0].parameter_index, Some(0));
        assert_eq!(problems[0].text_range, Some(15..18));
    }

    #[test]
    fn clause_problems_point_at_the_clause_text() {
        let mut m = method(&[JType::STRING], JType::BOOLEAN);
        m.contract = Some("null -> false;  null -> true ".to_string());
        let problems = validate_method_contracts(&m, &TypeRegistry::new(), 300);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].text_range, Some(16..28));
    }
}
