//! Method contracts: validation of declared clauses and checking them
//! against the method body.
//!
//! Parsing lives with the contract types in `jdfa_core`; this module adds
//! what needs the memory state or the runner.

pub mod check;
pub mod validate;

pub use jdfa_core::{
    MutationError, MutationSignature, ParseError, ReturnOutcome, StandardMethodContract,
    ValueConstraint,
};

use jdfa_core::{DfType, TypeConstraint, ValueFactory, ValueId};

use crate::state::MemoryState;

/// The fact a parameter constraint imposes, `None` for `_`.
pub fn constraint_fact(constraint: ValueConstraint) -> Option<DfType> {
    match constraint {
        ValueConstraint::Any => None,
        ValueConstraint::Null => Some(DfType::null()),
        ValueConstraint::NotNull => Some(DfType::not_null_object()),
        ValueConstraint::True => Some(DfType::TRUE),
        ValueConstraint::False => Some(DfType::FALSE),
    }
}

/// The fact a return outcome imposes on the returned value.
///
/// Outcomes that name another value (`this`, `paramN`) or no value at all
/// (`fail`) have none.
pub fn outcome_fact(outcome: ReturnOutcome) -> Option<DfType> {
    match outcome {
        ReturnOutcome::Null => Some(DfType::null()),
        ReturnOutcome::NotNull | ReturnOutcome::New => Some(DfType::not_null_object()),
        ReturnOutcome::True => Some(DfType::TRUE),
        ReturnOutcome::False => Some(DfType::FALSE),
        ReturnOutcome::Any
        | ReturnOutcome::Fail
        | ReturnOutcome::This
        | ReturnOutcome::Parameter(_) => None,
    }
}

/// Assumes `value` satisfies `constraint`.
///
/// Boolean constraints go through the condition machinery so that a
/// relation argument narrows its operands. Returns `false` when the
/// assumption contradicts the state.
pub fn apply_constraint(
    factory: &mut ValueFactory,
    state: &mut MemoryState,
    value: ValueId,
    constraint: ValueConstraint,
) -> bool {
    match constraint {
        ValueConstraint::Any => true,
        ValueConstraint::True => state.apply_condition(factory, value),
        ValueConstraint::False => {
            let negated = factory.negate_condition(value);
            state.apply_condition(factory, negated)
        }
        ValueConstraint::Null => state.meet_df_type(factory, value, &DfType::null()),
        ValueConstraint::NotNull => state.meet_df_type(
            factory,
            value,
            &DfType::not_null(TypeConstraint::top()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jdfa_core::{JType, Nullability, TypeRegistry, VariableDescriptor};

    fn param(f: &mut ValueFactory, index: usize, ty: JType) -> ValueId {
        f.get_variable(
            VariableDescriptor::Parameter {
                index,
                name: format!("p{}", index),
                ty,
            },
            None,
        )
    }

    #[test]
    fn constraint_facts() {
        assert_eq!(constraint_fact(ValueConstraint::Any), None);
        assert_eq!(constraint_fact(ValueConstraint::True), Some(DfType::TRUE));
        assert_eq!(
            outcome_fact(ReturnOutcome::New).and_then(|df| df.nullability()),
            Some(Nullability::NotNull)
        );
        assert_eq!(outcome_fact(ReturnOutcome::Parameter(0)), None);
    }

    #[test]
    fn contradicting_constraints_make_the_state_unreachable() {
        let mut f = ValueFactory::new(TypeRegistry::new());
        let mut s = MemoryState::new();
        let p = param(&mut f, 0, JType::STRING);
        assert!(apply_constraint(&mut f, &mut s, p, ValueConstraint::Null));
        assert!(!apply_constraint(&mut f, &mut s, p, ValueConstraint::NotNull));
    }

    #[test]
    fn boolean_constraints_narrow_the_parameter() {
        let mut f = ValueFactory::new(TypeRegistry::new());
        let mut s = MemoryState::new();
        let p = param(&mut f, 0, JType::BOOLEAN);
        assert!(apply_constraint(&mut f, &mut s, p, ValueConstraint::False));
        assert_eq!(s.get_df_type(&f, p), DfType::FALSE);
        assert!(!apply_constraint(&mut f, &mut s, p, ValueConstraint::True));
    }
}
