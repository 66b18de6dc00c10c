//! Transfer functions of the instruction set.
//!
//! [`Visitor::visit`] executes one instruction against one state and returns
//! the successor `(instruction pointer, state)` pairs. No successors means
//! the path ended: it returned, threw out of the method, or turned out to
//! be infeasible.

use jdfa_core::constraint::check_instance_of;
use jdfa_core::{
    AnchorId, DfType, Instruction, JType, MethodCallInstruction, Nullability, RelationType,
    ReturnOutcome, SpecialField, TypeCastInstruction, TypeCheckOutcome, TypeConstraint, TypeId,
    ValueConstraint, ValueFactory, ValueId, ValueKind, VariableDescriptor,
};

use super::error::AnalysisError;
use super::eval::evaluate;
use crate::contracts::{apply_constraint, outcome_fact};
use crate::report::{FactCollector, TerminalExit, TerminalState};
use crate::state::MemoryState;

pub(crate) type Successors = Vec<(usize, MemoryState)>;

pub(crate) struct Visitor<'a> {
    instructions: &'a [Instruction],
    pub(crate) facts: FactCollector,
    pub(crate) terminals: Vec<TerminalState>,
    /// Instruction being visited.
    ip: usize,
}

impl<'a> Visitor<'a> {
    pub(crate) fn new(instructions: &'a [Instruction]) -> Self {
        Visitor {
            instructions,
            facts: FactCollector::new(),
            terminals: Vec::new(),
            ip: 0,
        }
    }

    pub(crate) fn visit(
        &mut self,
        factory: &mut ValueFactory,
        ip: usize,
        mut state: MemoryState,
    ) -> Result<Successors, AnalysisError> {
        let at = |e| AnalysisError::from_state(ip, e);
        let next = ip + 1;
        self.ip = ip;

        let instructions = self.instructions;
        let Some(instruction) = instructions.get(ip) else {
            // Falling off the end is a void return.
            self.terminate(factory, ip, TerminalExit::Return, None, None, state);
            return Ok(Vec::new());
        };

        match instruction {
            Instruction::Push { value, .. } => {
                let value = factory.intern_operand(value);
                state.push(value);
                Ok(vec![(next, state)])
            }
            Instruction::PushValue { df_type, .. } => {
                let value = factory.get_type_value(df_type.clone());
                state.push(value);
                Ok(vec![(next, state)])
            }
            Instruction::Eval(eval) => {
                let args = state.pop_n(eval.op.arity()).map_err(at)?;
                let result = evaluate(factory, &state, &eval.op, &args);
                if let Some(anchor) = eval.anchor {
                    let df = state.get_df_type(factory, result);
                    self.facts.record_result(anchor, &df, factory.types());
                }
                state.push(result);
                Ok(vec![(next, state)])
            }
            Instruction::Assign { assigned_value, .. } => {
                let popped = state.pop().map_err(at)?;
                let dest = state.pop().map_err(at)?;
                let value = match assigned_value {
                    Some(operand) => factory.intern_operand(operand),
                    None => popped,
                };
                if matches!(factory.kind(dest), ValueKind::Constant { .. }) {
                    return Err(AnalysisError::NonVariableAssignTarget { ip });
                }
                // Stores into untracked locations, such as array elements,
                // bind nothing.
                if factory.is_variable(dest) {
                    state.assign(factory, dest, value);
                }
                state.push(value);
                Ok(vec![(next, state)])
            }
            Instruction::ArrayAccess {
                value,
                element_type,
                exception_transfer,
                anchor,
            } => {
                let index = state.pop().map_err(at)?;
                let array = state.pop().map_err(at)?;
                let (continued, mut successors) =
                    self.dereference(factory, state, array, *anchor, *exception_transfer);
                let Some(state) = continued else {
                    return Ok(successors);
                };
                let element = match value {
                    Some(operand) => factory.intern_operand(operand),
                    None => {
                        let df = DfType::from_jtype(element_type, factory.types());
                        factory.get_type_value(df)
                    }
                };
                successors.extend(self.access_element(
                    factory,
                    state,
                    ElementAccess {
                        array,
                        index,
                        element,
                        next,
                        transfer: *exception_transfer,
                        anchor: *anchor,
                    },
                ));
                Ok(successors)
            }
            Instruction::Box { primitive, .. } => {
                let value = state.pop().map_err(at)?;
                let boxed = factory.get_boxed(value, primitive.box_class());
                state.push(boxed);
                Ok(vec![(next, state)])
            }
            Instruction::TypeCast(cast) => {
                let value = state.pop().map_err(at)?;
                Ok(self.type_cast(factory, state, value, cast, next))
            }
            Instruction::FlushVariable { variable } => {
                let variable = factory.intern_operand(variable);
                state.flush_variable(factory, variable);
                Ok(vec![(next, state)])
            }
            Instruction::FlushFields => {
                state.flush_fields(factory, |_| true);
                Ok(vec![(next, state)])
            }
            Instruction::MethodReference { anchor } => {
                let qualifier = state.peek(0).map_err(at)?;
                let (continued, mut successors) =
                    self.dereference(factory, state, qualifier, *anchor, None);
                successors.extend(continued.map(|s| (next, s)));
                Ok(successors)
            }
            Instruction::ResultOf { anchor } => {
                let value = state.peek(0).map_err(at)?;
                let df = state.get_df_type(factory, value);
                self.facts.record_result(*anchor, &df, factory.types());
                Ok(vec![(next, state)])
            }
            Instruction::UnwrapSpecialField { field, anchor } => {
                let qualifier = state.pop().map_err(at)?;
                let (continued, mut successors) =
                    self.dereference(factory, state, qualifier, *anchor, None);
                if let Some(mut state) = continued {
                    let boxed_inner = match factory.kind(qualifier) {
                        ValueKind::Boxed { inner, .. } if *field == SpecialField::Unbox => {
                            Some(*inner)
                        }
                        _ => None,
                    };
                    let unwrapped = boxed_inner.unwrap_or_else(|| {
                        factory.get_variable(VariableDescriptor::Special(*field), Some(qualifier))
                    });
                    state.push(unwrapped);
                    successors.push((next, state));
                }
                Ok(successors)
            }
            Instruction::MethodCall(call) => self.method_call(factory, ip, state, call),
            Instruction::Goto { target } => Ok(vec![(*target, state)]),
            Instruction::ConditionalGoto {
                target,
                jump_if,
                anchor,
            } => {
                let condition = state.pop().map_err(at)?;
                let negated = factory.negate_condition(condition);
                let mut when_true = state.copy();
                let true_feasible = when_true.apply_condition(factory, condition);
                let mut when_false = state;
                let false_feasible = when_false.apply_condition(factory, negated);
                if let Some(anchor) = anchor {
                    self.facts
                        .record_condition(*anchor, true_feasible, false_feasible);
                }
                let ((jump, jump_ok), (fall, fall_ok)) = if *jump_if {
                    ((when_true, true_feasible), (when_false, false_feasible))
                } else {
                    ((when_false, false_feasible), (when_true, true_feasible))
                };
                let mut successors = Vec::with_capacity(2);
                if jump_ok {
                    successors.push((*target, jump));
                }
                if fall_ok {
                    successors.push((next, fall));
                }
                Ok(successors)
            }
            Instruction::Return { has_value, anchor } => {
                let value = if *has_value {
                    Some(state.pop().map_err(at)?)
                } else {
                    None
                };
                self.terminate(factory, ip, TerminalExit::Return, *anchor, value, state);
                Ok(Vec::new())
            }
            Instruction::Throw { anchor } => {
                let exception = state.pop().map_err(at)?;
                let (continued, mut successors) =
                    self.dereference(factory, state, exception, *anchor, None);
                let Some(mut state) = continued else {
                    return Ok(successors);
                };
                match state.pop_transfer() {
                    Ok(handler) => {
                        state.clear_stack();
                        state.push(exception);
                        successors.push((handler, state));
                    }
                    Err(_) => {
                        self.terminate(
                            factory,
                            ip,
                            TerminalExit::Throw,
                            *anchor,
                            Some(exception),
                            state,
                        );
                    }
                }
                Ok(successors)
            }
            Instruction::Pop => {
                state.pop().map_err(at)?;
                Ok(vec![(next, state)])
            }
            Instruction::Dup => {
                let top = state.peek(0).map_err(at)?;
                state.push(top);
                Ok(vec![(next, state)])
            }
            Instruction::EnterTry { handler } => {
                state.push_transfer(*handler);
                Ok(vec![(next, state)])
            }
            Instruction::ExitTry => {
                state.pop_transfer().map_err(at)?;
                Ok(vec![(next, state)])
            }
        }
    }

    /// Splits `state` on the nullness of a dereferenced value.
    ///
    /// Returns the state in which the dereference succeeds, if any, and the
    /// exception paths it spawned.
    fn dereference(
        &mut self,
        factory: &mut ValueFactory,
        mut state: MemoryState,
        value: ValueId,
        anchor: Option<AnchorId>,
        transfer: Option<usize>,
    ) -> (Option<MemoryState>, Successors) {
        let nullability = state
            .get_df_type(factory, value)
            .nullability()
            .unwrap_or(Nullability::NotNull);
        if let Some(anchor) = anchor {
            self.facts.record_dereference(anchor, nullability);
        }
        match nullability {
            Nullability::NotNull => (Some(state), Vec::new()),
            Nullability::Null => {
                let thrown =
                    self.throw_implicit(factory, state, transfer, TypeId::NULL_POINTER_EXCEPTION);
                (None, thrown)
            }
            Nullability::Nullable => {
                let mut on_null = state.copy();
                let thrown = if on_null.meet_df_type(factory, value, &DfType::null()) {
                    self.throw_implicit(factory, on_null, transfer, TypeId::NULL_POINTER_EXCEPTION)
                } else {
                    Vec::new()
                };
                let continued = state
                    .meet_df_type(factory, value, &DfType::not_null_object())
                    .then_some(state);
                (continued, thrown)
            }
            Nullability::Unknown => {
                // Not known to be nullable: assume the dereference succeeds.
                let continued = state
                    .meet_df_type(factory, value, &DfType::not_null_object())
                    .then_some(state);
                (continued, Vec::new())
            }
        }
    }

    /// Sends an implicitly raised exception to its handler.
    ///
    /// The target is the instruction's own transfer, else the innermost
    /// active handler. An exception escaping the method ends the path as an
    /// unanchored throw terminal.
    fn throw_implicit(
        &mut self,
        factory: &mut ValueFactory,
        mut state: MemoryState,
        transfer: Option<usize>,
        class: TypeId,
    ) -> Successors {
        let df = DfType::not_null(TypeConstraint::instance_of(class, factory.types()));
        let exception = factory.get_type_value(df);
        let target = match transfer {
            Some(target) => target,
            None => match state.pop_transfer() {
                Ok(handler) => handler,
                Err(_) => {
                    state.clear_stack();
                    let ip = self.ip;
                    self.terminate(factory, ip, TerminalExit::Throw, None, Some(exception), state);
                    return Vec::new();
                }
            },
        };
        state.clear_stack();
        state.push(exception);
        vec![(target, state)]
    }

    fn access_element(
        &mut self,
        factory: &mut ValueFactory,
        state: MemoryState,
        access: ElementAccess,
    ) -> Successors {
        let ElementAccess {
            array,
            index,
            element,
            next,
            transfer,
            anchor,
        } = access;
        let length =
            factory.get_variable(VariableDescriptor::Special(SpecialField::ArrayLength), Some(array));
        let zero = factory.get_int(0);

        let mut inside = state.copy();
        let in_bounds = inside.apply_relation(factory, index, RelationType::Ge, zero)
            && inside.apply_relation(factory, index, RelationType::Lt, length);
        let below = state
            .copy()
            .apply_relation(factory, index, RelationType::Lt, zero);
        let above = state
            .copy()
            .apply_relation(factory, index, RelationType::Ge, length);
        if let Some(anchor) = anchor {
            self.facts.record_index(anchor, in_bounds, below || above);
        }

        let mut successors = Vec::new();
        if below || above {
            successors.extend(self.throw_implicit(
                factory,
                state,
                transfer,
                TypeId::ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION,
            ));
        }
        if in_bounds {
            inside.push(element);
            successors.push((next, inside));
        }
        successors
    }

    fn type_cast(
        &mut self,
        factory: &mut ValueFactory,
        state: MemoryState,
        value: ValueId,
        cast: &TypeCastInstruction,
        next: usize,
    ) -> Successors {
        let reg = factory.types();
        let target = TypeConstraint::instance_of(cast.cast_to(), reg);
        let outcome = match state.get_df_type(factory, value).as_reference() {
            // null passes every cast
            Some(r) if r.nullability == Nullability::Null => TypeCheckOutcome::Always,
            Some(r) => check_instance_of(&r.constraint, &target, reg),
            None => TypeCheckOutcome::Unknown,
        };
        let passed = DfType::reference(Nullability::Unknown, target.clone());
        let failed = target
            .try_negate(reg)
            .map(DfType::not_null)
            .unwrap_or_else(DfType::not_null_object);

        let mut on_pass = state.copy();
        let can_pass =
            outcome != TypeCheckOutcome::Never && on_pass.meet_df_type(factory, value, &passed);
        let mut on_fail = state;
        let can_fail =
            outcome != TypeCheckOutcome::Always && on_fail.meet_df_type(factory, value, &failed);
        if let Some(anchor) = cast.anchor() {
            self.facts.record_cast(anchor, can_pass, can_fail);
        }

        let mut successors = Vec::new();
        if can_fail {
            successors.extend(self.throw_implicit(
                factory,
                on_fail,
                cast.exception_transfer(),
                TypeId::CLASS_CAST_EXCEPTION,
            ));
        }
        if can_pass {
            on_pass.push(value);
            successors.push((next, on_pass));
        }
        successors
    }

    fn method_call(
        &mut self,
        factory: &mut ValueFactory,
        ip: usize,
        mut state: MemoryState,
        call: &MethodCallInstruction,
    ) -> Result<Successors, AnalysisError> {
        let at = |e| AnalysisError::from_state(ip, e);
        let args = state.pop_n(call.arg_count).map_err(at)?;
        let qualifier = if call.has_qualifier {
            Some(state.pop().map_err(at)?)
        } else {
            None
        };

        let mut successors = Vec::new();
        if let Some(qualifier) = qualifier {
            let (continued, thrown) =
                self.dereference(factory, state, qualifier, call.anchor, call.exception_transfer);
            successors.extend(thrown);
            match continued {
                Some(continued) => state = continued,
                None => return Ok(successors),
            }
        }

        if !call.pure {
            match &call.mutates {
                Some(signature) => {
                    let mut mutated: Vec<ValueId> = signature
                        .params
                        .iter()
                        .filter_map(|i| args.get(*i).copied())
                        .collect();
                    if signature.this {
                        mutated.extend(qualifier);
                    }
                    state.flush_fields(factory, |field| {
                        mutated
                            .iter()
                            .any(|m| factory.qualifier_chain_contains(field, *m))
                    });
                }
                None => state.flush_fields(factory, |_| true),
            }
        }

        // Any call may throw; only a reachable handler makes that observable.
        if call.exception_transfer.is_some() || state.active_transfer().is_some() {
            successors.extend(self.throw_implicit(
                factory,
                state.copy(),
                call.exception_transfer,
                TypeId::THROWABLE,
            ));
        }

        let next = ip + 1;
        let declared = DfType::from_jtype(&call.return_type, factory.types());
        let mut unmatched = vec![state];
        for contract in &call.contracts {
            if contract.constraints.len() != args.len() {
                continue;
            }
            let mut remaining = Vec::new();
            for candidate in unmatched {
                let mut matching = candidate.copy();
                let applies = contract
                    .constraints
                    .iter()
                    .zip(&args)
                    .all(|(c, arg)| apply_constraint(factory, &mut matching, *arg, *c));
                if applies {
                    if contract.outcome == ReturnOutcome::Fail {
                        successors.extend(self.throw_implicit(
                            factory,
                            matching,
                            call.exception_transfer,
                            TypeId::RUNTIME_EXCEPTION,
                        ));
                    } else {
                        let result = match contract.outcome {
                            ReturnOutcome::This => qualifier,
                            ReturnOutcome::Parameter(i) => args.get(i).copied(),
                            outcome => match outcome_fact(outcome) {
                                Some(fact) => {
                                    let narrowed = declared.meet(&fact, factory.types());
                                    if narrowed.is_bottom() {
                                        None
                                    } else {
                                        Some(factory.get_type_value(narrowed))
                                    }
                                }
                                None => None,
                            },
                        };
                        let result = result.unwrap_or_else(|| factory.get_type_value(declared.clone()));
                        if call.return_type != JType::Void {
                            matching.push(result);
                        }
                        successors.push((next, matching));
                    }
                }
                remaining.extend(excluding(factory, candidate, &contract.constraints, &args));
            }
            unmatched = remaining;
        }

        for mut state in unmatched {
            if call.return_type != JType::Void {
                let result = factory.get_type_value(declared.clone());
                state.push(result);
            }
            successors.push((next, state));
        }
        Ok(successors)
    }

    fn terminate(
        &mut self,
        factory: &ValueFactory,
        ip: usize,
        exit: TerminalExit,
        anchor: Option<AnchorId>,
        value: Option<ValueId>,
        state: MemoryState,
    ) {
        let return_fact = value.map(|v| state.get_df_type(factory, v));
        self.terminals.push(TerminalState {
            ip,
            exit,
            anchor,
            return_value: value,
            return_fact,
            state,
        });
    }
}

struct ElementAccess {
    array: ValueId,
    index: ValueId,
    element: ValueId,
    next: usize,
    transfer: Option<usize>,
    anchor: Option<AnchorId>,
}

/// The feasible states of `state` in which the clause conditions do not all
/// hold, as disjoint pieces: the first `i` constraints hold and the `i+1`-th
/// fails.
fn excluding(
    factory: &mut ValueFactory,
    state: MemoryState,
    constraints: &[ValueConstraint],
    args: &[ValueId],
) -> Vec<MemoryState> {
    let mut pieces = Vec::new();
    let mut prefix = state;
    for (constraint, arg) in constraints.iter().zip(args) {
        let Some(negated) = constraint.negate() else {
            continue;
        };
        let mut piece = prefix.copy();
        if apply_constraint(factory, &mut piece, *arg, negated) {
            pieces.push(piece);
        }
        if !apply_constraint(factory, &mut prefix, *arg, *constraint) {
            break;
        }
    }
    pieces
}
