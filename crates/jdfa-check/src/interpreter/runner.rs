//! The worklist driver.
//!
//! [`DataFlowRunner`] pushes states through a method body until no pending
//! states remain. States waiting at the same join point are merged when
//! they differ in at most one fact, states at loop heads are widened after a
//! few visits, and states already covered by an earlier state at the same
//! instruction are dropped. Two ceilings bound the work: the number of
//! distinct states processed at any one instruction and the total number of
//! steps. Hitting either aborts the run as too complex.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use jdfa_core::{MethodBody, MethodDescriptor, ValueFactory};

use super::error::AnalysisError;
use super::flow::FlowGraph;
use super::queue::StateQueue;
use super::trace::TraceEntry;
use super::visit::Visitor;
use crate::report::AnalysisReport;
use crate::state::MemoryState;

/// Tuning knobs of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Distinct states processed at one instruction before giving up.
    /// Also caps the condition space tracked by contract validation.
    pub max_states_per_branch: usize,
    /// Total worklist steps before giving up.
    pub max_steps: usize,
    /// Visits of a loop head after which incoming states are widened.
    pub widening_threshold: usize,
    /// Record a [`TraceEntry`] per step.
    pub trace_enabled: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            max_states_per_branch: 300,
            max_steps: 100_000,
            widening_threshold: 3,
            trace_enabled: false,
        }
    }
}

/// Shared flag a host sets to stop a run between steps.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        CancellationFlag::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// How a run ended.
///
/// Only a completed run carries results. An aborted run says nothing about
/// the method, which is different from finding no problems in it.
#[derive(Debug, Clone)]
pub enum RunnerOutcome {
    Completed(AnalysisReport),
    TooComplex,
    Cancelled,
}

impl RunnerOutcome {
    pub fn report(&self) -> Option<&AnalysisReport> {
        match self {
            RunnerOutcome::Completed(report) => Some(report),
            RunnerOutcome::TooComplex | RunnerOutcome::Cancelled => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, RunnerOutcome::Completed(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataFlowRunner {
    config: RunnerConfig,
    cancel: CancellationFlag,
}

impl DataFlowRunner {
    pub fn new(config: RunnerConfig) -> Self {
        DataFlowRunner {
            config,
            cancel: CancellationFlag::new(),
        }
    }

    /// Makes the run observe `cancel`.
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// The entry state of a method: nothing known beyond declared types.
    ///
    /// Interns the parameter and `this` variables so that every state of
    /// the run refers to the same handles.
    pub fn initial_state(
        &self,
        factory: &mut ValueFactory,
        descriptor: &MethodDescriptor,
    ) -> MemoryState {
        for index in 0..descriptor.params.len() {
            if let Some(var) = descriptor.param_variable(index) {
                factory.get_variable(var, None);
            }
        }
        if let Some(this) = descriptor.this_variable() {
            factory.get_variable(this, None);
        }
        MemoryState::new()
    }

    /// Analyzes `body` from its entry state.
    pub fn analyze_method(
        &self,
        body: &MethodBody,
        factory: &mut ValueFactory,
    ) -> Result<RunnerOutcome, AnalysisError> {
        let initial = self.initial_state(factory, &body.descriptor);
        self.analyze_with(body, factory, vec![initial])
    }

    /// Analyzes `body` from caller-supplied entry states.
    pub fn analyze_with(
        &self,
        body: &MethodBody,
        factory: &mut ValueFactory,
        initial: Vec<MemoryState>,
    ) -> Result<RunnerOutcome, AnalysisError> {
        let instructions = &body.instructions;
        let flow = FlowGraph::build(instructions)?;
        tracing::debug!(
            "analyzing {} ({} instructions, {} unreachable)",
            body.descriptor.name,
            instructions.len(),
            flow.unreachable().len()
        );

        let mut visitor = Visitor::new(instructions);
        let mut queue = StateQueue::new();
        for state in initial {
            queue.push(0, state);
        }
        let mut processed: BTreeMap<usize, Vec<MemoryState>> = BTreeMap::new();
        let mut depths: BTreeMap<usize, usize> = BTreeMap::new();
        let mut trace = Vec::new();
        let mut steps = 0;

        while let Some((ip, group)) = queue.pop_group() {
            let group = if flow.is_join_point(ip) {
                join_group(factory, ip, group)?
            } else {
                group
            };
            for state in group {
                if self.cancel.is_cancelled() {
                    tracing::info!("analysis of {} cancelled", body.descriptor.name);
                    return Ok(RunnerOutcome::Cancelled);
                }
                steps += 1;
                if steps > self.config.max_steps {
                    tracing::warn!(
                        "{} is too complex: step limit {} reached",
                        body.descriptor.name,
                        self.config.max_steps
                    );
                    return Ok(RunnerOutcome::TooComplex);
                }
                if factory.is_full() {
                    tracing::warn!(
                        "{} is too complex: {} values interned",
                        body.descriptor.name,
                        factory.len()
                    );
                    return Ok(RunnerOutcome::TooComplex);
                }

                match depths.entry(ip) {
                    Entry::Vacant(entry) => {
                        entry.insert(state.stack_size());
                    }
                    Entry::Occupied(entry) if *entry.get() != state.stack_size() => {
                        return Err(AnalysisError::StackShapeMismatch {
                            ip,
                            left: *entry.get(),
                            right: state.stack_size(),
                        });
                    }
                    Entry::Occupied(_) => {}
                }

                let seen = processed.entry(ip).or_default();
                if seen.iter().any(|p| p.is_superstate_of(&state, factory)) {
                    continue;
                }
                let state = match seen.last() {
                    Some(previous)
                        if flow.is_loop_head(ip)
                            && seen.len() >= self.config.widening_threshold =>
                    {
                        let widened = previous
                            .widen(&state, factory)
                            .map_err(|e| AnalysisError::from_state(ip, e))?;
                        if seen.iter().any(|p| p.is_superstate_of(&widened, factory)) {
                            continue;
                        }
                        widened
                    }
                    _ => state,
                };
                if seen.len() >= self.config.max_states_per_branch {
                    tracing::warn!(
                        "{} is too complex: more than {} states at instruction {}",
                        body.descriptor.name,
                        self.config.max_states_per_branch,
                        ip
                    );
                    return Ok(RunnerOutcome::TooComplex);
                }
                seen.push(state.copy());

                let stack_depth = state.stack_size();
                let successors = visitor.visit(factory, ip, state)?;
                let mnemonic = instructions.get(ip).map_or("exit", |i| i.mnemonic());
                tracing::trace!(
                    "step {}: {} at {} -> {:?} ({} pending)",
                    steps,
                    mnemonic,
                    ip,
                    successors.iter().map(|(next, _)| *next).collect::<Vec<_>>(),
                    queue.len()
                );
                if self.config.trace_enabled {
                    trace.push(TraceEntry {
                        step: steps,
                        ip,
                        mnemonic: mnemonic.to_string(),
                        stack_depth,
                        successors: successors.iter().map(|(next, _)| *next).collect(),
                    });
                }
                for (next, successor) in successors {
                    queue.push(next, successor);
                }
            }
        }

        tracing::debug!(
            "finished {} in {} steps, {} terminal states",
            body.descriptor.name,
            steps,
            visitor.terminals.len()
        );
        Ok(RunnerOutcome::Completed(AnalysisReport {
            terminals: visitor.terminals,
            facts: visitor.facts,
            steps,
            trace,
        }))
    }
}

/// Merges the states pending at a join point where that loses little.
fn join_group(
    factory: &mut ValueFactory,
    ip: usize,
    group: Vec<MemoryState>,
) -> Result<Vec<MemoryState>, AnalysisError> {
    let mut joined: Vec<MemoryState> = Vec::with_capacity(group.len());
    for state in group {
        if joined.contains(&state) {
            continue;
        }
        let slot = joined
            .iter_mut()
            .find(|candidate| candidate.can_merge_with(&state, factory));
        match slot {
            Some(slot) => {
                *slot = slot
                    .merge(&state, factory)
                    .map_err(|e| AnalysisError::from_state(ip, e))?;
            }
            None => joined.push(state),
        }
    }
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jdfa_core::{
        AnchorId, BinaryOp, ConstValue, EvalOp, Instruction, JType, Operand, Parameter,
        PrimitiveType, RelationType, TypeRegistry, VariableDescriptor,
    };

    fn local(name: &str) -> Operand {
        Operand::variable(VariableDescriptor::Local {
            name: name.to_string(),
            ty: JType::INT,
        })
    }

    fn int(v: i64) -> Operand {
        Operand::constant(ConstValue::Int(v), JType::INT)
    }

    fn assign(name: &str, value: Operand) -> Vec<Instruction> {
        vec![
            Instruction::push(local(name)),
            Instruction::push(value),
            Instruction::Assign {
                lhs_anchor: None,
                rhs_anchor: None,
                assigned_value: None,
            },
            Instruction::Pop,
        ]
    }

    fn body(params: Vec<Parameter>, instructions: Vec<Instruction>) -> MethodBody {
        let mut descriptor = MethodDescriptor::new("test", params, JType::Void, AnchorId(0));
        descriptor.is_static = true;
        MethodBody::new(descriptor, instructions)
    }

    fn run(config: RunnerConfig, body: &MethodBody) -> RunnerOutcome {
        let mut factory = ValueFactory::new(TypeRegistry::new());
        DataFlowRunner::new(config)
            .analyze_method(body, &mut factory)
            .unwrap()
    }

    /// `for (i = 0; i < 10; i++) {}` with the loop condition anchored.
    fn counting_loop() -> MethodBody {
        let mut code = assign("i", int(0));
        // 4: i < 10
        code.extend([
            Instruction::push(local("i")),
            Instruction::push(int(10)),
            Instruction::eval(EvalOp::Relation {
                relation: RelationType::Lt,
            }),
            Instruction::ConditionalGoto {
                target: 15,
                jump_if: false,
                anchor: Some(AnchorId(1)),
            },
        ]);
        // 8: i = i + 1
        code.extend([
            Instruction::push(local("i")),
            Instruction::push(local("i")),
            Instruction::push(int(1)),
            Instruction::eval(EvalOp::Binary {
                op: BinaryOp::Plus,
                kind: PrimitiveType::Int,
            }),
            Instruction::Assign {
                lhs_anchor: None,
                rhs_anchor: None,
                assigned_value: None,
            },
            Instruction::Pop,
            Instruction::Goto { target: 4 },
        ]);
        // 15: return
        code.push(Instruction::Return {
            has_value: false,
            anchor: None,
        });
        body(Vec::new(), code)
    }

    #[test]
    fn loop_terminates_through_widening() {
        let outcome = run(RunnerConfig::default(), &counting_loop());
        let report = outcome.report().unwrap();
        assert_eq!(report.returns().count(), 1);
        let condition = report
            .facts
            .get(AnchorId(1))
            .and_then(|f| f.condition)
            .unwrap();
        assert!(condition.seen_true && condition.seen_false);
    }

    #[test]
    fn value_limit_aborts() {
        let mut factory = ValueFactory::new(TypeRegistry::new()).with_limit(4);
        let outcome = DataFlowRunner::new(RunnerConfig::default())
            .analyze_method(&counting_loop(), &mut factory)
            .unwrap();
        assert!(matches!(outcome, RunnerOutcome::TooComplex));
    }

    #[test]
    fn step_limit_aborts() {
        let config = RunnerConfig {
            max_steps: 5,
            ..RunnerConfig::default()
        };
        assert!(matches!(
            run(config, &counting_loop()),
            RunnerOutcome::TooComplex
        ));
    }

    #[test]
    fn cancelled_run_reports_nothing() {
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let mut factory = ValueFactory::new(TypeRegistry::new());
        let outcome = DataFlowRunner::default()
            .with_cancellation(cancel)
            .analyze_method(&counting_loop(), &mut factory)
            .unwrap();
        assert!(matches!(outcome, RunnerOutcome::Cancelled));
        assert!(outcome.report().is_none());
    }

    #[test]
    fn trace_records_every_step() {
        let config = RunnerConfig {
            trace_enabled: true,
            ..RunnerConfig::default()
        };
        let code = assign("x", int(1));
        let outcome = run(config, &body(Vec::new(), code));
        let report = outcome.report().unwrap();
        let ips: Vec<usize> = report.trace.iter().map(|t| t.ip).collect();
        assert_eq!(ips, vec![0, 1, 2, 3, 4]);
        assert_eq!(report.trace[2].mnemonic, "assign");
        assert_eq!(report.trace[2].stack_depth, 2);
    }

    #[test]
    fn unbalanced_join_is_a_lowering_error() {
        // 0: push p; 1: if p goto 3; 2: push 1; 3: return
        let p = Operand::variable(VariableDescriptor::Parameter {
            index: 0,
            name: "p".into(),
            ty: JType::BOOLEAN,
        });
        let code = vec![
            Instruction::push(p),
            Instruction::ConditionalGoto {
                target: 3,
                jump_if: true,
                anchor: None,
            },
            Instruction::push(int(1)),
            Instruction::Return {
                has_value: false,
                anchor: None,
            },
        ];
        let method = body(vec![Parameter::new("p", JType::BOOLEAN)], code);
        let mut factory = ValueFactory::new(TypeRegistry::new());
        let err = DataFlowRunner::default()
            .analyze_method(&method, &mut factory)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::StackShapeMismatch { ip: 3, .. }));
    }

    #[test]
    fn config_fills_missing_fields_with_defaults() {
        let config: RunnerConfig = serde_json::from_str(r#"{"max_steps": 10}"#).unwrap();
        assert_eq!(config.max_steps, 10);
        assert_eq!(config.max_states_per_branch, 300);
    }
}
