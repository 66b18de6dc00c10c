//! Execution trace recording for the runner.
//!
//! When tracing is enabled via [`RunnerConfig::trace_enabled`], the runner
//! records a [`TraceEntry`] for every processed worklist item.
//!
//! [`RunnerConfig::trace_enabled`]: super::runner::RunnerConfig::trace_enabled

use serde::{Deserialize, Serialize};

/// One processed `(instruction, state)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Worklist step number, starting at 1.
    pub step: usize,
    pub ip: usize,
    pub mnemonic: String,
    /// Operand stack depth before the instruction ran.
    pub stack_depth: usize,
    /// Instruction pointers of the successor states.
    pub successors: Vec<usize>,
}
