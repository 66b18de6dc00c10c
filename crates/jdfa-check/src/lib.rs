pub mod state;
pub mod interpreter;
pub mod report;
pub mod contracts;

// Re-export commonly used types
pub use state::{MemoryState, StateError};
pub use interpreter::{
    AnalysisError, CancellationFlag, DataFlowRunner, RunnerConfig, RunnerOutcome, TraceEntry,
};
pub use report::{AnalysisReport, FactCollector, Problem, ProblemKind, TerminalExit, TerminalState};
pub use contracts::check::ContractChecker;
pub use contracts::validate::{
    validate_contract, validate_method_contracts, validate_mutation, ContractProblem,
    ContractProblemKind, UnreachableReason,
};
