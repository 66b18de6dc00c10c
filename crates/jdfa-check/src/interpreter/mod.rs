//! Abstract interpreter for lowered method bodies.
//!
//! # Architecture
//!
//! - [`DataFlowRunner`] drives a worklist of `(instruction pointer, state)`
//!   pairs over a method body, ordered lowest instruction first.
//! - A private visitor executes one instruction against one
//!   [`MemoryState`](crate::state::MemoryState) and yields the successor
//!   pairs; evaluations of [`EvalOp`](jdfa_core::EvalOp) never fail and
//!   produce the unknown value when nothing can be decided.
//! - The control-flow graph of the body (built with `petgraph`) tells the
//!   runner where states are merged and where they are widened.
//! - [`AnalysisError`] reports malformed bodies with the instruction
//!   pointer that exposed them.
//! - [`TraceEntry`] records each step when tracing is enabled.
//!
//! # Usage
//!
//! ```ignore
//! let mut factory = ValueFactory::new(TypeRegistry::new());
//! let runner = DataFlowRunner::new(RunnerConfig::default());
//! match runner.analyze_method(&body, &mut factory)? {
//!     RunnerOutcome::Completed(report) => { /* use report.problems(..) */ }
//!     RunnerOutcome::TooComplex | RunnerOutcome::Cancelled => { /* no verdict */ }
//! }
//! ```

pub mod error;
pub mod runner;
pub mod trace;

mod eval;
mod flow;
mod queue;
mod visit;

pub use error::AnalysisError;
pub use runner::{CancellationFlag, DataFlowRunner, RunnerConfig, RunnerOutcome};
pub use trace::TraceEntry;
