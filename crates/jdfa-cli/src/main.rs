//! Data flow analysis CLI.
//!
//! Provides the `jdfa` binary with two subcommands:
//! - `analyze` runs the engine over a lowered method body stored as JSON and
//!   prints the terminal states, the derived problems and, when the method
//!   declares a contract, its validation and checking results.
//! - `contracts` validates contract text against a method signature given
//!   on the command line.
//!
//! Output is JSON on stdout; logs go to stderr and follow `RUST_LOG`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use jdfa_check::contracts::StandardMethodContract;
use jdfa_check::{
    validate_method_contracts, AnalysisReport, ContractChecker, ContractProblem, DataFlowRunner,
    Problem, RunnerConfig, RunnerOutcome, TerminalExit,
};
use jdfa_core::{AnchorId, JType, MethodBody, MethodDescriptor, Parameter, TypeRegistry, ValueFactory};

/// Data flow analysis of lowered method bodies.
#[derive(Parser)]
#[command(name = "jdfa", about = "Data flow analysis of lowered method bodies")]
struct Cli {
    /// Log engine progress to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Analyze a method body.
    Analyze {
        /// Path to the method body JSON file.
        body: PathBuf,

        /// Runner configuration JSON file (default: built-in limits).
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate contract text against a method signature.
    Contracts {
        /// Parameter types, comma separated (e.g. `int,String`).
        #[arg(short, long, value_delimiter = ',')]
        params: Vec<String>,

        /// Return type.
        #[arg(short, long, default_value = "void")]
        returns: String,

        /// The method is static.
        #[arg(long = "static")]
        is_static: bool,

        /// The method is pure.
        #[arg(long)]
        pure: bool,

        /// Mutation signature (e.g. `this,param1`).
        #[arg(long)]
        mutates: Option<String>,

        /// Contract text, e.g. `"null -> false; !null -> true"`.
        contract: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Commands::Analyze { body, config } => run_analyze(&body, config.as_deref()),
        Commands::Contracts {
            params,
            returns,
            is_static,
            pure,
            mutates,
            contract,
        } => run_contracts(&params, &returns, is_static, pure, mutates, contract),
    };
    process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Serialize)]
struct TerminalSummary {
    ip: usize,
    exit: TerminalExit,
    #[serde(skip_serializing_if = "Option::is_none")]
    anchor: Option<AnchorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

#[derive(Serialize)]
struct AnalyzeOutput {
    method: String,
    steps: usize,
    terminals: Vec<TerminalSummary>,
    problems: Vec<Problem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    contract_problems: Vec<ContractProblem>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    contract_violations: BTreeMap<AnchorId, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    trace: Vec<jdfa_check::TraceEntry>,
}

/// Execute the analyze subcommand.
///
/// Returns exit code: 0 = success, 1 = malformed input,
/// 2 = analysis too complex or cancelled.
fn run_analyze(body_path: &Path, config_path: Option<&Path>) -> i32 {
    let config = match config_path {
        Some(path) => match read_json::<RunnerConfig>(path) {
            Ok(config) => config,
            Err(msg) => {
                eprintln!("Error: {}", msg);
                return 1;
            }
        },
        None => RunnerConfig::default(),
    };
    let body = match read_json::<MethodBody>(body_path) {
        Ok(body) => body,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return 1;
        }
    };

    let types = TypeRegistry::new();
    let mut factory = ValueFactory::new(types.clone());
    let runner = DataFlowRunner::new(config.clone());
    let report = match runner.analyze_method(&body, &mut factory) {
        Ok(RunnerOutcome::Completed(report)) => report,
        Ok(RunnerOutcome::TooComplex) => {
            eprintln!("Method '{}' is too complex to analyze", body.descriptor.name);
            return 2;
        }
        Ok(RunnerOutcome::Cancelled) => {
            eprintln!("Analysis of '{}' was cancelled", body.descriptor.name);
            return 2;
        }
        Err(e) => {
            eprintln!("Error: malformed method body: {}", e);
            return 1;
        }
    };

    let contract_problems =
        validate_method_contracts(&body.descriptor, &types, config.max_states_per_branch);
    let contract_violations = match check_own_contract(&runner, &body, &types, &contract_problems)
    {
        Ok(violations) => violations,
        Err(e) => {
            eprintln!("Error: malformed method body: {}", e);
            return 1;
        }
    };

    let output = AnalyzeOutput {
        method: body.descriptor.name.clone(),
        steps: report.steps,
        terminals: summarize(&report, &factory),
        problems: report.problems(&types),
        contract_problems,
        contract_violations,
        trace: report.trace.clone(),
    };
    print_json(&output);
    0
}

/// Checks every declared clause that passed validation.
fn check_own_contract(
    runner: &DataFlowRunner,
    body: &MethodBody,
    types: &TypeRegistry,
    problems: &[ContractProblem],
) -> Result<BTreeMap<AnchorId, String>, jdfa_check::AnalysisError> {
    let mut violations = BTreeMap::new();
    let Some(text) = body.descriptor.contract.as_deref() else {
        return Ok(violations);
    };
    // Syntax errors were already reported by validation.
    let Ok(clauses) = StandardMethodContract::parse_contract(text) else {
        return Ok(violations);
    };
    let checker = ContractChecker::new(runner);
    for (index, clause) in clauses.iter().enumerate() {
        if problems.iter().any(|p| p.clause_index == Some(index)) {
            continue;
        }
        for (anchor, message) in checker.check_contract_clause(body, types, clause, true)? {
            violations.entry(anchor).or_insert(message);
        }
    }
    Ok(violations)
}

fn summarize(report: &AnalysisReport, factory: &ValueFactory) -> Vec<TerminalSummary> {
    report
        .terminals
        .iter()
        .map(|t| TerminalSummary {
            ip: t.ip,
            exit: t.exit,
            anchor: t.anchor,
            value: t
                .return_fact
                .as_ref()
                .map(|fact| fact.display(factory.types())),
        })
        .collect()
}

/// Execute the contracts subcommand.
///
/// Returns exit code: 0 = validated (problems, if any, are printed),
/// 1 = unknown type name.
fn run_contracts(
    params: &[String],
    returns: &str,
    is_static: bool,
    pure: bool,
    mutates: Option<String>,
    contract: String,
) -> i32 {
    let types = TypeRegistry::new();
    let mut parameters = Vec::with_capacity(params.len());
    for (i, name) in params.iter().filter(|p| !p.trim().is_empty()).enumerate() {
        match resolve(&types, name) {
            Ok(ty) => parameters.push(Parameter::new(&format!("p{}", i + 1), ty)),
            Err(msg) => {
                eprintln!("Error: {}", msg);
                return 1;
            }
        }
    }
    let return_type = match resolve(&types, returns) {
        Ok(ty) => ty,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return 1;
        }
    };

    let mut descriptor = MethodDescriptor::new("method", parameters, return_type, AnchorId(0));
    descriptor.is_static = is_static;
    descriptor.pure = pure;
    descriptor.mutates = mutates;
    descriptor.contract = Some(contract);

    let problems =
        validate_method_contracts(&descriptor, &types, RunnerConfig::default().max_states_per_branch);
    tracing::debug!("{} contract problem(s)", problems.len());
    print_json(&problems);
    0
}

fn resolve(types: &TypeRegistry, name: &str) -> Result<JType, String> {
    types
        .resolve_type_name(name)
        .ok_or_else(|| format!("unknown type '{}'", name.trim()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to read '{}': {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid JSON in '{}': {}", path.display(), e))
}

fn print_json<T: Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize output: {}\"}}", e));
    println!("{}", json);
}
