//! Workflow Execution Module
//!
//! Runtime side of parallel constructs: instance identity, per-run state,
//! routing rules, the orchestrator that drives constructs to completion,
//! and a reference engine that ties them together.
//!
//! # Architecture
//!
//! - [`identity`]: Real and virtual instance keys
//! - [`state`]: Per-construct distribution, results and counters
//! - [`context`]: Run-wide execution context
//! - [`routing`]: Eligibility and completion rules
//! - [`orchestrator`]: Construct lifecycle, instance scheduling, item binding
//! - [`aggregate`]: Parallel block outputs
//! - [`runner`]: Block execution seam
//! - [`engine`]: Pass-based reference executor

pub mod aggregate;
pub mod context;
pub mod engine;
pub mod identity;
pub mod orchestrator;
pub mod routing;
pub mod runner;
pub mod state;

pub use context::{Decision, ExecutionContext};
pub use engine::{Engine, EngineError, RunReport, DEFAULT_MAX_PASSES};
pub use identity::{BlockKey, VirtualBlockId};
pub use orchestrator::{
    bind_iteration_context, instances_to_run, ConstructPhase, ParallelOrchestrator, TickAction,
};
pub use routing::RoutingEvaluator;
pub use runner::{BlockOutcome, BlockRunner, Invocation, RunnerError, ScriptedRunner};
pub use state::{Distribution, DistributionItem, ParallelState, ParallelStateStore};
