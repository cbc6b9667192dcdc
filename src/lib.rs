//! ParallelRunner - Parallel Block Execution for Graph Workflows
//!
//! Runs a sub-graph of a workflow once per item of a distribution, keeps
//! every iteration's routing decisions separate, and folds the iteration
//! results back into a single ordered output before execution continues
//! past the construct.
//!
//! # Architecture
//!
//! The library is organized into three main modules:
//!
//! - [`workflow`]: Data structures, parsing and validation of workflow definitions
//! - [`execution`]: Virtual instances, routing, the parallel orchestrator and engine
//! - [`monitoring`]: Execution timeline and per-construct summaries
//!
//! # Example
//!
//! ```rust,no_run
//! use parallelrunner::execution::{Engine, ScriptedRunner};
//! use parallelrunner::load_workflow;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load a workflow from YAML
//!     let workflow = load_workflow("fanout.yaml")?;
//!
//!     // Create execution engine
//!     let mut engine = Engine::new(workflow, ScriptedRunner::new());
//!     engine.set_max_passes(500);
//!
//!     // Execute the workflow
//!     let report = engine.run()?;
//!     for (parallel_id, output) in &report.outputs {
//!         println!("{}: {}", parallel_id, output);
//!     }
//!     Ok(())
//! }
//! ```

pub mod execution;
pub mod monitoring;
pub mod workflow;

// Re-export commonly used types
pub use execution::engine::Engine;
pub use execution::orchestrator::ParallelOrchestrator;
pub use workflow::model::{Block, BlockType, ParallelConstruct, Workflow};
pub use workflow::parser::load_workflow;
pub use workflow::value::Value;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "ParallelRunner";
