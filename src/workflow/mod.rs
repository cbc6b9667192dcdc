//! Workflow Definition Module
//!
//! Provides data structures and utilities for defining, parsing, and
//! validating graph-based workflows.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Block, Connection, ParallelConstruct, Workflow)
//! - [`value`]: Closed value type for items, params and outputs
//! - [`graph`]: Connection index used during routing
//! - [`parser`]: YAML/JSON parsing and loading
//! - [`validator`]: Validation rules and topological ordering

pub mod error;
pub mod graph;
pub mod model;
pub mod parser;
pub mod validator;
pub mod value;

pub use error::WorkflowError;
pub use graph::ConnectionGraph;
pub use model::{
    condition_handle, Block, BlockType, Connection, ParallelConstruct, Workflow, WorkflowGraph,
    CONDITION_HANDLE_PREFIX, PARALLEL_END_HANDLE, PARALLEL_START_HANDLE,
};
pub use parser::{load_workflow, parse_workflow, save_workflow, WorkflowFormat};
pub use validator::{quick_validate, validate_workflow};
pub use value::Value;
