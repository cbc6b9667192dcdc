//! Workflow definition errors.

use std::io;

use thiserror::Error;

/// Errors raised while loading or validating a workflow definition.
///
/// These indicate a malformed definition rather than a timing issue during
/// execution, so they are surfaced immediately instead of degraded.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow has no blocks")]
    EmptyWorkflow,

    #[error("Block has empty or whitespace-only ID")]
    EmptyBlockId,

    #[error("Duplicate block ID: '{0}'")]
    DuplicateBlockId(String),

    #[error("Connection {source_id} -> {target_id} references unknown block '{missing}'")]
    UnknownConnectionEndpoint {
        source_id: String,
        target_id: String,
        missing: String,
    },

    #[error("Parallel '{0}' has no matching block in the workflow")]
    MissingParallelBlock(String),

    #[error("Block '{0}' is declared as a parallel but is not of type 'parallel'")]
    NotAParallelBlock(String),

    #[error("Parallel '{parallel}' references unknown node '{node}'")]
    UnknownParallelNode { parallel: String, node: String },

    #[error("Node '{node}' belongs to both parallel '{first}' and parallel '{second}'")]
    NodeInMultipleParallels {
        node: String,
        first: String,
        second: String,
    },

    #[error("Workflow contains cyclic connections (blocks depend on each other in a loop)")]
    CyclicDependency,

    #[error("Failed to read workflow file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse workflow YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse workflow JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Several validation problems reported together.
    #[error("{}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n"))]
    Invalid(Vec<WorkflowError>),
}
