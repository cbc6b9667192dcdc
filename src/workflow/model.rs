//! Workflow Data Model
//!
//! Core data structures representing blocks, the connections between them
//! and the parallel constructs that fan out over a distribution.
//!
//! # Example YAML Format
//!
//! ```yaml
//! blocks:
//!   - id: start
//!     type: starter
//!   - id: fanout
//!     type: parallel
//!   - id: check
//!     type: condition
//!     params:
//!       choose_by_iteration: ["yes", "no"]
//!   - id: summarize
//!     type: agent
//!   - id: skip
//!     type: function
//!
//! connections:
//!   - { source: start, target: fanout }
//!   - { source: fanout, target: check, sourceHandle: parallel-start-source }
//!   - { source: check, target: summarize, sourceHandle: condition-yes }
//!   - { source: check, target: skip, sourceHandle: condition-no }
//!
//! parallels:
//!   - id: fanout
//!     nodes: [check, summarize, skip]
//!     distribution: ["a", "b"]
//! ```

use serde::{Deserialize, Serialize};

use super::error::WorkflowError;
use super::value::Value;

/// Source handle of a parallel block feeding its member entry nodes.
pub const PARALLEL_START_HANDLE: &str = "parallel-start-source";

/// Source handle of a parallel block feeding what runs after aggregation.
pub const PARALLEL_END_HANDLE: &str = "parallel-end-source";

/// Prefix of the source handles on a condition block's outgoing edges.
pub const CONDITION_HANDLE_PREFIX: &str = "condition-";

/// Returns the source handle used by the edge of a condition branch.
pub fn condition_handle(condition_id: &str) -> String {
    format!("{}{}", CONDITION_HANDLE_PREFIX, condition_id)
}

/// Kind of a workflow block.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Starter,
    Agent,
    Api,
    Function,
    /// Picks exactly one outgoing `condition-*` branch
    Condition,
    /// Picks exactly one outgoing target
    Router,
    Evaluator,
    Response,
    /// Fans out over a distribution
    Parallel,
}

impl BlockType {
    /// Returns true for blocks that record a routing decision when they run.
    pub fn is_decision(&self) -> bool {
        matches!(self, BlockType::Condition | BlockType::Router)
    }
}

/// A single block of the workflow graph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Block {
    /// Unique identifier
    pub id: String,

    #[serde(rename = "type")]
    pub block_type: BlockType,

    /// Display name from the editor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Free-form block configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Block {
    /// Creates a new block of the given type.
    ///
    /// # Example
    ///
    /// ```
    /// use parallelrunner::workflow::{Block, BlockType};
    ///
    /// let block = Block::new("check", BlockType::Condition).with_name("Check item");
    /// assert_eq!(block.id, "check");
    /// ```
    pub fn new(id: impl Into<String>, block_type: BlockType) -> Self {
        Self {
            id: id.into().trim().to_string(),
            block_type,
            name: None,
            params: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets one configuration parameter, creating the params object if needed.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        match &mut self.params {
            Some(Value::Object(pairs)) => {
                pairs.retain(|(k, _)| *k != key);
                pairs.push((key, value));
            }
            _ => self.params = Some(Value::Object(vec![(key, value)])),
        }
        self
    }

    /// Looks up a configuration parameter.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.as_ref().and_then(|p| p.get(key))
    }
}

/// A directed edge between two blocks.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source: String,
    pub target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Connection {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn with_source_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    pub fn with_target_handle(mut self, handle: impl Into<String>) -> Self {
        self.target_handle = Some(handle.into());
        self
    }

    /// Returns true if the edge leaves through the given source handle.
    pub fn has_source_handle(&self, handle: &str) -> bool {
        self.source_handle.as_deref() == Some(handle)
    }
}

/// Definition of a parallel construct.
///
/// The construct's id is also the id of its `parallel` block. `nodes` are
/// the template blocks run once per distribution item.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParallelConstruct {
    pub id: String,

    #[serde(default)]
    pub nodes: Vec<String>,

    /// Items to fan out over: a list, a map, or a JSON string of either
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<Value>,
}

impl ParallelConstruct {
    pub fn new<I, S>(id: impl Into<String>, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            nodes: nodes.into_iter().map(Into::into).collect(),
            distribution: None,
        }
    }

    pub fn with_distribution(mut self, distribution: impl Into<Value>) -> Self {
        self.distribution = Some(distribution.into());
        self
    }

    /// Returns true if the block is one of this construct's template nodes.
    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.iter().any(|n| n == node_id)
    }
}

/// Read access to a workflow graph.
///
/// The scheduling core only ever reads the definition through this trait.
pub trait WorkflowGraph {
    fn blocks(&self) -> &[Block];
    fn connections(&self) -> &[Connection];
    fn parallels(&self) -> &[ParallelConstruct];

    fn find_block(&self, id: &str) -> Option<&Block> {
        self.blocks().iter().find(|b| b.id == id)
    }

    /// Returns the construct that lists `node_id` among its nodes.
    fn parallel_for_node(&self, node_id: &str) -> Option<&ParallelConstruct> {
        self.parallels().iter().find(|p| p.contains(node_id))
    }
}

/// A complete workflow definition.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Workflow {
    /// Blocks, in topological order once validated
    pub blocks: Vec<Block>,

    #[serde(default)]
    pub connections: Vec<Connection>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parallels: Vec<ParallelConstruct>,
}

impl Workflow {
    /// Creates a new empty workflow.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a block to the workflow.
    pub fn add_block(&mut self, block: Block) -> Result<(), WorkflowError> {
        if self.blocks.iter().any(|b| b.id == block.id) {
            return Err(WorkflowError::DuplicateBlockId(block.id));
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Adds a connection. Endpoints are checked during validation.
    pub fn add_connection(&mut self, connection: Connection) {
        self.connections.push(connection);
    }

    /// Adds a plain connection between two blocks.
    pub fn connect(&mut self, source: &str, target: &str) {
        self.add_connection(Connection::new(source, target));
    }

    /// Adds a connection leaving through a specific source handle.
    pub fn connect_handle(&mut self, source: &str, handle: &str, target: &str) {
        self.add_connection(Connection::new(source, target).with_source_handle(handle));
    }

    pub fn add_parallel(&mut self, parallel: ParallelConstruct) {
        self.parallels.push(parallel);
    }

    pub fn get_parallel(&self, id: &str) -> Option<&ParallelConstruct> {
        self.parallels.iter().find(|p| p.id == id)
    }

    /// Returns the number of blocks in the workflow.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true if the workflow has no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl WorkflowGraph for Workflow {
    fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    fn connections(&self) -> &[Connection] {
        &self.connections
    }

    fn parallels(&self) -> &[ParallelConstruct] {
        &self.parallels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_creation() {
        let block = Block::new("  check ", BlockType::Condition).with_name("Check");
        assert_eq!(block.id, "check");
        assert_eq!(block.name.as_deref(), Some("Check"));
        assert!(block.block_type.is_decision());
    }

    #[test]
    fn test_block_params() {
        let block = Block::new("r", BlockType::Router)
            .with_param("route", "a")
            .with_param("route", "b")
            .with_param("other", true);

        assert_eq!(block.param("route"), Some(&Value::from("b")));
        assert_eq!(block.param("other"), Some(&Value::Bool(true)));
        assert!(block.param("missing").is_none());
    }

    #[test]
    fn test_workflow_add_block_duplicate() {
        let mut workflow = Workflow::new();
        assert!(workflow.add_block(Block::new("a", BlockType::Function)).is_ok());
        let result = workflow.add_block(Block::new("a", BlockType::Agent));
        assert!(matches!(result, Err(WorkflowError::DuplicateBlockId(id)) if id == "a"));
        assert_eq!(workflow.len(), 1);
    }

    #[test]
    fn test_workflow_graph_lookups() {
        let mut workflow = Workflow::new();
        workflow.add_block(Block::new("p", BlockType::Parallel)).unwrap();
        workflow.add_block(Block::new("x", BlockType::Function)).unwrap();
        workflow.add_parallel(ParallelConstruct::new("p", ["x"]));

        assert_eq!(workflow.find_block("x").map(|b| b.block_type), Some(BlockType::Function));
        assert!(workflow.find_block("missing").is_none());
        assert_eq!(workflow.parallel_for_node("x").map(|p| p.id.as_str()), Some("p"));
        assert!(workflow.parallel_for_node("p").is_none());
    }

    #[test]
    fn test_connection_handles() {
        let conn = Connection::new("c", "t").with_source_handle(condition_handle("yes"));
        assert!(conn.has_source_handle("condition-yes"));
        assert!(!conn.has_source_handle("condition-no"));
        assert!(!Connection::new("a", "b").has_source_handle("condition-yes"));
    }

    #[test]
    fn test_connection_camel_case_serde() {
        let json = r#"{"source":"p","target":"x","sourceHandle":"parallel-start-source"}"#;
        let conn: Connection = serde_json::from_str(json).unwrap();
        assert!(conn.has_source_handle(PARALLEL_START_HANDLE));
        assert!(conn.target_handle.is_none());
    }

    #[test]
    fn test_block_type_lowercase_serde() {
        let block: Block = serde_yaml::from_str("id: r\ntype: router\n").unwrap();
        assert_eq!(block.block_type, BlockType::Router);
    }

    #[test]
    fn test_workflow_default() {
        let workflow = Workflow::default();
        assert!(workflow.is_empty());
    }
}
