//! Workflow Validation
//!
//! Provides validation for workflow definitions including:
//! - Block field validation
//! - Connection endpoint integrity
//! - Parallel construct membership checks
//! - Topological sorting (no cycles)

use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, info, warn};

use super::error::WorkflowError;
use super::model::{Block, BlockType, Workflow};

/// Validates the entire workflow structure.
///
/// Performs the following checks:
/// 1. Workflow is not empty
/// 2. No empty or duplicate block IDs
/// 3. Every connection endpoint is a known block
/// 4. Every parallel construct has a `parallel` block and known member nodes
/// 5. No node belongs to two constructs
/// 6. Topological sort succeeds (no cycles)
///
/// On success, the blocks are reordered in topological order.
pub fn validate_workflow(workflow: &mut Workflow) -> Result<(), WorkflowError> {
    info!("Validating workflow with {} blocks", workflow.blocks.len());

    if workflow.blocks.is_empty() {
        return Err(WorkflowError::EmptyWorkflow);
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for block in &workflow.blocks {
        if block.id.trim().is_empty() {
            return Err(WorkflowError::EmptyBlockId);
        }
        if !seen_ids.insert(block.id.as_str()) {
            return Err(WorkflowError::DuplicateBlockId(block.id.clone()));
        }
    }

    let mut all_errors = Vec::new();

    for conn in &workflow.connections {
        for endpoint in [&conn.source, &conn.target] {
            if !seen_ids.contains(endpoint.as_str()) {
                all_errors.push(WorkflowError::UnknownConnectionEndpoint {
                    source_id: conn.source.clone(),
                    target_id: conn.target.clone(),
                    missing: endpoint.clone(),
                });
            }
        }
    }

    let mut owner: HashMap<&str, &str> = HashMap::new();
    for parallel in &workflow.parallels {
        match workflow.blocks.iter().find(|b| b.id == parallel.id) {
            None => all_errors.push(WorkflowError::MissingParallelBlock(parallel.id.clone())),
            Some(block) if block.block_type != BlockType::Parallel => {
                all_errors.push(WorkflowError::NotAParallelBlock(parallel.id.clone()))
            }
            Some(_) => {}
        }

        for node in &parallel.nodes {
            if !seen_ids.contains(node.as_str()) {
                all_errors.push(WorkflowError::UnknownParallelNode {
                    parallel: parallel.id.clone(),
                    node: node.clone(),
                });
                continue;
            }
            if let Some(first) = owner.insert(node.as_str(), parallel.id.as_str()) {
                all_errors.push(WorkflowError::NodeInMultipleParallels {
                    node: node.clone(),
                    first: first.to_string(),
                    second: parallel.id.clone(),
                });
            }
        }

        if parallel.distribution.is_none() {
            warn!("Parallel '{}' has no distribution; it will run zero iterations", parallel.id);
        }
    }

    if !all_errors.is_empty() {
        return Err(if all_errors.len() == 1 {
            all_errors.remove(0)
        } else {
            WorkflowError::Invalid(all_errors)
        });
    }

    for block in &workflow.blocks {
        log_block_shape(workflow, block);
    }

    topological_sort(workflow)?;

    info!(
        "Workflow validated: {} blocks, {} connections, {} parallels",
        workflow.blocks.len(),
        workflow.connections.len(),
        workflow.parallels.len()
    );
    Ok(())
}

fn log_block_shape(workflow: &Workflow, block: &Block) {
    let has_in = workflow.connections.iter().any(|c| c.target == block.id);
    let has_out = workflow.connections.iter().any(|c| c.source == block.id);

    match (has_in, has_out) {
        (false, false) => warn!("Block '{}' has no connections and will never run", block.id),
        (false, true) => debug!("Block '{}' is an entry block", block.id),
        (true, false) => debug!("Block '{}' is a leaf block", block.id),
        (true, true) => {}
    }
}

/// Performs topological sort on workflow blocks using Kahn's algorithm.
///
/// Blocks are ordered so that sources come before targets; ties keep their
/// definition order. Also detects cycles.
fn topological_sort(workflow: &mut Workflow) -> Result<(), WorkflowError> {
    let mut in_degree: HashMap<&str, usize> =
        workflow.blocks.iter().map(|b| (b.id.as_str(), 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();

    for conn in &workflow.connections {
        if let Some(degree) = in_degree.get_mut(conn.target.as_str()) {
            *degree += 1;
        }
        successors
            .entry(conn.source.as_str())
            .or_default()
            .push(conn.target.as_str());
    }

    let mut queue: VecDeque<&str> = workflow
        .blocks
        .iter()
        .map(|b| b.id.as_str())
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();

    let mut sorted_order: Vec<String> = Vec::with_capacity(workflow.blocks.len());

    while let Some(current) = queue.pop_front() {
        sorted_order.push(current.to_string());

        for &successor in successors.get(current).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(successor) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(successor);
                }
            }
        }
    }

    if sorted_order.len() != workflow.blocks.len() {
        return Err(WorkflowError::CyclicDependency);
    }

    let mut by_id: HashMap<String, Block> = workflow
        .blocks
        .drain(..)
        .map(|b| (b.id.clone(), b))
        .collect();

    workflow.blocks = sorted_order
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect();

    debug!(
        "Topological order: {:?}",
        workflow.blocks.iter().map(|b| &b.id).collect::<Vec<_>>()
    );

    Ok(())
}

/// Quick validation that returns a list of error messages.
///
/// Useful for editor feedback; does not reorder anything.
pub fn quick_validate(workflow: &Workflow) -> Vec<String> {
    let mut candidate = workflow.clone();
    match validate_workflow(&mut candidate) {
        Ok(()) => Vec::new(),
        Err(WorkflowError::Invalid(errors)) => errors.iter().map(|e| e.to_string()).collect(),
        Err(e) => vec![e.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::{Connection, ParallelConstruct, PARALLEL_START_HANDLE};
    use crate::workflow::value::Value;

    fn parallel_workflow() -> Workflow {
        let mut workflow = Workflow::new();
        workflow.add_block(Block::new("work", BlockType::Function)).unwrap();
        workflow.add_block(Block::new("fanout", BlockType::Parallel)).unwrap();
        workflow.add_block(Block::new("start", BlockType::Starter)).unwrap();
        workflow.connect("start", "fanout");
        workflow.connect_handle("fanout", PARALLEL_START_HANDLE, "work");
        workflow.add_parallel(
            ParallelConstruct::new("fanout", ["work"])
                .with_distribution(Value::Array(vec![Value::from("a")])),
        );
        workflow
    }

    #[test]
    fn test_valid_workflow_is_sorted() {
        let mut workflow = parallel_workflow();
        validate_workflow(&mut workflow).unwrap();

        let order: Vec<&str> = workflow.blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(order, vec!["start", "fanout", "work"]);
    }

    #[test]
    fn test_empty_workflow() {
        let mut workflow = Workflow::new();
        assert!(matches!(
            validate_workflow(&mut workflow),
            Err(WorkflowError::EmptyWorkflow)
        ));
    }

    #[test]
    fn test_duplicate_ids() {
        let mut workflow = Workflow::new();
        workflow.blocks.push(Block::new("a", BlockType::Function));
        workflow.blocks.push(Block::new("a", BlockType::Agent));
        assert!(matches!(
            validate_workflow(&mut workflow),
            Err(WorkflowError::DuplicateBlockId(id)) if id == "a"
        ));
    }

    #[test]
    fn test_unknown_connection_endpoint() {
        let mut workflow = Workflow::new();
        workflow.add_block(Block::new("a", BlockType::Function)).unwrap();
        workflow.add_connection(Connection::new("a", "ghost"));

        match validate_workflow(&mut workflow) {
            Err(WorkflowError::UnknownConnectionEndpoint { missing, .. }) => {
                assert_eq!(missing, "ghost")
            }
            other => panic!("Expected unknown endpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_parallel_node() {
        let mut workflow = parallel_workflow();
        workflow.parallels[0].nodes.push("ghost".to_string());

        match validate_workflow(&mut workflow) {
            Err(WorkflowError::UnknownParallelNode { parallel, node }) => {
                assert_eq!(parallel, "fanout");
                assert_eq!(node, "ghost");
            }
            other => panic!("Expected unknown parallel node, got {:?}", other),
        }
    }

    #[test]
    fn test_parallel_must_be_parallel_block() {
        let mut workflow = parallel_workflow();
        workflow.add_parallel(ParallelConstruct::new("start", Vec::<String>::new()));
        assert!(matches!(
            validate_workflow(&mut workflow),
            Err(WorkflowError::NotAParallelBlock(id)) if id == "start"
        ));
    }

    #[test]
    fn test_node_in_two_parallels() {
        let mut workflow = parallel_workflow();
        workflow.add_block(Block::new("second", BlockType::Parallel)).unwrap();
        workflow.connect("start", "second");
        workflow.add_parallel(ParallelConstruct::new("second", ["work"]));

        assert!(matches!(
            validate_workflow(&mut workflow),
            Err(WorkflowError::NodeInMultipleParallels { .. })
        ));
    }

    #[test]
    fn test_multiple_errors_are_collected() {
        let mut workflow = parallel_workflow();
        workflow.connect("start", "ghost1");
        workflow.connect("start", "ghost2");

        let errors = quick_validate(&workflow);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("ghost1"));
    }

    #[test]
    fn test_cycle_detected() {
        let mut workflow = Workflow::new();
        workflow.add_block(Block::new("a", BlockType::Function)).unwrap();
        workflow.add_block(Block::new("b", BlockType::Function)).unwrap();
        workflow.connect("a", "b");
        workflow.connect("b", "a");

        assert!(matches!(
            validate_workflow(&mut workflow),
            Err(WorkflowError::CyclicDependency)
        ));
    }

    #[test]
    fn test_quick_validate_ok() {
        assert!(quick_validate(&parallel_workflow()).is_empty());
    }
}
