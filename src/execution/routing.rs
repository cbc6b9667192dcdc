//! Routing Evaluation
//!
//! Decides whether a template block is eligible to run in a given iteration
//! of its parallel construct, and whether a construct has run every
//! instance its routing requires.
//!
//! Eligibility only looks at edges *inside* the construct:
//! - a node with no internal incoming edge is an entry point, unless it has
//!   no connections at all;
//! - otherwise at least one internal incoming edge must be active, where an
//!   edge is active once its source instance has run and, for decision
//!   blocks, the recorded decision selects that edge.
//!
//! Convergent edges are OR-combined: the first active edge is enough.

use log::{debug, warn};

use crate::workflow::{
    condition_handle, BlockType, Connection, ConnectionGraph, ParallelConstruct, WorkflowGraph,
};

use super::context::ExecutionContext;
use super::identity::BlockKey;

/// Evaluates routing rules against a context snapshot.
///
/// Evaluation is read-only: the same context always gives the same answer.
pub struct RoutingEvaluator<'a, G: WorkflowGraph + ?Sized> {
    workflow: &'a G,
    graph: &'a ConnectionGraph,
}

impl<'a, G: WorkflowGraph + ?Sized> RoutingEvaluator<'a, G> {
    pub fn new(workflow: &'a G, graph: &'a ConnectionGraph) -> Self {
        Self { workflow, graph }
    }

    /// Returns true if `node_id` should run in `iteration` of `parallel`.
    pub fn should_execute(
        &self,
        node_id: &str,
        parallel: &ParallelConstruct,
        iteration: usize,
        context: &ExecutionContext,
    ) -> bool {
        let mut internal_incoming = self
            .graph
            .incoming(node_id)
            .filter(|edge| parallel.contains(&edge.source))
            .peekable();

        if internal_incoming.peek().is_none() {
            // Entry point of a branch, unless the node is wired to nothing
            return self.graph.has_any_connection(node_id);
        }

        internal_incoming.any(|edge| self.is_edge_active(edge, parallel, iteration, context))
    }

    fn is_edge_active(
        &self,
        edge: &Connection,
        parallel: &ParallelConstruct,
        iteration: usize,
        context: &ExecutionContext,
    ) -> bool {
        let source_key = BlockKey::instance(&edge.source, &parallel.id, iteration);
        if !context.is_executed(&source_key) {
            return false;
        }

        let Some(source) = self.workflow.find_block(&edge.source) else {
            warn!("Edge {} -> {} has unknown source block", edge.source, edge.target);
            return false;
        };

        match source.block_type {
            BlockType::Condition => context
                .condition_decision(&source_key)
                .is_some_and(|choice| edge.has_source_handle(&condition_handle(choice))),
            BlockType::Router => context.router_decision(&source_key) == Some(edge.target.as_str()),
            BlockType::Starter
            | BlockType::Agent
            | BlockType::Api
            | BlockType::Function
            | BlockType::Evaluator
            | BlockType::Response
            | BlockType::Parallel => true,
        }
    }

    /// Returns true if every eligible node of one iteration has run.
    pub fn iteration_complete(
        &self,
        parallel: &ParallelConstruct,
        iteration: usize,
        context: &ExecutionContext,
    ) -> bool {
        parallel.nodes.iter().all(|node_id| {
            context.is_executed(&BlockKey::instance(node_id, &parallel.id, iteration))
                || !self.should_execute(node_id, parallel, iteration, context)
        })
    }

    /// Returns true if every eligible instance of the construct has run.
    ///
    /// Instances that routing rules out (the untaken side of a condition,
    /// the unchosen targets of a router) are never required.
    pub fn all_required_executed(
        &self,
        parallel: &ParallelConstruct,
        parallel_count: usize,
        context: &ExecutionContext,
    ) -> bool {
        for node_id in &parallel.nodes {
            for iteration in 0..parallel_count {
                let key = BlockKey::instance(node_id, &parallel.id, iteration);
                if context.is_executed(&key) {
                    continue;
                }
                if self.should_execute(node_id, parallel, iteration, context) {
                    debug!("Parallel '{}' still waiting on {}", parallel.id, key);
                    return false;
                }
            }
        }
        true
    }
}
