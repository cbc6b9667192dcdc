//! Parallel Orchestrator
//!
//! Drives parallel constructs through their lifecycle:
//!
//! ```text
//! Unseen -> InitializedNotStarted -> IterationsInProgress
//!        -> PendingAggregation -> Completed
//! ```
//!
//! The generic executor calls [`ParallelOrchestrator::tick`] once per
//! scheduling pass. A tick never runs blocks itself; it only detects when a
//! construct's required instances have all run and rewires the execution
//! context so the construct's own block runs once more to aggregate, then
//! releases the blocks after the construct once the aggregate exists.
//! Ticks are idempotent: calling `tick` again without intervening executor
//! activity changes nothing.

use log::{debug, info};

use crate::workflow::{
    ConnectionGraph, ParallelConstruct, Value, WorkflowError, WorkflowGraph, PARALLEL_END_HANDLE,
};

use super::aggregate::is_completed_aggregate;
use super::context::{iteration_item_key, ExecutionContext};
use super::identity::{BlockKey, VirtualBlockId};
use super::routing::RoutingEvaluator;
use super::state::{Distribution, ParallelState};

/// Lifecycle phase of a construct within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructPhase {
    /// Not yet entered by normal traversal
    Unseen,
    InitializedNotStarted,
    IterationsInProgress,
    /// Every required instance has run; aggregation is due or running
    PendingAggregation,
    Completed,
}

/// Something a tick changed in the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickAction {
    /// The construct was marked completed and these downstream blocks were
    /// added to the active path
    Finalized {
        parallel_id: String,
        activated: Vec<String>,
    },
    /// The construct's block was re-queued to build its aggregate
    AggregationScheduled { parallel_id: String },
}

/// Scheduler for all parallel constructs of one workflow.
pub struct ParallelOrchestrator<'a, G: WorkflowGraph + ?Sized> {
    workflow: &'a G,
    graph: ConnectionGraph,
}

impl<'a, G: WorkflowGraph + ?Sized> ParallelOrchestrator<'a, G> {
    /// Creates an orchestrator for a workflow.
    ///
    /// Fails if a construct lists a node that does not exist in the workflow,
    /// since such a definition can never complete.
    pub fn new(workflow: &'a G) -> Result<Self, WorkflowError> {
        for parallel in workflow.parallels() {
            if let Some(missing) = parallel
                .nodes
                .iter()
                .find(|node| workflow.find_block(node).is_none())
            {
                return Err(WorkflowError::UnknownParallelNode {
                    parallel: parallel.id.clone(),
                    node: missing.clone(),
                });
            }
        }

        Ok(Self {
            workflow,
            graph: ConnectionGraph::new(workflow.connections()),
        })
    }

    pub fn workflow(&self) -> &'a G {
        self.workflow
    }

    pub fn graph(&self) -> &ConnectionGraph {
        &self.graph
    }

    pub fn routing(&self) -> RoutingEvaluator<'_, G> {
        RoutingEvaluator::new(self.workflow, &self.graph)
    }

    /// Creates the runtime state of a construct from its configured
    /// distribution and returns the number of iterations.
    pub fn initialize(&self, parallel: &ParallelConstruct, context: &mut ExecutionContext) -> usize {
        let distribution = parallel.distribution.as_ref().and_then(Distribution::from_value);
        let state = context.parallel_executions.initialize(&parallel.id, distribution);

        info!(
            "Parallel '{}' entered with {} iteration(s)",
            parallel.id, state.parallel_count
        );
        state.parallel_count
    }

    /// Current lifecycle phase of a construct.
    pub fn phase(&self, parallel: &ParallelConstruct, context: &ExecutionContext) -> ConstructPhase {
        if context.is_loop_completed(&parallel.id) {
            return ConstructPhase::Completed;
        }
        let Some(state) = context.parallel_executions.get(&parallel.id) else {
            return ConstructPhase::Unseen;
        };
        if !state.is_started() {
            return ConstructPhase::InitializedNotStarted;
        }
        if !context.is_executed(&BlockKey::block(&parallel.id))
            || self
                .routing()
                .all_required_executed(parallel, state.parallel_count, context)
        {
            return ConstructPhase::PendingAggregation;
        }
        ConstructPhase::IterationsInProgress
    }

    /// Runs one scheduling pass over every construct, in definition order.
    ///
    /// Returns what was changed; an empty list means the context was left
    /// untouched.
    pub fn tick(&self, context: &mut ExecutionContext) -> Vec<TickAction> {
        let routing = self.routing();
        let mut actions = Vec::new();

        for parallel in self.workflow.parallels() {
            if context.is_loop_completed(&parallel.id) {
                continue;
            }

            let parent = BlockKey::block(&parallel.id);
            if !context.is_executed(&parent) {
                continue;
            }

            let parallel_count = match context.parallel_executions.get(&parallel.id) {
                Some(state) if state.is_started() => state.parallel_count,
                _ => continue,
            };

            if !routing.all_required_executed(parallel, parallel_count, context) {
                continue;
            }

            let already_aggregated = context
                .block_output(&parent)
                .is_some_and(is_completed_aggregate);

            if already_aggregated {
                context.completed_loops.insert(parallel.id.clone());

                let mut activated = Vec::new();
                for edge in self.graph.outgoing_from_handle(&parallel.id, PARALLEL_END_HANDLE) {
                    if context.activate(BlockKey::block(&edge.target)) {
                        activated.push(edge.target.clone());
                    }
                }

                info!(
                    "Parallel '{}' completed; activated {:?}",
                    parallel.id, activated
                );
                actions.push(TickAction::Finalized {
                    parallel_id: parallel.id.clone(),
                    activated,
                });
                continue;
            }

            // Re-run only the parent so it can build the aggregate
            context.executed_blocks.remove(&parent);
            context.activate(parent);
            for node in &parallel.nodes {
                context.deactivate(&BlockKey::block(node));
            }

            info!(
                "All {} iteration(s) of parallel '{}' done; scheduling aggregation",
                parallel_count, parallel.id
            );
            actions.push(TickAction::AggregationScheduled {
                parallel_id: parallel.id.clone(),
            });
        }

        actions
    }
}

/// Lists the instances of a template block that can be queued now.
///
/// An iteration is included when its instance has not run yet and either
/// the instance itself or the template block is on the active path.
pub fn instances_to_run(
    template_block_id: &str,
    parallel_id: &str,
    state: &ParallelState,
    context: &ExecutionContext,
) -> Vec<VirtualBlockId> {
    let template_active = context.is_active(&BlockKey::block(template_block_id));

    (0..state.parallel_count)
        .map(|iteration| VirtualBlockId::new(template_block_id, parallel_id, iteration))
        .filter(|id| {
            let key = BlockKey::Virtual(id.clone());
            !context.is_executed(&key) && (template_active || context.is_active(&key))
        })
        .collect()
}

/// Publishes the item and index of an iteration for downstream blocks.
///
/// The item goes under `{parallel}_iteration_{n}` and under the unscoped
/// `{parallel}` key (last write wins); the index goes to `loop_iterations`.
/// Returns the bound item, or `None` if the iteration has no item.
pub fn bind_iteration_context(
    context: &mut ExecutionContext,
    parallel_id: &str,
    iteration: usize,
) -> Option<Value> {
    let item = context
        .parallel_executions
        .get(parallel_id)
        .and_then(|state| state.item_for_iteration(iteration))
        .map(|item| item.to_value());

    context
        .loop_iterations
        .insert(parallel_id.to_string(), iteration);

    match &item {
        Some(value) => {
            context
                .loop_items
                .insert(iteration_item_key(parallel_id, iteration), value.clone());
            context.loop_items.insert(parallel_id.to_string(), value.clone());
        }
        None => debug!(
            "No item for iteration {} of parallel '{}'",
            iteration, parallel_id
        ),
    }

    item
}
