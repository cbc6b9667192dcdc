//! Workflow Execution Engine
//!
//! A single-threaded reference executor that drives a workflow through
//! repeated scheduling passes. Each pass:
//!
//! 1. ticks the [`ParallelOrchestrator`] so finished constructs can
//!    aggregate or complete;
//! 2. runs every active top-level block, in topological order;
//! 3. runs every eligible virtual instance of each started construct.
//!
//! The run ends at the first pass that changes nothing. Block semantics are
//! delegated to a [`BlockRunner`]; the engine itself only handles routing
//! and the two-phase execution of parallel blocks.

use std::collections::BTreeMap;

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::monitoring::{EventType, ExecutionTimeline};
use crate::workflow::{
    condition_handle, validate_workflow, Block, BlockType, Connection, ParallelConstruct, Value,
    Workflow, WorkflowError, WorkflowGraph, PARALLEL_START_HANDLE,
};

use super::aggregate::{aggregated_output, started_output};
use super::context::{Decision, ExecutionContext};
use super::identity::{BlockKey, VirtualBlockId};
use super::orchestrator::{bind_iteration_context, instances_to_run, ParallelOrchestrator};
use super::runner::{BlockOutcome, BlockRunner, Invocation, RunnerError};

/// Default limit on scheduling passes before a run counts as stalled.
pub const DEFAULT_MAX_PASSES: usize = 1000;

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Block '{block}' failed: {source}")]
    Runner {
        block: String,
        #[source]
        source: RunnerError,
    },

    #[error("Run stalled after {passes} pass(es); unfinished parallel(s): [{}]", pending.join(", "))]
    Stalled { passes: usize, pending: Vec<String> },

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

/// Result of a finished run.
#[derive(Debug)]
pub struct RunReport {
    pub context: ExecutionContext,
    /// Aggregated output of each completed construct
    pub outputs: BTreeMap<String, Value>,
    pub timeline: ExecutionTimeline,
    pub passes: usize,
}

impl RunReport {
    pub fn output_for(&self, parallel_id: &str) -> Option<&Value> {
        self.outputs.get(parallel_id)
    }

    /// Per-iteration results of a completed construct.
    pub fn results_for(&self, parallel_id: &str) -> Option<&[Value]> {
        self.output_for(parallel_id)
            .and_then(|output| output.get("results"))
            .and_then(Value::as_array)
    }

    pub fn executed_count(&self) -> usize {
        self.context.executed_blocks.len()
    }
}

/// Workflow execution engine.
///
/// # Example
///
/// ```rust,no_run
/// use parallelrunner::execution::{Engine, ScriptedRunner};
/// use parallelrunner::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow("fanout.yaml")?;
///     let mut engine = Engine::new(workflow, ScriptedRunner::new());
///     engine.set_max_passes(200);
///
///     let report = engine.run()?;
///     println!("{:?}", report.outputs);
///     Ok(())
/// }
/// ```
pub struct Engine<R: BlockRunner> {
    workflow: Workflow,
    runner: R,
    max_passes: usize,
}

impl<R: BlockRunner> Engine<R> {
    /// Creates a new execution engine for a workflow.
    pub fn new(workflow: Workflow, runner: R) -> Self {
        Self {
            workflow,
            runner,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    /// Sets the maximum number of scheduling passes (at least 1).
    pub fn set_max_passes(&mut self, max: usize) {
        self.max_passes = max.max(1);
    }

    pub fn max_passes(&self) -> usize {
        self.max_passes
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Executes the workflow until no further progress is possible.
    ///
    /// # Returns
    ///
    /// * `Ok(RunReport)` - Every entered construct completed
    /// * `Err(EngineError::Stalled)` - The pass budget ran out, or a
    ///   construct was entered but never completed
    /// * `Err` - The workflow is invalid or a block failed
    pub fn run(&mut self) -> Result<RunReport, EngineError> {
        validate_workflow(&mut self.workflow)?;
        let orchestrator = ParallelOrchestrator::new(&self.workflow)?;

        let mut run = Run {
            workflow: &self.workflow,
            orchestrator,
            runner: &mut self.runner,
            context: ExecutionContext::new(),
            timeline: ExecutionTimeline::new(),
            pass: 0,
        };
        run.seed();

        let mut settled = false;
        while run.pass < self.max_passes {
            run.pass += 1;
            if !run.run_pass()? {
                settled = true;
                break;
            }
        }

        let pending: Vec<String> = run
            .context
            .parallel_executions
            .iter()
            .filter(|(id, _)| !run.context.is_loop_completed(id))
            .map(|(id, _)| id.clone())
            .collect();

        if !settled || !pending.is_empty() {
            warn!(
                "Run stalled after {} pass(es) with {} unfinished parallel(s)",
                run.pass,
                pending.len()
            );
            return Err(EngineError::Stalled {
                passes: run.pass,
                pending,
            });
        }

        let outputs: BTreeMap<String, Value> = self
            .workflow
            .parallels
            .iter()
            .filter(|p| run.context.is_loop_completed(&p.id))
            .filter_map(|p| {
                run.context
                    .block_output(&BlockKey::block(&p.id))
                    .map(|output| (p.id.clone(), output.clone()))
            })
            .collect();

        info!(
            "Workflow finished in {} pass(es): {} instance(s) executed, {} parallel(s) completed",
            run.pass,
            run.context.executed_blocks.len(),
            outputs.len()
        );

        Ok(RunReport {
            context: run.context,
            outputs,
            timeline: run.timeline,
            passes: run.pass,
        })
    }
}

/// State of one in-progress run.
struct Run<'a, R: BlockRunner> {
    workflow: &'a Workflow,
    orchestrator: ParallelOrchestrator<'a, Workflow>,
    runner: &'a mut R,
    context: ExecutionContext,
    timeline: ExecutionTimeline,
    pass: usize,
}

impl<'a, R: BlockRunner> Run<'a, R> {
    /// Activates top-level entry blocks: connected, with no incoming edge.
    fn seed(&mut self) {
        let graph = self.orchestrator.graph();
        for block in &self.workflow.blocks {
            if self.workflow.parallel_for_node(&block.id).is_some() {
                continue;
            }
            if graph.incoming(&block.id).next().is_none() && graph.has_any_connection(&block.id) {
                debug!("Seeding entry block '{}'", block.id);
                self.context.activate(BlockKey::block(&block.id));
            }
        }
    }

    /// Runs one scheduling pass. Returns false if nothing changed.
    fn run_pass(&mut self) -> Result<bool, EngineError> {
        let workflow = self.workflow;
        let mut progressed = !self.orchestrator.tick(&mut self.context).is_empty();

        for block in &workflow.blocks {
            if workflow.parallel_for_node(&block.id).is_some() {
                continue;
            }
            let key = BlockKey::block(&block.id);
            if !self.context.is_active(&key) || self.context.is_executed(&key) {
                continue;
            }

            match block.block_type {
                BlockType::Parallel => self.execute_parallel_block(block)?,
                _ => self.execute_block(block)?,
            }
            progressed = true;
        }

        for parallel in &workflow.parallels {
            if self.context.is_loop_completed(&parallel.id) {
                continue;
            }

            for node in workflow.blocks.iter().filter(|b| parallel.contains(&b.id)) {
                let pending = match self.context.parallel_executions.get(&parallel.id) {
                    Some(state) if state.is_started() => {
                        instances_to_run(&node.id, &parallel.id, state, &self.context)
                    }
                    _ => break,
                };

                for id in pending {
                    let eligible = self.orchestrator.routing().should_execute(
                        &node.id,
                        parallel,
                        id.iteration,
                        &self.context,
                    );
                    if eligible {
                        self.execute_instance(node, parallel, id)?;
                        progressed = true;
                    }
                }
            }
        }

        debug!("Pass {} done (progress: {})", self.pass, progressed);
        Ok(progressed)
    }

    /// Runs a block through the runner and records timeline events.
    fn invoke(
        &mut self,
        block: &Block,
        key: &BlockKey,
        iteration: Option<usize>,
        item: Option<Value>,
    ) -> Result<BlockOutcome, EngineError> {
        self.timeline.add_event(key, EventType::Started, self.pass);

        let invocation = Invocation {
            key,
            iteration,
            item: item.as_ref(),
        };

        match self.runner.run(block, &invocation, &self.context) {
            Ok(outcome) => {
                self.timeline.add_event(key, EventType::Completed, self.pass);
                Ok(outcome)
            }
            Err(source) => {
                self.timeline.add_event(key, EventType::Failed, self.pass);
                error!("Block {} failed: {}", key, source);
                Err(EngineError::Runner {
                    block: key.to_string(),
                    source,
                })
            }
        }
    }

    fn execute_block(&mut self, block: &Block) -> Result<(), EngineError> {
        let key = BlockKey::block(&block.id);
        let outcome = self.invoke(block, &key, None, None)?;

        self.context.set_block_output(key.clone(), outcome.output);
        self.context.mark_executed(key.clone());
        if let Some(decision) = &outcome.decision {
            self.context.record_decision(key, decision.clone());
        }

        for edge in self.orchestrator.graph().outgoing(&block.id) {
            if !follows(block, outcome.decision.as_ref(), edge) {
                continue;
            }
            if self.workflow.parallel_for_node(&edge.target).is_some() {
                warn!(
                    "Edge {} -> {} enters a parallel member directly; ignored",
                    edge.source, edge.target
                );
                continue;
            }
            self.context.activate(BlockKey::block(&edge.target));
        }

        info!("Block '{}' completed", block.id);
        Ok(())
    }

    /// First run enters the construct; a later run builds the aggregate.
    fn execute_parallel_block(&mut self, block: &Block) -> Result<(), EngineError> {
        let key = BlockKey::block(&block.id);
        let workflow = self.workflow;

        let Some(parallel) = workflow.get_parallel(&block.id) else {
            warn!("Parallel block '{}' has no construct definition", block.id);
            self.context.mark_executed(key);
            return Ok(());
        };

        if let Some(state) = self.context.parallel_executions.get(&parallel.id) {
            let output = aggregated_output(state);
            self.context.set_block_output(key.clone(), output);
            self.context.mark_executed(key.clone());
            self.timeline.add_event(&key, EventType::Aggregated, self.pass);

            info!("Parallel '{}' aggregated its results", parallel.id);
            return Ok(());
        }

        self.timeline.add_event(&key, EventType::Started, self.pass);
        self.orchestrator.initialize(parallel, &mut self.context);

        if let Some(state) = self.context.parallel_executions.get(&parallel.id) {
            let output = started_output(state);
            self.context.set_block_output(key.clone(), output);
        }
        self.context.mark_executed(key.clone());
        self.timeline.add_event(&key, EventType::Completed, self.pass);

        for edge in self
            .orchestrator
            .graph()
            .outgoing_from_handle(&parallel.id, PARALLEL_START_HANDLE)
        {
            self.context.activate(BlockKey::block(&edge.target));
        }
        Ok(())
    }

    fn execute_instance(
        &mut self,
        block: &Block,
        parallel: &ParallelConstruct,
        id: VirtualBlockId,
    ) -> Result<(), EngineError> {
        let iteration = id.iteration;
        let key = BlockKey::Virtual(id);

        let item = bind_iteration_context(&mut self.context, &parallel.id, iteration);
        if let Some(state) = self.context.parallel_executions.get_mut(&parallel.id) {
            state.mark_iteration_started(iteration);
        }

        let outcome = self.invoke(block, &key, Some(iteration), item)?;

        self.context.set_block_output(key.clone(), outcome.output.clone());
        self.context.mark_executed(key.clone());
        if let Some(decision) = &outcome.decision {
            self.context.record_decision(key.clone(), decision.clone());
        }
        if let Some(state) = self.context.parallel_executions.get_mut(&parallel.id) {
            state.record_result(iteration, outcome.output);
        }

        for edge in self.orchestrator.graph().outgoing(&block.id) {
            if !parallel.contains(&edge.target) {
                debug!(
                    "Edge {} -> {} leaves parallel '{}'; ignored for instances",
                    edge.source, edge.target, parallel.id
                );
                continue;
            }
            if follows(block, outcome.decision.as_ref(), edge) {
                self.context
                    .activate(BlockKey::instance(&edge.target, &parallel.id, iteration));
            }
        }

        let iteration_done =
            self.orchestrator
                .routing()
                .iteration_complete(parallel, iteration, &self.context);
        if iteration_done {
            if let Some(state) = self.context.parallel_executions.get_mut(&parallel.id) {
                if state.mark_iteration_completed(iteration) {
                    debug!(
                        "Iteration {} of parallel '{}' complete ({}/{})",
                        iteration, parallel.id, state.completed_executions, state.parallel_count
                    );
                }
            }
        }

        debug!("Instance {} completed", key);
        Ok(())
    }
}

/// Returns true if a finished block's outgoing edge should be followed.
fn follows(block: &Block, decision: Option<&Decision>, edge: &Connection) -> bool {
    match block.block_type {
        BlockType::Condition => match decision {
            Some(Decision::Condition(choice)) => edge.has_source_handle(&condition_handle(choice)),
            _ => false,
        },
        BlockType::Router => {
            matches!(decision, Some(Decision::Router(target)) if *target == edge.target)
        }
        BlockType::Starter
        | BlockType::Agent
        | BlockType::Api
        | BlockType::Function
        | BlockType::Evaluator
        | BlockType::Response
        | BlockType::Parallel => true,
    }
}
