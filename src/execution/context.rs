//! Execution Context
//!
//! Mutable state shared by everything that takes part in one workflow run.
//! A context is created per run and passed explicitly by `&mut`; nothing in
//! this crate keeps run state in globals.

use std::collections::{HashMap, HashSet};

use crate::workflow::Value;

use super::identity::BlockKey;
use super::state::ParallelStateStore;

/// Branch or target chosen by a decision block when it ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Id of the chosen condition; its edge uses handle `condition-{id}`
    Condition(String),
    /// Id of the chosen target block
    Router(String),
}

/// Recorded decisions, keyed by the instance that made them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decisions {
    pub condition: HashMap<BlockKey, String>,
    pub router: HashMap<BlockKey, String>,
}

/// Run-wide execution state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    /// Instances (real or virtual) that have finished
    pub executed_blocks: HashSet<BlockKey>,

    /// Instances eligible to run next
    pub active_execution_path: HashSet<BlockKey>,

    pub decisions: Decisions,

    /// Current item per parallel, under `{id}` and `{id}_iteration_{n}`
    pub loop_items: HashMap<String, Value>,

    /// Current 0-based iteration index per parallel
    pub loop_iterations: HashMap<String, usize>,

    pub parallel_executions: ParallelStateStore,

    /// Constructs that have fully finished
    pub completed_loops: HashSet<String>,

    /// Last output of each instance
    pub block_states: HashMap<BlockKey, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_executed(&self, key: &BlockKey) -> bool {
        self.executed_blocks.contains(key)
    }

    pub fn mark_executed(&mut self, key: BlockKey) {
        self.executed_blocks.insert(key);
    }

    pub fn is_active(&self, key: &BlockKey) -> bool {
        self.active_execution_path.contains(key)
    }

    /// Adds an instance to the active path. Returns false if it was already there.
    pub fn activate(&mut self, key: BlockKey) -> bool {
        self.active_execution_path.insert(key)
    }

    pub fn deactivate(&mut self, key: &BlockKey) -> bool {
        self.active_execution_path.remove(key)
    }

    pub fn record_decision(&mut self, key: BlockKey, decision: Decision) {
        match decision {
            Decision::Condition(choice) => {
                self.decisions.condition.insert(key, choice);
            }
            Decision::Router(target) => {
                self.decisions.router.insert(key, target);
            }
        }
    }

    pub fn condition_decision(&self, key: &BlockKey) -> Option<&str> {
        self.decisions.condition.get(key).map(String::as_str)
    }

    pub fn router_decision(&self, key: &BlockKey) -> Option<&str> {
        self.decisions.router.get(key).map(String::as_str)
    }

    pub fn set_block_output(&mut self, key: BlockKey, output: Value) {
        self.block_states.insert(key, output);
    }

    pub fn block_output(&self, key: &BlockKey) -> Option<&Value> {
        self.block_states.get(key)
    }

    /// Item most recently bound for a parallel.
    pub fn current_item(&self, parallel_id: &str) -> Option<&Value> {
        self.loop_items.get(parallel_id)
    }

    /// Item bound for a specific iteration of a parallel.
    pub fn iteration_item(&self, parallel_id: &str, iteration: usize) -> Option<&Value> {
        self.loop_items.get(&iteration_item_key(parallel_id, iteration))
    }

    pub fn current_index(&self, parallel_id: &str) -> Option<usize> {
        self.loop_iterations.get(parallel_id).copied()
    }

    pub fn is_loop_completed(&self, parallel_id: &str) -> bool {
        self.completed_loops.contains(parallel_id)
    }
}

/// Scoped `loop_items` key for one iteration's item.
pub fn iteration_item_key(parallel_id: &str, iteration: usize) -> String {
    format!("{}_iteration_{}", parallel_id, iteration)
}
