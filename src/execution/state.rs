//! Parallel Execution State
//!
//! Mutable per-construct state for one workflow run: the resolved
//! distribution, progress counters and the outputs recorded per iteration.
//! State is created the first time a construct runs and is kept after the
//! construct completes so its results stay readable.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::{debug, warn};

use crate::workflow::Value;

/// The collection a parallel construct fans out over.
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    List(Vec<Value>),
    /// Entries in insertion order
    Map(Vec<(String, Value)>),
}

impl Distribution {
    /// Classifies a configured distribution value.
    ///
    /// Arrays become lists and objects become maps. A string is parsed as
    /// JSON once and classified again. Anything else yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Distribution::List(items.clone())),
            Value::Object(pairs) => Some(Distribution::Map(pairs.clone())),
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Array(items)) => Some(Distribution::List(items)),
                Ok(Value::Object(pairs)) => Some(Distribution::Map(pairs)),
                Ok(other) => {
                    warn!("Distribution string parsed to a {}, expected array or object", other.kind());
                    None
                }
                Err(e) => {
                    warn!("Distribution string is not valid JSON: {}", e);
                    None
                }
            },
            Value::Number(_) | Value::Bool(_) => {
                warn!("Distribution of type {} cannot be iterated", value.kind());
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Distribution::List(items) => items.len(),
            Distribution::Map(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Distribution::List(_) => "list",
            Distribution::Map(_) => "map",
        }
    }

    /// Item at a position, or `None` if out of range.
    pub fn item(&self, index: usize) -> Option<DistributionItem> {
        match self {
            Distribution::List(items) => items.get(index).cloned().map(DistributionItem::Element),
            Distribution::Map(pairs) => pairs.get(index).map(|(key, value)| DistributionItem::Entry {
                key: key.clone(),
                value: value.clone(),
            }),
        }
    }
}

/// One item of a distribution.
#[derive(Debug, Clone, PartialEq)]
pub enum DistributionItem {
    Element(Value),
    Entry { key: String, value: Value },
}

impl DistributionItem {
    /// Value published to downstream blocks. Map entries become `[key, value]`.
    pub fn to_value(&self) -> Value {
        match self {
            DistributionItem::Element(value) => value.clone(),
            DistributionItem::Entry { key, value } => {
                Value::Array(vec![Value::String(key.clone()), value.clone()])
            }
        }
    }
}

/// Key of an iteration's recorded results, rendered as `iteration_{n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IterationKey(pub usize);

impl fmt::Display for IterationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "iteration_{}", self.0)
    }
}

/// Output(s) recorded for one iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationResult {
    Single(Value),
    /// Every output recorded for the iteration, in arrival order
    Multiple(Vec<Value>),
}

impl IterationResult {
    /// Adds another output, turning a single result into a list.
    fn push(&mut self, output: Value) {
        match self {
            IterationResult::Multiple(outputs) => outputs.push(output),
            IterationResult::Single(_) => {
                let previous = std::mem::replace(self, IterationResult::Multiple(Vec::new()));
                if let IterationResult::Single(first) = previous {
                    *self = IterationResult::Multiple(vec![first, output]);
                }
            }
        }
    }

    /// Value used in the aggregated construct output.
    pub fn to_value(&self) -> Value {
        match self {
            IterationResult::Single(value) => value.clone(),
            IterationResult::Multiple(values) => Value::Array(values.clone()),
        }
    }
}

/// Runtime state of one parallel construct.
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelState {
    pub parallel_id: String,

    /// Number of iterations; always the distribution's length
    pub parallel_count: usize,

    pub distribution: Option<Distribution>,

    /// Iterations whose required instances have all run
    pub completed_executions: usize,

    pub execution_results: BTreeMap<IterationKey, IterationResult>,

    /// Iterations that have started but not completed
    pub active_iterations: BTreeSet<usize>,

    /// 0 = not started; set to 1 on initialization
    pub current_iteration: usize,
}

impl ParallelState {
    /// Creates the state for a construct's first execution.
    ///
    /// `current_iteration` starts at 1, which marks the state as initialized;
    /// iteration indices themselves are 0-based.
    pub fn initialize(parallel_id: impl Into<String>, distribution: Option<Distribution>) -> Self {
        let parallel_id = parallel_id.into();
        let parallel_count = distribution.as_ref().map_or(0, Distribution::len);

        debug!(
            "Initialized parallel '{}' with {} {} item(s)",
            parallel_id,
            parallel_count,
            distribution.as_ref().map_or("empty", Distribution::kind)
        );

        Self {
            parallel_id,
            parallel_count,
            distribution,
            completed_executions: 0,
            execution_results: BTreeMap::new(),
            active_iterations: BTreeSet::new(),
            current_iteration: 1,
        }
    }

    /// Returns false while the state is in its "not yet started" form.
    pub fn is_started(&self) -> bool {
        self.current_iteration != 0
    }

    /// Item bound to an iteration; `None` for a missing distribution or an
    /// out-of-range index.
    pub fn item_for_iteration(&self, index: usize) -> Option<DistributionItem> {
        self.distribution.as_ref().and_then(|d| d.item(index))
    }

    /// Records an output for an iteration. Repeated outputs accumulate.
    pub fn record_result(&mut self, index: usize, output: Value) {
        match self.execution_results.entry(IterationKey(index)) {
            Entry::Occupied(mut entry) => entry.get_mut().push(output),
            Entry::Vacant(entry) => {
                entry.insert(IterationResult::Single(output));
            }
        }
    }

    pub fn result_for(&self, index: usize) -> Option<&IterationResult> {
        self.execution_results.get(&IterationKey(index))
    }

    /// Recorded results in iteration order, skipping iterations with none.
    pub fn results_in_order(&self) -> Vec<Value> {
        self.execution_results.values().map(IterationResult::to_value).collect()
    }

    pub fn mark_iteration_started(&mut self, index: usize) {
        self.active_iterations.insert(index);
    }

    /// Moves an active iteration to the completed count.
    ///
    /// Returns false if the iteration was not active, so repeated calls do
    /// not count it twice.
    pub fn mark_iteration_completed(&mut self, index: usize) -> bool {
        if !self.active_iterations.remove(&index) {
            return false;
        }
        if self.completed_executions < self.parallel_count {
            self.completed_executions += 1;
        }
        true
    }
}

/// Parallel states of a run, keyed by construct id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParallelStateStore {
    states: BTreeMap<String, ParallelState>,
}

impl ParallelStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) the state of a construct and returns it.
    pub fn initialize(
        &mut self,
        parallel_id: &str,
        distribution: Option<Distribution>,
    ) -> &mut ParallelState {
        let state = ParallelState::initialize(parallel_id, distribution);
        match self.states.entry(parallel_id.to_string()) {
            Entry::Occupied(mut entry) => {
                warn!("Re-initializing state of parallel '{}'", parallel_id);
                entry.insert(state);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(state),
        }
    }

    pub fn get(&self, parallel_id: &str) -> Option<&ParallelState> {
        self.states.get(parallel_id)
    }

    pub fn get_mut(&mut self, parallel_id: &str) -> Option<&mut ParallelState> {
        self.states.get_mut(parallel_id)
    }

    pub fn contains(&self, parallel_id: &str) -> bool {
        self.states.contains_key(parallel_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParallelState)> {
        self.states.iter()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
