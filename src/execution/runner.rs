//! Block Runners
//!
//! The engine never interprets block semantics itself; it hands every
//! non-parallel block to a [`BlockRunner`] and only looks at the returned
//! output and decision.
//!
//! [`ScriptedRunner`] is a deterministic runner driven by block params. It
//! backs the CLI and the engine tests:
//!
//! | Block type  | Params                                   | Decision  |
//! |-------------|------------------------------------------|-----------|
//! | `condition` | `choose` or `choose_by_iteration` (list) | condition |
//! | `router`    | `route` or `route_by_iteration` (list)   | router    |
//! | any         | `fail` (message)                         | error     |
//!
//! Every other block echoes `{block, item, index}`.

use log::{debug, warn};
use thiserror::Error;

use crate::workflow::{Block, BlockType, Value};

use super::context::{Decision, ExecutionContext};
use super::identity::BlockKey;

/// Failure reported by a runner for one block invocation.
#[derive(Debug, Error, PartialEq)]
#[error("{0}")]
pub struct RunnerError(pub String);

/// One invocation of a block, real or virtual.
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub key: &'a BlockKey,
    /// Iteration index, for virtual instances
    pub iteration: Option<usize>,
    /// Item bound for this iteration, if any
    pub item: Option<&'a Value>,
}

impl Invocation<'_> {
    pub fn is_virtual(&self) -> bool {
        self.key.is_virtual()
    }
}

/// What a block produced.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockOutcome {
    pub output: Value,
    pub decision: Option<Decision>,
}

impl BlockOutcome {
    pub fn output(output: Value) -> Self {
        Self {
            output,
            decision: None,
        }
    }

    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }
}

/// Executes individual blocks on behalf of the engine.
pub trait BlockRunner {
    fn run(
        &mut self,
        block: &Block,
        invocation: &Invocation<'_>,
        context: &ExecutionContext,
    ) -> Result<BlockOutcome, RunnerError>;
}

/// Deterministic runner driven by block params.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    invocations: usize,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks run so far.
    pub fn invocations(&self) -> usize {
        self.invocations
    }

    /// Picks a string param, either fixed or cycled by iteration.
    fn scripted_choice(
        block: &Block,
        fixed: &str,
        by_iteration: &str,
        iteration: Option<usize>,
    ) -> Option<String> {
        if let Some(choices) = block.param(by_iteration).and_then(Value::as_array) {
            if !choices.is_empty() {
                let index = iteration.unwrap_or(0) % choices.len();
                return Some(choices[index].to_string());
            }
        }
        block.param(fixed).map(Value::to_string)
    }
}

impl BlockRunner for ScriptedRunner {
    fn run(
        &mut self,
        block: &Block,
        invocation: &Invocation<'_>,
        _context: &ExecutionContext,
    ) -> Result<BlockOutcome, RunnerError> {
        self.invocations += 1;

        if let Some(message) = block.param("fail") {
            return Err(RunnerError(message.to_string()));
        }

        let mut fields = vec![("block".to_string(), Value::from(block.id.as_str()))];
        if let Some(item) = invocation.item {
            fields.push(("item".to_string(), item.clone()));
        }
        if let Some(index) = invocation.iteration {
            fields.push(("index".to_string(), Value::from(index)));
        }

        let decision = match block.block_type {
            BlockType::Condition => {
                let choice = Self::scripted_choice(
                    block,
                    "choose",
                    "choose_by_iteration",
                    invocation.iteration,
                );
                if choice.is_none() {
                    warn!("Condition {} has no scripted choice", invocation.key);
                }
                choice.map(|c| {
                    fields.push(("selectedCondition".to_string(), Value::from(c.as_str())));
                    Decision::Condition(c)
                })
            }
            BlockType::Router => {
                let route = Self::scripted_choice(
                    block,
                    "route",
                    "route_by_iteration",
                    invocation.iteration,
                );
                if route.is_none() {
                    warn!("Router {} has no scripted route", invocation.key);
                }
                route.map(|r| {
                    fields.push(("selectedPath".to_string(), Value::from(r.as_str())));
                    Decision::Router(r)
                })
            }
            BlockType::Starter
            | BlockType::Agent
            | BlockType::Api
            | BlockType::Function
            | BlockType::Evaluator
            | BlockType::Response
            | BlockType::Parallel => None,
        };

        debug!("Ran {} ({:?})", invocation.key, block.block_type);

        Ok(BlockOutcome {
            output: Value::Object(fields),
            decision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoke(block: &Block, key: &BlockKey, iteration: Option<usize>) -> BlockOutcome {
        let mut runner = ScriptedRunner::new();
        let invocation = Invocation {
            key,
            iteration,
            item: None,
        };
        runner
            .run(block, &invocation, &ExecutionContext::new())
            .unwrap()
    }

    #[test]
    fn test_echo_output() {
        let block = Block::new("work", BlockType::Function);
        let key = BlockKey::instance("work", "p", 2);
        let item = Value::from("x");
        let invocation = Invocation {
            key: &key,
            iteration: Some(2),
            item: Some(&item),
        };

        let mut runner = ScriptedRunner::new();
        let outcome = runner
            .run(&block, &invocation, &ExecutionContext::new())
            .unwrap();

        assert!(invocation.is_virtual());
        assert_eq!(outcome.decision, None);
        assert_eq!(outcome.output.get("block"), Some(&Value::from("work")));
        assert_eq!(outcome.output.get("item"), Some(&Value::from("x")));
        assert_eq!(outcome.output.get("index"), Some(&Value::from(2usize)));
        assert_eq!(runner.invocations(), 1);
    }

    #[test]
    fn test_condition_fixed_choice() {
        let block = Block::new("check", BlockType::Condition).with_param("choose", "true");
        let outcome = invoke(&block, &BlockKey::block("check"), None);

        assert_eq!(outcome.decision, Some(Decision::Condition("true".to_string())));
        assert_eq!(
            outcome.output.get("selectedCondition"),
            Some(&Value::from("true"))
        );
    }

    #[test]
    fn test_condition_choice_by_iteration_cycles() {
        let block = Block::new("check", BlockType::Condition).with_param(
            "choose_by_iteration",
            Value::Array(vec![Value::from("true"), Value::from("false")]),
        );
        let key = BlockKey::instance("check", "p", 3);

        let outcome = invoke(&block, &key, Some(3));
        assert_eq!(outcome.decision, Some(Decision::Condition("false".to_string())));
    }

    #[test]
    fn test_condition_without_choice() {
        let block = Block::new("check", BlockType::Condition);
        let outcome = invoke(&block, &BlockKey::block("check"), None);
        assert_eq!(outcome.decision, None);
    }

    #[test]
    fn test_router_route() {
        let block = Block::new("r", BlockType::Router).with_param("route", "target");
        let outcome = invoke(&block, &BlockKey::block("r"), None);
        assert_eq!(outcome.decision, Some(Decision::Router("target".to_string())));
    }

    #[test]
    fn test_fail_param() {
        let block = Block::new("bad", BlockType::Api).with_param("fail", "boom");
        let key = BlockKey::block("bad");
        let invocation = Invocation {
            key: &key,
            iteration: None,
            item: None,
        };

        let result = ScriptedRunner::new().run(&block, &invocation, &ExecutionContext::new());
        assert_eq!(result, Err(RunnerError("boom".to_string())));
    }

    #[test]
    fn test_outcome_builder() {
        let outcome =
            BlockOutcome::output(Value::from("x")).with_decision(Decision::Router("t".to_string()));
        assert_eq!(outcome.decision, Some(Decision::Router("t".to_string())));
    }
}
