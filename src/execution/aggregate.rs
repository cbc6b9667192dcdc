//! Parallel block outputs.
//!
//! A parallel block runs twice: once when it is entered, producing a
//! "started" output, and once more after every required instance has run,
//! producing the aggregate of all iteration results.

use crate::workflow::Value;

use super::state::ParallelState;

/// Output of a parallel block's first execution.
pub fn started_output(state: &ParallelState) -> Value {
    Value::object([
        ("parallelId", Value::from(state.parallel_id.as_str())),
        ("parallelCount", Value::from(state.parallel_count)),
        (
            "distributionType",
            Value::from(state.distribution.as_ref().map_or("empty", |d| d.kind())),
        ),
        ("started", Value::Bool(true)),
    ])
}

/// Output of a parallel block's aggregation run.
pub fn aggregated_output(state: &ParallelState) -> Value {
    Value::object([
        ("parallelId", Value::from(state.parallel_id.as_str())),
        ("parallelCount", Value::from(state.parallel_count)),
        ("completed", Value::Bool(true)),
        ("results", Value::Array(state.results_in_order())),
    ])
}

/// Returns true if an output is a finished aggregate (`completed: true`
/// together with a `results` list).
pub fn is_completed_aggregate(output: &Value) -> bool {
    output.get("completed").and_then(Value::as_bool) == Some(true)
        && output.get("results").and_then(Value::as_array).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::state::Distribution;

    fn state() -> ParallelState {
        let mut state = ParallelState::initialize(
            "p",
            Some(Distribution::List(vec![Value::from("a"), Value::from("b")])),
        );
        state.record_result(1, Value::from("B"));
        state.record_result(0, Value::from("A1"));
        state.record_result(0, Value::from("A2"));
        state
    }

    #[test]
    fn test_started_output_is_not_an_aggregate() {
        let output = started_output(&state());
        assert_eq!(output.get("parallelCount"), Some(&Value::from(2usize)));
        assert_eq!(output.get("distributionType"), Some(&Value::from("list")));
        assert!(!is_completed_aggregate(&output));
    }

    #[test]
    fn test_aggregated_output_orders_results() {
        let output = aggregated_output(&state());
        assert!(is_completed_aggregate(&output));
        assert_eq!(
            output.get("results"),
            Some(&Value::Array(vec![
                Value::Array(vec![Value::from("A1"), Value::from("A2")]),
                Value::from("B"),
            ]))
        );
    }

    #[test]
    fn test_marker_requires_both_fields() {
        let only_flag = Value::object([("completed", Value::Bool(true))]);
        assert!(!is_completed_aggregate(&only_flag));

        let not_done = Value::object([
            ("completed", Value::Bool(false)),
            ("results", Value::Array(vec![])),
        ]);
        assert!(!is_completed_aggregate(&not_done));
        assert!(!is_completed_aggregate(&Value::from("completed")));
    }
}
