//! Execution Timeline
//!
//! Records when each block instance starts, completes, or fails, and when
//! each parallel construct aggregates its results. Events carry the
//! scheduling pass they happened in, so a run can be replayed pass by pass.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::execution::BlockKey;

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Started,
    Completed,
    Failed,
    /// A parallel block built its aggregate output
    Aggregated,
}

/// A single event in the execution timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEvent {
    /// Stringified instance id (`{block}_parallel_{p}_iteration_{n}` for
    /// virtual instances)
    pub instance: String,
    pub block_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<usize>,
    pub event_type: EventType,
    pub pass: usize,
    pub timestamp: DateTime<Utc>,
}

/// Per-construct counts derived from the timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelSummary {
    pub instances_completed: usize,
    pub instances_failed: usize,
    /// Distinct iterations with at least one completed instance
    pub iterations_seen: usize,
    /// Pass in which the construct aggregated, if it did
    pub aggregated_in_pass: Option<usize>,
}

/// Tracks the execution timeline of a workflow run.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: DateTime<Utc>,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Utc::now(),
        }
    }

    /// Records an event for an instance.
    pub fn add_event(&mut self, key: &BlockKey, event_type: EventType, pass: usize) {
        let (parallel_id, iteration) = match key.as_virtual() {
            Some(id) => (Some(id.parallel_id.clone()), Some(id.iteration)),
            None => (None, None),
        };

        self.events.push(TimelineEvent {
            instance: key.to_string(),
            block_id: key.block_id().to_string(),
            parallel_id,
            iteration,
            event_type,
            pass,
            timestamp: Utc::now(),
        });
    }

    pub fn get_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Returns the total elapsed time since timeline creation.
    pub fn elapsed(&self) -> Duration {
        Utc::now() - self.start_time
    }

    /// Number of passes that recorded at least one event.
    pub fn passes(&self) -> usize {
        self.events.iter().map(|e| e.pass).max().unwrap_or(0)
    }

    /// Events of one parallel construct's virtual instances.
    pub fn events_for_parallel<'a>(
        &'a self,
        parallel_id: &'a str,
    ) -> impl Iterator<Item = &'a TimelineEvent> + 'a {
        self.events
            .iter()
            .filter(move |e| e.parallel_id.as_deref() == Some(parallel_id))
    }

    /// Summarizes every construct that appears in the timeline.
    ///
    /// Aggregation events are recorded against the parallel block itself,
    /// so they are matched by block id.
    pub fn parallel_summaries(&self) -> BTreeMap<String, ParallelSummary> {
        let mut summaries: BTreeMap<String, ParallelSummary> = BTreeMap::new();
        let mut iterations: HashMap<&str, Vec<usize>> = HashMap::new();

        for event in &self.events {
            if event.event_type == EventType::Aggregated {
                summaries
                    .entry(event.block_id.clone())
                    .or_default()
                    .aggregated_in_pass = Some(event.pass);
                continue;
            }

            let Some(parallel_id) = event.parallel_id.as_deref() else {
                continue;
            };
            let summary = summaries.entry(parallel_id.to_string()).or_default();

            match event.event_type {
                EventType::Completed => {
                    summary.instances_completed += 1;
                    if let Some(iteration) = event.iteration {
                        let seen = iterations.entry(parallel_id).or_default();
                        if !seen.contains(&iteration) {
                            seen.push(iteration);
                        }
                    }
                }
                EventType::Failed => summary.instances_failed += 1,
                EventType::Started | EventType::Aggregated => {}
            }
        }

        for (parallel_id, seen) in iterations {
            if let Some(summary) = summaries.get_mut(parallel_id) {
                summary.iterations_seen = seen.len();
            }
        }

        summaries
    }

    /// Renders the per-construct summary as a small table.
    pub fn summary(&self) -> String {
        let mut output = String::from("\nParallel Summary:\n\n");

        let summaries = self.parallel_summaries();
        if summaries.is_empty() {
            output.push_str("  (no parallel constructs ran)\n");
            return output;
        }

        for (parallel_id, summary) in summaries {
            let aggregated = summary
                .aggregated_in_pass
                .map_or_else(|| "not aggregated".to_string(), |p| format!("aggregated in pass {}", p));

            output.push_str(&format!(
                "{:16} | {:3} instance(s) over {:3} iteration(s) | {} failed | {}\n",
                truncate(&parallel_id, 16),
                summary.instances_completed,
                summary.iterations_seen,
                summary.instances_failed,
                aggregated
            ));
        }

        output.push_str(&format!(
            "\nPasses: {}, total: {} ms\n",
            self.passes(),
            self.elapsed().num_milliseconds()
        ));
        output
    }

    /// Returns instance durations in milliseconds.
    pub fn get_durations(&self) -> HashMap<String, i64> {
        let mut starts: HashMap<&str, DateTime<Utc>> = HashMap::new();
        let mut durations = HashMap::new();

        for event in &self.events {
            match event.event_type {
                EventType::Started => {
                    starts.insert(&event.instance, event.timestamp);
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(start) = starts.get(event.instance.as_str()) {
                        durations.insert(
                            event.instance.clone(),
                            (event.timestamp - *start).num_milliseconds(),
                        );
                    }
                }
                EventType::Aggregated => {}
            }
        }

        durations
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads or truncates a string to a fixed width.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_timeline() -> ExecutionTimeline {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event(&BlockKey::block("p"), EventType::Started, 1);
        timeline.add_event(&BlockKey::block("p"), EventType::Completed, 1);

        for i in 0..2 {
            let key = BlockKey::instance("work", "p", i);
            timeline.add_event(&key, EventType::Started, 2);
            timeline.add_event(&key, EventType::Completed, 2);
        }
        let extra = BlockKey::instance("more", "p", 1);
        timeline.add_event(&extra, EventType::Started, 2);
        timeline.add_event(&extra, EventType::Completed, 2);

        timeline.add_event(&BlockKey::block("p"), EventType::Aggregated, 3);
        timeline
    }

    #[test]
    fn test_timeline_creation() {
        let timeline = ExecutionTimeline::new();
        assert!(timeline.get_events().is_empty());
        assert_eq!(timeline.passes(), 0);
    }

    #[test]
    fn test_virtual_event_fields() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event(&BlockKey::instance("work", "p", 4), EventType::Failed, 7);

        let event = &timeline.get_events()[0];
        assert_eq!(event.instance, "work_parallel_p_iteration_4");
        assert_eq!(event.block_id, "work");
        assert_eq!(event.parallel_id.as_deref(), Some("p"));
        assert_eq!(event.iteration, Some(4));
        assert_eq!(event.pass, 7);
        assert!(event.timestamp >= timeline.start_time());
    }

    #[test]
    fn test_real_block_event_has_no_scope() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event(&BlockKey::block("start"), EventType::Started, 1);

        let event = &timeline.get_events()[0];
        assert!(event.parallel_id.is_none());
        assert!(event.iteration.is_none());
    }

    #[test]
    fn test_parallel_summaries() {
        let timeline = create_test_timeline();
        let summaries = timeline.parallel_summaries();

        let summary = &summaries["p"];
        assert_eq!(summary.instances_completed, 3);
        assert_eq!(summary.iterations_seen, 2);
        assert_eq!(summary.instances_failed, 0);
        assert_eq!(summary.aggregated_in_pass, Some(3));
        assert_eq!(timeline.passes(), 3);
    }

    #[test]
    fn test_events_for_parallel() {
        let timeline = create_test_timeline();
        assert_eq!(timeline.events_for_parallel("p").count(), 6);
        assert_eq!(timeline.events_for_parallel("other").count(), 0);
    }

    #[test]
    fn test_summary_rendering() {
        let timeline = create_test_timeline();
        let summary = timeline.summary();
        assert!(summary.contains("aggregated in pass 3"));
        assert!(summary.contains("Passes: 3"));

        let empty = ExecutionTimeline::new().summary();
        assert!(empty.contains("no parallel constructs ran"));
    }

    #[test]
    fn test_get_durations() {
        let timeline = create_test_timeline();
        let durations = timeline.get_durations();

        assert!(durations.contains_key("work_parallel_p_iteration_0"));
        assert!(durations["work_parallel_p_iteration_1"] >= 0);
        assert!(!durations.contains_key("missing"));
    }

    #[test]
    fn test_get_durations_only_started() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event(&BlockKey::block("s"), EventType::Started, 1);
        assert!(timeline.get_durations().is_empty());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc  ");
        assert_eq!(truncate("abcdefgh", 6), "abc...");
    }

    #[test]
    fn test_event_serializes_lowercase_type() {
        let timeline = create_test_timeline();
        let json = serde_json::to_string(&timeline.get_events()[0]).unwrap();
        assert!(json.contains("\"event_type\":\"started\""));
        assert!(!json.contains("parallel_id"));
    }
}
