//! Run Monitoring Module
//!
//! Records what happened during a workflow run.
//!
//! # Components
//!
//! - [`ExecutionTimeline`]: Per-instance events tagged with the scheduling
//!   pass, plus per-construct summaries

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, ParallelSummary, TimelineEvent};
