//! Result types for orchestrator operations
//!
//! This module contains the result types returned by the [`Orchestrator`](crate::orchestrator::Orchestrator)
//! and the executor, so the CLI only has to deal with presentation.

use serde::Serialize;

/// Where a target stands before a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetStatus {
    /// No marker yet: the action will run.
    Pending,
    /// Marker present: the action will be skipped.
    Done,
    /// Groups dependencies only.
    Aggregate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTarget {
    pub name: String,
    pub status: TargetStatus,
}

/// Resolved order with the status of every target in it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanResult {
    pub targets: Vec<PlannedTarget>,
}

impl PlanResult {
    pub fn pending(&self) -> Vec<&str> {
        self.targets
            .iter()
            .filter(|t| t.status == TargetStatus::Pending)
            .map(|t| t.name.as_str())
            .collect()
    }
}

/// What a run did, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub executed: Vec<String>,
    pub skipped: Vec<String>,
    pub aggregates: Vec<String>,
}

impl RunReport {
    pub fn is_noop(&self) -> bool {
        self.executed.is_empty()
    }
}

/// Progress reported by the executor while a run is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent<'a> {
    Skipped(&'a str),
    Started(&'a str),
    Finished(&'a str),
    Failed(&'a str),
    Aggregate(&'a str),
}

/// A registered target as shown by `kiln list`
#[derive(Debug, Clone, Serialize)]
pub struct TargetInfo {
    pub name: String,
    pub description: Option<String>,
    pub dependencies: Vec<String>,
    pub status: TargetStatus,
}

/// Result of listing targets
#[derive(Debug, Clone, Serialize)]
pub struct TargetListResult {
    pub targets: Vec<TargetInfo>,
    pub default_targets: Vec<String>,
}

/// Result of getting the dependency graph
#[derive(Debug)]
pub struct DependencyGraphResult {
    pub graph: petgraph::Graph<String, ()>,
    pub cycles: Vec<Vec<String>>,
}
