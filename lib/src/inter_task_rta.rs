//! Response-time fixed point under interference from higher-priority tasks.
use log::{debug, warn};
use petgraph::graph::Graph;
use serde_derive::{Deserialize, Serialize};

use crate::graph_extension::{GraphExtension, NodeData};
use crate::interference_profile::InterferenceBlock;
use crate::resource_model::ResourceModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixedPointOutcome {
    Converged,
    DeadlineExceeded,
    IterationLimit,
    /// The task, or a task of higher priority, failed before its fixed point.
    NotAnalyzed,
}

/// What a lower-priority task needs to know about one already-analyzed task.
#[derive(Debug, Clone, PartialEq)]
pub struct HigherPriorityProfile {
    pub task_id: usize,
    pub period: i32,
    pub wcrt: f64,
    pub critical_path_wcet: i32,
    pub min_job_volume: f64,
    pub blocks: Vec<InterferenceBlock>,
}

impl HigherPriorityProfile {
    /// Interference of the last job, which starts at the window start and is
    /// shaped by the blocks.
    pub fn carry_out(&self, window: f64) -> f64 {
        let mut interference = 0.0;
        let mut preceding_width = 0.0;
        for block in self.blocks.iter() {
            let width = block.width as f64;
            interference += block.height * width.min((window - preceding_width).max(0.0));
            preceding_width += width;
        }
        interference
    }

    /// Interference of the first job, which completes `window` into the window.
    pub fn carry_in(&self, window: f64) -> f64 {
        (window - (self.period as f64 - self.wcrt))
            .max(0.0)
            .min(self.min_job_volume)
    }

    /// Maximum carry-in plus carry-out interference over a window of length `window`.
    pub fn sliding_window_interference(&self, window: f64) -> f64 {
        let first_split = self.period as f64 - self.wcrt + self.min_job_volume;
        let mut interference = self
            .carry_out(window)
            .max(self.carry_in(first_split) + self.carry_out(window - first_split));

        let mut prefix_width = 0.0;
        for block in self.blocks.iter() {
            prefix_width += block.width as f64;
            interference =
                interference.max(self.carry_in(window - prefix_width) + self.carry_out(prefix_width));
        }
        interference
    }

    /// Total interference this task imposes on a lower-priority task whose
    /// response time is currently `wcrt`.
    pub fn interference(&self, wcrt: f64) -> f64 {
        let period = self.period as f64;
        let window = wcrt
            - ((wcrt - self.critical_path_wcet as f64) / period)
                .floor()
                .max(0.0)
                * period;
        let body_jobs = ((wcrt - window) / period).floor().max(0.0);
        self.sliding_window_interference(window) + body_jobs * self.min_job_volume
    }
}

/// Per-job volume spread over the cores of each resource type.
pub fn get_min_job_volume(dag: &Graph<NodeData, i32>, resource_model: &ResourceModel) -> f64 {
    (0..resource_model.get_number_of_resource_types())
        .map(|resource_type| {
            dag.get_volume_of_resource_type(resource_type) as f64
                * resource_model.interference_weight(resource_type)
        })
        .sum()
}

/// Iterates `wcrt = intra_task_wcrt + interference` until the integer part of the
/// response time stops changing, the deadline is exceeded or the iteration limit
/// is reached.
pub fn iterate_response_time(
    task_id: usize,
    intra_task_wcrt: f64,
    deadline: i32,
    higher_priority_profiles: &[HigherPriorityProfile],
    max_iterations: usize,
) -> (f64, FixedPointOutcome) {
    let deadline = deadline as f64;
    let mut wcrt = intra_task_wcrt;
    let mut previous_wcrt = 0.0;
    let mut iterations = 0;

    while (wcrt as i64) != (previous_wcrt as i64) && wcrt <= deadline {
        if iterations == max_iterations {
            warn!(
                "Task {} did not converge within {} iterations (WCRT {}).",
                task_id, max_iterations, wcrt
            );
            return (wcrt, FixedPointOutcome::IterationLimit);
        }
        iterations += 1;
        previous_wcrt = wcrt;
        let interference: f64 = higher_priority_profiles
            .iter()
            .map(|profile| profile.interference(previous_wcrt))
            .sum();
        wcrt = intra_task_wcrt + interference;
        debug!(
            "Task {} iteration {}: interference {} WCRT {}",
            task_id, iterations, interference, wcrt
        );
    }

    if wcrt <= deadline {
        (wcrt, FixedPointOutcome::Converged)
    } else {
        warn!(
            "Task {} exceeded its deadline {} with WCRT {}.",
            task_id, deadline, wcrt
        );
        (wcrt, FixedPointOutcome::DeadlineExceeded)
    }
}
