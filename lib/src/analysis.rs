//! Whole-pipeline WCRT analysis of a task set under global fixed-priority scheduling.
use getset::{CopyGetters, Getters};
use log::{info, warn};
use petgraph::graph::Graph;

use crate::cancellation::CancellationFlag;
use crate::dag_task::{DAGTask, TaskSet};
use crate::decomposition_tree::{build_decomposition_tree, DecompositionTree};
use crate::error::AnalysisError;
use crate::graph_extension::NodeData;
use crate::inter_task_rta::{
    get_min_job_volume, iterate_response_time, FixedPointOutcome, HigherPriorityProfile,
};
use crate::interference_profile::{extract_interference_blocks, InterferenceBlock};
use crate::intra_task_rta::get_intra_task_wcrt_cancellable;
use crate::nfj_dag::{normalize_to_nfj_cancellable, NfjMode};
use crate::path_analysis::{
    check_critical_path, get_path_info, get_vertex_relations, PathInfo, VertexRelations,
};
use crate::util::get_total_jobs_per_hyper_period;

pub const DEFAULT_MAX_FIXED_POINT_ITERATIONS: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    pub nfj_mode: NfjMode,
    /// Judge every task by its intra-task WCRT alone.
    pub intra_task_only: bool,
    pub max_fixed_point_iterations: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            nfj_mode: NfjMode::default(),
            intra_task_only: false,
            max_fixed_point_iterations: DEFAULT_MAX_FIXED_POINT_ITERATIONS,
        }
    }
}

/// Results of one task, exposed read-only for reporting.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct TaskAnalysis {
    #[getset(get_copy = "pub")]
    task_id: usize,
    #[getset(get_copy = "pub")]
    priority: i32,
    #[getset(get_copy = "pub")]
    period: i32,
    #[getset(get_copy = "pub")]
    deadline: i32,
    #[getset(get = "pub")]
    path_info: PathInfo,
    #[getset(get = "pub")]
    relations: Vec<VertexRelations>,
    #[getset(get = "pub")]
    nfj_dag: Option<Graph<NodeData, i32>>,
    #[getset(get = "pub")]
    decomposition_tree: Option<DecompositionTree>,
    #[getset(get = "pub")]
    interference_blocks: Vec<InterferenceBlock>,
    #[getset(get_copy = "pub")]
    min_job_volume: f64,
    #[getset(get_copy = "pub")]
    intra_task_wcrt: f64,
    #[getset(get_copy = "pub")]
    wcrt: f64,
    #[getset(get_copy = "pub")]
    outcome: FixedPointOutcome,
    /// Why the task could not be analyzed, when it could not.
    #[getset(get = "pub")]
    failure: Option<String>,
}

impl TaskAnalysis {
    pub fn is_schedulable(&self) -> bool {
        self.outcome == FixedPointOutcome::Converged && self.wcrt <= self.deadline as f64
    }

    fn to_higher_priority_profile(&self) -> HigherPriorityProfile {
        HigherPriorityProfile {
            task_id: self.task_id,
            period: self.period,
            wcrt: self.wcrt,
            critical_path_wcet: self.path_info.critical_path_wcet,
            min_job_volume: self.min_job_volume,
            blocks: self.interference_blocks.clone(),
        }
    }
}

#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct TaskSetAnalysis {
    /// Highest priority first.
    #[getset(get = "pub")]
    tasks: Vec<TaskAnalysis>,
    /// `None` when the hyperperiod does not fit in an `i64`.
    #[getset(get_copy = "pub")]
    jobs_per_hyper_period: Option<i64>,
}

impl TaskSetAnalysis {
    pub fn is_schedulable(&self) -> bool {
        self.tasks.iter().all(|task| task.is_schedulable())
    }

    pub fn get_task(&self, task_id: usize) -> Option<&TaskAnalysis> {
        self.tasks.iter().find(|task| task.task_id == task_id)
    }
}

/// Intra-task stage of one task plus, unless disabled, its interference profile.
/// An infeasible critical path or a graph that is not series-parallel is recorded
/// as the task's failure.
fn analyze_task(
    task_set: &TaskSet,
    task: &DAGTask,
    config: &AnalysisConfig,
    cancel: &CancellationFlag,
) -> Result<TaskAnalysis, AnalysisError> {
    let path_info = get_path_info(task, cancel)?;
    let mut failure = check_critical_path(task, &path_info)
        .err()
        .map(|err| err.to_string());
    let relations = get_vertex_relations(task_set, task, &path_info.paths);
    let intra_task_wcrt =
        get_intra_task_wcrt_cancellable(&task.dag, &relations, &task_set.resource_model, cancel);
    cancel.check()?;

    let (nfj_dag, decomposition_tree, interference_blocks) = if config.intra_task_only {
        (None, None, Vec::new())
    } else {
        let nfj_dag = normalize_to_nfj_cancellable(&task.dag, config.nfj_mode, cancel).dag;
        cancel.check()?;
        match build_decomposition_tree(task.id, &nfj_dag) {
            Ok(tree) => {
                let blocks =
                    extract_interference_blocks(&tree, &task.dag, &task_set.resource_model);
                (Some(nfj_dag), Some(tree), blocks)
            }
            Err(err @ AnalysisError::NotSeriesParallel { .. }) => {
                failure.get_or_insert(err.to_string());
                (Some(nfj_dag), None, Vec::new())
            }
            Err(err) => return Err(err),
        }
    };

    let outcome = if failure.is_some() {
        FixedPointOutcome::NotAnalyzed
    } else if intra_task_wcrt <= task.deadline as f64 {
        FixedPointOutcome::Converged
    } else {
        FixedPointOutcome::DeadlineExceeded
    };
    if let Some(reason) = failure.as_ref() {
        warn!("Task {} not analyzed: {}", task.id, reason);
    }

    Ok(TaskAnalysis {
        task_id: task.id,
        priority: task.priority,
        period: task.period,
        deadline: task.deadline,
        path_info,
        relations,
        nfj_dag,
        decomposition_tree,
        interference_blocks,
        min_job_volume: get_min_job_volume(&task.dag, &task_set.resource_model),
        intra_task_wcrt,
        wcrt: intra_task_wcrt,
        outcome,
        failure,
    })
}

/// Validates `task_set` and computes the WCRT of every task in priority order.
///
/// # Example
///
/// ```
/// use lib::analysis::{analyze_task_set, AnalysisConfig};
/// use lib::task_set_creator::create_task_set_from_csv;
///
/// let task_set = create_task_set_from_csv("tests/sample_task_sets/round_trip.csv").unwrap();
/// let result = analyze_task_set(&task_set, &AnalysisConfig::default()).unwrap();
/// assert!(result.is_schedulable());
/// ```
pub fn analyze_task_set(
    task_set: &TaskSet,
    config: &AnalysisConfig,
) -> Result<TaskSetAnalysis, AnalysisError> {
    analyze_task_set_cancellable(task_set, config, &CancellationFlag::default())
}

/// Same as `analyze_task_set`, but gives up with `AnalysisError::Cancelled` once
/// `cancel` is set by another thread.
pub fn analyze_task_set_cancellable(
    task_set: &TaskSet,
    config: &AnalysisConfig,
    cancel: &CancellationFlag,
) -> Result<TaskSetAnalysis, AnalysisError> {
    task_set.validate()?;

    let mut analyzed: Vec<TaskAnalysis> = Vec::new();
    for task in task_set.tasks_by_priority() {
        let mut task_analysis = analyze_task(task_set, task, config, cancel)?;
        if task_analysis.failure.is_none() && !config.intra_task_only && !analyzed.is_empty() {
            if analyzed.iter().any(|higher| higher.failure.is_some()) {
                // the interference of a failed task is unknown
                task_analysis.outcome = FixedPointOutcome::NotAnalyzed;
            } else {
                let profiles = analyzed
                    .iter()
                    .map(TaskAnalysis::to_higher_priority_profile)
                    .collect::<Vec<_>>();
                let (wcrt, outcome) = iterate_response_time(
                    task.id,
                    task_analysis.intra_task_wcrt,
                    task.deadline,
                    &profiles,
                    config.max_fixed_point_iterations,
                );
                task_analysis.wcrt = wcrt;
                task_analysis.outcome = outcome;
            }
        }
        info!(
            "Task {} (priority {}): intra-task WCRT {}, WCRT {}, deadline {}, {}",
            task.id,
            task.priority,
            task_analysis.intra_task_wcrt,
            task_analysis.wcrt,
            task.deadline,
            if task_analysis.is_schedulable() {
                "schedulable"
            } else {
                "unschedulable"
            }
        );
        analyzed.push(task_analysis);
    }

    Ok(TaskSetAnalysis {
        tasks: analyzed,
        jobs_per_hyper_period: get_total_jobs_per_hyper_period(task_set),
    })
}
