//! Error kinds surfaced by task-set loading and analysis.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Failed to read task set: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse CSV task set: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to parse YAML task set: {0}")]
    Yaml(#[from] yaml_rust::ScanError),
    #[error("Malformed input at record {line}: {reason}")]
    MalformedInput { line: usize, reason: String },
    #[error("Invalid task {task_id}: {reason}")]
    InvalidTaskSet { task_id: usize, reason: String },
    #[error("Task {task_id} has a cyclic predecessor graph")]
    CyclicGraph { task_id: usize },
    #[error(
        "Task {task_id} is infeasible: critical path WCET {critical_path_wcet} exceeds period {period}"
    )]
    InfeasibleCriticalPath {
        task_id: usize,
        critical_path_wcet: i32,
        period: i32,
    },
    #[error("Task {task_id} is not series-parallel after NFJ normalization (at vertex {vertex_id})")]
    NotSeriesParallel { task_id: usize, vertex_id: usize },
    #[error("Analysis was cancelled")]
    Cancelled,
}

impl AnalysisError {
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        AnalysisError::MalformedInput {
            line,
            reason: reason.into(),
        }
    }

    pub fn invalid(task_id: usize, reason: impl Into<String>) -> Self {
        AnalysisError::InvalidTaskSet {
            task_id,
            reason: reason.into(),
        }
    }
}
