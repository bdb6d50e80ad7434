use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use lib::analysis::{analyze_task_set_cancellable, AnalysisConfig, TaskSetAnalysis};
use lib::cancellation::CancellationFlag;
use lib::dag_task::TaskSet;
use lib::task_set_creator::create_task_set_from_file;
use log::{error, info, warn};
use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Schedulable,
    Unschedulable,
    Undetermined,
    Error,
}

pub enum FileOutcome {
    Analyzed {
        task_set: TaskSet,
        analysis: TaskSetAnalysis,
    },
    Failed {
        reason: String,
    },
    TimedOut,
}

impl FileOutcome {
    pub fn verdict(&self) -> Verdict {
        match self {
            FileOutcome::Analyzed { analysis, .. } if analysis.is_schedulable() => {
                Verdict::Schedulable
            }
            FileOutcome::Analyzed { .. } => Verdict::Unschedulable,
            FileOutcome::Failed { .. } => Verdict::Error,
            FileOutcome::TimedOut => Verdict::Undetermined,
        }
    }

    pub fn jobs(&self) -> Option<i64> {
        match self {
            FileOutcome::Analyzed { analysis, .. } => analysis.jobs_per_hyper_period(),
            _ => None,
        }
    }
}

pub fn analyze_file(
    file_path: &Path,
    config: &AnalysisConfig,
    cancel: &CancellationFlag,
) -> FileOutcome {
    let file_path_str = file_path.to_string_lossy();
    let result = create_task_set_from_file(&file_path_str).and_then(|task_set| {
        analyze_task_set_cancellable(&task_set, config, cancel).map(|analysis| (task_set, analysis))
    });
    match result {
        Ok((task_set, analysis)) => FileOutcome::Analyzed { task_set, analysis },
        Err(err) => {
            error!("{}: {}", file_path_str, err);
            FileOutcome::Failed {
                reason: err.to_string(),
            }
        }
    }
}

/// Analyzes the files `threads` at a time, each on its own worker. A file still
/// running after `timeout` is reported as `TimedOut` and its worker is cancelled;
/// every worker of a chunk has returned before the next chunk starts.
pub fn analyze_files(
    file_paths: &[PathBuf],
    config: &AnalysisConfig,
    threads: usize,
    timeout: Option<Duration>,
) -> Vec<(PathBuf, FileOutcome)> {
    let mut outcomes = Vec::with_capacity(file_paths.len());
    for chunk in file_paths.chunks(threads.max(1)) {
        let workers = chunk
            .iter()
            .map(|file_path| {
                let (sender, receiver) = mpsc::channel();
                let cancel = CancellationFlag::new();
                let worker_path = file_path.clone();
                let worker_config = config.clone();
                let worker_cancel = cancel.clone();
                let handle = thread::spawn(move || {
                    let _ = sender.send(analyze_file(&worker_path, &worker_config, &worker_cancel));
                });
                (file_path.clone(), receiver, cancel, handle)
            })
            .collect::<Vec<_>>();

        let started = Instant::now();
        let mut handles = Vec::with_capacity(workers.len());
        for (file_path, receiver, cancel, handle) in workers {
            let received = match timeout {
                Some(limit) => receiver.recv_timeout(limit.saturating_sub(started.elapsed())),
                None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            let outcome = match received {
                Ok(outcome) => outcome,
                Err(RecvTimeoutError::Timeout) => {
                    warn!("{}: wall-clock limit reached.", file_path.display());
                    cancel.cancel();
                    FileOutcome::TimedOut
                }
                Err(RecvTimeoutError::Disconnected) => FileOutcome::Failed {
                    reason: "analysis worker panicked".to_string(),
                },
            };
            info!("{}: {:?}", file_path.display(), outcome.verdict());
            outcomes.push((file_path, outcome));
            handles.push(handle);
        }
        for handle in handles {
            // a panicked worker is already reported through its channel
            let _ = handle.join();
        }
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const SAMPLE_DIR: &str = "../lib/tests/sample_task_sets";

    #[test]
    fn test_analyze_file_normal() {
        let outcome = analyze_file(
            &Path::new(SAMPLE_DIR).join("round_trip.csv"),
            &AnalysisConfig::default(),
            &CancellationFlag::new(),
        );
        assert_eq!(outcome.verdict(), Verdict::Schedulable);
        assert_eq!(outcome.jobs(), Some(7));
    }

    #[test]
    fn test_analyze_file_malformed() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("broken.csv");
        fs::write(&file_path, "R,1\nM,1\nX,1\n").unwrap();
        let cancel = CancellationFlag::new();
        let outcome = analyze_file(&file_path, &AnalysisConfig::default(), &cancel);
        assert_eq!(outcome.verdict(), Verdict::Error);
        assert_eq!(outcome.jobs(), None);
    }

    #[test]
    fn test_analyze_files_keeps_input_order() {
        let file_paths = vec![
            Path::new(SAMPLE_DIR).join("round_trip.csv"),
            Path::new(SAMPLE_DIR).join("missing.csv"),
            Path::new(SAMPLE_DIR).join("fork_join.yaml"),
        ];
        let outcomes = analyze_files(
            &file_paths,
            &AnalysisConfig::default(),
            2,
            Some(Duration::from_secs(60)),
        );
        let verdicts = outcomes
            .iter()
            .map(|(_, outcome)| outcome.verdict())
            .collect::<Vec<_>>();
        assert_eq!(
            verdicts,
            vec![Verdict::Schedulable, Verdict::Error, Verdict::Schedulable]
        );
        assert_eq!(outcomes[2].0, file_paths[2]);
    }

    #[test]
    fn test_analyze_files_zero_threads_runs_sequentially() {
        let file_paths = vec![Path::new(SAMPLE_DIR).join("fork_join.yaml")];
        let outcomes = analyze_files(&file_paths, &AnalysisConfig::default(), 0, None);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].1.verdict(), Verdict::Schedulable);
    }

    /// One source followed by `diamonds` fork-joins in series; the number of
    /// paths doubles with every diamond.
    fn write_diamond_chain(file_path: &Path, diamonds: usize) {
        let mut lines = vec![
            "R,1".to_string(),
            "M,1".to_string(),
            "T,1,1000,1000,1".to_string(),
            "V,1,1,0,0,0.001,0.001,1".to_string(),
        ];
        let mut join = 1;
        for _ in 0..diamonds {
            lines.push(format!("V,1,{},0,0,0.001,0.001,1,{}", join + 1, join));
            lines.push(format!("V,1,{},0,0,0.001,0.001,1,{}", join + 2, join));
            lines.push(format!("V,1,{},0,0,0.001,0.001,1,{},{}", join + 3, join + 1, join + 2));
            join += 3;
        }
        fs::write(file_path, lines.join("\n")).unwrap();
    }

    #[test]
    fn test_analyze_files_wall_clock_limit() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("diamonds.csv");
        write_diamond_chain(&file_path, 40);

        let started = Instant::now();
        let outcomes = analyze_files(
            &[file_path],
            &AnalysisConfig::default(),
            1,
            Some(Duration::from_millis(10)),
        );
        assert_eq!(outcomes[0].1.verdict(), Verdict::Undetermined);
        // the cancelled worker has been joined, not left enumerating paths
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn test_analyze_file_cancelled() {
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let outcome = analyze_file(
            &Path::new(SAMPLE_DIR).join("round_trip.csv"),
            &AnalysisConfig::default(),
            &cancel,
        );
        assert_eq!(outcome.verdict(), Verdict::Error);
    }
}
