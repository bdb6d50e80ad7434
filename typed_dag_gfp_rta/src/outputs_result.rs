use lib::output_log::append_info_to_yaml;
use serde_derive::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::batch::{FileOutcome, Verdict};

#[derive(Serialize, Deserialize)]
pub struct FileResult {
    pub file: String,
    pub jobs: Option<i64>,
    pub verdict: Verdict,
}

#[derive(Serialize, Deserialize)]
pub struct BatchResult {
    pub each_file_result: Vec<FileResult>,
    pub total_tested: usize,
    pub passed: usize,
    pub failed: usize,
    pub undetermined: usize,
    pub errors: usize,
    pub schedulability_ratio: f64,
}

#[derive(Serialize, Deserialize)]
struct BatchResultSection {
    batch_result: BatchResult,
}

pub fn get_batch_result(outcomes: &[(PathBuf, FileOutcome)]) -> BatchResult {
    let each_file_result = outcomes
        .iter()
        .map(|(file_path, outcome)| FileResult {
            file: file_path.display().to_string(),
            jobs: outcome.jobs(),
            verdict: outcome.verdict(),
        })
        .collect::<Vec<_>>();
    let count = |verdict: Verdict| {
        each_file_result
            .iter()
            .filter(|result| result.verdict == verdict)
            .count()
    };
    let passed = count(Verdict::Schedulable);
    let total_tested = each_file_result.len();

    BatchResult {
        total_tested,
        passed,
        failed: count(Verdict::Unschedulable),
        undetermined: count(Verdict::Undetermined),
        errors: count(Verdict::Error),
        schedulability_ratio: if total_tested == 0 {
            0.0
        } else {
            passed as f64 / total_tested as f64
        },
        each_file_result,
    }
}

pub fn dump_batch_result_to_file(file_path: &str, outcomes: &[(PathBuf, FileOutcome)]) {
    let section = BatchResultSection {
        batch_result: get_batch_result(outcomes),
    };
    let yaml = serde_yaml::to_string(&section).expect("Failed to serialize batch result to YAML");
    append_info_to_yaml(file_path, &yaml);
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib::analysis::{analyze_task_set, AnalysisConfig};
    use lib::output_log::create_yaml_file;
    use lib::tests_helper::{create_chain_task, create_task_set};
    use std::fs;
    use tempfile::tempdir;

    fn analyzed(period: i32, wcets: &[i32]) -> FileOutcome {
        let task_set = create_task_set(vec![1], vec![create_chain_task(0, period, wcets)]);
        let analysis = analyze_task_set(&task_set, &AnalysisConfig::default()).unwrap();
        FileOutcome::Analyzed { task_set, analysis }
    }

    fn sample_outcomes() -> Vec<(PathBuf, FileOutcome)> {
        vec![
            (PathBuf::from("a.csv"), analyzed(100, &[10, 20])),
            (PathBuf::from("b.csv"), analyzed(100, &[10, 20])),
            (PathBuf::from("c.csv"), FileOutcome::TimedOut),
            (
                PathBuf::from("d.csv"),
                FileOutcome::Failed {
                    reason: "malformed".to_string(),
                },
            ),
        ]
    }

    #[test]
    fn test_get_batch_result_normal() {
        let result = get_batch_result(&sample_outcomes());
        assert_eq!(result.total_tested, 4);
        assert_eq!(result.passed, 2);
        assert_eq!(result.failed, 0);
        assert_eq!(result.undetermined, 1);
        assert_eq!(result.errors, 1);
        assert_eq!(result.schedulability_ratio, 0.5);
        assert_eq!(result.each_file_result[0].jobs, Some(2));
        assert_eq!(result.each_file_result[2].jobs, None);
    }

    #[test]
    fn test_get_batch_result_empty() {
        let result = get_batch_result(&[]);
        assert_eq!(result.total_tested, 0);
        assert_eq!(result.schedulability_ratio, 0.0);
    }

    #[test]
    fn test_dump_batch_result_to_file_normal() {
        let dir = tempdir().unwrap();
        let file_path = create_yaml_file(dir.path().to_str().unwrap(), "tests");
        dump_batch_result_to_file(&file_path, &sample_outcomes());

        let file_contents = fs::read_to_string(&file_path).unwrap();
        let section: BatchResultSection = serde_yaml::from_str(&file_contents).unwrap();
        let result = section.batch_result;
        assert_eq!(result.each_file_result.len(), 4);
        assert_eq!(result.each_file_result[1].file, "b.csv");
        assert_eq!(result.each_file_result[2].verdict, Verdict::Undetermined);
        assert_eq!(result.each_file_result[3].verdict, Verdict::Error);
    }
}
