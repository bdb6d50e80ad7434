use chrono::{DateTime, Utc};
use log::{info, warn};
use serde_derive::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;

use crate::analysis::TaskSetAnalysis;
use crate::dag_task::TaskSet;
use crate::inter_task_rta::FixedPointOutcome;
use crate::path_analysis::{get_all_paths, get_critical_paths};

/// Task ids in result files are 1-based, as in the task-set files.
#[derive(Serialize, Deserialize)]
pub struct TaskSetInfo {
    pub total_utilization: f32,
    pub cores_per_resource_type: Vec<usize>,
    pub each_task_info: Vec<TaskInfo>,
}

#[derive(Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: usize,
    pub critical_path_wcet: i32,
    pub volume: i32,
    pub period: i32,
    pub deadline: i32,
    pub number_of_vertices: usize,
}

#[derive(Serialize, Deserialize)]
pub struct TaskSetResult {
    pub schedulable: bool,
    pub jobs_per_hyper_period: Option<i64>,
    pub each_task_result: Vec<TaskResult>,
}

#[derive(Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: usize,
    pub priority: i32,
    pub intra_task_wcrt: f64,
    pub wcrt: f64,
    pub deadline: i32,
    pub schedulable: bool,
    pub outcome: FixedPointOutcome,
    pub failure: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct TaskSetInfoSection {
    task_set_info: TaskSetInfo,
}

#[derive(Serialize, Deserialize)]
struct TaskSetResultSection {
    task_set_result: TaskSetResult,
}

pub fn create_yaml_file(folder_path: &str, file_name: &str) -> String {
    if fs::metadata(folder_path).is_err() {
        let _ = fs::create_dir_all(folder_path);
        info!("Created folder: {}", folder_path);
    }
    let file_path = format!("{}/{}.yaml", folder_path, file_name);
    if let Err(err) = fs::File::create(&file_path) {
        warn!("Failed to create file: {}", err);
    }
    file_path
}

/// Creates `<dir_path>/<date>-<name>.yaml` stamped with the current UTC time.
pub fn create_result_yaml_file(dir_path: &str, name: &str) -> String {
    let now: DateTime<Utc> = Utc::now();
    let date = now.format("%Y-%m-%d-%H-%M-%S").to_string();
    create_yaml_file(dir_path, &format!("{}-{}", date, name))
}

pub fn append_info_to_yaml(file_path: &str, info: &str) {
    if let Ok(mut file) = OpenOptions::new()
        .write(true)
        .append(true)
        .create(true)
        .open(file_path)
    {
        if let Err(err) = file.write_all(info.as_bytes()) {
            warn!("Failed to write to file: {}", err);
        }
    } else {
        warn!("Failed to open file: {}", file_path);
    }
}

pub fn get_task_set_info(task_set: &TaskSet) -> TaskSetInfo {
    let each_task_info = task_set
        .tasks
        .iter()
        .map(|task| {
            let (_, critical_path_wcet) = get_critical_paths(&task.dag, &get_all_paths(&task.dag));
            TaskInfo {
                task_id: task.id + 1,
                critical_path_wcet,
                volume: task.get_volume(),
                period: task.period,
                deadline: task.deadline,
                number_of_vertices: task.vertex_count(),
            }
        })
        .collect();

    TaskSetInfo {
        total_utilization: task_set.get_total_utilization(),
        cores_per_resource_type: task_set.resource_model.cores_per_resource_type().to_vec(),
        each_task_info,
    }
}

pub fn get_task_set_result(analysis: &TaskSetAnalysis) -> TaskSetResult {
    TaskSetResult {
        schedulable: analysis.is_schedulable(),
        jobs_per_hyper_period: analysis.jobs_per_hyper_period(),
        each_task_result: analysis
            .tasks()
            .iter()
            .map(|task| TaskResult {
                task_id: task.task_id() + 1,
                priority: task.priority(),
                intra_task_wcrt: task.intra_task_wcrt(),
                wcrt: task.wcrt(),
                deadline: task.deadline(),
                schedulable: task.is_schedulable(),
                outcome: task.outcome(),
                failure: task.failure().clone(),
            })
            .collect(),
    }
}

pub fn dump_task_set_info_to_yaml(file_path: &str, task_set: &TaskSet) {
    let section = TaskSetInfoSection {
        task_set_info: get_task_set_info(task_set),
    };
    let yaml = serde_yaml::to_string(&section).expect("Failed to serialize TaskSetInfo to YAML");
    append_info_to_yaml(file_path, &yaml);
}

pub fn dump_task_set_result_to_yaml(file_path: &str, analysis: &TaskSetAnalysis) {
    let section = TaskSetResultSection {
        task_set_result: get_task_set_result(analysis),
    };
    let yaml =
        serde_yaml::to_string(&section).expect("Failed to serialize TaskSetResult to YAML");
    append_info_to_yaml(file_path, &yaml);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{analyze_task_set, AnalysisConfig};
    use crate::tests_helper::{create_chain_task, create_fork_join_task, create_task_set};
    use tempfile::tempdir;

    #[derive(Deserialize)]
    struct ResultFile {
        task_set_info: TaskSetInfo,
        task_set_result: TaskSetResult,
    }

    #[test]
    fn test_dump_task_set_info_and_result_to_yaml_normal() {
        let dir = tempdir().unwrap();
        let task_set = create_task_set(
            vec![1, 1],
            vec![
                create_chain_task(0, 100, &[10, 20]),
                create_fork_join_task(1, 200),
            ],
        );
        let analysis = analyze_task_set(&task_set, &AnalysisConfig::default()).unwrap();

        let file_path = create_yaml_file(dir.path().to_str().unwrap(), "tests");
        dump_task_set_info_to_yaml(&file_path, &task_set);
        dump_task_set_result_to_yaml(&file_path, &analysis);

        let file_contents = fs::read_to_string(&file_path).unwrap();
        let result_file: ResultFile = serde_yaml::from_str(&file_contents).unwrap();

        let info = result_file.task_set_info;
        assert_eq!(info.cores_per_resource_type, vec![1, 1]);
        assert_eq!(info.each_task_info.len(), 2);
        assert_eq!(info.each_task_info[1].task_id, 2);
        assert_eq!(info.each_task_info[1].critical_path_wcet, 45);
        assert_eq!(info.each_task_info[1].volume, 65);
        assert_eq!(info.each_task_info[0].number_of_vertices, 2);

        let result = result_file.task_set_result;
        assert!(result.schedulable);
        assert_eq!(result.jobs_per_hyper_period, Some(8));
        assert_eq!(result.each_task_result[1].failure, None);
        assert_eq!(result.each_task_result[0].task_id, 1);
        assert_eq!(result.each_task_result[0].wcrt, 30.0);
        assert_eq!(
            result.each_task_result[1].outcome,
            FixedPointOutcome::Converged
        );
    }

    #[test]
    fn test_create_result_yaml_file_creates_folder() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("nested");
        let file_path = create_result_yaml_file(folder.to_str().unwrap(), "round_trip");
        assert!(file_path.ends_with("-round_trip.yaml"));
        assert!(fs::metadata(&file_path).is_ok());
    }
}
