//! Build a validated task set from a CSV or YAML task-set file
use crate::dag_task::{DAGTask, TaskSet};
use crate::error::AnalysisError;
use crate::graph_extension::NodeData;
use crate::resource_model::ResourceModel;
use crate::util::{load_yaml, scale_to_integer_units, TIME_UNIT_DIGITS};

use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;
use std::path::{Path, PathBuf};
use yaml_rust::Yaml;

/// File names produced next to task sets by the workload tooling.
const SKIPPED_FILE_NAME_PATTERNS: [&str; 6] = [
    "Report",
    "NOT_FEASIBLE",
    "TasksetSettings",
    "Results",
    "Jobs",
    "Pred",
];

/// A task whose vertices have been read but whose precedence edges are still pending.
struct TaskRecord {
    task: DAGTask,
    predecessors: Vec<Vec<usize>>,
}

impl TaskRecord {
    fn new(task: DAGTask) -> Self {
        Self {
            task,
            predecessors: Vec::new(),
        }
    }

    fn push_vertex(
        &mut self,
        line: usize,
        node: NodeData,
        predecessors: Vec<usize>,
    ) -> Result<(), AnalysisError> {
        if node.id != self.task.vertex_count() {
            return Err(AnalysisError::malformed(
                line,
                format!(
                    "Vertex {} of task {} is out of order; expected vertex {}.",
                    node.id + 1,
                    self.task.id + 1,
                    self.task.vertex_count() + 1
                ),
            ));
        }
        self.task.add_vertex(node);
        self.predecessors.push(predecessors);
        Ok(())
    }

    fn into_task(mut self) -> Result<DAGTask, AnalysisError> {
        for (vertex_id, predecessors) in self.predecessors.iter().enumerate() {
            for &pre_id in predecessors {
                self.task.add_precedence(pre_id, vertex_id)?;
            }
        }
        Ok(self.task)
    }
}

fn assemble_task_set(
    resource_type_count: usize,
    cores_per_resource_type: Vec<usize>,
    records: Vec<TaskRecord>,
) -> Result<TaskSet, AnalysisError> {
    if resource_type_count != cores_per_resource_type.len() {
        return Err(AnalysisError::malformed(
            0,
            format!(
                "{} resource types declared but {} core counts given.",
                resource_type_count,
                cores_per_resource_type.len()
            ),
        ));
    }
    let resource_model = ResourceModel::new(cores_per_resource_type)?;
    let tasks = records
        .into_iter()
        .map(TaskRecord::into_task)
        .collect::<Result<Vec<_>, _>>()?;
    let task_set = TaskSet::new(resource_model, tasks);
    task_set.validate()?;
    Ok(task_set)
}

fn parse_duration(line: usize, field: &str, text: &str) -> Result<i32, AnalysisError> {
    scale_to_integer_units(text, TIME_UNIT_DIGITS).ok_or_else(|| {
        AnalysisError::malformed(line, format!("Invalid {} duration '{}'.", field, text))
    })
}

fn parse_count(line: usize, field: &str, text: &str) -> Result<usize, AnalysisError> {
    text.trim()
        .parse::<usize>()
        .map_err(|_| AnalysisError::malformed(line, format!("Invalid {} '{}'.", field, text)))
}

/// Converts a 1-based identifier from a file into its 0-based internal form.
fn parse_one_based(line: usize, field: &str, text: &str) -> Result<usize, AnalysisError> {
    match parse_count(line, field, text)? {
        0 => Err(AnalysisError::malformed(
            line,
            format!("{} must be 1-based, found 0.", field),
        )),
        id => Ok(id - 1),
    }
}

fn record_field<'a>(
    record: &'a StringRecord,
    line: usize,
    index: usize,
    field: &str,
) -> Result<&'a str, AnalysisError> {
    record
        .get(index)
        .ok_or_else(|| AnalysisError::malformed(line, format!("Missing field {}.", field)))
}

fn find_task_record(
    records: &mut [TaskRecord],
    line: usize,
    task_id: usize,
) -> Result<&mut TaskRecord, AnalysisError> {
    records
        .iter_mut()
        .find(|record| record.task.id == task_id)
        .ok_or_else(|| {
            AnalysisError::malformed(
                line,
                format!("Vertex refers to undeclared task {}.", task_id + 1),
            )
        })
}

/// load a CSV task-set file and return a validated task set
///
/// # Arguments
///
/// *  `file_path` - CSV file with `R`, `M`, `T` and `V` records
///
/// # Example
///
/// ```
/// use lib::task_set_creator::create_task_set_from_csv;
///
/// let task_set = create_task_set_from_csv("tests/sample_task_sets/round_trip.csv").unwrap();
/// let task_num = task_set.tasks.len();
/// ```
pub fn create_task_set_from_csv(file_path: &str) -> Result<TaskSet, AnalysisError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .from_path(file_path)?;

    let mut resource_type_count = None;
    let mut cores_per_resource_type = Vec::new();
    let mut records: Vec<TaskRecord> = Vec::new();

    for result in reader.records() {
        let record = result?;
        let line = record.position().map_or(0, |position| position.line() as usize);
        match record_field(&record, line, 0, "record kind")? {
            "R" => {
                let count_text = record_field(&record, line, 1, "resource type count")?;
                resource_type_count = Some(parse_count(line, "resource type count", count_text)?);
            }
            "M" => {
                let cores_text = record_field(&record, line, 1, "core count")?;
                cores_per_resource_type.push(parse_count(line, "core count", cores_text)?);
            }
            "T" => {
                if record.len() < 5 {
                    return Err(AnalysisError::malformed(
                        line,
                        format!("Task record has {} fields, expected 5.", record.len()),
                    ));
                }
                let task_id = parse_one_based(line, "task id", &record[1])?;
                let period = parse_duration(line, "period", &record[2])?;
                let deadline = parse_duration(line, "deadline", &record[3])?;
                let priority = record[4].parse::<i32>().map_err(|_| {
                    AnalysisError::malformed(line, format!("Invalid priority '{}'.", &record[4]))
                })?;
                records.push(TaskRecord::new(DAGTask::new(
                    task_id, period, deadline, priority,
                )));
            }
            "V" => {
                if record.len() < 8 {
                    return Err(AnalysisError::malformed(
                        line,
                        format!("Vertex record has {} fields, expected at least 8.", record.len()),
                    ));
                }
                let task_id = parse_one_based(line, "task id", &record[1])?;
                let mut node = NodeData::new(
                    parse_one_based(line, "vertex id", &record[2])?,
                    task_id,
                    parse_duration(line, "WCET", &record[6])?,
                    parse_one_based(line, "resource type", &record[7])?,
                );
                node.r_min = parse_duration(line, "r_min", &record[3])?;
                node.r_max = parse_duration(line, "r_max", &record[4])?;
                node.bcet = parse_duration(line, "BCET", &record[5])?;
                let predecessors = record
                    .iter()
                    .skip(8)
                    .filter(|cell| !cell.is_empty())
                    .map(|cell| parse_one_based(line, "predecessor id", cell))
                    .collect::<Result<Vec<_>, _>>()?;
                find_task_record(&mut records, line, task_id)?.push_vertex(line, node, predecessors)?;
            }
            kind => {
                return Err(AnalysisError::malformed(
                    line,
                    format!("Unknown record kind '{}'.", kind),
                ));
            }
        }
    }

    let resource_type_count = resource_type_count
        .ok_or_else(|| AnalysisError::malformed(0, "Missing resource type count record."))?;
    let task_set = assemble_task_set(resource_type_count, cores_per_resource_type, records)?;
    debug!("Loaded {} tasks from {}", task_set.tasks.len(), file_path);
    Ok(task_set)
}

fn yaml_duration(yaml: &Yaml, line: usize, field: &str) -> Result<i32, AnalysisError> {
    match &yaml[field] {
        Yaml::Integer(value) => parse_duration(line, field, &value.to_string()),
        Yaml::Real(value) => parse_duration(line, field, value),
        // release offsets default to zero
        Yaml::BadValue if matches!(field, "r_min" | "r_max") => Ok(0),
        Yaml::BadValue => Err(AnalysisError::malformed(
            line,
            format!("Missing field {}.", field),
        )),
        _ => Err(AnalysisError::malformed(
            line,
            format!("Field {} is not a number.", field),
        )),
    }
}

fn yaml_one_based(yaml: &Yaml, line: usize, field: &str) -> Result<usize, AnalysisError> {
    match yaml.as_i64() {
        Some(value) if value >= 1 => Ok(value as usize - 1),
        _ => Err(AnalysisError::malformed(
            line,
            format!("{} must be a 1-based integer.", field),
        )),
    }
}

/// load a YAML task-set file and return a validated task set
///
/// # Example
///
/// ```
/// use lib::task_set_creator::create_task_set_from_yaml;
///
/// let task_set = create_task_set_from_yaml("tests/sample_task_sets/fork_join.yaml").unwrap();
/// let first_task_vertex_num = task_set.tasks[0].vertex_count();
/// ```
pub fn create_task_set_from_yaml(file_path: &str) -> Result<TaskSet, AnalysisError> {
    let yaml_docs = load_yaml(file_path)?;
    let yaml_doc = yaml_docs
        .first()
        .ok_or_else(|| AnalysisError::malformed(0, "Empty YAML document."))?;

    let (Some(cores), Some(tasks)) = (
        yaml_doc["cores_per_resource_type"].as_vec(),
        yaml_doc["tasks"].as_vec(),
    ) else {
        return Err(AnalysisError::malformed(
            0,
            "YAML file is not a task set (cores_per_resource_type and tasks are required).",
        ));
    };

    let cores_per_resource_type = cores
        .iter()
        .map(|core| match core.as_i64() {
            Some(value) if value >= 0 => Ok(value as usize),
            _ => Err(AnalysisError::malformed(0, "Core counts must be integers.")),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut records = Vec::new();
    // task records are numbered from 1 in place of line numbers
    for (index, task_yaml) in tasks.iter().enumerate() {
        let line = index + 1;
        let task_id = yaml_one_based(&task_yaml["id"], line, "task id")?;
        let priority = task_yaml["priority"]
            .as_i64()
            .ok_or_else(|| AnalysisError::malformed(line, "Missing field priority."))?
            as i32;
        let mut record = TaskRecord::new(DAGTask::new(
            task_id,
            yaml_duration(task_yaml, line, "period")?,
            yaml_duration(task_yaml, line, "deadline")?,
            priority,
        ));

        let vertices = task_yaml["vertices"]
            .as_vec()
            .ok_or_else(|| AnalysisError::malformed(line, "Missing field vertices."))?;
        for vertex_yaml in vertices {
            let wcet = yaml_duration(vertex_yaml, line, "wcet")?;
            let mut node = NodeData::new(
                yaml_one_based(&vertex_yaml["id"], line, "vertex id")?,
                task_id,
                wcet,
                yaml_one_based(&vertex_yaml["resource_type"], line, "resource type")?,
            );
            node.r_min = yaml_duration(vertex_yaml, line, "r_min")?;
            node.r_max = yaml_duration(vertex_yaml, line, "r_max")?;
            node.bcet = match &vertex_yaml["bcet"] {
                Yaml::BadValue => wcet,
                _ => yaml_duration(vertex_yaml, line, "bcet")?,
            };
            let predecessors = match vertex_yaml["predecessors"].as_vec() {
                Some(predecessors) => predecessors
                    .iter()
                    .map(|pre| yaml_one_based(pre, line, "predecessor id"))
                    .collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            record.push_vertex(line, node, predecessors)?;
        }
        records.push(record);
    }

    let task_set = assemble_task_set(
        cores_per_resource_type.len(),
        cores_per_resource_type,
        records,
    )?;
    debug!("Loaded {} tasks from {}", task_set.tasks.len(), file_path);
    Ok(task_set)
}

/// Dispatches on the file extension: `.yaml`/`.yml` files are YAML, everything else CSV.
pub fn create_task_set_from_file(file_path: &str) -> Result<TaskSet, AnalysisError> {
    match Path::new(file_path).extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => create_task_set_from_yaml(file_path),
        _ => create_task_set_from_csv(file_path),
    }
}

fn is_task_set_file(path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    path.is_file()
        && !file_name.ends_with(".png")
        && !SKIPPED_FILE_NAME_PATTERNS
            .iter()
            .any(|pattern| file_name.contains(pattern))
}

/// Lists the task-set files of a directory in name order.
pub fn get_task_set_paths_from_dir(dir_path: &str) -> Result<Vec<PathBuf>, AnalysisError> {
    let mut file_path_list = Vec::new();
    for dir_entry_result in PathBuf::from(dir_path).read_dir()? {
        let path = dir_entry_result?.path();
        if is_task_set_file(&path) {
            file_path_list.push(path);
        }
    }
    file_path_list.sort();
    Ok(file_path_list)
}
