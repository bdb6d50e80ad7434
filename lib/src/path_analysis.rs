//! Path & relation analysis: maximal paths, critical paths and per-vertex relation sets.
use std::collections::BTreeSet;

use log::warn;
use petgraph::graph::{Graph, NodeIndex};
use serde_derive::Serialize;

use crate::cancellation::CancellationFlag;
use crate::dag_task::{DAGTask, TaskSet};
use crate::error::AnalysisError;
use crate::graph_extension::{GraphExtension, NodeData};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathInfo {
    pub paths: Vec<Vec<usize>>,
    pub critical_paths: Vec<Vec<usize>>,
    pub critical_path_wcet: i32,
}

/// Relation sets of one vertex. `parallel` only holds vertices of the same task;
/// same-type vertices of other tasks are kept apart as `(task id, vertex id)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VertexRelations {
    pub ancestors: Vec<usize>,
    pub descendants: Vec<usize>,
    pub parallel: Vec<usize>,
    pub cross_task_parallel: Vec<(usize, usize)>,
}

impl VertexRelations {
    /// Every vertex that may run concurrently with this one, ordered by task id then vertex id.
    pub fn all_parallel(&self, task_id: usize) -> Vec<(usize, usize)> {
        let mut all_parallel = self
            .parallel
            .iter()
            .map(|&vertex_id| (task_id, vertex_id))
            .chain(self.cross_task_parallel.iter().copied())
            .collect::<Vec<_>>();
        all_parallel.sort();
        all_parallel
    }
}

fn search_paths(
    dag: &Graph<NodeData, i32>,
    cancel: &CancellationFlag,
    current_path: &mut Vec<usize>,
    paths: &mut Vec<Vec<usize>>,
) {
    if cancel.is_cancelled() {
        return;
    }
    let Some(&node_id) = current_path.last() else {
        return;
    };
    match dag.get_suc_nodes(NodeIndex::new(node_id)) {
        None => paths.push(current_path.clone()),
        Some(suc_nodes) => {
            for suc_node in suc_nodes {
                assert!(
                    !current_path.contains(&suc_node.index()),
                    "Cycle detected through vertex {}.",
                    suc_node.index()
                );
                current_path.push(suc_node.index());
                search_paths(dag, cancel, current_path, paths);
                current_path.pop();
            }
        }
    }
}

/// Enumerates every maximal path starting at vertex 0, depth first.
pub fn get_all_paths(dag: &Graph<NodeData, i32>) -> Vec<Vec<usize>> {
    get_all_paths_cancellable(dag, &CancellationFlag::default())
}

/// Same as `get_all_paths`, but stops as soon as `cancel` is set, leaving the
/// returned list incomplete.
pub fn get_all_paths_cancellable(
    dag: &Graph<NodeData, i32>,
    cancel: &CancellationFlag,
) -> Vec<Vec<usize>> {
    let mut paths = Vec::new();
    if dag.node_count() == 0 {
        return paths;
    }
    search_paths(dag, cancel, &mut vec![0], &mut paths);
    paths
}

fn get_path_wcet(dag: &Graph<NodeData, i32>, path: &[usize]) -> i32 {
    path.iter().map(|&id| dag[NodeIndex::new(id)].wcet).sum()
}

/// Returns every path of maximum total WCET together with that WCET.
pub fn get_critical_paths(
    dag: &Graph<NodeData, i32>,
    paths: &[Vec<usize>],
) -> (Vec<Vec<usize>>, i32) {
    let critical_path_wcet = paths
        .iter()
        .map(|path| get_path_wcet(dag, path))
        .max()
        .unwrap_or(0);
    let critical_paths = paths
        .iter()
        .filter(|path| get_path_wcet(dag, path) == critical_path_wcet)
        .cloned()
        .collect();
    (critical_paths, critical_path_wcet)
}

pub fn get_ancestors(paths: &[Vec<usize>], vertex_id: usize) -> Vec<usize> {
    let ancestors = paths
        .iter()
        .filter_map(|path| path.iter().position(|&id| id == vertex_id).map(|i| &path[..i]))
        .flatten()
        .copied()
        .collect::<BTreeSet<_>>();
    ancestors.into_iter().collect()
}

pub fn get_descendants(paths: &[Vec<usize>], vertex_id: usize) -> Vec<usize> {
    let descendants = paths
        .iter()
        .filter_map(|path| {
            path.iter()
                .position(|&id| id == vertex_id)
                .map(|i| &path[i + 1..])
        })
        .flatten()
        .copied()
        .collect::<BTreeSet<_>>();
    descendants.into_iter().collect()
}

/// Same-type vertices lying only on paths that avoid `vertex_id`.
pub fn get_parallel(
    dag: &Graph<NodeData, i32>,
    paths: &[Vec<usize>],
    vertex_id: usize,
) -> Vec<usize> {
    let resource_type = dag[NodeIndex::new(vertex_id)].resource_type;
    let (common_paths, uncommon_paths): (Vec<&Vec<usize>>, Vec<&Vec<usize>>) =
        paths.iter().partition(|path| path.contains(&vertex_id));
    let common_vertices = common_paths
        .iter()
        .flat_map(|path| path.iter().copied())
        .collect::<BTreeSet<_>>();
    let parallel = uncommon_paths
        .iter()
        .flat_map(|path| path.iter().copied())
        .filter(|id| {
            dag[NodeIndex::new(*id)].resource_type == resource_type && !common_vertices.contains(id)
        })
        .collect::<BTreeSet<_>>();
    parallel.into_iter().collect()
}

pub fn get_cross_task_parallel(
    task_set: &TaskSet,
    task_id: usize,
    resource_type: usize,
) -> Vec<(usize, usize)> {
    let mut cross_task_parallel = task_set
        .tasks
        .iter()
        .filter(|other| other.id != task_id)
        .flat_map(|other| {
            other
                .dag
                .node_indices()
                .filter(move |&node_i| other.dag[node_i].resource_type == resource_type)
                .map(move |node_i| (other.id, node_i.index()))
        })
        .collect::<Vec<_>>();
    cross_task_parallel.sort();
    cross_task_parallel
}

/// Enumerates paths and critical paths of a task.
pub fn get_path_info(
    task: &DAGTask,
    cancel: &CancellationFlag,
) -> Result<PathInfo, AnalysisError> {
    let paths = get_all_paths_cancellable(&task.dag, cancel);
    cancel.check()?;
    let (critical_paths, critical_path_wcet) = get_critical_paths(&task.dag, &paths);
    if critical_paths.len() > 1 {
        warn!(
            "Task {} has {} critical paths of WCET {}.",
            task.id,
            critical_paths.len(),
            critical_path_wcet
        );
    }
    Ok(PathInfo {
        paths,
        critical_paths,
        critical_path_wcet,
    })
}

/// Rejects a task whose critical path cannot complete within one period.
pub fn check_critical_path(task: &DAGTask, path_info: &PathInfo) -> Result<(), AnalysisError> {
    if path_info.critical_path_wcet > task.period {
        return Err(AnalysisError::InfeasibleCriticalPath {
            task_id: task.id,
            critical_path_wcet: path_info.critical_path_wcet,
            period: task.period,
        });
    }
    Ok(())
}

pub fn analyze_paths(task: &DAGTask) -> Result<PathInfo, AnalysisError> {
    let path_info = get_path_info(task, &CancellationFlag::default())?;
    check_critical_path(task, &path_info)?;
    Ok(path_info)
}

/// Relation sets of every vertex of `task`, indexed by vertex id.
pub fn get_vertex_relations(
    task_set: &TaskSet,
    task: &DAGTask,
    paths: &[Vec<usize>],
) -> Vec<VertexRelations> {
    task.dag
        .node_indices()
        .map(|node_i| {
            let vertex_id = node_i.index();
            VertexRelations {
                ancestors: get_ancestors(paths, vertex_id),
                descendants: get_descendants(paths, vertex_id),
                parallel: get_parallel(&task.dag, paths, vertex_id),
                cross_task_parallel: get_cross_task_parallel(
                    task_set,
                    task.id,
                    task.dag[node_i].resource_type,
                ),
            }
        })
        .collect()
}
