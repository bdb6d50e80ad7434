//! Builders for small task sets shared by unit tests of the library and the binary.
use crate::dag_task::{DAGTask, TaskSet};
use crate::graph_extension::NodeData;
use crate::resource_model::ResourceModel;

pub fn create_node(id: usize, task_id: usize, wcet: i32, resource_type: usize) -> NodeData {
    NodeData::new(id, task_id, wcet, resource_type)
}

/// Builds a task from `(wcet, resource_type)` vertices and `(pre, suc)` edges.
/// Deadline equals period and priority equals the task id.
pub fn create_task(
    task_id: usize,
    period: i32,
    vertices: &[(i32, usize)],
    edges: &[(usize, usize)],
) -> DAGTask {
    let mut task = DAGTask::new(task_id, period, period, task_id as i32);
    for (id, &(wcet, resource_type)) in vertices.iter().enumerate() {
        task.add_vertex(create_node(id, task_id, wcet, resource_type));
    }
    for &(pre_id, suc_id) in edges {
        task.add_precedence(pre_id, suc_id).unwrap();
    }
    task
}

/// A chain of vertices on resource type 0.
pub fn create_chain_task(task_id: usize, period: i32, wcets: &[i32]) -> DAGTask {
    let vertices = wcets.iter().map(|&wcet| (wcet, 0)).collect::<Vec<_>>();
    let edges = (1..wcets.len()).map(|id| (id - 1, id)).collect::<Vec<_>>();
    create_task(task_id, period, &vertices, &edges)
}

/// 10 (type 0) forks into 20 (type 0) and 30 (type 1), both joining into 5 (type 0).
pub fn create_fork_join_task(task_id: usize, period: i32) -> DAGTask {
    create_task(
        task_id,
        period,
        &[(10, 0), (20, 0), (30, 1), (5, 0)],
        &[(0, 1), (0, 2), (1, 3), (2, 3)],
    )
}

/// Fork of three branches on one resource type whose middle branch has two vertices.
///
/// ```text
///      1(20)
///     /     \
/// 0(4)-2(8)-3(6)-5(2)
///     \     /
///      4(12)
/// ```
pub fn create_nested_fork_join_task(task_id: usize, period: i32) -> DAGTask {
    create_task(
        task_id,
        period,
        &[(4, 0), (20, 0), (8, 0), (6, 0), (12, 0), (2, 0)],
        &[(0, 1), (0, 2), (0, 4), (1, 5), (2, 3), (3, 5), (4, 5)],
    )
}

/// Two forks whose branches cross: 1 feeds both joins, so it is not nested fork-join.
///
/// ```text
/// 0 -> 1 -> 3 -> 4
/// 0 -> 2 -> 3
///      1 ------> 4
/// ```
pub fn create_crossing_task(task_id: usize, period: i32) -> DAGTask {
    create_task(
        task_id,
        period,
        &[(5, 0), (10, 0), (7, 0), (3, 0), (2, 0)],
        &[(0, 1), (0, 2), (1, 3), (2, 3), (1, 4), (3, 4)],
    )
}

/// Fork of three branches where only two of them join before the final join.
///
/// ```text
///      1(10)
///     /     \
/// 0(2)-2(6)--4(4)-5(1)
///     \          /
///      3(30)-----
/// ```
pub fn create_partial_join_task(task_id: usize, period: i32) -> DAGTask {
    create_task(
        task_id,
        period,
        &[(2, 0), (10, 0), (6, 0), (30, 0), (4, 0), (1, 0)],
        &[(0, 1), (0, 2), (0, 3), (1, 4), (2, 4), (4, 5), (3, 5)],
    )
}

pub fn create_task_set(cores_per_resource_type: Vec<usize>, tasks: Vec<DAGTask>) -> TaskSet {
    TaskSet::new(ResourceModel::new(cores_per_resource_type).unwrap(), tasks)
}
