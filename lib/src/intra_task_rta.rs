//! Standalone response-time bound of one DAG task by tuple expansion.
use log::debug;
use petgraph::graph::{Graph, NodeIndex};

use crate::cancellation::CancellationFlag;
use crate::graph_extension::{GraphExtension, NodeData};
use crate::path_analysis::VertexRelations;
use crate::resource_model::ResourceModel;

/// A partial path ending at `vertex`. `delta` holds, per resource type, the latest
/// vertex of that type seen along the path, ordered by id.
#[derive(Debug, Clone, PartialEq)]
struct ResponseTimeTuple {
    vertex: usize,
    delta: Vec<usize>,
    response_time: f64,
}

struct IntraTaskSolver<'a> {
    dag: &'a Graph<NodeData, i32>,
    relations: &'a [VertexRelations],
    resource_model: &'a ResourceModel,
    cancel: &'a CancellationFlag,
}

impl<'a> IntraTaskSolver<'a> {
    fn resource_type(&self, vertex_id: usize) -> usize {
        self.dag[NodeIndex::new(vertex_id)].resource_type
    }

    fn wcet(&self, vertex_id: usize) -> i32 {
        self.dag[NodeIndex::new(vertex_id)].wcet
    }

    /// Latest vertex in `delta` sharing the resource type.
    fn closest_of_type(&self, delta: &[usize], resource_type: usize) -> Option<usize> {
        delta
            .iter()
            .copied()
            .filter(|&id| self.resource_type(id) == resource_type)
            .max()
    }

    fn next_delta(&self, delta: &[usize], suc_id: usize) -> Vec<usize> {
        let suc_type = self.resource_type(suc_id);
        let mut next_delta = (0..self.resource_model.get_number_of_resource_types())
            .filter_map(|resource_type| {
                if resource_type == suc_type {
                    Some(suc_id)
                } else {
                    self.closest_of_type(delta, resource_type)
                }
            })
            .collect::<Vec<_>>();
        next_delta.sort();
        next_delta
    }

    /// Interference of vertices parallel to `suc_id` that the closest same-type
    /// vertex on the path has not already accounted for.
    fn extra_interference(&self, delta: &[usize], suc_id: usize) -> f64 {
        let suc_type = self.resource_type(suc_id);
        let accounted: &[usize] = match self.closest_of_type(delta, suc_type) {
            Some(closest) => &self.relations[closest].parallel,
            None => &[],
        };
        let interfering_wcet: i32 = self.relations[suc_id]
            .parallel
            .iter()
            .filter(|id| !accounted.contains(id))
            .map(|&id| self.wcet(id))
            .sum();
        interfering_wcet as f64 * self.resource_model.interference_weight(suc_type)
    }

    /// True when a vertex of `existing_delta` may run in parallel with a descendant
    /// of some vertex of `new_delta` on the same resource type.
    fn delta_intersection(&self, existing_delta: &[usize], new_delta: &[usize]) -> bool {
        existing_delta.iter().any(|&existing_id| {
            let parallel = &self.relations[existing_id].parallel;
            new_delta.iter().any(|&new_id| {
                self.relations[new_id]
                    .descendants
                    .iter()
                    .any(|des| parallel.contains(des))
            })
        })
    }

    fn is_dominated(&self, existing: &ResponseTimeTuple, candidate: &ResponseTimeTuple) -> bool {
        existing.vertex == candidate.vertex
            && existing.response_time >= candidate.response_time
            && (existing.delta.is_empty()
                || (!candidate.delta.is_empty()
                    && !self.delta_intersection(&existing.delta, &candidate.delta)))
    }

    fn solve(&self) -> f64 {
        let sink_id = self.dag.node_count() - 1;
        let mut tuples = vec![ResponseTimeTuple {
            vertex: 0,
            delta: vec![0],
            response_time: self.wcet(0) as f64,
        }];

        while !self.cancel.is_cancelled() && tuples.iter().any(|tuple| tuple.vertex != sink_id) {
            let round_len = tuples.len();
            let mut expanded = vec![false; round_len];
            for i in 0..round_len {
                let Some(suc_nodes) = self.dag.get_suc_nodes(NodeIndex::new(tuples[i].vertex))
                else {
                    continue;
                };
                expanded[i] = true;
                for suc_node in suc_nodes {
                    let suc_id = suc_node.index();
                    let parent = &tuples[i];
                    let candidate = ResponseTimeTuple {
                        vertex: suc_id,
                        delta: self.next_delta(&parent.delta, suc_id),
                        response_time: parent.response_time
                            + self.wcet(suc_id) as f64
                            + self.extra_interference(&parent.delta, suc_id),
                    };
                    if !tuples
                        .iter()
                        .any(|existing| self.is_dominated(existing, &candidate))
                    {
                        tuples.push(candidate);
                    }
                }
            }
            let mut index = 0;
            tuples.retain(|_| {
                let keep = index >= round_len || !expanded[index];
                index += 1;
                keep
            });
            debug!("Tuple frontier: {:?}", tuples);
        }

        tuples
            .iter()
            .map(|tuple| tuple.response_time)
            .fold(0.0, f64::max)
    }
}

/// Worst-case finishing time of a task running alone, using only the parallel
/// vertices of the same task as interference.
///
/// `relations` must be indexed by vertex id of `dag`.
pub fn get_intra_task_wcrt(
    dag: &Graph<NodeData, i32>,
    relations: &[VertexRelations],
    resource_model: &ResourceModel,
) -> f64 {
    get_intra_task_wcrt_cancellable(dag, relations, resource_model, &CancellationFlag::default())
}

/// Same as `get_intra_task_wcrt`, but stops expanding tuples once `cancel` is set;
/// the value returned after a cancellation is not a bound.
pub fn get_intra_task_wcrt_cancellable(
    dag: &Graph<NodeData, i32>,
    relations: &[VertexRelations],
    resource_model: &ResourceModel,
    cancel: &CancellationFlag,
) -> f64 {
    assert_eq!(
        dag.node_count(),
        relations.len(),
        "Relation sets do not match the vertices of the DAG."
    );
    if dag.node_count() == 0 {
        return 0.0;
    }
    IntraTaskSolver {
        dag,
        relations,
        resource_model,
        cancel,
    }
    .solve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag_task::DAGTask;
    use crate::path_analysis::{analyze_paths, get_vertex_relations};
    use crate::tests_helper::{
        create_chain_task, create_fork_join_task, create_nested_fork_join_task, create_task,
        create_task_set,
    };

    fn intra_task_wcrt(cores_per_resource_type: Vec<usize>, task: DAGTask) -> (f64, i32) {
        let task_set = create_task_set(cores_per_resource_type, vec![task]);
        let task = &task_set.tasks[0];
        let path_info = analyze_paths(task).unwrap();
        let relations = get_vertex_relations(&task_set, task, &path_info.paths);
        (
            get_intra_task_wcrt(&task.dag, &relations, &task_set.resource_model),
            path_info.critical_path_wcet,
        )
    }

    #[test]
    fn test_get_intra_task_wcrt_chain_is_sum() {
        let (wcrt, _) = intra_task_wcrt(vec![1], create_chain_task(0, 1000, &[4, 7, 55, 36, 54]));
        assert_eq!(wcrt, 156.0);

        let task = create_task(0, 1000, &[(3, 0), (8, 1), (2, 0)], &[(0, 1), (1, 2)]);
        let (wcrt, _) = intra_task_wcrt(vec![1, 1], task);
        assert_eq!(wcrt, 13.0);
    }

    #[test]
    fn test_get_intra_task_wcrt_single_vertex() {
        let (wcrt, _) = intra_task_wcrt(vec![1], create_chain_task(0, 1000, &[42]));
        assert_eq!(wcrt, 42.0);
    }

    #[test]
    fn test_get_intra_task_wcrt_fork_join_on_distinct_types() {
        let (wcrt, critical_path_wcet) = intra_task_wcrt(vec![1, 1], create_fork_join_task(0, 1000));
        assert_eq!(wcrt, 45.0);
        assert_eq!(critical_path_wcet, 45);
    }

    #[test]
    fn test_get_intra_task_wcrt_fork_join_on_shared_type() {
        let same_type = create_task(
            0,
            1000,
            &[(10, 0), (20, 0), (30, 0), (5, 0)],
            &[(0, 1), (0, 2), (1, 3), (2, 3)],
        );
        let (wcrt, _) = intra_task_wcrt(vec![1], same_type.clone());
        assert_eq!(wcrt, 65.0);

        // two cores halve the interference of the sibling branch
        let (wcrt, _) = intra_task_wcrt(vec![2], same_type);
        assert_eq!(wcrt, 55.0);
    }

    #[test]
    fn test_get_intra_task_wcrt_not_below_critical_path() {
        for (cores, task) in [
            (vec![1, 1], create_fork_join_task(0, 1000)),
            (vec![1], create_nested_fork_join_task(0, 1000)),
            (vec![3], create_nested_fork_join_task(0, 1000)),
            (vec![1], create_chain_task(0, 1000, &[1, 2, 3])),
        ] {
            let (wcrt, critical_path_wcet) = intra_task_wcrt(cores, task);
            assert!(wcrt >= critical_path_wcet as f64);
        }
    }

    #[test]
    fn test_get_intra_task_wcrt_monotonic_in_parallel_vertices() {
        let two_branches = create_task(
            0,
            1000,
            &[(10, 0), (20, 0), (30, 0), (5, 0)],
            &[(0, 1), (0, 2), (1, 3), (2, 3)],
        );
        let three_branches = create_task(
            0,
            1000,
            &[(10, 0), (20, 0), (30, 0), (15, 0), (5, 0)],
            &[(0, 1), (0, 2), (0, 3), (1, 4), (2, 4), (3, 4)],
        );
        let (without_extra, _) = intra_task_wcrt(vec![2], two_branches);
        let (with_extra, _) = intra_task_wcrt(vec![2], three_branches);
        assert!(with_extra >= without_extra);
    }

    #[test]
    fn test_get_intra_task_wcrt_cancelled_stops_at_source() {
        let task_set = create_task_set(vec![1], vec![create_chain_task(0, 1000, &[4, 7, 55])]);
        let task = &task_set.tasks[0];
        let path_info = analyze_paths(task).unwrap();
        let relations = get_vertex_relations(&task_set, task, &path_info.paths);
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let wcrt = get_intra_task_wcrt_cancellable(
            &task.dag,
            &relations,
            &task_set.resource_model,
            &cancel,
        );
        assert_eq!(wcrt, 4.0);
    }

    #[test]
    #[should_panic]
    fn test_get_intra_task_wcrt_relation_mismatch() {
        let task = create_chain_task(0, 1000, &[1, 2]);
        let task_set = create_task_set(vec![1], vec![]);
        get_intra_task_wcrt(&task.dag, &[], &task_set.resource_model);
    }
}
