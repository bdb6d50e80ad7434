//! Series/parallel decomposition of a Nested-Fork-Join DAG into a binary tree.
use std::fmt;

use log::debug;
use petgraph::algo::dominators::{simple_fast, Dominators};
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::Reversed;
use serde_derive::Serialize;

use crate::error::AnalysisError;
use crate::graph_extension::{GraphExtension, NodeData};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DecompositionTree {
    Leaf(usize),
    Series(Box<DecompositionTree>, Box<DecompositionTree>),
    Parallel(Box<DecompositionTree>, Box<DecompositionTree>),
}

impl DecompositionTree {
    pub fn series(left: DecompositionTree, right: DecompositionTree) -> Self {
        DecompositionTree::Series(Box::new(left), Box::new(right))
    }

    pub fn parallel(left: DecompositionTree, right: DecompositionTree) -> Self {
        DecompositionTree::Parallel(Box::new(left), Box::new(right))
    }

    /// Vertex ids of all leaves, left to right.
    pub fn vertices(&self) -> Vec<usize> {
        match self {
            DecompositionTree::Leaf(vertex_id) => vec![*vertex_id],
            DecompositionTree::Series(left, right) | DecompositionTree::Parallel(left, right) => {
                let mut vertices = left.vertices();
                vertices.extend(right.vertices());
                vertices
            }
        }
    }
}

impl fmt::Display for DecompositionTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecompositionTree::Leaf(vertex_id) => write!(f, "J{}", vertex_id),
            DecompositionTree::Series(left, right) => write!(f, "SE({},{})", left, right),
            DecompositionTree::Parallel(left, right) => write!(f, "PA({},{})", left, right),
        }
    }
}

/// Shape of the successors of one vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessorStructure {
    Sink,
    Chain,
    /// Every branch is a single vertex leading straight to a shared join.
    PlainJoin,
    /// Branches contain further forks, have different lengths or merge early.
    NestedJoin,
}

pub fn classify_successors(dag: &Graph<NodeData, i32>, vertex_id: usize) -> SuccessorStructure {
    let suc_nodes = dag
        .get_suc_nodes(NodeIndex::new(vertex_id))
        .unwrap_or_default();
    match suc_nodes.len() {
        0 => SuccessorStructure::Sink,
        1 => SuccessorStructure::Chain,
        _ => {
            let branch_ends = suc_nodes
                .iter()
                .map(|&suc_node| dag.get_suc_nodes(suc_node).unwrap_or_default())
                .collect::<Vec<_>>();
            if branch_ends.iter().all(|ends| ends.len() == 1)
                && branch_ends.windows(2).all(|pair| pair[0] == pair[1])
            {
                SuccessorStructure::PlainJoin
            } else {
                SuccessorStructure::NestedJoin
            }
        }
    }
}

fn shares_vertex(a: &[bool], b: &[bool]) -> bool {
    a.iter().zip(b).any(|(&x, &y)| x && y)
}

fn parallel_of(branches: Vec<DecompositionTree>) -> Option<DecompositionTree> {
    branches
        .into_iter()
        .rev()
        .reduce(|rest, branch| DecompositionTree::parallel(branch, rest))
}

struct TreeBuilder<'a> {
    task_id: usize,
    dag: &'a Graph<NodeData, i32>,
    post_dominators: Dominators<NodeIndex>,
    placed: Vec<bool>,
}

impl<'a> TreeBuilder<'a> {
    fn not_series_parallel(&self, vertex_id: usize) -> AnalysisError {
        AnalysisError::NotSeriesParallel {
            task_id: self.task_id,
            vertex_id,
        }
    }

    fn suc_ids(&self, vertex_id: usize) -> Vec<usize> {
        self.dag
            .get_suc_nodes(NodeIndex::new(vertex_id))
            .unwrap_or_default()
            .iter()
            .map(|node| node.index())
            .collect()
    }

    fn place(&mut self, vertex_id: usize) -> Result<(), AnalysisError> {
        if self.placed[vertex_id] {
            return Err(self.not_series_parallel(vertex_id));
        }
        self.placed[vertex_id] = true;
        Ok(())
    }

    /// Post-dominators of `vertex_id`, nearest first, starting with the vertex itself.
    fn post_dominator_chain(&self, vertex_id: usize) -> Vec<usize> {
        self.post_dominators
            .dominators(NodeIndex::new(vertex_id))
            .map(|dominators| dominators.map(|node| node.index()).collect())
            .unwrap_or_default()
    }

    /// Vertices reachable from `entry` without passing through `stop`.
    fn reach_before(&self, entry: usize, stop: usize) -> Vec<bool> {
        let mut reached = vec![false; self.dag.node_count()];
        let mut stack = vec![entry];
        while let Some(vertex_id) = stack.pop() {
            if vertex_id == stop || reached[vertex_id] {
                continue;
            }
            reached[vertex_id] = true;
            stack.extend(self.suc_ids(vertex_id));
        }
        reached
    }

    /// Builds the subtree covering `start` and everything after it up to, but
    /// excluding, `stop`.
    fn build_segment(
        &mut self,
        start: usize,
        stop: Option<usize>,
    ) -> Result<DecompositionTree, AnalysisError> {
        self.place(start)?;
        let suc_ids = self.suc_ids(start);
        let structure = classify_successors(self.dag, start);
        match structure {
            SuccessorStructure::Sink => match stop {
                // a branch ended without reaching its join
                Some(_) => Err(self.not_series_parallel(start)),
                None => Ok(DecompositionTree::Leaf(start)),
            },
            SuccessorStructure::Chain => {
                if Some(suc_ids[0]) == stop {
                    Ok(DecompositionTree::Leaf(start))
                } else {
                    Ok(DecompositionTree::series(
                        DecompositionTree::Leaf(start),
                        self.build_segment(suc_ids[0], stop)?,
                    ))
                }
            }
            SuccessorStructure::PlainJoin | SuccessorStructure::NestedJoin => {
                let join_id = self
                    .post_dominators
                    .immediate_dominator(NodeIndex::new(start))
                    .ok_or_else(|| self.not_series_parallel(start))?
                    .index();
                if let Some(stop_id) = stop {
                    if join_id > stop_id {
                        return Err(self.not_series_parallel(join_id));
                    }
                }
                debug!(
                    "Vertex {} forks as {:?} and joins at {}",
                    start, structure, join_id
                );

                let entries = suc_ids
                    .into_iter()
                    .filter(|&suc_id| suc_id != join_id)
                    .collect::<Vec<_>>();
                let parallel = if structure == SuccessorStructure::PlainJoin {
                    let mut branches = Vec::new();
                    for entry in entries {
                        self.place(entry)?;
                        branches.push(DecompositionTree::Leaf(entry));
                    }
                    parallel_of(branches).ok_or_else(|| self.not_series_parallel(start))?
                } else {
                    self.build_parallel_region(&entries, join_id)?
                };

                if Some(join_id) == stop {
                    Ok(DecompositionTree::series(
                        DecompositionTree::Leaf(start),
                        parallel,
                    ))
                } else {
                    Ok(DecompositionTree::series(
                        DecompositionTree::Leaf(start),
                        DecompositionTree::series(parallel, self.build_segment(join_id, stop)?),
                    ))
                }
            }
        }
    }

    /// Builds the parallel composition of the branches starting at `entries`, all
    /// of which end at `stop`. Branches that meet before `stop` are grouped and
    /// resolved up to the vertex where they meet, then continued from there.
    fn build_parallel_region(
        &mut self,
        entries: &[usize],
        stop: usize,
    ) -> Result<DecompositionTree, AnalysisError> {
        let reaches = entries
            .iter()
            .map(|&entry| self.reach_before(entry, stop))
            .collect::<Vec<_>>();

        // groups of entry positions whose branches share a vertex before `stop`
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (position, reached) in reaches.iter().enumerate() {
            let (touching, mut remaining): (Vec<_>, Vec<_>) =
                groups.into_iter().partition(|group| {
                    group
                        .iter()
                        .any(|&member| shares_vertex(reached, &reaches[member]))
                });
            let mut group = touching.concat();
            group.push(position);
            group.sort_unstable();
            remaining.push(group);
            groups = remaining;
        }
        let mut groups = groups
            .into_iter()
            .map(|group| group.into_iter().map(|position| entries[position]).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        groups.sort_by_key(|group| group[0]);

        let mut branches = Vec::new();
        for group in groups {
            if let [entry] = group.as_slice() {
                branches.push(self.build_segment(*entry, Some(stop))?);
                continue;
            }
            let other_chains = group[1..]
                .iter()
                .map(|&member| self.post_dominator_chain(member))
                .collect::<Vec<_>>();
            let meet_id = self
                .post_dominator_chain(group[0])
                .into_iter()
                .find(|candidate| other_chains.iter().all(|chain| chain.contains(candidate)))
                .ok_or_else(|| self.not_series_parallel(group[0]))?;
            if meet_id == stop || group.contains(&meet_id) {
                return Err(self.not_series_parallel(meet_id));
            }
            debug!("Branches {:?} meet at {} before {}", group, meet_id, stop);
            let merged = self.build_parallel_region(&group, meet_id)?;
            branches.push(DecompositionTree::series(
                merged,
                self.build_segment(meet_id, Some(stop))?,
            ));
        }
        parallel_of(branches).ok_or_else(|| self.not_series_parallel(stop))
    }
}

fn is_chain(dag: &Graph<NodeData, i32>) -> bool {
    dag.edge_count() + 1 == dag.node_count()
        && (1..dag.node_count()).all(|id| {
            dag.find_edge(NodeIndex::new(id - 1), NodeIndex::new(id))
                .is_some()
        })
}

/// Decomposes a normalized DAG whose vertex 0 is the source and whose highest id
/// is the sink. Fails with `NotSeriesParallel` when some vertex cannot be placed
/// exactly once.
pub fn build_decomposition_tree(
    task_id: usize,
    dag: &Graph<NodeData, i32>,
) -> Result<DecompositionTree, AnalysisError> {
    let node_count = dag.node_count();
    if node_count == 0 {
        return Err(AnalysisError::invalid(task_id, "Task has no vertices."));
    }

    let tree = match node_count {
        1 => DecompositionTree::Leaf(0),
        2 if is_chain(dag) => {
            DecompositionTree::series(DecompositionTree::Leaf(0), DecompositionTree::Leaf(1))
        }
        3 if is_chain(dag) => DecompositionTree::series(
            DecompositionTree::Leaf(0),
            DecompositionTree::series(DecompositionTree::Leaf(1), DecompositionTree::Leaf(2)),
        ),
        _ => {
            let sink = NodeIndex::new(node_count - 1);
            let mut builder = TreeBuilder {
                task_id,
                dag,
                post_dominators: simple_fast(Reversed(dag), sink),
                placed: vec![false; node_count],
            };
            let tree = builder.build_segment(0, None)?;
            if let Some(unplaced) = builder.placed.iter().position(|placed| !placed) {
                return Err(builder.not_series_parallel(unplaced));
            }
            tree
        }
    };
    debug!("Decomposition tree of task {}: {}", task_id, tree);
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfj_dag::{normalize_to_nfj, NfjMode};
    use crate::tests_helper::{
        create_chain_task, create_crossing_task, create_fork_join_task,
        create_nested_fork_join_task, create_partial_join_task, create_task,
    };

    #[test]
    fn test_build_decomposition_tree_templates() {
        let tree = build_decomposition_tree(0, &create_chain_task(0, 100, &[1]).dag).unwrap();
        assert_eq!(tree, DecompositionTree::Leaf(0));

        let tree = build_decomposition_tree(0, &create_chain_task(0, 100, &[1, 2]).dag).unwrap();
        assert_eq!(tree.to_string(), "SE(J0,J1)");

        let tree = build_decomposition_tree(0, &create_chain_task(0, 100, &[1, 2, 3]).dag).unwrap();
        assert_eq!(tree.to_string(), "SE(J0,SE(J1,J2))");
    }

    #[test]
    fn test_build_decomposition_tree_long_chain() {
        let task = create_chain_task(0, 100, &[1, 2, 3, 4]);
        let tree = build_decomposition_tree(0, &task.dag).unwrap();
        assert_eq!(tree.to_string(), "SE(J0,SE(J1,SE(J2,J3)))");
    }

    #[test]
    fn test_build_decomposition_tree_fork_join() {
        let task = create_fork_join_task(0, 100);
        let tree = build_decomposition_tree(0, &task.dag).unwrap();
        assert_eq!(tree.to_string(), "SE(J0,SE(PA(J1,J2),J3))");
        assert_eq!(tree.vertices(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_build_decomposition_tree_nested_fork_join() {
        let task = create_nested_fork_join_task(0, 100);
        let tree = build_decomposition_tree(0, &task.dag).unwrap();
        assert_eq!(tree.to_string(), "SE(J0,SE(PA(J1,PA(SE(J2,J3),J4)),J5))");
    }

    #[test]
    fn test_build_decomposition_tree_inner_join_before_outer_join() {
        let task = create_task(
            0,
            100,
            &[(1, 0), (1, 0), (1, 0), (1, 0), (1, 0), (1, 0), (1, 0)],
            &[(0, 1), (0, 2), (1, 3), (1, 4), (3, 5), (4, 5), (5, 6), (2, 6)],
        );
        let tree = build_decomposition_tree(0, &task.dag).unwrap();
        assert_eq!(
            tree.to_string(),
            "SE(J0,SE(PA(SE(J1,SE(PA(J3,J4),J5)),J2),J6))"
        );
    }

    #[test]
    fn test_build_decomposition_tree_partial_join() {
        // 1 and 2 join at 4 while their sibling 3 runs on to 5
        let task = create_partial_join_task(0, 100);
        let tree = build_decomposition_tree(0, &task.dag).unwrap();
        assert_eq!(tree.to_string(), "SE(J0,SE(PA(SE(PA(J1,J2),J4),J3),J5))");
        assert_eq!(tree.vertices(), vec![0, 1, 2, 4, 3, 5]);
    }

    #[test]
    fn test_build_decomposition_tree_partial_join_then_chain() {
        let task = create_task(
            0,
            100,
            &[(1, 0), (1, 0), (1, 0), (1, 0), (1, 0), (1, 0), (1, 0)],
            &[(0, 1), (0, 2), (0, 3), (1, 4), (2, 4), (3, 5), (4, 5), (5, 6)],
        );
        let tree = build_decomposition_tree(0, &task.dag).unwrap();
        assert_eq!(
            tree.to_string(),
            "SE(J0,SE(PA(SE(PA(J1,J2),J4),J3),SE(J5,J6)))"
        );
    }

    #[test]
    fn test_build_decomposition_tree_nested_partial_joins() {
        // 1 and 2 meet at 5, which meets 3 at 6, which meets 4 at the sink
        let task = create_task(
            0,
            100,
            &[(1, 0), (1, 0), (1, 0), (1, 0), (1, 0), (1, 0), (1, 0), (1, 0)],
            &[
                (0, 1),
                (0, 2),
                (0, 3),
                (0, 4),
                (1, 5),
                (2, 5),
                (5, 6),
                (3, 6),
                (6, 7),
                (4, 7),
            ],
        );
        let tree = build_decomposition_tree(0, &task.dag).unwrap();
        assert_eq!(
            tree.to_string(),
            "SE(J0,SE(PA(SE(PA(SE(PA(J1,J2),J5),J3),J6),J4),J7))"
        );
    }

    #[test]
    fn test_build_decomposition_tree_partial_joins_after_normalization() {
        let task = create_task(
            0,
            100,
            &[(1, 0), (1, 0), (1, 0), (1, 0), (1, 0), (1, 0), (1, 0), (1, 0), (1, 0)],
            &[
                (0, 1),
                (0, 2),
                (0, 3),
                (2, 3),
                (1, 4),
                (0, 5),
                (2, 6),
                (5, 6),
                (1, 7),
                (3, 7),
                (4, 8),
                (6, 8),
                (7, 8),
            ],
        );
        let nfj_dag = normalize_to_nfj(&task.dag, NfjMode::Unconditional);
        let tree = build_decomposition_tree(0, &nfj_dag.dag).unwrap();
        assert_eq!(
            tree.to_string(),
            "SE(J0,SE(PA(SE(J1,J4),PA(SE(PA(J2,J5),J6),SE(J3,J7))),J8))"
        );
        assert_eq!(tree.vertices().len(), 9);
    }

    #[test]
    fn test_build_decomposition_tree_after_normalization() {
        let task = create_crossing_task(0, 100);
        let nfj_dag = normalize_to_nfj(&task.dag, NfjMode::Unconditional);
        let tree = build_decomposition_tree(0, &nfj_dag.dag).unwrap();
        assert_eq!(tree.to_string(), "SE(J0,SE(PA(J1,SE(J2,J3)),J4))");
    }

    #[test]
    fn test_build_decomposition_tree_not_series_parallel() {
        let task = create_task(
            7,
            100,
            &[(1, 0), (9, 0), (2, 0), (3, 0), (4, 0), (5, 0)],
            &[(0, 1), (0, 2), (1, 3), (1, 4), (2, 4), (3, 5), (4, 5)],
        );
        let reserved = normalize_to_nfj(&task.dag, NfjMode::Reserved);
        assert!(matches!(
            build_decomposition_tree(7, &reserved.dag),
            Err(AnalysisError::NotSeriesParallel {
                task_id: 7,
                vertex_id: 5
            })
        ));
    }

    #[test]
    fn test_classify_successors_normal() {
        let task = create_nested_fork_join_task(0, 100);
        assert_eq!(classify_successors(&task.dag, 0), SuccessorStructure::NestedJoin);
        assert_eq!(classify_successors(&task.dag, 2), SuccessorStructure::Chain);
        assert_eq!(classify_successors(&task.dag, 5), SuccessorStructure::Sink);

        let task = create_fork_join_task(0, 100);
        assert_eq!(classify_successors(&task.dag, 0), SuccessorStructure::PlainJoin);

        let task = create_partial_join_task(0, 100);
        assert_eq!(classify_successors(&task.dag, 0), SuccessorStructure::NestedJoin);
        assert_eq!(classify_successors(&task.dag, 4), SuccessorStructure::Chain);
    }
}
