//! Interference blocks obtained by repeatedly stripping maximum-parallelism
//! vertex sets off a decomposition tree.
use log::debug;
use petgraph::graph::{Graph, NodeIndex};
use serde_derive::Serialize;

use crate::decomposition_tree::DecompositionTree;
use crate::graph_extension::NodeData;
use crate::resource_model::ResourceModel;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterferenceBlock {
    pub width: i32,
    pub height: f64,
}

/// Drops the leaves rejected by `keep`, collapsing every internal node left with a
/// single child into that child.
fn prune_tree(
    tree: DecompositionTree,
    keep: &impl Fn(usize) -> bool,
) -> Option<DecompositionTree> {
    match tree {
        DecompositionTree::Leaf(vertex_id) => {
            Some(DecompositionTree::Leaf(vertex_id)).filter(|_| keep(vertex_id))
        }
        DecompositionTree::Series(left, right) => {
            match (prune_tree(*left, keep), prune_tree(*right, keep)) {
                (Some(left), Some(right)) => Some(DecompositionTree::series(left, right)),
                (Some(child), None) | (None, Some(child)) => Some(child),
                (None, None) => None,
            }
        }
        DecompositionTree::Parallel(left, right) => {
            match (prune_tree(*left, keep), prune_tree(*right, keep)) {
                (Some(left), Some(right)) => Some(DecompositionTree::parallel(left, right)),
                (Some(child), None) | (None, Some(child)) => Some(child),
                (None, None) => None,
            }
        }
    }
}

/// Vertex set of maximum summed weight that may run at once, with that weight.
/// Series nodes keep the heavier side (the left one on ties); parallel nodes
/// unite both sides.
fn get_max_parallel_set(
    tree: &DecompositionTree,
    weight: &impl Fn(usize) -> f64,
) -> (Vec<usize>, f64) {
    match tree {
        DecompositionTree::Leaf(vertex_id) => (vec![*vertex_id], weight(*vertex_id)),
        DecompositionTree::Series(left, right) => {
            let left_set = get_max_parallel_set(left, weight);
            let right_set = get_max_parallel_set(right, weight);
            if right_set.1 > left_set.1 {
                right_set
            } else {
                left_set
            }
        }
        DecompositionTree::Parallel(left, right) => {
            let (mut vertices, left_weight) = get_max_parallel_set(left, weight);
            let (right_vertices, right_weight) = get_max_parallel_set(right, weight);
            vertices.extend(right_vertices);
            (vertices, left_weight + right_weight)
        }
    }
}

/// Extracts the ordered interference blocks of a task. Works on its own copy of
/// the tree and of the vertex WCETs; zero-WCET vertices never form a block.
pub fn extract_interference_blocks(
    tree: &DecompositionTree,
    dag: &Graph<NodeData, i32>,
    resource_model: &ResourceModel,
) -> Vec<InterferenceBlock> {
    let mut remaining_wcets = dag
        .node_indices()
        .map(|node_i| dag[node_i].wcet)
        .collect::<Vec<_>>();
    let weight = |vertex_id: usize| {
        resource_model.interference_weight(dag[NodeIndex::new(vertex_id)].resource_type)
    };

    let mut blocks = Vec::new();
    let mut working_tree = prune_tree(tree.clone(), &|vertex_id| remaining_wcets[vertex_id] > 0);
    while let Some(current_tree) = working_tree {
        let (vertices, height) = get_max_parallel_set(&current_tree, &weight);
        let width = vertices
            .iter()
            .map(|&vertex_id| remaining_wcets[vertex_id])
            .min()
            .unwrap_or_else(|| panic!("Empty maximum-parallelism set in {}.", current_tree));
        for &vertex_id in vertices.iter() {
            remaining_wcets[vertex_id] -= width;
        }
        debug!("Interference block {:?} from {:?}", (width, height), vertices);
        blocks.push(InterferenceBlock { width, height });
        working_tree = prune_tree(current_tree, &|vertex_id| remaining_wcets[vertex_id] > 0);
    }
    blocks
}
