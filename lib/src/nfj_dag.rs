//! Normalization of a DAG into Nested-Fork-Join form by removing predecessor edges.
use log::debug;
use petgraph::graph::{Graph, NodeIndex};

use crate::cancellation::CancellationFlag;
use crate::graph_extension::{GraphExtension, NodeData};
use crate::path_analysis::{get_all_paths_cancellable, get_ancestors, get_critical_paths};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NfjMode {
    /// Every conflicting edge is removed.
    #[default]
    Unconditional,
    /// Conflicting edges lying on a critical path are kept.
    Reserved,
}

#[derive(Debug, Clone)]
pub struct NfjDag {
    pub dag: Graph<NodeData, i32>,
    pub removed_edges: Vec<(usize, usize)>,
}

/// Working copy of the graph together with the path data its rules depend on.
struct NfjNormalizer {
    dag: Graph<NodeData, i32>,
    mode: NfjMode,
    cancel: CancellationFlag,
    paths: Vec<Vec<usize>>,
    critical_paths: Vec<Vec<usize>>,
    removed_edges: Vec<(usize, usize)>,
}

impl NfjNormalizer {
    fn new(dag: &Graph<NodeData, i32>, mode: NfjMode, cancel: &CancellationFlag) -> Self {
        let mut normalizer = Self {
            dag: dag.clone(),
            mode,
            cancel: cancel.clone(),
            paths: Vec::new(),
            critical_paths: Vec::new(),
            removed_edges: Vec::new(),
        };
        normalizer.update_paths();
        normalizer
    }

    fn update_paths(&mut self) {
        self.paths = get_all_paths_cancellable(&self.dag, &self.cancel);
        self.critical_paths = get_critical_paths(&self.dag, &self.paths).0;
    }

    fn pre_ids(&self, vertex_id: usize) -> Vec<usize> {
        self.dag
            .get_pre_nodes(NodeIndex::new(vertex_id))
            .unwrap_or_default()
            .iter()
            .map(|node| node.index())
            .collect()
    }

    fn suc_ids(&self, vertex_id: usize) -> Vec<usize> {
        self.dag
            .get_suc_nodes(NodeIndex::new(vertex_id))
            .unwrap_or_default()
            .iter()
            .map(|node| node.index())
            .collect()
    }

    fn is_on_critical_path(&self, pre_id: usize, vertex_id: usize) -> bool {
        self.critical_paths.iter().any(|path| {
            path.windows(2)
                .any(|edge| edge[0] == pre_id && edge[1] == vertex_id)
        })
    }

    fn remove_edge(&mut self, pre_id: usize, vertex_id: usize, rule: &str) {
        if self
            .dag
            .remove_edge_between(NodeIndex::new(pre_id), NodeIndex::new(vertex_id))
        {
            debug!("Removed {} edge {} -> {}", rule, pre_id, vertex_id);
            self.removed_edges.push((pre_id, vertex_id));
            self.update_paths();
        }
    }

    fn has_edge(&self, pre_id: usize, vertex_id: usize) -> bool {
        self.dag
            .find_edge(NodeIndex::new(pre_id), NodeIndex::new(vertex_id))
            .is_some()
    }

    /// Applies the removal rules to the incoming edges of one join vertex.
    /// Returns whether any edge was removed.
    fn normalize_join(&mut self, vertex_id: usize) -> bool {
        let removed_before = self.removed_edges.len();
        let pre_ids = self.pre_ids(vertex_id);

        for &pre_id in pre_ids.iter().rev() {
            if self.pre_ids(vertex_id).len() <= 1 {
                break;
            }
            // earlier removals may already have dropped this predecessor
            if !self.has_edge(pre_id, vertex_id) {
                continue;
            }
            let ancestors = get_ancestors(&self.paths, vertex_id);
            let is_conflicting = self
                .suc_ids(pre_id)
                .iter()
                .any(|suc_id| *suc_id != vertex_id && !ancestors.contains(suc_id));
            if is_conflicting {
                if self.mode == NfjMode::Unconditional
                    || !self.is_on_critical_path(pre_id, vertex_id)
                {
                    self.remove_edge(pre_id, vertex_id, "conflicting");
                }
            } else {
                let grand_pre_ids = self.pre_ids(pre_id);
                for transitive_id in self.pre_ids(vertex_id) {
                    if grand_pre_ids.contains(&transitive_id) {
                        self.remove_edge(transitive_id, vertex_id, "transitive");
                    }
                }
            }
        }

        // a predecessor that is an ancestor of another predecessor is implied
        loop {
            let pre_ids = self.pre_ids(vertex_id);
            let implied = pre_ids.iter().copied().find(|&earlier_id| {
                pre_ids.iter().any(|&later_id| {
                    later_id != earlier_id
                        && get_ancestors(&self.paths, later_id).contains(&earlier_id)
                })
            });
            match implied {
                Some(earlier_id) => self.remove_edge(earlier_id, vertex_id, "implied"),
                None => break,
            }
        }

        self.removed_edges.len() > removed_before
    }
}

/// Returns a normalized copy of `dag`; the input graph is left untouched.
pub fn normalize_to_nfj(dag: &Graph<NodeData, i32>, mode: NfjMode) -> NfjDag {
    normalize_to_nfj_cancellable(dag, mode, &CancellationFlag::default())
}

/// Same as `normalize_to_nfj`, but gives up once `cancel` is set. The graph
/// returned after a cancellation is not normalized.
pub fn normalize_to_nfj_cancellable(
    dag: &Graph<NodeData, i32>,
    mode: NfjMode,
    cancel: &CancellationFlag,
) -> NfjDag {
    let mut normalizer = NfjNormalizer::new(dag, mode, cancel);
    while !cancel.is_cancelled() {
        let mut changed = false;
        for vertex_id in 0..normalizer.dag.node_count() {
            if normalizer.pre_ids(vertex_id).len() > 1 {
                changed |= normalizer.normalize_join(vertex_id);
            }
        }
        if !changed {
            break;
        }
    }
    NfjDag {
        dag: normalizer.dag,
        removed_edges: normalizer.removed_edges,
    }
}
