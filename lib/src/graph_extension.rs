use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction::{Incoming, Outgoing};
use std::collections::VecDeque;

/// custom node data structure for dag vertices (petgraph)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeData {
    pub id: usize,
    pub task_id: usize,
    pub r_min: i32,
    pub r_max: i32,
    pub bcet: i32,
    pub wcet: i32,
    pub resource_type: usize,
}

impl NodeData {
    pub fn new(id: usize, task_id: usize, wcet: i32, resource_type: usize) -> NodeData {
        NodeData {
            id,
            task_id,
            r_min: 0,
            r_max: 0,
            bcet: wcet,
            wcet,
            resource_type,
        }
    }
}

pub trait GraphExtension {
    fn add_node_with_id_consistency(&mut self, node: NodeData) -> NodeIndex;
    fn get_source_nodes(&self) -> Vec<NodeIndex>;
    fn get_sink_nodes(&self) -> Vec<NodeIndex>;
    fn get_volume(&self) -> i32;
    fn get_volume_of_resource_type(&self, resource_type: usize) -> i32;
    fn get_pre_nodes(&self, node_i: NodeIndex) -> Option<Vec<NodeIndex>>;
    fn get_suc_nodes(&self, node_i: NodeIndex) -> Option<Vec<NodeIndex>>;
    fn get_anc_nodes(&self, node_i: NodeIndex) -> Option<Vec<NodeIndex>>;
    fn get_des_nodes(&self, node_i: NodeIndex) -> Option<Vec<NodeIndex>>;
    fn remove_edge_between(&mut self, source: NodeIndex, target: NodeIndex) -> bool;
}

impl GraphExtension for Graph<NodeData, i32> {
    fn add_node_with_id_consistency(&mut self, node: NodeData) -> NodeIndex {
        let node_index = self.add_node(node);

        assert_eq!(
            node_index.index(),
            self[node_index].id,
            "The add node id is different from NodeIndex."
        );

        node_index
    }

    fn get_source_nodes(&self) -> Vec<NodeIndex> {
        self.node_indices()
            .filter(|&i| self.edges_directed(i, Incoming).next().is_none())
            .collect::<Vec<_>>()
    }

    fn get_sink_nodes(&self) -> Vec<NodeIndex> {
        self.node_indices()
            .filter(|&i| self.edges_directed(i, Outgoing).next().is_none())
            .collect::<Vec<_>>()
    }

    fn get_volume(&self) -> i32 {
        self.node_indices().map(|node| self[node].wcet).sum()
    }

    fn get_volume_of_resource_type(&self, resource_type: usize) -> i32 {
        self.node_indices()
            .filter(|&node| self[node].resource_type == resource_type)
            .map(|node| self[node].wcet)
            .sum()
    }

    fn get_pre_nodes(&self, node_i: NodeIndex) -> Option<Vec<NodeIndex>> {
        //Since node indices are sequentially numbered, this is used to determine whether a node exists or not.
        if node_i.index() < self.node_count() {
            let mut pre_nodes = self
                .edges_directed(node_i, Incoming)
                .map(|edge| edge.source())
                .collect::<Vec<_>>();
            pre_nodes.sort();
            pre_nodes.dedup();

            if pre_nodes.is_empty() {
                None
            } else {
                Some(pre_nodes)
            }
        } else {
            panic!("Node {:?} does not exist!", node_i);
        }
    }

    fn get_suc_nodes(&self, node_i: NodeIndex) -> Option<Vec<NodeIndex>> {
        //Since node indices are sequentially numbered, this is used to determine whether a node exists or not.
        if node_i.index() < self.node_count() {
            let mut suc_nodes = self
                .edges_directed(node_i, Outgoing)
                .map(|edge| edge.target())
                .collect::<Vec<_>>();
            suc_nodes.sort();
            suc_nodes.dedup();

            if suc_nodes.is_empty() {
                None
            } else {
                Some(suc_nodes)
            }
        } else {
            panic!("Node {:?} does not exist!", node_i);
        }
    }

    fn get_anc_nodes(&self, node_i: NodeIndex) -> Option<Vec<NodeIndex>> {
        let mut anc_nodes = Vec::new();
        let mut search_queue = VecDeque::new();
        search_queue.push_back(node_i);

        while let Some(node) = search_queue.pop_front() {
            //If the target node does not exist, get_pre_node causes panic!
            for pre_node in self.get_pre_nodes(node).unwrap_or_default() {
                if !anc_nodes.contains(&pre_node) {
                    anc_nodes.push(pre_node);
                    search_queue.push_back(pre_node);
                }
            }
        }
        anc_nodes.sort();
        Some(anc_nodes).filter(|anc| !anc.is_empty())
    }

    fn get_des_nodes(&self, node_i: NodeIndex) -> Option<Vec<NodeIndex>> {
        let mut des_nodes = Vec::new();
        let mut search_queue = VecDeque::new();
        search_queue.push_back(node_i);

        while let Some(node) = search_queue.pop_front() {
            //If the target node does not exist, get_suc_node causes panic!
            for suc_node in self.get_suc_nodes(node).unwrap_or_default() {
                if !des_nodes.contains(&suc_node) {
                    des_nodes.push(suc_node);
                    search_queue.push_back(suc_node);
                }
            }
        }
        des_nodes.sort();
        Some(des_nodes).filter(|des| !des.is_empty())
    }

    fn remove_edge_between(&mut self, source: NodeIndex, target: NodeIndex) -> bool {
        let mut removed = false;
        while let Some(edge_i) = self.find_edge(source, target) {
            self.remove_edge(edge_i);
            removed = true;
        }
        removed
    }
}
