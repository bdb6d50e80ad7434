//! Task-Set Model: DAG tasks, their vertices and the shared resource model.
use std::collections::BTreeSet;

use log::warn;
use petgraph::algo::toposort;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::error::AnalysisError;
use crate::graph_extension::{GraphExtension, NodeData};
use crate::resource_model::ResourceModel;

/// One periodic DAG task. Vertex ids equal their `NodeIndex`.
#[derive(Debug, Clone)]
pub struct DAGTask {
    pub id: usize,
    pub period: i32,
    pub deadline: i32,
    pub priority: i32,
    pub dag: Graph<NodeData, i32>,
}

impl DAGTask {
    pub fn new(id: usize, period: i32, deadline: i32, priority: i32) -> Self {
        Self {
            id,
            period,
            deadline,
            priority,
            dag: Graph::<NodeData, i32>::new(),
        }
    }

    pub fn add_vertex(&mut self, node: NodeData) -> NodeIndex {
        self.dag.add_node_with_id_consistency(node)
    }

    pub fn add_precedence(&mut self, pre_id: usize, suc_id: usize) -> Result<(), AnalysisError> {
        for vertex_id in [pre_id, suc_id] {
            if vertex_id >= self.dag.node_count() {
                return Err(AnalysisError::invalid(
                    self.id,
                    format!("Vertex {} does not exist.", vertex_id),
                ));
            }
        }
        if self
            .dag
            .find_edge(NodeIndex::new(pre_id), NodeIndex::new(suc_id))
            .is_none()
        {
            self.dag
                .add_edge(NodeIndex::new(pre_id), NodeIndex::new(suc_id), 0);
        }
        Ok(())
    }

    pub fn vertex_count(&self) -> usize {
        self.dag.node_count()
    }

    pub fn vertex(&self, vertex_id: usize) -> &NodeData {
        &self.dag[NodeIndex::new(vertex_id)]
    }

    pub fn source_id(&self) -> usize {
        0
    }

    pub fn sink_id(&self) -> usize {
        self.dag.node_count() - 1
    }

    pub fn get_volume(&self) -> i32 {
        self.dag.get_volume()
    }

    pub fn get_utilization(&self) -> f32 {
        self.get_volume() as f32 / self.period as f32
    }

    /// Checks every structural invariant the analysis relies on.
    pub fn validate(&self, resource_model: &ResourceModel) -> Result<(), AnalysisError> {
        if self.dag.node_count() == 0 {
            return Err(AnalysisError::invalid(self.id, "Task has no vertices."));
        }
        if self.period <= 0 || self.deadline <= 0 {
            return Err(AnalysisError::invalid(
                self.id,
                "Period and deadline must be positive.",
            ));
        }
        if self.deadline > self.period {
            warn!(
                "Task {} has a deadline beyond its period; the analysis assumes constrained deadlines.",
                self.id
            );
        }

        for node_i in self.dag.node_indices() {
            let node = &self.dag[node_i];
            if node.task_id != self.id {
                return Err(AnalysisError::invalid(
                    self.id,
                    format!("Vertex {} belongs to task {}.", node.id, node.task_id),
                ));
            }
            if node.r_min < 0 || node.r_min > node.r_max {
                return Err(AnalysisError::invalid(
                    self.id,
                    format!("Vertex {} violates 0 <= r_min <= r_max.", node.id),
                ));
            }
            if node.bcet < 0 || node.bcet > node.wcet {
                return Err(AnalysisError::invalid(
                    self.id,
                    format!("Vertex {} violates 0 <= BCET <= WCET.", node.id),
                ));
            }
            if !resource_model.contains(node.resource_type) {
                return Err(AnalysisError::invalid(
                    self.id,
                    format!(
                        "Vertex {} uses unknown resource type {}.",
                        node.id,
                        node.resource_type + 1
                    ),
                ));
            }
        }

        if toposort(&self.dag, None).is_err() {
            return Err(AnalysisError::CyclicGraph { task_id: self.id });
        }
        if let Some(edge) = self
            .dag
            .edge_references()
            .find(|edge| edge.source().index() >= edge.target().index())
        {
            return Err(AnalysisError::invalid(
                self.id,
                format!(
                    "Predecessor {} of vertex {} does not have a smaller id.",
                    edge.source().index(),
                    edge.target().index()
                ),
            ));
        }

        let source_nodes = self.dag.get_source_nodes();
        if source_nodes != [NodeIndex::new(self.source_id())] {
            return Err(AnalysisError::invalid(
                self.id,
                format!("Vertex 0 must be the unique source, found {:?}.", source_nodes),
            ));
        }
        let sink_nodes = self.dag.get_sink_nodes();
        if sink_nodes != [NodeIndex::new(self.sink_id())] {
            return Err(AnalysisError::invalid(
                self.id,
                format!(
                    "Vertex {} must be the unique sink, found {:?}.",
                    self.sink_id(),
                    sink_nodes
                ),
            ));
        }
        Ok(())
    }
}

/// All tasks of one analysis instance together with the platform they share.
#[derive(Debug, Clone)]
pub struct TaskSet {
    pub resource_model: ResourceModel,
    pub tasks: Vec<DAGTask>,
}

impl TaskSet {
    pub fn new(resource_model: ResourceModel, tasks: Vec<DAGTask>) -> Self {
        Self {
            resource_model,
            tasks,
        }
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.tasks.is_empty() {
            return Err(AnalysisError::malformed(0, "Task set has no tasks."));
        }
        let mut task_ids = BTreeSet::new();
        for task in self.tasks.iter() {
            if !task_ids.insert(task.id) {
                return Err(AnalysisError::invalid(task.id, "Duplicate task id."));
            }
            task.validate(&self.resource_model)?;
        }
        Ok(())
    }

    /// Highest priority (smallest value) first; ties are broken by task id.
    pub fn tasks_by_priority(&self) -> Vec<&DAGTask> {
        let mut tasks: Vec<&DAGTask> = self.tasks.iter().collect();
        tasks.sort_by_key(|task| (task.priority, task.id));
        tasks
    }

    pub fn get_total_utilization(&self) -> f32 {
        self.tasks.iter().map(|task| task.get_utilization()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_helper::{create_chain_task, create_fork_join_task, create_node};

    fn resource_model() -> ResourceModel {
        ResourceModel::new(vec![1, 1]).unwrap()
    }

    #[test]
    fn test_validate_normal() {
        let task = create_fork_join_task(0, 100);
        assert!(task.validate(&resource_model()).is_ok());
        assert_eq!(task.source_id(), 0);
        assert_eq!(task.sink_id(), 3);
        assert_eq!(task.get_volume(), 65);
    }

    #[test]
    fn test_validate_bcet_greater_than_wcet() {
        let mut task = DAGTask::new(0, 100, 100, 0);
        let mut node = create_node(0, 0, 10, 0);
        node.bcet = 11;
        task.add_vertex(node);
        assert!(matches!(
            task.validate(&resource_model()),
            Err(AnalysisError::InvalidTaskSet { task_id: 0, .. })
        ));
    }

    #[test]
    fn test_validate_release_jitter_inverted() {
        let mut task = DAGTask::new(0, 100, 100, 0);
        let mut node = create_node(0, 0, 10, 0);
        node.r_min = 5;
        node.r_max = 4;
        task.add_vertex(node);
        assert!(task.validate(&resource_model()).is_err());
    }

    #[test]
    fn test_validate_unknown_resource_type() {
        let mut task = DAGTask::new(0, 100, 100, 0);
        task.add_vertex(create_node(0, 0, 10, 2));
        assert!(task.validate(&resource_model()).is_err());
    }

    #[test]
    fn test_validate_cycle() {
        let mut task = create_chain_task(0, 100, &[10, 10, 10]);
        task.add_precedence(2, 1).unwrap();
        assert!(matches!(
            task.validate(&resource_model()),
            Err(AnalysisError::CyclicGraph { task_id: 0 })
        ));
    }

    #[test]
    fn test_validate_backward_edge_without_cycle() {
        let mut task = DAGTask::new(0, 100, 100, 0);
        for id in 0..3 {
            task.add_vertex(create_node(id, 0, 10, 0));
        }
        task.add_precedence(0, 2).unwrap();
        task.add_precedence(2, 1).unwrap();
        assert!(task.validate(&resource_model()).is_err());
    }

    #[test]
    fn test_validate_multiple_sinks() {
        let mut task = DAGTask::new(0, 100, 100, 0);
        for id in 0..3 {
            task.add_vertex(create_node(id, 0, 10, 0));
        }
        task.add_precedence(0, 1).unwrap();
        task.add_precedence(0, 2).unwrap();
        task.add_vertex(create_node(3, 0, 10, 0));
        task.add_precedence(1, 3).unwrap();
        assert!(task.validate(&resource_model()).is_err());
    }

    #[test]
    fn test_add_precedence_no_exist_vertex() {
        let mut task = create_chain_task(0, 100, &[10]);
        assert!(task.add_precedence(0, 1).is_err());
    }

    #[test]
    fn test_task_set_duplicate_ids() {
        let task_set = TaskSet::new(
            resource_model(),
            vec![
                create_chain_task(0, 100, &[10]),
                create_chain_task(0, 200, &[10]),
            ],
        );
        assert!(task_set.validate().is_err());
    }

    #[test]
    fn test_tasks_by_priority_normal() {
        let mut high = create_chain_task(1, 100, &[10]);
        high.priority = 0;
        let mut low = create_chain_task(0, 200, &[10]);
        low.priority = 5;
        let task_set = TaskSet::new(resource_model(), vec![low, high]);
        let ordered: Vec<usize> = task_set
            .tasks_by_priority()
            .iter()
            .map(|task| task.id)
            .collect();
        assert_eq!(ordered, vec![1, 0]);
        assert!((task_set.get_total_utilization() - 0.15).abs() < 1e-6);
    }
}
