//! Heterogeneous platform: a number of resource types, each backed by a number of cores.
use serde_derive::{Deserialize, Serialize};

use crate::error::AnalysisError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceModel {
    cores_per_resource_type: Vec<usize>,
}

impl ResourceModel {
    pub fn new(cores_per_resource_type: Vec<usize>) -> Result<Self, AnalysisError> {
        if cores_per_resource_type.is_empty() {
            return Err(AnalysisError::malformed(
                0,
                "At least one resource type is required.",
            ));
        }
        if let Some(resource_type) = cores_per_resource_type.iter().position(|&c| c == 0) {
            return Err(AnalysisError::malformed(
                0,
                format!("Resource type {} has no cores.", resource_type + 1),
            ));
        }
        Ok(Self {
            cores_per_resource_type,
        })
    }

    pub fn get_number_of_resource_types(&self) -> usize {
        self.cores_per_resource_type.len()
    }

    pub fn get_number_of_cores(&self, resource_type: usize) -> usize {
        *self
            .cores_per_resource_type
            .get(resource_type)
            .unwrap_or_else(|| panic!("Resource type {} does not exist.", resource_type))
    }

    pub fn contains(&self, resource_type: usize) -> bool {
        resource_type < self.cores_per_resource_type.len()
    }

    /// Share of one resource type occupied by a single vertex (1 / cores).
    pub fn interference_weight(&self, resource_type: usize) -> f64 {
        1.0 / self.get_number_of_cores(resource_type) as f64
    }

    pub fn cores_per_resource_type(&self) -> &[usize] {
        &self.cores_per_resource_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_model_new_normal() {
        let resource_model = ResourceModel::new(vec![2, 4]).unwrap();
        assert_eq!(resource_model.get_number_of_resource_types(), 2);
        assert_eq!(resource_model.get_number_of_cores(1), 4);
        assert!(resource_model.contains(1));
        assert!(!resource_model.contains(2));
        assert_eq!(resource_model.interference_weight(0), 0.5);
        assert_eq!(resource_model.interference_weight(1), 0.25);
    }

    #[test]
    fn test_resource_model_new_no_types() {
        assert!(ResourceModel::new(vec![]).is_err());
    }

    #[test]
    fn test_resource_model_new_zero_cores() {
        assert!(ResourceModel::new(vec![2, 0]).is_err());
    }

    #[test]
    #[should_panic]
    fn test_get_number_of_cores_no_exist_type() {
        let resource_model = ResourceModel::new(vec![1]).unwrap();
        resource_model.get_number_of_cores(1);
    }
}
