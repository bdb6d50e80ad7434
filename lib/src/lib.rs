pub mod analysis;
pub mod cancellation;
pub mod dag_task;
pub mod decomposition_tree;
pub mod error;
pub mod graph_extension;
pub mod inter_task_rta;
pub mod interference_profile;
pub mod intra_task_rta;
pub mod nfj_dag;
pub mod output_log;
pub mod path_analysis;
pub mod resource_model;
pub mod task_set_creator;
#[cfg(any(test, feature = "test-helpers"))]
pub mod tests_helper;
pub mod util;
