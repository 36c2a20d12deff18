// Docking pipeline: stages, identity matching, orchestration
pub mod docking;

// Bounded dispatch, tool invocation and artifact writing shared by all stages
pub mod workflow_utils;
