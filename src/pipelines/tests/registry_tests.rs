//! Tests for the pipeline registry.

use super::*;
use crate::checkpoint::MemoryCheckpointStore;
use crate::domain::{ProfileId, WorkflowId, WorkflowPayload};
use crate::pipelines::PipelineArgs;
use std::path::PathBuf;
use std::sync::Arc;

#[test]
fn test_builtin_pipelines_are_registered() {
    let registry = builtin_registry();
    assert_eq!(registry.names(), vec!["implementation", "review"]);

    let listed: Vec<(&str, bool)> = registry
        .list()
        .iter()
        .map(|m| (m.name, m.supports_planning))
        .collect();
    assert_eq!(listed, vec![("implementation", true), ("review", false)]);
}

#[test]
fn test_unknown_pipeline_is_configuration_error() {
    let err = PipelineRegistry::with_builtin()
        .get_pipeline("deploy")
        .err()
        .expect("unknown pipeline");
    match err {
        OrchestratorError::Configuration(message) => {
            assert!(message.contains("deploy"));
            assert!(message.contains("implementation"));
        }
        other => panic!("Expected Configuration error, got {other:?}"),
    }
}

#[test]
fn test_each_lookup_builds_a_fresh_graph() {
    let registry = PipelineRegistry::with_builtin();
    let store: Arc<dyn crate::checkpoint::CheckpointStore> = Arc::new(MemoryCheckpointStore::new());

    let first = registry.get_pipeline("implementation").expect("first");
    let second = registry.get_pipeline("implementation").expect("second");
    let graph = first.create_graph(store.clone());

    assert_eq!(graph.entry(), "architect");
    assert_eq!(first.state_type(), second.state_type());
}

#[test]
fn test_initial_state_uses_payload_inputs() {
    let pipeline = builtin_registry().get_pipeline("review").expect("review");
    let state = pipeline.initial_state(PipelineArgs {
        workflow_id: WorkflowId::new(),
        profile_id: ProfileId::from("default"),
        worktree: PathBuf::from("/repo/wt-a"),
        payload: WorkflowPayload {
            issue_ref: Some("ISSUE-9".into()),
            design_text: Some("Use a builder".into()),
            ..WorkflowPayload::default()
        },
    });

    assert_eq!(state.pipeline_type(), "review");
    assert_eq!(state.issue(), Some("ISSUE-9"));
    assert_eq!(state.design(), Some("Use a builder"));
    assert!(state.history().is_empty());
}

#[test]
fn test_custom_registration() {
    let mut registry = PipelineRegistry::empty();
    assert!(!registry.contains("implementation"));
    registry.register("implementation", || {
        Box::new(crate::pipelines::implementation::ImplementationPipeline)
    });
    assert!(registry.contains("implementation"));
    assert!(registry.get_pipeline("implementation").is_ok());
}
