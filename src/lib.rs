//! Coordination core for long-running, resumable agent workflows that run
//! against exclusively-writable git worktrees.
//!
//! The [`orchestrator::OrchestratorService`] owns workflow lifecycles. It
//! looks up pipelines in a [`pipelines::PipelineRegistry`], validates status
//! changes with [`state_machine`], persists through a
//! [`repository::WorkflowRepository`] and a [`checkpoint::CheckpointStore`],
//! and publishes sequenced events on an [`events::EventBus`].

pub mod checkpoint;
pub mod config;
pub mod domain;
pub mod driver;
pub mod events;
pub mod logging;
pub mod orchestrator;
pub mod paths;
pub mod pipelines;
pub mod repository;
pub mod state_machine;
