//! Execution backends ("drivers") that run agent prompts.
//!
//! The orchestrator only relies on the [`Driver`] trait. How a backend talks
//! to its model (CLI subprocess, HTTP API) stays behind that boundary.

mod cli;
#[cfg(test)]
pub mod testing;

pub use cli::{CliDriver, CliDriverConfig};

use crate::domain::{OrchestratorResult, ProfileId};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// One prompt for an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverRequest {
    /// Agent role issuing the call (`architect`, `developer`, `reviewer`).
    pub agent: String,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub working_dir: PathBuf,
    /// Backend session to continue, if the backend supports sessions.
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverResponse {
    pub output: String,
    pub session_id: Option<String>,
}

/// Incremental output from an agentic run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// A line of agent output.
    Output(String),
    /// Diagnostic text from the backend itself.
    Status(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("driver call timed out after {0:?}")]
    Timeout(Duration),

    #[error("driver process failed: {0}")]
    Process(String),

    #[error("driver call cancelled")]
    Cancelled,

    #[error("invalid driver response: {0}")]
    InvalidResponse(String),
}

impl DriverError {
    /// Timeouts may succeed on a later attempt; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[async_trait]
pub trait Driver: Send + Sync {
    /// Runs the prompt and returns the final output.
    async fn generate(&self, request: DriverRequest) -> Result<DriverResponse, DriverError>;

    /// Runs the prompt, forwarding incremental output to `sink` as it arrives.
    async fn execute_agentic(
        &self,
        request: DriverRequest,
        sink: mpsc::UnboundedSender<DriverEvent>,
    ) -> Result<DriverResponse, DriverError>;
}

pub type SharedDriver = Arc<dyn Driver>;

/// Resolves the driver a workflow's profile runs with.
pub trait DriverFactory: Send + Sync {
    fn driver_for(&self, profile: &ProfileId) -> OrchestratorResult<SharedDriver>;
}

/// Serves the same driver for every profile.
pub struct StaticDriverFactory(pub SharedDriver);

impl DriverFactory for StaticDriverFactory {
    fn driver_for(&self, _profile: &ProfileId) -> OrchestratorResult<SharedDriver> {
        Ok(self.0.clone())
    }
}
