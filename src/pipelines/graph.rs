//! Checkpointed step execution for pipeline graphs.
//!
//! A graph is a set of named nodes with one entry point. After every node the
//! executor writes a checkpoint holding the new state and the node to run
//! next, so a run can continue from the last completed step after a crash.
//! Nodes listed in `interrupt_before` pause the run for a human decision.

use crate::checkpoint::{Checkpoint, CheckpointStore, StateType};
use crate::domain::{
    ExecutionState, OrchestratorError, OrchestratorResult, StateUpdate, TimestampUtc, WorkflowId,
};
use crate::driver::{DriverError, DriverEvent, DriverRequest, DriverResponse, SharedDriver};
use crate::events::{EventBus, EventDraft, EventType};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Where a node sends the run next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    Node(String),
    End,
}

#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub update: StateUpdate,
    pub next: Next,
}

impl NodeOutcome {
    pub fn goto(node: &str, update: StateUpdate) -> Self {
        Self {
            update,
            next: Next::Node(node.to_string()),
        }
    }

    pub fn end(update: StateUpdate) -> Self {
        Self {
            update,
            next: Next::End,
        }
    }
}

#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: &ExecutionState, ctx: &NodeContext) -> OrchestratorResult<NodeOutcome>;

    /// Text shown to the human when the run pauses before this node.
    fn interrupt_prompt(&self, _state: &ExecutionState) -> String {
        "Approval required to continue".to_string()
    }
}

/// Everything a node may touch while it runs.
#[derive(Clone)]
pub struct NodeContext {
    pub workflow_id: WorkflowId,
    pub worktree: PathBuf,
    pub driver: SharedDriver,
    pub events: Arc<EventBus>,
    pub driver_timeout: Duration,
    pub max_review_passes: u32,
    pub cancel: watch::Receiver<bool>,
}

impl NodeContext {
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn emit_stream(&self, event_type: EventType, agent: &str, message: impl Into<String>) {
        self.events
            .emit_stream(EventDraft::new(self.workflow_id, event_type, message).agent(agent));
    }

    /// Runs an agentic driver call, forwarding its output as stream events.
    ///
    /// The call is bounded by `driver_timeout` and abandoned as soon as the
    /// workflow is cancelled.
    pub async fn call_driver(&self, request: DriverRequest) -> Result<DriverResponse, DriverError> {
        let agent = request.agent.clone();
        let (sink, mut rx) = mpsc::unbounded_channel();

        let call = async {
            match tokio::time::timeout(
                self.driver_timeout,
                self.driver.execute_agentic(request, sink),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(DriverError::Timeout(self.driver_timeout)),
            }
        };
        let forward = async {
            while let Some(event) = rx.recv().await {
                let text = match event {
                    DriverEvent::Output(text) => text,
                    DriverEvent::Status(text) => format!("[status] {}", text),
                };
                self.emit_stream(EventType::AgentOutput, &agent, text);
            }
        };

        let mut cancel = self.cancel.clone();
        tokio::select! {
            result = async { tokio::join!(call, forward).0 } => result,
            () = wait_for_cancel(&mut cancel) => Err(DriverError::Cancelled),
        }
    }
}

/// Resolves once the cancel flag is raised. Never resolves if the sender is gone.
pub async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// How a run begins.
#[derive(Debug, Clone)]
pub enum StartPoint {
    /// Run from the entry node with a new state.
    Fresh(ExecutionState),
    /// Continue at the checkpoint's next node.
    ///
    /// `pass_interrupt` lets the run enter the node it was paused before.
    FromCheckpoint { pass_interrupt: bool },
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Interrupted {
        node: String,
        prompt: String,
        state: ExecutionState,
    },
    Completed {
        state: ExecutionState,
    },
    Cancelled,
}

pub struct PipelineGraph {
    state_type: StateType,
    entry: String,
    nodes: HashMap<String, Arc<dyn Node>>,
    interrupt_before: HashSet<String>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl PipelineGraph {
    pub fn new(state_type: StateType, entry: &str, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            state_type,
            entry: entry.to_string(),
            nodes: HashMap::new(),
            interrupt_before: HashSet::new(),
            checkpoints,
        }
    }

    pub fn node(mut self, name: &str, node: impl Node + 'static) -> Self {
        self.nodes.insert(name.to_string(), Arc::new(node));
        self
    }

    pub fn interrupt_before(mut self, name: &str) -> Self {
        self.interrupt_before.insert(name.to_string());
        self
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Prompt shown for a run paused before `node`, if it is an interrupt node.
    pub fn interrupt_prompt(&self, node: &str, state: &ExecutionState) -> Option<String> {
        if !self.interrupt_before.contains(node) {
            return None;
        }
        self.nodes.get(node).map(|n| n.interrupt_prompt(state))
    }

    async fn save(
        &self,
        workflow_id: WorkflowId,
        next_node: Option<&str>,
        state: &ExecutionState,
        steps_completed: u32,
    ) -> OrchestratorResult<()> {
        self.checkpoints
            .write(&Checkpoint {
                workflow_id,
                state_type: self.state_type.clone(),
                next_node: next_node.map(str::to_string),
                state: state.clone(),
                steps_completed,
                saved_at: TimestampUtc::now(),
            })
            .await
    }

    pub async fn run(&self, start: StartPoint, ctx: &NodeContext) -> OrchestratorResult<RunOutcome> {
        let (mut state, mut current, mut steps, mut pass_interrupt) = match start {
            StartPoint::Fresh(state) => {
                self.save(ctx.workflow_id, Some(&self.entry), &state, 0).await?;
                (state, self.entry.clone(), 0, false)
            }
            StartPoint::FromCheckpoint { pass_interrupt } => {
                let checkpoint = self.checkpoints.read(ctx.workflow_id).await?.ok_or_else(|| {
                    OrchestratorError::Storage(format!("no checkpoint for {}", ctx.workflow_id))
                })?;
                if checkpoint.state_type != self.state_type {
                    return Err(OrchestratorError::Configuration(format!(
                        "checkpoint state type {} does not match {}",
                        checkpoint.state_type, self.state_type
                    )));
                }
                match checkpoint.next_node {
                    Some(next) => (checkpoint.state, next, checkpoint.steps_completed, pass_interrupt),
                    None => return Ok(RunOutcome::Completed { state: checkpoint.state }),
                }
            }
        };

        loop {
            if ctx.is_cancelled() {
                debug!(workflow_id = %ctx.workflow_id, node = %current, "Run cancelled at node boundary");
                return Ok(RunOutcome::Cancelled);
            }

            let node = self.nodes.get(&current).cloned().ok_or_else(|| {
                OrchestratorError::Configuration(format!("pipeline has no node named {}", current))
            })?;

            if !pass_interrupt && self.interrupt_before.contains(&current) {
                let prompt = node.interrupt_prompt(&state);
                return Ok(RunOutcome::Interrupted {
                    node: current,
                    prompt,
                    state,
                });
            }
            pass_interrupt = false;

            ctx.emit_stream(EventType::StageStarted, &current, format!("{} started", current));
            let outcome = node.run(&state, ctx).await?;
            state = state.apply(outcome.update);
            steps += 1;

            let next = match outcome.next {
                Next::Node(name) => Some(name),
                Next::End => None,
            };
            self.save(ctx.workflow_id, next.as_deref(), &state, steps).await?;
            ctx.emit_stream(EventType::StageCompleted, &current, format!("{} completed", current));
            debug!(workflow_id = %ctx.workflow_id, node = %current, next = ?next, "Node completed");

            match next {
                Some(name) => current = name,
                None => return Ok(RunOutcome::Completed { state }),
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/graph_tests.rs"]
mod tests;
