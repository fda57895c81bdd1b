//! Scripted driver for tests.

use super::{Driver, DriverError, DriverEvent, DriverRequest, DriverResponse};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

type Responder = Box<dyn Fn(&DriverRequest, usize) -> Result<String, DriverError> + Send + Sync>;

/// Answers each call with a closure of `(request, nth call for this agent)`.
pub struct MockDriver {
    responder: Responder,
    delay: Duration,
    requests: Mutex<Vec<DriverRequest>>,
}

impl MockDriver {
    pub fn new(
        responder: impl Fn(&DriverRequest, usize) -> Result<String, DriverError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Plans `tasks` tasks (or a single-shot plan for `None`) and approves every review.
    pub fn approving(tasks: Option<u32>) -> Self {
        Self::new(move |request, _| Ok(default_reply(request, tasks, true)))
    }

    /// Like [`MockDriver::approving`] but every review requests changes.
    pub fn rejecting(tasks: Option<u32>) -> Self {
        Self::new(move |request, _| Ok(default_reply(request, tasks, false)))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<DriverRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn calls_for(&self, agent: &str) -> usize {
        self.requests().iter().filter(|r| r.agent == agent).count()
    }

    async fn respond(&self, request: DriverRequest) -> Result<DriverResponse, DriverError> {
        let nth = {
            let mut requests = self
                .requests
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let nth = requests.iter().filter(|r| r.agent == request.agent).count();
            requests.push(request.clone());
            nth
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let output = (self.responder)(&request, nth)?;
        Ok(DriverResponse {
            output,
            session_id: Some(format!("mock-{}", request.agent)),
        })
    }
}

/// Canned agent replies in the formats the pipeline steps parse.
pub fn default_reply(request: &DriverRequest, tasks: Option<u32>, approve: bool) -> String {
    match request.agent.as_str() {
        "architect" => plan_markdown(tasks),
        "reviewer" if approve => "Looks good.\nVERDICT: APPROVED\n".to_string(),
        "reviewer" => "- tests are missing\nVERDICT: CHANGES REQUESTED\n".to_string(),
        _ => "Implemented the requested change.\n".to_string(),
    }
}

pub fn plan_markdown(tasks: Option<u32>) -> String {
    let mut plan = String::from("# Plan\n\nSummary: update the widget\n\n");
    if let Some(count) = tasks {
        for n in 1..=count {
            plan.push_str(&format!("### Task {n}: step {n}\n\nDo step {n}.\n\n"));
        }
    }
    plan
}

#[async_trait]
impl Driver for MockDriver {
    async fn generate(&self, request: DriverRequest) -> Result<DriverResponse, DriverError> {
        self.respond(request).await
    }

    async fn execute_agentic(
        &self,
        request: DriverRequest,
        sink: mpsc::UnboundedSender<DriverEvent>,
    ) -> Result<DriverResponse, DriverError> {
        let response = self.respond(request).await?;
        for line in response.output.lines() {
            let _ = sink.send(DriverEvent::Output(line.to_string()));
        }
        Ok(response)
    }
}
