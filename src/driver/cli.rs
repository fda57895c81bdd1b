//! Driver that runs a configured command per prompt.
//!
//! The prompt (system prompt first, when present) is written to the child's
//! stdin and each stdout line is one line of agent output. A non-zero exit
//! status is a process failure carrying the tail of stderr.

use super::{Driver, DriverError, DriverEvent, DriverRequest, DriverResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

/// Lines of stderr kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliDriverConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CliDriver {
    config: CliDriverConfig,
}

impl CliDriver {
    pub fn new(config: CliDriverConfig) -> Self {
        Self { config }
    }

    async fn run(
        &self,
        request: DriverRequest,
        sink: Option<mpsc::UnboundedSender<DriverEvent>>,
    ) -> Result<DriverResponse, DriverError> {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .current_dir(&request.working_dir)
            .env("ORCHESTRATOR_AGENT", &request.agent)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(session) = &request.session_id {
            command.env("ORCHESTRATOR_SESSION_ID", session);
        }

        debug!(agent = %request.agent, command = %self.config.command, "Spawning driver process");
        let mut child = command.spawn().map_err(|e| {
            DriverError::Process(format!("failed to spawn {}: {}", self.config.command, e))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DriverError::Process("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Process("child stdout unavailable".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DriverError::Process("child stderr unavailable".into()))?;

        let input = match &request.system_prompt {
            Some(system) => format!("{}\n\n{}", system, request.prompt),
            None => request.prompt.clone(),
        };
        // Written from a separate task so a chatty child cannot deadlock on a full pipe
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(input.as_bytes()).await;
            drop(stdin);
            result
        });

        let status_sink = sink.clone();
        let stderr_reader = tokio::spawn(async move {
            let mut tail: Vec<String> = Vec::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(sink) = &status_sink {
                    let _ = sink.send(DriverEvent::Status(line.clone()));
                }
                tail.push(line);
                if tail.len() > STDERR_TAIL_LINES {
                    tail.remove(0);
                }
            }
            tail
        });

        let mut output = String::new();
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(sink) = &sink {
                        let _ = sink.send(DriverEvent::Output(line.clone()));
                    }
                    output.push_str(&line);
                    output.push('\n');
                }
                Ok(None) => break,
                Err(e) => return Err(DriverError::Process(format!("failed to read stdout: {}", e))),
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DriverError::Process(format!("failed to wait for child: {}", e)))?;
        let stderr_tail = stderr_reader.await.unwrap_or_default();
        if let Ok(Err(e)) = writer.await {
            debug!(error = %e, "Driver process closed stdin early");
        }

        if !status.success() {
            return Err(DriverError::Process(format!(
                "{} exited with {}: {}",
                self.config.command,
                status,
                stderr_tail.join("\n")
            )));
        }
        if output.trim().is_empty() {
            return Err(DriverError::InvalidResponse("driver produced no output".into()));
        }

        Ok(DriverResponse {
            output,
            session_id: request.session_id,
        })
    }
}

#[async_trait]
impl Driver for CliDriver {
    async fn generate(&self, request: DriverRequest) -> Result<DriverResponse, DriverError> {
        self.run(request, None).await
    }

    async fn execute_agentic(
        &self,
        request: DriverRequest,
        sink: mpsc::UnboundedSender<DriverEvent>,
    ) -> Result<DriverResponse, DriverError> {
        self.run(request, Some(sink)).await
    }
}

#[cfg(test)]
#[path = "tests/cli_tests.rs"]
mod tests;
