use clap::{Parser, Subcommand};
use std::path::PathBuf;
use worktree_orchestrator::domain::{WorkflowId, WorkflowStatus};

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(about = "Runs resumable agent workflows against git worktrees")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("ORCHESTRATOR_GIT_SHA"), ")"))]
pub struct Cli {
    /// Config file (default: <data dir>/orchestrator.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory (default: $ORCHESTRATOR_HOME or ~/.worktree-orchestrator)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a workflow, optionally starting it or running its planning phase
    Create {
        #[arg(long)]
        worktree: PathBuf,

        /// Pipeline to run (default: the profile's default pipeline)
        #[arg(long)]
        pipeline: Option<String>,

        #[arg(long)]
        profile: Option<String>,

        /// Issue reference, e.g. a tracker ID
        #[arg(long)]
        issue: Option<String>,

        /// File holding the issue text
        #[arg(long)]
        issue_file: Option<PathBuf>,

        /// Design reference
        #[arg(long)]
        design: Option<String>,

        /// File holding the design text
        #[arg(long)]
        design_file: Option<PathBuf>,

        /// Start full execution immediately
        #[arg(long, conflicts_with = "plan_now")]
        start: bool,

        /// Run only the planning phase and stop for approval
        #[arg(long)]
        plan_now: bool,

        /// Print agent output while waiting
        #[arg(short, long)]
        verbose: bool,
    },

    /// Start a pending workflow
    Start {
        id: WorkflowId,
        #[arg(short, long)]
        verbose: bool,
    },

    /// Start several pending workflows (all of them when no IDs are given)
    StartBatch {
        ids: Vec<WorkflowId>,
        /// Only start workflows on this worktree
        #[arg(long)]
        worktree: Option<PathBuf>,
        #[arg(short, long)]
        verbose: bool,
    },

    /// Approve the plan of a blocked workflow
    Approve {
        id: WorkflowId,
        #[arg(short, long)]
        verbose: bool,
    },

    /// Reject the plan of a blocked workflow
    Reject {
        id: WorkflowId,
        #[arg(long)]
        feedback: String,
    },

    /// Cancel a workflow and wait for it to stop
    Cancel { id: WorkflowId },

    /// Resume a failed workflow from its last checkpoint
    Resume {
        id: WorkflowId,
        #[arg(short, long)]
        verbose: bool,
    },

    /// Discard the plan of a blocked workflow and plan again
    Replan {
        id: WorkflowId,
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show one workflow as JSON
    Status { id: WorkflowId },

    /// List workflows, newest first
    List {
        #[arg(long)]
        status: Vec<WorkflowStatus>,
        #[arg(long)]
        worktree: Option<PathBuf>,
        #[arg(long)]
        pipeline: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print a workflow's persisted events
    Events {
        id: WorkflowId,
        /// Only events with a higher sequence number
        #[arg(long, default_value_t = 0)]
        after: u64,
    },

    /// List registered pipelines
    Pipelines,
}
