mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use worktree_orchestrator::checkpoint::FileCheckpointStore;
use worktree_orchestrator::config::{OrchestratorConfig, ProfileDriverFactory};
use worktree_orchestrator::domain::{ProfileId, Workflow, WorkflowId, WorkflowPayload, WorktreePath};
use worktree_orchestrator::events::{BusMessage, EventRecord, EventSubscription, SubscriptionFilter};
use worktree_orchestrator::orchestrator::{CreateWorkflow, Launch, OrchestratorDeps, OrchestratorService};
use worktree_orchestrator::paths::{self, InstanceLock};
use worktree_orchestrator::pipelines::builtin_registry;
use worktree_orchestrator::pipelines::implementation::ImplementationPipeline;
use worktree_orchestrator::logging;
use worktree_orchestrator::repository::{FileRepository, WorkflowFilter, WorkflowRepository};

struct Runtime {
    config: OrchestratorConfig,
    data_dir: PathBuf,
}

fn load_context(cli: &Cli) -> Result<Runtime> {
    let home = match &cli.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
            dir.clone()
        }
        None => paths::orchestrator_home_dir()?,
    };
    let config_path = cli.config.clone().unwrap_or_else(|| paths::config_path(&home));
    let config = OrchestratorConfig::load_or_default(&config_path)?;
    let data_dir = match (&cli.data_dir, &config.data_dir) {
        (None, Some(configured)) => configured.clone(),
        _ => home,
    };
    Ok(Runtime { config, data_dir })
}

fn build_service(ctx: &Runtime) -> Result<OrchestratorService> {
    let repository = FileRepository::open(&ctx.data_dir).context("Failed to open workflow store")?;
    let checkpoints = FileCheckpointStore::new(paths::checkpoints_dir(&ctx.data_dir));
    Ok(OrchestratorService::new(
        OrchestratorDeps {
            repository: Arc::new(repository),
            checkpoints: Arc::new(checkpoints),
            drivers: Arc::new(ProfileDriverFactory::from_config(&ctx.config)),
            pipelines: builtin_registry().clone(),
        },
        ctx.config.settings(),
    ))
}

fn read_optional(path: Option<&Path>) -> Result<Option<String>> {
    path.map(|p| {
        std::fs::read_to_string(p).with_context(|| format!("Failed to read {}", p.display()))
    })
    .transpose()
}

fn print_workflow_line(workflow: &Workflow) {
    println!(
        "{}  {:<11}  {:<14}  {}  {}",
        workflow.id(),
        workflow.status().as_str(),
        workflow.pipeline_type(),
        workflow.created_at().0.format("%Y-%m-%d %H:%M"),
        workflow.worktree_path()
    );
}

fn print_event(event: &EventRecord) {
    println!(
        "[{}] #{} {} {}",
        event.workflow_id, event.sequence, event.event_type, event.message
    );
}

/// Prints events until every workflow in `waiting` settles or the user interrupts.
///
/// On Ctrl-C running tasks are stopped without a status change; the next
/// invocation's recovery flags them as interrupted.
async fn follow(
    service: &OrchestratorService,
    mut subscription: EventSubscription,
    mut waiting: HashSet<WorkflowId>,
    verbose: bool,
) -> Result<()> {
    while !waiting.is_empty() {
        tokio::select! {
            message = subscription.recv() => match message {
                Some(BusMessage::Event(event)) => {
                    print_event(&event);
                    if event.event_type.is_settling() {
                        waiting.remove(&event.workflow_id);
                    }
                }
                Some(BusMessage::Stream(event)) => {
                    if verbose {
                        let agent = event.agent.as_deref().unwrap_or("-");
                        println!("    {} {}: {}", event.event_type, agent, event.message);
                    }
                }
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                eprintln!("Interrupted; stopping running workflows");
                service.shutdown().await;
                break;
            }
        }
    }
    Ok(())
}

/// Runs a mutating command: takes the instance lock, recovers, acts, then
/// waits for launched workflows to settle.
async fn run_command(ctx: &Runtime, command: Command) -> Result<()> {
    let _lock = InstanceLock::acquire(&ctx.data_dir)?;
    let service = build_service(ctx)?;
    let report = service.recover_interrupted_workflows().await?;
    if !report.failed.is_empty() {
        eprintln!(
            "Flagged {} interrupted workflow(s) as failed; resume them with `orchestrator resume <id>`",
            report.failed.len()
        );
    }

    let subscription = service.events().subscribe(SubscriptionFilter::All);
    let (launched, verbose): (Vec<WorkflowId>, bool) = match command {
        Command::Create {
            worktree,
            pipeline,
            profile,
            issue,
            issue_file,
            design,
            design_file,
            start,
            plan_now,
            verbose,
        } => {
            let profile = profile.unwrap_or_else(|| ctx.config.default_profile.clone());
            let pipeline = pipeline
                .or_else(|| ctx.config.default_pipeline_for(&profile).map(str::to_string))
                .unwrap_or_else(|| ImplementationPipeline::NAME.to_string());
            let launch = match (start, plan_now) {
                (true, _) => Launch::Start,
                (false, true) => Launch::PlanNow,
                (false, false) => Launch::Queue,
            };
            let request = CreateWorkflow {
                pipeline_type: pipeline,
                profile_id: ProfileId::from(profile),
                worktree_path: WorktreePath::from(worktree),
                payload: WorkflowPayload {
                    issue_ref: issue,
                    issue_text: read_optional(issue_file.as_deref())?,
                    design_ref: design,
                    design_text: read_optional(design_file.as_deref())?,
                    ..WorkflowPayload::default()
                },
            };
            let workflow = service.create(request, launch).await?;
            println!("{}", workflow.id());
            let launched = if launch == Launch::Queue {
                Vec::new()
            } else {
                vec![workflow.id()]
            };
            (launched, verbose)
        }
        Command::Start { id, verbose } => {
            service.start(id).await?;
            (vec![id], verbose)
        }
        Command::StartBatch {
            ids,
            worktree,
            verbose,
        } => {
            let ids = if ids.is_empty() { None } else { Some(ids) };
            let filter = worktree.map(WorktreePath::from);
            let result = service.start_batch(ids, filter.as_ref()).await?;
            for (id, reason) in &result.errors {
                eprintln!("{}: {}", id, reason);
            }
            (result.started, verbose)
        }
        Command::Approve { id, verbose } => {
            service.approve(id).await?;
            (vec![id], verbose)
        }
        Command::Reject { id, feedback } => {
            let workflow = service.reject(id, &feedback).await?;
            print_workflow_line(&workflow);
            (Vec::new(), false)
        }
        Command::Cancel { id } => {
            let workflow = service.cancel(id).await?;
            print_workflow_line(&workflow);
            (Vec::new(), false)
        }
        Command::Resume { id, verbose } => {
            service.resume(id).await?;
            (vec![id], verbose)
        }
        Command::Replan { id, verbose } => {
            service.replan(id).await?;
            (vec![id], verbose)
        }
        Command::Status { .. } | Command::List { .. } | Command::Events { .. } | Command::Pipelines => {
            anyhow::bail!("read-only command routed to run_command")
        }
    };

    follow(&service, subscription, launched.into_iter().collect(), verbose).await?;
    service.shutdown().await;
    Ok(())
}

/// Commands that only read persisted state; they never take the instance lock.
async fn run_query(ctx: &Runtime, command: Command) -> Result<()> {
    match command {
        Command::Pipelines => {
            for pipeline in builtin_registry().list() {
                println!(
                    "{:<16} {}{}",
                    pipeline.name,
                    pipeline.description,
                    if pipeline.supports_planning { " (supports planning)" } else { "" }
                );
            }
        }
        Command::Status { id } => {
            let repository = FileRepository::open(&ctx.data_dir)?;
            let workflow = repository.get(id).await?;
            println!("{}", serde_json::to_string_pretty(&workflow)?);
        }
        Command::List {
            status,
            worktree,
            pipeline,
            limit,
        } => {
            let repository = FileRepository::open(&ctx.data_dir)?;
            let filter = WorkflowFilter {
                statuses: status,
                worktree_path: worktree.map(WorktreePath::from),
                pipeline_type: pipeline,
                limit,
            };
            for workflow in repository.list(&filter).await? {
                print_workflow_line(&workflow);
            }
        }
        Command::Events { id, after } => {
            let repository = FileRepository::open(&ctx.data_dir)?;
            for event in repository.events_after(id, after).await? {
                print_event(&event);
            }
        }
        other => return run_command(ctx, other).await,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = load_context(&cli)?;
    let logs = paths::logs_dir(&ctx.data_dir)?;
    let _log_guard = logging::init(Some(&logs))?;

    run_query(&ctx, cli.command).await
}
