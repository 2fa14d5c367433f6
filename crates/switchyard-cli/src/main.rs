use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::json;

use switchyard_core::app::{Classifier, LocalStack, TaskFilter};
use switchyard_core::config::RouterConfig;
use switchyard_core::domain::{ExecutionResult, TaskDescription, TaskState};
use switchyard_core::flow::{FlowComposer, WorkflowGraph};
use switchyard_core::impls::integration::AutomationMode;
use switchyard_core::logging::init_logging;
use switchyard_core::typed::{Handler, HandlerError, TypedTask};

#[derive(Parser)]
#[command(name = "switchyard", about = "Task router over queue, workflow and automation backends")]
struct Cli {
    /// TOML config file (defaults to ./switchyard.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the routing scenarios against in-memory backends
    Demo,
    /// Show which backend a task would be routed to
    Classify {
        id: String,
        task_type: String,
        #[arg(long)]
        durable: bool,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct DemoStep {
    fail: bool,
}

impl TypedTask for DemoStep {
    const TYPE: &'static str = "demo";
}

struct DemoHandler;

#[async_trait]
impl Handler<DemoStep> for DemoHandler {
    async fn handle(&self, task: DemoStep) -> Result<ExecutionResult, HandlerError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if task.fail {
            return Err(HandlerError::Failed("demo step configured to fail".into()));
        }
        Ok(ExecutionResult::new(json!({ "ok": true })))
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<RouterConfig> {
    match path {
        Some(p) => RouterConfig::load(p).with_context(|| format!("loading {}", p.display())),
        None => RouterConfig::load_default().context("loading default config"),
    }
}

async fn demo(config: RouterConfig) -> Result<()> {
    let stack = LocalStack::builder(config)
        .handler::<DemoStep, _>(DemoHandler)?
        .automation("demo", AutomationMode::Tracked)
        .start()?;
    let router = Arc::clone(&stack.router);

    println!("== routing ==");
    let demo_task = |id: &str| TaskDescription::new(id, DemoStep::TYPE).with_payload(json!({}));
    let tasks = [
        ("A", demo_task("t1").durable()),
        ("B", demo_task("t2").with_tag("external-integration")),
        ("C", demo_task("t3")),
    ];
    for (scenario, task) in &tasks {
        let handle = router.schedule_task(task).await?;
        println!(
            "{scenario}: {} -> {} ({})",
            handle.task_id(),
            handle.backend_kind(),
            handle.backend_native_id()
        );
    }

    println!("== idempotent resubmission ==");
    let first = router.schedule_task(&tasks[0].1).await?;
    let again = router.schedule_task(&tasks[0].1).await?;
    println!(
        "D: same handle = {}, workflow runs = {}",
        first == again,
        stack.workflow.run_count("wf-t1")
    );

    println!("== flow ==");
    let step = |id: &str, fail: bool| DemoStep { fail }.describe(id);
    let graph = WorkflowGraph::new()
        .with_task(step("P", false)?)?
        .with_task(step("C1", false)?)?
        .with_task(step("C2", true)?)?
        .with_dependency(&"P".into(), &"C1".into())?
        .with_dependency(&"P".into(), &"C2".into())?;
    let mut flow = FlowComposer::new(Arc::clone(&router), graph);
    let report = flow.run(Duration::from_millis(25)).await?;
    for (id, status) in &report.statuses {
        let blocked = status
            .error_info
            .as_ref()
            .and_then(|e| e.blocked_by.as_ref())
            .map(|b| format!(" (blocked by {b})"))
            .unwrap_or_default();
        println!("E: {id} {:?}{blocked}", status.state);
    }

    println!("== registry ==");
    for handle in router.list_tasks(&TaskFilter::all()) {
        let status = router.get_task_status(handle.task_id()).await?;
        println!("{} {} {:?}", handle.task_id(), handle.backend_kind(), status.state);
    }
    let failed = router.list_tasks(&TaskFilter::all().with_status(TaskState::Failed));
    println!("failed tasks: {}", failed.len());
    tracing::info!(tasks = router.task_count(), failed = failed.len(), "demo finished");

    stack.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_logging(&config.logging);

    match cli.command {
        Command::Demo => demo(config).await?,
        Command::Classify {
            id,
            task_type,
            durable,
            tags,
        } => {
            let mut task = TaskDescription::new(id, task_type.as_str());
            if durable {
                task = task.durable();
            }
            for tag in tags {
                task = task.with_tag(tag);
            }
            let classifier = Classifier::new(&config.classifier);
            println!("{}", classifier.classify(&task));
        }
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
