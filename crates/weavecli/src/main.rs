// crates/weavecli/src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use weavecore::{
    ActivityInvocation, Cond, ExecutionEvent, Expr, Map, Statement, Value, While, Workflow,
};
use weaveruntime::{ActivityRegistry, RuntimeConfig, WeaveRuntime};

#[derive(Parser)]
#[command(name = "weave")]
#[command(about = "Weave workflow CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow YAML document
    Run {
        /// Path to the workflow YAML file
        #[arg(short = 'f', long)]
        file: PathBuf,

        /// Override the document's task queue (falls back to $TASK_QUEUE)
        #[arg(short = 'q', long)]
        queue: Option<String>,

        /// Overall run timeout in seconds
        #[arg(long, default_value_t = 120)]
        timeout: u64,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow YAML document
    Validate {
        /// Path to the workflow YAML file
        file: PathBuf,
    },

    /// List registered activities
    Activities,

    /// Write an example workflow document
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.yaml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            queue,
            timeout,
            verbose,
        } => {
            init_tracing(verbose);
            run_workflow(&file, queue, timeout).await?;
        }
        Commands::Validate { file } => {
            validate_workflow(&file)?;
        }
        Commands::Activities => {
            list_activities();
        }
        Commands::Init { output } => {
            write_example_workflow(&output)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn load_workflow(path: &Path) -> Result<Workflow> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading workflow file {}", path.display()))?;
    let workflow: Workflow =
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(workflow)
}

async fn run_workflow(path: &Path, queue: Option<String>, timeout_secs: u64) -> Result<()> {
    let mut workflow = load_workflow(path)?;
    workflow.validate()?;

    // CLI flag wins, then $TASK_QUEUE, then the document, then "demo"
    if let Some(queue) = queue.or_else(|| std::env::var("TASK_QUEUE").ok()) {
        workflow.task_queue = queue;
    }
    if workflow.task_queue.is_empty() {
        workflow.task_queue = "demo".to_string();
    }

    println!("🚀 Running workflow: {}", path.display());
    println!("   Task queue: {}", workflow.task_queue);
    println!("   Variables: {}", workflow.variables.len());
    println!();

    let mut registry = ActivityRegistry::new();
    weaveacts::register_all(&mut registry);
    let runtime = WeaveRuntime::with_registry(Arc::new(registry), RuntimeConfig::default());

    let mut events = runtime.subscribe_events();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::WorkflowStarted { run_id, .. } => {
                    println!("▶️  Run started ({})", run_id);
                }
                ExecutionEvent::ActivityStarted { name, .. } => {
                    println!("  ⚡ {}", name);
                }
                ExecutionEvent::ActivityCompleted {
                    name, duration_ms, ..
                } => {
                    println!("  ✅ {} ({}ms)", name, duration_ms);
                }
                ExecutionEvent::ActivityFailed { name, error, .. } => {
                    println!("  ❌ {}: {}", name, error);
                }
                ExecutionEvent::WorkflowCompleted {
                    success,
                    duration_ms,
                    ..
                } => {
                    if success {
                        println!("✨ Completed in {}ms", duration_ms);
                    } else {
                        println!("💥 Failed after {}ms", duration_ms);
                    }
                }
            }
        }
    });

    let outcome = tokio::time::timeout(Duration::from_secs(timeout_secs), runtime.run(&workflow))
        .await
        .context("run timed out")?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();

    let bindings = outcome?;
    println!();
    println!("📤 Final bindings:");
    println!("{}", serde_json::to_string_pretty(&bindings)?);
    Ok(())
}

fn validate_workflow(path: &Path) -> Result<()> {
    let workflow = load_workflow(path)?;
    workflow.validate()?;
    println!("✅ Workflow is valid");
    println!("   Version: {}", workflow.version);
    println!("   Task queue: {}", workflow.task_queue);
    println!("   Variables: {}", workflow.variables.len());
    Ok(())
}

fn list_activities() {
    let mut registry = ActivityRegistry::new();
    weaveacts::register_all(&mut registry);

    println!("📦 Registered activities:");
    for name in registry.list_names() {
        println!("  • {}", name);
    }
}

fn write_example_workflow(output: &Path) -> Result<()> {
    let workflow = example_workflow();
    let text = serde_yaml::to_string(&workflow)?;
    std::fs::write(output, text)?;

    println!("✨ Wrote example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  weave run -f {}", output.display());
    Ok(())
}

/// Fan out two tagging activities, join their results, then poll for
/// approval with a bounded loop.
fn example_workflow() -> Workflow {
    Workflow {
        version: "1".to_string(),
        task_queue: "demo".to_string(),
        variables: [
            ("x".to_string(), Value::Int(1)),
            ("y".to_string(), Value::Int(2)),
            ("approved".to_string(), Value::Bool(false)),
            (
                "urls".to_string(),
                Value::List(vec!["u1".into(), "u2".into(), "u3".into()]),
            ),
        ]
        .into_iter()
        .collect(),
        timeout_sec: 10,
        concurrency: 2,
        root: Some(Box::new(Statement::sequence(vec![
            Statement::parallel(vec![
                Statement::activity(
                    ActivityInvocation::new("sim.a").arg(Expr::var("x")).store("a"),
                ),
                Statement::activity(
                    ActivityInvocation::new("sim.b").arg(Expr::var("y")).store("b"),
                ),
            ]),
            Statement::activity(
                ActivityInvocation::new("sim.c")
                    .arg(Expr::var("a"))
                    .arg(Expr::var("b"))
                    .store("c"),
            ),
            Statement::map(Map {
                items_ref: "urls".into(),
                item_var: "url".into(),
                collect_var: "pages".into(),
                concurrency: 3,
                fail_fast: true,
                body: Some(Box::new(Statement::activity(
                    ActivityInvocation::new("sim.fetch")
                        .arg(Expr::var("url"))
                        .store("page"),
                ))),
            }),
            Statement::while_loop(While {
                cond: Cond::not(Cond::truthy(Expr::var("approved"))),
                max_iters: 3,
                body: Some(Box::new(Statement::activity(
                    ActivityInvocation::new("sim.approve").store("approved"),
                ))),
                ..Default::default()
            }),
        ]))),
        ..Default::default()
    }
}
