use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wfcore::value::to_text;
use wfcore::{
    DeclaredInput, DeclaredOutput, ExecutionEvent, NodeEvent, NodeSpec, TypeHint, Value,
    WorkflowIr,
};
use wfruntime::{
    FlowRuntime, JsonFileSettings, NodeRegistry, NoSettings, RuntimeConfig, SettingsSource,
    ValidationReport,
};

#[derive(Parser)]
#[command(name = "wf")]
#[command(about = "Workflow compiler and runner", long_about = None)]
struct Cli {
    /// Show debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory of workflow documents to register as node types
    #[arg(long, global = true)]
    nodes_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and execute a workflow file
    Run {
        /// Path to workflow JSON file
        file: PathBuf,

        /// Run-time arguments as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Settings file supplying input defaults
        #[arg(short, long, env = "WF_SETTINGS")]
        settings: Option<PathBuf>,

        /// Print the result as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Validate a workflow file without running it
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let registry = build_registry(cli.nodes_dir.as_deref())?;

    match cli.command {
        Commands::Run {
            file,
            input,
            settings,
            json,
        } => {
            let settings: Arc<dyn SettingsSource> = match settings {
                Some(path) => Arc::new(JsonFileSettings::new(path)),
                None => Arc::new(NoSettings),
            };
            let runtime = FlowRuntime::with_registry(registry, RuntimeConfig::default())
                .with_settings(settings);
            run_workflow(&runtime, &file, input, json).await?;
        }

        Commands::Validate { file } => {
            let runtime = FlowRuntime::with_registry(registry, RuntimeConfig::default());
            validate_workflow(&runtime, &file).await?;
        }

        Commands::Nodes => {
            list_nodes(&registry);
        }

        Commands::Init { output } => {
            create_example_workflow(&output)?;
        }
    }

    Ok(())
}

fn build_registry(nodes_dir: Option<&Path>) -> Result<Arc<NodeRegistry>> {
    let mut registry = wfnodes::standard_registry();
    if let Some(dir) = nodes_dir {
        let loaded = registry
            .scan_directory(dir)
            .with_context(|| format!("Failed to scan {}", dir.display()))?;
        tracing::info!("Registered {} workflow node type(s) from {}", loaded, dir.display());
    }
    Ok(Arc::new(registry))
}

fn parse_run_args(input: Option<String>) -> Result<HashMap<String, Value>> {
    let Some(input) = input else {
        return Ok(HashMap::new());
    };
    match serde_json::from_str::<Value>(&input).context("Input is not valid JSON")? {
        Value::Object(obj) => Ok(obj.into_iter().collect()),
        _ => bail!("Input must be a JSON object"),
    }
}

async fn run_workflow(
    runtime: &FlowRuntime,
    file: &Path,
    input: Option<String>,
    json: bool,
) -> Result<()> {
    let doc = runtime
        .load_document(file)
        .await
        .with_context(|| format!("Failed to load {}", file.display()))?;
    let run_args = parse_run_args(input)?;

    if !json {
        println!("🚀 Loading workflow from: {}", file.display());
        println!("   Nodes: {}", doc.nodes.len());
        println!("   Edges: {}", doc.edges.len());
        println!();
    }

    // Subscribe to events for real-time output
    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if !json {
                print_event(event);
            }
        }
    });

    let result = runtime.execute(&doc, run_args).await;

    // Wait for events to finish printing
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    let result = result?;

    if json {
        let outputs: serde_json::Map<String, Value> = result.outputs.clone().into_iter().collect();
        let store: serde_json::Map<String, Value> = result.store.clone().into_inner().into_iter().collect();
        let report = serde_json::json!({
            "execution_id": result.execution_id,
            "path": result.path,
            "duration_ms": result.duration_ms,
            "outputs": outputs,
            "store": store,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", result.execution_id);
    println!("   Path: {}", result.path.join(" → "));
    println!("   Duration: {}ms", result.duration_ms);

    if !result.outputs.is_empty() {
        println!();
        println!("📤 Outputs:");
        for (name, value) in &result.outputs {
            println!("   {}: {}", name, to_text(value));
        }
    } else if !result.store.is_empty() {
        println!();
        println!("📦 Store:");
        let mut keys: Vec<&String> = result.store.keys().collect();
        keys.sort();
        for key in keys {
            if let Some(value) = result.store.get(key) {
                println!("   {}: {}", key, to_text(value));
            }
        }
    }

    Ok(())
}

fn print_event(event: ExecutionEvent) {
    match event {
        ExecutionEvent::WorkflowStarted { entry_node, .. } => {
            println!("▶️  Workflow started at {}", entry_node);
        }
        ExecutionEvent::NodeStarted { node_id, node_type, .. } => {
            println!("  ⚡ Starting node: {} ({})", node_id, node_type);
        }
        ExecutionEvent::NodeRetrying {
            node_id,
            attempt,
            max_attempts,
            error,
            delay_ms,
            ..
        } => {
            println!(
                "  🔁 Node {} attempt {}/{} failed: {} (retrying in {}ms)",
                node_id, attempt, max_attempts, error, delay_ms
            );
        }
        ExecutionEvent::NodeCompleted {
            node_id,
            action,
            duration_ms,
            ..
        } => {
            println!("  ✅ Node {} completed in {}ms → {}", node_id, duration_ms, action);
        }
        ExecutionEvent::NodeFailed { node_id, error, .. } => {
            println!("  ❌ Node {} failed: {}", node_id, error);
        }
        ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
            NodeEvent::Info { message } => {
                println!("     ℹ️  [{}] {}", node_id, message);
            }
            NodeEvent::Warning { message } => {
                println!("     ⚠️  [{}] {}", node_id, message);
            }
            NodeEvent::Progress { percent, message } => {
                if let Some(msg) = message {
                    println!("     📊 [{}] {}% - {}", node_id, percent, msg);
                } else {
                    println!("     📊 [{}] {}%", node_id, percent);
                }
            }
        },
        ExecutionEvent::WorkflowCompleted {
            success,
            steps,
            duration_ms,
            ..
        } => {
            if success {
                println!("✨ Workflow completed in {} step(s), {}ms", steps, duration_ms);
            } else {
                println!("💥 Workflow failed after {}ms", duration_ms);
            }
        }
    }
}

async fn validate_workflow(runtime: &FlowRuntime, file: &Path) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let doc = runtime
        .load_document(file)
        .await
        .with_context(|| format!("Failed to load {}", file.display()))?;
    let report = runtime.validate(&doc);
    print_report(&report);

    if !report.is_valid() {
        bail!("{} error(s) found", report.errors.len());
    }

    println!("✅ Workflow is valid:");
    println!("   Nodes: {}", doc.nodes.len());
    println!("   Edges: {}", doc.edges.len());
    if let Some(entry) = doc.entry_node() {
        println!("   Entry: {}", entry.id);
    }
    Ok(())
}

fn print_report(report: &ValidationReport) {
    for error in &report.errors {
        println!("  ❌ [{:?}] {}", error.kind(), error);
    }
    for warning in &report.warnings {
        println!("  ⚠️  {}", warning);
    }
}

fn list_nodes(registry: &NodeRegistry) {
    println!("📦 Available Node Types:");
    println!();

    for node_type in registry.list_node_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!("  • {} ({})", node_type, metadata.category);
            println!("    {}", metadata.description);
            let writes: Vec<&str> = metadata.interface.writes().collect();
            if !writes.is_empty() {
                println!("    writes: {}", writes.join(", "));
            }
        } else {
            println!("  • {}", node_type);
        }
    }
}

fn create_example_workflow(output: &Path) -> Result<()> {
    let doc = WorkflowIr::new("1.0")
        .with_input(
            "url",
            DeclaredInput::required(TypeHint::String).with_description("Address to fetch"),
        )
        .with_output(
            "response",
            DeclaredOutput::new(TypeHint::Object).with_description("Status, body and headers"),
        )
        .with_node(
            NodeSpec::new("fetch", "http.request")
                .with_param("url", "$url")
                .with_param("method", "GET")
                .with_retry(3, 500),
        )
        .with_node(NodeSpec::new("log", "debug.log").with_param("message", "Got ${response.status}"))
        .with_edge("fetch", "default", "log");

    let json = serde_json::to_string_pretty(&doc)?;
    std::fs::write(output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  wf run {} --input '{{\"url\": \"https://api.github.com/zen\"}}'",
        output.display()
    );

    Ok(())
}
