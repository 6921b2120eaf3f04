//! utf8proj CLI - Project Scheduling Engine
//!
//! Command-line interface over the `utf8proj-engine` facade: import/export
//! MSPDI documents, manage the multi-project store, validate, and run CPM
//! and schedule-compression analysis against an embedded SQLite file.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use utf8proj_core::{Deadline, EngineError};
use utf8proj_engine::{Engine, EngineConfig, MetadataUpdate, NewTaskFields, TaskUpdateFields};

#[derive(Parser)]
#[command(name = "utf8proj")]
#[command(author, version, about = "Project scheduling engine", long_about = None)]
struct Cli {
    /// Path to the embedded store file, shared by every command
    #[arg(long, global = true, default_value = "utf8proj.db")]
    db: PathBuf,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Import an MSPDI document as a new project and make it active
    Ingest {
        /// Input XML file path
        file: PathBuf,
    },
    /// Export the active project back to an MSPDI document
    Export {
        /// Output file path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the structural/graph validator against the active project
    Validate,
    /// Compute the critical path for the active project
    Cpm,
    /// Show or update the active project's metadata
    Metadata {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        start: Option<chrono::NaiveDate>,
        #[arg(long)]
        status_date: Option<chrono::NaiveDate>,
    },
    /// Show or apply schedule-compression strategies
    Optimize {
        /// Target project duration, in days
        #[arg(long)]
        target: f64,
        /// Apply the recommended strategy instead of only proposing it
        #[arg(long)]
        apply: bool,
    },
    /// Manage projects in the store
    #[command(subcommand)]
    Projects(ProjectCommand),
    /// Manage tasks in the active project
    #[command(subcommand)]
    Tasks(TaskCommand),
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// List every project in the store
    List,
    /// Create an empty project and make it active
    Create {
        name: String,
        /// Start date, YYYY-MM-DD
        start: chrono::NaiveDate,
    },
    /// Make a project the active one
    Switch { id: String },
    /// Delete a project and all of its tasks/links
    Delete { id: String },
}

#[derive(Subcommand)]
enum TaskCommand {
    /// List tasks in the active project
    List,
    /// Create a task in the active project
    Create {
        outline_number: String,
        name: String,
        outline_level: u32,
        /// ISO-8601 duration, e.g. PT8H0M0S
        #[arg(long, default_value = "PT0H0M0S")]
        duration: String,
        #[arg(long)]
        milestone: bool,
        #[arg(long)]
        summary: bool,
    },
    /// Rename a task
    Rename { id: String, name: String },
    /// Delete a task and its dangling predecessor references
    Delete { id: String },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let engine = Engine::open(EngineConfig::new(&cli.db)).context("opening store")?;

    match cli.command {
        Commands::Ingest { file } => cmd_ingest(&engine, &file, cli.format),
        Commands::Export { output } => cmd_export(&engine, output.as_deref()),
        Commands::Validate => cmd_validate(&engine, cli.format),
        Commands::Cpm => cmd_cpm(&engine, cli.format),
        Commands::Metadata {
            name,
            start,
            status_date,
        } => cmd_metadata(&engine, name, start, status_date, cli.format),
        Commands::Optimize { target, apply } => cmd_optimize(&engine, target, apply, cli.format),
        Commands::Projects(sub) => cmd_projects(&engine, sub, cli.format),
        Commands::Tasks(sub) => cmd_tasks(&engine, sub, cli.format),
    }
}

fn cmd_ingest(engine: &Engine, file: &PathBuf, format: OutputFormat) -> Result<()> {
    let xml = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let project = engine_result(engine.ingest_xml(&xml, Deadline::none()))?;
    match format {
        OutputFormat::Text => {
            println!("ingested project {} ({})", project.name, project.id);
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({"id": project.id, "name": project.name, "start": project.start})
            );
        }
    }
    Ok(())
}

fn cmd_export(engine: &Engine, output: Option<&std::path::Path>) -> Result<()> {
    let bytes = engine_result(engine.export_xml())?;
    match output {
        Some(path) => {
            fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?;
        }
        None => {
            print!("{}", String::from_utf8_lossy(&bytes));
        }
    }
    Ok(())
}

fn cmd_validate(engine: &Engine, format: OutputFormat) -> Result<()> {
    let report = engine_result(engine.validate())?;
    match format {
        OutputFormat::Text => {
            if report.valid {
                println!("valid");
            } else {
                for issue in &report.issues {
                    println!(
                        "[{:?}] {}{}",
                        issue.kind,
                        issue
                            .outline_number
                            .as_deref()
                            .map(|o| format!("{o}: "))
                            .unwrap_or_default(),
                        issue.message
                    );
                }
            }
        }
        OutputFormat::Json => {
            let issues: Vec<_> = report
                .issues
                .iter()
                .map(|i| {
                    serde_json::json!({
                        "outline_number": i.outline_number,
                        "field": i.field,
                        "message": i.message,
                        "kind": format!("{:?}", i.kind),
                    })
                })
                .collect();
            println!("{}", serde_json::json!({"valid": report.valid, "issues": issues}));
        }
    }
    if !report.valid {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_cpm(engine: &Engine, format: OutputFormat) -> Result<()> {
    let result = engine_result(engine.compute_cpm(Deadline::none()))?;
    match format {
        OutputFormat::Text => {
            println!("project duration: {:.2} days", result.project_duration_days);
            for task in &result.tasks {
                println!(
                    "{:<12} ES={:<7.2} EF={:<7.2} LS={:<7.2} LF={:<7.2} float={:<7.2} {}",
                    task.outline_number,
                    task.es,
                    task.ef,
                    task.ls,
                    task.lf,
                    task.total_float,
                    if task.critical { "CRITICAL" } else { "" }
                );
            }
        }
        OutputFormat::Json => {
            let tasks: Vec<_> = result
                .tasks
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "outline_number": t.outline_number,
                        "es": t.es, "ef": t.ef, "ls": t.ls, "lf": t.lf,
                        "total_float": t.total_float, "critical": t.critical,
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::json!({
                    "project_duration_days": result.project_duration_days,
                    "critical": result.critical,
                    "tasks": tasks,
                })
            );
        }
    }
    Ok(())
}

fn cmd_metadata(
    engine: &Engine,
    name: Option<String>,
    start: Option<chrono::NaiveDate>,
    status_date: Option<chrono::NaiveDate>,
    format: OutputFormat,
) -> Result<()> {
    if name.is_some() || start.is_some() || status_date.is_some() {
        engine_result(engine.update_metadata(MetadataUpdate {
            name,
            start,
            status_date,
        }))?;
    }
    let meta = engine_result(engine.get_metadata())?;
    match format {
        OutputFormat::Text => {
            println!("name:         {}", meta.name);
            println!("start:        {}", meta.start);
            println!("status_date:  {}", meta.status_date);
            println!("task_count:   {}", meta.task_count);
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "name": meta.name,
                    "start": meta.start,
                    "status_date": meta.status_date,
                    "task_count": meta.task_count,
                })
            );
        }
    }
    Ok(())
}

fn cmd_optimize(engine: &Engine, target: f64, apply: bool, format: OutputFormat) -> Result<()> {
    let proposal = engine_result(engine.optimize_proposal(target))?;
    match format {
        OutputFormat::Text => {
            println!(
                "current: {:.2}d, target: {:.2}d, achievable: {}",
                proposal.current_days, proposal.target_days, proposal.achievable
            );
            for strategy in &proposal.strategies {
                println!(
                    "  {:?}: saves {:.2}d, cost {:.0}, risk {:?}{}",
                    strategy.kind,
                    strategy.total_savings_days,
                    strategy.cost,
                    strategy.risk,
                    if strategy.recommended { " [recommended]" } else { "" }
                );
            }
        }
        OutputFormat::Json => {
            let strategies: Vec<_> = proposal
                .strategies
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "id": s.id,
                        "kind": format!("{:?}", s.kind),
                        "total_savings_days": s.total_savings_days,
                        "cost": s.cost,
                        "risk": format!("{:?}", s.risk),
                        "recommended": s.recommended,
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::json!({
                    "current_days": proposal.current_days,
                    "target_days": proposal.target_days,
                    "achievable": proposal.achievable,
                    "strategies": strategies,
                })
            );
        }
    }

    if apply {
        if let Some(recommended) = proposal.strategies.iter().find(|s| s.recommended) {
            engine_result(engine.optimize_apply(&recommended.changes))?;
            println!("applied strategy {}", recommended.id);
        } else {
            println!("no strategy to apply");
        }
    }
    Ok(())
}

fn cmd_projects(engine: &Engine, sub: ProjectCommand, format: OutputFormat) -> Result<()> {
    match sub {
        ProjectCommand::List => {
            let projects = engine_result(engine.list_projects())?;
            match format {
                OutputFormat::Text => {
                    for p in &projects {
                        println!("{}\t{}\t{}", p.id, p.name, if p.is_active { "*" } else { "" });
                    }
                }
                OutputFormat::Json => {
                    let rows: Vec<_> = projects
                        .iter()
                        .map(|p| serde_json::json!({"id": p.id, "name": p.name, "is_active": p.is_active}))
                        .collect();
                    println!("{}", serde_json::Value::Array(rows));
                }
            }
        }
        ProjectCommand::Create { name, start } => {
            let project = engine_result(engine.create_project(&name, start))?;
            println!("created project {} ({})", project.name, project.id);
        }
        ProjectCommand::Switch { id } => {
            engine_result(engine.switch_project(&id))?;
            println!("switched to {id}");
        }
        ProjectCommand::Delete { id } => {
            engine_result(engine.delete_project(&id))?;
            println!("deleted {id}");
        }
    }
    Ok(())
}

fn cmd_tasks(engine: &Engine, sub: TaskCommand, format: OutputFormat) -> Result<()> {
    match sub {
        TaskCommand::List => {
            let tasks = engine_result(engine.list_tasks())?;
            match format {
                OutputFormat::Text => {
                    for t in &tasks {
                        println!("{}\t{}\t{}", t.outline_number, t.name, t.duration);
                    }
                }
                OutputFormat::Json => {
                    let rows: Vec<_> = tasks
                        .iter()
                        .map(|t| {
                            serde_json::json!({
                                "id": t.id,
                                "outline_number": t.outline_number,
                                "name": t.name,
                                "duration": t.duration,
                                "milestone": t.milestone,
                                "summary": t.summary,
                            })
                        })
                        .collect();
                    println!("{}", serde_json::Value::Array(rows));
                }
            }
        }
        TaskCommand::Create {
            outline_number,
            name,
            outline_level,
            duration,
            milestone,
            summary,
        } => {
            let mut fields = NewTaskFields::new(outline_number, name, outline_level, duration);
            fields.milestone = milestone;
            fields.summary = summary;
            let task = engine_result(engine.create_task(fields))?;
            println!("created task {} ({})", task.outline_number, task.id);
        }
        TaskCommand::Rename { id, name } => {
            let task = engine_result(engine.update_task(
                &id,
                TaskUpdateFields {
                    name: Some(name),
                    ..Default::default()
                },
            ))?;
            println!("renamed {} to {}", task.outline_number, task.name);
        }
        TaskCommand::Delete { id } => {
            engine_result(engine.delete_task(&id))?;
            println!("deleted {id}");
        }
    }
    Ok(())
}

fn engine_result<T>(result: Result<T, EngineError>) -> Result<T> {
    result.map_err(|e| anyhow::anyhow!("{}: {e}", e.kind()))
}
