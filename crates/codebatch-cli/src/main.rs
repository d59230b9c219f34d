//! codebatch command-line front end
//!
//! Every subcommand maps to one service operation and prints its JSON
//! response on stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! codebatch analyze ./my-project
//! codebatch next ./my-project
//! codebatch content ./my-project task_3_1 --max-length 20000
//! codebatch complete ./my-project task_3_1 --output files/big.rs.md
//! codebatch check ./my-project file_analysis
//! codebatch status ./my-project
//!
//! # Config file plus overrides
//! CODEBATCH_STATE_DIR=/var/lib/codebatch codebatch --config codebatch.toml --target-batch 12000 analyze .
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use codebatch::service::{
    request_schemas, AnalyzeProjectRequest, CompleteTaskRequest, FailTaskRequest,
    GetTaskContentRequest, ProjectRequest, ResetWorkflowRequest, StepRequest,
};
use codebatch::{CodebatchService, ServiceResponse, WorkflowConfig, WorkflowOrchestrator};

/// Config file picked up from the working directory when --config is absent
const DEFAULT_CONFIG_FILE: &str = "codebatch.toml";

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (default: ./codebatch.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State directory (overrides CODEBATCH_STATE_DIR)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Artifact directory relative to the project (overrides CODEBATCH_OUTPUT_DIR)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Token estimate below which files are packed together
    #[arg(long, global = true)]
    small_max: Option<usize>,

    /// Token estimate above which files are split into parts
    #[arg(long, global = true)]
    large_min: Option<usize>,

    /// Target tokens per batch
    #[arg(long, global = true)]
    target_batch: Option<usize>,

    /// Hard cap on tokens per batch
    #[arg(long, global = true)]
    max_batch: Option<usize>,

    /// Pretty-print JSON output
    #[arg(long, global = true, default_value_t = false)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan batches for a project and persist the task queue
    Analyze {
        project: PathBuf,
        /// Files relative to the project (repeatable); default: discover
        #[arg(long = "file")]
        files: Vec<String>,
        /// Replace the existing queue even if the plan is unchanged
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Grant the next task (or re-serve the one in progress)
    Next { project: PathBuf },
    /// Print a task's content, one delivery chunk at a time
    Content {
        project: PathBuf,
        task_id: String,
        #[arg(long)]
        max_length: Option<usize>,
        #[arg(long)]
        chunk: Option<usize>,
    },
    /// Mark a task completed
    Complete {
        project: PathBuf,
        task_id: String,
        /// Artifact produced for the task (repeatable)
        #[arg(long = "output")]
        outputs: Vec<String>,
    },
    /// Mark a task failed so the queue moves on
    Fail {
        project: PathBuf,
        task_id: String,
        #[arg(long, default_value = "failed by caller")]
        message: String,
    },
    /// Enter a workflow step
    Begin { project: PathBuf, step: String },
    /// Validate a step's artifacts, completing it when present
    Check { project: PathBuf, step: String },
    /// Show workflow progress
    Status { project: PathBuf },
    /// Clear state for one project, or all projects with --all
    Reset {
        project: Option<PathBuf>,
        #[arg(long, default_value_t = false, conflicts_with = "project")]
        all: bool,
    },
    /// Print the JSON Schema of every request type
    Schema,
    /// Run an operation by name with JSON parameters
    Call { operation: String, params: String },
}

fn load_config(args: &Args) -> Result<WorkflowConfig> {
    let mut config = match &args.config {
        Some(path) => WorkflowConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None if std::path::Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            WorkflowConfig::from_toml_file(DEFAULT_CONFIG_FILE)
                .with_context(|| format!("loading {}", DEFAULT_CONFIG_FILE))?
        }
        None => WorkflowConfig::from_env(),
    };

    if let Some(dir) = &args.state_dir {
        config.state_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(n) = args.small_max {
        config.batch.small_max = n;
    }
    if let Some(n) = args.large_min {
        config.batch.large_min = n;
    }
    if let Some(n) = args.target_batch {
        config.batch.target_batch_size = n;
    }
    if let Some(n) = args.max_batch {
        config.batch.max_batch_size = n;
    }
    Ok(config)
}

fn path_arg(path: &std::path::Path) -> String {
    path.display().to_string()
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}

fn emit<T: Serialize>(response: ServiceResponse<T>, pretty: bool) -> Result<ExitCode> {
    print_json(&response, pretty)?;
    Ok(if response.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("codebatch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Command::Schema = args.command {
        print_json(&request_schemas(), true)?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&args)?;
    tracing::debug!(state_dir = %config.state_dir.display(), "Configuration loaded");
    let service = match WorkflowOrchestrator::new(config) {
        Ok(orchestrator) => CodebatchService::new(orchestrator),
        Err(e) => return emit(ServiceResponse::from(Err::<(), _>(e)), args.pretty),
    };

    let pretty = args.pretty;
    match args.command {
        Command::Analyze {
            project,
            files,
            force,
        } => emit(
            service.analyze_project(AnalyzeProjectRequest {
                project_path: path_arg(&project),
                files: (!files.is_empty()).then_some(files),
                force: Some(force),
            }),
            pretty,
        ),
        Command::Next { project } => emit(
            service.get_next_task(ProjectRequest {
                project_path: path_arg(&project),
            }),
            pretty,
        ),
        Command::Content {
            project,
            task_id,
            max_length,
            chunk,
        } => emit(
            service.get_task_content(GetTaskContentRequest {
                project_path: path_arg(&project),
                task_id,
                max_length,
                chunk_index: chunk,
            }),
            pretty,
        ),
        Command::Complete {
            project,
            task_id,
            outputs,
        } => emit(
            service.complete_task(CompleteTaskRequest {
                project_path: path_arg(&project),
                task_id,
                outputs,
            }),
            pretty,
        ),
        Command::Fail {
            project,
            task_id,
            message,
        } => emit(
            service.fail_task(FailTaskRequest {
                project_path: path_arg(&project),
                task_id,
                message,
            }),
            pretty,
        ),
        Command::Begin { project, step } => emit(
            service.begin_step(StepRequest {
                project_path: path_arg(&project),
                step,
            }),
            pretty,
        ),
        Command::Check { project, step } => emit(
            service.check_step_completion(StepRequest {
                project_path: path_arg(&project),
                step,
            }),
            pretty,
        ),
        Command::Status { project } => emit(
            service.get_workflow_status(ProjectRequest {
                project_path: path_arg(&project),
            }),
            pretty,
        ),
        Command::Reset { project, all } => {
            if project.is_none() && !all {
                anyhow::bail!("reset needs a project path or --all");
            }
            emit(
                service.reset_workflow(ResetWorkflowRequest {
                    project_path: project.as_deref().map(path_arg),
                }),
                pretty,
            )
        }
        Command::Call { operation, params } => {
            let params: serde_json::Value =
                serde_json::from_str(&params).context("params must be a JSON object")?;
            let response = service.call(&operation, params);
            print_json(&response, pretty)?;
            Ok(if response["status"] == "ok" {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Schema => Ok(ExitCode::SUCCESS),
    }
}
